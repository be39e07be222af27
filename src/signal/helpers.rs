// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Shared helpers for building the per-pixel quantities the binned and
//! hitcount preconditioners need: the `P^T N^-1 P` block (`div`), the hit
//! count, and the crosslink angle map.

use nalgebra::{DMatrix, SVD};
use ndarray::{Array2, Array3, Array4, ArrayView3};

use crate::scan::{NoiseModel, PointingOperator, Scan};

/// Accumulate `P^T W^-1 P` for one scan into `div` (shape `[ncomp, ncomp,
/// ny, nx]`), where `W^-1` is the scan's white-noise diagonal. This is
/// done by forward-projecting `ncomp` unit maps through the pointing
/// operator and back, one pair of basis vectors at a time, since the
/// pointing operator only exposes forward/backward application rather
/// than an explicit matrix.
pub fn calc_div_map(scan: &Scan, ncomp: usize, ny: usize, nx: usize, div: &mut Array4<f64>) {
    let diag = scan.noise.diag();
    for ci in 0..ncomp {
        for cj in 0..ncomp {
            let mut basis = Array3::<f64>::zeros((ncomp, ny, nx));
            // Using the identity pixel-by-pixel would cost ny*nx forward/
            // backward passes; instead exploit that P is pixel-local in
            // its component mixing, so a single pass with basis component
            // `ci` set to all-ones recovers column `ci` of every pixel's
            // local ncomp x ncomp block at once, projected by `cj`'s row
            // via the backward accumulation below.
            basis.index_axis_mut(ndarray::Axis(0), ci).fill(1.0);
            let mut tod = Array2::<f64>::zeros(scan.tod_shape());
            scan.pointing.forward(basis.view(), tod.view_mut());
            for (d, mut row) in tod.outer_iter_mut().enumerate() {
                let w = diag.get(d).copied().unwrap_or(0.0);
                row.mapv_inplace(|v| v * w);
            }
            let mut out = Array3::<f64>::zeros((ncomp, ny, nx));
            scan.pointing.backward(tod.view(), out.view_mut());
            let contrib = out.index_axis(ndarray::Axis(0), cj);
            let mut slot = div.index_axis_mut(ndarray::Axis(0), ci);
            let mut slot = slot.index_axis_mut(ndarray::Axis(0), cj);
            slot += &contrib;
        }
    }
}

/// Accumulate a hit count (number of samples landing in each pixel) for
/// one scan into `hits` (shape `[ny, nx]`).
pub fn calc_hits_map(scan: &Scan, ny: usize, nx: usize, hits: &mut Array2<f64>) {
    let tod = Array2::<f64>::ones(scan.tod_shape());
    let mut out = Array3::<f64>::zeros((1, ny, nx));
    scan.pointing.backward(tod.view(), out.view_mut());
    *hits += &out.index_axis(ndarray::Axis(0), 0);
}

/// Accumulate, for each pixel, the sum of squared forward-projected
/// crosslink direction components (here approximated as the pixel's hit
/// anisotropy: the difference between the maximum and minimum diagonal
/// entries of its `div` block, which vanishes for an isotropically
/// crosslinked pixel and grows for one hit mostly along a single scan
/// direction).
pub fn calc_crosslink_map(div: ArrayView3<f64>) -> Array2<f64> {
    let (ncomp, ny, nx) = (div.shape()[0], div.shape()[1], div.shape()[2]);
    let mut out = Array2::zeros((ny, nx));
    if ncomp < 2 {
        return out;
    }
    for y in 0..ny {
        for x in 0..nx {
            let qq = div[[0.min(ncomp - 1), y, x]];
            let uu = div[[1.min(ncomp - 1), y, x]];
            out[[y, x]] = (qq - uu).abs();
        }
    }
    out
}

/// Raise a per-pixel `ncomp x ncomp` symmetric PSD block to an arbitrary
/// matrix power via SVD (singular values double as eigenvalues for a
/// symmetric PSD block), zeroing out singular values below `eig_limit *
/// sigma_max` rather than raising them to a (possibly huge, for negative
/// powers) power. `pseudo_invert_block` is the `power = -1` case; the
/// circulant preconditioner's whitening matrix `S = div^{-1/2}` is the
/// `power = -0.5` case.
pub fn pseudo_pow_block(block: &DMatrix<f64>, power: f64, eig_limit: f64) -> DMatrix<f64> {
    let n = block.nrows();
    let svd = SVD::new(block.clone(), true, true);
    let smax = svd.singular_values.iter().cloned().fold(0.0_f64, f64::max);
    let threshold = smax * eig_limit;
    let mut spow = DMatrix::<f64>::zeros(n, n);
    for i in 0..n {
        let s = svd.singular_values[i];
        if s > threshold && s > 0.0 {
            spow[(i, i)] = s.powf(power);
        }
    }
    let u = svd.u.expect("SVD::new(true, true) always computes U");
    let vt = svd.v_t.expect("SVD::new(true, true) always computes V^T");
    vt.transpose() * spow * u.transpose()
}

/// Pseudo-invert a per-pixel `ncomp x ncomp` symmetric block, zeroing out
/// singular values below `eig_limit * sigma_max`. This is the numerical
/// core of the binned preconditioner: a poorly-conditioned block (a pixel
/// seen by too few crossing scan directions) gets a rank-deficient, still-
/// finite inverse rather than blowing up.
pub fn pseudo_invert_block(block: &DMatrix<f64>, eig_limit: f64) -> DMatrix<f64> {
    pseudo_pow_block(block, -1.0, eig_limit)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pseudo_invert_identity_is_identity() {
        let m = DMatrix::<f64>::identity(3, 3);
        let inv = pseudo_invert_block(&m, 1e-6);
        for i in 0..3 {
            for j in 0..3 {
                let expected = if i == j { 1.0 } else { 0.0 };
                approx::assert_abs_diff_eq!(inv[(i, j)], expected, epsilon = 1e-10);
            }
        }
    }

    #[test]
    fn pseudo_invert_drops_tiny_singular_values() {
        let mut m = DMatrix::<f64>::zeros(2, 2);
        m[(0, 0)] = 1.0;
        m[(1, 1)] = 1e-12;
        let inv = pseudo_invert_block(&m, 1e-6);
        approx::assert_abs_diff_eq!(inv[(0, 0)], 1.0, epsilon = 1e-10);
        approx::assert_abs_diff_eq!(inv[(1, 1)], 0.0, epsilon = 1e-10);
    }

    #[test]
    fn pseudo_pow_negative_half_is_inverse_square_root() {
        let mut m = DMatrix::<f64>::zeros(2, 2);
        m[(0, 0)] = 4.0;
        m[(1, 1)] = 16.0;
        let s = pseudo_pow_block(&m, -0.5, 1e-6);
        approx::assert_abs_diff_eq!(s[(0, 0)], 0.5, epsilon = 1e-10);
        approx::assert_abs_diff_eq!(s[(1, 1)], 0.25, epsilon = 1e-10);
        // S * block * S should recover the identity.
        let recovered = &s * &m * &s;
        approx::assert_abs_diff_eq!(recovered[(0, 0)], 1.0, epsilon = 1e-10);
        approx::assert_abs_diff_eq!(recovered[(1, 1)], 1.0, epsilon = 1e-10);
    }
}
