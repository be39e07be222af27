// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Per-pixel validity. A pixel is masked out if it was never hit in
//! temperature, or if its polarization block is so poorly conditioned
//! that inverting it would amplify noise unacceptably. The mask is
//! applied at every `A`/`M` evaluation, not treated as an exceptional
//! path.

use nalgebra::{SymmetricEigen, DMatrix};
use ndarray::{Array2, ArrayView1, ArrayView4, ArrayViewMut3};

/// Compute the boolean validity mask for a `div` array of shape
/// `[ncomp, ncomp, ny, nx]` (the per-pixel `P^T N^-1 P` block, as built by
/// [`crate::signal::helpers::calc_div_map`]).
///
/// A pixel is valid iff `div[0,0] > 0` (it was hit in temperature) and,
/// when `ncomp > 1`, the eigenvalue condition number of the full
/// `ncomp x ncomp` block lies in `[1, condition_lim)`.
pub fn compute_mask(div: ArrayView4<f64>, condition_lim: f64) -> Array2<bool> {
    let ncomp = div.shape()[0];
    let (ny, nx) = (div.shape()[2], div.shape()[3]);
    let mut mask = Array2::from_elem((ny, nx), false);
    for y in 0..ny {
        for x in 0..nx {
            let tt = div[[0, 0, y, x]];
            if tt <= 0.0 {
                continue;
            }
            if ncomp == 1 {
                mask[[y, x]] = true;
                continue;
            }
            let mut block = DMatrix::<f64>::zeros(ncomp, ncomp);
            for i in 0..ncomp {
                for j in 0..ncomp {
                    block[(i, j)] = div[[i, j, y, x]];
                }
            }
            let eig = SymmetricEigen::new(block);
            let lmax = eig.eigenvalues.iter().cloned().fold(f64::MIN, f64::max);
            let lmin = eig.eigenvalues.iter().cloned().fold(f64::MAX, f64::min);
            if lmin > 0.0 {
                let cond = lmax / lmin;
                mask[[y, x]] = (1.0..condition_lim).contains(&cond);
            }
        }
    }
    mask
}

/// Zero every component of every masked-out pixel, in place.
pub fn apply_mask(mask: &Array2<bool>, area: &mut ArrayViewMut3<f64>) {
    let ncomp = area.shape()[0];
    let (ny, nx) = (area.shape()[1], area.shape()[2]);
    for y in 0..ny {
        for x in 0..nx {
            if !mask[[y, x]] {
                for c in 0..ncomp {
                    area[[c, y, x]] = 0.0;
                }
            }
        }
    }
}

/// Condition number of a small symmetric positive-semidefinite block,
/// used directly by tests and by the binned preconditioner's pseudo-
/// inverse cutoff.
pub fn condition_number(block: ArrayView1<f64>, ncomp: usize) -> f64 {
    let mut m = DMatrix::<f64>::zeros(ncomp, ncomp);
    for i in 0..ncomp {
        for j in 0..ncomp {
            m[(i, j)] = block[i * ncomp + j];
        }
    }
    let eig = SymmetricEigen::new(m);
    let lmax = eig.eigenvalues.iter().cloned().fold(f64::MIN, f64::max);
    let lmin = eig.eigenvalues.iter().cloned().fold(f64::MAX, f64::min);
    if lmin <= 0.0 {
        f64::INFINITY
    } else {
        lmax / lmin
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array4;

    #[test]
    fn masks_unhit_pixel() {
        let div = Array4::<f64>::zeros((1, 1, 2, 2));
        let mask = compute_mask(div.view(), 10.0);
        assert!(!mask[[0, 0]]);
    }

    #[test]
    fn keeps_well_conditioned_pixel() {
        let mut div = Array4::<f64>::zeros((2, 2, 1, 1));
        div[[0, 0, 0, 0]] = 4.0;
        div[[1, 1, 0, 0]] = 4.0;
        let mask = compute_mask(div.view(), 10.0);
        assert!(mask[[0, 0]]);
    }

    #[test]
    fn rejects_poorly_conditioned_pixel() {
        let mut div = Array4::<f64>::zeros((2, 2, 1, 1));
        div[[0, 0, 0, 0]] = 1e6;
        div[[1, 1, 0, 0]] = 1.0;
        let mask = compute_mask(div.view(), 10.0);
        assert!(!mask[[0, 0]]);
    }
}
