// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! `PrecondBinned`: per-pixel pseudo-inverse of the `P^T W^-1 P` block,
//! the cheapest nontrivial preconditioner and the building block several
//! others (hitcount, submap, TOD-based) specialize or wrap.

use nalgebra::DMatrix;
use ndarray::{Array1, Array2, ArrayView1, ArrayView4};

use crate::comm::Comm;
use crate::mask::compute_mask;
use crate::precond::Preconditioner;
use crate::signal::helpers::pseudo_invert_block;

pub struct Binned {
    ncomp: usize,
    ny: usize,
    nx: usize,
    /// Pseudo-inverted `ncomp x ncomp` block per pixel, flattened
    /// `[ny, nx, ncomp*ncomp]`.
    inv: Vec<f64>,
    mask: Array2<bool>,
}

impl Binned {
    /// `div` is the accumulated `P^T W^-1 P` block, shape `[ncomp, ncomp,
    /// ny, nx]` (see [`crate::signal::helpers::calc_div_map`]).
    pub fn new(div: ArrayView4<f64>, eig_limit: f64, condition_lim: f64) -> Self {
        let ncomp = div.shape()[0];
        let (ny, nx) = (div.shape()[2], div.shape()[3]);
        let mask = compute_mask(div, condition_lim);
        let mut inv = vec![0.0; ny * nx * ncomp * ncomp];
        for y in 0..ny {
            for x in 0..nx {
                if !mask[[y, x]] {
                    continue;
                }
                let mut block = DMatrix::<f64>::zeros(ncomp, ncomp);
                for i in 0..ncomp {
                    for j in 0..ncomp {
                        block[(i, j)] = div[[i, j, y, x]];
                    }
                }
                let block_inv = pseudo_invert_block(&block, eig_limit);
                let base = (y * nx + x) * ncomp * ncomp;
                for i in 0..ncomp {
                    for j in 0..ncomp {
                        inv[base + i * ncomp + j] = block_inv[(i, j)];
                    }
                }
            }
        }
        Binned { ncomp, ny, nx, inv, mask }
    }
}

impl Preconditioner for Binned {
    fn apply(&self, x: ArrayView1<f64>, _comm: &dyn Comm) -> Array1<f64> {
        let area = ndarray::ArrayView::from_shape(
            (self.ncomp, self.ny, self.nx),
            x.as_slice().expect("DOF slice must be contiguous"),
        )
        .expect("DOF slice length matches area shape");
        let mut result = ndarray::Array3::<f64>::zeros((self.ncomp, self.ny, self.nx));
        for y in 0..self.ny {
            for x_ in 0..self.nx {
                if !self.mask[[y, x_]] {
                    continue;
                }
                let base = (y * self.nx + x_) * self.ncomp * self.ncomp;
                for i in 0..self.ncomp {
                    let mut acc = 0.0;
                    for j in 0..self.ncomp {
                        acc += self.inv[base + i * self.ncomp + j] * area[[j, y, x_]];
                    }
                    result[[i, y, x_]] = acc;
                }
            }
        }
        Array1::from(result.into_raw_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comm::SingleProcessComm;
    use ndarray::Array4;

    #[test]
    fn identity_div_is_own_inverse() {
        let mut div = Array4::<f64>::zeros((1, 1, 1, 1));
        div[[0, 0, 0, 0]] = 2.0;
        let precond = Binned::new(div.view(), 1e-6, 10.0);
        let x = Array1::from(vec![4.0]);
        let comm = SingleProcessComm;
        let y = precond.apply(x.view(), &comm);
        approx::assert_abs_diff_eq!(y[0], 2.0, epsilon = 1e-10);
    }
}
