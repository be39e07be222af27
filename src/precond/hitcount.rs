// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! `PrecondMapHitcount`: the cheapest possible map preconditioner, the
//! inverse hit count per pixel applied uniformly to every component. Used
//! when even the binned preconditioner's per-pixel block inversion is too
//! expensive, or as a fallback when a pixel's `div` block is masked out.

use ndarray::{Array1, Array2, ArrayView1, ArrayView2};

use crate::comm::Comm;
use crate::precond::Preconditioner;

pub struct Hitcount {
    ncomp: usize,
    ny: usize,
    nx: usize,
    /// `1 / hits` per pixel, zero where the pixel was never hit.
    inv_hits: Array2<f64>,
}

impl Hitcount {
    pub fn new(hits: ArrayView2<f64>, ncomp: usize) -> Self {
        let inv_hits = hits.mapv(|h| if h > 0.0 { 1.0 / h } else { 0.0 });
        let (ny, nx) = (hits.shape()[0], hits.shape()[1]);
        Hitcount { ncomp, ny, nx, inv_hits }
    }
}

impl Preconditioner for Hitcount {
    fn apply(&self, x: ArrayView1<f64>, _comm: &dyn Comm) -> Array1<f64> {
        let area = ndarray::ArrayView::from_shape(
            (self.ncomp, self.ny, self.nx),
            x.as_slice().expect("DOF slice must be contiguous"),
        )
        .expect("DOF slice length matches area shape");
        let mut out = ndarray::Array3::<f64>::zeros((self.ncomp, self.ny, self.nx));
        for c in 0..self.ncomp {
            let mut slice = out.index_axis_mut(ndarray::Axis(0), c);
            slice.assign(&(&area.index_axis(ndarray::Axis(0), c) * &self.inv_hits));
        }
        Array1::from(out.into_raw_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comm::SingleProcessComm;

    #[test]
    fn scales_by_inverse_hitcount() {
        let hits = ndarray::array![[4.0, 0.0]];
        let precond = Hitcount::new(hits.view(), 1);
        let x = Array1::from(vec![8.0, 3.0]);
        let comm = SingleProcessComm;
        let y = precond.apply(x.view(), &comm);
        approx::assert_abs_diff_eq!(y[0], 2.0, epsilon = 1e-12);
        approx::assert_abs_diff_eq!(y[1], 0.0, epsilon = 1e-12);
    }
}
