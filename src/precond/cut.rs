// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! `PrecondCut`: the cut (junk-vector) signal's preconditioner. Each junk
//! degree of freedom corresponds to one disjoint range of cut samples, so
//! `C^T W C` (with `W` the noise model's white-noise approximation) is
//! diagonal in the junk basis: probing it one unit vector at a time gives
//! the exact diagonal, not just an approximation.

use ndarray::{Array1, Array2, ArrayView1};

use crate::comm::Comm;
use crate::precond::Preconditioner;
use crate::scan::{CutPointing, NoiseModel};

pub struct Cut {
    inv_diag: Array1<f64>,
}

impl Cut {
    pub fn new(cut_pointing: &dyn CutPointing, noise: &dyn NoiseModel, tod_shape: (usize, usize)) -> Self {
        let njunk = cut_pointing.njunk();
        let mut diag = Array1::<f64>::zeros(njunk);
        for i in 0..njunk {
            let mut e_i = Array1::<f64>::zeros(njunk);
            e_i[i] = 1.0;
            let mut tod = Array2::<f64>::zeros(tod_shape);
            cut_pointing.forward(e_i.view(), tod.view_mut());
            noise.white(tod.view_mut());
            let mut out = Array1::<f64>::zeros(njunk);
            cut_pointing.backward(tod.view(), out.view_mut());
            diag[i] = out[i];
        }
        let inv_diag = diag.mapv(|d| if d > 0.0 { 1.0 / d } else { 0.0 });
        Cut { inv_diag }
    }
}

impl Preconditioner for Cut {
    fn apply(&self, x: ArrayView1<f64>, _comm: &dyn Comm) -> Array1<f64> {
        &x.to_owned() * &self.inv_diag
    }
}
