// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! `PrecondPhaseBinned`: diagonal preconditioner over
//! [`crate::signal::phase::SignalPhase`]'s `[ndet, nphase]` array, built
//! the same way as [`crate::precond::cut::Cut`] — probe each diagonal
//! entry with a unit vector through the phase pointing operator and the
//! noise model's white approximation — but additionally retaining the
//! per-pattern hit map (spec §4.3.7), since a phase map's validity (did
//! this azimuth bin/detector pair ever get hit?) is a diagnostic callers
//! want independently of the preconditioner's numeric value.

use ndarray::{Array1, Array2, ArrayView1, ArrayView2};

use crate::comm::Comm;
use crate::precond::Preconditioner;
use crate::scan::{NoiseModel, PhasePointing};

pub struct Phase {
    ndet: usize,
    nphase: usize,
    inv_diag: Array1<f64>,
    /// Hit count per (detector, phase pixel), flattened row-major like
    /// `inv_diag`.
    hits: Array1<f64>,
}

impl Phase {
    /// `tod_shape` is `[ndet_scan, nsamp]` for one representative scan
    /// feeding this phase signal; `phase_pointing`/`noise` are that same
    /// scan's collaborators.
    pub fn new(
        phase_pointing: &dyn PhasePointing,
        noise: &dyn NoiseModel,
        ndet: usize,
        tod_shape: (usize, usize),
    ) -> Self {
        let nphase = phase_pointing.nphase();
        let n = ndet * nphase;
        let mut diag = Array1::<f64>::zeros(n);
        let mut hits = Array1::<f64>::zeros(n);
        for d in 0..ndet {
            for p in 0..nphase {
                let idx = d * nphase + p;
                let mut e = Array2::<f64>::zeros((ndet, nphase));
                e[[d, p]] = 1.0;
                let mut tod = ndarray::Array2::<f64>::zeros(tod_shape);
                phase_pointing.forward(e.view(), tod.view_mut());
                hits[idx] = tod.iter().filter(|&&v| v != 0.0).count() as f64;
                noise.white(tod.view_mut());
                let mut out = Array2::<f64>::zeros((ndet, nphase));
                phase_pointing.backward(tod.view(), out.view_mut());
                diag[idx] = out[[d, p]];
            }
        }
        let inv_diag = diag.mapv(|d| if d > 0.0 { 1.0 / d } else { 0.0 });
        Phase { ndet, nphase, inv_diag, hits }
    }

    /// The per-(detector, phase pixel) hit count this preconditioner was
    /// built with, shape `[ndet, nphase]`.
    pub fn hit_map(&self) -> Array2<f64> {
        Array2::from_shape_vec((self.ndet, self.nphase), self.hits.to_vec())
            .expect("hits length matches ndet*nphase by construction")
    }
}

impl Preconditioner for Phase {
    fn apply(&self, x: ArrayView1<f64>, _comm: &dyn Comm) -> Array1<f64> {
        &x.to_owned() * &self.inv_diag
    }
}
