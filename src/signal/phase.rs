// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The phase signal: one degree of freedom per (detector, azimuth bin)
//! pair, for common ground-synchronous structure that repeats every scan
//! but does not correlate with sky position (e.g. pickup). Shared across
//! ranks like [`crate::signal::map::SignalMap`], but with a per-detector
//! rather than per-sky-pixel layout.

use ndarray::{Array2, ArrayView1, ArrayView2, ArrayViewMut1, ArrayViewMut2};

use crate::comm::Comm;
use crate::scan::Scan;
use crate::signal::Signal;

pub struct SignalPhase {
    name: String,
    ndet: usize,
    nphase: usize,
}

impl SignalPhase {
    pub fn new(name: impl Into<String>, ndet: usize, nphase: usize) -> Self {
        SignalPhase { name: name.into(), ndet, nphase }
    }

    fn to_phase_view(&self, x: ArrayView1<f64>) -> ndarray::ArrayView2<f64> {
        ndarray::ArrayView::from_shape(
            (self.ndet, self.nphase),
            x.as_slice().expect("DOF slice must be contiguous"),
        )
        .expect("DOF slice length matches phase map shape")
    }
}

impl Signal for SignalPhase {
    fn name(&self) -> &str {
        &self.name
    }

    fn dof_len(&self) -> usize {
        self.ndet * self.nphase
    }

    fn forward(&self, scan: &Scan, x: ArrayView1<f64>, tod: ArrayViewMut2<f64>) {
        let Some(phase_pointing) = &scan.phase_pointing else { return };
        let phase = self.to_phase_view(x);
        phase_pointing.forward(phase, tod);
    }

    fn backward(&self, scan: &Scan, tod: ArrayView2<f64>, out: ArrayViewMut1<f64>) {
        let Some(phase_pointing) = &scan.phase_pointing else { return };
        let mut scratch = Array2::<f64>::zeros((self.ndet, self.nphase));
        phase_pointing.backward(tod, scratch.view_mut());
        let flat = scratch.as_slice().expect("scratch phase map is contiguous");
        let mut out = out;
        for (o, s) in out.iter_mut().zip(flat.iter()) {
            *o += *s;
        }
    }

    fn finish(&mut self, out: ArrayViewMut1<f64>, comm: &dyn Comm) {
        comm.allreduce_sum_inplace(out);
    }
}
