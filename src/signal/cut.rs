// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The cut signal: one junk degree of freedom per cut range, per scan.
//! Cut signals must be registered first with an [`crate::eqsys::Eqsys`] —
//! see the `signal` module doc comment for why.

use ndarray::{ArrayView1, ArrayView2, ArrayViewMut1, ArrayViewMut2};

use crate::comm::Comm;
use crate::scan::Scan;
use crate::signal::Signal;

/// Joint junk vector across every scan this rank owns. `offsets[i]` is
/// where scan `i`'s slice of the packed junk vector begins;
/// `offsets[scans.len()]` is the total length.
pub struct SignalCut {
    name: String,
    scan_ids: Vec<String>,
    offsets: Vec<usize>,
}

impl SignalCut {
    /// `scans` must be in the same order the equation system iterates
    /// them in, so that offsets line up with per-scan `njunk()` calls.
    pub fn new(name: impl Into<String>, scans: &[Scan]) -> Self {
        let mut offsets = Vec::with_capacity(scans.len() + 1);
        let mut total = 0;
        for scan in scans {
            offsets.push(total);
            total += scan.cut_pointing.njunk();
        }
        offsets.push(total);
        SignalCut {
            name: name.into(),
            scan_ids: scans.iter().map(|s| s.id.clone()).collect(),
            offsets,
        }
    }

    fn slice_for(&self, scan: &Scan) -> Option<(usize, usize)> {
        let idx = self.scan_ids.iter().position(|id| id == &scan.id)?;
        Some((self.offsets[idx], self.offsets[idx + 1]))
    }
}

impl Signal for SignalCut {
    fn name(&self) -> &str {
        &self.name
    }

    fn dof_len(&self) -> usize {
        *self.offsets.last().unwrap_or(&0)
    }

    fn is_cut(&self) -> bool {
        true
    }

    fn forward(&self, scan: &Scan, x: ArrayView1<f64>, tod: ArrayViewMut2<f64>) {
        // A scan this rank does not own contributes no junk slice: silent
        // no-op, not an error, since it is how rank partitioning works.
        if let Some((lo, hi)) = self.slice_for(scan) {
            scan.cut_pointing.forward(x.slice(ndarray::s![lo..hi]), tod);
        }
    }

    fn backward(&self, scan: &Scan, tod: ArrayView2<f64>, mut out: ArrayViewMut1<f64>) {
        if let Some((lo, hi)) = self.slice_for(scan) {
            scan.cut_pointing.backward(tod, out.slice_mut(ndarray::s![lo..hi]));
        }
    }

    fn finish(&mut self, _out: ArrayViewMut1<f64>, _comm: &dyn Comm) {
        // The junk vector is distributed (each scan's slice belongs to
        // exactly one rank): nothing to reduce.
    }
}
