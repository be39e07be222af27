// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The map-with-buddies signal: a primary sky map signal whose scans also
//! carry synthetic "buddy" copies at alternate boresight offsets. Folding
//! the buddies into the same projection lets downstream preconditioner
//! diagnostics (crosslink maps) see how well a pixel's polarization angle
//! coverage is actually resolved, rather than just how many times it was
//! hit.

use ndarray::{Array3, ArrayView1, ArrayView2, ArrayViewMut1, ArrayViewMut2};

use crate::comm::Comm;
use crate::scan::{with_temp_comps, Scan};
use crate::signal::map::SignalMap;
use crate::signal::Signal;

pub struct SignalMapBuddies {
    primary: SignalMap,
}

impl SignalMapBuddies {
    pub fn new(name: impl Into<String>, ncomp: usize, ny: usize, nx: usize) -> Self {
        SignalMapBuddies { primary: SignalMap::new(name, ncomp, ny, nx) }
    }
}

impl Signal for SignalMapBuddies {
    fn name(&self) -> &str {
        self.primary.name()
    }

    fn dof_len(&self) -> usize {
        self.primary.dof_len()
    }

    fn forward(&self, scan: &Scan, x: ArrayView1<f64>, mut tod: ArrayViewMut2<f64>) {
        self.primary.forward(scan, x, tod.view_mut());
        for (i, buddy) in scan.buddy_pointings.iter().enumerate() {
            // Each buddy pointing operator shares the primary map's area
            // shape by construction (the caller is responsible for
            // building buddy operators against the same `Area`), so the
            // same flat DOF slice reinterprets directly.
            let area = ndarray::ArrayView::from_shape(
                self.primary.shape(),
                x.as_slice().expect("DOF slice must be contiguous"),
            )
            .expect("DOF slice length matches area shape");
            let mut buddy_tod = ndarray::Array2::<f64>::zeros(scan.tod_shape());
            // The external multibeam pointing collaborator reads the
            // scan's component-mixing matrix off `scan.comps`; swap in
            // this buddy's own mixing for the duration of its own
            // forward pass, restoring the scan's real mixing afterward
            // even if `buddy.forward` panics (spec §3 Lifecycle, §9).
            if let Some(comps) = scan.buddy_comps.get(i) {
                with_temp_comps(scan, comps.clone(), || buddy.forward(area, buddy_tod.view_mut()));
            } else {
                buddy.forward(area, buddy_tod.view_mut());
            }
            tod += &buddy_tod;
        }
    }

    fn backward(&self, scan: &Scan, tod: ArrayView2<f64>, mut out: ArrayViewMut1<f64>) {
        self.primary.backward(scan, tod, out.view_mut());
        for (i, buddy) in scan.buddy_pointings.iter().enumerate() {
            let mut scratch = Array3::<f64>::zeros(self.primary.shape());
            if let Some(comps) = scan.buddy_comps.get(i) {
                with_temp_comps(scan, comps.clone(), || buddy.backward(tod, scratch.view_mut()));
            } else {
                buddy.backward(tod, scratch.view_mut());
            }
            let flat = scratch.as_slice().expect("scratch area is contiguous");
            for (o, s) in out.iter_mut().zip(flat.iter()) {
                *o += *s;
            }
        }
    }

    fn finish(&mut self, out: ArrayViewMut1<f64>, comm: &dyn Comm) {
        self.primary.finish(out, comm);
    }
}
