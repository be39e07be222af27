// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The sky-map signal: the degrees of freedom are a pixelized `[ncomp, ny,
//! nx]` map. `SignalMap` is shared (every rank holds and updates the same
//! map, so `finish` must reduce across the communicator); `SignalDmap` is
//! the distributed variant used when the map itself is partitioned across
//! ranks and no cross-rank reduction is needed.

use ndarray::{Array2, Array3, ArrayView1, ArrayView2, ArrayViewMut1, ArrayViewMut2};

use crate::comm::Comm;
use crate::prior::Prior;
use crate::scan::Scan;
use crate::signal::Signal;

fn to_area_view(x: ArrayView1<f64>, shape: (usize, usize, usize)) -> ndarray::ArrayView3<f64> {
    ndarray::ArrayView::from_shape(shape, x.as_slice().expect("DOF slice must be contiguous"))
        .expect("DOF slice length matches area shape")
}

/// A pixelized sky-map signal.
pub struct SignalMap {
    name: String,
    shape: (usize, usize, usize),
    /// Whether this map's DOF block is replicated across every rank and
    /// therefore needs `finish` to reduce it, or already belongs solely to
    /// this rank (the distributed/`Dmap` case).
    shared: bool,
    prior: Option<Box<dyn Prior>>,
}

impl SignalMap {
    pub fn new(name: impl Into<String>, ncomp: usize, ny: usize, nx: usize) -> Self {
        SignalMap { name: name.into(), shape: (ncomp, ny, nx), shared: true, prior: None }
    }

    /// The distributed variant: same projection, but each rank's slice of
    /// the map is already disjoint, so `finish` is a no-op.
    pub fn new_distributed(name: impl Into<String>, ncomp: usize, ny: usize, nx: usize) -> Self {
        SignalMap { name: name.into(), shape: (ncomp, ny, nx), shared: false, prior: None }
    }

    /// Attach a regularizing [`Prior`], applied additively in `A(x)` after
    /// every scan's projection has been reduced.
    pub fn with_prior(mut self, prior: Box<dyn Prior>) -> Self {
        self.prior = Some(prior);
        self
    }

    /// The `[ncomp, ny, nx]` area shape this signal's DOF block unpacks
    /// into.
    pub fn shape(&self) -> (usize, usize, usize) {
        self.shape
    }
}

impl Signal for SignalMap {
    fn name(&self) -> &str {
        &self.name
    }

    fn dof_len(&self) -> usize {
        self.shape.0 * self.shape.1 * self.shape.2
    }

    fn forward(&self, scan: &Scan, x: ArrayView1<f64>, mut tod: ArrayViewMut2<f64>) {
        let area = to_area_view(x, self.shape);
        let mut scratch = ndarray::Array2::<f64>::zeros(scan.tod_shape());
        scan.pointing.forward(area, scratch.view_mut());
        tod += &scratch;
    }

    fn backward(&self, scan: &Scan, tod: ArrayView2<f64>, out: ArrayViewMut1<f64>) {
        let mut scratch = Array3::<f64>::zeros(self.shape);
        scan.pointing.backward(tod, scratch.view_mut());
        let flat = scratch.as_slice().expect("scratch area is contiguous");
        let mut out = out;
        for (o, s) in out.iter_mut().zip(flat.iter()) {
            *o += *s;
        }
    }

    fn finish(&mut self, out: ArrayViewMut1<f64>, comm: &dyn Comm) {
        if self.shared {
            comm.allreduce_sum_inplace(out);
        }
    }

    fn prior(&self, x: ArrayView1<f64>, mut out: ArrayViewMut1<f64>) {
        if let Some(prior) = &self.prior {
            out += &prior.apply(x);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comm::SingleProcessComm;
    use crate::scan::{CutPointing, NoiseModel, PointingOperator};
    use ndarray::{Array1, Array2, ArrayView3, ArrayViewMut3};

    struct IdentityPointing;
    impl PointingOperator for IdentityPointing {
        fn forward(&self, area: ArrayView3<f64>, mut tod: ArrayViewMut2<f64>) {
            // One detector per pixel, one sample: tod[d, 0] = area[0, d, 0]
            for d in 0..tod.shape()[0].min(area.shape()[1]) {
                tod[[d, 0]] += area[[0, d, 0]];
            }
        }
        fn backward(&self, tod: ArrayView2<f64>, mut area: ArrayViewMut3<f64>) {
            for d in 0..tod.shape()[0].min(area.shape()[1]) {
                area[[0, d, 0]] += tod[[d, 0]];
            }
        }
    }

    struct NoCut;
    impl CutPointing for NoCut {
        fn njunk(&self) -> usize {
            0
        }
        fn forward(&self, _junk: ArrayView1<f64>, _tod: ArrayViewMut2<f64>) {}
        fn backward(&self, _tod: ArrayView2<f64>, _junk: ArrayViewMut1<f64>) {}
    }

    struct UnitNoise(usize);
    impl NoiseModel for UnitNoise {
        fn apply(&self, _tod: ArrayViewMut2<f64>) {}
        fn white(&self, _tod: ArrayViewMut2<f64>) {}
        fn diag(&self) -> Array1<f64> {
            Array1::ones(self.0)
        }
        fn bins(&self) -> ndarray::ArrayView2<f64> {
            unimplemented!()
        }
        fn icovs(&self) -> &[ndarray::Array2<f64>] {
            &[]
        }
        fn refit(&self, _tod: ArrayView2<f64>, _srate: f64) -> Box<dyn NoiseModel> {
            Box::new(UnitNoise(self.0))
        }
    }

    fn scan_with(ndet: usize) -> Scan {
        Scan {
            id: "s".into(),
            ndet,
            nsamp: 1,
            srate: 100.0,
            cut: crate::rangelist::Multirange::new(vec![]),
            pointing: Box::new(IdentityPointing),
            cut_pointing: Box::new(NoCut),
            noise: Box::new(UnitNoise(ndet)),
            phase_pointing: None,
            buddy_pointings: Vec::new(),
            buddy_comps: Vec::new(),
            comps: std::sync::Mutex::new(Array2::zeros((ndet, 1))),
            data: Array2::zeros((ndet, 1)),
        }
    }

    #[test]
    fn forward_then_backward_recovers_hitcount_weighted_map() {
        let signal = SignalMap::new("m", 1, 3, 1);
        let scan = scan_with(3);
        let x = Array1::from(vec![1.0, 2.0, 3.0]);
        let mut tod = Array2::<f64>::zeros(scan.tod_shape());
        signal.forward(&scan, x.view(), tod.view_mut());
        assert_eq!(tod, Array2::from_shape_vec((3, 1), vec![1.0, 2.0, 3.0]).unwrap());

        let mut out = Array1::<f64>::zeros(3);
        signal.backward(&scan, tod.view(), out.view_mut());
        assert_eq!(out, x);
    }

    #[test]
    fn finish_is_noop_for_distributed_map() {
        let mut signal = SignalMap::new_distributed("d", 1, 2, 1);
        let mut out = Array1::from(vec![1.0, 2.0]);
        let comm = SingleProcessComm;
        signal.finish(out.view_mut(), &comm);
        assert_eq!(out, Array1::from(vec![1.0, 2.0]));
    }

    #[test]
    fn with_prior_accumulates_into_out() {
        use crate::prior::NormPrior;
        let signal = SignalMap::new("m", 1, 2, 1).with_prior(Box::new(NormPrior { weight: 0.5 }));
        let x = Array1::from(vec![2.0, 4.0]);
        let mut out = Array1::from(vec![10.0, 20.0]);
        signal.prior(x.view(), out.view_mut());
        assert_eq!(out, Array1::from(vec![11.0, 22.0]));
    }

    #[test]
    fn without_prior_leaves_out_untouched() {
        let signal = SignalMap::new("m", 1, 2, 1);
        let x = Array1::from(vec![2.0, 4.0]);
        let mut out = Array1::from(vec![10.0, 20.0]);
        signal.prior(x.view(), out.view_mut());
        assert_eq!(out, Array1::from(vec![10.0, 20.0]));
    }
}
