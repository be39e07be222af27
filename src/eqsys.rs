// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The joint equation system `(P^T N^-1 P) m = P^T N^-1 d`, generalized to
//! an arbitrary ordered list of signals sharing one packed degrees-of-
//! freedom vector.

use ndarray::{Array1, Array2, ArrayView1, ArrayViewMut1};
use rayon::prelude::*;

use crate::comm::Comm;
use crate::dof::{Dof, DofPartSpec};
use crate::error::EqsysError;
use crate::filter::TodWeight;
use crate::scan::Scan;
use crate::signal::Signal;

/// A TOD filter applied to a scan's time-ordered data before (`filters`) or
/// after (`filters2`) the noise model is refit in `calc_b`. See
/// `SPEC_FULL.md` §4.5: this is the extension point the original
/// per-telescope filter list (pickup removal, HWP notch, ...) would plug
/// into; only telescope-agnostic filters ship in this crate (see
/// [`crate::filter`]).
pub trait TodFilter: Send + Sync {
    fn apply(&self, scan: &Scan, tod: &mut Array2<f64>);
}

pub struct Eqsys {
    signals: Vec<Box<dyn Signal>>,
    scans: Vec<Scan>,
    /// Applied once in `calc_b`, before the noise model is refit.
    filters: Vec<Box<dyn TodFilter>>,
    /// Applied once in `calc_b`, between the noise refit and `N^-1`.
    filters2: Vec<Box<dyn TodFilter>>,
    /// Symmetric windowing applied on both sides of `N^-1` in both `a()`
    /// and `calc_b()`.
    weights: Vec<Box<dyn TodWeight>>,
    dof: Dof,
}

impl Eqsys {
    /// Build an equation system from a signal list and the scans it acts
    /// on. At most one signal may be a cut signal, and if present it must
    /// be the first in `signals` — that ordering is what makes `a()`
    /// forward-project in reverse order (cut projected last, so it
    /// overwrites) and backward-project in forward order (cut extracted
    /// first), so the cut signal's value always wins on a cut sample.
    pub fn new(
        signals: Vec<Box<dyn Signal>>,
        scans: Vec<Scan>,
        filters: Vec<Box<dyn TodFilter>>,
        filters2: Vec<Box<dyn TodFilter>>,
        weights: Vec<Box<dyn TodWeight>>,
    ) -> Result<Self, EqsysError> {
        if signals.is_empty() {
            return Err(EqsysError::NoSignals);
        }
        for (i, s) in signals.iter().enumerate() {
            if s.is_cut() && i != 0 {
                return Err(EqsysError::CutSignalNotFirst(s.name().to_string()));
            }
        }
        let parts = signals
            .iter()
            .map(|s| DofPartSpec::new(s.name(), s.dof_len(), !s.is_cut()))
            .collect();
        Ok(Eqsys { signals, scans, filters, filters2, weights, dof: Dof::new(parts) })
    }

    pub fn dof(&self) -> &Dof {
        &self.dof
    }

    pub fn scans(&self) -> &[Scan] {
        &self.scans
    }

    fn apply_filters(list: &[Box<dyn TodFilter>], scan: &Scan, tod: &mut Array2<f64>) {
        for f in list {
            f.apply(scan, tod);
        }
    }

    fn apply_weights(&self, scan: &Scan, tod: &mut Array2<f64>) {
        for w in &self.weights {
            w.apply(scan, tod);
        }
    }

    fn apply_weights_reverse(&self, scan: &Scan, tod: &mut Array2<f64>) {
        for w in self.weights.iter().rev() {
            w.apply(scan, tod);
        }
    }

    /// Zero every cut sample in `tod`, one rangelist per detector or one
    /// shared across all of them. Called right after the cut signal's
    /// backward extraction, so that every signal registered after it sees
    /// a cut sample as exactly zero and contributes nothing from it to its
    /// own normal equations. Paired with the overwrite `forward` does on
    /// its own covered samples (see `CutPointing::forward`), this keeps
    /// `A` symmetric: a cut sample's final TOD value, and the only signal
    /// ever credited with explaining it, is always the junk vector.
    fn zero_cut_samples(scan: &Scan, tod: &mut Array2<f64>) {
        let parts = scan.cut.parts();
        if parts.is_empty() {
            return;
        }
        let per_det = parts.len() == scan.ndet;
        for (d, mut row) in tod.outer_iter_mut().enumerate() {
            let part = if per_det { &parts[d] } else { &parts[0] };
            for &(start, end) in part.ranges() {
                row.slice_mut(ndarray::s![start..end]).fill(0.0);
            }
        }
    }

    /// `y = (P^T N^-1 P) x`, accumulated across every scan this rank owns
    /// and reduced across the communicator for shared signals.
    pub fn a(&mut self, x: ArrayView1<f64>, comm: &dyn Comm) -> Array1<f64> {
        let parts = self.dof.unzip(x).expect("x was packed by this system's own dof layout");

        let contributions: Vec<Array1<f64>> = self
            .scans
            .par_iter()
            .map(|scan| {
                for signal in self.signals.iter() {
                    signal.precompute(scan);
                }
                let mut tod = Array2::<f64>::zeros(scan.tod_shape());
                // Forward in reverse signal order: every other signal is
                // projected first here, then the cut signal (first in
                // `self.signals`) is projected last so it overwrites their
                // contribution on its own samples, then...
                for (signal, part) in self.signals.iter().zip(parts.iter()).rev() {
                    signal.forward(scan, part.view(), tod.view_mut());
                }
                self.apply_weights(scan, &mut tod);
                scan.noise.apply(tod.view_mut());
                self.apply_weights_reverse(scan, &mut tod);
                let mut local = self.dof.zero_parts();
                // ...backward in forward signal order, so the cut signal
                // (first) absorbs the noise-weighted residual first; its
                // cut samples are then zeroed out of `tod` so no later
                // signal's normal equations see any contribution from a
                // cut sample (spec §4.2: "other signals then zero cut
                // samples").
                for (i, (signal, out)) in self.signals.iter().zip(local.iter_mut()).enumerate() {
                    signal.backward(scan, tod.view(), out.view_mut());
                    if i == 0 && signal.is_cut() {
                        Self::zero_cut_samples(scan, &mut tod);
                    }
                }
                for signal in self.signals.iter() {
                    signal.free(scan);
                }
                self.dof.zip(&local.iter().map(|a| a.view()).collect::<Vec<_>>()).unwrap()
            })
            .collect();

        let mut y = Array1::<f64>::zeros(self.dof.total_len());
        for c in &contributions {
            y += c;
        }
        let mut parts = self.dof.unzip(y.view()).unwrap();
        for (signal, out) in self.signals.iter_mut().zip(parts.iter_mut()) {
            signal.finish(out.view_mut(), comm);
        }
        let x_parts = self.dof.unzip(x).unwrap();
        for (idx, signal) in self.signals.iter().enumerate() {
            let mut lambda = Array1::<f64>::zeros(signal.dof_len());
            signal.prior(x_parts[idx].view(), lambda.view_mut());
            parts[idx] += &lambda;
        }
        self.dof.zip(&parts.iter().map(|p| p.view()).collect::<Vec<_>>()).unwrap()
    }

    /// `b = P^T N^-1 d`. Noise models are refit to each scan's data
    /// exactly once per call, before `N^-1` is applied: `filters` runs on
    /// the raw TOD, the noise model refits against the filtered TOD,
    /// `filters2` runs, then `N^-1`.
    pub fn calc_b(&mut self, comm: &dyn Comm) -> Array1<f64> {
        let mut contributions = Vec::with_capacity(self.scans.len());
        for scan in &mut self.scans {
            let mut tod = scan.data.clone();
            Self::apply_filters(&self.filters, scan, &mut tod);
            self.apply_weights(scan, &mut tod);
            scan.noise = scan.noise.refit(tod.view(), scan.srate);
            Self::apply_filters(&self.filters2, scan, &mut tod);
            scan.noise.apply(tod.view_mut());
            self.apply_weights_reverse(scan, &mut tod);
            let mut out = self.dof.zero_parts();
            for signal in self.signals.iter() {
                signal.precompute(scan);
            }
            for (i, (signal, o)) in self.signals.iter().zip(out.iter_mut()).enumerate() {
                signal.backward(scan, tod.view(), o.view_mut());
                if i == 0 && signal.is_cut() {
                    Self::zero_cut_samples(scan, &mut tod);
                }
            }
            for signal in self.signals.iter() {
                signal.free(scan);
            }
            contributions.push(self.dof.zip(&out.iter().map(|a| a.view()).collect::<Vec<_>>()).unwrap());
        }
        let mut b = Array1::<f64>::zeros(self.dof.total_len());
        for c in &contributions {
            b += c;
        }
        let mut parts = self.dof.unzip(b.view()).unwrap();
        for (signal, out) in self.signals.iter_mut().zip(parts.iter_mut()) {
            signal.finish(out.view_mut(), comm);
        }
        self.dof.zip(&parts.iter().map(|p| p.view()).collect::<Vec<_>>()).unwrap()
    }

    /// Run each signal's post-solve chain on the converged solution,
    /// in place.
    pub fn postprocess(&self, x: ArrayViewMut1<f64>) {
        let mut offset = 0;
        let mut x = x;
        for (signal, spec) in self.signals.iter().zip(self.dof.parts().iter()) {
            signal.post(x.slice_mut(ndarray::s![offset..offset + spec.len]));
            offset += spec.len;
        }
    }

    pub fn dot(&self, a: ArrayView1<f64>, b: ArrayView1<f64>, comm: &dyn Comm) -> f64 {
        self.dof.dot(a, b, comm)
    }
}

#[cfg(test)]
mod tests {
    //! End-to-end scenarios from `SPEC_FULL.md` §8: a trivial one-scan map
    //! solve, and the same solve with one detector fully cut.

    use super::*;
    use crate::comm::SingleProcessComm;
    use crate::rangelist::{Multirange, Rangelist};
    use crate::scan::{CutPointing, NoiseModel, PointingOperator};
    use crate::signal::cut::SignalCut;
    use crate::signal::map::SignalMap;
    use ndarray::{array, Array1, Array2, ArrayView1, ArrayView2, ArrayView3, ArrayViewMut1, ArrayViewMut2, ArrayViewMut3};

    /// Detector `d` points straight at pixel `d`, for every sample: an
    /// `ndet`-detector, `ndet`-pixel identity pointing.
    struct IdentityPointing;
    impl PointingOperator for IdentityPointing {
        fn forward(&self, area: ArrayView3<f64>, mut tod: ArrayViewMut2<f64>) {
            for d in 0..tod.shape()[0].min(area.shape()[1]) {
                let v = area[[0, d, 0]];
                for s in 0..tod.shape()[1] {
                    tod[[d, s]] += v;
                }
            }
        }
        fn backward(&self, tod: ArrayView2<f64>, mut area: ArrayViewMut3<f64>) {
            for d in 0..tod.shape()[0].min(area.shape()[1]) {
                area[[0, d, 0]] += tod.row(d).sum();
            }
        }
    }

    /// One junk value per sample of detector 0, covering every sample
    /// (used to model "all of detector 0 is cut"). `forward` overwrites
    /// rather than accumulates, per the dominance contract documented on
    /// `CutPointing::forward`.
    struct Det0Cut;
    impl CutPointing for Det0Cut {
        fn njunk(&self) -> usize {
            16
        }
        fn forward(&self, junk: ArrayView1<f64>, mut tod: ArrayViewMut2<f64>) {
            for s in 0..junk.len() {
                tod[[0, s]] = junk[s];
            }
        }
        fn backward(&self, tod: ArrayView2<f64>, mut junk: ArrayViewMut1<f64>) {
            for s in 0..junk.len() {
                junk[s] += tod[[0, s]];
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

    /// `N^-1 = I`.
    struct UnitNoise(usize);
    impl NoiseModel for UnitNoise {
        fn apply(&self, _tod: ArrayViewMut2<f64>) {}
        fn white(&self, _tod: ArrayViewMut2<f64>) {}
        fn diag(&self) -> Array1<f64> {
            Array1::ones(self.0)
        }
        fn bins(&self) -> ArrayView2<f64> {
            unimplemented!("not needed by these end-to-end scenarios")
        }
        fn icovs(&self) -> &[Array2<f64>] {
            &[]
        }
        fn refit(&self, _tod: ArrayView2<f64>, _srate: f64) -> Box<dyn NoiseModel> {
            Box::new(UnitNoise(self.0))
        }
    }

    /// Two detectors, 16 samples each, unit noise, no cuts.
    fn trivial_scan(d0: f64, d1: f64) -> Scan {
        let mut data = Array2::<f64>::zeros((2, 16));
        data.row_mut(0).fill(d0);
        data.row_mut(1).fill(d1);
        Scan {
            id: "s".into(),
            ndet: 2,
            nsamp: 16,
            srate: 100.0,
            cut: Multirange::new(vec![Rangelist::empty(16), Rangelist::empty(16)]),
            pointing: Box::new(IdentityPointing),
            cut_pointing: Box::new(NoCut),
            noise: Box::new(UnitNoise(2)),
            phase_pointing: None,
            buddy_pointings: Vec::new(),
            buddy_comps: Vec::new(),
            comps: std::sync::Mutex::new(Array2::zeros((2, 1))),
            data,
        }
    }

    /// A handful of unpreconditioned CG iterations, good enough for the
    /// well-conditioned toy systems these scenarios exercise (see also
    /// `precond::submap::Submap::inner_cg`, which follows the same shape).
    fn solve_cg(eqsys: &mut Eqsys, b: &Array1<f64>, comm: &dyn Comm, iters: usize) -> Array1<f64> {
        let n = b.len();
        let mut x = Array1::<f64>::zeros(n);
        let mut r = b.clone();
        let mut p = r.clone();
        let mut rr_old: f64 = eqsys.dot(r.view(), r.view(), comm);
        for _ in 0..iters {
            if rr_old.abs() < 1e-28 {
                break;
            }
            let ap = eqsys.a(p.view(), comm);
            let pap = eqsys.dot(p.view(), ap.view(), comm);
            if pap.abs() < 1e-300 {
                break;
            }
            let alpha = rr_old / pap;
            x = &x + &(&p * alpha);
            r = &r - &(&ap * alpha);
            let rr_new = eqsys.dot(r.view(), r.view(), comm);
            let beta = rr_new / rr_old;
            p = &r + &(&p * beta);
            rr_old = rr_new;
        }
        x
    }

    #[test]
    fn trivial_map_one_cg_iteration_recovers_per_pixel_mean() {
        // Scenario 1: identity pointing, unit noise, no cuts. `A` is a
        // scalar multiple of the identity (both pixels see 16 samples),
        // so one unpreconditioned CG iteration from x=0 is exact.
        let scan = trivial_scan(1.0, -1.0);
        let signal: Box<dyn Signal> = Box::new(SignalMap::new("m", 1, 2, 1));
        let mut eqsys = Eqsys::new(vec![signal], vec![scan], vec![], vec![], vec![]).unwrap();
        let comm = SingleProcessComm;
        let b = eqsys.calc_b(&comm);
        let m = solve_cg(&mut eqsys, &b, &comm, 1);
        approx::assert_abs_diff_eq!(m[0], 1.0, epsilon = 1e-10);
        approx::assert_abs_diff_eq!(m[1], -1.0, epsilon = 1e-10);
    }

    #[test]
    fn cut_signal_must_be_registered_first() {
        let scan = trivial_scan(1.0, -1.0);
        let map: Box<dyn Signal> = Box::new(SignalMap::new("m", 1, 2, 1));
        let cut: Box<dyn Signal> = Box::new(SignalCut::new("cut", std::slice::from_ref(&scan)));
        let err = Eqsys::new(vec![map, cut], vec![scan], vec![], vec![], vec![]).unwrap_err();
        assert!(matches!(err, EqsysError::CutSignalNotFirst(_)));
    }

    #[test]
    fn fully_cut_detector_is_absorbed_by_junk_leaving_the_other_pixel_unaffected() {
        // Scenario 2: same as scenario 1, but every sample of detector 0
        // is cut. The junk vector should fully absorb detector 0's
        // contribution, decoupling pixel A's normal equations from it
        // entirely: pixel B's solution must be identical to scenario 1,
        // and pixel A's own equation collapses to the singular (masked)
        // case of seeing no data at all.
        let mut scan = trivial_scan(1.0, -1.0);
        scan.cut = Multirange::new(vec![Rangelist::full(16), Rangelist::empty(16)]);
        scan.cut_pointing = Box::new(Det0Cut);

        let cut: Box<dyn Signal> = Box::new(SignalCut::new("cut", std::slice::from_ref(&scan)));
        let map: Box<dyn Signal> = Box::new(SignalMap::new("m", 1, 2, 1));
        let mut eqsys = Eqsys::new(vec![cut, map], vec![scan], vec![], vec![], vec![]).unwrap();
        let comm = SingleProcessComm;
        let b = eqsys.calc_b(&comm);

        // Pixel B (detector 1, untouched by the cut) is unconstrained by
        // detector 0: its column of `b` and of `A` only ever involve
        // detector 1's samples, so it must reproduce scenario 1's answer
        // regardless of how many CG iterations run.
        let x = solve_cg(&mut eqsys, &b, &comm, 20);
        let parts = eqsys.dof().unzip(x.view()).unwrap();
        let map_part = &parts[1];
        approx::assert_abs_diff_eq!(map_part[1], -1.0, epsilon = 1e-8);

        // Pixel A's own normal equation, restricted to the map block, is
        // identically zero once cut samples are zeroed before the map's
        // backward projection: `A` applied to a pure pixel-A unit map
        // produces zero in the map block, i.e. detector 0 contributes no
        // hits to pixel A at all.
        let mut unit = Array1::<f64>::zeros(eqsys.dof().total_len());
        unit[eqsys.dof().parts()[0].len] = 1.0; // first map-DOF entry, right after the junk block
        let ax = eqsys.a(unit.view(), &comm);
        let ax_parts = eqsys.dof().unzip(ax.view()).unwrap();
        approx::assert_abs_diff_eq!(ax_parts[1][0], 0.0, epsilon = 1e-10);
    }

    #[test]
    fn symmetry_holds_for_random_vectors() {
        // Algebraic property from SPEC_FULL.md §8: dot(y, A(x)) == dot(x, A(y)).
        let scan = trivial_scan(1.0, -1.0);
        let signal: Box<dyn Signal> = Box::new(SignalMap::new("m", 1, 2, 1));
        let mut eqsys = Eqsys::new(vec![signal], vec![scan], vec![], vec![], vec![]).unwrap();
        let comm = SingleProcessComm;
        let x = array![0.3, -1.7];
        let y = array![2.1, 0.5];
        let ax = eqsys.a(x.view(), &comm);
        let ay = eqsys.a(y.view(), &comm);
        let lhs = eqsys.dot(y.view(), ax.view(), &comm);
        let rhs = eqsys.dot(x.view(), ay.view(), &comm);
        approx::assert_abs_diff_eq!(lhs, rhs, epsilon = 1e-10);
    }

    #[test]
    fn positivity_holds_for_a_random_vector() {
        let scan = trivial_scan(1.0, -1.0);
        let signal: Box<dyn Signal> = Box::new(SignalMap::new("m", 1, 2, 1));
        let mut eqsys = Eqsys::new(vec![signal], vec![scan], vec![], vec![], vec![]).unwrap();
        let comm = SingleProcessComm;
        let x = array![0.3, -1.7];
        let ax = eqsys.a(x.view(), &comm);
        let dot = eqsys.dot(x.view(), ax.view(), &comm);
        assert!(dot >= 0.0);
    }
}
