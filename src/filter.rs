// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! TOD filter and weight extension points (spec §4.2's `filters`,
//! `filters2`, `weights`). Telescope-specific members of this family
//! (pickup subtraction, HWP notch filtering, ...) are out of scope; only
//! the generic, telescope-agnostic members ship here, the way the
//! reference implementation's own `FilterPickup`/`FilterHWPNotch` live
//! alongside a plain windowing/gapfill pair.

use ndarray::Array2;

use crate::eqsys::TodFilter;
use crate::scan::Scan;

/// A symmetric weighting applied on both sides of `N^-1`
/// (`weight(scan, tod)` then `N^-1` then `weight(scan, tod)` again,
/// reversed): interpreted as a position-dependent modification of the
/// noise model rather than a one-shot preprocessing filter, per spec
/// §4.2's `A()` skeleton.
pub trait TodWeight: Send + Sync {
    fn apply(&self, scan: &Scan, tod: &mut Array2<f64>);
}

/// Cosine-tapered window applied at both ends of every detector's
/// timestream, so the noise model and pointing operator never see a sharp
/// edge discontinuity at scan boundaries.
pub struct WindowFilter {
    pub taper_samples: usize,
}

impl TodWeight for WindowFilter {
    fn apply(&self, _scan: &Scan, tod: &mut Array2<f64>) {
        let nsamp = tod.shape()[1];
        let taper = self.taper_samples.min(nsamp / 2);
        if taper == 0 {
            return;
        }
        for i in 0..taper {
            let w = 0.5 * (1.0 - (std::f64::consts::PI * i as f64 / taper as f64).cos());
            for mut row in tod.outer_iter_mut() {
                row[i] *= w;
                let j = nsamp - 1 - i;
                row[j] *= w;
            }
        }
    }
}

/// Replace every cut sample with a constant value (commonly zero), so
/// filters and noise-model fits downstream never see whatever garbage the
/// raw TOD held on a cut range.
pub struct GapfillFilter {
    pub fill_value: f64,
}

impl TodFilter for GapfillFilter {
    fn apply(&self, scan: &Scan, tod: &mut Array2<f64>) {
        let parts = scan.cut.parts();
        // One rangelist shared by every detector, or one per detector.
        let per_det = parts.len() == scan.ndet;
        for (d, mut row) in tod.outer_iter_mut().enumerate() {
            let part = if per_det { &parts[d] } else { &parts[0] };
            for &(start, end) in part.ranges() {
                row.slice_mut(ndarray::s![start..end]).fill(self.fill_value);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rangelist::{Multirange, Rangelist};
    use crate::scan::{CutPointing, NoiseModel, PointingOperator};
    use ndarray::{Array1, ArrayView1, ArrayView2, ArrayView3, ArrayViewMut1, ArrayViewMut2, ArrayViewMut3};

    struct NoPointing;
    impl PointingOperator for NoPointing {
        fn forward(&self, _area: ArrayView3<f64>, _tod: ArrayViewMut2<f64>) {}
        fn backward(&self, _tod: ArrayView2<f64>, _area: ArrayViewMut3<f64>) {}
    }
    struct NoCut;
    impl CutPointing for NoCut {
        fn njunk(&self) -> usize {
            0
        }
        fn forward(&self, _junk: ArrayView1<f64>, _tod: ArrayViewMut2<f64>) {}
        fn backward(&self, _tod: ArrayView2<f64>, _junk: ArrayViewMut1<f64>) {}
    }
    struct UnitNoise;
    impl NoiseModel for UnitNoise {
        fn apply(&self, _tod: ArrayViewMut2<f64>) {}
        fn white(&self, _tod: ArrayViewMut2<f64>) {}
        fn diag(&self) -> Array1<f64> {
            Array1::ones(1)
        }
        fn bins(&self) -> ArrayView2<f64> {
            unimplemented!()
        }
        fn icovs(&self) -> &[ndarray::Array2<f64>] {
            &[]
        }
        fn refit(&self, _tod: ArrayView2<f64>, _srate: f64) -> Box<dyn NoiseModel> {
            Box::new(UnitNoise)
        }
    }

    fn scan_with_cut(nsamp: usize, cut: Multirange) -> Scan {
        Scan {
            id: "s".into(),
            ndet: 1,
            nsamp,
            srate: 100.0,
            cut,
            pointing: Box::new(NoPointing),
            cut_pointing: Box::new(NoCut),
            noise: Box::new(UnitNoise),
            phase_pointing: None,
            buddy_pointings: Vec::new(),
            buddy_comps: Vec::new(),
            comps: std::sync::Mutex::new(Array2::zeros((1, 1))),
            data: Array2::zeros((1, nsamp)),
        }
    }

    #[test]
    fn window_filter_tapers_edges_to_zero() {
        let scan = scan_with_cut(8, Multirange::new(vec![Rangelist::empty(8)]));
        let mut tod = Array2::<f64>::ones((1, 8));
        let filter = WindowFilter { taper_samples: 2 };
        filter.apply(&scan, &mut tod);
        approx::assert_abs_diff_eq!(tod[[0, 0]], 0.0, epsilon = 1e-10);
        approx::assert_abs_diff_eq!(tod[[0, 7]], 0.0, epsilon = 1e-10);
        approx::assert_abs_diff_eq!(tod[[0, 4]], 1.0, epsilon = 1e-10);
    }

    #[test]
    fn gapfill_overwrites_cut_ranges() {
        let cut = Multirange::new(vec![Rangelist::new(vec![(2, 4)], 8).unwrap()]);
        let scan = scan_with_cut(8, cut);
        let mut tod = Array2::<f64>::ones((1, 8));
        GapfillFilter { fill_value: 0.0 }.apply(&scan, &mut tod);
        assert_eq!(tod[[0, 2]], 0.0);
        assert_eq!(tod[[0, 3]], 0.0);
        assert_eq!(tod[[0, 0]], 1.0);
    }
}
