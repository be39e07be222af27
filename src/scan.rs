// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Concrete data carried by each observation and the trait seams through
//! which telescope-specific pointing and noise behaviour is supplied.
//!
//! [`Scan`] and [`Area`] own plain `ndarray` buffers, the same way the
//! teacher keeps visibility/model data in concrete arrays. The operators
//! that act on them — how a sky position maps to a time sample, how noise
//! is weighted — are external collaborators supplied as trait objects,
//! mirroring the teacher's `dyn Beam`.

use ndarray::{Array1, Array2, Array3, ArrayView1, ArrayView2, ArrayView3, ArrayViewMut1, ArrayViewMut2, ArrayViewMut3};

use crate::rangelist::Multirange;

/// A sky area: a pixelized map with `ncomp` Stokes-like components (e.g.
/// T, Q, U) over a 2-D pixel grid.
#[derive(Debug, Clone)]
pub struct Area {
    /// `[ncomp, ny, nx]`.
    pub data: Array3<f64>,
}

impl Area {
    pub fn zeros(ncomp: usize, ny: usize, nx: usize) -> Self {
        Area { data: Array3::zeros((ncomp, ny, nx)) }
    }

    pub fn ncomp(&self) -> usize {
        self.data.shape()[0]
    }

    pub fn shape_yx(&self) -> (usize, usize) {
        (self.data.shape()[1], self.data.shape()[2])
    }

    pub fn view(&self) -> ArrayView3<f64> {
        self.data.view()
    }

    pub fn view_mut(&mut self) -> ArrayViewMut3<f64> {
        self.data.view_mut()
    }
}

/// One observation: a block of time-ordered data for `ndet` detectors over
/// `nsamp` samples, the cut-sample mask shared by all detectors in the
/// scan, and the detector-level pointing/noise collaborators.
pub struct Scan {
    pub id: String,
    pub ndet: usize,
    pub nsamp: usize,
    /// Sample rate in Hz, used by noise models and scan-direction analysis.
    pub srate: f64,
    /// Which samples are cut (shared across detectors at this layer; a
    /// per-detector cut mask is modeled as `Multirange` with one component
    /// per detector where finer granularity is needed).
    pub cut: Multirange,
    pub pointing: Box<dyn PointingOperator>,
    pub cut_pointing: Box<dyn CutPointing>,
    pub noise: Box<dyn NoiseModel>,
    /// Present only for scans that feed a phase (ground-pickup-like)
    /// signal.
    pub phase_pointing: Option<Box<dyn PhasePointing>>,
    /// Pointing operators for this scan's crosslink "buddies" — synthetic
    /// copies of the same scan at different boresight offsets, used by
    /// [`crate::signal::buddies::SignalMapBuddies`] to estimate how well a
    /// pixel's crosslink structure is resolved. Empty for scans that don't
    /// feed a buddies signal.
    pub buddy_pointings: Vec<Box<dyn PointingOperator>>,
    /// Per-buddy detector-component mixing matrix (`[ndet, ncomp]`), one
    /// per entry of `buddy_pointings`, read by the external multibeam
    /// pointing collaborator while that buddy's contribution is being
    /// projected. See [`with_temp_comps`].
    pub buddy_comps: Vec<Array2<f64>>,
    /// This scan's detector-component mixing matrix (`[ndet, ncomp]`),
    /// read by the external pointing collaborator. Wrapped in a `Mutex`
    /// rather than a plain field because [`Signal::forward`]/`backward`
    /// only ever see `&Scan` (scans are processed concurrently, one at a
    /// time each, in `Eqsys::a`; see the module doc on
    /// [`crate::signal::Signal::precompute`]), yet the crosslink-map
    /// helper and the buddies signal both need to temporarily swap this
    /// matrix out and back in. See [`with_temp_comps`].
    pub comps: std::sync::Mutex<Array2<f64>>,
    /// The raw `[ndet, nsamp]` sample matrix `d` this scan's detector I/O
    /// collaborator (out of scope, spec §1) has already loaded.
    /// `Eqsys::calc_b` reads this to build `b = P^T N^-1 d` unless the
    /// caller supplies an override TOD directly.
    pub data: Array2<f64>,
}

impl Scan {
    pub fn tod_shape(&self) -> (usize, usize) {
        (self.ndet, self.nsamp)
    }
}

/// Temporarily overwrite `scan.comps` with `temp` for the duration of `f`,
/// restoring whatever `comps` held before on every exit path — including a
/// panic unwinding through `f` — via `scopeguard`. Mirrors the reference
/// implementation's `calc_crosslink_map`/`FilterBuddyPertod`, both of which
/// save `scan.comps`, force a different component mixing for one pass over
/// the scan, and must put the original back before returning (spec §3
/// Lifecycle, §9).
pub fn with_temp_comps<R>(scan: &Scan, temp: Array2<f64>, f: impl FnOnce() -> R) -> R {
    let saved = std::mem::replace(&mut *scan.comps.lock().unwrap(), temp);
    let _restore = scopeguard::guard(saved, |saved| {
        *scan.comps.lock().unwrap() = saved;
    });
    f()
}

/// Maps between a sky [`Area`] and this scan's time-ordered data.
pub trait PointingOperator: Send + Sync {
    /// `area -> tod`, accumulating into `tod` (callers zero it first if a
    /// fresh projection, rather than an accumulation, is wanted).
    fn forward(&self, area: ArrayView3<f64>, tod: ArrayViewMut2<f64>);

    /// `tod -> area`, accumulating into `area`.
    fn backward(&self, tod: ArrayView2<f64>, area: ArrayViewMut3<f64>);
}

/// Maps between a per-scan junk vector (one degree of freedom per cut
/// range) and this scan's time-ordered data.
pub trait CutPointing: Send + Sync {
    /// Number of junk degrees of freedom this scan contributes.
    fn njunk(&self) -> usize;

    /// Write each junk value into its covered samples of `tod`, replacing
    /// whatever is already there rather than accumulating into it. Because
    /// the cut signal is registered first and so projected forward last
    /// (see the `signal` module doc comment), this overwrite is what makes
    /// the junk vector dominate: a cut sample's final TOD value is always
    /// exactly its junk value, never whatever an earlier signal left
    /// behind.
    fn forward(&self, junk: ArrayView1<f64>, tod: ArrayViewMut2<f64>);

    fn backward(&self, tod: ArrayView2<f64>, junk: ArrayViewMut1<f64>);
}

/// Maps between a per-detector phase map (one row per detector, one
/// column per azimuth/phase pixel) and this scan's time-ordered data, for
/// the ground-pickup-like phase signal.
pub trait PhasePointing: Send + Sync {
    /// Number of phase pixels per detector.
    fn nphase(&self) -> usize;

    fn forward(&self, phase: ArrayView2<f64>, tod: ArrayViewMut2<f64>);

    fn backward(&self, tod: ArrayView2<f64>, phase: ArrayViewMut2<f64>);
}

/// Rebins a sky [`Area`] between a fine and a coarse resolution (spec
/// §4.3.8's `PmatMapRebin`): `degrade` maps fine -> coarse (the adjoint
/// used by the multigrid bridge's `up`), `prolong` maps coarse -> fine
/// (`down`). An external collaborator: the actual pixel-averaging
/// weights depend on the coarse grid's world-coordinate mapping, which
/// this crate never constructs itself.
pub trait RebinPointing: Send + Sync {
    fn degrade(&self, fine: ArrayView3<f64>, coarse: ArrayViewMut3<f64>);
    fn prolong(&self, coarse: ArrayView3<f64>, fine: ArrayViewMut3<f64>);
}

/// Rebins a per-scan junk vector between a fine and coarse sample rate
/// (spec §4.3.8's `PmatCutRebin`), the junk-vector analogue of
/// [`RebinPointing`].
pub trait CutRebinPointing: Send + Sync {
    fn degrade(&self, fine: ArrayView1<f64>, coarse: ArrayViewMut1<f64>);
    fn prolong(&self, coarse: ArrayView1<f64>, fine: ArrayViewMut1<f64>);
}

/// The noise model `N` for one scan: applies `N^-1` (or its white-noise
/// approximation) in place to a TOD buffer, and exposes the Fourier-domain
/// description used by the circulant and effective-noise-model machinery.
pub trait NoiseModel: Send + Sync {
    /// Apply `N^-1` in place.
    fn apply(&self, tod: ArrayViewMut2<f64>);

    /// Apply the white-noise (diagonal) approximation to `N^-1` in place.
    /// Used by preconditioners that only need a cheap diagonal weight.
    fn white(&self, tod: ArrayViewMut2<f64>);

    /// Per-detector diagonal of the white-noise approximation to `N^-1`,
    /// length `ndet`.
    fn diag(&self) -> Array1<f64>;

    /// Frequency bin edges (Hz) of this model's piecewise-constant
    /// Fourier-domain covariance description.
    fn bins(&self) -> ArrayView2<f64>;

    /// One `ndet x ndet` covariance matrix per frequency bin.
    fn icovs(&self) -> &[Array2<f64>];

    /// Refit this noise model to new data at a (possibly different) sample
    /// rate, returning a fresh model. Noise models are refit once per
    /// equation-system `b()` evaluation; see `eqsys::Eqsys::calc_b`.
    fn refit(&self, tod: ArrayView2<f64>, srate: f64) -> Box<dyn NoiseModel>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn comps_scan(comps: Array2<f64>) -> Scan {
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
            fn icovs(&self) -> &[Array2<f64>] {
                &[]
            }
            fn refit(&self, _tod: ArrayView2<f64>, _srate: f64) -> Box<dyn NoiseModel> {
                Box::new(UnitNoise)
            }
        }
        Scan {
            id: "s".into(),
            ndet: comps.shape()[0],
            nsamp: 1,
            srate: 100.0,
            cut: Multirange::new(vec![]),
            pointing: Box::new(NoPointing),
            cut_pointing: Box::new(NoCut),
            noise: Box::new(UnitNoise),
            phase_pointing: None,
            buddy_pointings: Vec::new(),
            buddy_comps: Vec::new(),
            comps: std::sync::Mutex::new(comps),
            data: Array2::zeros((1, 1)),
        }
    }

    #[test]
    fn with_temp_comps_restores_on_normal_return() {
        let scan = comps_scan(array![[1.0, 0.0]]);
        let seen = with_temp_comps(&scan, array![[0.0, 1.0]], || scan.comps.lock().unwrap().clone());
        assert_eq!(seen, array![[0.0, 1.0]]);
        assert_eq!(*scan.comps.lock().unwrap(), array![[1.0, 0.0]]);
    }

    #[test]
    fn with_temp_comps_restores_on_panic() {
        let scan = comps_scan(array![[1.0, 0.0]]);
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            with_temp_comps(&scan, array![[0.0, 1.0]], || panic!("boom"));
        }));
        assert!(result.is_err());
        assert_eq!(*scan.comps.lock().unwrap(), array![[1.0, 0.0]]);
    }
}
