// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The signal abstraction: one degree-of-freedom block of the joint
//! solution vector (the sky map, a per-scan junk vector, a phase map, ...)
//! together with how it projects to and from time-ordered data.
//!
//! Signals are registered with an [`crate::eqsys::Eqsys`] in a fixed
//! order. Forward projection (DOF -> TOD) runs in *reverse* registration
//! order and backward projection (TOD -> DOF) runs in *forward*
//! registration order, so that whichever signal is registered first — by
//! convention the cut signal — is applied to the TOD last on the way out
//! and first on the way back in. That ordering is what lets the cut
//! signal dominate: a cut sample's value is whatever the junk vector says
//! it is, regardless of what every other signal projected into it.

pub mod buddies;
pub mod cut;
pub mod helpers;
pub mod map;
pub mod phase;

use ndarray::{ArrayView1, ArrayView2, ArrayViewMut1, ArrayViewMut2};

use crate::comm::Comm;
use crate::scan::Scan;

/// One block of degrees of freedom and its projection to/from TOD.
pub trait Signal: Send + Sync {
    fn name(&self) -> &str;

    /// Number of degrees of freedom this signal contributes to the packed
    /// solution vector.
    fn dof_len(&self) -> usize;

    /// Whether this is a cut-type signal (must be registered first; see
    /// the module-level ordering note).
    fn is_cut(&self) -> bool {
        false
    }

    /// Allocate or refresh any per-scan working state (e.g. a cached
    /// pointing matrix) before a sequence of `forward`/`backward` calls
    /// that touch `scan`. Always paired with exactly one later `free`
    /// call for the same scan, even on an error path. Scans may be
    /// processed concurrently (see `Eqsys::a`), so an implementation that
    /// actually caches per-scan state must do so behind interior
    /// mutability (e.g. a per-scan-keyed `Mutex`/`RefCell`), not a `&mut
    /// self` field shared across scans.
    fn precompute(&self, _scan: &Scan) {}

    /// Release whatever `precompute` set up for `scan`.
    fn free(&self, _scan: &Scan) {}

    /// Project this signal's degrees of freedom into `tod`, accumulating
    /// (not overwriting) into whatever `tod` already holds. A signal with
    /// no contribution from `scan` (e.g. a per-scan junk vector for a scan
    /// this rank does not own) is a silent no-op, not an error. The cut
    /// signal is the one documented exception: since it is always
    /// projected last (see above), its own covered samples overwrite
    /// rather than add, which is what makes it dominate. See
    /// [`crate::scan::CutPointing::forward`].
    fn forward(&self, scan: &Scan, x: ArrayView1<f64>, tod: ArrayViewMut2<f64>);

    /// Project `tod` back into this signal's degrees of freedom,
    /// accumulating into `out`.
    fn backward(&self, scan: &Scan, tod: ArrayView2<f64>, out: ArrayViewMut1<f64>);

    /// Add this signal's optional prior term `Λ(x)` into `out`,
    /// accumulating.
    fn prior(&self, _x: ArrayView1<f64>, _out: ArrayViewMut1<f64>) {}

    /// Called exactly once per signal per `A`/`calc_b` invocation, after
    /// every scan's `backward` has accumulated into `out`, to let shared
    /// signals reduce their rank-local partial sums across the
    /// communicator. A signal whose degrees of freedom are not shared
    /// across ranks leaves `out` untouched.
    fn finish(&mut self, _out: ArrayViewMut1<f64>, _comm: &dyn Comm) {}

    /// Persist this signal's degrees of freedom via the external
    /// write collaborator, named `{prefix}{name}_{tag}`. A signal with
    /// nothing of its own worth persisting (most synthetic signals used
    /// only inside a submap preconditioner's coarse system) is a no-op.
    fn write(&self, _prefix: &str, _tag: &str, _x: ArrayView1<f64>) {}

    /// Run this signal's post-solve chain in place on its converged
    /// degrees of freedom (e.g. a final calibration pass). Most signals
    /// have none.
    fn post(&self, _x: ArrayViewMut1<f64>) {}
}
