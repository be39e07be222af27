// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Solver-wide configuration, snapshotted once up front and threaded
//! through the equation system and preconditioners as a plain value
//! rather than read from global state at arbitrary points.

use serde::{Deserialize, Serialize};

/// Configuration shared by the equation system and every preconditioner
/// that needs it. Constructed once by the caller and passed by reference;
/// nothing in this crate mutates it after construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolverConfig {
    /// Upper bound on the polarization condition number
    /// `lambda_max/lambda_min` of a pixel's `div` block before the pixel
    /// is masked out. Default matches the reference implementation.
    pub precond_condition_lim: f64,

    /// Eigenvalues below `eig_limit * lambda_max` are treated as zero when
    /// pseudo-inverting a per-pixel `div` block in the binned
    /// preconditioner.
    pub eig_limit: f64,

    /// Number of inner conjugate-gradient iterations run by the submap
    /// preconditioner on its coarser system.
    pub submap_inner_iters: usize,

    /// Oversampling factor `k` used when synthesizing a representative
    /// scan for an effective-scan group.
    pub group_oversample: usize,

    /// Componentwise scan-direction vector tolerance used when deciding
    /// whether two scans belong to the same group.
    pub group_vectol: f64,

    /// Scan-axis position tolerance used by the same grouping decision.
    pub group_postol: f64,

    /// Multiplier on `median(diag(N))` above which a TOD preconditioner's
    /// per-sample noise weight is clamped, to keep pathologically noisy
    /// samples from dominating the diagonal approximation.
    pub tod_maxnoise: f64,
}

impl Default for SolverConfig {
    fn default() -> Self {
        SolverConfig {
            precond_condition_lim: 10.0,
            eig_limit: 1e-6,
            submap_inner_iters: 20,
            group_oversample: 2,
            group_vectol: 0.1,
            group_postol: 0.1,
            tod_maxnoise: 10.0,
        }
    }
}
