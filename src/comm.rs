// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The collective-communication seam. The reference implementation runs
//! one process per group of scans and synchronizes shared signals (full
//! sky maps, effective noise models) via MPI collectives. MPI transport
//! itself is out of scope here; [`Comm`] is the trait an embedder
//! implements to plug a real transport in, and [`SingleProcessComm`] is
//! the trivial single-rank implementation this crate tests against.

use ndarray::ArrayViewMut1;

/// A minimal collective-communication interface. All collectives here are
/// synchronous: every rank that owns a shared signal is expected to call
/// the same sequence of `Comm` methods for that signal in the same order.
pub trait Comm: Send + Sync {
    /// This process's rank, in `0..size()`.
    fn rank(&self) -> usize;

    /// The number of ranks taking part in this communicator.
    fn size(&self) -> usize;

    /// Sum `buf` element-wise across every rank, leaving the result in
    /// `buf` on every rank (an MPI `Allreduce` with `MPI_SUM`).
    fn allreduce_sum_inplace(&self, buf: ArrayViewMut1<f64>);

    /// Gather `local` from every rank and concatenate the results in rank
    /// order on every rank (an MPI `Allgatherv`). Used by scan grouping to
    /// exchange per-scan summaries before forming groups.
    fn allreduce_concat_usize(&self, local: Vec<usize>) -> Vec<usize>;
}

/// The trivial single-process communicator: rank 0 of 1, every collective
/// is the identity. This is what this crate's own tests run against, and
/// what a caller with no real distributed transport should use.
#[derive(Debug, Default, Clone, Copy)]
pub struct SingleProcessComm;

impl Comm for SingleProcessComm {
    fn rank(&self) -> usize {
        0
    }

    fn size(&self) -> usize {
        1
    }

    fn allreduce_sum_inplace(&self, _buf: ArrayViewMut1<f64>) {
        // Nothing to reduce across a communicator of size one.
    }

    fn allreduce_concat_usize(&self, local: Vec<usize>) -> Vec<usize> {
        local
    }
}
