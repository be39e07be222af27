// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The CMB map-making normal-equations engine.
//!
//! Solves `(P^T N^-1 P) m = P^T N^-1 d` for a sky map `m` jointly with a
//! per-scan junk vector absorbing cut samples, given an external pointing
//! operator `P` and noise model `N` per scan. See `SPEC_FULL.md` for the
//! full design; in short, the crate is layered leaves-first:
//!
//! * [`dof`] — the flat degrees-of-freedom packer the solver operates on.
//! * [`signal`] — the per-unknown projectors (sky map, junk, phase, ...).
//! * [`eqsys`] — combines scans and signals into `A`, `b`, `M`.
//! * [`precond`] — the preconditioner family approximating `A^-1`.
//! * [`grouping`] — scan grouping and effective-scan synthesis feeding the
//!   submap preconditioner's coarser level.
//!
//! Detector I/O, pointing-matrix and FFT/BLAS kernel implementations,
//! noise estimation, file formats, CLI/config loading and MPI transport
//! are external collaborators; this crate only defines the trait seams
//! they plug into ([`scan`], [`comm`]).

pub mod comm;
pub mod config;
pub mod dof;
pub mod eqsys;
pub mod error;
pub mod fft;
pub mod filter;
pub mod grouping;
pub mod logging;
pub mod mask;
pub mod precond;
pub mod prior;
pub mod rangelist;
pub mod scan;
pub mod signal;
pub mod writer;

pub use error::MapmakerError;
