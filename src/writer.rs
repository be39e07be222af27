// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Persisted-output collaborator traits (spec §6). File formats (FITS,
//! HDF5) are out of scope; these traits are the seam a caller plugs a
//! real writer into, keyed by the same `{prefix}{name}_{tag}.{ext}`
//! naming scheme the reference implementation uses for its map, div,
//! hits, mask and junk outputs.
//!
//! Most callers should not need a custom [`MapWriter`]/[`JunkWriter`] —
//! [`NullWriter`] exists for callers (and this crate's own tests) that
//! don't want to wire in a real output collaborator at all.

use ndarray::{Array1, ArrayView3};

use crate::error::WriteError;

/// Persist a sky map (or map-shaped quantity: `div`, `hits`, `mask`) under
/// a name composed from `prefix`, `name` and `tag`.
pub trait MapWriter: Send + Sync {
    fn write_map(&self, prefix: &str, name: &str, tag: &str, data: ArrayView3<f64>) -> Result<(), WriteError>;
}

/// Persist a per-scan junk vector.
pub trait JunkWriter: Send + Sync {
    fn write_junk(&self, prefix: &str, name: &str, tag: &str, data: &Array1<f64>) -> Result<(), WriteError>;
}

/// Compose the `{prefix}{name}_{tag}.{ext}` output filename spec §6
/// specifies, for a writer that wants to hand off a single path string to
/// an external I/O library.
pub fn output_path(prefix: &str, name: &str, tag: &str, ext: &str) -> String {
    format!("{prefix}{name}_{tag}.{ext}")
}

/// The trivial writer: every write is a no-op. What this crate's own
/// tests and any caller with no persisted-output step use.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullWriter;

impl MapWriter for NullWriter {
    fn write_map(&self, _prefix: &str, _name: &str, _tag: &str, _data: ArrayView3<f64>) -> Result<(), WriteError> {
        Ok(())
    }
}

impl JunkWriter for NullWriter {
    fn write_junk(&self, _prefix: &str, _name: &str, _tag: &str, _data: &Array1<f64>) -> Result<(), WriteError> {
        Ok(())
    }
}
