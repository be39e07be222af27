// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The degrees-of-freedom packer: a bijection between the flat vector the
//! conjugate-gradient driver operates on and the heterogeneous collection
//! of per-signal work arrays (`m` the sky map, one junk vector per scan,
//! phase maps, ...) that the equation system actually computes with.
//!
//! A part is either *shared* (every rank holds an identical copy, e.g. the
//! sky map) or *distributed* (each rank holds a disjoint slice, e.g. a
//! scan's own junk vector). The distinction only matters for [`Dof::dot`]:
//! a shared part's contribution to a global inner product must be counted
//! exactly once across the whole communicator, not once per rank.

use ndarray::{Array1, ArrayView1};
use thiserror::Error;

use crate::comm::Comm;

#[derive(Error, Debug)]
pub enum DofError {
    #[error("part '{name}' has length {actual}, expected {expected}")]
    LengthMismatch { name: String, expected: usize, actual: usize },

    #[error("expected {expected} parts, got {actual}")]
    PartCountMismatch { expected: usize, actual: usize },

    #[error("flat vector has length {actual}, expected {expected}")]
    FlatLengthMismatch { expected: usize, actual: usize },
}

/// The shape of one part of the packed vector.
#[derive(Debug, Clone)]
pub struct DofPartSpec {
    pub name: String,
    pub len: usize,
    /// Whether this part is replicated identically across every rank
    /// (`true`) or partitioned across ranks (`false`).
    pub shared: bool,
}

impl DofPartSpec {
    pub fn new(name: impl Into<String>, len: usize, shared: bool) -> Self {
        DofPartSpec { name: name.into(), len, shared }
    }
}

/// A fixed layout describing how a set of named, possibly-shared parts
/// pack into one flat vector.
#[derive(Debug, Clone)]
pub struct Dof {
    parts: Vec<DofPartSpec>,
}

impl Dof {
    pub fn new(parts: Vec<DofPartSpec>) -> Self {
        Dof { parts }
    }

    pub fn parts(&self) -> &[DofPartSpec] {
        &self.parts
    }

    pub fn total_len(&self) -> usize {
        self.parts.iter().map(|p| p.len).sum()
    }

    /// Concatenate `parts` (in layout order) into one flat vector.
    pub fn zip(&self, parts: &[ArrayView1<f64>]) -> Result<Array1<f64>, DofError> {
        if parts.len() != self.parts.len() {
            return Err(DofError::PartCountMismatch {
                expected: self.parts.len(),
                actual: parts.len(),
            });
        }
        let mut flat = Array1::zeros(self.total_len());
        let mut offset = 0;
        for (spec, part) in self.parts.iter().zip(parts.iter()) {
            if part.len() != spec.len {
                return Err(DofError::LengthMismatch {
                    name: spec.name.clone(),
                    expected: spec.len,
                    actual: part.len(),
                });
            }
            flat.slice_mut(ndarray::s![offset..offset + spec.len]).assign(part);
            offset += spec.len;
        }
        Ok(flat)
    }

    /// Split a flat vector back into its named parts, in layout order.
    pub fn unzip(&self, flat: ArrayView1<f64>) -> Result<Vec<Array1<f64>>, DofError> {
        if flat.len() != self.total_len() {
            return Err(DofError::FlatLengthMismatch {
                expected: self.total_len(),
                actual: flat.len(),
            });
        }
        let mut out = Vec::with_capacity(self.parts.len());
        let mut offset = 0;
        for spec in &self.parts {
            out.push(flat.slice(ndarray::s![offset..offset + spec.len]).to_owned());
            offset += spec.len;
        }
        Ok(out)
    }

    /// A fresh zeroed part for each entry in the layout, in layout order.
    pub fn zero_parts(&self) -> Vec<Array1<f64>> {
        self.parts.iter().map(|p| Array1::zeros(p.len)).collect()
    }

    /// Global inner product of two flat vectors packed by this layout.
    /// Shared parts are counted once per communicator (attributed to rank
    /// 0 before the reduction) rather than once per rank, since every rank
    /// holds an identical copy of them.
    pub fn dot(&self, a: ArrayView1<f64>, b: ArrayView1<f64>, comm: &dyn Comm) -> f64 {
        debug_assert_eq!(a.len(), self.total_len());
        debug_assert_eq!(b.len(), self.total_len());
        let mut local = 0.0;
        let mut offset = 0;
        for spec in &self.parts {
            let av = a.slice(ndarray::s![offset..offset + spec.len]);
            let bv = b.slice(ndarray::s![offset..offset + spec.len]);
            let contribution: f64 = av.iter().zip(bv.iter()).map(|(x, y)| x * y).sum();
            if !spec.shared || comm.rank() == 0 {
                local += contribution;
            }
            offset += spec.len;
        }
        let mut buf = Array1::from_elem(1, local);
        comm.allreduce_sum_inplace(buf.view_mut());
        buf[0]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comm::SingleProcessComm;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    fn layout() -> Dof {
        Dof::new(vec![
            DofPartSpec::new("map", 3, true),
            DofPartSpec::new("junk", 2, false),
        ])
    }

    #[test]
    fn zip_unzip_round_trip() {
        let dof = layout();
        let map = array![1.0, 2.0, 3.0];
        let junk = array![4.0, 5.0];
        let flat = dof.zip(&[map.view(), junk.view()]).unwrap();
        assert_eq!(flat, array![1.0, 2.0, 3.0, 4.0, 5.0]);
        let parts = dof.unzip(flat.view()).unwrap();
        assert_eq!(parts[0], map);
        assert_eq!(parts[1], junk);
    }

    #[test]
    fn zip_rejects_wrong_part_length() {
        let dof = layout();
        let map = array![1.0, 2.0];
        let junk = array![4.0, 5.0];
        assert!(dof.zip(&[map.view(), junk.view()]).is_err());
    }

    #[test]
    fn dot_matches_plain_inner_product_single_rank() {
        let dof = layout();
        let a = array![1.0, 2.0, 3.0, 4.0, 5.0];
        let b = array![1.0, 1.0, 1.0, 1.0, 1.0];
        let comm = SingleProcessComm;
        let got = dof.dot(a.view(), b.view(), &comm);
        assert_abs_diff_eq!(got, 15.0, epsilon = 1e-12);
    }
}
