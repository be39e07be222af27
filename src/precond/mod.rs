// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The preconditioner family `M`, applied in the conjugate-gradient
//! iteration as a cheap approximation to `A^-1` restricted to one signal's
//! degrees of freedom.

pub mod binned;
pub mod circulant;
pub mod cut;
pub mod hitcount;
pub mod phase;
pub mod rebin;
pub mod submap;
pub mod tod;

use ndarray::{Array1, ArrayView1};

use crate::comm::Comm;

/// A preconditioner for one signal's block of the packed DOF vector.
pub trait Preconditioner: Send + Sync {
    /// `y ~= A^-1 x` restricted to this signal's degrees of freedom.
    fn apply(&self, x: ArrayView1<f64>, comm: &dyn Comm) -> Array1<f64>;
}

/// The trivial preconditioner: the identity. Used for signals with no
/// cheaper approximation available (equivalent to the reference
/// implementation's `PreconNull`).
#[derive(Debug, Default, Clone, Copy)]
pub struct NullPreconditioner;

impl Preconditioner for NullPreconditioner {
    fn apply(&self, x: ArrayView1<f64>, _comm: &dyn Comm) -> Array1<f64> {
        x.to_owned()
    }
}

/// Applies a list of per-signal preconditioners to the matching slices of
/// a packed DOF vector, the way [`crate::eqsys::Eqsys`] applies a list of
/// signals.
pub struct JointPreconditioner {
    parts: Vec<Box<dyn Preconditioner>>,
}

impl JointPreconditioner {
    pub fn new(parts: Vec<Box<dyn Preconditioner>>) -> Self {
        JointPreconditioner { parts }
    }

    pub fn apply(&self, dof: &crate::dof::Dof, x: ArrayView1<f64>, comm: &dyn Comm) -> Array1<f64> {
        let parts = dof.unzip(x).expect("x was packed by this system's own dof layout");
        let applied: Vec<Array1<f64>> = self
            .parts
            .iter()
            .zip(parts.iter())
            .map(|(p, part)| p.apply(part.view(), comm))
            .collect();
        dof.zip(&applied.iter().map(|a| a.view()).collect::<Vec<_>>())
            .expect("preconditioners must preserve each part's length")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comm::SingleProcessComm;
    use crate::dof::{Dof, DofPartSpec};
    use ndarray::array;

    #[test]
    fn null_preconditioner_is_identity() {
        let x = array![1.0, -2.0, 3.0];
        let comm = SingleProcessComm;
        let y = NullPreconditioner.apply(x.view(), &comm);
        assert_eq!(y, x);
    }

    #[test]
    fn joint_preconditioner_applies_each_part_independently() {
        struct Scale(f64);
        impl Preconditioner for Scale {
            fn apply(&self, x: ArrayView1<f64>, _comm: &dyn Comm) -> Array1<f64> {
                &x.to_owned() * self.0
            }
        }
        let dof = Dof::new(vec![DofPartSpec::new("a", 2, true), DofPartSpec::new("b", 1, false)]);
        let joint = JointPreconditioner::new(vec![Box::new(Scale(2.0)), Box::new(Scale(10.0))]);
        let x = array![1.0, 2.0, 3.0];
        let comm = SingleProcessComm;
        let y = joint.apply(&dof, x.view(), &comm);
        assert_eq!(y, array![2.0, 4.0, 30.0]);
    }
}
