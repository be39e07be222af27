// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! `PrecondSubmap`: approximates `A^-1` by restricting to a coarser,
//! regrouped system, running a small fixed number of inner
//! conjugate-gradient iterations there, and prolonging the result back up.
//!
//! The inner solve's own preconditioner would naturally want to be
//! another member of this same family (binned, hitcount, even another
//! submap level), which is a cyclic dependency if expressed as a fixed
//! enum. It's broken here the way the reference implementation breaks it:
//! the inner preconditioner is supplied as a factory closure rather than a
//! concrete type, so `Submap` itself never needs to name its own family.

use ndarray::{Array1, ArrayView1};

use crate::comm::Comm;
use crate::precond::Preconditioner;

type CoarseApply = dyn Fn(ArrayView1<f64>) -> Array1<f64> + Send + Sync;
type Restrict = dyn Fn(ArrayView1<f64>) -> Array1<f64> + Send + Sync;
type Prolong = dyn Fn(ArrayView1<f64>) -> Array1<f64> + Send + Sync;

/// The fixed number of inner CG iterations run at the coarse level,
/// regardless of convergence. The reference implementation hard-codes the
/// same value: the submap preconditioner only needs to be roughly right,
/// not converged, since it's itself just a preconditioner for the outer
/// solve.
pub const SUBMAP_INNER_ITERS: usize = 20;

pub struct Submap {
    coarse_apply: Box<CoarseApply>,
    inner_precond_factory: Box<dyn Fn() -> Box<dyn Preconditioner> + Send + Sync>,
    restrict: Box<Restrict>,
    prolong: Box<Prolong>,
    coarse_len: usize,
    inner_iters: usize,
}

impl Submap {
    pub fn new(
        coarse_apply: Box<CoarseApply>,
        inner_precond_factory: Box<dyn Fn() -> Box<dyn Preconditioner> + Send + Sync>,
        restrict: Box<Restrict>,
        prolong: Box<Prolong>,
        coarse_len: usize,
    ) -> Self {
        Submap {
            coarse_apply,
            inner_precond_factory,
            restrict,
            prolong,
            coarse_len,
            inner_iters: SUBMAP_INNER_ITERS,
        }
    }

    /// A fixed, small inner conjugate-gradient solve of `coarse_apply(xc) =
    /// rhs` for exactly `self.inner_iters` iterations. The residual is not
    /// inspected for convergence: this loop exists to produce a usably
    /// close approximation cheaply, not to solve the coarse system
    /// exactly, so it always runs its full iteration budget.
    fn inner_cg(&self, rhs: &Array1<f64>) -> Array1<f64> {
        let inner_precond = (self.inner_precond_factory)();
        let comm = crate::comm::SingleProcessComm;
        let mut x = Array1::<f64>::zeros(self.coarse_len);
        let mut r = rhs.clone();
        let mut z = inner_precond.apply(r.view(), &comm);
        let mut p = z.clone();
        let mut rz_old: f64 = r.iter().zip(z.iter()).map(|(a, b)| a * b).sum();
        for _ in 0..self.inner_iters {
            let ap = (self.coarse_apply)(p.view());
            let pap: f64 = p.iter().zip(ap.iter()).map(|(a, b)| a * b).sum();
            if pap.abs() < 1e-300 {
                break;
            }
            let alpha = rz_old / pap;
            x = &x + &(&p * alpha);
            r = &r - &(&ap * alpha);
            z = inner_precond.apply(r.view(), &comm);
            let rz_new: f64 = r.iter().zip(z.iter()).map(|(a, b)| a * b).sum();
            let beta = if rz_old.abs() < 1e-300 { 0.0 } else { rz_new / rz_old };
            p = &z + &(&p * beta);
            rz_old = rz_new;
        }
        x
    }
}

impl Preconditioner for Submap {
    fn apply(&self, x: ArrayView1<f64>, _comm: &dyn Comm) -> Array1<f64> {
        let rhs_coarse = (self.restrict)(x);
        let xc = self.inner_cg(&rhs_coarse);
        (self.prolong)(xc.view())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::precond::NullPreconditioner;

    #[test]
    fn converges_on_a_diagonal_system() {
        // coarse_apply is multiplication by diag(2,2,2): the identity
        // restrict/prolong make this preconditioner equivalent to a plain
        // CG solve of that diagonal system.
        let submap = Submap::new(
            Box::new(|x: ArrayView1<f64>| x.mapv(|v| v * 2.0)),
            Box::new(|| Box::new(NullPreconditioner)),
            Box::new(|x: ArrayView1<f64>| x.to_owned()),
            Box::new(|x: ArrayView1<f64>| x.to_owned()),
            3,
        );
        let x = Array1::from(vec![2.0, 4.0, 6.0]);
        let comm = crate::comm::SingleProcessComm;
        let y = submap.apply(x.view(), &comm);
        approx::assert_abs_diff_eq!(y[0], 1.0, epsilon = 1e-8);
        approx::assert_abs_diff_eq!(y[1], 2.0, epsilon = 1e-8);
        approx::assert_abs_diff_eq!(y[2], 3.0, epsilon = 1e-8);
    }
}
