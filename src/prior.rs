// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The per-signal prior extension point: an additive term `Lambda(x)`
//! folded into `A(x)` after every scan's projection has been reduced (see
//! [`crate::signal::Signal::prior`] and `Eqsys::a`'s final step). Matches
//! the reference implementation's `signal.prior(scans, imap, omap)` hook,
//! here split into a standalone trait so a [`Prior`] can be shared between
//! several signals or swapped independently of the signal it regularizes.

use ndarray::{Array1, ArrayView1};

/// A prior term `Lambda(x)` added into `A(x)` for one signal's degrees of
/// freedom.
pub trait Prior: Send + Sync {
    fn apply(&self, x: ArrayView1<f64>) -> Array1<f64>;
}

/// No prior: `Lambda(x) = 0`. The default for a signal with no
/// regularization.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullPrior;

impl Prior for NullPrior {
    fn apply(&self, x: ArrayView1<f64>) -> Array1<f64> {
        Array1::zeros(x.len())
    }
}

/// An L2 (Tikhonov) prior: `Lambda(x) = weight * x`, pulling the
/// corresponding degrees of freedom toward zero in proportion to
/// `weight`.
#[derive(Debug, Clone, Copy)]
pub struct NormPrior {
    pub weight: f64,
}

impl Prior for NormPrior {
    fn apply(&self, x: ArrayView1<f64>) -> Array1<f64> {
        x.mapv(|v| v * self.weight)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn null_prior_is_zero() {
        let x = array![1.0, 2.0, 3.0];
        let p = NullPrior;
        assert_eq!(p.apply(x.view()), Array1::zeros(3));
    }

    #[test]
    fn norm_prior_scales_by_weight() {
        let x = array![1.0, 2.0, 3.0];
        let p = NormPrior { weight: 0.5 };
        assert_eq!(p.apply(x.view()), array![0.5, 1.0, 1.5]);
    }
}
