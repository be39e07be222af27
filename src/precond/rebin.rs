// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The multigrid level bridge (spec §4.3.8): `up`/`down` between a fine
//! `LinearSystem` and a coarser one related by spatial and temporal
//! decimation by 2. Used by [`crate::precond::submap::Submap`] to move
//! between the outer solve's resolution and its synthesized coarse
//! system; the actual cycling policy (how many V-cycles, when to stop) is
//! the solver driver's responsibility (spec §4.3.8), not this bridge's.

use ndarray::{Array1, Array3, ArrayView1, ArrayView3};

use crate::scan::{CutRebinPointing, RebinPointing};

/// Matching DOF layouts across a fine and coarse level: a packed vector
/// is `[map DOF][junk DOF]`, with the map block shaped `[ncomp, ny, nx]`
/// at each level and the junk block addressed per-scan through a rebin
/// pointing pair.
pub struct RebinLevel {
    fine_map_shape: (usize, usize, usize),
    coarse_map_shape: (usize, usize, usize),
    map_rebin: Box<dyn RebinPointing>,
    /// One cut-rebin operator and `(fine_len, coarse_len)` pair per scan
    /// whose junk vector participates in the bridge.
    cut_rebins: Vec<(Box<dyn CutRebinPointing>, usize, usize)>,
}

impl RebinLevel {
    pub fn new(
        fine_map_shape: (usize, usize, usize),
        coarse_map_shape: (usize, usize, usize),
        map_rebin: Box<dyn RebinPointing>,
        cut_rebins: Vec<(Box<dyn CutRebinPointing>, usize, usize)>,
    ) -> Self {
        RebinLevel { fine_map_shape, coarse_map_shape, map_rebin, cut_rebins }
    }

    fn fine_map_len(&self) -> usize {
        self.fine_map_shape.0 * self.fine_map_shape.1 * self.fine_map_shape.2
    }

    fn coarse_map_len(&self) -> usize {
        self.coarse_map_shape.0 * self.coarse_map_shape.1 * self.coarse_map_shape.2
    }

    /// Restrict a fine-level packed DOF vector to the coarse level:
    /// rebin the map block, and rebin each scan's junk slice through its
    /// own cut-rebin operator.
    pub fn up(&self, x_h: ArrayView1<f64>) -> Array1<f64> {
        let map_len_h = self.fine_map_len();
        let map_len_l = self.coarse_map_len();
        let fine_map = ndarray::ArrayView::from_shape(self.fine_map_shape, x_h.slice(ndarray::s![..map_len_h]).as_slice().expect("contiguous"))
            .expect("fine map DOF slice matches shape");
        let mut coarse_map = Array3::<f64>::zeros(self.coarse_map_shape);
        self.map_rebin.degrade(fine_map, coarse_map.view_mut());

        let mut junk_l = Vec::new();
        let mut offset = map_len_h;
        for (rebin, fine_len, coarse_len) in &self.cut_rebins {
            let fine_slice = x_h.slice(ndarray::s![offset..offset + fine_len]);
            let mut coarse_slice = Array1::<f64>::zeros(*coarse_len);
            rebin.degrade(fine_slice, coarse_slice.view_mut());
            junk_l.extend(coarse_slice.iter().copied());
            offset += fine_len;
        }

        let mut out = Vec::with_capacity(map_len_l + junk_l.len());
        out.extend(coarse_map.into_raw_vec());
        out.extend(junk_l);
        Array1::from(out)
    }

    /// Prolong a coarse-level packed DOF vector back up to the fine
    /// level.
    pub fn down(&self, x_l: ArrayView1<f64>) -> Array1<f64> {
        let map_len_l = self.coarse_map_len();
        let map_len_h = self.fine_map_len();
        let coarse_map = ndarray::ArrayView::from_shape(self.coarse_map_shape, x_l.slice(ndarray::s![..map_len_l]).as_slice().expect("contiguous"))
            .expect("coarse map DOF slice matches shape");
        let mut fine_map = Array3::<f64>::zeros(self.fine_map_shape);
        self.map_rebin.prolong(coarse_map, fine_map.view_mut());

        let mut junk_h = Vec::new();
        let mut offset = map_len_l;
        for (rebin, fine_len, coarse_len) in &self.cut_rebins {
            let coarse_slice = x_l.slice(ndarray::s![offset..offset + coarse_len]);
            let mut fine_slice = Array1::<f64>::zeros(*fine_len);
            rebin.prolong(coarse_slice, fine_slice.view_mut());
            junk_h.extend(fine_slice.iter().copied());
            offset += coarse_len;
        }

        let mut out = Vec::with_capacity(map_len_h + junk_h.len());
        out.extend(fine_map.into_raw_vec());
        out.extend(junk_h);
        Array1::from(out)
    }
}
