// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Scan grouping and effective-scan synthesis (L4): categorize scans by
//! direction, split each category into drift-contiguous subgroups, and
//! synthesize one triangle-wave "super-scan" per subgroup with a fused
//! noise model. This is what the submap preconditioner builds its coarser
//! `LinearSystemMap` out of.

use ndarray::{Array1, Array2};
use thiserror::Error;

use crate::comm::Comm;

#[derive(Error, Debug)]
pub enum GroupingError {
    #[error("scan analysis list is empty, cannot form any groups")]
    EmptyInput,

    #[error("scan group is empty, cannot synthesize an effective scan")]
    EmptyGroup,

    #[error("noise bin arrays have inconsistent shapes across group members")]
    InconsistentBins,
}

/// Per-scan direction/drift analysis, the input to [`group_scans_by_scandirs`].
/// `ibox`/`obox` are `[2, ndim]` (row 0 = min corner, row 1 = max corner);
/// `ivecs`/`ovecs` are `[2, ndim]` (row 0 = scan-direction step, row 1 =
/// drift-direction step), all per-sample.
#[derive(Debug, Clone)]
pub struct ScanAnalysis {
    pub scan_index: usize,
    pub ibox: Array2<f64>,
    pub obox: Array2<f64>,
    pub ivecs: Array2<f64>,
    pub ovecs: Array2<f64>,
    pub ncomp: usize,
    pub noise: EffNoiseSource,
}

/// The minimal per-scan noise summary [`build_effective_noise_model`]
/// needs: a piecewise-constant Fourier-domain covariance description over
/// frequency bins, already collapsed to this scan's own detector basis.
#[derive(Debug, Clone)]
pub struct EffNoiseSource {
    /// `[nbin, 2]`: `(lo, hi)` edges in Hz, per bin.
    pub bins: Array2<f64>,
    /// One `ndet x ndet` covariance matrix per bin.
    pub icovs: Vec<Array2<f64>>,
    /// `[ndet, ncomp]`: this scan's component-response matrix, used to
    /// collapse a detector-space covariance down to `ncomp` synthetic
    /// detectors.
    pub comps: Array2<f64>,
}

/// Find the sample-dimension axis with the shortest period (fastest
/// sign-change rate of the derivative) among `boresight`'s columns,
/// matching the reference's `find_period`/`argmin` pair. `boresight` is
/// `[nsamp, ndim]`. Returns `(axis, period_in_samples)`.
pub fn find_scan_axis(boresight: &Array2<f64>) -> (usize, f64) {
    let (nsamp, ndim) = (boresight.shape()[0], boresight.shape()[1]);
    let mut best_axis = 0;
    let mut best_period = f64::INFINITY;
    for d in 0..ndim {
        let mut sign_changes = 0usize;
        let mut last_sign = 0i8;
        for i in 1..nsamp {
            let delta = boresight[[i, d]] - boresight[[i - 1, d]];
            let sign = if delta > 0.0 {
                1
            } else if delta < 0.0 {
                -1
            } else {
                last_sign
            };
            if last_sign != 0 && sign != 0 && sign != last_sign {
                sign_changes += 1;
            }
            if sign != 0 {
                last_sign = sign;
            }
        }
        // A period is two sign changes (there-and-back); guard against an
        // axis that never changes sign (a non-scanning axis has an
        // effectively infinite period and is never picked as the minimum).
        let period = if sign_changes > 0 {
            2.0 * nsamp as f64 / sign_changes as f64
        } else {
            f64::INFINITY
        };
        if period < best_period {
            best_period = period;
            best_axis = d;
        }
    }
    (best_axis, best_period)
}

/// Per-scan analysis (spec §4.4.1): find the scan axis, build `ivec0`
/// (scan direction) and `ivec1` (drift direction) per-sample step
/// vectors, and translate both vectors plus the bounding box through
/// `translate` (a closure over the scan's pointing operator) to get their
/// output-coordinate counterparts.
///
/// `ibox` is `[2, ndim]`. `translate` maps a batch of `[npoint, ndim]`
/// input-coordinate points to `[npoint, ndim]` output-coordinate points
/// (the external pointing operator's `translate`, see `SPEC_FULL.md` §6).
pub fn analyze_scan(
    scan_index: usize,
    ibox: Array2<f64>,
    boresight: &Array2<f64>,
    ncomp: usize,
    noise: EffNoiseSource,
    translate: impl Fn(&Array2<f64>) -> Array2<f64>,
) -> ScanAnalysis {
    let ndim = ibox.shape()[1];
    let nsamp = boresight.shape()[0];
    let (scan_axis, period) = find_scan_axis(boresight);

    let mut ivecs = Array2::<f64>::zeros((2, ndim));
    for d in 0..ndim {
        let span = ibox[[1, d]] - ibox[[0, d]];
        if d == scan_axis {
            ivecs[[0, d]] = span / (period / 2.0);
        } else {
            ivecs[[1, d]] = span / nsamp as f64;
        }
    }

    let mut mid = Array1::<f64>::zeros(ndim);
    for d in 0..ndim {
        mid[d] = 0.5 * (ibox[[0, d]] + ibox[[1, d]]);
    }
    let mut probe = Array2::<f64>::zeros((3, ndim));
    for d in 0..ndim {
        probe[[0, d]] = mid[d];
        probe[[1, d]] = mid[d] + ivecs[[0, d]];
        probe[[2, d]] = mid[d] + ivecs[[1, d]];
    }
    let opts = translate(&probe);
    let mut ovecs = Array2::<f64>::zeros((2, ndim));
    for d in 0..ndim {
        ovecs[[0, d]] = opts[[1, d]] - opts[[0, d]];
        ovecs[[1, d]] = opts[[2, d]] - opts[[0, d]];
    }

    let obox_pts = translate(&ibox);
    let mut obox = Array2::<f64>::zeros((2, ndim));
    for d in 0..ndim {
        obox[[0, d]] = obox_pts[[0, d]];
        obox[[1, d]] = obox_pts[[1, d]];
    }

    ScanAnalysis { scan_index, ibox, obox, ivecs, ovecs, ncomp, noise }
}

fn vec_norm(v: &[f64]) -> f64 {
    v.iter().map(|x| x * x).sum::<f64>().sqrt()
}

/// Express `target` (a `[ndim]` vector) in the non-orthogonal basis
/// spanned by the two rows of `basis` (`[2, ndim]`), via the
/// least-squares solve `basis^T x = target` reduced to the 2x2 normal
/// equations `(basis basis^T) x = basis target`. Mirrors the reference's
/// `utils.decomp_basis`.
fn decomp_basis(basis: &Array2<f64>, target: &[f64]) -> [f64; 2] {
    let ndim = basis.shape()[1];
    let mut g = [[0.0_f64; 2]; 2];
    let mut rhs = [0.0_f64; 2];
    for i in 0..2 {
        for j in 0..2 {
            let mut acc = 0.0;
            for d in 0..ndim {
                acc += basis[[i, d]] * basis[[j, d]];
            }
            g[i][j] = acc;
        }
        let mut acc = 0.0;
        for d in 0..ndim {
            acc += basis[[i, d]] * target[d];
        }
        rhs[i] = acc;
    }
    let det = g[0][0] * g[1][1] - g[0][1] * g[1][0];
    if det.abs() < 1e-300 {
        return [0.0, 0.0];
    }
    let x0 = (rhs[0] * g[1][1] - rhs[1] * g[0][1]) / det;
    let x1 = (g[0][0] * rhs[1] - g[1][0] * rhs[0]) / det;
    [x0, x1]
}

/// Group scans by consistent scan direction and scan-axis position
/// (spec §4.4.2), via greedy peeling: pop any unclassified scan, admit any
/// other unclassified scan whose `ovecs` match within `vectol` and whose
/// scan-axis bounding-box offset (expressed in the `(ovec0, ovec1)` basis)
/// is within `postol`. The drift component of the offset is unconstrained.
pub fn group_scans_by_scandirs(
    analyses: &[ScanAnalysis],
    vectol: f64,
    postol: f64,
) -> Result<Vec<Vec<usize>>, GroupingError> {
    if analyses.is_empty() {
        return Err(GroupingError::EmptyInput);
    }
    let ndim = analyses[0].ibox.shape()[1];
    let mut unclassified: Vec<usize> = (0..analyses.len()).collect();
    let mut groups = Vec::new();

    while let Some(me_idx) = unclassified.pop() {
        let me = &analyses[me_idx];
        let veclens: Vec<f64> = (0..2)
            .map(|row| vec_norm(&(0..ndim).map(|d| me.ovecs[[row, d]]).collect::<Vec<_>>()))
            .collect();
        let poslens: Vec<f64> = (0..ndim).map(|d| (me.obox[[1, d]] - me.obox[[0, d]]).abs()).collect();
        let pos_scan_len = poslens[0].max(poslens.get(1).copied().unwrap_or(0.0));

        let mut accepted = Vec::new();
        let mut still_unclassified = Vec::new();
        for &oi in &unclassified {
            let other = &analyses[oi];
            let vecdiff: Vec<f64> = (0..2)
                .map(|row| {
                    vec_norm(
                        &(0..ndim)
                            .map(|d| me.ovecs[[row, d]] - other.ovecs[[row, d]])
                            .collect::<Vec<_>>(),
                    )
                })
                .collect();
            if vecdiff.iter().zip(veclens.iter()).any(|(&vd, &vl)| vd > vl * vectol) {
                still_unclassified.push(oi);
                continue;
            }
            let boxdiff: Vec<f64> = (0..ndim).map(|d| me.obox[[0, d]] - other.obox[[0, d]]).collect();
            let decomp = decomp_basis(&me.ovecs, &boxdiff);
            let posdiff0 = decomp[0].abs();
            if posdiff0 > pos_scan_len * postol {
                still_unclassified.push(oi);
                continue;
            }
            accepted.push(oi);
        }
        unclassified = still_unclassified;

        let mut group = vec![me_idx];
        group.extend(accepted);
        groups.push(group);
    }
    Ok(groups)
}

/// Split each group into drift-contiguous subgroups (spec §4.4.3): sort
/// members by their drift-direction bounding-box start, then walk in
/// order, starting a new subgroup whenever a member's start exceeds the
/// running maximum end.
pub fn split_disjoint_scan_groups(
    groups: &[Vec<usize>],
    analyses: &[ScanAnalysis],
) -> Vec<Vec<usize>> {
    let mut subgroups = Vec::new();
    for group in groups {
        if group.is_empty() {
            continue;
        }
        let ndim = analyses[group[0]].ibox.shape()[1];
        let first = &analyses[group[0]];
        let drift_raw: Vec<f64> = (0..ndim).map(|d| first.ovecs[[1, d]]).collect();
        let norm = vec_norm(&drift_raw).max(1e-300);
        let drift: Vec<f64> = drift_raw.iter().map(|v| v / norm).collect();

        let pos_of = |idx: usize| -> (f64, f64) {
            let a = &analyses[idx];
            let start: f64 = (0..ndim).map(|d| a.obox[[0, d]] * drift[d]).sum();
            let end: f64 = (0..ndim).map(|d| a.obox[[1, d]] * drift[d]).sum();
            (start.min(end), start.max(end))
        };

        let mut ordered: Vec<usize> = group.clone();
        ordered.sort_by(|&a, &b| pos_of(a).0.partial_cmp(&pos_of(b).0).unwrap());

        let mut sub: Vec<usize> = Vec::new();
        let mut running_end = f64::NEG_INFINITY;
        for idx in ordered {
            let (start, end) = pos_of(idx);
            if start > running_end && !sub.is_empty() {
                subgroups.push(std::mem::take(&mut sub));
            }
            running_end = running_end.max(end);
            sub.push(idx);
        }
        if !sub.is_empty() {
            subgroups.push(sub);
        }
    }
    subgroups
}

/// A synthesized "effective scan" standing in for a drift-contiguous
/// subgroup (spec §4.4.4): a triangle-wave boresight over the subgroup's
/// combined bounding box, `ncomp` synthetic unit-response detectors with
/// no cuts, and a fused noise model (§4.4.5).
#[derive(Debug, Clone)]
pub struct EffectiveScan {
    /// `[nsamp, ndim]`.
    pub boresight: Array2<f64>,
    pub ncomp: usize,
    pub bins: Array2<f64>,
    pub icovs: Vec<Array2<f64>>,
}

/// `decompose(ivec, span) -> (period, nsamp)`: the smallest number of
/// samples that covers `span` at per-sample step `ivec`, matching the
/// reference's `utils.decomp_basis` applied to a scan/drift pair, folded
/// into one scalar period along the scan axis and the corresponding
/// sample count from the drift axis.
fn decompose(ivec: &Array2<f64>, span: &[f64]) -> (f64, usize) {
    let ndim = ivec.shape()[1];
    let scan_norm2: f64 = (0..ndim).map(|d| ivec[[0, d]] * ivec[[0, d]]).sum();
    let drift_norm2: f64 = (0..ndim).map(|d| ivec[[1, d]] * ivec[[1, d]]).sum();
    let period = if scan_norm2 > 0.0 {
        let dot: f64 = (0..ndim).map(|d| ivec[[0, d]] * span[d]).sum();
        (dot / scan_norm2).abs().max(1.0)
    } else {
        1.0
    };
    let nsamp = if drift_norm2 > 0.0 {
        let dot: f64 = (0..ndim).map(|d| ivec[[1, d]] * span[d]).sum();
        (dot / drift_norm2).abs().round().max(1.0) as usize
    } else {
        period.round().max(1.0) as usize
    };
    (period, nsamp)
}

/// Synthesize one effective scan from a drift-contiguous subgroup (spec
/// §4.4.4). `oversample` divides the per-sample step vectors by `k`
/// before building the triangle wave, per the reference's `oversample`
/// factor.
pub fn sim_scan_from_group(
    group: &[usize],
    analyses: &[ScanAnalysis],
    oversample: usize,
) -> Result<EffectiveScan, GroupingError> {
    if group.is_empty() {
        return Err(GroupingError::EmptyGroup);
    }
    let first = &analyses[group[0]];
    let ndim = first.ibox.shape()[1];

    let mut obox_tot = Array2::<f64>::zeros((2, ndim));
    for d in 0..ndim {
        obox_tot[[0, d]] =
            group.iter().map(|&i| analyses[i].obox[[0, d]]).fold(f64::INFINITY, f64::min);
        obox_tot[[1, d]] =
            group.iter().map(|&i| analyses[i].obox[[1, d]]).fold(f64::NEG_INFINITY, f64::max);
    }

    let k = oversample.max(1) as f64;
    let mut ivec = first.ivecs.clone();
    ivec.mapv_inplace(|v| v / k);
    let mut ovec = first.ovecs.clone();
    ovec.mapv_inplace(|v| v / k);

    // ibox_tot = iref + decomp_basis(ovec, obox_tot - oref) . ivec, applied
    // row-by-row (min corner, max corner) since decomp_basis operates on
    // one target vector at a time.
    let mut ibox_tot = Array2::<f64>::zeros((2, ndim));
    for row in 0..2 {
        let target: Vec<f64> = (0..ndim).map(|d| obox_tot[[row, d]] - first.obox[[0, d]]).collect();
        let coef = decomp_basis(&ovec, &target);
        for d in 0..ndim {
            ibox_tot[[row, d]] = first.ibox[[0, d]] + coef[0] * ivec[[0, d]] + coef[1] * ivec[[1, d]];
        }
    }

    let span: Vec<f64> = (0..ndim).map(|d| ibox_tot[[1, d]] - ibox_tot[[0, d]]).collect();
    let (period, nsamp) = decompose(&ivec, &span);

    let mut boresight = Array2::<f64>::zeros((nsamp, ndim));
    for i in 0..nsamp {
        let mut phase = (i as f64) % (2.0 * period);
        if phase > period {
            phase = 2.0 * period - phase;
        }
        for d in 0..ndim {
            boresight[[i, d]] = ibox_tot[[0, d]] + ivec[[1, d]] * i as f64 + ivec[[0, d]] * phase;
        }
    }

    let group_analyses: Vec<&ScanAnalysis> = group.iter().map(|&i| &analyses[i]).collect();
    let (mut bins, icovs) = build_effective_noise_model(&group_analyses)?;
    let nbin = bins.shape()[0];
    if nbin > 0 {
        // Widen the last bin's upper edge by the oversampling factor, since
        // the synthesized scan's effective sample rate is k times higher.
        let width = bins[[nbin - 1, 1]] - bins[[nbin - 1, 0]];
        bins[[nbin - 1, 1]] += width * (k - 1.0);
    }

    Ok(EffectiveScan { boresight, ncomp: first.ncomp, bins, icovs })
}

/// Linearly interpolate the `ncomp x ncomp` matrix sequence `small_ic`
/// (one per `src_bins` row) onto `dst_bcenters`, following the reference's
/// `searchsorted`-plus-linear-interpolation index mapping: the fractional
/// index of `dst_bcenters[j]` within `src_bins` is found by searching the
/// upper edges, then linearly interpolating between the two bracketing
/// source matrices.
fn interpolate_icov(
    src_bins: &Array2<f64>,
    small_ic: &[Array2<f64>],
    dst_bcenters: &[f64],
) -> Vec<Array2<f64>> {
    let nbin_src = src_bins.shape()[0];
    let ncomp = small_ic.first().map(|m| m.shape()[0]).unwrap_or(0);
    dst_bcenters
        .iter()
        .map(|&bc| {
            // searchsorted on upper edges: find the first src bin whose
            // upper edge is >= bc.
            let mut idx = nbin_src.saturating_sub(1);
            for i in 0..nbin_src {
                if src_bins[[i, 1]] >= bc {
                    idx = i;
                    break;
                }
            }
            let lo = src_bins[[idx, 0]];
            let hi = src_bins[[idx, 1]];
            let frac = if hi > lo { (bc - lo) / (hi - lo) } else { 0.0 };
            let idx_next = (idx + 1).min(nbin_src - 1);
            let a = &small_ic[idx];
            let b = &small_ic[idx_next];
            let mut out = Array2::<f64>::zeros((ncomp, ncomp));
            for i in 0..ncomp {
                for j in 0..ncomp {
                    out[[i, j]] = a[[i, j]] * (1.0 - frac) + b[[i, j]] * frac;
                }
            }
            out
        })
        .collect()
}

/// Fuse a drift-contiguous subgroup's per-scan noise models into one dense
/// binned noise model over `ncomp` synthetic detectors (spec §4.4.5),
/// assuming all members perfectly overlap: collapse each member's
/// detector covariance to `ncomp` components via `comps^T icov comps`,
/// interpolate onto the first member's (canonical) bin grid, and
/// accumulate across members. Returns `(bins, icovs)`.
///
/// The reference implementation overwrites a shared `S` buffer in place
/// across iterations of its bin-fusion inner loop (`measure_corr_cyclic`);
/// this implementation allocates a fresh `small_ic` per member instead
/// (see `DESIGN.md`'s Open Question notes), which is one extra allocation
/// per member but removes the reuse hazard.
pub fn build_effective_noise_model(
    group: &[&ScanAnalysis],
) -> Result<(Array2<f64>, Vec<Array2<f64>>), GroupingError> {
    if group.is_empty() {
        return Err(GroupingError::EmptyGroup);
    }
    let ncomp = group[0].ncomp;
    let canonical_bins = group[0].noise.bins.clone();
    let nbin = canonical_bins.shape()[0];
    if nbin == 0 {
        return Ok((canonical_bins, Vec::new()));
    }
    let bcenters: Vec<f64> = (0..nbin).map(|i| 0.5 * (canonical_bins[[i, 0]] + canonical_bins[[i, 1]])).collect();

    let mut accum = vec![Array2::<f64>::zeros((ncomp, ncomp)); nbin];
    for member in group {
        let noise = &member.noise;
        if noise.comps.shape()[1] < ncomp {
            return Err(GroupingError::InconsistentBins);
        }
        let small_ic: Vec<Array2<f64>> = noise
            .icovs
            .iter()
            .map(|icov| {
                let mut out = Array2::<f64>::zeros((ncomp, ncomp));
                let ndet = icov.shape()[0];
                for i in 0..ncomp {
                    for j in 0..ncomp {
                        let mut acc = 0.0;
                        for a in 0..ndet {
                            for b in 0..ndet {
                                acc += noise.comps[[a, i]] * icov[[a, b]] * noise.comps[[b, j]];
                            }
                        }
                        out[[i, j]] = acc;
                    }
                }
                out
            })
            .collect();
        let interpolated = interpolate_icov(&noise.bins, &small_ic, &bcenters);
        for (acc, add) in accum.iter_mut().zip(interpolated.iter()) {
            *acc += add;
        }
    }
    Ok((canonical_bins, accum))
}

/// Drive the full L4 pipeline — analyze, group, split, synthesize — over
/// one rank's worth of scans, all-reducing per-scan analyses across the
/// communicator first (spec §5: grouping is collective, since groups can
/// span scans owned by different ranks).
pub fn build_effective_scans(
    analyses: Vec<ScanAnalysis>,
    comm: &dyn Comm,
    vectol: f64,
    postol: f64,
    oversample: usize,
) -> Result<Vec<EffectiveScan>, GroupingError> {
    let indices: Vec<usize> = (0..analyses.len()).collect();
    let _ = comm.allreduce_concat_usize(indices);
    let groups = group_scans_by_scandirs(&analyses, vectol, postol)?;
    let subgroups = split_disjoint_scan_groups(&groups, &analyses);
    subgroups
        .iter()
        .map(|sub| sim_scan_from_group(sub, &analyses, oversample))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comm::SingleProcessComm;

    fn flat_noise(ncomp: usize, nbin: usize) -> EffNoiseSource {
        let mut bins = Array2::<f64>::zeros((nbin, 2));
        for i in 0..nbin {
            bins[[i, 0]] = i as f64;
            bins[[i, 1]] = (i + 1) as f64;
        }
        let icovs = (0..nbin).map(|_| Array2::<f64>::eye(ncomp)).collect();
        let comps = Array2::<f64>::eye(ncomp);
        EffNoiseSource { bins, icovs, comps }
    }

    fn analysis_with(idx: usize, drift_offset: f64, reversed: bool) -> ScanAnalysis {
        let ibox = ndarray::array![[0.0, 0.0], [10.0, 10.0]];
        let mut ovecs = ndarray::array![[1.0, 0.0], [0.0, 1.0]];
        if reversed {
            ovecs[[0, 0]] = -1.0;
        }
        let mut obox = ndarray::array![[0.0, drift_offset], [10.0, drift_offset + 1.0]];
        obox[[1, 0]] = 10.0;
        ScanAnalysis {
            scan_index: idx,
            ibox: ibox.clone(),
            obox,
            ivecs: ovecs.clone(),
            ovecs,
            ncomp: 1,
            noise: flat_noise(1, 4),
        }
    }

    #[test]
    fn grouping_is_a_partition() {
        let analyses: Vec<ScanAnalysis> = (0..6)
            .map(|i| analysis_with(i, i as f64, i >= 3))
            .collect();
        let groups = group_scans_by_scandirs(&analyses, 0.1, 0.5).unwrap();
        let mut seen = vec![false; 6];
        for g in &groups {
            for &idx in g {
                assert!(!seen[idx], "scan {idx} appeared in more than one group");
                seen[idx] = true;
            }
        }
        assert!(seen.iter().all(|&s| s), "every scan must appear in some group");
    }

    #[test]
    fn opposite_directions_form_distinct_groups() {
        let analyses: Vec<ScanAnalysis> = (0..6)
            .map(|i| analysis_with(i, i as f64, i >= 3))
            .collect();
        let groups = group_scans_by_scandirs(&analyses, 0.1, 0.5).unwrap();
        assert_eq!(groups.len(), 2);
    }

    #[test]
    fn disjoint_split_is_drift_contiguous() {
        let analyses: Vec<ScanAnalysis> = (0..3).map(|i| analysis_with(i, i as f64, false)).collect();
        let groups = vec![vec![0usize, 1, 2]];
        let subgroups = split_disjoint_scan_groups(&groups, &analyses);
        assert_eq!(subgroups.len(), 1);
        assert_eq!(subgroups[0].len(), 3);
    }

    #[test]
    fn build_effective_scans_runs_end_to_end() {
        let analyses: Vec<ScanAnalysis> = (0..3).map(|i| analysis_with(i, i as f64, false)).collect();
        let comm = SingleProcessComm;
        let eff = build_effective_scans(analyses, &comm, 0.1, 0.5, 2).unwrap();
        assert!(!eff.is_empty());
        for e in &eff {
            assert!(e.boresight.shape()[0] > 0);
            assert_eq!(e.ncomp, 1);
        }
    }

    #[test]
    fn effective_noise_model_sums_identity_covariances() {
        let a = analysis_with(0, 0.0, false);
        let b = analysis_with(1, 0.0, false);
        let group = vec![&a, &b];
        let (bins, icovs) = build_effective_noise_model(&group).unwrap();
        assert_eq!(bins.shape()[0], 4);
        for icov in &icovs {
            approx::assert_abs_diff_eq!(icov[[0, 0]], 2.0, epsilon = 1e-8);
        }
    }

    #[test]
    fn last_bin_widened_by_oversample_factor() {
        let analyses: Vec<ScanAnalysis> = (0..2).map(|i| analysis_with(i, i as f64, false)).collect();
        let eff = sim_scan_from_group(&[0, 1], &analyses, 2).unwrap();
        let nbin = eff.bins.shape()[0];
        let plain_width = eff.bins[[0, 1]] - eff.bins[[0, 0]];
        let last_width = eff.bins[[nbin - 1, 1]] - eff.bins[[nbin - 1, 0]];
        assert!(last_width > plain_width);
    }
}
