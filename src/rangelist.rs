// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! A compressed representation of a boolean mask over `0..n` as a sorted
//! list of disjoint half-open `[start, end)` ranges that are "on". This is
//! the representation used throughout the crate for cut samples: rather
//! than carry one bool per time sample, scans carry a [`Rangelist`]
//! marking which samples are cut.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum RangelistError {
    #[error("range start {start} is greater than range end {end}")]
    InvertedRange { start: usize, end: usize },

    #[error("range [{start}, {end}) exceeds length {len}")]
    OutOfBounds { start: usize, end: usize, len: usize },

    #[error("slice step of zero is not allowed")]
    ZeroStep,
}

/// A sorted, disjoint set of half-open ranges marking the "on" samples of
/// a length-`len` boolean mask.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rangelist {
    ranges: Vec<(usize, usize)>,
    len: usize,
}

impl Rangelist {
    /// Build a rangelist from unsorted, possibly-overlapping ranges,
    /// merging anything that touches or overlaps.
    pub fn new(mut ranges: Vec<(usize, usize)>, len: usize) -> Result<Self, RangelistError> {
        for &(start, end) in &ranges {
            if start > end {
                return Err(RangelistError::InvertedRange { start, end });
            }
            if end > len {
                return Err(RangelistError::OutOfBounds { start, end, len });
            }
        }
        ranges.sort_unstable();
        let mut merged: Vec<(usize, usize)> = Vec::with_capacity(ranges.len());
        for (start, end) in ranges {
            if start == end {
                continue;
            }
            match merged.last_mut() {
                Some((_, last_end)) if start <= *last_end => {
                    *last_end = (*last_end).max(end);
                }
                _ => merged.push((start, end)),
            }
        }
        Ok(Rangelist { ranges: merged, len })
    }

    /// An empty rangelist (nothing cut) of the given length.
    pub fn empty(len: usize) -> Self {
        Rangelist { ranges: Vec::new(), len }
    }

    /// A fully-on rangelist (everything cut) of the given length.
    pub fn full(len: usize) -> Self {
        if len == 0 {
            Rangelist { ranges: Vec::new(), len }
        } else {
            Rangelist { ranges: vec![(0, len)], len }
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty_mask(&self) -> bool {
        self.ranges.is_empty()
    }

    pub fn ranges(&self) -> &[(usize, usize)] {
        &self.ranges
    }

    /// Total number of "on" samples.
    pub fn sum(&self) -> usize {
        self.ranges.iter().map(|(s, e)| e - s).sum()
    }

    /// Expand to a dense boolean mask. Only meant for small lengths (tests,
    /// debugging); production code should stay in range space.
    pub fn to_mask(&self) -> Vec<bool> {
        let mut mask = vec![false; self.len];
        for &(s, e) in &self.ranges {
            mask[s..e].fill(true);
        }
        mask
    }

    /// The complement: every sample not covered by `self`.
    pub fn invert(&self) -> Self {
        let mut out = Vec::with_capacity(self.ranges.len() + 1);
        let mut cursor = 0;
        for &(s, e) in &self.ranges {
            if s > cursor {
                out.push((cursor, s));
            }
            cursor = e;
        }
        if cursor < self.len {
            out.push((cursor, self.len));
        }
        Rangelist { ranges: out, len: self.len }
    }

    /// The union of two rangelists of equal length.
    pub fn union(&self, other: &Self) -> Self {
        debug_assert_eq!(self.len, other.len);
        let mut all: Vec<(usize, usize)> = self.ranges.clone();
        all.extend_from_slice(&other.ranges);
        // `new` merges overlapping/touching ranges and re-sorts.
        Rangelist::new(all, self.len).expect("union of valid rangelists is valid")
    }

    /// Python-style slice with an explicit step, supporting negative steps.
    /// `start`/`end` follow Python's "clamped, possibly negative-indexed"
    /// slicing semantics; `step` must be nonzero. When reducing resolution
    /// (`|step| > 1`) a range's start is rounded down and its end rounded
    /// up in the new index space, so that a partially-covered output
    /// sample is still reported "on" rather than silently dropped.
    pub fn slice(&self, start: isize, end: isize, step: isize) -> Result<Self, RangelistError> {
        if step == 0 {
            return Err(RangelistError::ZeroStep);
        }
        let (lo, hi, out_len) = slice_bounds(self.len, start, end, step);
        if out_len == 0 {
            return Ok(Rangelist::empty(0));
        }
        let mut out = Vec::with_capacity(self.ranges.len());
        for &(s, e) in &self.ranges {
            // Clip the source range to the sliced window [lo, hi).
            let s = s.max(lo);
            let e = e.min(hi);
            if s >= e {
                continue;
            }
            let (os, oe) = if step > 0 {
                let step = step as usize;
                let base = lo;
                // round start down, end up, so partial coverage still counts
                let os = (s - base) / step;
                let oe = ((e - base) + step - 1) / step;
                (os, oe.min(out_len))
            } else {
                let step = (-step) as usize;
                // iterating from hi-1 downwards: position i maps to output
                // index (hi-1-i)/step
                let os = (hi - e) / step;
                let oe = ((hi - s) + step - 1) / step;
                (os, oe.min(out_len))
            };
            if os < oe {
                out.push((os, oe));
            }
        }
        Rangelist::new(out, out_len)
    }
}

/// Resolve Python-style slice bounds into a `(lo, hi, out_len)` triple in
/// the *original* index space (`lo`/`hi` bound the elements actually
/// visited; `out_len` is the number of output samples).
fn slice_bounds(len: usize, start: isize, end: isize, step: isize) -> (usize, usize, usize) {
    let len_i = len as isize;
    let norm = |i: isize, len_i: isize| -> isize {
        if i < 0 {
            (i + len_i).max(0)
        } else {
            i.min(len_i)
        }
    };
    if step > 0 {
        let lo = norm(start, len_i);
        let hi = norm(end, len_i).max(lo);
        let out_len = ((hi - lo) + step - 1) / step;
        (lo as usize, hi as usize, out_len.max(0) as usize)
    } else {
        let hi = norm(start, len_i).min(len_i).max(0);
        let hi = if start >= len_i { len_i } else { hi };
        let lo = norm(end + 1, len_i).max(0);
        let hi = hi.max(lo);
        let step_abs = -step;
        let out_len = ((hi - lo) + step_abs - 1) / step_abs;
        (lo as usize, hi as usize, out_len.max(0) as usize)
    }
}

/// A collection of [`Rangelist`]s of the same underlying length, one per
/// component (e.g. one per detector in a scan), supporting the same
/// operations lifted componentwise.
#[derive(Debug, Clone)]
pub struct Multirange {
    parts: Vec<Rangelist>,
}

impl Multirange {
    pub fn new(parts: Vec<Rangelist>) -> Self {
        Multirange { parts }
    }

    pub fn ncomp(&self) -> usize {
        self.parts.len()
    }

    pub fn parts(&self) -> &[Rangelist] {
        &self.parts
    }

    /// Dense `ncomp x len` boolean mask.
    pub fn to_mask(&self) -> Vec<Vec<bool>> {
        self.parts.iter().map(|r| r.to_mask()).collect()
    }

    pub fn invert(&self) -> Self {
        Multirange { parts: self.parts.iter().map(|r| r.invert()).collect() }
    }

    pub fn sum(&self) -> usize {
        self.parts.iter().map(|r| r.sum()).sum()
    }

    pub fn slice(&self, start: isize, end: isize, step: isize) -> Result<Self, RangelistError> {
        let parts = self
            .parts
            .iter()
            .map(|r| r.slice(start, end, step))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Multirange { parts })
    }

    /// Flatten every component's ranges into one rangelist over the same
    /// length, taking the union across components.
    pub fn flatten(&self) -> Option<Rangelist> {
        let mut iter = self.parts.iter();
        let first = iter.next()?.clone();
        Some(iter.fold(first, |acc, r| acc.union(r)))
    }
}
