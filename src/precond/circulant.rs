// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! `PrecondCirculant`: approximates `(P^T N^-1 P)^-1` as `S . C^-1 . S` in
//! the Fourier domain, where `S = div^{-1/2}` is a per-pixel whitening
//! matrix and `C` is the stationary kernel of the whitened operator `S A
//! S`, estimated once at construction by probing `A`'s actual impulse
//! response rather than assumed. Much cheaper than
//! [`crate::precond::binned::Binned`] per application, at the cost of
//! assuming the whitened operator is (close to) translation-invariant.

use nalgebra::DMatrix;
use ndarray::{Array1, Array2, Array3, Array4, ArrayView1, ArrayView4, Axis};
use rustfft::num_complex::Complex64;

use crate::comm::Comm;
use crate::fft::{fft2d, fft2d_roundtrip_scale};
use crate::mask::compute_mask;
use crate::precond::Preconditioner;
use crate::signal::helpers::pseudo_pow_block;

/// Gaussian-smooth `map` in place with the given FWHM, in pixels. A plain
/// separable real-space convolution; maps used here are small enough
/// (reference-point picking runs once, at preconditioner setup) that an
/// FFT isn't warranted.
fn apply_gaussian(map: &Array2<f64>, fwhm: f64) -> Array2<f64> {
    let sigma = fwhm / (8.0_f64.ln() * 2.0).sqrt();
    let radius = (3.0 * sigma).ceil().max(1.0) as isize;
    let mut kernel = Vec::with_capacity((2 * radius + 1) as usize);
    let mut norm = 0.0;
    for i in -radius..=radius {
        let w = (-0.5 * (i as f64 / sigma).powi(2)).exp();
        kernel.push(w);
        norm += w;
    }
    for w in kernel.iter_mut() {
        *w /= norm;
    }
    let (ny, nx) = (map.shape()[0], map.shape()[1]);
    let mut tmp = Array2::<f64>::zeros((ny, nx));
    for y in 0..ny {
        for x in 0..nx {
            let mut acc = 0.0;
            for (k, &w) in kernel.iter().enumerate() {
                let dx = k as isize - radius;
                let xx = (x as isize + dx).rem_euclid(nx as isize) as usize;
                acc += w * map[[y, xx]];
            }
            tmp[[y, x]] = acc;
        }
    }
    let mut out = Array2::<f64>::zeros((ny, nx));
    for y in 0..ny {
        for x in 0..nx {
            let mut acc = 0.0;
            for (k, &w) in kernel.iter().enumerate() {
                let dy = k as isize - radius;
                let yy = (y as isize + dy).rem_euclid(ny as isize) as usize;
                acc += w * tmp[[yy, x]];
            }
            out[[y, x]] = acc;
        }
    }
    out
}

/// Pick `n_points` reference pixels spread across the coverage pattern: at
/// each step, take the highest-hitcount pixel not yet within `r_mask` of a
/// previously picked point, smoothing the hit map first so an isolated
/// single-sample spike can't dominate the pick. `r_mask` is sized so that
/// `n_points` non-overlapping disks of that radius would tile roughly a
/// third of the map's area, matching the reference implementation's
/// `area_mask = area_tot / n_points / 3`.
pub fn pick_ref_points(hits: ArrayView2<f64>, n_points: usize) -> Vec<(usize, usize)> {
    let (ny, nx) = (hits.shape()[0], hits.shape()[1]);
    let area_tot = (ny * nx) as f64;
    let area_mask = area_tot / n_points.max(1) as f64 / 3.0;
    let r_mask = (area_mask / std::f64::consts::PI).sqrt();
    let smoothed = apply_gaussian(&hits.to_owned(), r_mask.max(1.0));
    let mut available = Array2::from_elem((ny, nx), true);
    let mut picks = Vec::with_capacity(n_points);
    for _ in 0..n_points {
        let mut best: Option<((usize, usize), f64)> = None;
        for y in 0..ny {
            for x in 0..nx {
                if !available[[y, x]] {
                    continue;
                }
                let v = smoothed[[y, x]];
                if best.map_or(true, |(_, bv)| v > bv) {
                    best = Some(((y, x), v));
                }
            }
        }
        let Some((pick, _)) = best else { break };
        picks.push(pick);
        let r2 = r_mask * r_mask;
        for y in 0..ny {
            for x in 0..nx {
                let dy = y as f64 - pick.0 as f64;
                let dx = x as f64 - pick.1 as f64;
                if dy * dy + dx * dx <= r2 {
                    available[[y, x]] = false;
                }
            }
        }
    }
    picks
}

/// Multiply every pixel's `ncomp`-vector in `area` by its per-pixel
/// `ncomp x ncomp` matrix in `mat` (`[ncomp, ncomp, ny, nx]`), in place.
fn apply_pixelwise_matrix(area: &mut Array3<f64>, mat: &Array4<f64>) {
    let (ncomp, ny, nx) = (area.shape()[0], area.shape()[1], area.shape()[2]);
    let mut v = vec![0.0; ncomp];
    for y in 0..ny {
        for x in 0..nx {
            for (i, slot) in v.iter_mut().enumerate() {
                *slot = area[[i, y, x]];
            }
            for i in 0..ncomp {
                let mut acc = 0.0;
                for j in 0..ncomp {
                    acc += mat[[i, j, y, x]] * v[j];
                }
                area[[i, y, x]] = acc;
            }
        }
    }
}

/// Cyclically roll `plane` so that `(py, px)` lands on `(0, 0)`, i.e.
/// `out[y, x] = plane[(y + py) % ny, (x + px) % nx]`. Used to align each
/// reference point's measured impulse response to a common origin before
/// averaging them into one stationary kernel.
fn roll_to_origin(plane: &Array2<f64>, py: usize, px: usize) -> Array2<f64> {
    let (ny, nx) = (plane.shape()[0], plane.shape()[1]);
    Array2::from_shape_fn((ny, nx), |(y, x)| plane[[(y + py) % ny, (x + px) % nx]])
}

pub struct Circulant {
    ncomp: usize,
    ny: usize,
    nx: usize,
    /// Per-pixel whitening matrix `S = div^{-1/2}` (`[ncomp, ncomp, ny,
    /// nx]`), zero on masked pixels.
    whiten: Array4<f64>,
    /// `iC^-1`, one Fourier-domain plane per component (cross-component
    /// mixing is dropped at this step: the per-pixel whitening above
    /// already absorbs the component coupling, so each whitened
    /// component's spatial spectrum is treated as an independent
    /// circulant system).
    icirc_inv: Array3<Complex64>,
}

impl Circulant {
    /// `div` is the full per-pixel `P^T W^-1 P` block (see
    /// [`crate::signal::helpers::calc_div_map`]); `hits` is the
    /// corresponding hit count, used only to pick reference points.
    /// `a_apply` applies the actual system operator `A` to a flat `[ncomp,
    /// ny, nx]` DOF vector; unlike [`crate::precond::submap::Submap`],
    /// which must keep calling its coarse operator on every `apply`, this
    /// preconditioner only needs `A` once, here, to measure its stationary
    /// kernel, so a borrowed closure suffices rather than an owned,
    /// stored one.
    pub fn new(
        div: ArrayView4<f64>,
        hits: ndarray::ArrayView2<f64>,
        n_ref_points: usize,
        eig_limit: f64,
        condition_lim: f64,
        a_apply: &(dyn Fn(ArrayView1<f64>) -> Array1<f64> + Send + Sync),
    ) -> Self {
        let ncomp = div.shape()[0];
        let (ny, nx) = (div.shape()[2], div.shape()[3]);
        let ref_points = pick_ref_points(hits, n_ref_points.max(1));
        let mask = compute_mask(div, condition_lim);

        // S = div^{-1/2}, per pixel, zero where the block is masked out.
        let mut whiten = Array4::<f64>::zeros((ncomp, ncomp, ny, nx));
        for y in 0..ny {
            for x in 0..nx {
                if !mask[[y, x]] {
                    continue;
                }
                let mut block = DMatrix::<f64>::zeros(ncomp, ncomp);
                for i in 0..ncomp {
                    for j in 0..ncomp {
                        block[(i, j)] = div[[i, j, y, x]];
                    }
                }
                let s = pseudo_pow_block(&block, -0.5, eig_limit);
                for i in 0..ncomp {
                    for j in 0..ncomp {
                        whiten[[i, j, y, x]] = s[(i, j)];
                    }
                }
            }
        }

        // Measure the whitened operator's impulse response at each
        // reference point, one input component at a time: whiten a unit
        // impulse, apply A, whiten the result again, roll the reference
        // point to the origin, and accumulate.
        let mut kernel_sum = Array3::<f64>::zeros((ncomp, ny, nx));
        let mut n_measured = 0usize;
        for &(py, px) in &ref_points {
            for c in 0..ncomp {
                let mut impulse = Array3::<f64>::zeros((ncomp, ny, nx));
                impulse[[c, py, px]] = 1.0;
                apply_pixelwise_matrix(&mut impulse, &whiten);
                let flat = Array1::from(impulse.into_raw_vec());
                let response_flat = a_apply(flat.view());
                let mut response = Array3::from_shape_vec((ncomp, ny, nx), response_flat.into_raw_vec())
                    .expect("A preserves the [ncomp, ny, nx] DOF shape");
                apply_pixelwise_matrix(&mut response, &whiten);
                let rolled = roll_to_origin(&response.index_axis(Axis(0), c).to_owned(), py, px);
                let mut plane = kernel_sum.index_axis_mut(Axis(0), c);
                plane += &rolled;
            }
            n_measured += 1;
        }
        if n_measured > 0 {
            kernel_sum.mapv_inplace(|v| v / n_measured as f64);
        }

        // iC = conj(FFT(kernel)); store its reciprocal directly since
        // `apply` only ever needs `iC^-1`.
        let mut icirc_inv = Array3::<Complex64>::zeros((ncomp, ny, nx));
        for c in 0..ncomp {
            let mut freq: Array2<Complex64> =
                kernel_sum.index_axis(Axis(0), c).mapv(|v| Complex64::new(v, 0.0));
            fft2d(&mut freq, false);
            freq.mapv_inplace(|v| v.conj());
            let mut plane = icirc_inv.index_axis_mut(Axis(0), c);
            for ((y, x), v) in freq.indexed_iter() {
                plane[[y, x]] = if v.norm() > 1e-300 { Complex64::new(1.0, 0.0) / v } else { Complex64::new(0.0, 0.0) };
            }
        }

        Circulant { ncomp, ny, nx, whiten, icirc_inv }
    }
}

impl Preconditioner for Circulant {
    /// `m <- S . F^-1( iC^-1 . F(S . m) ) / HW`.
    fn apply(&self, x: ArrayView1<f64>, _comm: &dyn Comm) -> Array1<f64> {
        let area = ndarray::ArrayView::from_shape(
            (self.ncomp, self.ny, self.nx),
            x.as_slice().expect("DOF slice must be contiguous"),
        )
        .expect("DOF slice length matches area shape");
        let mut whitened = area.to_owned();
        apply_pixelwise_matrix(&mut whitened, &self.whiten);

        let scale = fft2d_roundtrip_scale(self.ny, self.nx);
        let mut out = Array3::<f64>::zeros((self.ncomp, self.ny, self.nx));
        for c in 0..self.ncomp {
            let mut freq: Array2<Complex64> =
                whitened.index_axis(Axis(0), c).mapv(|v| Complex64::new(v, 0.0));
            fft2d(&mut freq, false);
            let icirc_inv = self.icirc_inv.index_axis(Axis(0), c);
            freq.zip_mut_with(&icirc_inv, |f, k| *f *= k);
            fft2d(&mut freq, true);
            let mut plane = out.index_axis_mut(Axis(0), c);
            for ((y, x), v) in freq.indexed_iter() {
                plane[[y, x]] = v.re * scale;
            }
        }
        apply_pixelwise_matrix(&mut out, &self.whiten);
        Array1::from(out.into_raw_vec())
    }
}
