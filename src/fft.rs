// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! A small separable 2-D FFT built on top of `rustfft`'s 1-D transforms,
//! used by the circulant preconditioner to apply a spatially stationary
//! kernel as a frequency-domain multiply instead of a real-space
//! convolution.

use ndarray::Array2;
use rustfft::{num_complex::Complex64, FftPlanner};

/// In-place row-then-column 2-D FFT (or inverse, with `inverse = true`).
/// `rustfft`'s inverse transform is unnormalized, so callers that round-
/// trip forward+inverse must divide by `ny * nx` themselves (this crate's
/// [`fft2d_roundtrip_scale`] does that for the one place it's needed).
pub fn fft2d(data: &mut Array2<Complex64>, inverse: bool) {
    let (ny, nx) = (data.shape()[0], data.shape()[1]);
    let mut planner = FftPlanner::<f64>::new();
    let row_fft = if inverse { planner.plan_fft_inverse(nx) } else { planner.plan_fft_forward(nx) };
    for mut row in data.outer_iter_mut() {
        let slice = row.as_slice_mut().expect("row is contiguous");
        row_fft.process(slice);
    }
    let col_fft = if inverse { planner.plan_fft_inverse(ny) } else { planner.plan_fft_forward(ny) };
    let mut col_buf = vec![Complex64::default(); ny];
    for x in 0..nx {
        for y in 0..ny {
            col_buf[y] = data[[y, x]];
        }
        col_fft.process(&mut col_buf);
        for y in 0..ny {
            data[[y, x]] = col_buf[y];
        }
    }
}

/// `1 / (ny * nx)`, the normalization `rustfft`'s unnormalized forward+
/// inverse round trip needs applied once.
pub fn fft2d_roundtrip_scale(ny: usize, nx: usize) -> f64 {
    1.0 / (ny * nx) as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forward_then_inverse_recovers_input() {
        let mut data = Array2::from_shape_fn((4, 4), |(y, x)| Complex64::new((y * 4 + x) as f64, 0.0));
        let original = data.clone();
        fft2d(&mut data, false);
        fft2d(&mut data, true);
        let scale = fft2d_roundtrip_scale(4, 4);
        data.mapv_inplace(|c| c * scale);
        for (a, b) in data.iter().zip(original.iter()) {
            approx::assert_abs_diff_eq!(a.re, b.re, epsilon = 1e-9);
            approx::assert_abs_diff_eq!(a.im, b.im, epsilon = 1e-9);
        }
    }
}
