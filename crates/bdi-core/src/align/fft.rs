use std::sync::Arc;

use ndarray::parallel::prelude::*;
use ndarray::{s, Array2, ArrayView2, ArrayViewMut1, Axis};
use num_complex::Complex;
use rustfft::{Fft, FftPlanner};

use crate::consts::PARALLEL_PIXEL_THRESHOLD;

/// Forward 2D FFT of `data`, zero-padded (or cropped) to `shape`.
pub fn fft2d_forward(data: &ArrayView2<f64>, shape: (usize, usize)) -> Array2<Complex<f64>> {
    let (h, w) = shape;
    let (dh, dw) = data.dim();
    let (ch, cw) = (dh.min(h), dw.min(w));

    let mut buf = Array2::<Complex<f64>>::zeros((h, w));
    buf.slice_mut(s![..ch, ..cw])
        .zip_mut_with(&data.slice(s![..ch, ..cw]), |c, &v| {
            *c = Complex::new(if v.is_finite() { v } else { 0.0 }, 0.0);
        });

    let mut planner = FftPlanner::new();
    let row_fft = planner.plan_fft_forward(w);
    let col_fft = planner.plan_fft_forward(h);
    transform_2d(&mut buf, &row_fft, &col_fft);
    buf
}

/// Inverse 2D FFT, returning the normalized real part.
pub fn ifft2d_real(spectrum: Array2<Complex<f64>>) -> Array2<f64> {
    let (h, w) = spectrum.dim();
    let mut planner = FftPlanner::new();
    let row_fft = planner.plan_fft_inverse(w);
    let col_fft = planner.plan_fft_inverse(h);

    let mut work = spectrum;
    transform_2d(&mut work, &row_fft, &col_fft);

    let scale = 1.0 / (h * w) as f64;
    work.mapv(|c| c.re * scale)
}

/// Row-wise then column-wise transform in place.
fn transform_2d(
    buf: &mut Array2<Complex<f64>>,
    row_fft: &Arc<dyn Fft<f64>>,
    col_fft: &Arc<dyn Fft<f64>>,
) {
    let (h, w) = buf.dim();
    if h * w >= PARALLEL_PIXEL_THRESHOLD {
        buf.axis_iter_mut(Axis(0))
            .into_par_iter()
            .for_each(|row| transform_lane(row, row_fft.as_ref()));
        buf.axis_iter_mut(Axis(1))
            .into_par_iter()
            .for_each(|col| transform_lane(col, col_fft.as_ref()));
    } else {
        for row in buf.axis_iter_mut(Axis(0)) {
            transform_lane(row, row_fft.as_ref());
        }
        for col in buf.axis_iter_mut(Axis(1)) {
            transform_lane(col, col_fft.as_ref());
        }
    }
}

fn transform_lane(mut lane: ArrayViewMut1<Complex<f64>>, fft: &dyn Fft<f64>) {
    let mut line = lane.to_vec();
    fft.process(&mut line);
    for (dst, src) in lane.iter_mut().zip(line) {
        *dst = src;
    }
}

/// Location and value of the maximum of a real array. NaN values are ignored.
pub fn find_peak(data: &Array2<f64>) -> (usize, usize, f64) {
    let mut best = (0, 0, f64::NEG_INFINITY);
    for ((row, col), &v) in data.indexed_iter() {
        if v > best.2 {
            best = (row, col, v);
        }
    }
    best
}

/// Signed frequency (or lag) of index `k` in a length-`n` transform.
pub fn signed_index(k: usize, n: usize) -> f64 {
    if k > n / 2 {
        k as f64 - n as f64
    } else {
        k as f64
    }
}
