use ndarray::{Array2, ArrayView2, Axis};
use rayon::prelude::*;

use crate::consts::PARALLEL_PIXEL_THRESHOLD;

/// Square median filter of odd side `size`.
///
/// Out-of-range neighbours reflect about the edge with the edge pixel
/// repeated (`d c b a | a b c d`). NaN pixels sort last.
pub fn median_filter(data: &ArrayView2<f64>, size: usize) -> Array2<f64> {
    let (h, w) = data.dim();
    if h == 0 || w == 0 || size <= 1 {
        return data.to_owned();
    }
    let half = (size / 2) as i64;

    let filter_row = |row: usize, out: &mut [f64]| {
        let mut window = Vec::with_capacity(size * size);
        for (col, value) in out.iter_mut().enumerate() {
            window.clear();
            for dr in -half..=half {
                let r = reflect(row as i64 + dr, h);
                for dc in -half..=half {
                    window.push(data[[r, reflect(col as i64 + dc, w)]]);
                }
            }
            let mid = window.len() / 2;
            *value = *window.select_nth_unstable_by(mid, |a, b| a.total_cmp(b)).1;
        }
    };

    let mut out = Array2::<f64>::zeros((h, w));
    if h * w >= PARALLEL_PIXEL_THRESHOLD {
        out.axis_iter_mut(Axis(0))
            .into_par_iter()
            .enumerate()
            .for_each(|(row, mut line)| {
                if let Some(slice) = line.as_slice_mut() {
                    filter_row(row, slice);
                }
            });
    } else {
        for (row, mut line) in out.axis_iter_mut(Axis(0)).enumerate() {
            if let Some(slice) = line.as_slice_mut() {
                filter_row(row, slice);
            }
        }
    }
    out
}

/// Half-sample symmetric index: -1 -> 0, n -> n - 1.
pub(crate) fn reflect(index: i64, n: usize) -> usize {
    let period = 2 * n as i64;
    let i = index.rem_euclid(period);
    if i >= n as i64 {
        (period - 1 - i) as usize
    } else {
        i as usize
    }
}
