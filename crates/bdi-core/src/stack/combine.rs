//! Per-pixel combination of a plane stack: median and sigma-clipped mean.

use ndarray::{Array2, ArrayView3, Axis};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::consts::{DEFAULT_CLIP_ITERATIONS, DEFAULT_CLIP_SIGMA, PARALLEL_PIXEL_THRESHOLD};
use crate::error::{BdiError, Result};

/// Parameters for sigma-clipped mean combination.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SigmaClipParams {
    /// Values farther than `sigma` standard deviations from the median are rejected.
    pub sigma: f64,
    /// Maximum number of rejection passes.
    pub iterations: usize,
}

impl Default for SigmaClipParams {
    fn default() -> Self {
        Self {
            sigma: DEFAULT_CLIP_SIGMA,
            iterations: DEFAULT_CLIP_ITERATIONS,
        }
    }
}

/// Median over the first axis of `cube`. NaN samples are ignored; a pixel
/// with no finite sample is NaN.
pub fn median_combine(cube: &ArrayView3<f64>) -> Result<Array2<f64>> {
    combine(cube, |values| median(values))
}

/// Mean over the first axis of `cube` after iterative sigma clipping.
///
/// Each pass centers on the median of the surviving samples and rejects
/// those beyond `sigma` population standard deviations, stopping early
/// once nothing changes. If every sample is rejected the plain mean is used.
pub fn sigma_clipped_mean(cube: &ArrayView3<f64>, params: &SigmaClipParams) -> Result<Array2<f64>> {
    combine(cube, |values| clipped_mean(values, params))
}

fn combine<F>(cube: &ArrayView3<f64>, reduce: F) -> Result<Array2<f64>>
where
    F: Fn(&mut Vec<f64>) -> f64 + Sync,
{
    let (n, h, w) = cube.dim();
    if n == 0 {
        return Err(BdiError::EmptySequence);
    }

    let reduce_row = |row: usize| -> Vec<f64> {
        let mut values = Vec::with_capacity(n);
        (0..w)
            .map(|col| {
                values.clear();
                values.extend(
                    cube.index_axis(Axis(1), row)
                        .index_axis(Axis(1), col)
                        .iter()
                        .copied()
                        .filter(|v| v.is_finite()),
                );
                reduce(&mut values)
            })
            .collect()
    };

    let rows: Vec<Vec<f64>> = if h * w >= PARALLEL_PIXEL_THRESHOLD && n > 1 {
        (0..h).into_par_iter().map(reduce_row).collect()
    } else {
        (0..h).map(reduce_row).collect()
    };

    let flat: Vec<f64> = rows.into_iter().flatten().collect();
    Array2::from_shape_vec((h, w), flat).map_err(|e| BdiError::ShapeMismatch(e.to_string()))
}

fn median(values: &mut [f64]) -> f64 {
    let n = values.len();
    if n == 0 {
        return f64::NAN;
    }
    let mid = n / 2;
    let upper = *values.select_nth_unstable_by(mid, |a, b| a.total_cmp(b)).1;
    if n % 2 == 1 {
        upper
    } else {
        let lower = values[..mid]
            .iter()
            .copied()
            .fold(f64::NEG_INFINITY, f64::max);
        (lower + upper) / 2.0
    }
}

fn clipped_mean(values: &mut Vec<f64>, params: &SigmaClipParams) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    let full_mean = values.iter().sum::<f64>() / values.len() as f64;

    let mut kept = values.clone();
    for _ in 0..params.iterations {
        if kept.is_empty() {
            break;
        }
        let count = kept.len() as f64;
        let mean = kept.iter().sum::<f64>() / count;
        let std = (kept.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / count).sqrt();
        let center = median(&mut kept);
        let (lo, hi) = (center - params.sigma * std, center + params.sigma * std);

        let before = kept.len();
        kept.retain(|&v| v >= lo && v <= hi);
        if kept.len() == before {
            break;
        }
    }

    if kept.is_empty() {
        full_mean
    } else {
        kept.iter().sum::<f64>() / kept.len() as f64
    }
}
