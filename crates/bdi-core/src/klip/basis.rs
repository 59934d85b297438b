use nalgebra::{DMatrix, SymmetricEigen};
use ndarray::{Array1, Array2, ArrayView3, Axis};
use tracing::debug;

use crate::consts::EIGENVALUE_RELATIVE_FLOOR;
use crate::error::{BdiError, Result};

/// Orthonormal eigen-image basis of a reference stack.
#[derive(Clone, Debug)]
pub struct KlBasis {
    /// Image-space modes, shape `(pixels, modes)`, descending variance.
    pub modes: Array2<f64>,
    /// Eigenvalues of `R Rᵀ` for each mode (the sample covariance
    /// rescaled by `pixels - 1`).
    pub eigenvalues: Array1<f64>,
    /// Reference-space eigenvectors, shape `(references, modes)`.
    pub eigenvectors: Array2<f64>,
    /// Sample covariance of the mean-subtracted references.
    pub covariance: Array2<f64>,
    /// Modes whose eigenvalue was not positive; their columns are zero.
    pub non_positive: usize,
    /// `(height, width)` of the images the basis spans.
    pub image_dim: (usize, usize),
}

impl KlBasis {
    /// Build up to `max_modes` modes from `reference` (shape `(n, h, w)`).
    ///
    /// Each reference image is mean subtracted. `covariance`, when given,
    /// must be the `n x n` sample covariance of those images and replaces
    /// computing it here.
    pub fn build(reference: &ArrayView3<f64>, max_modes: usize, covariance: Option<&Array2<f64>>) -> Result<Self> {
        let (n, h, w) = reference.dim();
        let p = h * w;
        if n == 0 || p < 2 {
            return Err(BdiError::EmptyStack("reference library is empty".into()));
        }
        let modes_kept = max_modes.clamp(1, n);

        let refs = flatten_mean_subtracted(reference);
        let covariance = match covariance {
            Some(c) if c.dim() == (n, n) => c.clone(),
            Some(c) => {
                return Err(BdiError::ShapeMismatch(format!(
                    "precomputed covariance is {:?}, expected ({n}, {n})",
                    c.dim()
                )))
            }
            None => refs.dot(&refs.t()) / (p - 1) as f64,
        };

        let eigen = SymmetricEigen::new(DMatrix::from_fn(n, n, |i, j| covariance[[i, j]]));
        let mut order: Vec<usize> = (0..n).collect();
        order.sort_by(|&a, &b| eigen.eigenvalues[b].total_cmp(&eigen.eigenvalues[a]));
        order.truncate(modes_kept);

        let scale = (p - 1) as f64;
        let top = eigen.eigenvalues[order[0]] * scale;
        let floor = top.max(0.0) * EIGENVALUE_RELATIVE_FLOOR;

        let mut eigenvalues = Array1::<f64>::zeros(modes_kept);
        let mut eigenvectors = Array2::<f64>::zeros((n, modes_kept));
        let mut modes = Array2::<f64>::zeros((p, modes_kept));
        let mut non_positive = 0usize;

        for (k, &idx) in order.iter().enumerate() {
            let lambda = eigen.eigenvalues[idx] * scale;
            eigenvalues[k] = lambda;
            let vector = Array1::from_shape_fn(n, |i| eigen.eigenvectors[(i, idx)]);
            eigenvectors.column_mut(k).assign(&vector);
            if !(lambda > floor) {
                non_positive += 1;
                continue;
            }
            let mode = refs.t().dot(&vector) / lambda.sqrt();
            modes.column_mut(k).assign(&mode);
        }
        debug!(references = n, modes = modes_kept, non_positive, "KL basis built");

        Ok(Self {
            modes,
            eigenvalues,
            eigenvectors,
            covariance,
            non_positive,
            image_dim: (h, w),
        })
    }

    pub fn mode_count(&self) -> usize {
        self.modes.ncols()
    }

    pub fn pixel_count(&self) -> usize {
        self.modes.nrows()
    }
}

/// Flatten `(n, h, w)` to `(n, h*w)` with each row's finite mean removed.
/// Non-finite pixels become zero.
pub(crate) fn flatten_mean_subtracted(stack: &ArrayView3<f64>) -> Array2<f64> {
    let (n, h, w) = stack.dim();
    let mut flat = Array2::<f64>::zeros((n, h * w));
    for (mut row, plane) in flat.axis_iter_mut(Axis(0)).zip(stack.axis_iter(Axis(0))) {
        let mean = finite_mean(plane.iter().copied());
        for (dst, &v) in row.iter_mut().zip(plane.iter()) {
            *dst = if v.is_finite() { v - mean } else { 0.0 };
        }
    }
    flat
}

pub(crate) fn finite_mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, count) = values
        .filter(|v| v.is_finite())
        .fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}
