use std::sync::Arc;

use ndarray::{Array1, Array2, Array3, ArrayView2, ArrayView3, Axis};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::align::align_to;
use crate::consts::{DEFAULT_KLIP_RANKS, DEFAULT_REGISTRATION_UPSAMPLE};
use crate::error::{BdiError, Result};
use crate::frame::AlignmentOffset;
use crate::pipeline::ReductionWarning;

use super::basis::{finite_mean, KlBasis};

/// Truncation ranks to reduce with.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct KlipConfig {
    pub ranks: Vec<usize>,
}

impl Default for KlipConfig {
    fn default() -> Self {
        Self {
            ranks: DEFAULT_KLIP_RANKS.to_vec(),
        }
    }
}

impl KlipConfig {
    pub fn validate(&self) -> Result<()> {
        if self.ranks.is_empty() {
            return Err(BdiError::Config("klip.ranks must not be empty".into()));
        }
        if self.ranks.contains(&0) {
            return Err(BdiError::Config("klip.ranks must be positive".into()));
        }
        Ok(())
    }
}

/// Optional inputs of [`psf_subtract`].
#[derive(Clone, Debug)]
pub struct KlipOptions {
    /// Upsampling of the registration refinement.
    pub upsample_factor: usize,
    /// Basis from an earlier call on the same reference stack.
    pub basis: Option<Arc<KlBasis>>,
    /// Covariance of the reference stack, used when no basis is given.
    pub covariance: Option<Array2<f64>>,
}

impl Default for KlipOptions {
    fn default() -> Self {
        Self {
            upsample_factor: DEFAULT_REGISTRATION_UPSAMPLE,
            basis: None,
            covariance: None,
        }
    }
}

/// Output of [`psf_subtract`].
#[derive(Clone, Debug)]
pub struct KlipResult {
    /// One residual image per rank, shape `(ranks, h, w)`.
    pub residuals: Array3<f64>,
    /// Ranks actually used, after clipping to the library size.
    pub ranks: Vec<usize>,
    /// The basis used, for reuse on later science images.
    pub basis: Arc<KlBasis>,
    /// Offset removed from the science image before projection.
    pub offset: AlignmentOffset,
    pub warnings: Vec<ReductionWarning>,
}

/// Clip every rank to at most `available` modes.
///
/// Returns the clipped list and, if anything changed, the warning to report.
pub fn clip_ranks(ranks: &[usize], available: usize) -> (Vec<usize>, Option<ReductionWarning>) {
    let used: Vec<usize> = ranks.iter().map(|&k| k.min(available)).collect();
    if used.as_slice() == ranks {
        return (used, None);
    }
    let warning = ReductionWarning::RanksClipped {
        requested: ranks.to_vec(),
        used: used.clone(),
        available,
    };
    (used, Some(warning))
}

/// Subtract the PSF of `science` estimated from the `reference` library,
/// once for each truncation rank in `ranks`.
///
/// The science image is first registered onto the mean reference image.
/// Ranks above the library size are clipped with a warning. The output
/// always has one plane per requested rank.
pub fn psf_subtract(
    science: &ArrayView2<f64>,
    reference: &ArrayView3<f64>,
    ranks: &[usize],
    options: &KlipOptions,
) -> Result<KlipResult> {
    let (n, h, w) = reference.dim();
    if science.dim() != (h, w) {
        return Err(BdiError::ShapeMismatch(format!(
            "science image {:?} vs reference planes ({h}, {w})",
            science.dim()
        )));
    }
    if n == 0 {
        return Err(BdiError::EmptyStack("reference library is empty".into()));
    }
    if ranks.is_empty() || ranks.contains(&0) {
        return Err(BdiError::Config(format!("invalid rank list {ranks:?}")));
    }

    let mut warnings = Vec::new();
    let (ranks, clipped) = clip_ranks(ranks, n);
    if let Some(warning) = clipped {
        warn!("{warning}");
        warnings.push(warning);
    }
    let max_rank = ranks.iter().copied().max().unwrap_or(1);

    let mean_reference = reference.mean_axis(Axis(0)).ok_or(BdiError::EmptySequence)?;
    let (aligned, offset) = align_to(&mean_reference.view(), science, options.upsample_factor)?;

    let basis = match &options.basis {
        Some(basis) => {
            if basis.image_dim != (h, w) || basis.mode_count() < max_rank {
                return Err(BdiError::ShapeMismatch(format!(
                    "precomputed basis has {} modes over {:?}, need {max_rank} over ({h}, {w})",
                    basis.mode_count(),
                    basis.image_dim
                )));
            }
            Arc::clone(basis)
        }
        None => {
            let basis = KlBasis::build(reference, max_rank, options.covariance.as_ref())?;
            if basis.non_positive > 0 {
                let warning = ReductionWarning::NonPositiveEigenvalues {
                    star: None,
                    count: basis.non_positive,
                };
                warn!("{warning}");
                warnings.push(warning);
            }
            Arc::new(basis)
        }
    };

    let residuals = subtract_with_basis(&aligned.view(), &basis, &ranks)?;
    debug!(dx = offset.dx, dy = offset.dy, ?ranks, "PSF subtracted");

    Ok(KlipResult {
        residuals,
        ranks,
        basis,
        offset,
        warnings,
    })
}

/// Project an already registered image onto `basis` and subtract the
/// reconstruction for each rank.
///
/// All ranks come from one product: the projection coefficients are laid
/// out in a lower-triangular matrix whose row `k - 1` keeps the first `k`,
/// so `tril · modesᵀ` holds every truncated reconstruction at once.
pub fn subtract_with_basis(image: &ArrayView2<f64>, basis: &KlBasis, ranks: &[usize]) -> Result<Array3<f64>> {
    let (h, w) = image.dim();
    if basis.image_dim != (h, w) {
        return Err(BdiError::ShapeMismatch(format!(
            "image {:?} vs basis {:?}",
            (h, w),
            basis.image_dim
        )));
    }
    if ranks.is_empty() || ranks.contains(&0) {
        return Err(BdiError::Config(format!("invalid rank list {ranks:?}")));
    }
    let max_rank = ranks.iter().copied().max().unwrap_or(0);
    if max_rank > basis.mode_count() {
        return Err(BdiError::ShapeMismatch(format!(
            "rank {max_rank} requested from a {}-mode basis",
            basis.mode_count()
        )));
    }

    let mean = finite_mean(image.iter().copied());
    let target: Array1<f64> = image.iter().map(|&v| if v.is_finite() { v - mean } else { 0.0 }).collect();

    let modes = basis.modes.slice(ndarray::s![.., ..max_rank]);
    let coefficients = modes.t().dot(&target);
    let tril = Array2::from_shape_fn((max_rank, max_rank), |(i, j)| if j <= i { coefficients[j] } else { 0.0 });
    let reconstructions = tril.dot(&modes.t());

    let mut residuals = Array3::<f64>::zeros((ranks.len(), h, w));
    for (mut plane, &k) in residuals.axis_iter_mut(Axis(0)).zip(ranks) {
        let psf = reconstructions.row(k - 1);
        for ((dst, &t), &model) in plane.iter_mut().zip(target.iter()).zip(psf.iter()) {
            *dst = t - model;
        }
    }
    Ok(residuals)
}
