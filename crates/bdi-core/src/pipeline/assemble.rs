//! Cube assembly: per-star PSF subtraction over the whole stack, derotation
//! to north-up, and combination per truncation rank.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use ndarray::{stack, Array2, Array3, ArrayView2, Axis};
use rayon::prelude::*;
use tracing::{info, warn};

use crate::align::{rotate_into, rotated_shape};
use crate::consts::PARALLEL_FRAME_THRESHOLD;
use crate::error::{BdiError, Result};
use crate::frame::Star;
use crate::io::table::CentroidTable;
use crate::klip::{clip_ranks, psf_subtract, KlBasis, KlipOptions};
use crate::stack::{median_combine, sigma_clipped_mean, StackPair};

use super::config::ReductionConfig;
use super::types::{ProgressReporter, ReductionStage, ReductionWarning};

/// Combined, derotated residuals of one star.
#[derive(Clone, Debug)]
pub struct ReducedCube {
    pub star: Star,
    /// Truncation rank of each plane.
    pub ranks: Vec<usize>,
    /// Sigma-clipped mean over frames, shape `(ranks, H, W)`.
    pub mean: Array3<f64>,
    /// Median over frames, same shape as `mean`.
    pub median: Array3<f64>,
    /// Side length of the stamps before derotation.
    pub stamp_size: usize,
    /// Number of frames combined.
    pub frames: usize,
}

/// Both stars' cubes and everything worth reporting about them.
#[derive(Clone, Debug)]
pub struct ReductionOutput {
    pub a: ReducedCube,
    pub b: ReducedCube,
    pub warnings: Vec<ReductionWarning>,
}

impl ReductionOutput {
    pub fn cube(&self, star: Star) -> &ReducedCube {
        match star {
            Star::A => &self.a,
            Star::B => &self.b,
        }
    }
}

/// Subtract, derotate and combine both stars of `stacks`.
///
/// Star A is cleaned with star B's stack as the PSF library and vice
/// versa. The basis is built once per star from the first frame's
/// subtraction and reused for every later frame. Each frame is derotated
/// by the angle from its own rotator offset onto the canvas of the first
/// frame's rotation.
pub fn subtract_cubes(
    stacks: &StackPair,
    table: &CentroidTable,
    config: &ReductionConfig,
    reporter: &dyn ProgressReporter,
) -> Result<ReductionOutput> {
    if stacks.a.data.dim() != stacks.b.data.dim() || stacks.a.sources != stacks.b.sources {
        return Err(BdiError::ShapeMismatch(format!(
            "star stacks differ: A {:?}, B {:?}",
            stacks.a.data.dim(),
            stacks.b.data.dim()
        )));
    }
    if stacks.is_empty() {
        return Err(BdiError::EmptyStack("no planes to subtract".into()));
    }
    config.klip.validate()?;

    let angles = derotation_angles(stacks, table, config)?;

    let mut warnings = Vec::new();
    let (ranks, clipped) = clip_ranks(&config.klip.ranks, stacks.len());
    if let Some(warning) = clipped {
        warn!("{warning}");
        warnings.push(warning);
    }

    reporter.begin_stage(ReductionStage::Subtracting, Some(2 * stacks.len()));
    let counter = AtomicUsize::new(0);
    let frames_a = subtract_star(Star::A, stacks, &ranks, &angles, config, reporter, &counter, &mut warnings)?;
    let frames_b = subtract_star(Star::B, stacks, &ranks, &angles, config, reporter, &counter, &mut warnings)?;
    reporter.finish_stage();

    reporter.begin_stage(ReductionStage::Combining, Some(2 * ranks.len()));
    let stamp_size = stacks.a.stamp_dim().0;
    let a = combine_star(Star::A, &frames_a, &ranks, stamp_size, config, reporter, 0)?;
    let b = combine_star(Star::B, &frames_b, &ranks, stamp_size, config, reporter, ranks.len())?;
    reporter.finish_stage();

    Ok(ReductionOutput { a, b, warnings })
}

/// Derotation angle of every stack plane, from the rotator offset its
/// source frame carried.
fn derotation_angles(stacks: &StackPair, table: &CentroidTable, config: &ReductionConfig) -> Result<Vec<f64>> {
    if stacks.rotation_offsets.len() != stacks.len() {
        return Err(BdiError::ShapeMismatch(format!(
            "{} rotator offsets for {} planes",
            stacks.rotation_offsets.len(),
            stacks.len()
        )));
    }
    stacks
        .a
        .sources
        .iter()
        .zip(&stacks.rotation_offsets)
        .map(|(&row, offset)| {
            let record = table.records.get(row).ok_or(BdiError::FrameIndexOutOfRange {
                index: row,
                total: table.len(),
            })?;
            let offset = offset.ok_or_else(|| BdiError::MissingHeaderKey {
                key: config.rotation.header_key.clone(),
                path: record.frame.display().to_string(),
            })?;
            Ok(config.rotation.derotation_angle(offset))
        })
        .collect()
}

/// Residuals of every frame of `star`, derotated: `[frame][rank]`.
#[allow(clippy::too_many_arguments)]
fn subtract_star(
    star: Star,
    stacks: &StackPair,
    ranks: &[usize],
    angles: &[f64],
    config: &ReductionConfig,
    reporter: &dyn ProgressReporter,
    counter: &AtomicUsize,
    warnings: &mut Vec<ReductionWarning>,
) -> Result<Vec<Vec<Array2<f64>>>> {
    let target = stacks.star(star);
    let reference = stacks.star(star.other());
    let n = target.len();
    let canvas = rotated_shape(target.stamp_dim(), angles[0]);

    if reporter.cancelled() {
        return Err(BdiError::Cancelled);
    }
    let first = psf_subtract(
        &target.plane(0),
        &reference.data.view(),
        ranks,
        &KlipOptions {
            upsample_factor: config.registration.upsample_factor,
            ..KlipOptions::default()
        },
    )?;
    for warning in first.warnings.iter().cloned() {
        warnings.push(match warning {
            ReductionWarning::NonPositiveEigenvalues { count, .. } => {
                ReductionWarning::NonPositiveEigenvalues {
                    star: Some(star),
                    count,
                }
            }
            other => other,
        });
    }
    let basis: Arc<KlBasis> = Arc::clone(&first.basis);
    let options = KlipOptions {
        upsample_factor: config.registration.upsample_factor,
        basis: Some(basis),
        covariance: None,
    };
    reporter.advance(counter.fetch_add(1, Ordering::Relaxed) + 1);

    let derotate = |residuals: &Array3<f64>, angle: f64| -> Vec<Array2<f64>> {
        residuals
            .outer_iter()
            .map(|plane| rotate_into(&plane, angle, canvas))
            .collect()
    };
    let first_rotated = derotate(&first.residuals, angles[0]);

    let process = |i: usize| -> Result<Vec<Array2<f64>>> {
        if reporter.cancelled() {
            return Err(BdiError::Cancelled);
        }
        let result = psf_subtract(&target.plane(i), &reference.data.view(), ranks, &options)?;
        let rotated = derotate(&result.residuals, angles[i]);
        reporter.advance(counter.fetch_add(1, Ordering::Relaxed) + 1);
        Ok(rotated)
    };
    let rest: Vec<Result<Vec<Array2<f64>>>> = if n >= PARALLEL_FRAME_THRESHOLD {
        (1..n).into_par_iter().map(process).collect()
    } else {
        (1..n).map(process).collect()
    };

    let mut per_frame = Vec::with_capacity(n);
    per_frame.push(first_rotated);
    for frame in rest {
        per_frame.push(frame?);
    }
    Ok(per_frame)
}

/// Median and clipped mean across frames for every rank.
fn combine_star(
    star: Star,
    per_frame: &[Vec<Array2<f64>>],
    ranks: &[usize],
    stamp_size: usize,
    config: &ReductionConfig,
    reporter: &dyn ProgressReporter,
    done_before: usize,
) -> Result<ReducedCube> {
    let canvas = per_frame
        .first()
        .and_then(|frame| frame.first())
        .map(|plane| plane.dim())
        .ok_or_else(|| BdiError::EmptyStack(format!("no residuals for star {star}")))?;

    let mut mean = Array3::<f64>::zeros((ranks.len(), canvas.0, canvas.1));
    let mut median = Array3::<f64>::zeros((ranks.len(), canvas.0, canvas.1));
    for r in 0..ranks.len() {
        if reporter.cancelled() {
            return Err(BdiError::Cancelled);
        }
        let planes: Vec<ArrayView2<f64>> = per_frame.iter().map(|frame| frame[r].view()).collect();
        let cube = stack(Axis(0), &planes).map_err(|e| BdiError::ShapeMismatch(e.to_string()))?;
        mean.index_axis_mut(Axis(0), r)
            .assign(&sigma_clipped_mean(&cube.view(), &config.combine)?);
        median.index_axis_mut(Axis(0), r).assign(&median_combine(&cube.view())?);
        reporter.advance(done_before + r + 1);
    }
    info!(%star, frames = per_frame.len(), ranks = ?ranks, width = canvas.1, height = canvas.0, "Star reduced");

    Ok(ReducedCube {
        star,
        ranks: ranks.to_vec(),
        mean,
        median,
        stamp_size,
        frames: per_frame.len(),
    })
}
