//! Postage-stamp stacks for both stars, co-registered to their first stamp.

use ndarray::{s, stack, Array2, Array3, ArrayView2, ArrayView3, Axis};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::align::align_to;
use crate::consts::{DEFAULT_STACK_BOX, PARALLEL_FRAME_THRESHOLD};
use crate::error::{BdiError, Result};
use crate::frame::{AlignmentOffset, Centroid, FrameData, Star};
use crate::io::fits::{inspect, read_science_frame};
use crate::io::table::CentroidTable;
use crate::pipeline::{ProgressReporter, ReductionStage, ReductionWarning};

/// Parameters for stamp extraction.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct StackConfig {
    /// Stamps span `2 * box_half_size` pixels on each side.
    pub box_half_size: usize,
}

impl Default for StackConfig {
    fn default() -> Self {
        Self {
            box_half_size: DEFAULT_STACK_BOX,
        }
    }
}

/// Aligned stamps of one star, one plane per exposure.
#[derive(Clone, Debug)]
pub struct StampStack {
    pub star: Star,
    /// Shape `(planes, 2 * box, 2 * box)`.
    pub data: Array3<f64>,
    /// Table row each plane was cut from.
    pub sources: Vec<usize>,
    /// Offset removed from each plane; plane 0 is always zero.
    pub offsets: Vec<AlignmentOffset>,
}

impl StampStack {
    pub fn len(&self) -> usize {
        self.data.len_of(Axis(0))
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stamp_dim(&self) -> (usize, usize) {
        let (_, h, w) = self.data.dim();
        (h, w)
    }

    pub fn plane(&self, index: usize) -> ArrayView2<'_, f64> {
        self.data.index_axis(Axis(0), index)
    }
}

/// The two synchronized stacks of a dataset. Plane `i` of `a` and plane
/// `i` of `b` always come from the same exposure.
#[derive(Clone, Debug)]
pub struct StackPair {
    pub a: StampStack,
    pub b: StampStack,
    /// Rotator offset of the frame each plane was cut from, when its
    /// header carried one.
    pub rotation_offsets: Vec<Option<f64>>,
    /// Planes the stacks would hold had no crop left its frame.
    pub expected_planes: usize,
    pub warnings: Vec<ReductionWarning>,
}

impl StackPair {
    pub fn star(&self, star: Star) -> &StampStack {
        match star {
            Star::A => &self.a,
            Star::B => &self.b,
        }
    }

    pub fn len(&self) -> usize {
        self.a.len()
    }

    pub fn is_empty(&self) -> bool {
        self.a.is_empty()
    }

    pub fn is_truncated(&self) -> bool {
        self.len() < self.expected_planes
    }
}

/// Crop a `2 * half` square around `center` from every plane of `planes`.
///
/// Returns `None` when the window would extend outside the frame or the
/// center is not finite.
pub fn crop_window(planes: &ArrayView3<f64>, center: Centroid, half: usize) -> Option<Array3<f64>> {
    if !center.is_valid() {
        return None;
    }
    let (_, h, w) = planes.dim();
    let row_lo = (center.y - half as f64).floor();
    let col_lo = (center.x - half as f64).floor();
    if row_lo < 0.0 || col_lo < 0.0 {
        return None;
    }
    let (row_lo, col_lo) = (row_lo as usize, col_lo as usize);
    let (row_hi, col_hi) = (row_lo + 2 * half, col_lo + 2 * half);
    if row_hi > h || col_hi > w {
        return None;
    }
    Some(planes.slice(s![.., row_lo..row_hi, col_lo..col_hi]).to_owned())
}

/// Build both stars' stamp stacks from a centroid table.
///
/// Rows tagged as failed are skipped. Every plane of a cube frame is
/// cropped at the row's centroid. When a crop leaves its frame the stacks
/// stop there and the partial result is returned with a
/// [`ReductionWarning::StackTruncated`]; if that happens on the first usable
/// row there is nothing to return and the call fails.
///
/// Stamp 0 of each stack is the registration reference; every other stamp
/// is shifted onto it with the cross-correlation estimator. The rotator
/// offset under `rotation_key` is kept for every plane.
///
/// Frames past a truncation are only inspected to count their planes.
pub fn build_stacks(
    table: &CentroidTable,
    config: &StackConfig,
    upsample_factor: usize,
    rotation_key: &str,
    reporter: &dyn ProgressReporter,
) -> Result<StackPair> {
    if table.n_stars < 2 {
        return Err(BdiError::InvalidTable {
            line: 1,
            reason: format!("stacking needs two stars per row, table has {}", table.n_stars),
        });
    }
    if config.box_half_size == 0 {
        return Err(BdiError::Config("stack.box_half_size must be positive".into()));
    }
    let half = config.box_half_size;

    let mut warnings = Vec::new();
    let mut raw_a: Vec<Array2<f64>> = Vec::new();
    let mut raw_b: Vec<Array2<f64>> = Vec::new();
    let mut sources = Vec::new();
    let mut rotation_offsets = Vec::new();
    let mut expected_planes = 0usize;
    let mut truncated_at: Option<usize> = None;

    reporter.begin_stage(ReductionStage::Stacking, Some(table.len()));
    for (row, record) in table.records.iter().enumerate() {
        if reporter.cancelled() {
            return Err(BdiError::Cancelled);
        }
        if !record.valid {
            let warning = ReductionWarning::RowSkipped {
                row,
                frame: record.frame.clone(),
            };
            warn!("{warning}");
            warnings.push(warning);
            reporter.advance(row + 1);
            continue;
        }

        if truncated_at.is_some() {
            match inspect(&record.frame) {
                Ok(info) => expected_planes += info.plane_count(),
                Err(e) => warn!(row, "frame past truncation not counted: {e}"),
            }
            reporter.advance(row + 1);
            continue;
        }

        let frame = read_science_frame(&record.frame, rotation_key)?;
        let planes = match &frame.data {
            FrameData::Single(image) => image.view().insert_axis(Axis(0)),
            FrameData::Cube(cube) => cube.view(),
        };
        expected_planes += planes.len_of(Axis(0));

        let crops = (
            crop_window(&planes, record.star(Star::A), half),
            crop_window(&planes, record.star(Star::B), half),
        );
        match crops {
            (Some(a), Some(b)) => {
                for (pa, pb) in a.outer_iter().zip(b.outer_iter()) {
                    raw_a.push(pa.to_owned());
                    raw_b.push(pb.to_owned());
                    sources.push(row);
                    rotation_offsets.push(frame.rotation_offset);
                }
            }
            _ => {
                if raw_a.is_empty() {
                    return Err(BdiError::EmptyStack(format!(
                        "crop window of {} px around the stars of {} leaves the frame",
                        2 * half,
                        record.frame.display()
                    )));
                }
                truncated_at = Some(row);
            }
        }
        reporter.advance(row + 1);
    }
    reporter.finish_stage();

    if raw_a.is_empty() {
        return Err(BdiError::EmptyStack("no valid rows in centroid table".into()));
    }
    if let Some(row) = truncated_at {
        let warning = ReductionWarning::StackTruncated {
            row,
            kept_planes: raw_a.len(),
            expected_planes,
        };
        warn!("{warning}");
        warnings.push(warning);
    }

    let a = align_stack(Star::A, raw_a, sources.clone(), upsample_factor)?;
    let b = align_stack(Star::B, raw_b, sources, upsample_factor)?;
    info!(planes = a.len(), stamp = 2 * half, "Stamp stacks built");

    Ok(StackPair {
        a,
        b,
        rotation_offsets,
        expected_planes,
        warnings,
    })
}

/// Register every stamp onto stamp 0 and assemble the stack.
fn align_stack(
    star: Star,
    stamps: Vec<Array2<f64>>,
    sources: Vec<usize>,
    upsample_factor: usize,
) -> Result<StampStack> {
    let reference = stamps[0].view();

    let align_one = |(i, stamp): (usize, &Array2<f64>)| -> Result<(Array2<f64>, AlignmentOffset)> {
        if i == 0 {
            Ok((stamp.clone(), AlignmentOffset::default()))
        } else {
            align_to(&reference, &stamp.view(), upsample_factor)
        }
    };

    let aligned: Vec<Result<(Array2<f64>, AlignmentOffset)>> = if stamps.len() >= PARALLEL_FRAME_THRESHOLD {
        stamps.par_iter().enumerate().map(align_one).collect()
    } else {
        stamps.iter().enumerate().map(align_one).collect()
    };
    let (planes, offsets): (Vec<Array2<f64>>, Vec<AlignmentOffset>) =
        aligned.into_iter().collect::<Result<Vec<_>>>()?.into_iter().unzip();
    debug!(%star, planes = planes.len(), "stamps registered");

    let views: Vec<ArrayView2<f64>> = planes.iter().map(|p| p.view()).collect();
    let data = stack(Axis(0), &views).map_err(|e| BdiError::ShapeMismatch(e.to_string()))?;

    Ok(StampStack {
        star,
        data,
        sources,
        offsets,
    })
}
