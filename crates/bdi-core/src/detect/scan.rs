//! Dataset scan: star centroids for every frame of a dataset.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use ndarray::{s, Array2};
use rayon::prelude::*;
use tracing::{info, warn};

use crate::consts::{LOCATIONS_FILE_NAME, MEDIAN_FILTER_SIZE, PARALLEL_FRAME_THRESHOLD};
use crate::error::{BdiError, Result};
use crate::frame::FrameData;
use crate::io::fits::read_frame;
use crate::io::source::FrameSource;
use crate::io::table::{CentroidRecord, CentroidTable};
use crate::pipeline::{ProgressReporter, ReductionStage, ReductionWarning};

use super::config::{LocalizeConfig, ScanConfig};
use super::finder::find_stars;
use super::localize::{Localization, LocalizeOutcome};
use super::median::median_filter;

/// Centroid table of a scanned dataset plus the warnings raised on the way.
#[derive(Clone, Debug)]
pub struct ScanResult {
    pub table: CentroidTable,
    pub warnings: Vec<ReductionWarning>,
}

impl ScanResult {
    pub fn failed_rows(&self) -> usize {
        self.table.records.iter().filter(|r| !r.valid).count()
    }
}

/// Cut the correlation reference from the median-filtered first plane of
/// `frame`, `corr_box_half = [x, y]` pixels either side of `guess`.
///
/// Without a guess the brightest filtered pixel is used. The cut is
/// clamped to the frame.
pub fn reference_stamp(
    frame: &FrameData,
    guess: Option<[f64; 2]>,
    corr_box_half: [usize; 2],
) -> Result<Array2<f64>> {
    let filtered = median_filter(&frame.first_plane(), MEDIAN_FILTER_SIZE);
    let (h, w) = filtered.dim();

    let (x, y) = match guess {
        Some([x, y]) => (x, y),
        None => {
            let mut best = ((0, 0), f64::NEG_INFINITY);
            for (idx, &v) in filtered.indexed_iter() {
                if v > best.1 {
                    best = (idx, v);
                }
            }
            let ((row, col), _) = best;
            (col as f64, row as f64)
        }
    };

    let [bx, by] = corr_box_half;
    let row_lo = (y - by as f64).trunc().max(0.0) as usize;
    let row_hi = ((y + by as f64).trunc().max(0.0) as usize).min(h);
    let col_lo = (x - bx as f64).trunc().max(0.0) as usize;
    let col_hi = ((x + bx as f64).trunc().max(0.0) as usize).min(w);
    if row_lo >= row_hi || col_lo >= col_hi {
        return Err(BdiError::ShapeMismatch(format!(
            "reference stamp around ({x}, {y}) lies outside the {w}x{h} frame"
        )));
    }
    Ok(filtered.slice(s![row_lo..row_hi, col_lo..col_hi]).to_owned())
}

/// Locate `scan.n_stars` stars in every frame of `source`.
///
/// A frame where any star fails to localize keeps its row, tagged as
/// failed. Rows come back in frame order regardless of scheduling.
pub fn scan_frames(
    source: &FrameSource,
    scan: &ScanConfig,
    localize: &LocalizeConfig,
    reporter: &dyn ProgressReporter,
) -> Result<ScanResult> {
    scan.validate()?;
    localize.validate()?;

    let first = read_frame(source.first()?)?;
    let stamp = reference_stamp(&first, scan.reference_guess, scan.corr_box_half)?;
    info!(
        frames = source.len(),
        stamp_width = stamp.ncols(),
        stamp_height = stamp.nrows(),
        "Scanning dataset"
    );

    reporter.begin_stage(ReductionStage::Scanning, Some(source.len()));
    let counter = AtomicUsize::new(0);
    let scan_one = |(index, path): (usize, &PathBuf)| -> Result<(CentroidRecord, Vec<ReductionWarning>)> {
        if reporter.cancelled() {
            return Err(BdiError::Cancelled);
        }
        let data = read_frame(path)?;
        let located = find_stars(&stamp.view(), &data, scan.n_stars, scan.mask_radius, localize)?;
        let warnings = localization_warnings(index, &located);
        let record = CentroidRecord::new(path.clone(), located.iter().map(|l| l.centroid).collect());
        let done = counter.fetch_add(1, Ordering::Relaxed) + 1;
        reporter.advance(done);
        Ok((record, warnings))
    };

    let rows: Vec<Result<(CentroidRecord, Vec<ReductionWarning>)>> =
        if source.len() >= PARALLEL_FRAME_THRESHOLD {
            source.paths().par_iter().enumerate().map(scan_one).collect()
        } else {
            source.paths().iter().enumerate().map(scan_one).collect()
        };
    reporter.finish_stage();

    let mut table = CentroidTable::new(scan.n_stars);
    let mut warnings = Vec::new();
    for row in rows {
        let (record, row_warnings) = row?;
        table.push(record)?;
        warnings.extend(row_warnings);
    }

    let result = ScanResult { table, warnings };
    info!(
        frames = result.table.len(),
        failed = result.failed_rows(),
        "Scan complete"
    );
    Ok(result)
}

/// Default location of a dataset's centroid table.
pub fn locations_path(dir: &Path) -> PathBuf {
    dir.join(LOCATIONS_FILE_NAME)
}

/// Write the table to `path`, or append its rows when `append` is set
/// (the header is then written only if the file does not exist yet).
pub fn save_table(table: &CentroidTable, path: &Path, append: bool) -> Result<()> {
    if !append {
        return table.write(path);
    }
    if !path.exists() {
        CentroidTable::create_file(path, table.n_stars)?;
    }
    for record in &table.records {
        CentroidTable::append_record(path, record)?;
    }
    Ok(())
}

fn localization_warnings(frame: usize, located: &[Localization]) -> Vec<ReductionWarning> {
    let mut warnings = Vec::new();
    for (star, loc) in located.iter().enumerate() {
        match loc.outcome {
            LocalizeOutcome::Found {
                tier,
                threshold,
                escalations,
            } => {
                if tier > 0 {
                    warnings.push(ReductionWarning::FallbackTier { frame, star, tier });
                }
                if escalations > 0 {
                    warnings.push(ReductionWarning::ThresholdEscalated {
                        frame,
                        star,
                        tier,
                        threshold,
                    });
                }
            }
            LocalizeOutcome::Failed { .. } => {
                warnings.push(ReductionWarning::LocalizationFailed { frame, star });
            }
        }
    }
    for w in &warnings {
        warn!("{w}");
    }
    warnings
}
