use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::info;

use crate::detect::{locations_path, save_table, scan_frames, ScanResult};
use crate::error::{BdiError, Result};
use crate::io::source::FrameSource;
use crate::io::table::CentroidTable;
use crate::stack::build_stacks;

use super::assemble::{subtract_cubes, ReductionOutput};
use super::config::ReductionConfig;
use super::output::{dataset_name, write_reduced_cube};
use super::types::{NoOpReporter, ProgressReporter, ReductionStage};

/// Result of reducing one dataset.
#[derive(Clone, Debug)]
pub struct ReductionRun {
    pub dataset: String,
    pub output: ReductionOutput,
    /// Planes in each stamp stack (after any truncation).
    pub stacked_planes: usize,
    /// Planes the stacks would have held without truncation.
    pub expected_planes: usize,
    /// Files written; empty when writing is disabled.
    pub written: Vec<PathBuf>,
}

/// Scan a frame source and, when writing is enabled, save the table to
/// `table_path`.
pub fn run_scan(
    source: &FrameSource,
    table_path: Option<&Path>,
    config: &ReductionConfig,
    reporter: &dyn ProgressReporter,
) -> Result<ScanResult> {
    let result = scan_frames(source, &config.scan, &config.localize, reporter)?;
    if let (Some(path), true) = (table_path, config.output.write_to_disk) {
        save_table(&result.table, path, config.scan.append)?;
        info!(path = %path.display(), "Centroid table written");
    }
    Ok(result)
}

/// Build stacks from a centroid table, subtract, combine and (optionally)
/// write both cubes.
pub fn run_reduction(
    table: &CentroidTable,
    config: &ReductionConfig,
    reporter: &dyn ProgressReporter,
) -> Result<ReductionRun> {
    config.validate()?;
    let first = table
        .valid_records()
        .next()
        .map(|(_, record)| record.frame.clone())
        .ok_or_else(|| BdiError::EmptyStack("centroid table has no valid rows".into()))?;
    let dataset = config
        .output
        .dataset
        .clone()
        .unwrap_or_else(|| dataset_name(&first));

    let stacks = build_stacks(
        table,
        &config.stack,
        config.registration.upsample_factor,
        &config.rotation.header_key,
        reporter,
    )?;
    info!(
        dataset = %dataset,
        planes = stacks.len(),
        expected = stacks.expected_planes,
        "Stacks ready"
    );

    let mut output = subtract_cubes(&stacks, table, config, reporter)?;
    let mut warnings = stacks.warnings.clone();
    warnings.append(&mut output.warnings);
    output.warnings = warnings;

    let mut written = Vec::new();
    if config.output.write_to_disk {
        reporter.begin_stage(ReductionStage::Writing, Some(2));
        written.extend(write_reduced_cube(&output.a, &dataset, &config.output)?);
        reporter.advance(1);
        written.extend(write_reduced_cube(&output.b, &dataset, &config.output)?);
        reporter.advance(2);
        reporter.finish_stage();
    }

    Ok(ReductionRun {
        dataset,
        output,
        stacked_planes: stacks.len(),
        expected_planes: stacks.expected_planes,
        written,
    })
}

/// Scan the dataset in `dir`, write its table next to the frames, and
/// reduce it, with a thread-safe progress reporter.
pub fn run_pipeline_reported(
    dir: &Path,
    config: &ReductionConfig,
    reporter: Arc<dyn ProgressReporter>,
) -> Result<(ScanResult, ReductionRun)> {
    config.validate()?;
    let source = FrameSource::discover(dir, &config.scan.prefix, &config.scan.suffix)?;
    info!(dir = %dir.display(), frames = source.len(), "Reducing dataset");

    let table_path = locations_path(dir);
    let scan = run_scan(&source, Some(&table_path), config, reporter.as_ref())?;
    let run = run_reduction(&scan.table, config, reporter.as_ref())?;
    Ok((scan, run))
}

/// Scan and reduce the dataset in `dir` without progress reporting.
pub fn run_pipeline(dir: &Path, config: &ReductionConfig) -> Result<(ScanResult, ReductionRun)> {
    run_pipeline_reported(dir, config, Arc::new(NoOpReporter))
}
