use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use bdi_core::detect::locations_path;
use bdi_core::pipeline::run_pipeline_reported;
use clap::Args;

use super::{load_config, ReduceOptions, ScanOptions};
use crate::progress::BarReporter;
use crate::summary::{print_reduction_summary, print_run_result, print_scan_summary, print_warnings};

#[derive(Args)]
pub struct RunArgs {
    /// Dataset directory
    pub dir: PathBuf,

    /// Reduction config file (TOML)
    #[arg(long)]
    pub config: Option<PathBuf>,

    #[command(flatten)]
    pub scan: ScanOptions,

    #[command(flatten)]
    pub reduce: ReduceOptions,
}

pub fn run(args: &RunArgs) -> Result<()> {
    let mut config = load_config(args.config.as_deref())?;
    args.scan.apply(&mut config);
    args.reduce.apply(&mut config);

    let table_path = locations_path(&args.dir);
    print_reduction_summary(&config, &args.dir);

    let (scan, result) = run_pipeline_reported(&args.dir, &config, Arc::new(BarReporter::new()))
        .with_context(|| format!("Reduction of {} failed", args.dir.display()))?;

    print_scan_summary(&scan, &table_path);
    print_run_result(&result);
    print_warnings(&scan.warnings);
    print_warnings(&result.output.warnings);
    Ok(())
}
