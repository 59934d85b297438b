use std::path::PathBuf;

use anyhow::{Context, Result};
use bdi_core::detect::locations_path;
use bdi_core::io::source::FrameSource;
use bdi_core::pipeline::run_scan;
use clap::Args;

use super::{load_config, ScanOptions};
use crate::progress::BarReporter;
use crate::summary::{print_scan_summary, print_warnings};

#[derive(Args)]
pub struct ScanArgs {
    /// Dataset directory
    pub dir: PathBuf,

    /// Read frame paths from a list file instead of searching the directory
    #[arg(long)]
    pub list: Option<PathBuf>,

    /// Centroid table to write (defaults to <dir>/ABLocations)
    #[arg(short, long)]
    pub table: Option<PathBuf>,

    /// Reduction config file (TOML)
    #[arg(long)]
    pub config: Option<PathBuf>,

    #[command(flatten)]
    pub scan: ScanOptions,
}

pub fn run(args: &ScanArgs) -> Result<()> {
    let mut config = load_config(args.config.as_deref())?;
    args.scan.apply(&mut config);

    let source = match args.list {
        Some(ref list) => FrameSource::from_list_file(list)
            .with_context(|| format!("Failed to read frame list {}", list.display()))?,
        None => FrameSource::discover(&args.dir, &config.scan.prefix, &config.scan.suffix)
            .with_context(|| format!("No frames found in {}", args.dir.display()))?,
    };
    let table_path = args.table.clone().unwrap_or_else(|| locations_path(&args.dir));

    println!("Scanning {} frames for {} stars", source.len(), config.scan.n_stars);
    let reporter = BarReporter::new();
    let result = run_scan(&source, Some(&table_path), &config, &reporter)?;

    print_scan_summary(&result, &table_path);
    print_warnings(&result.warnings);
    Ok(())
}
