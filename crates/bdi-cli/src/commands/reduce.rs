use std::path::PathBuf;

use anyhow::Result;
use bdi_core::pipeline::run_reduction;
use clap::Args;

use super::{load_config, load_table, ReduceOptions};
use crate::progress::BarReporter;
use crate::summary::{print_reduction_summary, print_run_result, print_warnings};

#[derive(Args)]
pub struct ReduceArgs {
    /// Centroid table
    pub table: PathBuf,

    /// Directory the table's frame paths are relative to
    #[arg(long)]
    pub root: Option<PathBuf>,

    /// Reduction config file (TOML)
    #[arg(long)]
    pub config: Option<PathBuf>,

    #[command(flatten)]
    pub reduce: ReduceOptions,
}

pub fn run(args: &ReduceArgs) -> Result<()> {
    let mut config = load_config(args.config.as_deref())?;
    args.reduce.apply(&mut config);
    let table = load_table(&args.table, args.root.as_deref())?;

    print_reduction_summary(&config, &args.table);
    let reporter = BarReporter::new();
    let result = run_reduction(&table, &config, &reporter)?;

    print_run_result(&result);
    print_warnings(&result.output.warnings);
    Ok(())
}
