use std::path::PathBuf;

use anyhow::{Context, Result};
use bdi_core::frame::Star;
use bdi_core::io::fits::{write_cube, FitsHeader, HeaderValue};
use bdi_core::pipeline::dataset_name;
use bdi_core::stack::build_stacks;
use clap::Args;

use super::{load_config, load_table};
use crate::progress::BarReporter;
use crate::summary::print_warnings;

#[derive(Args)]
pub struct StackArgs {
    /// Centroid table
    pub table: PathBuf,

    /// Directory the table's frame paths are relative to
    #[arg(long)]
    pub root: Option<PathBuf>,

    /// Reduction config file (TOML)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Stamp half-size in pixels
    #[arg(long)]
    pub stack_box: Option<usize>,

    /// Output directory for the two stack cubes
    #[arg(short, long, default_value = ".")]
    pub output: PathBuf,
}

pub fn run(args: &StackArgs) -> Result<()> {
    let mut config = load_config(args.config.as_deref())?;
    if let Some(b) = args.stack_box {
        config.stack.box_half_size = b;
    }
    let table = load_table(&args.table, args.root.as_deref())?;

    let reporter = BarReporter::new();
    let stacks = build_stacks(
        &table,
        &config.stack,
        config.registration.upsample_factor,
        &config.rotation.header_key,
        &reporter,
    )?;

    let dataset = config.output.dataset.clone().unwrap_or_else(|| {
        table
            .valid_records()
            .next()
            .map(|(_, r)| dataset_name(&r.frame))
            .unwrap_or_else(|| "dataset".into())
    });
    std::fs::create_dir_all(&args.output)?;

    for star in [Star::A, Star::B] {
        let stack = stacks.star(star);
        let mut header = FitsHeader::new();
        header.set("DATASET", HeaderValue::Text(dataset.clone()));
        header.set("STAR", HeaderValue::Text(star.to_string()));
        header.set("NFRAMES", HeaderValue::Int(stack.len() as i64));
        let path = args.output.join(format!("{dataset}_stack_{}.fit", star.suffix()));
        write_cube(&path, &stack.data.view(), &header)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        println!("Star {star}: {} stamps -> {}", stack.len(), path.display());
    }
    if stacks.is_truncated() {
        println!(
            "Stacks truncated: {} of {} planes kept",
            stacks.len(),
            stacks.expected_planes
        );
    }
    print_warnings(&stacks.warnings);
    Ok(())
}
