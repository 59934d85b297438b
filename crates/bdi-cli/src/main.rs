mod commands;
mod progress;
mod summary;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "bdi", about = "Binary differential imaging PSF subtraction")]
#[command(version)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Worker threads (defaults to one per core)
    #[arg(short = 'j', long, global = true)]
    threads: Option<usize>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show FITS frame metadata
    Info(commands::info::InfoArgs),
    /// Locate both stars in every frame of a dataset
    Scan(commands::scan::ScanArgs),
    /// Build aligned postage-stamp stacks from a centroid table
    Stack(commands::stack::StackArgs),
    /// Subtract, derotate and combine from a centroid table
    Reduce(commands::reduce::ReduceArgs),
    /// Scan and reduce a dataset in one go
    Run(commands::run::RunArgs),
    /// Print or save the default reduction config
    Config(commands::config::ConfigArgs),
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("warn")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    if let Some(threads) = cli.threads {
        rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build_global()
            .context("Failed to configure worker threads")?;
    }

    match &cli.command {
        Commands::Info(args) => commands::info::run(args),
        Commands::Scan(args) => commands::scan::run(args),
        Commands::Stack(args) => commands::stack::run(args),
        Commands::Reduce(args) => commands::reduce::run(args),
        Commands::Run(args) => commands::run::run(args),
        Commands::Config(args) => commands::config::run(args),
    }
}
