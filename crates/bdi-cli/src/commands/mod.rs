pub mod config;
pub mod info;
pub mod reduce;
pub mod run;
pub mod scan;
pub mod stack;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use bdi_core::io::table::CentroidTable;
use bdi_core::pipeline::ReductionConfig;
use clap::Args;

/// Load a reduction config from TOML, or the defaults when no file is given.
pub fn load_config(path: Option<&Path>) -> Result<ReductionConfig> {
    let Some(path) = path else {
        return Ok(ReductionConfig::default());
    };
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config {}", path.display()))?;
    toml::from_str(&contents).context("Invalid reduction config")
}

/// Read a centroid table, optionally re-rooting its relative frame paths.
pub fn load_table(path: &Path, root: Option<&Path>) -> Result<CentroidTable> {
    let table = CentroidTable::read(path)
        .with_context(|| format!("Failed to read centroid table {}", path.display()))?;
    Ok(match root {
        Some(root) => table.rebased(root),
        None => table,
    })
}

/// Flags that override the `localize` and `scan` config sections.
#[derive(Args, Clone, Debug)]
pub struct ScanOptions {
    /// Rough x position of a star in the first frame
    #[arg(long, requires = "y")]
    pub x: Option<f64>,

    /// Rough y position of a star in the first frame
    #[arg(long, requires = "x")]
    pub y: Option<f64>,

    /// Number of stars to locate per frame
    #[arg(long)]
    pub n_stars: Option<usize>,

    /// Reference stamp half-size as X,Y
    #[arg(long, value_delimiter = ',', num_args = 2)]
    pub corr_box: Option<Vec<usize>>,

    /// Localization window half-size in pixels
    #[arg(long = "box")]
    pub box_half_size: Option<usize>,

    /// Initial detection threshold
    #[arg(long)]
    pub threshold: Option<f64>,

    /// Expected PSF FWHM in pixels
    #[arg(long)]
    pub fwhm: Option<f64>,

    /// Radius masked around each found star
    #[arg(long)]
    pub mask_radius: Option<f64>,

    /// Frame file name prefix
    #[arg(long)]
    pub prefix: Option<String>,

    /// Frame file name suffix
    #[arg(long)]
    pub suffix: Option<String>,

    /// Append to an existing centroid table
    #[arg(long)]
    pub append: bool,
}

impl ScanOptions {
    pub fn apply(&self, config: &mut ReductionConfig) {
        if let (Some(x), Some(y)) = (self.x, self.y) {
            config.scan.reference_guess = Some([x, y]);
        }
        if let Some(n) = self.n_stars {
            config.scan.n_stars = n;
        }
        if let Some([bx, by]) = self.corr_box.as_deref().and_then(|v| <[usize; 2]>::try_from(v).ok()) {
            config.scan.corr_box_half = [bx, by];
        }
        if let Some(b) = self.box_half_size {
            config.localize.box_half_size = b;
        }
        if let Some(t) = self.threshold {
            config.localize.threshold = t;
        }
        if let Some(f) = self.fwhm {
            config.localize.fwhm = f;
        }
        if let Some(r) = self.mask_radius {
            config.scan.mask_radius = r;
        }
        if let Some(ref p) = self.prefix {
            config.scan.prefix = p.clone();
        }
        if let Some(ref s) = self.suffix {
            config.scan.suffix = s.clone();
        }
        if self.append {
            config.scan.append = true;
        }
    }
}

/// Flags that override the stacking, subtraction and output sections.
#[derive(Args, Clone, Debug)]
pub struct ReduceOptions {
    /// Comma-separated truncation ranks
    #[arg(long, value_delimiter = ',')]
    pub ranks: Option<Vec<usize>>,

    /// Stamp half-size in pixels
    #[arg(long)]
    pub stack_box: Option<usize>,

    /// Registration upsampling factor
    #[arg(long)]
    pub upsample: Option<usize>,

    /// Output directory
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Suffix appended to output file names
    #[arg(long)]
    pub output_suffix: Option<String>,

    /// Dataset name used in file names and headers
    #[arg(long)]
    pub dataset: Option<String>,

    /// Also write the median-combined cubes
    #[arg(long)]
    pub median: bool,

    /// Also write previews of every plane
    #[arg(long)]
    pub preview: bool,

    /// Preview format (png or tiff)
    #[arg(long)]
    pub preview_format: Option<String>,

    /// Keep results in memory only
    #[arg(long)]
    pub no_write: bool,
}

impl ReduceOptions {
    pub fn apply(&self, config: &mut ReductionConfig) {
        if let Some(ref ranks) = self.ranks {
            config.klip.ranks = ranks.clone();
        }
        if let Some(b) = self.stack_box {
            config.stack.box_half_size = b;
        }
        if let Some(u) = self.upsample {
            config.registration.upsample_factor = u;
        }
        if let Some(ref dir) = self.output {
            config.output.directory = dir.clone();
        }
        if let Some(ref s) = self.output_suffix {
            config.output.suffix = s.clone();
        }
        if let Some(ref d) = self.dataset {
            config.output.dataset = Some(d.clone());
        }
        if self.median {
            config.output.write_median = true;
        }
        if self.preview {
            config.output.preview = true;
        }
        if let Some(ref f) = self.preview_format {
            config.output.preview_format = f.clone();
        }
        if self.no_write {
            config.output.write_to_disk = false;
        }
    }
}
