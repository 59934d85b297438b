use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::consts::{DEFAULT_REGISTRATION_UPSAMPLE, NORTH_OFFSET_DEG, ROLL_ZERO_DEG, ROTATION_HEADER_KEY};
use crate::detect::{LocalizeConfig, ScanConfig};
use crate::error::{BdiError, Result};
use crate::klip::KlipConfig;
use crate::stack::{SigmaClipParams, StackConfig};

/// Every tunable of a reduction, one section per stage.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ReductionConfig {
    #[serde(default)]
    pub localize: LocalizeConfig,
    #[serde(default)]
    pub scan: ScanConfig,
    #[serde(default)]
    pub stack: StackConfig,
    #[serde(default)]
    pub registration: RegistrationConfig,
    #[serde(default)]
    pub klip: KlipConfig,
    #[serde(default)]
    pub combine: SigmaClipParams,
    #[serde(default)]
    pub rotation: RotationConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

impl ReductionConfig {
    pub fn validate(&self) -> Result<()> {
        self.localize.validate()?;
        self.scan.validate()?;
        self.klip.validate()?;
        if self.stack.box_half_size == 0 {
            return Err(BdiError::Config("stack.box_half_size must be positive".into()));
        }
        if self.registration.upsample_factor == 0 {
            return Err(BdiError::Config("registration.upsample_factor must be positive".into()));
        }
        if !(self.combine.sigma > 0.0) {
            return Err(BdiError::Config("combine.sigma must be positive".into()));
        }
        if !matches!(self.output.preview_format.as_str(), "png" | "tiff" | "tif") {
            return Err(BdiError::Config(format!(
                "unknown preview format '{}'",
                self.output.preview_format
            )));
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistrationConfig {
    /// Refinement upsampling; the shift is resolved to 1/upsample_factor px.
    pub upsample_factor: usize,
}

impl Default for RegistrationConfig {
    fn default() -> Self {
        Self {
            upsample_factor: DEFAULT_REGISTRATION_UPSAMPLE,
        }
    }
}

/// How frames are turned north-up.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct RotationConfig {
    /// Header keyword holding the rotator offset in degrees.
    pub header_key: String,
    /// Rotator reading at which the detector is north-aligned.
    pub roll_zero_deg: f64,
    /// Instrument correction added on top (degrees).
    pub north_offset_deg: f64,
}

impl Default for RotationConfig {
    fn default() -> Self {
        Self {
            header_key: ROTATION_HEADER_KEY.to_string(),
            roll_zero_deg: ROLL_ZERO_DEG,
            north_offset_deg: NORTH_OFFSET_DEG,
        }
    }
}

impl RotationConfig {
    /// Counter-clockwise rotation (degrees) that derotates a frame with the
    /// given rotator offset.
    pub fn derotation_angle(&self, rotator_offset: f64) -> f64 {
        rotator_offset - self.roll_zero_deg + self.north_offset_deg
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub directory: PathBuf,
    /// Appended to output file stems.
    pub suffix: String,
    /// Dataset name for file names and headers; derived from the first
    /// frame's file name when absent.
    pub dataset: Option<String>,
    /// Write cubes to disk; otherwise results are only returned.
    pub write_to_disk: bool,
    /// Also write the median-combined cube.
    pub write_median: bool,
    /// Also write a preview image of every plane.
    pub preview: bool,
    /// Preview file extension, `png` or `tiff`.
    pub preview_format: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("."),
            suffix: String::new(),
            dataset: None,
            write_to_disk: true,
            write_median: false,
            preview: false,
            preview_format: "png".into(),
        }
    }
}
