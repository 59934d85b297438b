use serde::{Deserialize, Serialize};

use crate::consts::{
    DEFAULT_CORR_BOX, DEFAULT_DETECTION_THRESHOLD, DEFAULT_FRAME_SUFFIX, DEFAULT_FWHM,
    DEFAULT_LOCALIZE_BOX, DEFAULT_MASK_RADIUS, DEFAULT_RETRY_STEP, DEFAULT_RETRY_THRESHOLDS,
    DEFAULT_ROUNDNESS, DEFAULT_SHARPNESS, DEFAULT_THRESHOLD_STEP, KERNEL_SIGMA_RADIUS,
};
use crate::error::{BdiError, Result};

/// Parameters of the single-star localizer and its threshold tiers.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalizeConfig {
    /// Half-size (pixels) of the search window around the rough position.
    pub box_half_size: usize,
    /// DAOFIND detection threshold of the first tier.
    pub threshold: f64,
    /// Increment applied while the first tier still sees several sources.
    pub threshold_step: f64,
    /// Expected PSF full-width-half-max in pixels.
    pub fwhm: f64,
    /// Starting thresholds of the fallback tiers, tried in order.
    pub retry_thresholds: Vec<f64>,
    /// Increment applied inside the fallback tiers.
    pub retry_step: f64,
    /// Detection kernel truncation radius in units of sigma.
    pub sigma_radius: f64,
    /// Accepted `[min, max]` DAOFIND sharpness.
    pub sharpness: [f64; 2],
    /// Accepted `[min, max]` DAOFIND roundness.
    pub roundness: [f64; 2],
}

impl Default for LocalizeConfig {
    fn default() -> Self {
        Self {
            box_half_size: DEFAULT_LOCALIZE_BOX,
            threshold: DEFAULT_DETECTION_THRESHOLD,
            threshold_step: DEFAULT_THRESHOLD_STEP,
            fwhm: DEFAULT_FWHM,
            retry_thresholds: DEFAULT_RETRY_THRESHOLDS.to_vec(),
            retry_step: DEFAULT_RETRY_STEP,
            sigma_radius: KERNEL_SIGMA_RADIUS,
            sharpness: DEFAULT_SHARPNESS,
            roundness: DEFAULT_ROUNDNESS,
        }
    }
}

impl LocalizeConfig {
    /// `(starting threshold, step)` for every tier, first tier first.
    pub fn tiers(&self) -> Vec<(f64, f64)> {
        std::iter::once((self.threshold, self.threshold_step))
            .chain(self.retry_thresholds.iter().map(|&t| (t, self.retry_step)))
            .collect()
    }

    pub fn validate(&self) -> Result<()> {
        if self.box_half_size == 0 {
            return Err(BdiError::Config("localize.box_half_size must be positive".into()));
        }
        if !(self.fwhm > 0.0) {
            return Err(BdiError::Config("localize.fwhm must be positive".into()));
        }
        if !(self.threshold_step > 0.0) || !(self.retry_step > 0.0) {
            return Err(BdiError::Config("threshold steps must be positive".into()));
        }
        if self.tiers().iter().any(|&(t, _)| !(t > 0.0)) {
            return Err(BdiError::Config("detection thresholds must be positive".into()));
        }
        if !(self.sigma_radius > 0.0) {
            return Err(BdiError::Config("localize.sigma_radius must be positive".into()));
        }
        if self.sharpness[0] > self.sharpness[1] || self.roundness[0] > self.roundness[1] {
            return Err(BdiError::Config("sharpness and roundness ranges must be [min, max]".into()));
        }
        Ok(())
    }
}

/// Parameters of the dataset scan (reference stamp, star count, masking).
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Number of stars located per frame.
    pub n_stars: usize,
    /// Half-size `[x, y]` of the reference stamp cut from the first frame.
    pub corr_box_half: [usize; 2],
    /// Radius (pixels) zeroed around each found star before the next search.
    pub mask_radius: f64,
    /// Rough `[x, y]` position of a star in the first frame. When absent the
    /// brightest pixel of the filtered first frame is used.
    pub reference_guess: Option<[f64; 2]>,
    /// File name prefix selecting the dataset's frames.
    pub prefix: String,
    /// File name suffix selecting the dataset's frames.
    pub suffix: String,
    /// Append rows to an existing table instead of starting a new one.
    pub append: bool,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            n_stars: 2,
            corr_box_half: DEFAULT_CORR_BOX,
            mask_radius: DEFAULT_MASK_RADIUS,
            reference_guess: None,
            prefix: String::new(),
            suffix: DEFAULT_FRAME_SUFFIX.to_string(),
            append: false,
        }
    }
}

impl ScanConfig {
    pub fn validate(&self) -> Result<()> {
        if self.n_stars == 0 {
            return Err(BdiError::Config("scan.n_stars must be at least 1".into()));
        }
        if self.corr_box_half.contains(&0) {
            return Err(BdiError::Config("scan.corr_box_half must be positive".into()));
        }
        if !(self.mask_radius > 0.0) {
            return Err(BdiError::Config("scan.mask_radius must be positive".into()));
        }
        Ok(())
    }
}
