/// Minimum pixel count (h*w) to use row-level Rayon parallelism.
pub const PARALLEL_PIXEL_THRESHOLD: usize = 65_536;

/// Minimum frame count to use frame-level Rayon parallelism.
pub const PARALLEL_FRAME_THRESHOLD: usize = 4;

/// Default half-size (pixels) of the localization window around a rough position.
pub const DEFAULT_LOCALIZE_BOX: usize = 100;

/// Default detection threshold for the first localization tier.
pub const DEFAULT_DETECTION_THRESHOLD: f64 = 1e4;

/// Threshold increment used while the first tier still sees several sources.
pub const DEFAULT_THRESHOLD_STEP: f64 = 500.0;

/// Fallback thresholds tried in order when a tier ends with no detection.
pub const DEFAULT_RETRY_THRESHOLDS: [f64; 2] = [1e3, 5e2];

/// Threshold increment used inside the fallback tiers.
pub const DEFAULT_RETRY_STEP: f64 = 250.0;

/// Default expected PSF full-width-half-max in pixels.
pub const DEFAULT_FWHM: f64 = 10.0;

/// Detection kernel truncation radius in units of the Gaussian sigma.
pub const KERNEL_SIGMA_RADIUS: f64 = 1.5;

/// Accepted DAOFIND sharpness range.
pub const DEFAULT_SHARPNESS: [f64; 2] = [0.2, 1.0];

/// Accepted DAOFIND roundness range.
pub const DEFAULT_ROUNDNESS: [f64; 2] = [-1.0, 1.0];

/// Default radius (pixels) masked around a found star before searching the next one.
pub const DEFAULT_MASK_RADIUS: f64 = 20.0;

/// Default half-size (x, y) of the reference stamp cut for cross-correlation.
pub const DEFAULT_CORR_BOX: [usize; 2] = [40, 40];

/// Default stamp half-size used when building postage stamp stacks.
pub const DEFAULT_STACK_BOX: usize = 20;

/// Default upsampling factor for the cross-correlation shift refinement.
/// 20 gives ~0.05 px accuracy; 100 gives ~0.01 px accuracy.
pub const DEFAULT_REGISTRATION_UPSAMPLE: usize = 50;

/// Width (pixels) of the refinement window around the coarse correlation peak.
pub const REGISTRATION_SEARCH_WINDOW: f64 = 1.5;

/// Offsets smaller than this are treated as exact registration.
pub const SHIFT_EPSILON: f64 = 1e-9;

/// Sigma threshold for the clipped-mean combination.
pub const DEFAULT_CLIP_SIGMA: f64 = 3.0;

/// Maximum rejection iterations for the clipped-mean combination.
pub const DEFAULT_CLIP_ITERATIONS: usize = 5;

/// Header keyword holding the instrument rotator offset in degrees.
pub const ROTATION_HEADER_KEY: &str = "ROTOFF";

/// Rotator offset reading that corresponds to north up.
pub const ROLL_ZERO_DEG: f64 = 180.0;

/// Fixed angular correction between the rotator zero and true north (degrees).
pub const NORTH_OFFSET_DEG: f64 = -1.80;

/// File name of the centroid table written next to the dataset.
pub const LOCATIONS_FILE_NAME: &str = "ABLocations";

/// Default file name suffix selecting frames of a dataset.
pub const DEFAULT_FRAME_SUFFIX: &str = "_skysub.fit";

/// Side length of the median filter applied before star searches.
pub const MEDIAN_FILTER_SIZE: usize = 3;

/// Eigenvalues at or below this fraction of the largest are treated as
/// non-positive and their modes dropped.
pub const EIGENVALUE_RELATIVE_FLOOR: f64 = 1e-12;

/// Default truncation ranks for PSF subtraction.
pub const DEFAULT_KLIP_RANKS: [usize; 4] = [1, 3, 5, 10];
