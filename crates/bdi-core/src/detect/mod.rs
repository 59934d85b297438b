pub mod config;
pub mod correlate;
pub mod finder;
pub mod localize;
pub mod median;
pub mod scan;

pub use config::{LocalizeConfig, ScanConfig};
pub use finder::find_stars;
pub use localize::{localize_star, Localization, LocalizeOutcome};
pub use scan::{locations_path, reference_stamp, save_table, scan_frames, ScanResult};
