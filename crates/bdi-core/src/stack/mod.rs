pub mod builder;
pub mod combine;

pub use builder::{build_stacks, crop_window, StackConfig, StackPair, StampStack};
pub use combine::{median_combine, sigma_clipped_mean, SigmaClipParams};
