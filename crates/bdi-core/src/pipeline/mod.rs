pub mod assemble;
pub mod config;
pub mod output;
mod orchestrator;
mod types;

pub use assemble::{subtract_cubes, ReducedCube, ReductionOutput};
pub use config::{OutputConfig, ReductionConfig, RegistrationConfig, RotationConfig};
pub use orchestrator::{run_pipeline, run_pipeline_reported, run_reduction, run_scan, ReductionRun};
pub use output::{dataset_name, write_reduced_cube};
pub use types::{NoOpReporter, ProgressReporter, ReductionStage, ReductionWarning};
