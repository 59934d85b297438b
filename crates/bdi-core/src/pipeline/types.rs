use std::fmt;
use std::path::PathBuf;

use crate::frame::Star;

/// Reduction stage, used for progress reporting.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReductionStage {
    Scanning,
    Stacking,
    Subtracting,
    Combining,
    Writing,
}

impl fmt::Display for ReductionStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Scanning => write!(f, "Locating stars"),
            Self::Stacking => write!(f, "Building stamp stacks"),
            Self::Subtracting => write!(f, "Subtracting PSFs"),
            Self::Combining => write!(f, "Derotating and combining"),
            Self::Writing => write!(f, "Writing output"),
        }
    }
}

/// Thread-safe progress reporting for the reduction.
///
/// Implementors can use this to drive progress bars, logging, or any other
/// UI feedback. All methods have default no-op implementations.
pub trait ProgressReporter: Send + Sync {
    /// A new stage has started. `total_items` is the number of work items
    /// in this stage (e.g., frame count), if known.
    fn begin_stage(&self, _stage: ReductionStage, _total_items: Option<usize>) {}

    /// One work item within the current stage has completed.
    fn advance(&self, _items_done: usize) {}

    /// The current stage is finished.
    fn finish_stage(&self) {}

    /// Polled between frames and ranks; returning true aborts the run with
    /// `BdiError::Cancelled`.
    fn cancelled(&self) -> bool {
        false
    }
}

/// No-op progress reporter.
pub struct NoOpReporter;
impl ProgressReporter for NoOpReporter {}

/// A recoverable condition met during a reduction. Each is also logged at
/// `warn` level when it is recorded.
#[derive(Clone, Debug, PartialEq)]
pub enum ReductionWarning {
    /// Several sources were in the search window; the threshold was raised.
    ThresholdEscalated {
        frame: usize,
        star: usize,
        tier: usize,
        threshold: f64,
    },
    /// A tier found no source and a lower fallback tier was used.
    FallbackTier {
        frame: usize,
        star: usize,
        tier: usize,
    },
    /// No tier found the star; its centroid is NaN and the row is tagged.
    LocalizationFailed { frame: usize, star: usize },
    /// A tagged table row was left out of the stamp stacks.
    RowSkipped { row: usize, frame: PathBuf },
    /// A crop window left the frame; stacks stop before this row.
    StackTruncated {
        row: usize,
        kept_planes: usize,
        expected_planes: usize,
    },
    /// Requested ranks exceeded the reference frame count.
    RanksClipped {
        requested: Vec<usize>,
        used: Vec<usize>,
        available: usize,
    },
    /// The reference covariance had eigenvalues that are not positive.
    NonPositiveEigenvalues { star: Option<Star>, count: usize },
}

impl fmt::Display for ReductionWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ThresholdEscalated {
                frame,
                star,
                tier,
                threshold,
            } => write!(
                f,
                "frame {frame}, star {}: several sources, threshold raised to {threshold} (tier {tier})",
                star + 1
            ),
            Self::FallbackTier { frame, star, tier } => write!(
                f,
                "frame {frame}, star {}: no source at initial threshold, found in fallback tier {tier}",
                star + 1
            ),
            Self::LocalizationFailed { frame, star } => {
                write!(f, "frame {frame}, star {}: localization failed", star + 1)
            }
            Self::RowSkipped { row, frame } => {
                write!(f, "table row {row} ({}) is tagged as failed, skipped", frame.display())
            }
            Self::StackTruncated {
                row,
                kept_planes,
                expected_planes,
            } => write!(
                f,
                "crop left the frame at table row {row}; stacks truncated to {kept_planes} of {expected_planes} planes"
            ),
            Self::RanksClipped {
                requested,
                used,
                available,
            } => write!(
                f,
                "ranks {requested:?} exceed the {available} reference frames, using {used:?}"
            ),
            Self::NonPositiveEigenvalues { star, count } => match star {
                Some(star) => write!(
                    f,
                    "star {star}: {count} non-positive covariance eigenvalue(s), modes zeroed"
                ),
                None => write!(f, "{count} non-positive covariance eigenvalue(s), modes zeroed"),
            },
        }
    }
}
