//! Single-star localization with tiered threshold escalation.
//!
//! The search is an explicit state machine over detection tiers:
//!
//! ```text
//! Searching { tier 0, t0 } --(>1 source)--> Searching { tier 0, t0 + k step }
//!          |--(0 sources)--> Searching { tier 1, t1 } --> ... --> Failed
//!          '--(1 source)--> Found
//! ```
//!
//! Sources come from DAOFIND run on the search window. Raising the
//! threshold only removes detections, so the first step count `k` that
//! leaves at most one source is found by doubling then bisecting instead
//! of re-running the finder at every increment.

use ndarray::{s, Array2, ArrayView2};
use starfield::image::starfinders::{DAOStarFinder, DAOStarFinderConfig, StellarSource};
use tracing::{debug, warn};

use crate::frame::Centroid;

use super::config::LocalizeConfig;

/// How a localization attempt ended.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum LocalizeOutcome {
    /// Exactly one source survived `threshold` in tier `tier` after
    /// `escalations` threshold steps.
    Found {
        tier: usize,
        threshold: f64,
        escalations: usize,
    },
    /// Every tier ended with no source.
    Failed { tiers_tried: usize },
}

/// Result of one localization: the centroid (NaN when failed) and how it
/// was reached.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Localization {
    pub centroid: Centroid,
    /// Integer `(x, y)` position the search window was centered on.
    pub guess: (usize, usize),
    pub outcome: LocalizeOutcome,
}

impl Localization {
    pub fn is_found(&self) -> bool {
        matches!(self.outcome, LocalizeOutcome::Found { .. })
    }
}

enum SearchState {
    Searching { tier: usize, threshold: f64 },
    Found { tier: usize, threshold: f64, position: (f64, f64) },
    Failed,
}

/// DAOFIND over one background-subtracted search window.
struct WindowFinder<'a> {
    window: Array2<f64>,
    config: &'a LocalizeConfig,
}

impl WindowFinder<'_> {
    /// Window-relative `(x, y)` centroids of the sources above `threshold`.
    fn detect(&self, threshold: f64) -> Vec<(f64, f64)> {
        let finder_config = DAOStarFinderConfig {
            threshold,
            fwhm: self.config.fwhm,
            ratio: 1.0,
            theta: 0.0,
            sigma_radius: self.config.sigma_radius,
            sharpness: self.config.sharpness[0]..=self.config.sharpness[1],
            roundness: self.config.roundness[0]..=self.config.roundness[1],
            exclude_border: false,
            brightest: None,
            peakmax: None,
            min_separation: self.config.fwhm * 0.5,
        };
        match DAOStarFinder::new(finder_config) {
            Ok(finder) => {
                let mut stars = finder.find_stars(&self.window, None);
                stars.sort_by(|a, b| b.flux().total_cmp(&a.flux()));
                stars.iter().map(|star| star.get_centroid()).collect()
            }
            Err(e) => {
                warn!(threshold, "star finder rejected its configuration: {e}");
                Vec::new()
            }
        }
    }

    /// Smallest `k >= 1` with at most one source at `threshold + k * step`,
    /// together with those sources.
    fn escalate(&self, threshold: f64, step: f64) -> (usize, Vec<(f64, f64)>) {
        let at = |k: usize| self.detect(threshold + k as f64 * step);

        let mut low = 0usize;
        let mut high = 1usize;
        let mut found = at(high);
        while found.len() > 1 {
            low = high;
            high *= 2;
            found = at(high);
        }
        while high - low > 1 {
            let mid = low + (high - low) / 2;
            let sources = at(mid);
            if sources.len() > 1 {
                low = mid;
            } else {
                high = mid;
                found = sources;
            }
        }
        (high, found)
    }
}

/// Locate the single brightest source within `config.box_half_size` of
/// `(x, y)`. The window is clamped to the image; the result is in full
/// image coordinates.
pub fn localize_star(image: &ArrayView2<f64>, x: usize, y: usize, config: &LocalizeConfig) -> Localization {
    let (h, w) = image.dim();
    let tiers = config.tiers();
    let failed = |tiers_tried| Localization {
        centroid: Centroid::FAILED,
        guess: (x, y),
        outcome: LocalizeOutcome::Failed { tiers_tried },
    };

    let half = config.box_half_size;
    let (ymin, ymax) = (y.saturating_sub(half), (y + half).min(h));
    let (xmin, xmax) = (x.saturating_sub(half), (x + half).min(w));
    if ymin >= ymax || xmin >= xmax {
        return failed(0);
    }

    let window = image.slice(s![ymin..ymax, xmin..xmax]);
    let background = window_median(&window);
    let finder = WindowFinder {
        window: window.mapv(|v| if v.is_finite() { v - background } else { 0.0 }),
        config,
    };

    let mut escalations = 0usize;
    let mut sources = finder.detect(tiers[0].0);
    let mut state = SearchState::Searching {
        tier: 0,
        threshold: tiers[0].0,
    };
    loop {
        state = match state {
            SearchState::Searching { tier, threshold } => match sources.len() {
                0 if tier + 1 < tiers.len() => {
                    debug!(tier, threshold, "no source, moving to next tier");
                    escalations = 0;
                    let next = tiers[tier + 1].0;
                    sources = finder.detect(next);
                    SearchState::Searching {
                        tier: tier + 1,
                        threshold: next,
                    }
                }
                0 => SearchState::Failed,
                1 => SearchState::Found {
                    tier,
                    threshold,
                    position: sources[0],
                },
                _ => {
                    let step = tiers[tier].1;
                    let (steps, remaining) = finder.escalate(threshold, step);
                    escalations += steps;
                    let raised = threshold + steps as f64 * step;
                    debug!(tier, from = threshold, to = raised, "several sources, raising threshold");
                    sources = remaining;
                    SearchState::Searching {
                        tier,
                        threshold: raised,
                    }
                }
            },
            SearchState::Found {
                tier,
                threshold,
                position: (cx, cy),
            } => {
                let centroid = Centroid::new(
                    (xmin as f64 + cx).clamp(0.0, (w - 1) as f64),
                    (ymin as f64 + cy).clamp(0.0, (h - 1) as f64),
                );
                return Localization {
                    centroid,
                    guess: (x, y),
                    outcome: LocalizeOutcome::Found {
                        tier,
                        threshold,
                        escalations,
                    },
                };
            }
            SearchState::Failed => return failed(tiers.len()),
        };
    }
}

fn window_median(window: &ArrayView2<f64>) -> f64 {
    let mut values: Vec<f64> = window.iter().copied().filter(|v| v.is_finite()).collect();
    if values.is_empty() {
        return 0.0;
    }
    let mid = values.len() / 2;
    *values.select_nth_unstable_by(mid, |a, b| a.total_cmp(b)).1
}
