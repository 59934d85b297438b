use ndarray::{Array2, ArrayView2};
use tracing::debug;

use crate::consts::MEDIAN_FILTER_SIZE;
use crate::error::Result;
use crate::frame::FrameData;

use super::config::LocalizeConfig;
use super::correlate::correlate_same;
use super::localize::{localize_star, Localization};
use super::median::median_filter;

/// Locate `n_stars` stars in one frame, brightest correlation peak first.
///
/// Only the first plane of a cube is searched. After each star the disk of
/// `mask_radius` around it is zeroed in both the correlation map and the
/// working image, so the next maximum belongs to another source. A failed
/// localization masks around the integer peak instead, so the search still
/// moves on.
pub fn find_stars(
    reference: &ArrayView2<f64>,
    frame: &FrameData,
    n_stars: usize,
    mask_radius: f64,
    config: &LocalizeConfig,
) -> Result<Vec<Localization>> {
    let mut image = median_filter(&frame.first_plane(), MEDIAN_FILTER_SIZE);
    let mut corr = correlate_same(&image.view(), reference)?;

    let mut found = Vec::with_capacity(n_stars);
    for star in 0..n_stars {
        let (row, col) = argmax(&corr);
        let located = localize_star(&image.view(), col, row, config);
        debug!(star, x = located.centroid.x, y = located.centroid.y, "star localized");

        let (cx, cy) = if located.is_found() {
            (located.centroid.x, located.centroid.y)
        } else {
            (col as f64, row as f64)
        };
        mask_disk(&mut corr, cx, cy, mask_radius);
        mask_disk(&mut image, cx, cy, mask_radius);
        found.push(located);
    }
    Ok(found)
}

/// Position `(row, col)` of the largest finite value; ties keep the first.
fn argmax(data: &Array2<f64>) -> (usize, usize) {
    let mut best = ((0, 0), f64::NEG_INFINITY);
    for (idx, &v) in data.indexed_iter() {
        if v > best.1 {
            best = (idx, v);
        }
    }
    best.0
}

/// Zero every pixel strictly closer than `radius` to `(x, y)`.
fn mask_disk(data: &mut Array2<f64>, x: f64, y: f64, radius: f64) {
    let (h, w) = data.dim();
    let r2 = radius * radius;
    let row_lo = (y - radius).floor().max(0.0) as usize;
    let row_hi = ((y + radius).ceil().max(0.0) as usize).min(h.saturating_sub(1));
    let col_lo = (x - radius).floor().max(0.0) as usize;
    let col_hi = ((x + radius).ceil().max(0.0) as usize).min(w.saturating_sub(1));
    for row in row_lo..=row_hi {
        for col in col_lo..=col_hi {
            let dy = row as f64 - y;
            let dx = col as f64 - x;
            if dx * dx + dy * dy < r2 {
                data[[row, col]] = 0.0;
            }
        }
    }
}
