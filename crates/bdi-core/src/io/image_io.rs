use std::path::Path;

use image::{GrayImage, ImageBuffer, ImageFormat, Luma};
use ndarray::ArrayView2;

use crate::error::{BdiError, Result};

/// Linear stretch of finite values onto [0, 1]. Non-finite pixels map to 0.
fn normalized(plane: &ArrayView2<f64>) -> impl Fn(f64) -> f64 {
    let (lo, hi) = plane
        .iter()
        .filter(|v| v.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        });
    let span = if hi > lo { hi - lo } else { 1.0 };
    let lo = if lo.is_finite() { lo } else { 0.0 };
    move |v: f64| {
        if v.is_finite() {
            ((v - lo) / span).clamp(0.0, 1.0)
        } else {
            0.0
        }
    }
}

/// Save a reduced plane as a min/max stretched 16-bit grayscale TIFF.
pub fn save_tiff(plane: &ArrayView2<f64>, path: &Path) -> Result<()> {
    let (h, w) = plane.dim();
    let scale = normalized(plane);

    let mut pixels: Vec<u16> = Vec::with_capacity(h * w);
    for row in 0..h {
        for col in 0..w {
            pixels.push((scale(plane[[row, col]]) * 65535.0) as u16);
        }
    }

    let img = ImageBuffer::<Luma<u16>, Vec<u16>>::from_raw(w as u32, h as u32, pixels)
        .ok_or_else(|| BdiError::ShapeMismatch(format!("preview buffer for {w}x{h}")))?;
    img.save(path)?;
    Ok(())
}

/// Save a reduced plane as a min/max stretched 8-bit grayscale PNG.
pub fn save_png(plane: &ArrayView2<f64>, path: &Path) -> Result<()> {
    let (h, w) = plane.dim();
    let scale = normalized(plane);

    let mut img = GrayImage::new(w as u32, h as u32);
    for row in 0..h {
        for col in 0..w {
            let val = (scale(plane[[row, col]]) * 255.0) as u8;
            img.put_pixel(col as u32, row as u32, Luma([val]));
        }
    }

    img.save_with_format(path, ImageFormat::Png)?;
    Ok(())
}

/// Save a preview, choosing format from file extension (PNG by default).
pub fn save_preview(plane: &ArrayView2<f64>, path: &Path) -> Result<()> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("tiff" | "tif") => save_tiff(plane, path),
        _ => save_png(plane, path),
    }
}
