#![allow(dead_code)]

use std::path::{Path, PathBuf};

use ndarray::Array2;

use bdi_core::io::fits::{write_image, FitsHeader, HeaderValue};

/// A Gaussian point source: center `(x, y)`, peak amplitude and FWHM.
#[derive(Clone, Copy, Debug)]
pub struct Source {
    pub x: f64,
    pub y: f64,
    pub amplitude: f64,
    pub fwhm: f64,
}

impl Source {
    pub fn new(x: f64, y: f64, amplitude: f64) -> Self {
        Self {
            x,
            y,
            amplitude,
            fwhm: 10.0,
        }
    }
}

/// Render `sources` onto a zero background of `(height, width)`.
pub fn render(shape: (usize, usize), sources: &[Source]) -> Array2<f64> {
    Array2::from_shape_fn(shape, |(row, col)| {
        sources
            .iter()
            .map(|s| {
                let sigma = s.fwhm * 0.424_660_900_144_009_5;
                let dx = col as f64 - s.x;
                let dy = row as f64 - s.y;
                s.amplitude * (-(dx * dx + dy * dy) / (2.0 * sigma * sigma)).exp()
            })
            .sum()
    })
}

/// Deterministic pseudo-random values in [-0.5, 0.5).
pub struct Lcg(u64);

impl Lcg {
    pub fn new(seed: u64) -> Self {
        Self(seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407))
    }

    pub fn next_f64(&mut self) -> f64 {
        self.0 = self
            .0
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        ((self.0 >> 11) as f64 / (1u64 << 53) as f64) - 0.5
    }

    pub fn image(&mut self, shape: (usize, usize), scale: f64) -> Array2<f64> {
        Array2::from_shape_fn(shape, |_| scale * self.next_f64())
    }
}

/// Write a single-plane science frame carrying a ROTOFF keyword.
pub fn write_frame(path: &Path, image: Array2<f64>, rotoff: Option<f64>) {
    let mut header = FitsHeader::new();
    if let Some(rotoff) = rotoff {
        header.set("ROTOFF", HeaderValue::Float(rotoff));
    }
    write_image(path, &image.view(), &header).unwrap();
}

/// Write a synthetic dataset of `frames` frames into `dir`, each holding
/// `sources` displaced by `jitter(i)` and a ROTOFF of `180 + 10 i`.
pub fn write_dataset(
    dir: &Path,
    shape: (usize, usize),
    sources: &[Source],
    frames: usize,
    jitter: impl Fn(usize) -> (f64, f64),
) -> Vec<PathBuf> {
    (0..frames)
        .map(|i| {
            let (dx, dy) = jitter(i);
            let moved: Vec<Source> = sources
                .iter()
                .map(|s| Source {
                    x: s.x + dx,
                    y: s.y + dy,
                    ..*s
                })
                .collect();
            let path = dir.join(format!("BDI0933__{:05}_skysub.fit", i + 1));
            write_frame(&path, render(shape, &moved), Some(180.0 + 10.0 * i as f64));
            path
        })
        .collect()
}

pub fn sum_of_squares(plane: ndarray::ArrayView2<f64>) -> f64 {
    plane.iter().map(|v| v * v).sum()
}
