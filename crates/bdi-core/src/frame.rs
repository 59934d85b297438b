use std::fmt;
use std::path::PathBuf;

use ndarray::{Array2, Array3, ArrayView2, Axis};

/// Pixel payload of one science file: a single exposure or a cube of
/// exposures sharing one header.
#[derive(Clone, Debug)]
pub enum FrameData {
    Single(Array2<f64>),
    Cube(Array3<f64>),
}

impl FrameData {
    /// Number of exposure planes (1 for a single frame).
    pub fn plane_count(&self) -> usize {
        match self {
            Self::Single(_) => 1,
            Self::Cube(cube) => cube.len_of(Axis(0)),
        }
    }

    /// View of plane `index`. Panics if `index >= plane_count()`.
    pub fn plane(&self, index: usize) -> ArrayView2<'_, f64> {
        match self {
            Self::Single(data) => {
                assert_eq!(index, 0, "single frame has only plane 0");
                data.view()
            }
            Self::Cube(cube) => cube.index_axis(Axis(0), index),
        }
    }

    /// The plane used for localization.
    pub fn first_plane(&self) -> ArrayView2<'_, f64> {
        self.plane(0)
    }

    /// Spatial dimensions `(height, width)` shared by every plane.
    pub fn plane_dim(&self) -> (usize, usize) {
        match self {
            Self::Single(data) => data.dim(),
            Self::Cube(cube) => {
                let (_, h, w) = cube.dim();
                (h, w)
            }
        }
    }

    pub fn planes(&self) -> impl Iterator<Item = ArrayView2<'_, f64>> + '_ {
        (0..self.plane_count()).map(move |i| self.plane(i))
    }
}

/// A science file read from disk.
#[derive(Clone, Debug)]
pub struct ScienceFrame {
    pub path: PathBuf,
    pub data: FrameData,
    /// Rotator offset in degrees, if the header carried one.
    pub rotation_offset: Option<f64>,
}

/// Subpixel position of one star in one frame. NaN coordinates mark a
/// failed localization.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Centroid {
    pub x: f64,
    pub y: f64,
}

impl Centroid {
    pub const FAILED: Centroid = Centroid {
        x: f64::NAN,
        y: f64::NAN,
    };

    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn is_valid(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

/// The two co-mounted stars of a BDI observation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Star {
    A,
    B,
}

impl Star {
    /// Column position of this star in the centroid table.
    pub fn index(self) -> usize {
        match self {
            Self::A => 0,
            Self::B => 1,
        }
    }

    /// The star whose stack serves as PSF reference for this one.
    pub fn other(self) -> Star {
        match self {
            Self::A => Self::B,
            Self::B => Self::A,
        }
    }

    pub fn suffix(self) -> &'static str {
        match self {
            Self::A => "a",
            Self::B => "b",
        }
    }
}

impl fmt::Display for Star {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::A => write!(f, "A"),
            Self::B => write!(f, "B"),
        }
    }
}

/// Translation of a target image relative to a reference, in pixels.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct AlignmentOffset {
    pub dx: f64,
    pub dy: f64,
}
