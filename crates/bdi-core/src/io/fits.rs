//! FITS primary-HDU access through cfitsio.
//!
//! Frames are 2-D images or 3-D cubes in the primary HDU; cfitsio applies
//! BZERO/BSCALE while reading, so every frame comes back as physical `f64`
//! values. Output cubes are written as BITPIX = -64 with a few keywords.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use fitsio::hdu::{FitsHdu, HduInfo};
use fitsio::headers::ReadsKey;
use fitsio::images::{ImageDescription, ImageType};
use fitsio::FitsFile;
use ndarray::{Array2, Array3, ArrayView2, ArrayView3};

use crate::error::{BdiError, Result};
use crate::frame::{FrameData, ScienceFrame};

/// cfitsio keeps process-wide state; calls are serialized through this lock.
static CFITSIO: Mutex<()> = Mutex::new(());

fn cfitsio_lock() -> MutexGuard<'static, ()> {
    CFITSIO.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn fits_error(path: &Path, err: fitsio::errors::Error) -> BdiError {
    BdiError::Fits {
        path: path.display().to_string(),
        message: err.to_string(),
    }
}

/// Value of a keyword written to an output header.
#[derive(Clone, Debug, PartialEq)]
pub enum HeaderValue {
    Int(i64),
    Float(f64),
    Text(String),
}

/// Ordered keywords for an output file. Structural keywords are generated
/// by cfitsio and must not appear here.
#[derive(Clone, Debug, Default)]
pub struct FitsHeader {
    cards: Vec<(String, HeaderValue)>,
}

impl FitsHeader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a keyword, replacing an existing one with the same name.
    pub fn set(&mut self, key: &str, value: HeaderValue) {
        let key = key.to_ascii_uppercase();
        if let Some(card) = self.cards.iter_mut().find(|(k, _)| *k == key) {
            card.1 = value;
        } else {
            self.cards.push((key, value));
        }
    }

    pub fn get(&self, key: &str) -> Option<&HeaderValue> {
        let key = key.to_ascii_uppercase();
        self.cards.iter().find(|(k, _)| *k == key).map(|(_, v)| v)
    }

    pub fn cards(&self) -> impl Iterator<Item = (&str, &HeaderValue)> {
        self.cards.iter().map(|(k, v)| (k.as_str(), v))
    }
}

/// Geometry of a primary image HDU, read without touching the pixels.
#[derive(Clone, Debug, PartialEq)]
pub struct FitsInfo {
    /// Array shape, slowest axis first: `[height, width]` or `[planes, height, width]`.
    pub shape: Vec<usize>,
    pub bitpix: i32,
}

impl FitsInfo {
    /// Axis lengths in FITS order (NAXIS1 first).
    pub fn axes(&self) -> Vec<usize> {
        self.shape.iter().rev().copied().collect()
    }

    /// Exposure planes stored in the file.
    pub fn plane_count(&self) -> usize {
        match self.shape.as_slice() {
            [n, _, _] => *n,
            _ => 1,
        }
    }

    /// Bytes of pixel data once read as `f64`.
    pub fn data_bytes(&self) -> usize {
        self.shape.iter().product::<usize>() * std::mem::size_of::<f64>()
    }
}

fn bitpix_of(image_type: &ImageType) -> i32 {
    match image_type {
        ImageType::UnsignedByte | ImageType::Byte => 8,
        ImageType::Short | ImageType::UnsignedShort => 16,
        ImageType::Long | ImageType::UnsignedLong => 32,
        ImageType::LongLong => 64,
        ImageType::Float => -32,
        ImageType::Double => -64,
    }
}

fn primary_image(path: &Path) -> Result<(FitsFile, FitsHdu, FitsInfo)> {
    let mut file = FitsFile::open(path).map_err(|e| fits_error(path, e))?;
    let hdu = file.primary_hdu().map_err(|e| fits_error(path, e))?;
    let info = match &hdu.info {
        HduInfo::ImageInfo { shape, image_type } => FitsInfo {
            shape: shape.clone(),
            bitpix: bitpix_of(image_type),
        },
        _ => {
            return Err(BdiError::InvalidFits(format!(
                "{}: primary HDU is not an image",
                path.display()
            )))
        }
    };
    Ok((file, hdu, info))
}

fn read_pixels(path: &Path, file: &mut FitsFile, hdu: &FitsHdu, info: &FitsInfo) -> Result<FrameData> {
    let pixels: Vec<f64> = hdu.read_image(file).map_err(|e| fits_error(path, e))?;
    let shape_error = |e: ndarray::ShapeError| BdiError::InvalidFits(format!("{}: {e}", path.display()));
    match info.shape.as_slice() {
        [h, w] => Array2::from_shape_vec((*h, *w), pixels)
            .map(FrameData::Single)
            .map_err(shape_error),
        [n, h, w] => Array3::from_shape_vec((*n, *h, *w), pixels)
            .map(FrameData::Cube)
            .map_err(shape_error),
        other => Err(BdiError::InvalidFits(format!(
            "{}: unsupported NAXIS = {}",
            path.display(),
            other.len()
        ))),
    }
}

fn optional_key<T: ReadsKey>(file: &mut FitsFile, hdu: &FitsHdu, key: &str) -> Option<T> {
    hdu.read_key(file, key).ok()
}

/// Shape and BITPIX of the primary HDU.
pub fn inspect(path: &Path) -> Result<FitsInfo> {
    let _guard = cfitsio_lock();
    let (_, _, info) = primary_image(path)?;
    Ok(info)
}

/// Pixel data of the primary HDU.
pub fn read_frame(path: &Path) -> Result<FrameData> {
    let _guard = cfitsio_lock();
    let (mut file, hdu, info) = primary_image(path)?;
    read_pixels(path, &mut file, &hdu, &info)
}

/// Pixel data plus the rotator offset stored under `rotation_key`.
pub fn read_science_frame(path: &Path, rotation_key: &str) -> Result<ScienceFrame> {
    let _guard = cfitsio_lock();
    let (mut file, hdu, info) = primary_image(path)?;
    let data = read_pixels(path, &mut file, &hdu, &info)?;
    let rotation_offset = optional_key::<f64>(&mut file, &hdu, rotation_key);
    Ok(ScienceFrame {
        path: path.to_path_buf(),
        data,
        rotation_offset,
    })
}

/// A numeric keyword of the primary header, `None` when absent or not numeric.
pub fn read_key_f64(path: &Path, key: &str) -> Result<Option<f64>> {
    let _guard = cfitsio_lock();
    let (mut file, hdu, _) = primary_image(path)?;
    Ok(optional_key(&mut file, &hdu, key))
}

/// A string keyword of the primary header, `None` when absent.
pub fn read_key_str(path: &Path, key: &str) -> Result<Option<String>> {
    let _guard = cfitsio_lock();
    let (mut file, hdu, _) = primary_image(path)?;
    Ok(optional_key::<String>(&mut file, &hdu, key).map(|s| s.trim_end().to_string()))
}

/// Write a single image as a BITPIX = -64 primary HDU, replacing `path`.
pub fn write_image(path: &Path, image: &ArrayView2<f64>, header: &FitsHeader) -> Result<()> {
    let (h, w) = image.dim();
    let data = image.as_standard_layout();
    let pixels = data
        .as_slice()
        .ok_or_else(|| BdiError::ShapeMismatch("image is not contiguous".into()))?;
    write_primary(path, &[h, w], pixels, header)
}

/// Write a cube as a BITPIX = -64 primary HDU, replacing `path`.
pub fn write_cube(path: &Path, cube: &ArrayView3<f64>, header: &FitsHeader) -> Result<()> {
    let (n, h, w) = cube.dim();
    let data = cube.as_standard_layout();
    let pixels = data
        .as_slice()
        .ok_or_else(|| BdiError::ShapeMismatch("cube is not contiguous".into()))?;
    write_primary(path, &[n, h, w], pixels, header)
}

fn write_primary(path: &Path, dimensions: &[usize], pixels: &[f64], header: &FitsHeader) -> Result<()> {
    let _guard = cfitsio_lock();
    if path.exists() {
        std::fs::remove_file(path)?;
    }
    let description = ImageDescription {
        data_type: ImageType::Double,
        dimensions,
    };
    let mut file = FitsFile::create(path)
        .with_custom_primary(&description)
        .open()
        .map_err(|e| fits_error(path, e))?;
    let hdu = file.primary_hdu().map_err(|e| fits_error(path, e))?;
    hdu.write_image(&mut file, pixels).map_err(|e| fits_error(path, e))?;

    for (key, value) in header.cards() {
        let written = match value {
            HeaderValue::Int(v) => hdu.write_key(&mut file, key, *v),
            HeaderValue::Float(v) => hdu.write_key(&mut file, key, *v),
            HeaderValue::Text(s) => hdu.write_key(&mut file, key, s.clone()),
        };
        written.map_err(|e| fits_error(path, e))?;
    }
    Ok(())
}
