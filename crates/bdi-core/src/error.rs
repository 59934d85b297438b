use thiserror::Error;

#[derive(Error, Debug)]
pub enum BdiError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid FITS file: {0}")]
    InvalidFits(String),

    #[error("FITS error in {path}: {message}")]
    Fits { path: String, message: String },

    #[error("Missing header keyword {key} in {path}")]
    MissingHeaderKey { key: String, path: String },

    #[error("Invalid centroid table (line {line}): {reason}")]
    InvalidTable { line: usize, reason: String },

    #[error("Stamp stack is empty: {0}")]
    EmptyStack(String),

    #[error("Shape mismatch: {0}")]
    ShapeMismatch(String),

    #[error("Frame index {index} out of range (total: {total})")]
    FrameIndexOutOfRange { index: usize, total: usize },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Image format error: {0}")]
    ImageError(#[from] image::ImageError),

    #[error("Empty frame sequence")]
    EmptySequence,

    #[error("Reduction cancelled")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, BdiError>;
