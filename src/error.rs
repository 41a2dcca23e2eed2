//! Crate-level error type and `Result` alias.
use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("tag {:02x}{:02x} not found", .0[0], .0[1])]
    TagNotFound([u8; 2]),

    #[error("malformed record at offset {offset}: claimed length {claimed}, {available} bytes available")]
    MalformedRecord {
        offset: usize,
        claimed: usize,
        available: usize,
    },

    #[error("buffer of {len} bytes is not a multiple of the {size}-byte element size")]
    MisalignedBuffer { len: usize, size: usize },

    #[error("file not found: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("could not load thermal image: {0}")]
    Load(String),

    #[error("could not decode temperatures: {0}")]
    Decode(String),

    #[error("sweep is not configured: {0} list is empty")]
    NotConfigured(&'static str),

    #[error("shape mismatch: expected {expected:?}, found {found:?}")]
    ShapeMismatch {
        expected: (usize, usize),
        found: (usize, usize),
    },

    #[error("could not copy metadata onto {}: {reason}", .target.display())]
    MetadataCopyFailed { target: PathBuf, reason: String },

    #[error("sweep cancelled")]
    Cancelled,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("tiff error: {0}")]
    Tiff(#[from] tiff::TiffError),
}
