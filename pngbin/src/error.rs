use std::path::PathBuf;

use image::ImageError;
use thiserror::Error;

/// Violations of the binary container layout.
#[derive(Debug, Error)]
pub enum FormatError {
    #[error("invalid BIN file format (missing PNG magic number)")]
    InvalidMagic { found: [u8; 4] },

    #[error("truncated header: expected 17 bytes, found {found}")]
    TruncatedHeader { found: usize },

    #[error("truncated data: header declares {expected} pixel bytes, found {found}")]
    Truncated { expected: u64, found: u64 },

    #[error("data size {data_size} does not match a {width}x{height} RGBA image ({expected} bytes)")]
    SizeMismatch {
        width: u32,
        height: u32,
        data_size: u32,
        expected: u64,
    },

    #[error("image has no pixels ({width}x{height})")]
    EmptyImage { width: u32, height: u32 },

    #[error("{width}x{height} image is too large for a 4-byte data size field")]
    DimensionsTooLarge { width: u32, height: u32 },
}

/// Coarse classification, used by callers that map failures onto status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InputNotFound,
    Unsupported,
    Format,
    Codec,
}

#[derive(Debug, Error)]
pub enum ConvertError {
    #[error("{label} file not found: {}", path.display())]
    NotFound { label: &'static str, path: PathBuf },

    #[error("File is not a PNG: {}", path.display())]
    WrongExtension { path: PathBuf },

    #[error("Cannot read raw BIN without metadata (width/height unknown)")]
    HeaderlessDecode,

    #[error(transparent)]
    Format(#[from] FormatError),

    #[error("image codec error: {0}")]
    Codec(#[from] ImageError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ConvertError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ConvertError::NotFound { .. } => ErrorKind::InputNotFound,
            ConvertError::WrongExtension { .. } | ConvertError::HeaderlessDecode => {
                ErrorKind::Unsupported
            }
            ConvertError::Format(_) => ErrorKind::Format,
            ConvertError::Codec(_) | ConvertError::Io(_) => ErrorKind::Codec,
        }
    }
}
