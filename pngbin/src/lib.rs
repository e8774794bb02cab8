pub mod codec;
pub mod config;
pub mod convert;
pub mod error;
pub mod format;
pub mod service;

// Re-export commonly used types
pub use codec::PngCompression;
pub use config::Config;
pub use convert::{bin_to_png, default_output, png_to_bin, Conversion};
pub use error::{ConvertError, ErrorKind, FormatError};
pub use format::{decode, encode, Header, BYTES_PER_PIXEL, HEADER_LEN, MAGIC};
pub use service::{ConversionReport, ServiceError, UploadService};
