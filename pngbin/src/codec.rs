//! Image decoding and PNG encoding

use std::io::Write;
use std::path::Path;

use image::codecs::png::{CompressionType, FilterType, PngEncoder};
use image::{ExtendedColorType, ImageEncoder, ImageError, RgbaImage};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
pub enum PngCompression {
    Fast,
    #[default]
    Default,
    Best,
}

impl From<PngCompression> for CompressionType {
    fn from(compression: PngCompression) -> Self {
        match compression {
            PngCompression::Fast => CompressionType::Fast,
            PngCompression::Default => CompressionType::Default,
            PngCompression::Best => CompressionType::Best,
        }
    }
}

/// Decode an image file and convert it to 8-bit RGBA, whatever its color model
pub fn load_rgba(path: &Path) -> Result<RgbaImage, ImageError> {
    let img = image::open(path)?;
    log::debug!(
        "Loaded {} ({}x{}, {:?})",
        path.display(),
        img.width(),
        img.height(),
        img.color()
    );
    Ok(img.into_rgba8())
}

/// Compress an RGBA image to PNG with the specified compression level
pub fn compress_to_png<W>(
    img: &RgbaImage,
    writer: W,
    compression: PngCompression,
) -> Result<(), ImageError>
where
    W: Write,
{
    let encoder = PngEncoder::new_with_quality(writer, compression.into(), FilterType::Adaptive);

    encoder.write_image(
        img.as_raw(),
        img.width(),
        img.height(),
        ExtendedColorType::Rgba8,
    )
}
