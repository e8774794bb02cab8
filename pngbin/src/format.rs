//! Flat RGBA container: an optional fixed header followed by raw pixel bytes.
//!
//! ```text
//! offset  size  field
//! 0       4     magic           50 4E 47 00 ("PNG\0")
//! 4       4     width           u32 LE
//! 8       4     height          u32 LE
//! 12      1     bytes per pixel always 4
//! 13      4     data size       u32 LE, width * height * 4
//! 17      n     pixel data      row-major RGBA8
//! ```
//!
//! Without the header the container is just the pixel data, which cannot be
//! turned back into an image since the dimensions are lost.

use std::io::{self, Read, Write};

use image::RgbaImage;

use crate::error::{ConvertError, FormatError};

pub const MAGIC: [u8; 4] = *b"PNG\0";
pub const BYTES_PER_PIXEL: u8 = 4;
pub const HEADER_LEN: usize = 17;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub width: u32,
    pub height: u32,
    pub bytes_per_pixel: u8,
    pub data_size: u32,
}

impl Header {
    /// Header describing an RGBA image
    pub fn for_image(img: &RgbaImage) -> Result<Self, FormatError> {
        let (width, height) = img.dimensions();
        let data_size = u32::try_from(pixel_len(width, height))
            .map_err(|_| FormatError::DimensionsTooLarge { width, height })?;

        Ok(Header {
            width,
            height,
            bytes_per_pixel: BYTES_PER_PIXEL,
            data_size,
        })
    }

    /// Number of pixel bytes an RGBA image of this size occupies
    pub fn expected_data_size(&self) -> u64 {
        pixel_len(self.width, self.height)
    }

    pub fn to_bytes(&self) -> [u8; HEADER_LEN] {
        let mut out = [0u8; HEADER_LEN];
        out[0..4].copy_from_slice(&MAGIC);
        out[4..8].copy_from_slice(&self.width.to_le_bytes());
        out[8..12].copy_from_slice(&self.height.to_le_bytes());
        out[12] = self.bytes_per_pixel;
        out[13..17].copy_from_slice(&self.data_size.to_le_bytes());
        out
    }

    pub fn write_to<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        writer.write_all(&self.to_bytes())
    }

    /// Parse a header from the start of `bytes`.
    ///
    /// The magic is checked before anything else, so a foreign file is
    /// reported as such even when it is shorter than a full header or
    /// than the magic itself.
    pub fn parse(bytes: &[u8]) -> Result<Self, FormatError> {
        let present = bytes.len().min(MAGIC.len());
        if bytes[..present] != MAGIC[..present] {
            // short input is zero padded
            let mut found = [0u8; 4];
            found[..present].copy_from_slice(&bytes[..present]);
            return Err(FormatError::InvalidMagic { found });
        }
        if bytes.len() < HEADER_LEN {
            return Err(FormatError::TruncatedHeader { found: bytes.len() });
        }

        let u32_at = |at: usize| {
            let mut field = [0u8; 4];
            field.copy_from_slice(&bytes[at..at + 4]);
            u32::from_le_bytes(field)
        };

        let header = Header {
            width: u32_at(4),
            height: u32_at(8),
            bytes_per_pixel: bytes[12],
            data_size: u32_at(13),
        };

        // tolerated: the data size check below is what protects reconstruction
        if header.bytes_per_pixel != BYTES_PER_PIXEL {
            log::warn!(
                "header declares {} bytes per pixel, decoding as RGBA anyway",
                header.bytes_per_pixel
            );
        }

        log::trace!("Parsed header: {:?}", header);
        Ok(header)
    }

    pub fn read_from<R: Read>(reader: &mut R) -> Result<Self, ConvertError> {
        let mut buf = [0u8; HEADER_LEN];
        let n = read_full(reader, &mut buf)?;
        Ok(Header::parse(&buf[..n])?)
    }
}

/// Encode an image into a container held in memory
pub fn encode(img: &RgbaImage, include_header: bool) -> Result<Vec<u8>, FormatError> {
    let pixels = pixel_bytes(img);
    let mut out = Vec::with_capacity(HEADER_LEN + pixels.len());

    if include_header {
        out.extend_from_slice(&Header::for_image(img)?.to_bytes());
    }
    out.extend_from_slice(pixels);

    Ok(out)
}

/// Stream a container to `writer`, returning the number of bytes written
pub fn write_container<W: Write>(
    mut writer: W,
    img: &RgbaImage,
    include_header: bool,
) -> Result<u64, ConvertError> {
    let pixels = pixel_bytes(img);
    let mut written = 0;

    if include_header {
        Header::for_image(img)?.write_to(&mut writer)?;
        written += HEADER_LEN as u64;
    }
    writer.write_all(pixels)?;
    writer.flush()?;

    Ok(written + pixels.len() as u64)
}

/// Decode a container with header. Bytes after the pixel data are ignored.
pub fn decode(bytes: &[u8]) -> Result<RgbaImage, FormatError> {
    let header = Header::parse(bytes)?;
    let body = &bytes[HEADER_LEN..];

    let expected = u64::from(header.data_size);
    if (body.len() as u64) < expected {
        return Err(FormatError::Truncated {
            expected,
            found: body.len() as u64,
        });
    }

    let pixels = body[..header.data_size as usize].to_vec();
    build_image(&header, pixels)
}

/// Decode a container with header from a reader.
///
/// The pixel buffer grows with the bytes actually read, a header claiming
/// more data than the source holds does not cause a large allocation.
pub fn read_container<R: Read>(mut reader: R) -> Result<RgbaImage, ConvertError> {
    let header = Header::read_from(&mut reader)?;

    let expected = u64::from(header.data_size);
    let mut pixels = Vec::new();
    reader.by_ref().take(expected).read_to_end(&mut pixels)?;

    if (pixels.len() as u64) < expected {
        return Err(FormatError::Truncated {
            expected,
            found: pixels.len() as u64,
        }
        .into());
    }

    Ok(build_image(&header, pixels)?)
}

fn build_image(header: &Header, pixels: Vec<u8>) -> Result<RgbaImage, FormatError> {
    let Header { width, height, .. } = *header;

    if width == 0 || height == 0 {
        return Err(FormatError::EmptyImage { width, height });
    }

    let expected = header.expected_data_size();
    let mismatch = || FormatError::SizeMismatch {
        width,
        height,
        data_size: header.data_size,
        expected,
    };

    if u64::from(header.data_size) != expected {
        return Err(mismatch());
    }

    RgbaImage::from_raw(width, height, pixels).ok_or_else(mismatch)
}

fn pixel_len(width: u32, height: u32) -> u64 {
    (u64::from(width) * u64::from(height)).saturating_mul(u64::from(BYTES_PER_PIXEL))
}

// the backing buffer of an ImageBuffer may be longer than the image itself
fn pixel_bytes(img: &RgbaImage) -> &[u8] {
    let len = pixel_len(img.width(), img.height()) as usize;
    &img.as_raw()[..len]
}

fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
