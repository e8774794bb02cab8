//! File-level conversions between PNG images and BIN containers

use std::fmt;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use tracing::instrument;

use crate::codec::{self, PngCompression};
use crate::error::ConvertError;
use crate::format;

pub const PNG_EXTENSION: &str = "png";
pub const BIN_EXTENSION: &str = "bin";

/// A finished conversion
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conversion {
    pub source: PathBuf,
    pub destination: PathBuf,
    pub width: u32,
    pub height: u32,
    pub bytes_written: u64,
}

impl fmt::Display for Conversion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Successfully converted: {} -> {}",
            self.source.display(),
            self.destination.display()
        )
    }
}

/// Swap the last extension of `path`, keeping any other dots in the name
pub fn default_output(path: &Path, extension: &str) -> PathBuf {
    path.with_extension(extension)
}

pub fn has_extension(path: &Path, extension: &str) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case(extension))
}

/// Convert a PNG image into a BIN container.
///
/// The destination defaults to the source with a `.bin` extension.
#[instrument(skip_all, fields(source = %source.display()))]
pub fn png_to_bin(
    source: &Path,
    destination: Option<&Path>,
    include_header: bool,
) -> Result<Conversion, ConvertError> {
    if !source.exists() {
        return Err(ConvertError::NotFound {
            label: "PNG",
            path: source.to_path_buf(),
        });
    }

    if !has_extension(source, PNG_EXTENSION) {
        return Err(ConvertError::WrongExtension {
            path: source.to_path_buf(),
        });
    }

    let img = codec::load_rgba(source)?;

    let destination = destination
        .map(Path::to_path_buf)
        .unwrap_or_else(|| default_output(source, BIN_EXTENSION));

    let bytes_written = write_atomically(&destination, |file| {
        format::write_container(BufWriter::new(file), &img, include_header)
    })?;

    log::info!(
        "Wrote {} bytes to {} (header: {include_header})",
        bytes_written,
        destination.display()
    );

    Ok(Conversion {
        source: source.to_path_buf(),
        destination,
        width: img.width(),
        height: img.height(),
        bytes_written,
    })
}

/// Convert a BIN container back into a PNG image.
///
/// Headerless containers are rejected: their dimensions cannot be recovered.
#[instrument(skip_all, fields(source = %source.display()))]
pub fn bin_to_png(
    source: &Path,
    destination: Option<&Path>,
    has_header: bool,
    compression: PngCompression,
) -> Result<Conversion, ConvertError> {
    if !source.exists() {
        return Err(ConvertError::NotFound {
            label: "BIN",
            path: source.to_path_buf(),
        });
    }

    if !has_header {
        return Err(ConvertError::HeaderlessDecode);
    }

    let destination = destination
        .map(Path::to_path_buf)
        .unwrap_or_else(|| default_output(source, PNG_EXTENSION));

    let img = format::read_container(BufReader::new(File::open(source)?))?;
    log::debug!("Decoded {}x{} container", img.width(), img.height());

    write_atomically(&destination, |file| {
        let mut writer = BufWriter::new(file);
        codec::compress_to_png(&img, &mut writer, compression)?;
        writer.flush()?;
        Ok(())
    })?;

    let bytes_written = fs::metadata(&destination)?.len();
    log::info!("Wrote {} bytes to {}", bytes_written, destination.display());

    Ok(Conversion {
        source: source.to_path_buf(),
        destination,
        width: img.width(),
        height: img.height(),
        bytes_written,
    })
}

/// Write into a scratch directory next to `destination`, then move the file
/// into place. A failed write leaves the destination untouched.
fn write_atomically<T, F>(destination: &Path, write: F) -> Result<T, ConvertError>
where
    F: FnOnce(&mut File) -> Result<T, ConvertError>,
{
    let parent = destination
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));

    let scratch = tempfile::Builder::new()
        .prefix(".pngbin-")
        .tempdir_in(parent)?;
    let scratch_file = scratch.path().join("output");

    let mut file = File::create(&scratch_file)?;
    let value = write(&mut file)?;
    file.sync_all()?;
    drop(file);

    fs::rename(&scratch_file, destination)?;

    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ErrorKind, FormatError};
    use image::{Rgba, RgbaImage};

    #[test]
    fn output_path_with_dots() {
        assert_eq!(
            default_output(Path::new("Dr. STONE v01 (2018).png"), BIN_EXTENSION),
            PathBuf::from("Dr. STONE v01 (2018).bin")
        );
        assert_eq!(
            default_output(Path::new("dir/archive.tar.bin"), PNG_EXTENSION),
            PathBuf::from("dir/archive.tar.png")
        );
        assert_eq!(
            default_output(Path::new("noext"), BIN_EXTENSION),
            PathBuf::from("noext.bin")
        );
    }

    #[test]
    fn extension_match_ignores_case() {
        assert!(has_extension(Path::new("a.PNG"), PNG_EXTENSION));
        assert!(has_extension(Path::new("a.b.png"), PNG_EXTENSION));
        assert!(!has_extension(Path::new("a.png.bak"), PNG_EXTENSION));
        assert!(!has_extension(Path::new("png"), PNG_EXTENSION));
    }

    #[test]
    fn missing_source_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.png");

        let err = png_to_bin(&missing, None, true).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InputNotFound);
        assert!(err.to_string().starts_with("PNG file not found"));

        let err = bin_to_png(&missing.with_extension("bin"), None, true, PngCompression::Fast)
            .unwrap_err();
        assert!(err.to_string().starts_with("BIN file not found"));
    }

    #[test]
    fn non_png_source_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("picture.jpg");
        fs::write(&source, b"not really a jpeg").unwrap();

        let err = png_to_bin(&source, None, true).unwrap_err();
        assert!(matches!(err, ConvertError::WrongExtension { .. }));
        assert!(!source.with_extension("bin").exists());
    }

    #[test]
    fn corrupt_png_leaves_no_output() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("broken.png");
        fs::write(&source, b"\x89PNG garbage").unwrap();

        let err = png_to_bin(&source, None, true).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Codec);
        assert!(!source.with_extension("bin").exists());
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn uppercase_extension_uses_default_output() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("SHOUT.PNG");
        RgbaImage::from_pixel(2, 2, Rgba([1, 2, 3, 4]))
            .save_with_format(&source, image::ImageFormat::Png)
            .unwrap();

        let done = png_to_bin(&source, None, true).unwrap();
        assert_eq!(done.destination, dir.path().join("SHOUT.bin"));
        assert_eq!(done.bytes_written, 17 + 16);
        assert_eq!(fs::metadata(&done.destination).unwrap().len(), 33);
    }

    #[test]
    fn headerless_decode_is_unsupported() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("raw.bin");
        fs::write(&source, [0u8; 16]).unwrap();

        let err = bin_to_png(&source, None, false, PngCompression::Default).unwrap_err();
        assert!(matches!(err, ConvertError::HeaderlessDecode));
        assert_eq!(err.kind(), ErrorKind::Unsupported);
        assert!(!source.with_extension("png").exists());
    }

    #[test]
    fn bad_container_leaves_no_output() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("junk.bin");
        fs::write(&source, b"JUNK and some more bytes").unwrap();

        let err = bin_to_png(&source, None, true, PngCompression::Default).unwrap_err();
        assert!(matches!(
            err,
            ConvertError::Format(FormatError::InvalidMagic { .. })
        ));
        assert!(!source.with_extension("png").exists());
    }

    #[test]
    fn message_names_both_paths() {
        let done = Conversion {
            source: PathBuf::from("in.png"),
            destination: PathBuf::from("out.bin"),
            width: 1,
            height: 1,
            bytes_written: 21,
        };
        assert_eq!(done.to_string(), "Successfully converted: in.png -> out.bin");
    }
}
