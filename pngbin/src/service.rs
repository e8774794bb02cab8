//! Upload handling behind the web front-end.
//!
//! Every request carries one file which is stored in the working directory,
//! converted next to itself, then offered for download until cleaned up.
//! The routes map onto this type as follows:
//!
//! | route                          | method                        |
//! |--------------------------------|-------------------------------|
//! | `POST /api/png-to-bin`         | [`UploadService::png_to_bin`] |
//! | `POST /api/bin-to-png`         | [`UploadService::bin_to_png`] |
//! | `GET /api/download/<name>`     | [`UploadService::download`]   |
//! | `POST /api/cleanup/<name>`     | [`UploadService::cleanup`]    |
//!
//! Failures become a `{"success": false, "error": ...}` envelope with the
//! status code from [`ServiceError::status`].

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde_json::{json, Value};
use thiserror::Error;
use tracing::instrument;

use crate::config::Config;
use crate::convert::{self, Conversion, BIN_EXTENSION, PNG_EXTENSION};
use crate::error::ConvertError;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("No file selected")]
    NoFileSelected,

    #[error("File must be {expected}")]
    WrongFileType { expected: &'static str },

    #[error("File too large (max {}MB)", limit / (1024 * 1024))]
    TooLarge { limit: u64 },

    #[error("File not found")]
    FileNotFound,

    #[error("{0}")]
    Conversion(#[from] ConvertError),

    #[error("Error: {0}")]
    Io(#[from] io::Error),
}

impl ServiceError {
    /// HTTP status code for this failure
    pub fn status(&self) -> u16 {
        match self {
            ServiceError::NoFileSelected
            | ServiceError::WrongFileType { .. }
            | ServiceError::Conversion(_) => 400,
            ServiceError::FileNotFound => 404,
            ServiceError::TooLarge { .. } => 413,
            ServiceError::Io(_) => 500,
        }
    }

    pub fn envelope(&self) -> Value {
        json!({ "success": false, "error": self.to_string() })
    }
}

/// Body of a successful conversion response
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct ConversionReport {
    pub success: bool,
    pub message: String,
    pub filename: String,
    pub original_size: String,
    pub converted_size: String,
    pub file_id: String,
}

#[derive(Debug, Clone, Copy)]
enum Direction {
    PngToBin,
    BinToPng,
}

impl Direction {
    fn input_extension(self) -> &'static str {
        match self {
            Direction::PngToBin => PNG_EXTENSION,
            Direction::BinToPng => BIN_EXTENSION,
        }
    }

    fn output_extension(self) -> &'static str {
        match self {
            Direction::PngToBin => BIN_EXTENSION,
            Direction::BinToPng => PNG_EXTENSION,
        }
    }

    fn expected(self) -> &'static str {
        match self {
            Direction::PngToBin => "a PNG image",
            Direction::BinToPng => "a BIN file",
        }
    }
}

pub struct UploadService {
    config: Config,
}

impl UploadService {
    pub fn new(config: Config) -> io::Result<Self> {
        fs::create_dir_all(&config.upload_dir)?;
        log::debug!("Upload directory: {}", config.upload_dir.display());
        Ok(Self { config })
    }

    pub fn upload_dir(&self) -> &Path {
        &self.config.upload_dir
    }

    pub fn png_to_bin(&self, file_name: &str, data: &[u8]) -> Result<ConversionReport, ServiceError> {
        self.convert_upload(Direction::PngToBin, file_name, data)
    }

    pub fn bin_to_png(&self, file_name: &str, data: &[u8]) -> Result<ConversionReport, ServiceError> {
        self.convert_upload(Direction::BinToPng, file_name, data)
    }

    /// Path of a converted file, if it is still present
    pub fn download(&self, file_name: &str) -> Result<PathBuf, ServiceError> {
        let path = secure_filename(file_name)
            .map(|name| self.upload_dir().join(name))
            .ok_or(ServiceError::FileNotFound)?;

        if !path.is_file() {
            return Err(ServiceError::FileNotFound);
        }
        Ok(path)
    }

    /// Remove a file from the working directory. Absent files are not an error.
    pub fn cleanup(&self, file_name: &str) -> Result<(), ServiceError> {
        let Some(name) = secure_filename(file_name) else {
            return Ok(());
        };

        let path = self.upload_dir().join(name);
        if path.is_file() {
            fs::remove_file(&path)?;
            log::debug!("Removed {}", path.display());
        }
        Ok(())
    }

    #[instrument(skip(self, data), fields(size = data.len()))]
    fn convert_upload(
        &self,
        direction: Direction,
        file_name: &str,
        data: &[u8],
    ) -> Result<ConversionReport, ServiceError> {
        if data.len() as u64 > self.config.max_upload_bytes {
            return Err(ServiceError::TooLarge {
                limit: self.config.max_upload_bytes,
            });
        }

        if file_name.is_empty() {
            return Err(ServiceError::NoFileSelected);
        }

        let wrong_type = ServiceError::WrongFileType {
            expected: direction.expected(),
        };

        if !allowed_file(file_name, direction.input_extension()) {
            return Err(wrong_type);
        }

        // sanitizing may strip the extension, e.g. a bare ".png"
        let name = match secure_filename(file_name) {
            Some(name) if allowed_file(&name, direction.input_extension()) => name,
            _ => return Err(wrong_type),
        };

        let upload_path = self.upload_dir().join(&name);
        fs::write(&upload_path, data)?;

        let output_name = convert::default_output(Path::new(&name), direction.output_extension())
            .to_string_lossy()
            .into_owned();
        let output_path = self.upload_dir().join(&output_name);

        let conversion = match direction {
            Direction::PngToBin => convert::png_to_bin(
                &upload_path,
                Some(&output_path),
                self.config.include_header,
            ),
            Direction::BinToPng => convert::bin_to_png(
                &upload_path,
                Some(&output_path),
                true,
                self.config.png_compression,
            ),
        }
        .map_err(|e| {
            log::warn!("Failed to convert {name}: {e}");
            e
        })?;

        self.report(&conversion, output_name)
    }

    fn report(&self, conversion: &Conversion, output_name: String) -> Result<ConversionReport, ServiceError> {
        let original = fs::metadata(&conversion.source)?.len();
        let converted = fs::metadata(&conversion.destination)?.len();

        Ok(ConversionReport {
            success: true,
            message: conversion.to_string(),
            filename: output_name.clone(),
            original_size: format_size(original),
            converted_size: format_size(converted),
            file_id: output_name,
        })
    }
}

/// Reduce an uploaded file name to a safe, flat name: ASCII letters, digits,
/// `.`, `_` and `-` only, no path components and no leading dots.
pub fn secure_filename(name: &str) -> Option<String> {
    let spaced: String = name
        .chars()
        .map(|c| if c == '/' || c == '\\' { ' ' } else { c })
        .collect();

    let joined = spaced.split_whitespace().collect::<Vec<_>>().join("_");

    let kept: String = joined
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
        .collect();

    let trimmed = kept.trim_matches(|c| c == '.' || c == '_');
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

fn allowed_file(name: &str, extension: &str) -> bool {
    name.rsplit_once('.')
        .is_some_and(|(_, ext)| ext.eq_ignore_ascii_case(extension))
}

/// `1234567` -> `"1,234,567 bytes"`
pub fn format_size(bytes: u64) -> String {
    let digits = bytes.to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);

    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }

    format!("{grouped} bytes")
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};
    use std::io::Cursor;

    fn service(dir: &Path) -> UploadService {
        UploadService::new(Config {
            upload_dir: dir.join("uploads"),
            ..Config::default()
        })
        .unwrap()
    }

    fn png_bytes(img: &RgbaImage) -> Vec<u8> {
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, image::ImageFormat::Png).unwrap();
        out.into_inner()
    }

    #[test]
    fn sanitizes_names() {
        assert_eq!(secure_filename("My cool movie.mov").as_deref(), Some("My_cool_movie.mov"));
        assert_eq!(secure_filename("../../../etc/passwd").as_deref(), Some("etc_passwd"));
        assert_eq!(secure_filename("C:\\pics\\cat.png").as_deref(), Some("C_pics_cat.png"));
        assert_eq!(secure_filename("_.hidden.png").as_deref(), Some("hidden.png"));
        assert_eq!(secure_filename("..."), None);
        assert_eq!(secure_filename(""), None);
    }

    #[test]
    fn sizes_use_thousands_separators() {
        assert_eq!(format_size(0), "0 bytes");
        assert_eq!(format_size(999), "999 bytes");
        assert_eq!(format_size(40017), "40,017 bytes");
        assert_eq!(format_size(1234567), "1,234,567 bytes");
    }

    #[test]
    fn round_trip_through_uploads() {
        let dir = tempfile::tempdir().unwrap();
        let service = service(dir.path());
        let img = RgbaImage::from_pixel(10, 10, Rgba([0, 128, 0, 255]));

        let report = service.png_to_bin("leaf.png", &png_bytes(&img)).unwrap();
        assert!(report.success);
        assert_eq!(report.filename, "leaf.bin");
        assert_eq!(report.file_id, "leaf.bin");
        assert_eq!(report.converted_size, "417 bytes");
        assert!(report.message.starts_with("Successfully converted:"));

        let bin = fs::read(service.download("leaf.bin").unwrap()).unwrap();
        let report = service.bin_to_png("leaf.bin", &bin).unwrap();
        assert_eq!(report.filename, "leaf.png");
        assert_eq!(report.original_size, "417 bytes");

        let restored = image::open(service.download("leaf.png").unwrap())
            .unwrap()
            .into_rgba8();
        assert_eq!(restored, img);

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["success"], true);
        assert_eq!(json["file_id"], "leaf.png");
    }

    #[test]
    fn rejects_bad_requests() {
        let dir = tempfile::tempdir().unwrap();
        let service = service(dir.path());

        let err = service.png_to_bin("", b"data").unwrap_err();
        assert!(matches!(err, ServiceError::NoFileSelected));
        assert_eq!(err.status(), 400);

        let err = service.png_to_bin("photo.jpg", b"data").unwrap_err();
        assert_eq!(err.to_string(), "File must be a PNG image");
        assert_eq!(err.status(), 400);

        let err = service.bin_to_png("photo.png", b"data").unwrap_err();
        assert_eq!(err.to_string(), "File must be a BIN file");

        let err = service.png_to_bin(".png", b"data").unwrap_err();
        assert!(matches!(err, ServiceError::WrongFileType { .. }));
    }

    #[test]
    fn rejects_oversized_uploads() {
        let dir = tempfile::tempdir().unwrap();
        let service = UploadService::new(Config {
            upload_dir: dir.path().to_path_buf(),
            max_upload_bytes: 8,
            ..Config::default()
        })
        .unwrap();

        let err = service.bin_to_png("big.bin", &[0u8; 9]).unwrap_err();
        assert_eq!(err.status(), 413);
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);

        let default_limit = ServiceError::TooLarge {
            limit: crate::config::DEFAULT_MAX_UPLOAD_BYTES,
        };
        assert_eq!(default_limit.to_string(), "File too large (max 50MB)");
    }

    #[test]
    fn conversion_failures_become_envelopes() {
        let dir = tempfile::tempdir().unwrap();
        let service = service(dir.path());

        let err = service.bin_to_png("junk.bin", b"NOPE, not a container").unwrap_err();
        assert_eq!(err.status(), 400);

        let envelope = err.envelope();
        assert_eq!(envelope["success"], false);
        assert!(envelope["error"]
            .as_str()
            .unwrap()
            .contains("missing PNG magic number"));
        assert!(service.download("junk.png").is_err());
    }

    #[test]
    fn download_and_cleanup() {
        let dir = tempfile::tempdir().unwrap();
        let service = service(dir.path());
        fs::write(service.upload_dir().join("done.bin"), b"x").unwrap();

        assert!(service.download("../uploads/done.bin").is_err());
        let path = service.download("done.bin").unwrap();
        assert!(path.ends_with("done.bin"));

        service.cleanup("done.bin").unwrap();
        assert!(!path.exists());

        // already gone
        service.cleanup("done.bin").unwrap();
        let err = service.download("done.bin").unwrap_err();
        assert_eq!(err.status(), 404);
    }
}
