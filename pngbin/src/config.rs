use std::fs;
use std::path::PathBuf;

use crate::codec::PngCompression;

/// 50 MiB, the upload limit of the serving layer
pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 50 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct Config {
    /// write the 17-byte header in front of the pixel data
    pub include_header: bool,
    pub png_compression: PngCompression,
    /// working directory for uploaded and converted files
    pub upload_dir: PathBuf,
    pub max_upload_bytes: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            include_header: true,
            png_compression: PngCompression::Default,
            upload_dir: PathBuf::from("uploads"),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }
}

impl Config {
    pub fn load() -> Option<Self> {
        let config_path = Self::config_path()?;

        fs::read_to_string(&config_path)
            .ok()
            .and_then(|contents| Self::from_json(&contents))
    }

    pub fn save(&self) -> Option<()> {
        let config_path = Self::config_path()?;

        // Create config directory if it doesn't exist
        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent).ok()?;
        }

        serde_json::to_string_pretty(self)
            .ok()
            .and_then(|json| fs::write(&config_path, json).ok())
    }

    pub fn from_json(contents: &str) -> Option<Self> {
        serde_json::from_str(contents)
            .map_err(|e| log::warn!("Ignoring malformed config: {e}"))
            .ok()
    }

    fn config_path() -> Option<PathBuf> {
        let home = std::env::home_dir()?;
        Some(home.join(".config").join("pngbin").join("config.json"))
    }
}
