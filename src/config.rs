//! Engine configuration
//!
//! Manages deployment settings including:
//! - The cache epoch and on-disk location of the asset cache
//! - Where the two toolkit artifacts are downloaded from
//! - Load retry policy and fetch timeout

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{EngineError, Result};

/// Bump whenever any platform's default toolkit URLs change, otherwise stale
/// binaries stay cached indefinitely.
pub const DEFAULT_CACHE_EPOCH: &str = "localcut-toolkit-v1";

/// One downloadable toolkit artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetSpec {
    pub url: String,
    pub mime_type: String,
    /// Expected SHA-256 of the downloaded bytes (lowercase hex).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
}

impl AssetSpec {
    pub fn new(url: impl Into<String>, mime_type: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            mime_type: mime_type.into(),
            sha256: None,
        }
    }
}

/// Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Version tag of the asset cache; other epochs are removed on first use
    pub cache_epoch: String,
    /// Root of the durable asset cache (epoch directories live below it)
    pub cache_dir: PathBuf,
    /// Companion artifact (ffprobe) loaded alongside the main toolkit
    pub loader_asset: AssetSpec,
    /// Main toolkit artifact (ffmpeg)
    pub payload_asset: AssetSpec,
    /// How many load attempts are allowed before failures become terminal
    pub max_load_attempts: u32,
    /// Timeout for a single asset download
    pub fetch_timeout_secs: u64,
    /// Parent directory for the engine's private scratch filesystem
    pub scratch_dir: Option<PathBuf>,
    /// Capacity of the progress broadcast channel
    pub progress_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            cache_epoch: DEFAULT_CACHE_EPOCH.to_string(),
            cache_dir: default_cache_dir(),
            loader_asset: default_loader_asset(),
            payload_asset: default_payload_asset(),
            max_load_attempts: 3,
            fetch_timeout_secs: 600,
            scratch_dir: None,
            progress_capacity: 64,
        }
    }
}

impl EngineConfig {
    /// Load configuration from a JSON file; missing fields take defaults
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: EngineConfig = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.cache_epoch.trim().is_empty() {
            return Err(EngineError::invalid("cache_epoch cannot be empty"));
        }
        if self.cache_epoch.contains(['/', '\\'])
            || self.cache_epoch == "."
            || self.cache_epoch == ".."
        {
            return Err(EngineError::invalid(
                "cache_epoch must be a plain directory name",
            ));
        }
        if self.max_load_attempts == 0 {
            return Err(EngineError::invalid("max_load_attempts must be at least 1"));
        }
        if self.progress_capacity == 0 {
            return Err(EngineError::invalid("progress_capacity must be at least 1"));
        }
        for asset in [&self.loader_asset, &self.payload_asset] {
            if !asset.url.starts_with("http://")
                && !asset.url.starts_with("https://")
                && !asset.url.starts_with("file://")
            {
                return Err(EngineError::invalid(format!(
                    "Asset URL must start with http://, https:// or file://: {}",
                    asset.url
                )));
            }
        }
        Ok(())
    }
}

fn default_cache_dir() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        dirs::data_local_dir()
            .map(|p| p.join("localcut").join("cache").join("toolkit"))
            .unwrap_or_else(|| std::env::temp_dir().join("localcut-toolkit"))
    }

    #[cfg(not(target_os = "windows"))]
    {
        dirs::cache_dir()
            .map(|p| p.join("localcut").join("toolkit"))
            .unwrap_or_else(|| std::env::temp_dir().join("localcut-toolkit"))
    }
}

fn default_payload_asset() -> AssetSpec {
    match std::env::consts::OS {
        "macos" => AssetSpec::new(
            "https://evermeet.cx/ffmpeg/ffmpeg-7.1.zip",
            "application/zip",
        ),
        "windows" => AssetSpec::new(
            "https://www.gyan.dev/ffmpeg/builds/packages/ffmpeg-7.1-essentials_build.zip",
            "application/zip",
        ),
        _ => AssetSpec::new(
            "https://github.com/eugeneware/ffmpeg-static/releases/download/b6.0/ffmpeg-linux-x64.gz",
            "application/gzip",
        ),
    }
}

fn default_loader_asset() -> AssetSpec {
    match std::env::consts::OS {
        "macos" => AssetSpec::new(
            "https://evermeet.cx/ffmpeg/ffprobe-7.1.zip",
            "application/zip",
        ),
        "windows" => AssetSpec::new(
            "https://www.gyan.dev/ffmpeg/builds/packages/ffmpeg-7.1-essentials_build.zip",
            "application/zip",
        ),
        _ => AssetSpec::new(
            "https://github.com/eugeneware/ffmpeg-static/releases/download/b6.0/ffprobe-linux-x64.gz",
            "application/gzip",
        ),
    }
}
