//! The toolkit seam
//!
//! An [`Engine`] is one initialized instance of the codec toolkit together with
//! its private file namespace. The crate talks to it only through this trait so
//! the process-backed [`FfmpegEngine`] and the in-memory [`MemoryEngine`] are
//! interchangeable.
//!
//! Engines are not reentrant. Callers must not run two `exec` calls against the
//! same engine at once; [`crate::jobs::JobRunner`] enforces this.

mod loader;
mod memory;
mod native;

pub use loader::{EngineLoader, EngineStatus};
pub use memory::{default_handler, ExecRecord, Files, MemoryEngine};
pub use native::{FfmpegEngine, NativeEngineFactory};

use async_trait::async_trait;
use std::sync::Arc;

use crate::assets::CachedAsset;
use crate::error::{EngineError, Result};

/// Receives the raw fractional completion of one execution
pub type RawProgress<'a> = &'a (dyn Fn(f64) + Send + Sync);

#[async_trait]
pub trait Engine: Send + Sync {
    /// Write `data` under `name` in the engine's private filesystem
    async fn write_file(&self, name: &str, data: &[u8]) -> Result<()>;

    /// Read `name` back as freshly owned bytes
    async fn read_file(&self, name: &str) -> Result<Vec<u8>>;

    /// Delete `name`; deleting a missing file is not an error
    async fn delete_file(&self, name: &str) -> Result<()>;

    /// Names currently present in the private filesystem
    async fn list_files(&self) -> Result<Vec<String>>;

    /// Run the toolkit with `argv`, reporting raw progress in `[0, 1]`
    async fn exec(&self, argv: &[String], progress: RawProgress<'_>) -> Result<()>;

    /// Run the companion probe tool and return its standard output
    async fn ffprobe(&self, argv: &[String]) -> Result<String>;
}

/// The two resolved artifacts an engine is initialized from
#[derive(Debug, Clone)]
pub struct EngineAssets {
    /// Companion probe tool
    pub loader: CachedAsset,
    /// Main toolkit
    pub payload: CachedAsset,
}

/// Builds a ready engine from resolved assets
#[async_trait]
pub trait EngineFactory: Send + Sync {
    async fn create(&self, assets: EngineAssets) -> Result<Arc<dyn Engine>>;
}

/// Reject names that would escape the private filesystem
pub(crate) fn validate_file_name(name: &str) -> Result<()> {
    let invalid = name.is_empty()
        || name == "."
        || name == ".."
        || name.contains(['/', '\\', '\0'])
        || name.starts_with('-');
    if invalid {
        return Err(EngineError::InvalidFileName(name.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_plain_names() {
        assert!(validate_file_name("input.mp4").is_ok());
        assert!(validate_file_name("norm_0.ts").is_ok());
    }

    #[test]
    fn test_rejects_escaping_names() {
        for name in ["", ".", "..", "../etc/passwd", "a/b", "a\\b", "-y"] {
            assert!(validate_file_name(name).is_err(), "{} should be rejected", name);
        }
    }
}
