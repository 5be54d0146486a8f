//! Toolkit asset handling
//!
//! This module handles:
//! - Downloading the toolkit artifacts (HTTP or local file URLs)
//! - Persisting them in an epoch-versioned on-disk cache
//! - Extracting executables from the downloaded archives

mod cache;
mod extract;
mod fetch;

pub use cache::{AssetCache, CacheStats};
pub(crate) use cache::sha256_hex;
pub use extract::{extract_executable, ArchiveKind};
pub use fetch::{AssetFetcher, HttpFetcher};

use std::path::PathBuf;
use std::sync::Arc;

use crate::error::Result;

/// Where the bytes of a resolved asset live
#[derive(Debug, Clone)]
pub enum AssetLocation {
    /// Stored in the durable cache
    Stored(PathBuf),
    /// Held in memory because the durable cache was unavailable
    Memory(Arc<[u8]>),
}

/// A toolkit artifact resolved to a locally addressable handle
#[derive(Debug, Clone)]
pub struct CachedAsset {
    pub url: String,
    pub mime_type: String,
    pub location: AssetLocation,
}

impl CachedAsset {
    /// Read the asset bytes, whichever store they live in
    pub async fn bytes(&self) -> Result<Arc<[u8]>> {
        match &self.location {
            AssetLocation::Stored(path) => Ok(Arc::from(tokio::fs::read(path).await?)),
            AssetLocation::Memory(bytes) => Ok(bytes.clone()),
        }
    }

    pub fn is_stored(&self) -> bool {
        matches!(self.location, AssetLocation::Stored(_))
    }
}
