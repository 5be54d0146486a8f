//! Persistent, epoch-versioned cache for toolkit artifacts
//!
//! Cache layout:
//! - `<cache_dir>/<epoch>/<sha256(url)>.bin` raw response bytes
//! - `<cache_dir>/<epoch>/<sha256(url)>.json` metadata sidecar
//!
//! - `<cache_dir>/<epoch>/.localcut-epoch` marks the directory as ours
//!
//! Marked sibling epoch directories are removed the first time the cache is
//! used, so bumping the epoch supersedes everything stored before it.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::OnceCell;
use uuid::Uuid;

use super::{AssetFetcher, AssetLocation, CachedAsset};
use crate::config::AssetSpec;
use crate::error::{EngineError, Result};

/// Written into every epoch directory so pruning never touches foreign data
const EPOCH_MARKER: &str = ".localcut-epoch";

/// Metadata stored alongside each cached artifact
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CacheMetadata {
    url: String,
    mime_type: String,
    size: u64,
    sha256: String,
    stored_at: DateTime<Utc>,
}

/// Cache statistics
#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub epoch: String,
    pub entry_count: usize,
    pub total_size_bytes: u64,
    pub cache_dir: String,
}

pub struct AssetCache {
    root: PathBuf,
    epoch: String,
    fetcher: Arc<dyn AssetFetcher>,
    /// In-process index of resolved URLs, one load cell per URL
    index: DashMap<String, Arc<OnceCell<CachedAsset>>>,
    pruned: AtomicBool,
}

impl AssetCache {
    pub fn new(root: PathBuf, epoch: impl Into<String>, fetcher: Arc<dyn AssetFetcher>) -> Self {
        Self {
            root,
            epoch: epoch.into(),
            fetcher,
            index: DashMap::new(),
            pruned: AtomicBool::new(false),
        }
    }

    fn epoch_dir(&self) -> PathBuf {
        self.root.join(&self.epoch)
    }

    /// Resolve an asset to a local handle, fetching it at most once per epoch
    ///
    /// Concurrent calls for the same URL share one in-flight load.
    pub async fn resolve(&self, spec: &AssetSpec) -> Result<CachedAsset> {
        let cell = self
            .index
            .entry(spec.url.clone())
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .clone();

        if let Some(asset) = cell.get() {
            debug!("Asset index hit for: {}", spec.url);
            return Ok(asset.clone());
        }
        cell.get_or_try_init(|| self.load(spec)).await.cloned()
    }

    async fn load(&self, spec: &AssetSpec) -> Result<CachedAsset> {
        let store = self.prepare_store().await;
        let key = url_key(&spec.url);

        if let Some(dir) = &store {
            if let Some(asset) = self.read_stored(dir, &key, spec).await {
                info!("Asset cache hit for: {} (epoch: {})", spec.url, self.epoch);
                return Ok(asset);
            }
        }

        debug!("Asset cache miss for: {}", spec.url);
        let bytes = self.fetcher.fetch(&spec.url).await?;
        let digest = sha256_hex(&bytes);

        if let Some(expected) = &spec.sha256 {
            if !expected.eq_ignore_ascii_case(&digest) {
                return Err(EngineError::ChecksumMismatch {
                    url: spec.url.clone(),
                    expected: expected.clone(),
                    actual: digest,
                });
            }
            debug!("Checksum verified for: {}", spec.url);
        }

        let asset = match &store {
            Some(dir) => match self.write_stored(dir, &key, spec, &bytes, &digest).await {
                Ok(path) => CachedAsset {
                    url: spec.url.clone(),
                    mime_type: spec.mime_type.clone(),
                    location: AssetLocation::Stored(path),
                },
                Err(e) => {
                    warn!(
                        "Failed to store asset {} ({}), continuing without cache",
                        spec.url, e
                    );
                    memory_asset(spec, bytes)
                }
            },
            None => memory_asset(spec, bytes),
        };
        Ok(asset)
    }

    /// Create the epoch directory and drop stale epochs.
    /// Returns `None` when the durable store is unusable.
    async fn prepare_store(&self) -> Option<PathBuf> {
        let dir = self.epoch_dir();
        if let Err(e) = tokio::fs::create_dir_all(&dir).await {
            warn!(
                "Asset cache unavailable at {:?} ({}), fetching without caching",
                dir, e
            );
            return None;
        }
        let marker = dir.join(EPOCH_MARKER);
        if !marker.exists() {
            if let Err(e) = tokio::fs::write(&marker, self.epoch.as_bytes()).await {
                warn!("Failed to mark cache epoch {:?}: {}", dir, e);
            }
        }

        if !self.pruned.swap(true, Ordering::SeqCst) {
            if let Err(e) = self.prune_stale_epochs().await {
                warn!("Failed to prune stale cache epochs: {}", e);
            }
        }

        Some(dir)
    }

    async fn prune_stale_epochs(&self) -> Result<()> {
        let mut entries = tokio::fs::read_dir(&self.root).await?;
        let mut removed = 0;
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_name().to_string_lossy() == self.epoch.as_str() {
                continue;
            }
            // Only directories this cache created carry the marker
            if entry.file_type().await?.is_dir() && entry.path().join(EPOCH_MARKER).exists() {
                tokio::fs::remove_dir_all(entry.path()).await?;
                removed += 1;
            }
        }
        if removed > 0 {
            info!("Removed {} stale cache epoch(s)", removed);
        }
        Ok(())
    }

    async fn read_stored(&self, dir: &Path, key: &str, spec: &AssetSpec) -> Option<CachedAsset> {
        let meta_path = dir.join(format!("{}.json", key));
        let data_path = dir.join(format!("{}.bin", key));

        let content = tokio::fs::read_to_string(&meta_path).await.ok()?;
        let metadata: CacheMetadata = match serde_json::from_str(&content) {
            Ok(m) => m,
            Err(e) => {
                warn!("Failed to parse cache metadata (removing corrupt entry): {}", e);
                remove_entry(&meta_path, &data_path).await;
                return None;
            }
        };

        let on_disk = tokio::fs::metadata(&data_path).await.ok()?;
        if metadata.url != spec.url || on_disk.len() != metadata.size {
            debug!("Cache entry for {} is inconsistent, invalidating", spec.url);
            remove_entry(&meta_path, &data_path).await;
            return None;
        }
        if let Some(expected) = &spec.sha256 {
            if !expected.eq_ignore_ascii_case(&metadata.sha256) {
                debug!("Cached checksum differs from configured one, refetching");
                remove_entry(&meta_path, &data_path).await;
                return None;
            }
        }

        Some(CachedAsset {
            url: spec.url.clone(),
            mime_type: metadata.mime_type,
            location: AssetLocation::Stored(data_path),
        })
    }

    async fn write_stored(
        &self,
        dir: &Path,
        key: &str,
        spec: &AssetSpec,
        bytes: &[u8],
        digest: &str,
    ) -> Result<PathBuf> {
        let data_path = dir.join(format!("{}.bin", key));
        let meta_path = dir.join(format!("{}.json", key));
        let partial = dir.join(format!("{}.bin.{}.part", key, Uuid::new_v4()));

        tokio::fs::write(&partial, bytes).await?;
        if let Err(e) = tokio::fs::rename(&partial, &data_path).await {
            let _ = tokio::fs::remove_file(&partial).await;
            return Err(e.into());
        }

        let metadata = CacheMetadata {
            url: spec.url.clone(),
            mime_type: spec.mime_type.clone(),
            size: bytes.len() as u64,
            sha256: digest.to_string(),
            stored_at: Utc::now(),
        };
        tokio::fs::write(&meta_path, serde_json::to_vec_pretty(&metadata)?).await?;

        info!(
            "Stored asset {} ({} bytes, sha256: {})",
            spec.url,
            bytes.len(),
            &digest[..16]
        );
        Ok(data_path)
    }

    /// Remove every entry of the current epoch
    pub async fn clear(&self) -> Result<usize> {
        self.index.clear();
        let dir = self.epoch_dir();
        if !dir.exists() {
            return Ok(0);
        }
        let count = count_entries(&dir).await?.0;
        tokio::fs::remove_dir_all(&dir).await?;
        info!("Cleared {} cached asset(s) from epoch {}", count, self.epoch);
        Ok(count)
    }

    pub async fn stats(&self) -> Result<CacheStats> {
        let dir = self.epoch_dir();
        let (entry_count, total_size_bytes) = if dir.exists() {
            count_entries(&dir).await?
        } else {
            (0, 0)
        };
        Ok(CacheStats {
            epoch: self.epoch.clone(),
            entry_count,
            total_size_bytes,
            cache_dir: dir.to_string_lossy().to_string(),
        })
    }
}

fn memory_asset(spec: &AssetSpec, bytes: Vec<u8>) -> CachedAsset {
    CachedAsset {
        url: spec.url.clone(),
        mime_type: spec.mime_type.clone(),
        location: AssetLocation::Memory(Arc::from(bytes)),
    }
}

async fn remove_entry(meta_path: &Path, data_path: &Path) {
    let _ = tokio::fs::remove_file(meta_path).await;
    let _ = tokio::fs::remove_file(data_path).await;
}

async fn count_entries(dir: &Path) -> Result<(usize, u64)> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    let mut count = 0;
    let mut size = 0;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().map(|e| e == "bin").unwrap_or(false) {
            count += 1;
            size += entry.metadata().await.map(|m| m.len()).unwrap_or(0);
        }
    }
    Ok((count, size))
}

fn url_key(url: &str) -> String {
    sha256_hex(url.as_bytes())
}

pub(crate) fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;

    struct CountingFetcher {
        calls: AtomicUsize,
        body: Vec<u8>,
    }

    impl CountingFetcher {
        fn new(body: &[u8]) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                body: body.to_vec(),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl AssetFetcher for CountingFetcher {
        async fn fetch(&self, _url: &str) -> Result<Vec<u8>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.body.clone())
        }
    }

    fn spec() -> AssetSpec {
        AssetSpec::new("https://example.com/ffmpeg.gz", "application/gzip")
    }

    #[tokio::test]
    async fn test_second_resolve_does_not_fetch() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = CountingFetcher::new(b"toolkit");
        let cache = AssetCache::new(dir.path().to_path_buf(), "v1", fetcher.clone());

        let first = cache.resolve(&spec()).await.unwrap();
        let second = cache.resolve(&spec()).await.unwrap();

        assert_eq!(fetcher.calls(), 1);
        assert!(first.is_stored());
        assert_eq!(&*second.bytes().await.unwrap(), b"toolkit");
    }

    #[tokio::test]
    async fn test_store_survives_new_cache_instance() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = CountingFetcher::new(b"toolkit");

        let cache = AssetCache::new(dir.path().to_path_buf(), "v1", fetcher.clone());
        cache.resolve(&spec()).await.unwrap();

        let restarted = AssetCache::new(dir.path().to_path_buf(), "v1", fetcher.clone());
        let asset = restarted.resolve(&spec()).await.unwrap();

        assert_eq!(fetcher.calls(), 1);
        assert_eq!(&*asset.bytes().await.unwrap(), b"toolkit");
    }

    #[tokio::test]
    async fn test_new_epoch_refetches_and_prunes_old() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = CountingFetcher::new(b"toolkit");

        let old = AssetCache::new(dir.path().to_path_buf(), "v1", fetcher.clone());
        old.resolve(&spec()).await.unwrap();
        assert!(dir.path().join("v1").exists());

        let new = AssetCache::new(dir.path().to_path_buf(), "v2", fetcher.clone());
        new.resolve(&spec()).await.unwrap();

        assert_eq!(fetcher.calls(), 2);
        assert!(!dir.path().join("v1").exists());
        assert!(dir.path().join("v2").exists());
    }

    #[tokio::test]
    async fn test_pruning_keeps_unmarked_directories() {
        let dir = tempfile::tempdir().unwrap();
        let foreign = dir.path().join("user-data");
        std::fs::create_dir(&foreign).unwrap();
        std::fs::write(foreign.join("notes.txt"), b"keep me").unwrap();

        let fetcher = CountingFetcher::new(b"toolkit");
        let cache = AssetCache::new(dir.path().to_path_buf(), "v1", fetcher);
        cache.resolve(&spec()).await.unwrap();

        assert!(foreign.join("notes.txt").exists());
        assert!(dir.path().join("v1").join(EPOCH_MARKER).exists());
    }

    struct SlowFetcher {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl AssetFetcher for SlowFetcher {
        async fn fetch(&self, _url: &str) -> Result<Vec<u8>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            Ok(b"toolkit".to_vec())
        }
    }

    #[tokio::test]
    async fn test_concurrent_resolves_share_one_fetch() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = Arc::new(SlowFetcher {
            calls: AtomicUsize::new(0),
        });
        let cache = AssetCache::new(dir.path().to_path_buf(), "v1", fetcher.clone());

        let spec = spec();
        let (first, second) = tokio::join!(cache.resolve(&spec), cache.resolve(&spec));

        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
        assert_eq!(&*first.unwrap().bytes().await.unwrap(), b"toolkit");
        assert_eq!(&*second.unwrap().bytes().await.unwrap(), b"toolkit");
        assert_eq!(cache.stats().await.unwrap().entry_count, 1);

        let leftovers: Vec<_> = std::fs::read_dir(dir.path().join("v1"))
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".part"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[tokio::test]
    async fn test_failed_fetch_is_retried() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = CountingFetcher::new(b"toolkit");
        let cache = AssetCache::new(dir.path().to_path_buf(), "v1", fetcher.clone());

        let mut bad = spec();
        bad.sha256 = Some("00".repeat(32));
        assert!(cache.resolve(&bad).await.is_err());
        assert!(cache.resolve(&spec()).await.is_ok());
        assert_eq!(fetcher.calls(), 2);
    }

    #[tokio::test]
    async fn test_unavailable_store_falls_back_to_memory() {
        let dir = tempfile::tempdir().unwrap();
        // A regular file where the cache root should be makes the store unusable
        let blocked = dir.path().join("blocked");
        std::fs::write(&blocked, b"not a directory").unwrap();

        let fetcher = CountingFetcher::new(b"toolkit");
        let cache = AssetCache::new(blocked, "v1", fetcher.clone());
        let asset = cache.resolve(&spec()).await.unwrap();

        assert!(!asset.is_stored());
        assert_eq!(&*asset.bytes().await.unwrap(), b"toolkit");
    }

    #[tokio::test]
    async fn test_checksum_mismatch_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = CountingFetcher::new(b"toolkit");
        let cache = AssetCache::new(dir.path().to_path_buf(), "v1", fetcher);

        let mut spec = spec();
        spec.sha256 = Some("00".repeat(32));
        let err = cache.resolve(&spec).await.unwrap_err();
        assert_eq!(err.code(), "checksum_mismatch");
        assert_eq!(cache.stats().await.unwrap().entry_count, 0);
    }

    #[tokio::test]
    async fn test_checksum_match_is_stored() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = CountingFetcher::new(b"toolkit");
        let cache = AssetCache::new(dir.path().to_path_buf(), "v1", fetcher);

        let mut spec = spec();
        spec.sha256 = Some(sha256_hex(b"toolkit").to_uppercase());
        assert!(cache.resolve(&spec).await.unwrap().is_stored());
    }

    #[tokio::test]
    async fn test_corrupt_metadata_is_refetched() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = CountingFetcher::new(b"toolkit");

        let cache = AssetCache::new(dir.path().to_path_buf(), "v1", fetcher.clone());
        cache.resolve(&spec()).await.unwrap();

        let meta = dir
            .path()
            .join("v1")
            .join(format!("{}.json", url_key(&spec().url)));
        std::fs::write(&meta, b"{ not json").unwrap();

        let restarted = AssetCache::new(dir.path().to_path_buf(), "v1", fetcher.clone());
        restarted.resolve(&spec()).await.unwrap();
        assert_eq!(fetcher.calls(), 2);
    }

    #[tokio::test]
    async fn test_clear_and_stats() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = CountingFetcher::new(b"toolkit");
        let cache = AssetCache::new(dir.path().to_path_buf(), "v1", fetcher);

        cache.resolve(&spec()).await.unwrap();
        let stats = cache.stats().await.unwrap();
        assert_eq!(stats.entry_count, 1);
        assert_eq!(stats.total_size_bytes, 7);

        assert_eq!(cache.clear().await.unwrap(), 1);
        assert_eq!(cache.stats().await.unwrap().entry_count, 0);
    }
}
