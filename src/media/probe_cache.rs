//! FFprobe result caching for session-level deduplication
//!
//! Probing the same bytes twice is common (a UI probes a file, then runs an
//! operation that needs its duration). Results are keyed by the SHA-256 of
//! the source bytes and expire after a while. Nothing is persisted.

use dashmap::DashMap;
use log::{debug, info};
use std::time::{Duration, Instant};

use super::MediaInfo;
use crate::assets::sha256_hex;

/// Maximum age of cache entries before they're considered stale (5 minutes)
const CACHE_MAX_AGE: Duration = Duration::from_secs(300);

#[derive(Clone, Debug)]
struct CachedProbeResult {
    info: MediaInfo,
    cached_at: Instant,
}

#[derive(Default)]
pub struct ProbeCache {
    entries: DashMap<String, CachedProbeResult>,
}

impl ProbeCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cache key for a source's bytes
    pub fn key(data: &[u8]) -> String {
        sha256_hex(data)
    }

    pub fn get(&self, key: &str) -> Option<MediaInfo> {
        let entry = self.entries.get(key)?;
        if entry.cached_at.elapsed() > CACHE_MAX_AGE {
            debug!("Probe cache entry expired for {}", key);
            drop(entry);
            self.entries.remove(key);
            return None;
        }
        debug!("Probe cache hit for {}", key);
        Some(entry.info.clone())
    }

    pub fn insert(&self, key: String, info: MediaInfo) {
        self.entries.insert(
            key,
            CachedProbeResult {
                info,
                cached_at: Instant::now(),
            },
        );
    }

    /// Clear the entire cache
    pub fn clear(&self) {
        let count = self.entries.len();
        self.entries.clear();
        info!("Cleared probe cache ({} entries)", count);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::parse_media_info;

    #[test]
    fn test_hit_after_insert() {
        let cache = ProbeCache::new();
        let key = ProbeCache::key(b"video-bytes");
        assert!(cache.get(&key).is_none());

        let info = parse_media_info(r#"{ "format": { "duration": "2.0" } }"#).unwrap();
        cache.insert(key.clone(), info);
        assert_eq!(cache.get(&key).map(|i| i.duration), Some(2.0));
        assert_ne!(key, ProbeCache::key(b"other-bytes"));

        cache.clear();
        assert!(cache.is_empty());
    }
}
