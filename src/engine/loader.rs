//! Lazy, de-duplicated engine initialization
//!
//! The loader owns the single engine instance of a [`crate::MediaEngine`].
//! Concurrent callers of [`EngineLoader::get_engine`] share one load: the
//! first caller claims the `Loading` state and spawns the load, everyone
//! else waits on the watch channel until the state leaves `Loading`.

use log::{error, info, warn};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::watch;

use super::{Engine, EngineAssets, EngineFactory};
use crate::assets::AssetCache;
use crate::config::{AssetSpec, EngineConfig};
use crate::error::{EngineError, Result};

#[derive(Clone)]
enum LoadState {
    Unloaded,
    Loading { attempt: u32 },
    Ready(Arc<dyn Engine>),
    Failed { message: String, attempts: u32 },
}

/// Reportable lifecycle state of the engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum EngineStatus {
    Unloaded,
    Loading {
        attempt: u32,
    },
    Ready,
    Failed {
        message: String,
        attempts: u32,
        /// Whether the next `get_engine` call will try again
        retryable: bool,
    },
}

struct LoaderInner {
    state: watch::Sender<LoadState>,
    cache: Arc<AssetCache>,
    loader_asset: AssetSpec,
    payload_asset: AssetSpec,
    factory: Arc<dyn EngineFactory>,
    max_attempts: u32,
}

#[derive(Clone)]
pub struct EngineLoader {
    inner: Arc<LoaderInner>,
}

impl EngineLoader {
    pub fn new(
        config: &EngineConfig,
        cache: Arc<AssetCache>,
        factory: Arc<dyn EngineFactory>,
    ) -> Self {
        let (state, _) = watch::channel(LoadState::Unloaded);
        Self {
            inner: Arc::new(LoaderInner {
                state,
                cache,
                loader_asset: config.loader_asset.clone(),
                payload_asset: config.payload_asset.clone(),
                factory,
                max_attempts: config.max_load_attempts.max(1),
            }),
        }
    }

    pub fn cache(&self) -> &Arc<AssetCache> {
        &self.inner.cache
    }

    /// Return the ready engine, loading it first if needed
    pub async fn get_engine(&self) -> Result<Arc<dyn Engine>> {
        let max_attempts = self.inner.max_attempts;
        loop {
            let mut rx = self.inner.state.subscribe();

            let mut claimed = None;
            self.inner.state.send_if_modified(|state| {
                let attempt = match state {
                    LoadState::Unloaded => 1,
                    LoadState::Failed { attempts, .. } if *attempts < max_attempts => *attempts + 1,
                    _ => return false,
                };
                *state = LoadState::Loading { attempt };
                claimed = Some(attempt);
                true
            });

            if let Some(attempt) = claimed {
                self.spawn_load(attempt);
            }

            let settled = {
                let state = rx
                    .wait_for(|s| !matches!(s, LoadState::Loading { .. }))
                    .await
                    .map_err(|_| EngineError::Load("Engine loader was dropped".to_string()))?;
                state.clone()
            };

            match settled {
                LoadState::Ready(engine) => return Ok(engine),
                LoadState::Failed { message, attempts } if attempts >= max_attempts => {
                    return Err(EngineError::LoadExhausted {
                        attempts,
                        last_error: message,
                    })
                }
                LoadState::Failed { message, .. } => return Err(EngineError::Load(message)),
                // Discarded between settling and our wake-up; load again
                LoadState::Unloaded | LoadState::Loading { .. } => continue,
            }
        }
    }

    fn spawn_load(&self, attempt: u32) {
        let inner = self.inner.clone();
        tokio::spawn(async move {
            info!(
                "Loading media engine (attempt {}/{})",
                attempt, inner.max_attempts
            );
            let load = tokio::spawn(inner.clone().load());
            let next = match load.await {
                Ok(Ok(engine)) => {
                    info!("Media engine ready");
                    LoadState::Ready(engine)
                }
                Ok(Err(e)) => {
                    error!("Media engine load failed: {}", e);
                    LoadState::Failed {
                        message: e.to_string(),
                        attempts: attempt,
                    }
                }
                Err(e) => {
                    error!("Media engine load task aborted: {}", e);
                    LoadState::Failed {
                        message: format!("Load task aborted: {}", e),
                        attempts: attempt,
                    }
                }
            };
            inner.state.send_replace(next);
        });
    }

    /// Current lifecycle state
    pub fn status(&self) -> EngineStatus {
        match &*self.inner.state.borrow() {
            LoadState::Unloaded => EngineStatus::Unloaded,
            LoadState::Loading { attempt } => EngineStatus::Loading { attempt: *attempt },
            LoadState::Ready(_) => EngineStatus::Ready,
            LoadState::Failed { message, attempts } => EngineStatus::Failed {
                message: message.clone(),
                attempts: *attempts,
                retryable: *attempts < self.inner.max_attempts,
            },
        }
    }

    /// Drop a ready engine so the next use loads a fresh one
    ///
    /// Returns false when there was no ready engine to discard. Loads in
    /// flight and exhausted failures are left alone.
    pub fn discard(&self) -> bool {
        let discarded = self.inner.state.send_if_modified(|state| {
            if matches!(state, LoadState::Ready(_)) {
                *state = LoadState::Unloaded;
                true
            } else {
                false
            }
        });
        if discarded {
            warn!("Media engine discarded, next job reloads it");
        }
        discarded
    }
}

impl LoaderInner {
    async fn load(self: Arc<Self>) -> Result<Arc<dyn Engine>> {
        let (loader, payload) = tokio::try_join!(
            self.cache.resolve(&self.loader_asset),
            self.cache.resolve(&self.payload_asset)
        )?;
        self.factory
            .create(EngineAssets { loader, payload })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::AssetFetcher;
    use crate::engine::MemoryEngine;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
    use std::time::Duration;

    struct StaticFetcher {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl AssetFetcher for StaticFetcher {
        async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(url.as_bytes().to_vec())
        }
    }

    /// Fails the first `failures` creations, then succeeds
    struct FlakyFactory {
        creations: AtomicU32,
        failures: u32,
        delay: Duration,
    }

    #[async_trait]
    impl EngineFactory for FlakyFactory {
        async fn create(&self, assets: EngineAssets) -> Result<Arc<dyn Engine>> {
            let n = self.creations.fetch_add(1, Ordering::SeqCst) + 1;
            tokio::time::sleep(self.delay).await;
            assert_eq!(assets.payload.bytes().await?.as_ref(), b"https://example.com/ffmpeg");
            if n <= self.failures {
                return Err(EngineError::Load(format!("init failure {}", n)));
            }
            Ok(Arc::new(MemoryEngine::new()))
        }
    }

    fn setup(
        failures: u32,
    ) -> (EngineLoader, Arc<FlakyFactory>, Arc<StaticFetcher>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let config = EngineConfig {
            cache_dir: dir.path().to_path_buf(),
            cache_epoch: "test".to_string(),
            loader_asset: AssetSpec::new("https://example.com/ffprobe", "application/octet-stream"),
            payload_asset: AssetSpec::new("https://example.com/ffmpeg", "application/octet-stream"),
            max_load_attempts: 3,
            ..EngineConfig::default()
        };
        let fetcher = Arc::new(StaticFetcher {
            calls: AtomicUsize::new(0),
        });
        let factory = Arc::new(FlakyFactory {
            creations: AtomicU32::new(0),
            failures,
            delay: Duration::from_millis(20),
        });
        let cache = Arc::new(AssetCache::new(
            config.cache_dir.clone(),
            config.cache_epoch.clone(),
            fetcher.clone(),
        ));
        let loader = EngineLoader::new(&config, cache, factory.clone());
        (loader, factory, fetcher, dir)
    }

    #[tokio::test]
    async fn test_concurrent_calls_share_one_load() {
        let (loader, factory, fetcher, _dir) = setup(0);
        assert_eq!(loader.status(), EngineStatus::Unloaded);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let loader = loader.clone();
                tokio::spawn(async move { loader.get_engine().await })
            })
            .collect();

        let mut engines = Vec::new();
        for handle in handles {
            engines.push(handle.await.unwrap().unwrap());
        }

        assert_eq!(factory.creations.load(Ordering::SeqCst), 1);
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 2);
        assert!(engines.iter().all(|e| Arc::ptr_eq(e, &engines[0])));
        assert_eq!(loader.status(), EngineStatus::Ready);
    }

    #[tokio::test]
    async fn test_failed_load_is_retried_on_next_call() {
        let (loader, factory, fetcher, _dir) = setup(1);

        let err = loader.get_engine().await.err().unwrap();
        assert_eq!(err.code(), "load_failed");
        assert!(err.to_string().contains("init failure 1"));
        assert!(matches!(
            loader.status(),
            EngineStatus::Failed {
                attempts: 1,
                retryable: true,
                ..
            }
        ));

        loader.get_engine().await.unwrap();
        assert_eq!(factory.creations.load(Ordering::SeqCst), 2);
        // Assets stay cached across attempts
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_failures_become_terminal() {
        let (loader, factory, _fetcher, _dir) = setup(u32::MAX);

        for _ in 0..2 {
            assert_eq!(loader.get_engine().await.err().unwrap().code(), "load_failed");
        }
        assert_eq!(loader.get_engine().await.err().unwrap().code(), "load_exhausted");

        let err = loader.get_engine().await.err().unwrap();
        assert!(matches!(err, EngineError::LoadExhausted { attempts: 3, .. }));
        assert_eq!(factory.creations.load(Ordering::SeqCst), 3);
        assert!(matches!(
            loader.status(),
            EngineStatus::Failed {
                retryable: false,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_discard_forces_fresh_engine() {
        let (loader, factory, _fetcher, _dir) = setup(0);

        let first = loader.get_engine().await.unwrap();
        assert!(loader.discard());
        assert!(!loader.discard());
        assert_eq!(loader.status(), EngineStatus::Unloaded);

        let second = loader.get_engine().await.unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(factory.creations.load(Ordering::SeqCst), 2);
    }
}
