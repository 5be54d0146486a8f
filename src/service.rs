//! The media engine service
//!
//! [`MediaEngine`] is what a host constructs once and shares by reference.
//! It owns the asset cache, the single engine handle and the job runner,
//! and turns a typed [`Operation`] into produced files.

use log::{debug, info};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

use crate::assets::{AssetCache, AssetFetcher, CacheStats, HttpFetcher};
use crate::catalog::{build_plan, input_file, Operation};
use crate::config::EngineConfig;
use crate::engine::{EngineFactory, EngineLoader, EngineStatus, NativeEngineFactory};
use crate::error::{EngineError, Result};
use crate::jobs::{JobRunner, ProgressCallback};
use crate::media::{parse_media_info, probe_argv, MediaInfo, ProbeCache};
use crate::progress::ProgressEvent;
use crate::types::{MediaResult, QueueStatus, SourceFile};

pub struct MediaEngine {
    loader: EngineLoader,
    runner: JobRunner,
    probes: ProbeCache,
}

impl MediaEngine {
    /// Build a service over explicit fetcher and engine factory seams
    pub fn new(
        config: EngineConfig,
        fetcher: Arc<dyn AssetFetcher>,
        factory: Arc<dyn EngineFactory>,
    ) -> Result<Self> {
        config.validate()?;
        let cache = Arc::new(AssetCache::new(
            config.cache_dir.clone(),
            config.cache_epoch.clone(),
            fetcher,
        ));
        info!(
            "Media engine configured: cache={}, epoch={}",
            config.cache_dir.display(),
            config.cache_epoch
        );
        Ok(Self {
            loader: EngineLoader::new(&config, cache, factory),
            runner: JobRunner::new(config.progress_capacity),
            probes: ProbeCache::new(),
        })
    }

    /// Service backed by downloaded ffmpeg/ffprobe binaries
    pub fn native(config: EngineConfig) -> Result<Self> {
        let fetcher = HttpFetcher::new(Duration::from_secs(config.fetch_timeout_secs))?;
        let factory = NativeEngineFactory::new(config.scratch_dir.clone());
        Self::new(config, Arc::new(fetcher), Arc::new(factory))
    }

    /// Run `operation` over `sources` and return every produced file
    pub async fn submit(
        &self,
        sources: &[SourceFile],
        operation: &Operation,
        on_progress: Option<&ProgressCallback<'_>>,
    ) -> Result<Vec<MediaResult>> {
        // Invalid parameters never trigger a load
        let plan = build_plan(operation, sources)?;
        debug!(
            "Submitting {} with {} step(s) over {} source(s)",
            plan.operation,
            plan.steps.len(),
            sources.len()
        );
        let engine = self.loader.get_engine().await?;
        self.runner.run(engine, &plan, on_progress).await
    }

    /// [`submit`](Self::submit) for operations producing exactly one file
    pub async fn submit_one(
        &self,
        sources: &[SourceFile],
        operation: &Operation,
        on_progress: Option<&ProgressCallback<'_>>,
    ) -> Result<MediaResult> {
        if operation.is_multi_output() {
            return Err(EngineError::invalid(format!(
                "{} produces several files, use submit",
                operation.name()
            )));
        }
        let mut results = self.submit(sources, operation, on_progress).await?;
        if results.is_empty() {
            return Err(EngineError::MissingOutput {
                operation: operation.name().to_string(),
                name: "output".to_string(),
            });
        }
        Ok(results.swap_remove(0))
    }

    /// Progress events of every job run by this service
    pub fn subscribe(&self) -> broadcast::Receiver<ProgressEvent> {
        self.runner.subscribe()
    }

    /// Describe a source with ffprobe; repeated probes of the same bytes are cached
    pub async fn probe(&self, source: &SourceFile) -> Result<MediaInfo> {
        let key = ProbeCache::key(&source.data);
        if let Some(info) = self.probes.get(&key) {
            return Ok(info);
        }

        let input = input_file("probe", source, "bin");
        let engine = self.loader.get_engine().await?;
        let output = self
            .runner
            .probe(engine, &input, &probe_argv(&input.name))
            .await?;
        let info = parse_media_info(&output)?;
        debug!(
            "Probed {}: duration={}s, video={}, audio={}",
            source.name, info.duration, info.has_video, info.has_audio
        );
        self.probes.insert(key, info.clone());
        Ok(info)
    }

    pub fn status(&self) -> EngineStatus {
        self.loader.status()
    }

    pub fn queue_status(&self) -> QueueStatus {
        self.runner.queue_status()
    }

    pub async fn cache_stats(&self) -> Result<CacheStats> {
        self.loader.cache().stats().await
    }

    /// Remove every stored asset and forget cached probe results
    pub async fn clear_cache(&self) -> Result<usize> {
        self.probes.clear();
        self.loader.cache().clear().await
    }

    /// Drop the ready engine so the next job loads a fresh one
    ///
    /// Jobs already holding the old handle finish against it.
    pub fn terminate(&self) -> bool {
        let discarded = self.loader.discard();
        if discarded {
            info!("Engine terminated; next job reloads it");
        }
        discarded
    }
}
