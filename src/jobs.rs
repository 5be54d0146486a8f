//! Job runner for the media engine
//!
//! Bridges a [`JobPlan`] onto an engine's private filesystem: inputs are
//! written, steps execute in order, outputs are read back and every path the
//! plan names is deleted afterwards. The toolkit is not reentrant, so jobs run
//! one at a time in arrival order.

use log::{debug, error, info, warn};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio::sync::{broadcast, OwnedMutexGuard};
use uuid::Uuid;

use crate::catalog::{InputFile, JobPlan};
use crate::engine::Engine;
use crate::error::{EngineError, Result};
use crate::progress::{ProgressEvent, ProgressNormalizer};
use crate::types::{JobInfo, MediaResult, QueueStatus};

/// Per-call progress callback, receives 0-100
pub type ProgressCallback<'a> = dyn Fn(u8) + Send + Sync + 'a;

/// Represents a job
#[derive(Debug, Clone)]
struct Job {
    id: Uuid,
    operation: &'static str,
    queued_at: Instant,
    started_at: Option<Instant>,
    progress: Arc<AtomicU8>,
}

impl Job {
    fn new(operation: &'static str) -> Self {
        Self {
            id: Uuid::new_v4(),
            operation,
            queued_at: Instant::now(),
            started_at: None,
            progress: Arc::new(AtomicU8::new(0)),
        }
    }

    fn info(&self, state: &str) -> JobInfo {
        JobInfo {
            job_id: self.id.to_string(),
            operation: self.operation.to_string(),
            state: state.to_string(),
            queued_seconds: Some(self.queued_at.elapsed().as_secs_f64()),
            running_seconds: self.started_at.map(|s| s.elapsed().as_secs_f64()),
            progress_percentage: self
                .started_at
                .map(|_| self.progress.load(Ordering::SeqCst)),
        }
    }
}

/// Bookkeeping of waiting and running jobs
#[derive(Default)]
struct JobQueue {
    queued: Mutex<VecDeque<Job>>,
    running: Mutex<Option<Job>>,
}

impl JobQueue {
    fn enqueue(&self, operation: &'static str) -> Job {
        let job = Job::new(operation);
        if let Ok(mut queued) = self.queued.lock() {
            queued.push_back(job.clone());
            info!(
                "Queued {} job {} (queue position: {})",
                operation,
                job.id,
                queued.len()
            );
        }
        job
    }

    fn start(&self, id: Uuid) {
        let Ok(mut queued) = self.queued.lock() else {
            return;
        };
        let job = queued
            .iter()
            .position(|j| j.id == id)
            .and_then(|pos| queued.remove(pos));
        let remaining = queued.len();
        drop(queued);

        if let Some(mut job) = job {
            job.started_at = Some(Instant::now());
            info!(
                "Started {} job {} [{} remaining in queue]",
                job.operation, job.id, remaining
            );
            if let Ok(mut running) = self.running.lock() {
                *running = Some(job);
            }
        }
    }

    fn finish(&self, id: Uuid) {
        if let Ok(mut running) = self.running.lock() {
            if running.as_ref().is_some_and(|j| j.id == id) {
                if let Some(job) = running.take() {
                    let elapsed = job.started_at.map(|s| s.elapsed().as_secs_f64());
                    info!(
                        "Completed {} job {} (took {:.2}s)",
                        job.operation,
                        job.id,
                        elapsed.unwrap_or(0.0)
                    );
                }
                return;
            }
        }
        if let Ok(mut queued) = self.queued.lock() {
            if let Some(pos) = queued.iter().position(|j| j.id == id) {
                queued.remove(pos);
                debug!("Removed job {} before it started", id);
            }
        }
    }

    fn status(&self) -> QueueStatus {
        let queued = self
            .queued
            .lock()
            .map(|q| q.iter().map(|j| j.info("queued")).collect::<Vec<_>>())
            .unwrap_or_default();
        let running = self
            .running
            .lock()
            .map(|r| r.iter().map(|j| j.info("running")).collect::<Vec<_>>())
            .unwrap_or_default();
        QueueStatus { queued, running }
    }
}

/// Takes a job off the queue however its future ends
struct QueueTicket<'a> {
    queue: &'a JobQueue,
    id: Uuid,
}

impl Drop for QueueTicket<'_> {
    fn drop(&mut self) {
        self.queue.finish(self.id);
    }
}

/// Deletes the plan's engine paths and then frees the job slot
///
/// `release` does this inline. If the job future is dropped first, deletion is
/// spawned onto the runtime and the slot stays held until it is done, so the
/// next job never sees leftovers under the same names.
struct ScratchGuard {
    engine: Option<Arc<dyn Engine>>,
    paths: Vec<String>,
    slot: Option<OwnedMutexGuard<()>>,
}

impl ScratchGuard {
    fn new(engine: Arc<dyn Engine>, paths: Vec<String>, slot: OwnedMutexGuard<()>) -> Self {
        Self {
            engine: Some(engine),
            paths,
            slot: Some(slot),
        }
    }

    async fn release(mut self) {
        if let Some(engine) = self.engine.take() {
            cleanup(engine.as_ref(), &self.paths).await;
        }
        self.slot.take();
    }
}

impl Drop for ScratchGuard {
    fn drop(&mut self) {
        let Some(engine) = self.engine.take() else {
            return;
        };
        let paths = std::mem::take(&mut self.paths);
        let slot = self.slot.take();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                warn!("Job dropped mid-flight, scheduling cleanup of {} files", paths.len());
                handle.spawn(async move {
                    cleanup(engine.as_ref(), &paths).await;
                    drop(slot);
                });
            }
            Err(_) => error!("No runtime to clean up {} engine files", paths.len()),
        }
    }
}

async fn cleanup(engine: &dyn Engine, paths: &[String]) {
    for path in paths {
        if let Err(e) = engine.delete_file(path).await {
            warn!("Failed to delete engine file {}: {}", path, e);
        }
    }
    debug!("Cleaned up {} engine files", paths.len());
}

/// Attribute a toolkit failure to the operation that caused it
fn attribute(operation: &str, err: EngineError) -> EngineError {
    match err {
        EngineError::Execution { message, .. } => EngineError::Execution {
            operation: operation.to_string(),
            message,
        },
        other => other,
    }
}

pub struct JobRunner {
    slot: Arc<tokio::sync::Mutex<()>>,
    queue: JobQueue,
    progress: broadcast::Sender<ProgressEvent>,
}

impl JobRunner {
    pub fn new(progress_capacity: usize) -> Self {
        let (progress, _) = broadcast::channel(progress_capacity.max(1));
        Self {
            slot: Arc::new(tokio::sync::Mutex::new(())),
            queue: JobQueue::default(),
            progress,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ProgressEvent> {
        self.progress.subscribe()
    }

    /// Get queue status (both queued and running jobs)
    pub fn queue_status(&self) -> QueueStatus {
        self.queue.status()
    }

    /// Run `plan` against `engine` once every earlier job has finished
    pub async fn run(
        &self,
        engine: Arc<dyn Engine>,
        plan: &JobPlan,
        on_progress: Option<&ProgressCallback<'_>>,
    ) -> Result<Vec<MediaResult>> {
        let job = self.queue.enqueue(plan.operation);
        let _ticket = QueueTicket {
            queue: &self.queue,
            id: job.id,
        };

        let slot = self.slot.clone().lock_owned().await;
        self.queue.start(job.id);
        let guard = ScratchGuard::new(engine.clone(), plan.paths(), slot);

        let result = self.execute(engine.as_ref(), plan, &job, on_progress).await;
        guard.release().await;

        match &result {
            Ok(results) => debug!("Job {} produced {} file(s)", job.id, results.len()),
            Err(e) => error!("{} job {} failed: {}", plan.operation, job.id, e),
        }
        result
    }

    /// Run the probe tool over one input under the same job discipline
    pub async fn probe(
        &self,
        engine: Arc<dyn Engine>,
        input: &InputFile,
        argv: &[String],
    ) -> Result<String> {
        let job = self.queue.enqueue("probe");
        let _ticket = QueueTicket {
            queue: &self.queue,
            id: job.id,
        };

        let slot = self.slot.clone().lock_owned().await;
        self.queue.start(job.id);
        let guard = ScratchGuard::new(engine.clone(), vec![input.name.clone()], slot);

        let result = match engine.write_file(&input.name, &input.data).await {
            Ok(()) => engine.ffprobe(argv).await,
            Err(e) => Err(e),
        };
        guard.release().await;
        result
    }

    async fn execute(
        &self,
        engine: &dyn Engine,
        plan: &JobPlan,
        job: &Job,
        on_progress: Option<&ProgressCallback<'_>>,
    ) -> Result<Vec<MediaResult>> {
        let normalizer = Mutex::new(ProgressNormalizer::new(plan.steps.len()));
        self.emit(job, 0, on_progress);

        for (index, step) in plan.steps.iter().enumerate() {
            let started = normalizer.lock().ok().and_then(|mut n| n.start_step(index));
            if let Some(percent) = started {
                self.emit(job, percent, on_progress);
            }

            for input in &step.inputs {
                engine.write_file(&input.name, &input.data).await?;
            }

            debug!(
                "Job {} step {}/{}: {}",
                job.id,
                index + 1,
                plan.steps.len(),
                step.argv.join(" ")
            );
            let report = |raw: f64| {
                let advanced = normalizer.lock().ok().and_then(|mut n| n.observe(raw));
                if let Some(percent) = advanced {
                    self.emit(job, percent, on_progress);
                }
            };
            match engine.exec(&step.argv, &report).await {
                Ok(()) => {}
                Err(e) if step.tolerate_failure => {
                    warn!("Job {} step {} failed, continuing: {}", job.id, index + 1, e);
                }
                Err(e) => return Err(attribute(plan.operation, e)),
            }
        }

        let mut results = Vec::with_capacity(plan.outputs.len());
        for output in &plan.outputs {
            match engine.read_file(&output.name).await {
                Ok(bytes) if !bytes.is_empty() => results.push(MediaResult {
                    byte_size: bytes.len() as u64,
                    bytes,
                    display_name: output.display_name.clone(),
                    mime_type: output.mime_type.clone(),
                }),
                Ok(_) | Err(EngineError::FileNotFound(_)) if !output.required => {
                    debug!("Job {} omitted missing output {}", job.id, output.name);
                }
                Ok(_) | Err(EngineError::FileNotFound(_)) => {
                    return Err(EngineError::MissingOutput {
                        operation: plan.operation.to_string(),
                        name: output.name.clone(),
                    })
                }
                Err(e) => return Err(e),
            }
        }

        if results.is_empty() {
            if let Some(first) = plan.outputs.first() {
                return Err(EngineError::MissingOutput {
                    operation: plan.operation.to_string(),
                    name: first.name.clone(),
                });
            }
        }

        let done = normalizer.lock().map(|mut n| n.finish()).unwrap_or(100);
        self.emit(job, done, on_progress);
        Ok(results)
    }

    fn emit(&self, job: &Job, percent: u8, on_progress: Option<&ProgressCallback<'_>>) {
        job.progress.store(percent, Ordering::SeqCst);
        if let Some(callback) = on_progress {
            callback(percent);
        }
        // No subscribers is fine
        let _ = self.progress.send(ProgressEvent {
            job_id: job.id,
            percent,
        });
    }
}
