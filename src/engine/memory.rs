//! In-memory engine
//!
//! Holds its files in a map and runs a scripted handler instead of a real
//! toolkit. Hosts use it to exercise the job pipeline without binaries; the
//! crate's own tests use it to observe what the runner writes, executes and
//! deletes.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::{validate_file_name, Engine, RawProgress};
use crate::error::{EngineError, Result};

pub type Files = BTreeMap<String, Vec<u8>>;
type Handler = dyn Fn(&[String], &mut Files) -> Result<()> + Send + Sync;

/// One recorded `exec` call
#[derive(Debug, Clone)]
pub struct ExecRecord {
    pub argv: Vec<String>,
    /// Files present when the call started
    pub files: Vec<String>,
}

pub struct MemoryEngine {
    files: Mutex<Files>,
    handler: Arc<Handler>,
    progress: Vec<f64>,
    exec_delay: Option<Duration>,
    probe_output: String,
    history: Mutex<Vec<ExecRecord>>,
    active: AtomicUsize,
    max_active: AtomicUsize,
}

impl Default for MemoryEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryEngine {
    /// Engine whose executions check their `-i` inputs exist and write the
    /// last argument as a small output file
    pub fn new() -> Self {
        Self {
            files: Mutex::new(Files::new()),
            handler: Arc::new(default_handler),
            progress: vec![0.0, 0.5, 1.0],
            exec_delay: None,
            probe_output: "{}".to_string(),
            history: Mutex::new(Vec::new()),
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
        }
    }

    pub fn with_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&[String], &mut Files) -> Result<()> + Send + Sync + 'static,
    {
        self.handler = Arc::new(handler);
        self
    }

    /// Raw fractions reported by every execution
    pub fn with_progress(mut self, progress: Vec<f64>) -> Self {
        self.progress = progress;
        self
    }

    pub fn with_exec_delay(mut self, delay: Duration) -> Self {
        self.exec_delay = Some(delay);
        self
    }

    pub fn with_probe_output(mut self, output: impl Into<String>) -> Self {
        self.probe_output = output.into();
        self
    }

    pub fn history(&self) -> Vec<ExecRecord> {
        self.history.lock().map(|h| h.clone()).unwrap_or_default()
    }

    /// Highest number of executions observed running at the same time
    pub fn max_concurrent_execs(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    pub fn file_names(&self) -> Vec<String> {
        self.files
            .lock()
            .map(|f| f.keys().cloned().collect())
            .unwrap_or_default()
    }

    fn lock_files(&self) -> Result<std::sync::MutexGuard<'_, Files>> {
        self.files
            .lock()
            .map_err(|e| EngineError::Load(format!("Engine filesystem poisoned: {}", e)))
    }
}

/// Default execution script
pub fn default_handler(argv: &[String], files: &mut Files) -> Result<()> {
    let mut args = argv.iter();
    let mut format = None;
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-f" => format = args.next().map(String::as_str),
            "-i" => {
                let Some(input) = args.next() else {
                    return Err(exec_error("missing value for -i"));
                };
                // lavfi inputs are generated, not read from the filesystem
                let generated = format.take() == Some("lavfi");
                if !generated && !files.contains_key(input.as_str()) {
                    return Err(exec_error(&format!("{}: No such file or directory", input)));
                }
            }
            _ => {}
        }
    }
    match argv.last() {
        Some(output) if !output.starts_with('-') => {
            files.insert(output.clone(), format!("out:{}", output).into_bytes());
            Ok(())
        }
        _ => Err(exec_error("At least one output file must be specified")),
    }
}

fn exec_error(message: &str) -> EngineError {
    EngineError::Execution {
        operation: "ffmpeg".to_string(),
        message: message.to_string(),
    }
}

#[async_trait]
impl Engine for MemoryEngine {
    async fn write_file(&self, name: &str, data: &[u8]) -> Result<()> {
        validate_file_name(name)?;
        self.lock_files()?.insert(name.to_string(), data.to_vec());
        Ok(())
    }

    async fn read_file(&self, name: &str) -> Result<Vec<u8>> {
        validate_file_name(name)?;
        self.lock_files()?
            .get(name)
            .cloned()
            .ok_or_else(|| EngineError::FileNotFound(name.to_string()))
    }

    async fn delete_file(&self, name: &str) -> Result<()> {
        validate_file_name(name)?;
        self.lock_files()?.remove(name);
        Ok(())
    }

    async fn list_files(&self) -> Result<Vec<String>> {
        Ok(self.lock_files()?.keys().cloned().collect())
    }

    async fn exec(&self, argv: &[String], progress: RawProgress<'_>) -> Result<()> {
        let now_active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now_active, Ordering::SeqCst);

        let files = self.file_names();
        if let Ok(mut history) = self.history.lock() {
            history.push(ExecRecord {
                argv: argv.to_vec(),
                files,
            });
        }

        if let Some(delay) = self.exec_delay {
            tokio::time::sleep(delay).await;
        }

        let result = match self.lock_files() {
            Ok(mut files) => (self.handler)(argv, &mut files),
            Err(e) => Err(e),
        };
        if result.is_ok() {
            for fraction in &self.progress {
                progress(*fraction);
            }
        }

        self.active.fetch_sub(1, Ordering::SeqCst);
        result
    }

    async fn ffprobe(&self, argv: &[String]) -> Result<String> {
        if let Some(input) = argv.last() {
            if !self.lock_files()?.contains_key(input.as_str()) {
                return Err(exec_error(&format!("{}: No such file or directory", input)));
            }
        }
        Ok(self.probe_output.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(args: &[&str]) -> Vec<String> {
        args.iter().map(|a| a.to_string()).collect()
    }

    #[tokio::test]
    async fn test_write_read_delete() {
        let engine = MemoryEngine::new();
        engine.write_file("input.mp4", b"abc").await.unwrap();
        assert_eq!(engine.read_file("input.mp4").await.unwrap(), b"abc");

        engine.delete_file("input.mp4").await.unwrap();
        engine.delete_file("input.mp4").await.unwrap();
        assert!(matches!(
            engine.read_file("input.mp4").await,
            Err(EngineError::FileNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_default_handler_requires_inputs() {
        let engine = MemoryEngine::new();
        let err = engine
            .exec(&argv(&["-i", "input.mp4", "output.mp4"]), &|_| {})
            .await
            .unwrap_err();
        assert_eq!(err.code(), "execution_failed");

        engine.write_file("input.mp4", b"abc").await.unwrap();
        engine
            .exec(&argv(&["-i", "input.mp4", "output.mp4"]), &|_| {})
            .await
            .unwrap();
        assert!(engine.file_names().contains(&"output.mp4".to_string()));
    }

    #[tokio::test]
    async fn test_reports_scripted_progress() {
        let engine = MemoryEngine::new().with_progress(vec![0.2, 0.9]);
        engine.write_file("input.mp4", b"abc").await.unwrap();

        let seen = Mutex::new(Vec::new());
        engine
            .exec(&argv(&["-i", "input.mp4", "out.mp4"]), &|p| {
                seen.lock().unwrap().push(p)
            })
            .await
            .unwrap();
        assert_eq!(*seen.lock().unwrap(), vec![0.2, 0.9]);
    }
}
