//! Process-backed engine
//!
//! Runs the extracted ffmpeg/ffprobe executables as child processes. The
//! engine's private filesystem is a scratch directory owned by the engine and
//! used as the working directory of every child, so argument vectors only ever
//! reference bare file names.

use async_trait::async_trait;
use log::{debug, info, warn};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::process::Command;

use super::{validate_file_name, Engine, EngineAssets, EngineFactory, RawProgress};
use crate::assets::extract_executable;
use crate::error::{EngineError, Result};

/// Number of stderr lines kept for error messages
const STDERR_TAIL_LINES: usize = 20;

pub struct FfmpegEngine {
    ffmpeg: PathBuf,
    ffprobe: PathBuf,
    scratch: TempDir,
    /// Holds the extracted executables for the engine's lifetime
    _bin_dir: TempDir,
}

impl FfmpegEngine {
    /// Materialize both executables and verify the toolkit starts
    pub async fn initialize(assets: EngineAssets, scratch_parent: Option<&Path>) -> Result<Self> {
        let bin_dir = make_temp_dir("localcut-bin-", scratch_parent)?;
        let scratch = make_temp_dir("localcut-fs-", scratch_parent)?;

        let payload = assets.payload.bytes().await?;
        let loader = assets.loader.bytes().await?;
        let bin_path = bin_dir.path().to_path_buf();
        let payload_mime = assets.payload.mime_type.clone();
        let loader_mime = assets.loader.mime_type.clone();

        // Archive extraction is blocking work
        let (ffmpeg, ffprobe) = tokio::task::spawn_blocking(move || -> Result<_> {
            let ffmpeg = extract_executable(&payload, &payload_mime, "ffmpeg", &bin_path)?;
            let ffprobe = extract_executable(&loader, &loader_mime, "ffprobe", &bin_path)?;
            Ok((ffmpeg, ffprobe))
        })
        .await
        .map_err(|e| EngineError::Load(format!("Extraction task failed: {}", e)))??;

        let engine = Self {
            ffmpeg,
            ffprobe,
            scratch,
            _bin_dir: bin_dir,
        };
        let version = engine.version().await?;
        info!("Media engine initialized: {}", version);
        Ok(engine)
    }

    /// Use executables that already exist on disk
    pub fn from_paths(
        ffmpeg: PathBuf,
        ffprobe: PathBuf,
        scratch_parent: Option<&Path>,
    ) -> Result<Self> {
        Ok(Self {
            ffmpeg,
            ffprobe,
            scratch: make_temp_dir("localcut-fs-", scratch_parent)?,
            _bin_dir: make_temp_dir("localcut-bin-", scratch_parent)?,
        })
    }

    /// First line of `ffmpeg -version`
    pub async fn version(&self) -> Result<String> {
        let output = Command::new(&self.ffmpeg)
            .arg("-version")
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| EngineError::Load(format!("Failed to run ffmpeg: {}", e)))?;
        if !output.status.success() {
            return Err(EngineError::Load(format!(
                "ffmpeg -version exited with {}",
                output.status
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout)
            .lines()
            .next()
            .unwrap_or("ffmpeg")
            .to_string())
    }

    fn path_of(&self, name: &str) -> Result<PathBuf> {
        validate_file_name(name)?;
        Ok(self.scratch.path().join(name))
    }
}

fn make_temp_dir(prefix: &str, parent: Option<&Path>) -> Result<TempDir> {
    let mut builder = tempfile::Builder::new();
    builder.prefix(prefix);
    let dir = match parent {
        Some(parent) => {
            std::fs::create_dir_all(parent)?;
            builder.tempdir_in(parent)?
        }
        None => builder.tempdir()?,
    };
    Ok(dir)
}

#[async_trait]
impl Engine for FfmpegEngine {
    async fn write_file(&self, name: &str, data: &[u8]) -> Result<()> {
        tokio::fs::write(self.path_of(name)?, data).await?;
        Ok(())
    }

    async fn read_file(&self, name: &str) -> Result<Vec<u8>> {
        match tokio::fs::read(self.path_of(name)?).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(EngineError::FileNotFound(name.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn delete_file(&self, name: &str) -> Result<()> {
        match tokio::fs::remove_file(self.path_of(name)?).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn list_files(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        let mut entries = tokio::fs::read_dir(self.scratch.path()).await?;
        while let Some(entry) = entries.next_entry().await? {
            names.push(entry.file_name().to_string_lossy().to_string());
        }
        names.sort();
        Ok(names)
    }

    async fn exec(&self, argv: &[String], progress: RawProgress<'_>) -> Result<()> {
        debug!("ffmpeg {}", argv.join(" "));

        let mut child = Command::new(&self.ffmpeg)
            .current_dir(self.scratch.path())
            .args(["-hide_banner", "-nostdin", "-y", "-progress", "pipe:1", "-nostats"])
            .args(argv)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| EngineError::Execution {
                operation: "ffmpeg".to_string(),
                message: format!("Failed to spawn ffmpeg: {}", e),
            })?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        let source_duration = Arc::new(Mutex::new(None::<f64>));
        let tail = Arc::new(Mutex::new(VecDeque::with_capacity(STDERR_TAIL_LINES)));

        let stderr_task = {
            let source_duration = source_duration.clone();
            let tail = tail.clone();
            tokio::spawn(async move {
                let Some(err) = stderr else { return };
                let mut reader = BufReader::new(err);
                let mut buf = Vec::new();
                while let Some(line) = read_lossy_line(&mut reader, &mut buf).await {
                    if let Some(seconds) = parse_duration_line(&line) {
                        if let Ok(mut d) = source_duration.lock() {
                            d.get_or_insert(seconds);
                        }
                    }
                    if let Ok(mut t) = tail.lock() {
                        if t.len() == STDERR_TAIL_LINES {
                            t.pop_front();
                        }
                        t.push_back(line);
                    }
                }
            })
        };

        let output_limit = output_duration_limit(argv);
        if let Some(out) = stdout {
            let mut reader = BufReader::new(out);
            let mut buf = Vec::new();
            while let Some(line) = read_lossy_line(&mut reader, &mut buf).await {
                if line == "progress=end" {
                    progress(1.0);
                    continue;
                }
                let Some(elapsed) = parse_out_time(&line) else {
                    continue;
                };
                let total = output_limit.or_else(|| source_duration.lock().ok().and_then(|d| *d));
                if let Some(total) = total.filter(|t| *t > 0.0) {
                    progress(elapsed / total);
                }
            }
        }

        let status = child.wait().await.map_err(|e| EngineError::Execution {
            operation: "ffmpeg".to_string(),
            message: format!("Failed to wait for ffmpeg: {}", e),
        })?;
        if let Err(e) = stderr_task.await {
            warn!("ffmpeg stderr reader failed: {}", e);
        }

        if !status.success() {
            let message = tail
                .lock()
                .map(|t| t.iter().cloned().collect::<Vec<_>>().join("\n"))
                .unwrap_or_default();
            return Err(EngineError::Execution {
                operation: "ffmpeg".to_string(),
                message: format!("exited with {}: {}", status, message),
            });
        }
        Ok(())
    }

    async fn ffprobe(&self, argv: &[String]) -> Result<String> {
        let output = Command::new(&self.ffprobe)
            .current_dir(self.scratch.path())
            .args(argv)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| EngineError::Execution {
                operation: "ffprobe".to_string(),
                message: format!("Failed to run ffprobe: {}", e),
            })?;

        if !output.status.success() {
            return Err(EngineError::Execution {
                operation: "ffprobe".to_string(),
                message: String::from_utf8_lossy(&output.stderr).to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}

/// Next line of a child pipe, decoded lossily so non-UTF-8 log output
/// never stops the pipe from being drained. `None` only at EOF or on an
/// IO error.
async fn read_lossy_line<R>(reader: &mut R, buf: &mut Vec<u8>) -> Option<String>
where
    R: AsyncBufRead + Unpin,
{
    buf.clear();
    match reader.read_until(b'\n', buf).await {
        Ok(0) => None,
        Ok(_) => {
            let line = String::from_utf8_lossy(buf);
            Some(line.trim_end_matches(['\n', '\r']).to_string())
        }
        Err(e) => {
            warn!("Failed to read child output: {}", e);
            None
        }
    }
}

/// Creates [`FfmpegEngine`]s from downloaded artifacts
pub struct NativeEngineFactory {
    scratch_parent: Option<PathBuf>,
}

impl NativeEngineFactory {
    pub fn new(scratch_parent: Option<PathBuf>) -> Self {
        Self { scratch_parent }
    }
}

#[async_trait]
impl EngineFactory for NativeEngineFactory {
    async fn create(&self, assets: EngineAssets) -> Result<Arc<dyn Engine>> {
        let engine = FfmpegEngine::initialize(assets, self.scratch_parent.as_deref()).await?;
        Ok(Arc::new(engine))
    }
}

/// Parse `HH:MM:SS.ss` into seconds
fn parse_timestamp(value: &str) -> Option<f64> {
    let mut parts = value.trim().split(':');
    let hours: f64 = parts.next()?.parse().ok()?;
    let minutes: f64 = parts.next()?.parse().ok()?;
    let seconds: f64 = parts.next()?.parse().ok()?;
    if parts.next().is_some() {
        return None;
    }
    Some(hours * 3600.0 + minutes * 60.0 + seconds)
}

/// `  Duration: 00:01:02.50, start: 0.000000, bitrate: 1205 kb/s`
fn parse_duration_line(line: &str) -> Option<f64> {
    let rest = line.trim_start().strip_prefix("Duration:")?;
    let value = rest.split(',').next()?;
    parse_timestamp(value)
}

/// `out_time_us=1500000` from the `-progress` stream
fn parse_out_time(line: &str) -> Option<f64> {
    let value = line.strip_prefix("out_time_us=")?;
    let micros: i64 = value.trim().parse().ok()?;
    Some(micros.max(0) as f64 / 1_000_000.0)
}

/// An output `-t <seconds>` bounds the expected output duration
fn output_duration_limit(argv: &[String]) -> Option<f64> {
    argv.windows(2)
        .filter(|w| w[0] == "-t")
        .filter_map(|w| w[1].parse::<f64>().ok())
        .last()
}
