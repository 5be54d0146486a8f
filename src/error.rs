//! Error taxonomy for the media engine
//!
//! Every failure that crosses the crate boundary is an [`EngineError`]. Callers
//! that need to branch on the kind of failure should match on [`EngineError::code`]
//! rather than on message text.

use serde::Serialize;
use thiserror::Error;

pub type Result<T, E = EngineError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum EngineError {
    /// Asset resolution or toolkit initialization failed for this attempt.
    #[error("Failed to load media engine: {0}")]
    Load(String),

    #[error("Media engine failed to load after {attempts} attempts: {last_error}")]
    LoadExhausted { attempts: u32, last_error: String },

    #[error("Failed to fetch asset {url}: {reason}")]
    AssetFetch { url: String, reason: String },

    #[error("Checksum mismatch for {url} (expected {expected}, got {actual})")]
    ChecksumMismatch {
        url: String,
        expected: String,
        actual: String,
    },

    /// The toolkit rejected an argument vector or aborted.
    #[error("{operation} failed: {message}")]
    Execution { operation: String, message: String },

    #[error("{operation} produced no output file {name}")]
    MissingOutput { operation: String, name: String },

    #[error("File not found in engine filesystem: {0}")]
    FileNotFound(String),

    #[error("Invalid parameters: {0}")]
    InvalidParams(String),

    #[error("Invalid engine file name: {0:?}")]
    InvalidFileName(String),

    #[error("Archive error: {0}")]
    Archive(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl EngineError {
    /// Stable machine-readable code for this error kind.
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::Load(_) => "load_failed",
            EngineError::LoadExhausted { .. } => "load_exhausted",
            EngineError::AssetFetch { .. } => "asset_fetch_failed",
            EngineError::ChecksumMismatch { .. } => "checksum_mismatch",
            EngineError::Execution { .. } => "execution_failed",
            EngineError::MissingOutput { .. } => "missing_output",
            EngineError::FileNotFound(_) => "file_not_found",
            EngineError::InvalidParams(_) => "invalid_params",
            EngineError::InvalidFileName(_) => "invalid_file_name",
            EngineError::Archive(_) => "archive_error",
            EngineError::Io(_) => "io_error",
            EngineError::Json(_) => "json_error",
        }
    }

    /// True for failures of the load path (asset fetch or initialization).
    pub fn is_load_failure(&self) -> bool {
        matches!(
            self,
            EngineError::Load(_)
                | EngineError::LoadExhausted { .. }
                | EngineError::AssetFetch { .. }
                | EngineError::ChecksumMismatch { .. }
                | EngineError::Archive(_)
        )
    }

    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        EngineError::InvalidParams(message.into())
    }

    pub fn to_payload(&self) -> ErrorPayload {
        ErrorPayload {
            code: self.code(),
            message: self.to_string(),
        }
    }
}

/// Serializable form of an error for UI collaborators.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorPayload {
    pub code: &'static str,
    pub message: String,
}
