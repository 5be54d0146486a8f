//! Shared types and data structures for the media engine

use serde::Serialize;
use std::sync::Arc;

// ============================================================================
// Media Types
// ============================================================================

/// A file handed in by the caller
#[derive(Debug, Clone)]
pub struct SourceFile {
    /// Original file name, used for the container extension and display names
    pub name: String,
    pub data: Arc<[u8]>,
}

impl SourceFile {
    pub fn new(name: impl Into<String>, data: impl Into<Arc<[u8]>>) -> Self {
        Self {
            name: name.into(),
            data: data.into(),
        }
    }

    /// File name without its extension
    pub fn stem(&self) -> &str {
        match self.name.rsplit_once('.') {
            Some((stem, _)) if !stem.is_empty() => stem,
            _ if self.name.is_empty() => "output",
            _ => &self.name,
        }
    }

    /// Lowercase extension, if it looks like a real one
    pub fn extension(&self) -> Option<String> {
        let (_, ext) = self.name.rsplit_once('.')?;
        let valid =
            !ext.is_empty() && ext.len() <= 5 && ext.chars().all(|c| c.is_ascii_alphanumeric());
        valid.then(|| ext.to_ascii_lowercase())
    }
}

/// One produced file; the bytes belong to the caller
#[derive(Clone, Serialize)]
pub struct MediaResult {
    #[serde(skip)]
    pub bytes: Vec<u8>,
    pub display_name: String,
    pub mime_type: String,
    pub byte_size: u64,
}

impl std::fmt::Debug for MediaResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaResult")
            .field("display_name", &self.display_name)
            .field("mime_type", &self.mime_type)
            .field("byte_size", &self.byte_size)
            .finish()
    }
}

// ============================================================================
// Job Queue Types
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct JobInfo {
    pub job_id: String,
    pub operation: String,
    pub state: String,
    pub queued_seconds: Option<f64>,
    pub running_seconds: Option<f64>,
    pub progress_percentage: Option<u8>,
}

#[derive(Debug, Clone, Serialize)]
pub struct QueueStatus {
    pub queued: Vec<JobInfo>,
    pub running: Vec<JobInfo>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_stem_and_extension() {
        let source = SourceFile::new("holiday.clip.MOV", vec![1u8]);
        assert_eq!(source.stem(), "holiday.clip");
        assert_eq!(source.extension().as_deref(), Some("mov"));

        let bare = SourceFile::new("recording", vec![1u8]);
        assert_eq!(bare.stem(), "recording");
        assert_eq!(bare.extension(), None);

        let hidden = SourceFile::new(".mp4", vec![1u8]);
        assert_eq!(hidden.stem(), ".mp4");
        assert_eq!(SourceFile::new("a.b c", vec![1u8]).extension(), None);
    }
}
