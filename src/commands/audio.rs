//! Audio commands

use super::run_one;
use crate::catalog::{BackgroundMusicOptions, ExtractAudioOptions, Operation, VolumeOptions};
use crate::error::Result;
use crate::jobs::ProgressCallback;
use crate::service::MediaEngine;
use crate::types::{MediaResult, SourceFile};

pub async fn volume(
    engine: &MediaEngine,
    sources: &[SourceFile],
    options: VolumeOptions,
    on_progress: Option<&ProgressCallback<'_>>,
) -> Result<MediaResult> {
    run_one(engine, sources, Operation::Volume(options), on_progress).await
}

/// Drop every audio stream, copying the video untouched
pub async fn remove_audio(
    engine: &MediaEngine,
    sources: &[SourceFile],
    on_progress: Option<&ProgressCallback<'_>>,
) -> Result<MediaResult> {
    run_one(engine, sources, Operation::RemoveAudio, on_progress).await
}

/// Swap the audio of the first source for the second source
pub async fn replace_audio(
    engine: &MediaEngine,
    sources: &[SourceFile],
    on_progress: Option<&ProgressCallback<'_>>,
) -> Result<MediaResult> {
    run_one(engine, sources, Operation::ReplaceAudio, on_progress).await
}

pub async fn extract_audio(
    engine: &MediaEngine,
    sources: &[SourceFile],
    options: ExtractAudioOptions,
    on_progress: Option<&ProgressCallback<'_>>,
) -> Result<MediaResult> {
    run_one(engine, sources, Operation::ExtractAudio(options), on_progress).await
}

/// Mix a music track (second source) under the original audio
pub async fn background_music(
    engine: &MediaEngine,
    sources: &[SourceFile],
    options: BackgroundMusicOptions,
    on_progress: Option<&ProgressCallback<'_>>,
) -> Result<MediaResult> {
    run_one(engine, sources, Operation::BackgroundMusic(options), on_progress).await
}
