//! Composition commands
//!
//! Operations over several sources, or producing several files.

use super::{run_many, run_one};
use crate::catalog::{
    build_plan, BoomerangOptions, ExtractFramesOptions, LoopOptions, MergeOptions, Operation,
    PictureInPictureOptions, SplitScreenOptions, SplitVideoOptions, TimelapseOptions,
};
use crate::error::Result;
use crate::jobs::ProgressCallback;
use crate::service::MediaEngine;
use crate::types::{MediaResult, SourceFile};

/// Concatenate clips in order after normalizing them to one format
///
/// When `options.has_audio` is empty each source is probed first, so silent
/// clips get a generated track and the rest stay in sync.
pub async fn merge(
    engine: &MediaEngine,
    sources: &[SourceFile],
    mut options: MergeOptions,
    on_progress: Option<&ProgressCallback<'_>>,
) -> Result<MediaResult> {
    if options.has_audio.is_empty() {
        // Reject bad parameters before any probe loads the engine
        build_plan(&Operation::Merge(options.clone()), sources)?;
        for source in sources {
            options.has_audio.push(engine.probe(source).await?.has_audio);
        }
    }
    run_one(engine, sources, Operation::Merge(options), on_progress).await
}

pub async fn loop_clip(
    engine: &MediaEngine,
    sources: &[SourceFile],
    options: LoopOptions,
    on_progress: Option<&ProgressCallback<'_>>,
) -> Result<MediaResult> {
    run_one(engine, sources, Operation::Loop(options), on_progress).await
}

pub async fn boomerang(
    engine: &MediaEngine,
    sources: &[SourceFile],
    options: BoomerangOptions,
    on_progress: Option<&ProgressCallback<'_>>,
) -> Result<MediaResult> {
    run_one(engine, sources, Operation::Boomerang(options), on_progress).await
}

/// Build a clip from still images, in source order
pub async fn timelapse(
    engine: &MediaEngine,
    sources: &[SourceFile],
    options: TimelapseOptions,
    on_progress: Option<&ProgressCallback<'_>>,
) -> Result<MediaResult> {
    run_one(engine, sources, Operation::Timelapse(options), on_progress).await
}

pub async fn picture_in_picture(
    engine: &MediaEngine,
    sources: &[SourceFile],
    options: PictureInPictureOptions,
    on_progress: Option<&ProgressCallback<'_>>,
) -> Result<MediaResult> {
    run_one(engine, sources, Operation::PictureInPicture(options), on_progress).await
}

pub async fn split_screen(
    engine: &MediaEngine,
    sources: &[SourceFile],
    options: SplitScreenOptions,
    on_progress: Option<&ProgressCallback<'_>>,
) -> Result<MediaResult> {
    run_one(engine, sources, Operation::SplitScreen(options), on_progress).await
}

/// Stills at regular intervals; frames past the end are left out
pub async fn extract_frames(
    engine: &MediaEngine,
    sources: &[SourceFile],
    options: ExtractFramesOptions,
    on_progress: Option<&ProgressCallback<'_>>,
) -> Result<Vec<MediaResult>> {
    run_many(engine, sources, Operation::ExtractFrames(options), on_progress).await
}

pub async fn split_video(
    engine: &MediaEngine,
    sources: &[SourceFile],
    options: SplitVideoOptions,
    on_progress: Option<&ProgressCallback<'_>>,
) -> Result<Vec<MediaResult>> {
    run_many(engine, sources, Operation::SplitVideo(options), on_progress).await
}
