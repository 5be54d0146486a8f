//! Video commands
//!
//! Single-input operations that re-encode or re-time the picture.

use super::run_one;
use crate::catalog::{
    AdjustOptions, AspectRatioOptions, BurnSubtitlesOptions, ChromaKeyOptions, CompressOptions,
    ConvertOptions, CropOptions, DenoiseOptions, FadeOptions, FilterOptions, FlipOptions,
    Operation, ResizeOptions, RotateOptions, SharpenOptions, SpeedOptions, ToGifOptions,
    TrimOptions, WatermarkOptions,
};
use crate::error::Result;
use crate::jobs::ProgressCallback;
use crate::service::MediaEngine;
use crate::types::{MediaResult, SourceFile};

// ============================================================================
// Encoding
// ============================================================================

/// Re-encode to H.264 at a quality preset
pub async fn compress(
    engine: &MediaEngine,
    sources: &[SourceFile],
    options: CompressOptions,
    on_progress: Option<&ProgressCallback<'_>>,
) -> Result<MediaResult> {
    run_one(engine, sources, Operation::Compress(options), on_progress).await
}

/// Change the container and codecs
pub async fn convert(
    engine: &MediaEngine,
    sources: &[SourceFile],
    options: ConvertOptions,
    on_progress: Option<&ProgressCallback<'_>>,
) -> Result<MediaResult> {
    run_one(engine, sources, Operation::Convert(options), on_progress).await
}

pub async fn to_gif(
    engine: &MediaEngine,
    sources: &[SourceFile],
    options: ToGifOptions,
    on_progress: Option<&ProgressCallback<'_>>,
) -> Result<MediaResult> {
    run_one(engine, sources, Operation::ToGif(options), on_progress).await
}

// ============================================================================
// Geometry
// ============================================================================

pub async fn resize(
    engine: &MediaEngine,
    sources: &[SourceFile],
    options: ResizeOptions,
    on_progress: Option<&ProgressCallback<'_>>,
) -> Result<MediaResult> {
    run_one(engine, sources, Operation::Resize(options), on_progress).await
}

pub async fn rotate(
    engine: &MediaEngine,
    sources: &[SourceFile],
    options: RotateOptions,
    on_progress: Option<&ProgressCallback<'_>>,
) -> Result<MediaResult> {
    run_one(engine, sources, Operation::Rotate(options), on_progress).await
}

pub async fn flip(
    engine: &MediaEngine,
    sources: &[SourceFile],
    options: FlipOptions,
    on_progress: Option<&ProgressCallback<'_>>,
) -> Result<MediaResult> {
    run_one(engine, sources, Operation::Flip(options), on_progress).await
}

/// Crop to a rectangle; odd sizes are floored to even
pub async fn crop(
    engine: &MediaEngine,
    sources: &[SourceFile],
    options: CropOptions,
    on_progress: Option<&ProgressCallback<'_>>,
) -> Result<MediaResult> {
    run_one(engine, sources, Operation::Crop(options), on_progress).await
}

/// Fit to a target aspect ratio by padding or cropping
pub async fn aspect_ratio(
    engine: &MediaEngine,
    sources: &[SourceFile],
    options: AspectRatioOptions,
    on_progress: Option<&ProgressCallback<'_>>,
) -> Result<MediaResult> {
    run_one(engine, sources, Operation::AspectRatio(options), on_progress).await
}

// ============================================================================
// Timing
// ============================================================================

pub async fn speed(
    engine: &MediaEngine,
    sources: &[SourceFile],
    options: SpeedOptions,
    on_progress: Option<&ProgressCallback<'_>>,
) -> Result<MediaResult> {
    run_one(engine, sources, Operation::Speed(options), on_progress).await
}

pub async fn trim(
    engine: &MediaEngine,
    sources: &[SourceFile],
    options: TrimOptions,
    on_progress: Option<&ProgressCallback<'_>>,
) -> Result<MediaResult> {
    run_one(engine, sources, Operation::Trim(options), on_progress).await
}

pub async fn reverse(
    engine: &MediaEngine,
    sources: &[SourceFile],
    on_progress: Option<&ProgressCallback<'_>>,
) -> Result<MediaResult> {
    run_one(engine, sources, Operation::Reverse, on_progress).await
}

// ============================================================================
// Look
// ============================================================================

/// Draw a text watermark
pub async fn watermark(
    engine: &MediaEngine,
    sources: &[SourceFile],
    options: WatermarkOptions,
    on_progress: Option<&ProgressCallback<'_>>,
) -> Result<MediaResult> {
    run_one(engine, sources, Operation::Watermark(options), on_progress).await
}

pub async fn fade(
    engine: &MediaEngine,
    sources: &[SourceFile],
    options: FadeOptions,
    on_progress: Option<&ProgressCallback<'_>>,
) -> Result<MediaResult> {
    run_one(engine, sources, Operation::Fade(options), on_progress).await
}

pub async fn filter(
    engine: &MediaEngine,
    sources: &[SourceFile],
    options: FilterOptions,
    on_progress: Option<&ProgressCallback<'_>>,
) -> Result<MediaResult> {
    run_one(engine, sources, Operation::Filter(options), on_progress).await
}

/// Brightness, contrast and saturation
pub async fn adjust(
    engine: &MediaEngine,
    sources: &[SourceFile],
    options: AdjustOptions,
    on_progress: Option<&ProgressCallback<'_>>,
) -> Result<MediaResult> {
    run_one(engine, sources, Operation::Adjust(options), on_progress).await
}

pub async fn sharpen(
    engine: &MediaEngine,
    sources: &[SourceFile],
    options: SharpenOptions,
    on_progress: Option<&ProgressCallback<'_>>,
) -> Result<MediaResult> {
    run_one(engine, sources, Operation::Sharpen(options), on_progress).await
}

pub async fn denoise(
    engine: &MediaEngine,
    sources: &[SourceFile],
    options: DenoiseOptions,
    on_progress: Option<&ProgressCallback<'_>>,
) -> Result<MediaResult> {
    run_one(engine, sources, Operation::Denoise(options), on_progress).await
}

/// Key out a color; a second source becomes the new background
pub async fn chroma_key(
    engine: &MediaEngine,
    sources: &[SourceFile],
    options: ChromaKeyOptions,
    on_progress: Option<&ProgressCallback<'_>>,
) -> Result<MediaResult> {
    run_one(engine, sources, Operation::ChromaKey(options), on_progress).await
}

/// Render the subtitle file (second source) into the picture
pub async fn burn_subtitles(
    engine: &MediaEngine,
    sources: &[SourceFile],
    options: BurnSubtitlesOptions,
    on_progress: Option<&ProgressCallback<'_>>,
) -> Result<MediaResult> {
    run_one(engine, sources, Operation::BurnSubtitles(options), on_progress).await
}
