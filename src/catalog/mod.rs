//! Transformation catalog
//!
//! Every user-facing operation maps to a [`JobPlan`]: the files to write into
//! the engine, the ordered argument vectors to execute, and the files to read
//! back. Plan building is pure. The same operation and sources always produce
//! the same plan.

mod composite;
mod extract;
mod recode;
mod sequence;

pub use composite::{
    BackgroundMusicOptions, PictureInPictureOptions, SplitLayout, SplitScreenOptions,
};
pub use extract::{ExtractFramesOptions, ImageFormat, SplitVideoOptions};
pub use recode::{
    AdjustOptions, AspectMode, AspectRatio, AspectRatioOptions, AudioFormat, BurnSubtitlesOptions,
    ChromaKeyOptions, CompressOptions, ConvertOptions, CropOptions, DenoiseOptions,
    ExtractAudioOptions, FadeOptions, FilterOptions, FilterPreset, FlipDirection, FlipOptions,
    Quality, ResizeOptions, RotateOptions, SharpenOptions, SpeedOptions, Strength, ToGifOptions,
    TrimOptions, VideoFormat, VolumeOptions, WatermarkOptions,
};
pub use sequence::{BoomerangOptions, LoopOptions, MergeOptions, TimelapseOptions};

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::{EngineError, Result};
use crate::types::SourceFile;

/// A file written into the engine before a step runs
#[derive(Debug, Clone)]
pub struct InputFile {
    pub name: String,
    pub data: Arc<[u8]>,
}

/// One toolkit execution
#[derive(Debug, Clone)]
pub struct PlanStep {
    pub inputs: Vec<InputFile>,
    pub argv: Vec<String>,
    /// Execution failure is logged and the job continues
    pub tolerate_failure: bool,
}

impl PlanStep {
    fn new(inputs: Vec<InputFile>, argv: Vec<String>) -> Self {
        Self {
            inputs,
            argv,
            tolerate_failure: false,
        }
    }
}

/// A file read back after all steps ran
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputSpec {
    pub name: String,
    pub mime_type: String,
    pub display_name: String,
    /// Missing optional outputs are dropped from the result
    pub required: bool,
}

#[derive(Debug, Clone)]
pub struct JobPlan {
    pub operation: &'static str,
    pub steps: Vec<PlanStep>,
    /// Files produced by one step and consumed by a later one
    pub intermediates: Vec<String>,
    pub outputs: Vec<OutputSpec>,
}

impl JobPlan {
    /// Every engine path the plan touches, deduplicated in first-seen order
    pub fn paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = Vec::new();
        let names = self
            .steps
            .iter()
            .flat_map(|s| s.inputs.iter().map(|i| &i.name))
            .chain(self.intermediates.iter())
            .chain(self.outputs.iter().map(|o| &o.name));
        for name in names {
            if !paths.contains(name) {
                paths.push(name.clone());
            }
        }
        paths
    }
}

/// A requested transformation and its parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "operation", rename_all = "snake_case")]
pub enum Operation {
    Compress(CompressOptions),
    Convert(ConvertOptions),
    Resize(ResizeOptions),
    Speed(SpeedOptions),
    Rotate(RotateOptions),
    Flip(FlipOptions),
    Crop(CropOptions),
    Watermark(WatermarkOptions),
    Fade(FadeOptions),
    Filter(FilterOptions),
    Adjust(AdjustOptions),
    Sharpen(SharpenOptions),
    Denoise(DenoiseOptions),
    ChromaKey(ChromaKeyOptions),
    AspectRatio(AspectRatioOptions),
    Volume(VolumeOptions),
    RemoveAudio,
    BurnSubtitles(BurnSubtitlesOptions),
    ReplaceAudio,
    Trim(TrimOptions),
    ExtractAudio(ExtractAudioOptions),
    ToGif(ToGifOptions),
    Reverse,
    Merge(MergeOptions),
    Loop(LoopOptions),
    Boomerang(BoomerangOptions),
    Timelapse(TimelapseOptions),
    PictureInPicture(PictureInPictureOptions),
    SplitScreen(SplitScreenOptions),
    BackgroundMusic(BackgroundMusicOptions),
    ExtractFrames(ExtractFramesOptions),
    SplitVideo(SplitVideoOptions),
}

impl Operation {
    pub fn name(&self) -> &'static str {
        match self {
            Operation::Compress(_) => "compress",
            Operation::Convert(_) => "convert",
            Operation::Resize(_) => "resize",
            Operation::Speed(_) => "speed",
            Operation::Rotate(_) => "rotate",
            Operation::Flip(_) => "flip",
            Operation::Crop(_) => "crop",
            Operation::Watermark(_) => "watermark",
            Operation::Fade(_) => "fade",
            Operation::Filter(_) => "filter",
            Operation::Adjust(_) => "adjust",
            Operation::Sharpen(_) => "sharpen",
            Operation::Denoise(_) => "denoise",
            Operation::ChromaKey(_) => "chroma_key",
            Operation::AspectRatio(_) => "aspect_ratio",
            Operation::Volume(_) => "volume",
            Operation::RemoveAudio => "remove_audio",
            Operation::BurnSubtitles(_) => "burn_subtitles",
            Operation::ReplaceAudio => "replace_audio",
            Operation::Trim(_) => "trim",
            Operation::ExtractAudio(_) => "extract_audio",
            Operation::ToGif(_) => "to_gif",
            Operation::Reverse => "reverse",
            Operation::Merge(_) => "merge",
            Operation::Loop(_) => "loop",
            Operation::Boomerang(_) => "boomerang",
            Operation::Timelapse(_) => "timelapse",
            Operation::PictureInPicture(_) => "picture_in_picture",
            Operation::SplitScreen(_) => "split_screen",
            Operation::BackgroundMusic(_) => "background_music",
            Operation::ExtractFrames(_) => "extract_frames",
            Operation::SplitVideo(_) => "split_video",
        }
    }

    /// True for operations that return several files
    pub fn is_multi_output(&self) -> bool {
        matches!(self, Operation::ExtractFrames(_) | Operation::SplitVideo(_))
    }
}

/// Build the execution plan for `operation` over `sources`
pub fn build_plan(operation: &Operation, sources: &[SourceFile]) -> Result<JobPlan> {
    match operation {
        Operation::Compress(o) => recode::compress(sources, o),
        Operation::Convert(o) => recode::convert(sources, o),
        Operation::Resize(o) => recode::resize(sources, o),
        Operation::Speed(o) => recode::speed(sources, o),
        Operation::Rotate(o) => recode::rotate(sources, o),
        Operation::Flip(o) => recode::flip(sources, o),
        Operation::Crop(o) => recode::crop(sources, o),
        Operation::Watermark(o) => recode::watermark(sources, o),
        Operation::Fade(o) => recode::fade(sources, o),
        Operation::Filter(o) => recode::filter(sources, o),
        Operation::Adjust(o) => recode::adjust(sources, o),
        Operation::Sharpen(o) => recode::sharpen(sources, o),
        Operation::Denoise(o) => recode::denoise(sources, o),
        Operation::ChromaKey(o) => recode::chroma_key(sources, o),
        Operation::AspectRatio(o) => recode::aspect_ratio(sources, o),
        Operation::Volume(o) => recode::volume(sources, o),
        Operation::RemoveAudio => recode::remove_audio(sources),
        Operation::BurnSubtitles(o) => recode::burn_subtitles(sources, o),
        Operation::ReplaceAudio => recode::replace_audio(sources),
        Operation::Trim(o) => recode::trim(sources, o),
        Operation::ExtractAudio(o) => recode::extract_audio(sources, o),
        Operation::ToGif(o) => recode::to_gif(sources, o),
        Operation::Reverse => recode::reverse(sources),
        Operation::Merge(o) => sequence::merge(sources, o),
        Operation::Loop(o) => sequence::loop_clip(sources, o),
        Operation::Boomerang(o) => sequence::boomerang(sources, o),
        Operation::Timelapse(o) => sequence::timelapse(sources, o),
        Operation::PictureInPicture(o) => composite::picture_in_picture(sources, o),
        Operation::SplitScreen(o) => composite::split_screen(sources, o),
        Operation::BackgroundMusic(o) => composite::background_music(sources, o),
        Operation::ExtractFrames(o) => extract::extract_frames(sources, o),
        Operation::SplitVideo(o) => extract::split_video(sources, o),
    }
}

// ============================================================================
// Shared helpers
// ============================================================================

/// Corner or center placement of an overlay
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Position {
    #[serde(alias = "top-left")]
    TopLeft,
    #[serde(alias = "top-right")]
    TopRight,
    #[serde(alias = "bottom-left")]
    BottomLeft,
    #[default]
    #[serde(alias = "bottom-right")]
    BottomRight,
    Center,
}

impl Position {
    /// Overlay coordinates given the outer and inner size variable names
    fn coordinates(
        &self,
        outer: (&str, &str),
        inner: (&str, &str),
        margin: u32,
    ) -> (String, String) {
        let (ow, oh) = outer;
        let (iw, ih) = inner;
        match self {
            Position::TopLeft => (margin.to_string(), margin.to_string()),
            Position::TopRight => (format!("{}-{}-{}", ow, iw, margin), margin.to_string()),
            Position::BottomLeft => (margin.to_string(), format!("{}-{}-{}", oh, ih, margin)),
            Position::BottomRight => (
                format!("{}-{}-{}", ow, iw, margin),
                format!("{}-{}-{}", oh, ih, margin),
            ),
            Position::Center => (format!("({}-{})/2", ow, iw), format!("({}-{})/2", oh, ih)),
        }
    }
}

/// Floor to an even number, minimum 2
pub(crate) fn even(value: u32) -> u32 {
    (value - value % 2).max(2)
}

/// Shortest decimal rendering: `2.0` is "2", `0.5` is "0.5"
pub(crate) fn fmt_num(value: f64) -> String {
    let text = format!("{:.3}", value);
    let text = text.trim_end_matches('0').trim_end_matches('.');
    if text == "-0" {
        "0".to_string()
    } else {
        text.to_string()
    }
}

pub(crate) fn args<const N: usize>(items: [&str; N]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// Check the number of sources an operation needs
pub(crate) fn expect_sources(
    operation: &str,
    sources: &[SourceFile],
    min: usize,
    max: usize,
) -> Result<()> {
    if sources.len() < min || sources.len() > max {
        let expected = if min == max {
            min.to_string()
        } else if max == usize::MAX {
            format!("at least {}", min)
        } else {
            format!("{} to {}", min, max)
        };
        return Err(EngineError::invalid(format!(
            "{} expects {} source file(s), got {}",
            operation,
            expected,
            sources.len()
        )));
    }
    if let Some(empty) = sources.iter().find(|s| s.data.is_empty()) {
        return Err(EngineError::invalid(format!(
            "{}: source {} is empty",
            operation, empty.name
        )));
    }
    Ok(())
}

pub(crate) fn check_range(name: &str, value: f64, min: f64, max: f64) -> Result<()> {
    if !value.is_finite() || value < min || value > max {
        return Err(EngineError::invalid(format!(
            "{} must be between {} and {}, got {}",
            name,
            fmt_num(min),
            fmt_num(max),
            value
        )));
    }
    Ok(())
}

/// Engine file name for a source: `<base>.<source extension or fallback>`
pub(crate) fn input_file(base: &str, source: &SourceFile, fallback_ext: &str) -> InputFile {
    let ext = source
        .extension()
        .unwrap_or_else(|| fallback_ext.to_string());
    InputFile {
        name: format!("{}.{}", base, ext),
        data: source.data.clone(),
    }
}

/// `<stem>_<suffix>.<ext>`
pub(crate) fn display_name(source: &SourceFile, suffix: &str, ext: &str) -> String {
    format!("{}_{}.{}", source.stem(), suffix, ext)
}

pub(crate) fn mime_for(ext: &str) -> &'static str {
    match ext {
        "mp4" | "m4v" => "video/mp4",
        "webm" => "video/webm",
        "mov" => "video/quicktime",
        "mkv" => "video/x-matroska",
        "avi" => "video/x-msvideo",
        "ts" => "video/mp2t",
        "gif" => "image/gif",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "mp3" => "audio/mpeg",
        "aac" => "audio/aac",
        "m4a" => "audio/mp4",
        "wav" => "audio/wav",
        "flac" => "audio/flac",
        "ogg" => "audio/ogg",
        _ => "application/octet-stream",
    }
}

/// Plan with a single step reading `inputs` and producing one required output
pub(crate) fn single_pass(
    operation: &'static str,
    inputs: Vec<InputFile>,
    argv: Vec<String>,
    primary: &SourceFile,
    suffix: &str,
    ext: &str,
) -> JobPlan {
    let output = format!("output.{}", ext);
    let mut argv = argv;
    argv.push(output.clone());
    JobPlan {
        operation,
        steps: vec![PlanStep::new(inputs, argv)],
        intermediates: Vec::new(),
        outputs: vec![OutputSpec {
            name: output,
            mime_type: mime_for(ext).to_string(),
            display_name: display_name(primary, suffix, ext),
            required: true,
        }],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    pub(crate) fn source(name: &str) -> SourceFile {
        SourceFile::new(name, vec![0u8; 16])
    }

    #[test]
    fn test_even_floors_with_minimum() {
        assert_eq!(even(101), 100);
        assert_eq!(even(50), 50);
        assert_eq!(even(1), 2);
        assert_eq!(even(0), 2);
    }

    #[test]
    fn test_fmt_num() {
        assert_eq!(fmt_num(2.0), "2");
        assert_eq!(fmt_num(0.5), "0.5");
        assert_eq!(fmt_num(10.25), "10.25");
        assert_eq!(fmt_num(1.0 / 3.0), "0.333");
        assert_eq!(fmt_num(-0.0), "0");
    }

    #[test]
    fn test_plan_paths_are_deduplicated() {
        let plan =
            build_plan(&Operation::Loop(LoopOptions { count: 3 }), &[source("clip.mp4")]).unwrap();
        let paths = plan.paths();
        let unique: std::collections::HashSet<_> = paths.iter().collect();
        assert_eq!(unique.len(), paths.len());
        assert!(paths.contains(&"input.mp4".to_string()));
        assert!(paths.contains(&"norm_0.ts".to_string()));
        assert!(paths.contains(&"output.mp4".to_string()));
    }

    #[test]
    fn test_operation_from_json() {
        let op: Operation =
            serde_json::from_str(r#"{ "operation": "compress", "quality": "heavy" }"#).unwrap();
        assert_eq!(op, Operation::Compress(CompressOptions { quality: Quality::Heavy }));

        let op: Operation = serde_json::from_str(r#"{ "operation": "remove_audio" }"#).unwrap();
        assert_eq!(op.name(), "remove_audio");

        let op: Operation =
            serde_json::from_str(r#"{ "operation": "speed", "factor": 1.5 }"#).unwrap();
        assert_eq!(op, Operation::Speed(SpeedOptions { factor: 1.5 }));

        assert!(serde_json::from_str::<Operation>(r#"{ "operation": "explode" }"#).is_err());

        // Field spellings used by UI collaborators
        let op: Operation = serde_json::from_str(
            r#"{ "operation": "watermark", "text": "hi", "position": "top-left", "fontSize": 32 }"#,
        )
        .unwrap();
        let Operation::Watermark(options) = op else {
            panic!("expected watermark");
        };
        assert_eq!(options.position, Position::TopLeft);
        assert_eq!(options.font_size, 32);
    }

    #[test]
    fn test_plans_are_deterministic() {
        let op = Operation::Merge(MergeOptions::default());
        let sources = [source("a.mp4"), source("b.mov")];
        let first = build_plan(&op, &sources).unwrap();
        let second = build_plan(&op, &sources).unwrap();
        let argv = |p: &JobPlan| p.steps.iter().map(|s| s.argv.clone()).collect::<Vec<_>>();
        assert_eq!(argv(&first), argv(&second));
        assert_eq!(first.outputs, second.outputs);
    }

    #[test]
    fn test_source_arity_is_checked() {
        let err = build_plan(&Operation::Reverse, &[]).unwrap_err();
        assert_eq!(err.code(), "invalid_params");
        let err = build_plan(&Operation::ReplaceAudio, &[source("a.mp4")]).unwrap_err();
        assert!(err.to_string().contains("replace_audio"));
        let empty = SourceFile::new("a.mp4", Vec::<u8>::new());
        assert!(build_plan(&Operation::Reverse, &[empty]).is_err());
    }
}
