//! Single-pass operations: one primary input, one filter graph, one output

use serde::{Deserialize, Serialize};

use super::{
    args, check_range, even, expect_sources, fmt_num, input_file, single_pass, JobPlan, Position,
};
use crate::error::{EngineError, Result};
use crate::types::SourceFile;

fn h264(crf: u32) -> Vec<String> {
    args([
        "-c:v",
        "libx264",
        "-preset",
        "medium",
        "-crf",
        &crf.to_string(),
        "-pix_fmt",
        "yuv420p",
    ])
}

fn aac() -> Vec<String> {
    args(["-c:a", "aac", "-b:a", "128k"])
}

fn faststart() -> Vec<String> {
    args(["-movflags", "+faststart"])
}

/// `-i input -vf <vf>` re-encoded to H.264/AAC MP4
fn filtered(
    operation: &'static str,
    sources: &[SourceFile],
    vf: &str,
    suffix: &str,
) -> Result<JobPlan> {
    expect_sources(operation, sources, 1, 1)?;
    let input = input_file("input", &sources[0], "mp4");
    let mut argv = args(["-i", &input.name, "-vf", vf]);
    argv.extend(h264(23));
    argv.extend(aac());
    argv.extend(faststart());
    Ok(single_pass(operation, vec![input], argv, &sources[0], suffix, "mp4"))
}

// ============================================================================
// Compress / Convert
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Quality {
    Light,
    #[default]
    Medium,
    Heavy,
}

impl Quality {
    fn crf(self) -> u32 {
        match self {
            Quality::Light => 23,
            Quality::Medium => 28,
            Quality::Heavy => 33,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompressOptions {
    pub quality: Quality,
}

pub(super) fn compress(sources: &[SourceFile], options: &CompressOptions) -> Result<JobPlan> {
    expect_sources("compress", sources, 1, 1)?;
    let input = input_file("input", &sources[0], "mp4");
    let mut argv = args(["-i", &input.name]);
    argv.extend(h264(options.quality.crf()));
    argv.extend(aac());
    argv.extend(faststart());
    Ok(single_pass("compress", vec![input], argv, &sources[0], "compressed", "mp4"))
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoFormat {
    #[default]
    Mp4,
    Webm,
    Mov,
    Mkv,
    Avi,
}

impl VideoFormat {
    fn extension(self) -> &'static str {
        match self {
            VideoFormat::Mp4 => "mp4",
            VideoFormat::Webm => "webm",
            VideoFormat::Mov => "mov",
            VideoFormat::Mkv => "mkv",
            VideoFormat::Avi => "avi",
        }
    }

    fn codec_args(self) -> Vec<String> {
        match self {
            VideoFormat::Webm => args([
                "-c:v", "libvpx-vp9", "-b:v", "0", "-crf", "32", "-c:a", "libopus",
            ]),
            VideoFormat::Avi => args(["-c:v", "mpeg4", "-q:v", "5", "-c:a", "libmp3lame"]),
            VideoFormat::Mp4 | VideoFormat::Mov => {
                let mut codec = h264(23);
                codec.extend(aac());
                codec.extend(faststart());
                codec
            }
            VideoFormat::Mkv => {
                let mut codec = h264(23);
                codec.extend(aac());
                codec
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConvertOptions {
    pub format: VideoFormat,
}

pub(super) fn convert(sources: &[SourceFile], options: &ConvertOptions) -> Result<JobPlan> {
    expect_sources("convert", sources, 1, 1)?;
    let input = input_file("input", &sources[0], "mp4");
    let mut argv = args(["-i", &input.name]);
    argv.extend(options.format.codec_args());
    let ext = options.format.extension();
    Ok(single_pass("convert", vec![input], argv, &sources[0], "converted", ext))
}

// ============================================================================
// Geometry
// ============================================================================

const MAX_DIMENSION: u32 = 7680;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResizeOptions {
    pub width: Option<u32>,
    pub height: Option<u32>,
}

pub(super) fn resize(sources: &[SourceFile], options: &ResizeOptions) -> Result<JobPlan> {
    for value in [options.width, options.height].into_iter().flatten() {
        check_range("resize dimension", value as f64, 2.0, MAX_DIMENSION as f64)?;
    }
    let scale = match (options.width, options.height) {
        (Some(w), Some(h)) => format!("scale={}:{}", even(w), even(h)),
        (Some(w), None) => format!("scale={}:-2", even(w)),
        (None, Some(h)) => format!("scale=-2:{}", even(h)),
        (None, None) => return Err(EngineError::invalid("resize needs a width or a height")),
    };
    filtered("resize", sources, &format!("{},setsar=1", scale), "resized")
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RotateOptions {
    /// Clockwise: 90, 180 or 270
    pub degrees: u32,
}

impl Default for RotateOptions {
    fn default() -> Self {
        Self { degrees: 90 }
    }
}

pub(super) fn rotate(sources: &[SourceFile], options: &RotateOptions) -> Result<JobPlan> {
    let vf = match options.degrees {
        90 => "transpose=1",
        180 => "hflip,vflip",
        270 => "transpose=2",
        other => {
            return Err(EngineError::invalid(format!(
                "rotation must be 90, 180 or 270 degrees, got {}",
                other
            )))
        }
    };
    filtered("rotate", sources, vf, "rotated")
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlipDirection {
    #[default]
    Horizontal,
    Vertical,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlipOptions {
    pub direction: FlipDirection,
}

pub(super) fn flip(sources: &[SourceFile], options: &FlipOptions) -> Result<JobPlan> {
    let vf = match options.direction {
        FlipDirection::Horizontal => "hflip",
        FlipDirection::Vertical => "vflip",
    };
    filtered("flip", sources, vf, "flipped")
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CropOptions {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

pub(super) fn crop(sources: &[SourceFile], options: &CropOptions) -> Result<JobPlan> {
    if options.width < 2 || options.height < 2 {
        return Err(EngineError::invalid("crop area must be at least 2x2"));
    }
    let vf = format!(
        "crop={}:{}:{}:{}",
        even(options.width),
        even(options.height),
        options.x,
        options.y
    );
    filtered("crop", sources, &vf, "cropped")
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum AspectRatio {
    #[default]
    #[serde(rename = "16:9")]
    Widescreen,
    #[serde(rename = "9:16")]
    Portrait,
    #[serde(rename = "1:1")]
    Square,
    #[serde(rename = "4:3")]
    Standard,
    #[serde(rename = "4:5")]
    Social,
}

impl AspectRatio {
    fn frame(self) -> (u32, u32) {
        match self {
            AspectRatio::Widescreen => (1920, 1080),
            AspectRatio::Portrait => (1080, 1920),
            AspectRatio::Square => (1080, 1080),
            AspectRatio::Standard => (1440, 1080),
            AspectRatio::Social => (1080, 1350),
        }
    }

    fn label(self) -> &'static str {
        match self {
            AspectRatio::Widescreen => "16x9",
            AspectRatio::Portrait => "9x16",
            AspectRatio::Square => "1x1",
            AspectRatio::Standard => "4x3",
            AspectRatio::Social => "4x5",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AspectMode {
    /// Fit inside the frame and pad with black bars
    #[default]
    Letterbox,
    /// Cover the frame and crop the overflow
    Fill,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AspectRatioOptions {
    pub ratio: AspectRatio,
    pub mode: AspectMode,
}

pub(super) fn aspect_ratio(
    sources: &[SourceFile],
    options: &AspectRatioOptions,
) -> Result<JobPlan> {
    let (w, h) = options.ratio.frame();
    let vf = match options.mode {
        AspectMode::Letterbox => format!(
            "scale={w}:{h}:force_original_aspect_ratio=decrease,\
             pad={w}:{h}:(ow-iw)/2:(oh-ih)/2:color=black,setsar=1"
        ),
        AspectMode::Fill => format!(
            "scale={w}:{h}:force_original_aspect_ratio=increase,crop={w}:{h},setsar=1"
        ),
    };
    filtered("aspect_ratio", sources, &vf, options.ratio.label())
}

// ============================================================================
// Time
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeedOptions {
    pub factor: f64,
}

impl Default for SpeedOptions {
    fn default() -> Self {
        Self { factor: 2.0 }
    }
}

/// `atempo` only accepts 0.5..=2.0 per instance
fn atempo_chain(factor: f64) -> String {
    let mut remaining = factor;
    let mut parts = Vec::new();
    while remaining > 2.0 {
        parts.push("atempo=2".to_string());
        remaining /= 2.0;
    }
    while remaining < 0.5 {
        parts.push("atempo=0.5".to_string());
        remaining /= 0.5;
    }
    parts.push(format!("atempo={}", fmt_num(remaining)));
    parts.join(",")
}

pub(super) fn speed(sources: &[SourceFile], options: &SpeedOptions) -> Result<JobPlan> {
    expect_sources("speed", sources, 1, 1)?;
    check_range("speed factor", options.factor, 0.25, 4.0)?;
    let input = input_file("input", &sources[0], "mp4");
    let setpts = format!("setpts={}*PTS", fmt_num(1.0 / options.factor));
    let mut argv = args([
        "-i",
        &input.name,
        "-filter:v",
        &setpts,
        "-filter:a",
        &atempo_chain(options.factor),
    ]);
    argv.extend(h264(23));
    argv.extend(aac());
    argv.extend(faststart());
    let suffix = format!("{}x", fmt_num(options.factor));
    Ok(single_pass("speed", vec![input], argv, &sources[0], &suffix, "mp4"))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FadeOptions {
    /// Seconds of fade-in at the start; 0 disables it
    pub fade_in: f64,
    /// Seconds of fade-out at the end; 0 disables it
    pub fade_out: f64,
    /// Source duration in seconds, needed to place the fade-out
    pub duration: Option<f64>,
}

impl Default for FadeOptions {
    fn default() -> Self {
        Self {
            fade_in: 1.0,
            fade_out: 1.0,
            duration: None,
        }
    }
}

pub(super) fn fade(sources: &[SourceFile], options: &FadeOptions) -> Result<JobPlan> {
    expect_sources("fade", sources, 1, 1)?;
    check_range("fade_in", options.fade_in, 0.0, 30.0)?;
    check_range("fade_out", options.fade_out, 0.0, 30.0)?;
    if options.fade_in == 0.0 && options.fade_out == 0.0 {
        return Err(EngineError::invalid("fade needs a fade_in or a fade_out"));
    }

    let mut video = Vec::new();
    let mut audio = Vec::new();
    if options.fade_in > 0.0 {
        let d = fmt_num(options.fade_in);
        video.push(format!("fade=t=in:st=0:d={}", d));
        audio.push(format!("afade=t=in:st=0:d={}", d));
    }
    if options.fade_out > 0.0 {
        let total = match options.duration {
            Some(total) if total.is_finite() && total > 0.0 => total,
            _ => {
                return Err(EngineError::invalid(
                    "fade_out needs the source duration",
                ))
            }
        };
        let start = fmt_num((total - options.fade_out).max(0.0));
        let d = fmt_num(options.fade_out);
        video.push(format!("fade=t=out:st={}:d={}", start, d));
        audio.push(format!("afade=t=out:st={}:d={}", start, d));
    }

    let input = input_file("input", &sources[0], "mp4");
    let mut argv = args([
        "-i",
        &input.name,
        "-filter:v",
        &video.join(","),
        "-filter:a",
        &audio.join(","),
    ]);
    argv.extend(h264(23));
    argv.extend(aac());
    argv.extend(faststart());
    Ok(single_pass("fade", vec![input], argv, &sources[0], "faded", "mp4"))
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrimOptions {
    pub start: f64,
    pub end: f64,
}

pub(super) fn trim(sources: &[SourceFile], options: &TrimOptions) -> Result<JobPlan> {
    expect_sources("trim", sources, 1, 1)?;
    check_range("trim start", options.start, 0.0, f64::MAX)?;
    if !options.end.is_finite() || options.end <= options.start {
        return Err(EngineError::invalid("trim end must be after start"));
    }
    let input = input_file("input", &sources[0], "mp4");
    let mut argv = args([
        "-ss",
        &fmt_num(options.start),
        "-i",
        &input.name,
        "-t",
        &fmt_num(options.end - options.start),
    ]);
    argv.extend(h264(23));
    argv.extend(aac());
    argv.extend(faststart());
    Ok(single_pass("trim", vec![input], argv, &sources[0], "trimmed", "mp4"))
}

pub(super) fn reverse(sources: &[SourceFile]) -> Result<JobPlan> {
    expect_sources("reverse", sources, 1, 1)?;
    let input = input_file("input", &sources[0], "mp4");
    let mut argv = args(["-i", &input.name, "-vf", "reverse", "-af", "areverse"]);
    argv.extend(h264(23));
    argv.extend(aac());
    argv.extend(faststart());
    Ok(single_pass("reverse", vec![input], argv, &sources[0], "reversed", "mp4"))
}

// ============================================================================
// Look
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatermarkOptions {
    pub text: String,
    pub position: Position,
    #[serde(alias = "fontSize")]
    pub font_size: u32,
    pub opacity: f64,
    pub color: String,
}

impl Default for WatermarkOptions {
    fn default() -> Self {
        Self {
            text: String::new(),
            position: Position::BottomRight,
            font_size: 24,
            opacity: 0.8,
            color: "white".to_string(),
        }
    }
}

/// Escape text for a drawtext option inside a filter graph
fn escape_drawtext(text: &str) -> String {
    let mut option = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '\\' | '\'' | ':' | '%') {
            option.push('\\');
        }
        option.push(c);
    }
    let mut graph = String::with_capacity(option.len());
    for c in option.chars() {
        if matches!(c, '\\' | '\'' | '[' | ']' | ',' | ';') {
            graph.push('\\');
        }
        graph.push(c);
    }
    graph
}

pub(super) fn watermark(sources: &[SourceFile], options: &WatermarkOptions) -> Result<JobPlan> {
    if options.text.trim().is_empty() {
        return Err(EngineError::invalid("watermark text cannot be empty"));
    }
    if options.text.chars().count() > 200 {
        return Err(EngineError::invalid("watermark text is limited to 200 characters"));
    }
    check_range("font_size", options.font_size as f64, 8.0, 200.0)?;
    check_range("opacity", options.opacity, 0.0, 1.0)?;
    if options.color.is_empty() || !options.color.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(EngineError::invalid(format!("invalid color: {}", options.color)));
    }

    let (x, y) = options.position.coordinates(("w", "h"), ("tw", "th"), 10);
    let vf = format!(
        "drawtext=text={}:fontsize={}:fontcolor={}@{}:x={}:y={}",
        escape_drawtext(&options.text),
        options.font_size,
        options.color,
        fmt_num(options.opacity),
        x,
        y
    );
    filtered("watermark", sources, &vf, "watermarked")
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterPreset {
    #[default]
    Grayscale,
    Sepia,
    Vintage,
    Vivid,
    Cool,
    Warm,
    Blur,
    Invert,
}

impl FilterPreset {
    fn graph(self) -> &'static str {
        match self {
            FilterPreset::Grayscale => "hue=s=0",
            FilterPreset::Sepia => {
                "colorchannelmixer=.393:.769:.189:0:.349:.686:.168:0:.272:.534:.131"
            }
            FilterPreset::Vintage => "curves=preset=vintage",
            FilterPreset::Vivid => "eq=saturation=1.5:contrast=1.1",
            FilterPreset::Cool => "colorbalance=rs=-0.1:bs=0.3",
            FilterPreset::Warm => "colorbalance=rs=0.3:bs=-0.1",
            FilterPreset::Blur => "boxblur=5:1",
            FilterPreset::Invert => "negate",
        }
    }

    fn name(self) -> &'static str {
        match self {
            FilterPreset::Grayscale => "grayscale",
            FilterPreset::Sepia => "sepia",
            FilterPreset::Vintage => "vintage",
            FilterPreset::Vivid => "vivid",
            FilterPreset::Cool => "cool",
            FilterPreset::Warm => "warm",
            FilterPreset::Blur => "blur",
            FilterPreset::Invert => "invert",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterOptions {
    pub preset: FilterPreset,
}

pub(super) fn filter(sources: &[SourceFile], options: &FilterOptions) -> Result<JobPlan> {
    filtered("filter", sources, options.preset.graph(), options.preset.name())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdjustOptions {
    pub brightness: f64,
    pub contrast: f64,
    pub saturation: f64,
}

impl Default for AdjustOptions {
    fn default() -> Self {
        Self {
            brightness: 0.0,
            contrast: 1.0,
            saturation: 1.0,
        }
    }
}

pub(super) fn adjust(sources: &[SourceFile], options: &AdjustOptions) -> Result<JobPlan> {
    check_range("brightness", options.brightness, -1.0, 1.0)?;
    check_range("contrast", options.contrast, 0.0, 3.0)?;
    check_range("saturation", options.saturation, 0.0, 3.0)?;
    let vf = format!(
        "eq=brightness={}:contrast={}:saturation={}",
        fmt_num(options.brightness),
        fmt_num(options.contrast),
        fmt_num(options.saturation)
    );
    filtered("adjust", sources, &vf, "adjusted")
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SharpenOptions {
    pub amount: f64,
}

impl Default for SharpenOptions {
    fn default() -> Self {
        Self { amount: 1.0 }
    }
}

pub(super) fn sharpen(sources: &[SourceFile], options: &SharpenOptions) -> Result<JobPlan> {
    check_range("sharpen amount", options.amount, 0.1, 5.0)?;
    let vf = format!("unsharp=5:5:{}:5:5:0", fmt_num(options.amount));
    filtered("sharpen", sources, &vf, "sharpened")
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strength {
    Light,
    #[default]
    Medium,
    Strong,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DenoiseOptions {
    pub strength: Strength,
}

pub(super) fn denoise(sources: &[SourceFile], options: &DenoiseOptions) -> Result<JobPlan> {
    let vf = match options.strength {
        Strength::Light => "hqdn3d=2:1.5:3:2.25",
        Strength::Medium => "hqdn3d=4:3:6:4.5",
        Strength::Strong => "hqdn3d=8:6:12:9",
    };
    filtered("denoise", sources, vf, "denoised")
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChromaKeyOptions {
    /// Key color as `#RRGGBB` or `0xRRGGBB`
    #[serde(alias = "keyColor")]
    pub color: String,
    pub similarity: f64,
    pub blend: f64,
}

impl Default for ChromaKeyOptions {
    fn default() -> Self {
        Self {
            color: "0x00FF00".to_string(),
            similarity: 0.1,
            blend: 0.1,
        }
    }
}

fn parse_key_color(color: &str) -> Result<String> {
    let hex = color
        .strip_prefix('#')
        .or_else(|| color.strip_prefix("0x"))
        .or_else(|| color.strip_prefix("0X"))
        .unwrap_or(color);
    if hex.len() != 6 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(EngineError::invalid(format!("invalid key color: {}", color)));
    }
    Ok(format!("0x{}", hex.to_ascii_uppercase()))
}

/// Keys out a color; with a second source the result is composited onto it,
/// otherwise the output keeps an alpha channel (VP9 WebM)
fn is_still_image(name: &str) -> bool {
    let ext = name.rsplit('.').next().unwrap_or_default().to_ascii_lowercase();
    matches!(ext.as_str(), "jpg" | "jpeg" | "png" | "webp" | "bmp")
}

pub(super) fn chroma_key(sources: &[SourceFile], options: &ChromaKeyOptions) -> Result<JobPlan> {
    expect_sources("chroma_key", sources, 1, 2)?;
    check_range("similarity", options.similarity, 0.01, 1.0)?;
    check_range("blend", options.blend, 0.0, 1.0)?;
    let key = format!(
        "chromakey={}:{}:{}",
        parse_key_color(&options.color)?,
        fmt_num(options.similarity),
        fmt_num(options.blend)
    );
    let input = input_file("input", &sources[0], "mp4");

    let Some(background) = sources.get(1) else {
        let mut argv = args(["-i", &input.name, "-vf", &format!("{},format=yuva420p", key)]);
        argv.extend(args([
            "-c:v", "libvpx-vp9", "-b:v", "0", "-crf", "30", "-auto-alt-ref", "0", "-c:a",
            "libopus",
        ]));
        return Ok(single_pass("chroma_key", vec![input], argv, &sources[0], "keyed", "webm"));
    };

    let background = input_file("background", background, "mp4");
    let graph = format!(
        "[1:v][0:v]scale2ref[bg][fg];[fg]{}[keyed];\
         [bg][keyed]overlay=shortest=1,format=yuv420p[v]",
        key
    );
    let mut argv = args(["-i", &input.name]);
    if is_still_image(&background.name) {
        // A looped still lasts as long as the keyed clip
        argv.extend(args(["-loop", "1"]));
    }
    argv.extend(args([
        "-i",
        &background.name,
        "-filter_complex",
        &graph,
        "-map",
        "[v]",
        "-map",
        "0:a:0?",
        "-shortest",
    ]));
    argv.extend(h264(23));
    argv.extend(aac());
    argv.extend(faststart());
    Ok(single_pass(
        "chroma_key",
        vec![input, background],
        argv,
        &sources[0],
        "keyed",
        "mp4",
    ))
}

// ============================================================================
// Audio
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VolumeOptions {
    /// Gain multiplier, 1.0 keeps the level
    pub level: f64,
}

impl Default for VolumeOptions {
    fn default() -> Self {
        Self { level: 1.0 }
    }
}

pub(super) fn volume(sources: &[SourceFile], options: &VolumeOptions) -> Result<JobPlan> {
    expect_sources("volume", sources, 1, 1)?;
    check_range("volume level", options.level, 0.0, 5.0)?;
    let input = input_file("input", &sources[0], "mp4");
    let mut argv = args([
        "-i",
        &input.name,
        "-af",
        &format!("volume={}", fmt_num(options.level)),
        "-c:v",
        "copy",
    ]);
    argv.extend(aac());
    Ok(single_pass("volume", vec![input], argv, &sources[0], "volume", "mp4"))
}

pub(super) fn remove_audio(sources: &[SourceFile]) -> Result<JobPlan> {
    expect_sources("remove_audio", sources, 1, 1)?;
    let input = input_file("input", &sources[0], "mp4");
    let argv = args(["-i", &input.name, "-c:v", "copy", "-an"]);
    Ok(single_pass("remove_audio", vec![input], argv, &sources[0], "muted", "mp4"))
}

/// Second source is the new soundtrack; output stops at the shorter stream
pub(super) fn replace_audio(sources: &[SourceFile]) -> Result<JobPlan> {
    expect_sources("replace_audio", sources, 2, 2)?;
    let input = input_file("input", &sources[0], "mp4");
    let audio = input_file("audio", &sources[1], "mp3");
    let argv = args([
        "-i",
        &input.name,
        "-i",
        &audio.name,
        "-map",
        "0:v:0",
        "-map",
        "1:a:0",
        "-c:v",
        "copy",
        "-c:a",
        "aac",
        "-b:a",
        "192k",
        "-shortest",
    ]);
    Ok(single_pass(
        "replace_audio",
        vec![input, audio],
        argv,
        &sources[0],
        "new_audio",
        "mp4",
    ))
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioFormat {
    #[default]
    Mp3,
    Aac,
    Wav,
    Flac,
    Ogg,
    M4a,
}

impl AudioFormat {
    fn extension(self) -> &'static str {
        match self {
            AudioFormat::Mp3 => "mp3",
            AudioFormat::Aac => "aac",
            AudioFormat::Wav => "wav",
            AudioFormat::Flac => "flac",
            AudioFormat::Ogg => "ogg",
            AudioFormat::M4a => "m4a",
        }
    }

    fn codec_args(self) -> Vec<String> {
        match self {
            AudioFormat::Mp3 => args(["-c:a", "libmp3lame", "-q:a", "2"]),
            AudioFormat::Aac | AudioFormat::M4a => args(["-c:a", "aac", "-b:a", "192k"]),
            AudioFormat::Wav => args(["-c:a", "pcm_s16le"]),
            AudioFormat::Flac => args(["-c:a", "flac"]),
            AudioFormat::Ogg => args(["-c:a", "libvorbis", "-q:a", "5"]),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractAudioOptions {
    pub format: AudioFormat,
}

pub(super) fn extract_audio(
    sources: &[SourceFile],
    options: &ExtractAudioOptions,
) -> Result<JobPlan> {
    expect_sources("extract_audio", sources, 1, 1)?;
    let input = input_file("input", &sources[0], "mp4");
    let mut argv = args(["-i", &input.name, "-vn"]);
    argv.extend(options.format.codec_args());
    let ext = options.format.extension();
    Ok(single_pass("extract_audio", vec![input], argv, &sources[0], "audio", ext))
}

// ============================================================================
// Subtitles / GIF
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BurnSubtitlesOptions {
    pub font_size: Option<u32>,
}

/// Second source is the subtitle track (SRT or ASS)
pub(super) fn burn_subtitles(
    sources: &[SourceFile],
    options: &BurnSubtitlesOptions,
) -> Result<JobPlan> {
    expect_sources("burn_subtitles", sources, 2, 2)?;
    let input = input_file("input", &sources[0], "mp4");
    let subtitles = input_file("subtitles", &sources[1], "srt");
    let mut vf = format!("subtitles={}", subtitles.name);
    if let Some(size) = options.font_size {
        check_range("font_size", size as f64, 8.0, 200.0)?;
        vf.push_str(&format!(":force_style='FontSize={}'", size));
    }
    let mut argv = args(["-i", &input.name, "-vf", &vf]);
    argv.extend(h264(23));
    argv.extend(aac());
    argv.extend(faststart());
    Ok(single_pass(
        "burn_subtitles",
        vec![input, subtitles],
        argv,
        &sources[0],
        "subtitled",
        "mp4",
    ))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToGifOptions {
    pub fps: u32,
    pub width: u32,
    pub start: Option<f64>,
    pub duration: Option<f64>,
}

impl Default for ToGifOptions {
    fn default() -> Self {
        Self {
            fps: 10,
            width: 480,
            start: None,
            duration: None,
        }
    }
}

pub(super) fn to_gif(sources: &[SourceFile], options: &ToGifOptions) -> Result<JobPlan> {
    expect_sources("to_gif", sources, 1, 1)?;
    check_range("fps", options.fps as f64, 1.0, 30.0)?;
    check_range("width", options.width as f64, 16.0, 1920.0)?;
    let input = input_file("input", &sources[0], "mp4");

    let mut argv = Vec::new();
    if let Some(start) = options.start {
        check_range("start", start, 0.0, f64::MAX)?;
        argv.extend(args(["-ss", &fmt_num(start)]));
    }
    argv.extend(args(["-i", &input.name]));
    if let Some(duration) = options.duration {
        check_range("duration", duration, 0.1, 60.0)?;
        argv.extend(args(["-t", &fmt_num(duration)]));
    }
    let vf = format!(
        "fps={},scale={}:-2:flags=lanczos,split[s0][s1];[s0]palettegen[p];[s1][p]paletteuse",
        options.fps,
        even(options.width)
    );
    argv.extend(args(["-vf", &vf, "-loop", "0"]));
    Ok(single_pass("to_gif", vec![input], argv, &sources[0], "animated", "gif"))
}
