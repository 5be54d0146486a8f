//! Concatenation operations
//!
//! Each unit (clip, image, reversed copy) is first normalized into an MPEG-TS
//! intermediate with identical H.264/AAC parameters, then the intermediates
//! are joined by the concat demuxer with stream copy.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::{
    args, check_range, display_name, expect_sources, fmt_num, input_file, mime_for, InputFile,
    JobPlan, OutputSpec, PlanStep,
};
use crate::error::{EngineError, Result};
use crate::types::SourceFile;

const MAX_CLIPS: usize = 50;
const CONCAT_LIST: &str = "concat.txt";
/// Matches the sample rate and layout of every encoded intermediate
const SILENCE: &str = "anullsrc=r=44100:cl=stereo";

fn intermediate(index: usize) -> String {
    format!("norm_{}.ts", index)
}

/// Scale filter for a normalized unit: letterboxed into a fixed frame, or the
/// source size rounded down to even
fn frame_filter(frame: Option<(u32, u32)>) -> String {
    let scale = match frame {
        Some((w, h)) => format!(
            "scale={w}:{h}:force_original_aspect_ratio=decrease,\
             pad={w}:{h}:(ow-iw)/2:(oh-ih)/2:color=black"
        ),
        None => "scale=trunc(iw/2)*2:trunc(ih/2)*2".to_string(),
    };
    format!("{},setsar=1,fps=30,format=yuv420p", scale)
}

/// Encoder arguments shared by every intermediate
fn ts_encode(with_audio: bool, output: &str) -> Vec<String> {
    let mut argv = args(["-c:v", "libx264", "-preset", "veryfast", "-crf", "23"]);
    if with_audio {
        argv.extend(args(["-c:a", "aac", "-ar", "44100", "-ac", "2", "-b:a", "128k"]));
    } else {
        argv.push("-an".to_string());
    }
    argv.extend(args(["-f", "mpegts", output]));
    argv
}

/// Audio track of one normalized unit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum UnitAudio {
    /// First audio stream of the source
    Source,
    /// Generated silence, so the unit still carries an audio stream
    Silence,
    /// No audio stream at all
    Dropped,
}

fn normalize_step(
    input: InputFile,
    frame: Option<(u32, u32)>,
    audio: UnitAudio,
    output: &str,
) -> PlanStep {
    let mut argv = args(["-i", &input.name]);
    if audio == UnitAudio::Silence {
        argv.extend(args(["-f", "lavfi", "-i", SILENCE]));
    }
    argv.extend(args(["-vf", &frame_filter(frame), "-map", "0:v:0"]));
    match audio {
        UnitAudio::Source => argv.extend(args(["-map", "0:a:0?"])),
        UnitAudio::Silence => argv.extend(args(["-map", "1:a:0", "-shortest"])),
        UnitAudio::Dropped => {}
    }
    argv.extend(ts_encode(audio != UnitAudio::Dropped, output));
    PlanStep::new(vec![input], argv)
}

/// Concat-demux `units` (in order) into the final MP4
fn concat_step(units: &[String], with_audio: bool) -> PlanStep {
    let list: String = units
        .iter()
        .map(|name| format!("file '{}'\n", name))
        .collect();
    let list_file = InputFile {
        name: CONCAT_LIST.to_string(),
        data: Arc::from(list.into_bytes()),
    };
    let mut argv = args(["-f", "concat", "-safe", "0", "-i", CONCAT_LIST, "-c", "copy"]);
    if with_audio {
        argv.extend(args(["-bsf:a", "aac_adtstoasc"]));
    }
    argv.extend(args(["-movflags", "+faststart", "output.mp4"]));
    PlanStep::new(vec![list_file], argv)
}

fn concat_plan(
    operation: &'static str,
    mut steps: Vec<PlanStep>,
    intermediates: Vec<String>,
    units: &[String],
    with_audio: bool,
    primary: &SourceFile,
    suffix: &str,
) -> JobPlan {
    steps.push(concat_step(units, with_audio));
    JobPlan {
        operation,
        steps,
        intermediates,
        outputs: vec![OutputSpec {
            name: "output.mp4".to_string(),
            mime_type: mime_for("mp4").to_string(),
            display_name: display_name(primary, suffix, "mp4"),
            required: true,
        }],
    }
}

fn check_frame(width: u32, height: u32) -> Result<(u32, u32)> {
    check_range("width", width as f64, 16.0, 3840.0)?;
    check_range("height", height as f64, 16.0, 3840.0)?;
    Ok((super::even(width), super::even(height)))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MergeOptions {
    /// Output frame every clip is letterboxed into
    pub width: u32,
    pub height: u32,
    /// Whether each source has an audio stream, in source order. Empty means
    /// every source does. Silent sources get a generated silent track so all
    /// clips keep their audio in sync after concatenation.
    #[serde(alias = "hasAudio")]
    pub has_audio: Vec<bool>,
}

impl Default for MergeOptions {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            has_audio: Vec::new(),
        }
    }
}

/// Join all sources in order
pub(super) fn merge(sources: &[SourceFile], options: &MergeOptions) -> Result<JobPlan> {
    expect_sources("merge", sources, 2, MAX_CLIPS)?;
    let frame = check_frame(options.width, options.height)?;
    if !options.has_audio.is_empty() && options.has_audio.len() != sources.len() {
        return Err(EngineError::invalid(format!(
            "has_audio lists {} clip(s) but {} were given",
            options.has_audio.len(),
            sources.len()
        )));
    }
    let audible = |i: usize| options.has_audio.get(i).copied().unwrap_or(true);
    let with_audio = (0..sources.len()).any(audible);

    let mut steps = Vec::with_capacity(sources.len() + 1);
    let mut units = Vec::with_capacity(sources.len());
    for (i, source) in sources.iter().enumerate() {
        let unit = intermediate(i);
        let input = input_file(&format!("clip_{}", i), source, "mp4");
        let audio = match (with_audio, audible(i)) {
            (false, _) => UnitAudio::Dropped,
            (true, true) => UnitAudio::Source,
            (true, false) => UnitAudio::Silence,
        };
        steps.push(normalize_step(input, Some(frame), audio, &unit));
        units.push(unit);
    }
    Ok(concat_plan(
        "merge",
        steps,
        units.clone(),
        &units,
        with_audio,
        &sources[0],
        "merged",
    ))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoopOptions {
    /// Total number of plays
    pub count: u32,
}

impl Default for LoopOptions {
    fn default() -> Self {
        Self { count: 3 }
    }
}

/// Repeat one clip `count` times
pub(super) fn loop_clip(sources: &[SourceFile], options: &LoopOptions) -> Result<JobPlan> {
    expect_sources("loop", sources, 1, 1)?;
    check_range("loop count", options.count as f64, 2.0, 20.0)?;

    let unit = intermediate(0);
    let input = input_file("input", &sources[0], "mp4");
    let steps = vec![normalize_step(input, None, UnitAudio::Source, &unit)];
    let units = vec![unit.clone(); options.count as usize];
    Ok(concat_plan(
        "loop",
        steps,
        vec![unit],
        &units,
        true,
        &sources[0],
        "loop",
    ))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoomerangOptions {
    /// Forward-then-backward cycles
    pub cycles: u32,
}

impl Default for BoomerangOptions {
    fn default() -> Self {
        Self { cycles: 1 }
    }
}

/// Play forward then reversed; audio is dropped
pub(super) fn boomerang(sources: &[SourceFile], options: &BoomerangOptions) -> Result<JobPlan> {
    expect_sources("boomerang", sources, 1, 1)?;
    check_range("boomerang cycles", options.cycles as f64, 1.0, 10.0)?;

    let forward = intermediate(0);
    let backward = intermediate(1);
    let input = input_file("input", &sources[0], "mp4");

    let mut reverse = args(["-i", &forward, "-vf", "reverse"]);
    reverse.extend(ts_encode(false, &backward));

    let steps = vec![
        normalize_step(input, None, UnitAudio::Dropped, &forward),
        PlanStep::new(Vec::new(), reverse),
    ];
    let units: Vec<String> = (0..options.cycles)
        .flat_map(|_| [forward.clone(), backward.clone()])
        .collect();
    Ok(concat_plan(
        "boomerang",
        steps,
        vec![forward, backward],
        &units,
        false,
        &sources[0],
        "boomerang",
    ))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimelapseOptions {
    /// How long each image stays on screen
    pub seconds_per_image: f64,
    pub width: u32,
    pub height: u32,
}

impl Default for TimelapseOptions {
    fn default() -> Self {
        Self {
            seconds_per_image: 0.5,
            width: 1280,
            height: 720,
        }
    }
}

/// Turn a sequence of still images into a silent clip
pub(super) fn timelapse(sources: &[SourceFile], options: &TimelapseOptions) -> Result<JobPlan> {
    expect_sources("timelapse", sources, 1, 500)?;
    check_range("seconds_per_image", options.seconds_per_image, 0.04, 10.0)?;
    let frame = check_frame(options.width, options.height)?;
    let hold = fmt_num(options.seconds_per_image);

    let mut steps = Vec::with_capacity(sources.len() + 1);
    let mut units = Vec::with_capacity(sources.len());
    for (i, source) in sources.iter().enumerate() {
        let unit = intermediate(i);
        let input = input_file(&format!("image_{}", i), source, "png");
        let mut argv = args(["-loop", "1", "-t", &hold, "-i", &input.name]);
        argv.extend(args(["-vf", &frame_filter(Some(frame))]));
        argv.extend(ts_encode(false, &unit));
        steps.push(PlanStep::new(vec![input], argv));
        units.push(unit);
    }
    Ok(concat_plan(
        "timelapse",
        steps,
        units.clone(),
        &units,
        false,
        &sources[0],
        "timelapse",
    ))
}

#[cfg(test)]
mod tests {
    use super::super::tests::source;
    use super::*;

    fn concat_list(plan: &JobPlan) -> String {
        let last = plan.steps.last().unwrap();
        assert_eq!(last.inputs[0].name, CONCAT_LIST);
        String::from_utf8(last.inputs[0].data.to_vec()).unwrap()
    }

    #[test]
    fn test_merge_three_clips() {
        let sources = [source("a.mp4"), source("b.mov"), source("c.mkv")];
        let plan = merge(&sources, &MergeOptions::default()).unwrap();

        assert_eq!(plan.steps.len(), 4);
        for (i, step) in plan.steps[..3].iter().enumerate() {
            assert_eq!(step.argv.last(), Some(&intermediate(i)));
            assert!(step.argv.contains(&"mpegts".to_string()));
        }
        assert_eq!(plan.steps[1].inputs[0].name, "clip_1.mov");

        let concat = &plan.steps[3].argv;
        assert!(concat.windows(2).any(|w| w[0] == "-c" && w[1] == "copy"));
        assert!(concat.contains(&"aac_adtstoasc".to_string()));
        assert_eq!(
            concat_list(&plan),
            "file 'norm_0.ts'\nfile 'norm_1.ts'\nfile 'norm_2.ts'\n"
        );
        assert_eq!(plan.intermediates, vec!["norm_0.ts", "norm_1.ts", "norm_2.ts"]);
        assert_eq!(plan.outputs[0].display_name, "a_merged.mp4");
    }

    #[test]
    fn test_merge_gives_silent_clips_generated_audio() {
        let sources = [source("talk.mp4"), source("drone.mp4"), source("outro.mp4")];
        let options = MergeOptions {
            has_audio: vec![true, false, true],
            ..MergeOptions::default()
        };
        let plan = merge(&sources, &options).unwrap();

        let silent = &plan.steps[1].argv;
        assert_eq!(&silent[..6], &["-i", "clip_1.mp4", "-f", "lavfi", "-i", SILENCE]);
        assert!(silent.windows(2).any(|w| w[0] == "-map" && w[1] == "1:a:0"));
        assert!(silent.contains(&"-shortest".to_string()));
        assert!(silent.windows(2).any(|w| w[0] == "-c:a" && w[1] == "aac"));

        // Every unit carries the same audio layout
        for step in &plan.steps[..3] {
            assert!(step.argv.windows(2).any(|w| w[0] == "-ac" && w[1] == "2"));
            assert!(!step.argv.contains(&"-an".to_string()));
        }
        assert!(!plan.steps[0].argv.contains(&"lavfi".to_string()));
        assert!(plan.steps[3].argv.contains(&"aac_adtstoasc".to_string()));
    }

    #[test]
    fn test_merge_all_silent_drops_audio() {
        let options = MergeOptions {
            has_audio: vec![false, false],
            ..MergeOptions::default()
        };
        let plan = merge(&[source("a.mp4"), source("b.mp4")], &options).unwrap();
        for step in &plan.steps[..2] {
            assert!(step.argv.contains(&"-an".to_string()));
            assert!(!step.argv.contains(&"lavfi".to_string()));
        }
        assert!(!plan.steps[2].argv.contains(&"aac_adtstoasc".to_string()));
    }

    #[test]
    fn test_merge_rejects_mismatched_audio_flags() {
        let options = MergeOptions {
            has_audio: vec![true],
            ..MergeOptions::default()
        };
        let err = merge(&[source("a.mp4"), source("b.mp4")], &options).unwrap_err();
        assert_eq!(err.code(), "invalid_params");
    }

    #[test]
    fn test_merge_needs_two_clips() {
        assert!(merge(&[source("a.mp4")], &MergeOptions::default()).is_err());
    }

    #[test]
    fn test_loop_repeats_one_intermediate() {
        let plan = loop_clip(&[source("clip.mp4")], &LoopOptions { count: 3 }).unwrap();
        assert_eq!(plan.steps.len(), 2);
        assert_eq!(concat_list(&plan), "file 'norm_0.ts'\n".repeat(3));
        assert!(loop_clip(&[source("clip.mp4")], &LoopOptions { count: 1 }).is_err());
    }

    #[test]
    fn test_boomerang_reverses_forward_unit() {
        let plan = boomerang(&[source("jump.mp4")], &BoomerangOptions { cycles: 2 }).unwrap();
        assert_eq!(plan.steps.len(), 3);
        let reverse = &plan.steps[1];
        assert!(reverse.inputs.is_empty());
        assert_eq!(&reverse.argv[..4], &["-i", "norm_0.ts", "-vf", "reverse"]);
        assert_eq!(
            concat_list(&plan),
            "file 'norm_0.ts'\nfile 'norm_1.ts'\nfile 'norm_0.ts'\nfile 'norm_1.ts'\n"
        );
        assert!(!plan.steps[2].argv.contains(&"aac_adtstoasc".to_string()));
    }

    #[test]
    fn test_timelapse_holds_each_image() {
        let sources = [source("001.jpg"), source("002.jpg")];
        let plan = timelapse(&sources, &TimelapseOptions::default()).unwrap();
        assert_eq!(plan.steps.len(), 3);
        assert_eq!(
            &plan.steps[0].argv[..6],
            &["-loop", "1", "-t", "0.5", "-i", "image_0.jpg"]
        );
        assert!(plan.steps[0].argv.contains(&"-an".to_string()));
        assert_eq!(plan.outputs[0].display_name, "001_timelapse.mp4");
    }
}
