//! Multi-output operations: one input, one execution per produced file

use serde::{Deserialize, Serialize};

use super::{
    args, check_range, display_name, expect_sources, fmt_num, input_file, mime_for, JobPlan,
    OutputSpec, PlanStep,
};
use crate::error::{EngineError, Result};
use crate::types::SourceFile;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    #[default]
    Png,
    Jpg,
}

impl ImageFormat {
    fn extension(self) -> &'static str {
        match self {
            ImageFormat::Png => "png",
            ImageFormat::Jpg => "jpg",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractFramesOptions {
    /// Timestamp of the first frame in seconds
    pub start: f64,
    /// Seconds between frames
    pub interval: f64,
    pub count: u32,
    pub format: ImageFormat,
}

impl Default for ExtractFramesOptions {
    fn default() -> Self {
        Self {
            start: 0.0,
            interval: 1.0,
            count: 10,
            format: ImageFormat::Png,
        }
    }
}

/// Grab `count` stills at `start + i * interval`
///
/// Timestamps past the end of the source make their step fail or produce
/// nothing; those frames are left out of the result.
pub(super) fn extract_frames(
    sources: &[SourceFile],
    options: &ExtractFramesOptions,
) -> Result<JobPlan> {
    expect_sources("extract_frames", sources, 1, 1)?;
    check_range("start", options.start, 0.0, f64::MAX)?;
    check_range("interval", options.interval, 0.01, 3600.0)?;
    check_range("count", options.count as f64, 1.0, 100.0)?;

    let ext = options.format.extension();
    let input = input_file("input", &sources[0], "mp4");
    let input_name = input.name.clone();
    let mut input = Some(input);

    let mut steps = Vec::with_capacity(options.count as usize);
    let mut outputs = Vec::with_capacity(options.count as usize);
    for i in 0..options.count {
        let timestamp = options.start + i as f64 * options.interval;
        let name = format!("frame_{:03}.{}", i + 1, ext);
        let mut argv = args([
            "-ss",
            &fmt_num(timestamp),
            "-i",
            &input_name,
            "-frames:v",
            "1",
        ]);
        if options.format == ImageFormat::Jpg {
            argv.extend(args(["-q:v", "2"]));
        }
        argv.push(name.clone());

        // The source is written once, by the first step
        let inputs = input.take().into_iter().collect();
        steps.push(PlanStep {
            inputs,
            argv,
            tolerate_failure: true,
        });
        outputs.push(OutputSpec {
            display_name: display_name(&sources[0], &format!("frame_{:03}", i + 1), ext),
            name,
            mime_type: mime_for(ext).to_string(),
            required: false,
        });
    }

    Ok(JobPlan {
        operation: "extract_frames",
        steps,
        intermediates: Vec::new(),
        outputs,
    })
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SplitVideoOptions {
    /// Cut points in seconds, strictly increasing
    pub points: Vec<f64>,
}

/// Cut the source at each point into consecutive parts (stream copy)
pub(super) fn split_video(sources: &[SourceFile], options: &SplitVideoOptions) -> Result<JobPlan> {
    expect_sources("split_video", sources, 1, 1)?;
    if options.points.is_empty() || options.points.len() > 50 {
        return Err(EngineError::invalid("split_video needs between 1 and 50 cut points"));
    }
    let mut previous = 0.0;
    for &point in &options.points {
        if !point.is_finite() || point <= previous {
            return Err(EngineError::invalid(
                "cut points must be positive and strictly increasing",
            ));
        }
        previous = point;
    }

    let input = input_file("input", &sources[0], "mp4");
    let input_name = input.name.clone();
    let mut input = Some(input);

    let mut bounds = vec![0.0];
    bounds.extend(options.points.iter().copied());
    let mut steps = Vec::with_capacity(bounds.len());
    let mut outputs = Vec::with_capacity(bounds.len());
    for (i, start) in bounds.iter().enumerate() {
        let name = format!("part_{}.mp4", i + 1);
        let mut argv = args(["-ss", &fmt_num(*start), "-i", &input_name]);
        if let Some(end) = bounds.get(i + 1) {
            argv.extend(args(["-t", &fmt_num(end - start)]));
        }
        argv.extend(args([
            "-map",
            "0",
            "-c",
            "copy",
            "-avoid_negative_ts",
            "make_zero",
            &name,
        ]));
        steps.push(PlanStep {
            inputs: input.take().into_iter().collect(),
            argv,
            tolerate_failure: false,
        });
        outputs.push(OutputSpec {
            display_name: display_name(&sources[0], &format!("part_{}", i + 1), "mp4"),
            name,
            mime_type: mime_for("mp4").to_string(),
            required: true,
        });
    }

    Ok(JobPlan {
        operation: "split_video",
        steps,
        intermediates: Vec::new(),
        outputs,
    })
}

#[cfg(test)]
mod tests {
    use super::super::tests::source;
    use super::*;

    #[test]
    fn test_frames_every_half_second() {
        let options = ExtractFramesOptions {
            start: 10.0,
            interval: 0.5,
            count: 4,
            format: ImageFormat::Png,
        };
        let plan = extract_frames(&[source("clip.mp4")], &options).unwrap();

        let timestamps: Vec<&str> = plan.steps.iter().map(|s| s.argv[1].as_str()).collect();
        assert_eq!(timestamps, vec!["10", "10.5", "11", "11.5"]);
        assert!(plan.steps.iter().all(|s| s.tolerate_failure));
        assert!(plan.outputs.iter().all(|o| !o.required));

        assert_eq!(plan.steps[0].inputs.len(), 1);
        assert!(plan.steps[1..].iter().all(|s| s.inputs.is_empty()));
        assert_eq!(plan.outputs[3].name, "frame_004.png");
        assert_eq!(plan.outputs[3].display_name, "clip_frame_004.png");
    }

    #[test]
    fn test_frames_reject_bad_interval() {
        let options = ExtractFramesOptions {
            interval: 0.0,
            ..ExtractFramesOptions::default()
        };
        assert!(extract_frames(&[source("clip.mp4")], &options).is_err());
    }

    #[test]
    fn test_split_video_parts() {
        let options = SplitVideoOptions {
            points: vec![5.0, 12.5],
        };
        let plan = split_video(&[source("talk.mov")], &options).unwrap();
        assert_eq!(plan.steps.len(), 3);
        assert_eq!(&plan.steps[1].argv[..6], &["-ss", "5", "-i", "input.mov", "-t", "7.5"]);
        assert!(!plan.steps[2].argv.contains(&"-t".to_string()));
        assert_eq!(plan.outputs[2].display_name, "talk_part_3.mp4");
    }

    #[test]
    fn test_split_video_rejects_unordered_points() {
        let options = SplitVideoOptions {
            points: vec![5.0, 3.0],
        };
        assert!(split_video(&[source("talk.mov")], &options).is_err());
        assert!(split_video(&[source("talk.mov")], &SplitVideoOptions::default()).is_err());
    }
}
