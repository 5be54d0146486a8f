//! Dual-input compositing
//!
//! Streams are mapped explicitly and the output stops at the end of the
//! shorter input.

use serde::{Deserialize, Serialize};

use super::{
    args, check_range, even, expect_sources, fmt_num, input_file, single_pass, JobPlan, Position,
};
use crate::error::Result;
use crate::types::SourceFile;

fn encode() -> Vec<String> {
    args([
        "-c:v",
        "libx264",
        "-preset",
        "veryfast",
        "-crf",
        "23",
        "-pix_fmt",
        "yuv420p",
        "-c:a",
        "aac",
        "-b:a",
        "128k",
        "-movflags",
        "+faststart",
    ])
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PictureInPictureOptions {
    pub position: Position,
    /// Overlay width as a fraction of the main video width
    pub scale: f64,
    pub margin: u32,
}

impl Default for PictureInPictureOptions {
    fn default() -> Self {
        Self {
            position: Position::BottomRight,
            scale: 0.25,
            margin: 10,
        }
    }
}

/// Second source is drawn scaled-down over the first
pub(super) fn picture_in_picture(
    sources: &[SourceFile],
    options: &PictureInPictureOptions,
) -> Result<JobPlan> {
    expect_sources("picture_in_picture", sources, 2, 2)?;
    check_range("scale", options.scale, 0.1, 0.5)?;
    check_range("margin", options.margin as f64, 0.0, 200.0)?;

    let main = input_file("main", &sources[0], "mp4");
    let overlay = input_file("overlay", &sources[1], "mp4");
    let (x, y) = options
        .position
        .coordinates(("W", "H"), ("w", "h"), options.margin);
    let graph = format!(
        "[1:v][0:v]scale2ref=w=trunc(rw*{s}/2)*2:h=trunc(ow/dar/2)*2[pip][base];\
         [base][pip]overlay=x={x}:y={y}:shortest=1[v]",
        s = fmt_num(options.scale),
    );
    let mut argv = args([
        "-i",
        &main.name,
        "-i",
        &overlay.name,
        "-filter_complex",
        &graph,
        "-map",
        "[v]",
        "-map",
        "0:a:0?",
        "-shortest",
    ]);
    argv.extend(encode());
    Ok(single_pass(
        "picture_in_picture",
        vec![main, overlay],
        argv,
        &sources[0],
        "pip",
        "mp4",
    ))
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SplitLayout {
    /// Side by side
    #[default]
    Horizontal,
    /// Stacked top and bottom
    Vertical,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SplitScreenOptions {
    pub layout: SplitLayout,
    /// Shared height (horizontal) or width (vertical) of both panes
    pub size: u32,
}

impl Default for SplitScreenOptions {
    fn default() -> Self {
        Self {
            layout: SplitLayout::Horizontal,
            size: 720,
        }
    }
}

/// Both sources shown at once; audio comes from the first
pub(super) fn split_screen(
    sources: &[SourceFile],
    options: &SplitScreenOptions,
) -> Result<JobPlan> {
    expect_sources("split_screen", sources, 2, 2)?;
    check_range("size", options.size as f64, 16.0, 3840.0)?;

    let size = even(options.size);
    let first = input_file("left", &sources[0], "mp4");
    let second = input_file("right", &sources[1], "mp4");
    let (scale, stack) = match options.layout {
        SplitLayout::Horizontal => (format!("scale=-2:{}", size), "hstack"),
        SplitLayout::Vertical => (format!("scale={}:-2", size), "vstack"),
    };
    let graph = format!(
        "[0:v]{scale},setsar=1[a];[1:v]{scale},setsar=1[b];[a][b]{stack}=inputs=2:shortest=1[v]"
    );
    let mut argv = args([
        "-i",
        &first.name,
        "-i",
        &second.name,
        "-filter_complex",
        &graph,
        "-map",
        "[v]",
        "-map",
        "0:a:0?",
        "-shortest",
    ]);
    argv.extend(encode());
    Ok(single_pass(
        "split_screen",
        vec![first, second],
        argv,
        &sources[0],
        "split_screen",
        "mp4",
    ))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackgroundMusicOptions {
    pub music_volume: f64,
    pub original_volume: f64,
    /// Mix with the original soundtrack instead of replacing it
    pub keep_original: bool,
}

impl Default for BackgroundMusicOptions {
    fn default() -> Self {
        Self {
            music_volume: 0.3,
            original_volume: 1.0,
            keep_original: true,
        }
    }
}

/// Second source is a music track laid under the video
pub(super) fn background_music(
    sources: &[SourceFile],
    options: &BackgroundMusicOptions,
) -> Result<JobPlan> {
    expect_sources("background_music", sources, 2, 2)?;
    check_range("music_volume", options.music_volume, 0.0, 2.0)?;
    check_range("original_volume", options.original_volume, 0.0, 2.0)?;

    let video = input_file("input", &sources[0], "mp4");
    let music = input_file("music", &sources[1], "mp3");
    let graph = if options.keep_original {
        format!(
            "[0:a]volume={}[a0];[1:a]volume={}[a1];\
             [a0][a1]amix=inputs=2:duration=shortest:dropout_transition=0[a]",
            fmt_num(options.original_volume),
            fmt_num(options.music_volume)
        )
    } else {
        format!("[1:a]volume={}[a]", fmt_num(options.music_volume))
    };
    let argv = args([
        "-i",
        &video.name,
        "-i",
        &music.name,
        "-filter_complex",
        &graph,
        "-map",
        "0:v:0",
        "-map",
        "[a]",
        "-c:v",
        "copy",
        "-c:a",
        "aac",
        "-b:a",
        "192k",
        "-shortest",
    ]);
    Ok(single_pass(
        "background_music",
        vec![video, music],
        argv,
        &sources[0],
        "music",
        "mp4",
    ))
}

#[cfg(test)]
mod tests {
    use super::super::tests::source;
    use super::*;

    fn graph(plan: &JobPlan) -> &str {
        let argv = &plan.steps[0].argv;
        let at = argv.iter().position(|a| a == "-filter_complex").unwrap();
        &argv[at + 1]
    }

    #[test]
    fn test_pip_overlay_stops_at_shorter_input() {
        let plan = picture_in_picture(
            &[source("main.mp4"), source("cam.webm")],
            &PictureInPictureOptions::default(),
        )
        .unwrap();
        let graph = graph(&plan);
        assert!(graph.contains("rw*0.25"));
        assert!(graph.contains("overlay=x=W-w-10:y=H-h-10:shortest=1"));
        assert!(plan.steps[0].argv.contains(&"-shortest".to_string()));
        assert_eq!(plan.steps[0].inputs[1].name, "overlay.webm");
        assert_eq!(plan.outputs[0].display_name, "main_pip.mp4");
    }

    #[test]
    fn test_pip_rejects_large_overlay() {
        let options = PictureInPictureOptions {
            scale: 0.9,
            ..PictureInPictureOptions::default()
        };
        assert!(picture_in_picture(&[source("a.mp4"), source("b.mp4")], &options).is_err());
    }

    #[test]
    fn test_split_screen_layouts() {
        let sources = [source("a.mp4"), source("b.mp4")];
        let plan = split_screen(&sources, &SplitScreenOptions::default()).unwrap();
        assert_eq!(
            graph(&plan),
            "[0:v]scale=-2:720,setsar=1[a];[1:v]scale=-2:720,setsar=1[b];[a][b]hstack=inputs=2:shortest=1[v]"
        );

        let options = SplitScreenOptions {
            layout: SplitLayout::Vertical,
            size: 641,
        };
        let plan = split_screen(&sources, &options).unwrap();
        assert!(graph(&plan).contains("scale=640:-2"));
        assert!(graph(&plan).contains("vstack"));
    }

    #[test]
    fn test_background_music_mix() {
        let sources = [source("trip.mp4"), source("song.mp3")];
        let plan = background_music(&sources, &BackgroundMusicOptions::default()).unwrap();
        assert!(graph(&plan).contains("amix=inputs=2:duration=shortest"));
        assert!(plan.steps[0].argv.contains(&"-shortest".to_string()));

        let replace = BackgroundMusicOptions {
            keep_original: false,
            ..BackgroundMusicOptions::default()
        };
        let plan = background_music(&sources, &replace).unwrap();
        assert_eq!(graph(&plan), "[1:a]volume=0.3[a]");
    }
}
