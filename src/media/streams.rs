//! Media stream detection
//!
//! This module handles:
//! - Building the ffprobe argument vector for an engine file
//! - Parsing stream information from ffprobe JSON output
//! - Summarizing a probe into [`MediaInfo`]

use serde::Serialize;

use crate::catalog::args;
use crate::error::Result;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StreamType {
    Video,
    Audio,
    Subtitle,
    Attachment,
    Data,
    Unknown,
}

#[derive(Debug, Clone, Serialize)]
pub struct StreamInfo {
    pub index: i32,
    pub stream_type: StreamType,
    pub codec_name: Option<String>,
    pub language: Option<String>,
    pub is_cover_art: bool,
    // Video specific
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub frame_rate: Option<f64>,
    pub pixel_format: Option<String>,
    // Audio specific
    pub sample_rate: Option<u32>,
    pub channels: Option<u32>,
}

/// What a caller needs to know about a source before choosing parameters
#[derive(Debug, Clone, Serialize)]
pub struct MediaInfo {
    pub format_name: Option<String>,
    /// Seconds; 0 when the container does not report it
    pub duration: f64,
    pub bit_rate: Option<u64>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub frame_rate: Option<f64>,
    pub has_video: bool,
    pub has_audio: bool,
    pub streams: Vec<StreamInfo>,
}

/// ffprobe arguments producing JSON for `name`
pub fn probe_argv(name: &str) -> Vec<String> {
    args([
        "-v",
        "quiet",
        "-print_format",
        "json",
        "-show_format",
        "-show_streams",
        name,
    ])
}

/// Parse `30000/1001` or `25` into frames per second
fn parse_frame_rate(value: &str) -> Option<f64> {
    let rate = match value.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.parse().ok()?;
            let den: f64 = den.parse().ok()?;
            if den == 0.0 {
                return None;
            }
            num / den
        }
        None => value.parse().ok()?,
    };
    (rate > 0.0).then_some(rate)
}

/// ffprobe writes most numbers as strings
fn number<T: std::str::FromStr>(value: Option<&serde_json::Value>) -> Option<T> {
    match value? {
        serde_json::Value::String(s) => s.parse().ok(),
        serde_json::Value::Number(n) => n.to_string().parse().ok(),
        _ => None,
    }
}

/// Parse a single stream from ffprobe JSON output
pub fn parse_stream(stream: &serde_json::Value) -> StreamInfo {
    let index = stream.get("index").and_then(|v| v.as_i64()).unwrap_or(-1) as i32;

    let stream_type = match stream
        .get("codec_type")
        .and_then(|v| v.as_str())
        .unwrap_or("unknown")
    {
        "video" => StreamType::Video,
        "audio" => StreamType::Audio,
        "subtitle" => StreamType::Subtitle,
        "attachment" => StreamType::Attachment,
        "data" => StreamType::Data,
        _ => StreamType::Unknown,
    };

    let codec_name = stream
        .get("codec_name")
        .and_then(|v| v.as_str())
        .map(|s| s.to_string());

    // Cover art shows up as a single-frame image "video" stream
    let is_attached_pic = stream
        .get("disposition")
        .and_then(|d| d.get("attached_pic"))
        .and_then(|v| v.as_i64())
        .unwrap_or(0)
        == 1;
    let is_cover_art = stream_type == StreamType::Video
        && (is_attached_pic
            || codec_name
                .as_deref()
                .is_some_and(|c| ["mjpeg", "png", "bmp", "gif", "webp"].contains(&c)));

    StreamInfo {
        index,
        stream_type,
        language: stream
            .get("tags")
            .and_then(|t| t.get("language"))
            .and_then(|v| v.as_str())
            .map(|s| s.to_string()),
        is_cover_art,
        width: stream
            .get("width")
            .and_then(|v| v.as_u64())
            .map(|v| v as u32),
        height: stream
            .get("height")
            .and_then(|v| v.as_u64())
            .map(|v| v as u32),
        frame_rate: stream
            .get("avg_frame_rate")
            .and_then(|v| v.as_str())
            .and_then(parse_frame_rate)
            .or_else(|| {
                stream
                    .get("r_frame_rate")
                    .and_then(|v| v.as_str())
                    .and_then(parse_frame_rate)
            }),
        pixel_format: stream
            .get("pix_fmt")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string()),
        sample_rate: number(stream.get("sample_rate")),
        channels: stream
            .get("channels")
            .and_then(|v| v.as_u64())
            .map(|v| v as u32),
        codec_name,
    }
}

/// Summarize ffprobe JSON output
pub fn parse_media_info(json: &str) -> Result<MediaInfo> {
    let data: serde_json::Value = serde_json::from_str(json)?;
    let format = data.get("format");

    let streams: Vec<StreamInfo> = data
        .get("streams")
        .and_then(|s| s.as_array())
        .map(|arr| arr.iter().map(parse_stream).collect())
        .unwrap_or_default();

    let video = streams
        .iter()
        .find(|s| s.stream_type == StreamType::Video && !s.is_cover_art);
    let has_audio = streams.iter().any(|s| s.stream_type == StreamType::Audio);

    // Fall back to the longest stream when the container has no duration
    let duration = number::<f64>(format.and_then(|f| f.get("duration")))
        .or_else(|| {
            data.get("streams")
                .and_then(|s| s.as_array())
                .and_then(|arr| {
                    arr.iter()
                        .filter_map(|s| number::<f64>(s.get("duration")))
                        .reduce(f64::max)
                })
        })
        .unwrap_or(0.0);

    Ok(MediaInfo {
        format_name: format
            .and_then(|f| f.get("format_name"))
            .and_then(|v| v.as_str())
            .map(|s| s.to_string()),
        duration,
        bit_rate: number(format.and_then(|f| f.get("bit_rate"))),
        width: video.and_then(|v| v.width),
        height: video.and_then(|v| v.height),
        frame_rate: video.and_then(|v| v.frame_rate),
        has_video: video.is_some(),
        has_audio,
        streams,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const PROBE: &str = r#"{
        "streams": [
            {
                "index": 0,
                "codec_name": "h264",
                "codec_type": "video",
                "width": 1920,
                "height": 1080,
                "pix_fmt": "yuv420p",
                "r_frame_rate": "30/1",
                "avg_frame_rate": "30000/1001",
                "duration": "12.345000"
            },
            {
                "index": 1,
                "codec_name": "aac",
                "codec_type": "audio",
                "sample_rate": "48000",
                "channels": 2,
                "tags": { "language": "eng" }
            },
            {
                "index": 2,
                "codec_name": "mjpeg",
                "codec_type": "video",
                "width": 600,
                "height": 600,
                "disposition": { "attached_pic": 1 }
            }
        ],
        "format": {
            "format_name": "mov,mp4,m4a,3gp,3g2,mj2",
            "duration": "12.400000",
            "bit_rate": "5000000"
        }
    }"#;

    #[test]
    fn test_parse_media_info() {
        let info = parse_media_info(PROBE).unwrap();
        assert_eq!(info.duration, 12.4);
        assert_eq!(info.width, Some(1920));
        assert_eq!(info.height, Some(1080));
        assert!((info.frame_rate.unwrap() - 29.97).abs() < 0.01);
        assert!(info.has_video && info.has_audio);
        assert_eq!(info.bit_rate, Some(5_000_000));
        assert_eq!(info.streams.len(), 3);
    }

    #[test]
    fn test_cover_art_is_not_the_video() {
        let info = parse_media_info(PROBE).unwrap();
        assert!(info.streams[2].is_cover_art);
        assert!(!info.streams[0].is_cover_art);
        assert_eq!(info.streams[1].sample_rate, Some(48000));
        assert_eq!(info.streams[1].language.as_deref(), Some("eng"));
    }

    #[test]
    fn test_duration_falls_back_to_streams() {
        let json =
            r#"{ "streams": [ { "codec_type": "audio", "duration": "3.5" } ], "format": {} }"#;
        let info = parse_media_info(json).unwrap();
        assert_eq!(info.duration, 3.5);
        assert!(!info.has_video);
    }

    #[test]
    fn test_frame_rate_parsing() {
        assert_eq!(parse_frame_rate("25"), Some(25.0));
        assert_eq!(parse_frame_rate("0/0"), None);
        assert_eq!(parse_frame_rate("abc"), None);
    }

    #[test]
    fn test_invalid_json() {
        assert_eq!(parse_media_info("not json").unwrap_err().code(), "json_error");
    }
}
