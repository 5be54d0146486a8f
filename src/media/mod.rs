//! Media handling module
//!
//! This module handles:
//! - Stream detection and parsing of ffprobe output
//! - Probe result caching for repeated queries on the same bytes

mod probe_cache;
mod streams;

pub use probe_cache::ProbeCache;
pub use streams::{parse_media_info, parse_stream, probe_argv, MediaInfo, StreamInfo, StreamType};
