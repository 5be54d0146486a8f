//! Command surface
//!
//! One entry point per operation, all with the same shape:
//! `(engine, sources, options, on_progress)`. Each builds the matching
//! [`Operation`] and submits it to the [`MediaEngine`]. Commands are
//! organized by domain:
//! - Video operations (encode, geometry, timing, look)
//! - Audio operations (volume, replace, extract, background music)
//! - Composition operations (merge, loop, overlays, frames, splitting)

mod audio;
mod compose;
mod video;

pub use audio::*;
pub use compose::*;
pub use video::*;

use crate::catalog::Operation;
use crate::error::Result;
use crate::jobs::ProgressCallback;
use crate::service::MediaEngine;
use crate::types::{MediaResult, SourceFile};

async fn run_one(
    engine: &MediaEngine,
    sources: &[SourceFile],
    operation: Operation,
    on_progress: Option<&ProgressCallback<'_>>,
) -> Result<MediaResult> {
    engine.submit_one(sources, &operation, on_progress).await
}

async fn run_many(
    engine: &MediaEngine,
    sources: &[SourceFile],
    operation: Operation,
    on_progress: Option<&ProgressCallback<'_>>,
) -> Result<Vec<MediaResult>> {
    engine.submit(sources, &operation, on_progress).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{CropOptions, MergeOptions, SpeedOptions, SplitVideoOptions};
    use crate::engine::MemoryEngine;
    use crate::service::tests::service;

    fn clip(name: &str) -> SourceFile {
        SourceFile::new(name, b"clip".to_vec())
    }

    #[tokio::test]
    async fn test_single_output_commands() {
        let (media, factory, _dir) = service(MemoryEngine::new());
        let source = [clip("beach.mp4")];

        let cropped = crop(
            &media,
            &source,
            CropOptions {
                x: 0,
                y: 0,
                width: 101,
                height: 51,
            },
            None,
        )
        .await
        .unwrap();
        assert_eq!(cropped.mime_type, "video/mp4");

        let fast = speed(&media, &source, SpeedOptions { factor: 2.0 }, None)
            .await
            .unwrap();
        assert!(fast.display_name.starts_with("beach_"));

        let history = factory.engine.history();
        assert!(history[0].argv.iter().any(|a| a.contains("crop=100:50:0:0")));
        assert!(history[1].argv.iter().any(|a| a.contains("setpts=0.5*PTS")));
    }

    #[tokio::test]
    async fn test_merge_runs_every_step() {
        let (media, factory, _dir) = service(MemoryEngine::new());
        let sources = [clip("a.mp4"), clip("b.mp4"), clip("c.mp4")];
        let merged = merge(&media, &sources, MergeOptions::default(), None)
            .await
            .unwrap();
        assert_eq!(merged.mime_type, "video/mp4");
        assert_eq!(factory.engine.history().len(), 4);
        assert!(factory.engine.file_names().is_empty());
    }

    #[tokio::test]
    async fn test_merge_fills_audio_flags_from_media_info() {
        let engine = MemoryEngine::new().with_probe_output(
            r#"{ "streams": [ { "codec_type": "video" }, { "codec_type": "audio" } ] }"#,
        );
        let (media, factory, _dir) = service(engine);
        let sources = [clip("a.mp4"), clip("b.mp4")];
        merge(&media, &sources, MergeOptions::default(), None)
            .await
            .unwrap();
        let history = factory.engine.history();
        assert!(history[0].argv.contains(&"0:a:0?".to_string()));

        // Flags given by the caller skip the lookup and drive the plan
        let options = MergeOptions {
            has_audio: vec![true, false],
            ..MergeOptions::default()
        };
        let seen = std::sync::Mutex::new(Vec::new());
        let on_progress = |p: u8| seen.lock().unwrap().push(p);
        merge(&media, &sources, options, Some(&on_progress))
            .await
            .unwrap();
        let history = factory.engine.history();
        assert!(history[4].argv.contains(&"anullsrc=r=44100:cl=stereo".to_string()));
        assert_eq!(seen.lock().unwrap().last(), Some(&100));
    }

    #[tokio::test]
    async fn test_merge_of_silent_clips_drops_audio() {
        let (media, factory, _dir) = service(MemoryEngine::new());
        merge(&media, &[clip("a.mp4"), clip("b.mp4")], MergeOptions::default(), None)
            .await
            .unwrap();
        let history = factory.engine.history();
        assert!(history[..2].iter().all(|r| r.argv.contains(&"-an".to_string())));
    }

    #[tokio::test]
    async fn test_split_video_returns_each_part() {
        let (media, _factory, _dir) = service(MemoryEngine::new());
        let parts = split_video(
            &media,
            &[clip("talk.mp4")],
            SplitVideoOptions {
                points: vec![10.0, 20.0],
            },
            None,
        )
        .await
        .unwrap();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0].display_name, "talk_part_1.mp4");
    }

    #[tokio::test]
    async fn test_missing_second_source_is_rejected() {
        let (media, _factory, _dir) = service(MemoryEngine::new());
        let err = replace_audio(&media, &[clip("a.mp4")], None).await.unwrap_err();
        assert_eq!(err.code(), "invalid_params");
    }
}
