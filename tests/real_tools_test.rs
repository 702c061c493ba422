//! Pipeline runs against the real ffmpeg and ffprobe
//!
//! Run with: cargo test --test real_tools_test -- --ignored

mod common;
mod mocks;

use pretty_assertions::assert_eq;
use serial_test::serial;
use std::sync::Arc;
use std::time::Duration;

use common::TestDirs;
use mocks::{FakeExtractor, FakeOutcome};
use reelpipe::core::config::TranscodeTimeouts;
use reelpipe::download::{ExtractorRegistry, Strategy};
use reelpipe::transcode::probe_media;
use reelpipe::{Mode, Pipeline};

const CEILING: u64 = 400 * 1024;

fn real_pipeline(dirs: &TestDirs, seconds: u32) -> Pipeline {
    let mut config = dirs.config();
    config.ffmpeg_bin = "ffmpeg".to_string();
    config.ffprobe_bin = "ffprobe".to_string();
    config.standard_ceiling_bytes = CEILING;
    config.timeouts = TranscodeTimeouts {
        base: Duration::from_secs(60),
        per_media_second: 2.0,
        max: Duration::from_secs(300),
    };

    let mut registry = ExtractorRegistry::new();
    registry.register(Arc::new(FakeExtractor::new(
        Strategy::GenericExtractor,
        FakeOutcome::Synthesized {
            ffmpeg: "ffmpeg",
            seconds,
            width: 1280,
            height: 720,
        },
    )));
    Pipeline::with_registry(config, registry)
}

#[tokio::test]
#[serial]
#[ignore] // requires ffmpeg and ffprobe on PATH
async fn test_audio_result_has_no_video_track() {
    let dirs = TestDirs::new();
    let result = real_pipeline(&dirs, 5)
        .download("https://example.com/clip", Mode::Audio, None, None)
        .await
        .unwrap();

    assert_eq!(result.path.extension().unwrap(), "mp3");
    let info = probe_media("ffprobe", &result.path).await.unwrap();
    assert!(!info.has_video);
    assert!(info.has_audio);
    assert_eq!(dirs.download_names().len(), 1);
}

#[tokio::test]
#[serial]
#[ignore] // requires ffmpeg and ffprobe on PATH
async fn test_recode_fits_the_ceiling() {
    let dirs = TestDirs::new();
    let result = real_pipeline(&dirs, 20)
        .download("https://example.com/clip", Mode::Video, None, None)
        .await
        .unwrap();

    assert_eq!(result.path.extension().unwrap(), "mp4");
    // 400 KiB over 20 s only buys 360p
    assert_eq!((result.width, result.height), (640, 360));
    assert!(result.file_size <= CEILING * 105 / 100, "{} bytes", result.file_size);

    let info = probe_media("ffprobe", &result.path).await.unwrap();
    assert!(info.has_video);
    assert!(info.has_audio);
    assert_eq!(info.height, Some(360));
    assert_eq!(dirs.download_names().len(), 1);
}
