//! Transcode decision engine
//!
//! Deterministic choice between copy-remux, audio extraction, and a full
//! re-encode, computed before any encoder process starts.

use serde::Serialize;
use strum::{Display, EnumString, IntoStaticStr};

use crate::core::config::transcode::{
    HEIGHT_LADDER, MIN_AUDIO_BITRATE_BPS, RECODE_AUDIO_BITRATE_BPS, SAFETY_MARGIN, TARGET_VIDEO_CONTAINER,
};
use crate::download::selector::Mode;
use crate::download::source::RawMedia;

/// What the executor does with the raw file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "plan", rename_all = "snake_case")]
pub enum TranscodePlan {
    /// Stream copy into the target container, faststart layout
    CopyRemux,
    /// Drop video, encode audio only
    AudioExtract,
    /// Full re-encode sized to the ceiling
    Recode {
        target_bitrate_bps: u64,
        /// 0 when the source height is unknown (no scaling)
        target_height: u32,
        audio_bitrate_bps: u64,
    },
}

impl TranscodePlan {
    pub fn label(&self) -> &'static str {
        match self {
            TranscodePlan::CopyRemux => "copy_remux",
            TranscodePlan::AudioExtract => "audio_extract",
            TranscodePlan::Recode { .. } => "recode",
        }
    }
}

/// Delivery transport whose payload limit applies to a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, EnumString, IntoStaticStr, Serialize)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
#[serde(rename_all = "lowercase")]
pub enum SizeTier {
    /// Direct upload through the chat API
    #[default]
    Standard,
    /// Higher-capacity protocol client
    Bulk,
}

/// Total bits per second available to fit `ceiling_bytes` into `duration_secs`.
pub fn total_bitrate_bps(ceiling_bytes: u64, duration_secs: u32) -> u64 {
    ceiling_bytes.saturating_mul(8) / u64::from(duration_secs.max(1))
}

/// Video bitrate after the safety margin; always at least 1.
pub fn video_bitrate_bps(total_bps: u64) -> u64 {
    ((total_bps as f64 * SAFETY_MARGIN).floor() as u64).max(1)
}

/// Audio share of a recode: a tenth of the budget, clamped, and never more
/// than the headroom left over by [`video_bitrate_bps`].
pub fn audio_bitrate_bps(total_bps: u64) -> u64 {
    let headroom = total_bps.saturating_sub(video_bitrate_bps(total_bps));
    (total_bps / 10)
        .clamp(MIN_AUDIO_BITRATE_BPS, RECODE_AUDIO_BITRATE_BPS)
        .min(headroom)
}

/// Highest output height that is economical at `video_bps`.
pub fn max_height_for_bitrate(video_bps: u64) -> u32 {
    HEIGHT_LADDER
        .iter()
        .find(|(min_bps, _)| video_bps >= *min_bps)
        .map(|(_, height)| *height)
        .unwrap_or(u32::MAX)
}

/// Chooses the plan for one raw file.
///
/// Rules, first match wins:
/// 1. audio mode → `AudioExtract`
/// 2. fits the ceiling, already mp4, source not flagged → `CopyRemux`
/// 3. otherwise `Recode` at the bitrate that fits the ceiling
pub fn decide(raw: &RawMedia, mode: Mode, is_sensitive_source: bool, size_ceiling_bytes: u64) -> TranscodePlan {
    if mode == Mode::Audio {
        return TranscodePlan::AudioExtract;
    }

    if raw.size_bytes <= size_ceiling_bytes && raw.extension() == TARGET_VIDEO_CONTAINER && !is_sensitive_source {
        return TranscodePlan::CopyRemux;
    }

    let total_bps = total_bitrate_bps(size_ceiling_bytes, raw.duration_secs);
    let target_bitrate_bps = video_bitrate_bps(total_bps);
    let target_height = match raw.height {
        0 => 0,
        h => h.min(max_height_for_bitrate(target_bitrate_bps)),
    };

    TranscodePlan::Recode {
        target_bitrate_bps,
        target_height,
        audio_bitrate_bps: audio_bitrate_bps(total_bps),
    }
}

/// Width/height of the deliverable produced by `plan` from `raw`.
///
/// Audio results have no picture; downscaled recodes keep the aspect ratio
/// with an even width, matching `scale=-2:<height>`.
pub fn output_dimensions(plan: &TranscodePlan, raw: &RawMedia) -> (u32, u32) {
    match *plan {
        TranscodePlan::AudioExtract => (0, 0),
        TranscodePlan::CopyRemux => (raw.width, raw.height),
        TranscodePlan::Recode { target_height, .. } => {
            if !needs_scaling(target_height, raw.height) {
                return (raw.width, raw.height);
            }
            if raw.width == 0 {
                return (0, target_height);
            }
            let scaled = (f64::from(raw.width) * f64::from(target_height) / f64::from(raw.height) / 2.0).round() * 2.0;
            ((scaled as u32).max(2), target_height)
        }
    }
}

/// Whether a recode to `target_height` shrinks a source of `source_height`
pub fn needs_scaling(target_height: u32, source_height: u32) -> bool {
    target_height > 0 && source_height > 0 && target_height < source_height
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const MB: u64 = 1024 * 1024;
    const CEILING: u64 = 45 * MB;

    fn raw(ext: &str, size_bytes: u64, duration_secs: u32, width: u32, height: u32) -> RawMedia {
        RawMedia::builder()
            .path(format!("/d/raw_x.{}", ext))
            .size_bytes(size_bytes)
            .duration_secs(duration_secs)
            .width(width)
            .height(height)
            .build()
    }

    #[test]
    fn test_audio_mode_always_extracts() {
        let big = raw("mkv", 10_000 * MB, 100, 1920, 1080);
        assert_eq!(decide(&big, Mode::Audio, true, CEILING), TranscodePlan::AudioExtract);
    }

    #[test]
    fn test_small_mp4_is_copied() {
        let source = raw("mp4", 40 * MB, 600, 1280, 720);
        assert_eq!(decide(&source, Mode::Video, false, CEILING), TranscodePlan::CopyRemux);
    }

    #[test]
    fn test_sensitive_source_recodes() {
        let source = raw("mp4", 5 * MB, 30, 1080, 1920);
        assert!(matches!(decide(&source, Mode::Video, true, CEILING), TranscodePlan::Recode { .. }));
    }

    #[test]
    fn test_other_container_recodes() {
        let source = raw("webm", 5 * MB, 30, 1280, 720);
        assert!(matches!(decide(&source, Mode::Video, false, CEILING), TranscodePlan::Recode { .. }));
    }

    #[test]
    fn test_oversized_recode_bitrate() {
        let source = raw("mp4", 140 * MB, 900, 1920, 1080);
        let expected = ((45.0_f64 * 1024.0 * 1024.0 * 8.0 / 900.0).floor() * 0.85).floor() as u64;
        match decide(&source, Mode::Video, false, CEILING) {
            TranscodePlan::Recode {
                target_bitrate_bps,
                target_height,
                audio_bitrate_bps,
            } => {
                assert_eq!(target_bitrate_bps, expected);
                // ~356 kbps of video only buys 360p
                assert_eq!(target_height, 360);
                assert_eq!(audio_bitrate_bps, 41_943);
                assert!(target_bitrate_bps * 900 / 8 <= CEILING);
            }
            other => panic!("unexpected plan {:?}", other),
        }
    }

    #[test]
    fn test_bitrate_fits_for_many_durations() {
        for duration in [1u32, 2, 7, 59, 600, 3599, 3600, 7200, 36_000] {
            let total = total_bitrate_bps(CEILING, duration);
            let video = video_bitrate_bps(total);
            let audio = audio_bitrate_bps(total);
            assert!(video > 0);
            assert!((video + audio) * u64::from(duration) / 8 <= CEILING, "duration {}", duration);
        }
    }

    #[test]
    fn test_long_source_audio_comes_out_of_headroom() {
        let source = raw("mkv", 900 * MB, 7200, 1920, 1080);
        match decide(&source, Mode::Video, false, CEILING) {
            TranscodePlan::Recode {
                target_bitrate_bps,
                audio_bitrate_bps,
                ..
            } => {
                let total = total_bitrate_bps(CEILING, 7200);
                assert_eq!(target_bitrate_bps, video_bitrate_bps(total));
                assert!(audio_bitrate_bps < MIN_AUDIO_BITRATE_BPS);
                assert!(target_bitrate_bps + audio_bitrate_bps <= total);
                assert!((target_bitrate_bps + audio_bitrate_bps) * 7200 / 8 <= CEILING);
            }
            other => panic!("unexpected plan {:?}", other),
        }
    }

    #[test]
    fn test_zero_duration_treated_as_one_second() {
        let source = raw("mkv", 100 * MB, 0, 1280, 720);
        match decide(&source, Mode::Video, false, CEILING) {
            TranscodePlan::Recode { target_bitrate_bps, target_height, .. } => {
                assert_eq!(target_bitrate_bps, video_bitrate_bps(CEILING * 8));
                assert_eq!(target_height, 720);
            }
            other => panic!("unexpected plan {:?}", other),
        }
    }

    #[test]
    fn test_unknown_height_never_scales() {
        let source = raw("mkv", 100 * MB, 3600, 0, 0);
        match decide(&source, Mode::Video, false, CEILING) {
            TranscodePlan::Recode { target_height, .. } => assert_eq!(target_height, 0),
            other => panic!("unexpected plan {:?}", other),
        }
    }

    #[test]
    fn test_height_ladder() {
        assert_eq!(max_height_for_bitrate(3_000_000), u32::MAX);
        assert_eq!(max_height_for_bitrate(1_500_000), 720);
        assert_eq!(max_height_for_bitrate(600_000), 480);
        assert_eq!(max_height_for_bitrate(1), 360);
    }

    #[test]
    fn test_bulk_ceiling_copies_large_file() {
        let source = raw("mp4", 500 * MB, 3600, 1920, 1080);
        assert!(matches!(decide(&source, Mode::Video, false, CEILING), TranscodePlan::Recode { .. }));
        assert_eq!(decide(&source, Mode::Video, false, 1900 * MB), TranscodePlan::CopyRemux);
    }

    #[test]
    fn test_output_dimensions() {
        let source = raw("mkv", 0, 0, 1920, 1080);
        assert_eq!(output_dimensions(&TranscodePlan::AudioExtract, &source), (0, 0));
        assert_eq!(output_dimensions(&TranscodePlan::CopyRemux, &source), (1920, 1080));
        let recode = |h| TranscodePlan::Recode {
            target_bitrate_bps: 1,
            target_height: h,
            audio_bitrate_bps: 1,
        };
        assert_eq!(output_dimensions(&recode(720), &source), (1280, 720));
        assert_eq!(output_dimensions(&recode(1080), &source), (1920, 1080));
        assert_eq!(output_dimensions(&recode(0), &source), (1920, 1080));

        let portrait = raw("mkv", 0, 0, 1080, 1920);
        assert_eq!(output_dimensions(&recode(360), &portrait), (202, 360));
    }

    #[test]
    fn test_plan_labels_and_tier() {
        assert_eq!(TranscodePlan::CopyRemux.label(), "copy_remux");
        assert_eq!("BULK".parse::<SizeTier>().ok(), Some(SizeTier::Bulk));
        assert_eq!(SizeTier::default().to_string(), "standard");
    }
}
