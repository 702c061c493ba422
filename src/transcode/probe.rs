//! ffprobe helpers
//!
//! Reads duration, dimensions, and stream presence from a media file.
//! Probing never fails the pipeline: any problem yields `None`.

use serde::Deserialize;
use std::path::Path;
use tokio::process::Command;

use crate::core::process::{run_with_timeout, FFPROBE_TIMEOUT};

/// What ffprobe reported about a file
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProbeInfo {
    pub duration_secs: Option<u32>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub has_video: bool,
    pub has_audio: bool,
}

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
    format: Option<ProbeFormat>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    codec_type: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    #[serde(default)]
    disposition: Option<ProbeDisposition>,
}

#[derive(Debug, Deserialize)]
struct ProbeDisposition {
    #[serde(default)]
    attached_pic: u8,
}

#[derive(Debug, Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
}

/// Parses `ffprobe -of json -show_streams -show_format` output.
///
/// Cover art (an attached picture) does not count as a video track.
pub fn parse_probe_json(json: &str) -> Option<ProbeInfo> {
    let output: ProbeOutput = serde_json::from_str(json).ok()?;

    let duration_secs = output
        .format
        .and_then(|f| f.duration)
        .and_then(|d| d.trim().parse::<f64>().ok())
        .filter(|d| d.is_finite() && *d >= 0.0)
        .map(|d| d.round() as u32);

    let video = output.streams.iter().find(|s| {
        s.codec_type.as_deref() == Some("video") && s.disposition.as_ref().map(|d| d.attached_pic).unwrap_or(0) == 0
    });
    let has_audio = output.streams.iter().any(|s| s.codec_type.as_deref() == Some("audio"));

    Some(ProbeInfo {
        duration_secs,
        width: video.and_then(|v| v.width),
        height: video.and_then(|v| v.height),
        has_video: video.is_some(),
        has_audio,
    })
}

/// Probes `path` with the given ffprobe binary.
pub async fn probe_media(ffprobe_bin: &str, path: &Path) -> Option<ProbeInfo> {
    let mut cmd = Command::new(ffprobe_bin);
    cmd.args(["-v", "error", "-of", "json", "-show_format", "-show_streams"])
        .arg(path);

    let output = match run_with_timeout(&mut cmd, FFPROBE_TIMEOUT).await {
        Ok(output) => output,
        Err(e) => {
            log::debug!("ffprobe unavailable for {}: {}", path.display(), e);
            return None;
        }
    };
    if !output.status.success() {
        log::debug!(
            "ffprobe failed for {}: {}",
            path.display(),
            String::from_utf8_lossy(&output.stderr).trim()
        );
        return None;
    }
    parse_probe_json(&String::from_utf8_lossy(&output.stdout))
}
