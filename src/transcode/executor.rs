//! Transcode executor
//!
//! Runs ffmpeg with arguments derived purely from a [`TranscodePlan`],
//! under a wall-clock timeout scaled to the media duration. The executor
//! owns the raw file it consumes and deletes it on every exit path; partial
//! output is deleted whenever the run fails.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tokio::process::Command;

use crate::core::config::transcode::{AUDIO_EXTRACT_BITRATE, TARGET_AUDIO_EXTENSION, TARGET_VIDEO_CONTAINER};
use crate::core::config::TranscodeTimeouts;
use crate::core::error::{PipelineError, PipelineResult};
use crate::core::process::{run_with_timeout, tail_lines};
use crate::download::job::{remove_file_quiet, JobFiles};
use crate::download::source::{file_size, RawMedia};
use crate::transcode::decision::{needs_scaling, TranscodePlan};

/// Lines of encoder diagnostics carried in a `Transcode` error
const STDERR_SNIPPET_LINES: usize = 8;

/// Encoder output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinalFile {
    pub path: PathBuf,
    pub size_bytes: u64,
}

/// Extension of the file `plan` produces
pub fn output_extension(plan: &TranscodePlan) -> &'static str {
    match plan {
        TranscodePlan::AudioExtract => TARGET_AUDIO_EXTENSION,
        TranscodePlan::CopyRemux | TranscodePlan::Recode { .. } => TARGET_VIDEO_CONTAINER,
    }
}

/// Codec/container options for `plan` (everything between input and output)
pub fn plan_args(plan: &TranscodePlan, source_height: u32) -> Vec<String> {
    let mut args: Vec<String> = Vec::new();
    let mut push = |items: &[&str]| args.extend(items.iter().map(|s| s.to_string()));

    match *plan {
        TranscodePlan::CopyRemux => {
            push(&["-map", "0:v?", "-map", "0:a?", "-c", "copy", "-map_metadata", "0"]);
            push(&["-movflags", "+faststart"]);
        }
        TranscodePlan::AudioExtract => {
            push(&["-vn", "-map", "0:a:0", "-c:a", "libmp3lame", "-b:a", AUDIO_EXTRACT_BITRATE]);
            push(&["-map_metadata", "0"]);
        }
        TranscodePlan::Recode {
            target_bitrate_bps,
            target_height,
            audio_bitrate_bps,
        } => {
            let video_rate = target_bitrate_bps.to_string();
            let buffer = target_bitrate_bps.saturating_mul(2).to_string();
            let audio_rate = audio_bitrate_bps.to_string();
            push(&["-map", "0:v:0", "-map", "0:a:0?"]);
            push(&["-c:v", "libx264", "-profile:v", "high", "-pix_fmt", "yuv420p", "-preset", "veryfast"]);
            push(&["-b:v", &video_rate, "-maxrate", &video_rate, "-bufsize", &buffer]);
            if needs_scaling(target_height, source_height) {
                let filter = format!("scale=-2:{}", target_height);
                push(&["-vf", &filter]);
            }
            push(&["-c:a", "aac", "-b:a", &audio_rate, "-ac", "2"]);
            push(&["-map_metadata", "0", "-movflags", "+faststart"]);
        }
    }
    args
}

/// Wall-clock budget for running `plan` on `duration_secs` of media.
///
/// Stream copies get a tenth of the per-second allowance.
pub fn timeout_for(plan: &TranscodePlan, duration_secs: u32, timeouts: &TranscodeTimeouts) -> Duration {
    let per_second = match plan {
        TranscodePlan::CopyRemux => timeouts.per_media_second / 10.0,
        TranscodePlan::AudioExtract | TranscodePlan::Recode { .. } => timeouts.per_media_second,
    };
    let extra = (per_second * f64::from(duration_secs)).max(0.0);
    let budget = timeouts.base.saturating_add(Duration::from_secs_f64(extra.min(1.0e9)));
    budget.min(timeouts.max)
}

/// Runs ffmpeg for one plan
#[derive(Debug, Clone)]
pub struct TranscodeExecutor {
    ffmpeg_bin: String,
    timeouts: TranscodeTimeouts,
}

impl TranscodeExecutor {
    pub fn new(ffmpeg_bin: impl Into<String>, timeouts: TranscodeTimeouts) -> Self {
        Self {
            ffmpeg_bin: ffmpeg_bin.into(),
            timeouts,
        }
    }

    /// Produces `final_<id>.<ext>` from `raw`; the raw file is gone afterwards either way.
    pub async fn execute(&self, plan: &TranscodePlan, raw: &RawMedia, job: &JobFiles) -> PipelineResult<FinalFile> {
        let output = job.final_path(output_extension(plan));
        let result = self.run(plan, raw, &output, job).await;

        remove_file_quiet(&raw.path);
        if result.is_err() {
            remove_file_quiet(&output);
        }
        result
    }

    async fn run(&self, plan: &TranscodePlan, raw: &RawMedia, output: &Path, job: &JobFiles) -> PipelineResult<FinalFile> {
        if raw.path == output {
            return Err(PipelineError::other("transcode output would overwrite its input"));
        }

        let limit = timeout_for(plan, raw.duration_secs, &self.timeouts);
        let args = plan_args(plan, raw.height);
        log::info!(
            "[{}] ffmpeg {} (timeout {}s): {} -> {}",
            job.id(),
            plan.label(),
            limit.as_secs(),
            raw.path.display(),
            output.display()
        );
        log::debug!("[{}] ffmpeg args: {}", job.id(), args.join(" "));

        let mut cmd = Command::new(&self.ffmpeg_bin);
        cmd.args(["-hide_banner", "-loglevel", "error", "-nostdin", "-y", "-i"])
            .arg(&raw.path)
            .args(&args)
            .arg(output);

        let started = Instant::now();
        let result = run_with_timeout(&mut cmd, limit).await;
        let output_status = match result {
            Ok(out) => out,
            Err(PipelineError::TranscodeTimeout { seconds }) => {
                log::error!("[{}] ffmpeg {} timed out after {}s", job.id(), plan.label(), seconds);
                return Err(PipelineError::TranscodeTimeout { seconds });
            }
            Err(e) => return Err(PipelineError::transcode(format!("failed to start ffmpeg: {}", e))),
        };

        if !output_status.status.success() {
            let stderr = String::from_utf8_lossy(&output_status.stderr);
            log::error!("[{}] ffmpeg {} failed: {}", job.id(), plan.label(), stderr.trim());
            let snippet = tail_lines(&stderr, STDERR_SNIPPET_LINES);
            let message = if snippet.is_empty() {
                format!("ffmpeg exited with {}", output_status.status)
            } else {
                snippet
            };
            return Err(PipelineError::transcode(message));
        }

        let size_bytes = file_size(output)
            .map_err(|_| PipelineError::transcode("ffmpeg reported success but produced no output"))?;
        log::info!(
            "[{}] ffmpeg {} done in {:.1}s ({:.2} MB -> {:.2} MB)",
            job.id(),
            plan.label(),
            started.elapsed().as_secs_f64(),
            raw.size_bytes as f64 / (1024.0 * 1024.0),
            size_bytes as f64 / (1024.0 * 1024.0)
        );

        Ok(FinalFile {
            path: output.to_path_buf(),
            size_bytes,
        })
    }
}
