//! YtDlpExtractor: generic extraction backend powered by yt-dlp.
//!
//! Every run is two steps:
//!   1. metadata probe (`--dump-single-json --skip-download`) that rejects
//!      live streams and oversized sources before anything is written;
//!   2. the download itself into the request's `raw_<id>.%(ext)s` template,
//!      with progress parsed from the output and the info JSON on stdout.
//!
//! All arguments are passed as discrete tokens; the URL always follows `--`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::io::{BufRead, BufReader};
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::sync::{Arc, Mutex};

use crate::core::error::{ExtractionFailure, PipelineError, PipelineResult};
use crate::core::process::{LineTail, STDERR_TAIL_LINES};
use crate::download::job::JobFiles;
use crate::download::progress::{ProgressCallback, ProgressReporter};
use crate::download::selector::{Mode, RetrievalPlan, Strategy};
use crate::download::source::{file_size, locate_downloaded_file, MediaExtractor, RawMedia};
use crate::download::ytdlp_errors::{extraction_error_from_stderr, fix_recommendation, is_operator_issue};

/// Subset of the yt-dlp info JSON the pipeline reads
#[derive(Debug, Default, Deserialize)]
pub struct YtDlpInfo {
    pub title: Option<String>,
    pub uploader: Option<String>,
    pub channel: Option<String>,
    pub creator: Option<String>,
    pub channel_url: Option<String>,
    pub uploader_url: Option<String>,
    pub duration: Option<f64>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub thumbnail: Option<String>,
    pub is_live: Option<bool>,
    pub live_status: Option<String>,
    pub filesize: Option<u64>,
    pub filesize_approx: Option<u64>,
    #[serde(rename = "_filename")]
    pub internal_filename: Option<String>,
    pub filename: Option<String>,
    #[serde(default)]
    pub formats: Vec<YtDlpFormat>,
}

#[derive(Debug, Default, Deserialize)]
pub struct YtDlpFormat {
    pub format_id: Option<String>,
    pub ext: Option<String>,
    pub vcodec: Option<String>,
    pub acodec: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub resolution: Option<String>,
    pub filesize: Option<u64>,
    pub filesize_approx: Option<u64>,
}

impl YtDlpInfo {
    pub fn is_live(&self) -> bool {
        self.is_live.unwrap_or(false) || matches!(self.live_status.as_deref(), Some("is_live" | "is_upcoming"))
    }

    pub fn announced_size(&self) -> Option<u64> {
        self.filesize.or(self.filesize_approx).filter(|size| *size > 0)
    }

    pub fn author(&self) -> Option<String> {
        self.uploader
            .clone()
            .or_else(|| self.channel.clone())
            .or_else(|| self.creator.clone())
            .filter(|a| !a.trim().is_empty())
    }

    pub fn duration_secs(&self) -> Option<u32> {
        self.duration.filter(|d| d.is_finite() && *d > 0.0).map(|d| d.round() as u32)
    }

    pub fn reported_path(&self) -> Option<PathBuf> {
        self.internal_filename
            .as_ref()
            .or(self.filename.as_ref())
            .map(PathBuf::from)
    }
}

/// One downloadable combined format
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FormatEntry {
    pub format_id: String,
    pub resolution: String,
    pub ext: String,
    pub size_mb: Option<f64>,
}

/// What `list_formats` reports about a URL
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FormatListing {
    pub title: String,
    pub thumbnail: String,
    pub channel: String,
    pub channel_url: String,
    pub combined: Vec<FormatEntry>,
    pub audio_format_id: Option<String>,
}

/// yt-dlp marks a missing track with `"none"`; an absent key means unknown,
/// which counts as present.
fn is_codec_present(codec: Option<&str>) -> bool {
    codec != Some("none")
}

fn format_resolution(f: &YtDlpFormat) -> String {
    if let Some(resolution) = f.resolution.clone().filter(|r| !r.is_empty()) {
        return resolution;
    }
    match (f.width, f.height) {
        (Some(w), Some(h)) => format!("{}x{}", w, h),
        (_, Some(h)) => format!("{}p", h),
        _ => "unknown".to_string(),
    }
}

impl FormatListing {
    pub fn from_info(info: &YtDlpInfo) -> Self {
        let combined = info
            .formats
            .iter()
            .filter(|f| is_codec_present(f.vcodec.as_deref()) && is_codec_present(f.acodec.as_deref()))
            .filter_map(|f| {
                let format_id = f.format_id.clone()?;
                Some(FormatEntry {
                    format_id,
                    resolution: format_resolution(f),
                    ext: f.ext.clone().unwrap_or_default(),
                    size_mb: f
                        .filesize
                        .or(f.filesize_approx)
                        .map(|bytes| (bytes as f64 / (1024.0 * 1024.0) * 100.0).round() / 100.0),
                })
            })
            .collect();

        let audio_format_id = info
            .formats
            .iter()
            .find(|f| is_codec_present(f.acodec.as_deref()) && !is_codec_present(f.vcodec.as_deref()))
            .and_then(|f| f.format_id.clone());

        FormatListing {
            title: info.title.clone().unwrap_or_default(),
            thumbnail: info.thumbnail.clone().unwrap_or_default(),
            channel: info.author().unwrap_or_default(),
            channel_url: info
                .channel_url
                .clone()
                .or_else(|| info.uploader_url.clone())
                .unwrap_or_default(),
            combined,
            audio_format_id,
        }
    }
}

/// Network identity flags shared by probe and download runs
pub fn identity_args(plan: &RetrievalPlan) -> Vec<String> {
    let identity = &plan.identity;
    let mut args = vec!["--user-agent".to_string(), identity.user_agent.clone()];
    if let Some(ref cookies) = identity.cookie_file {
        args.push("--cookies".to_string());
        args.push(cookies.to_string_lossy().to_string());
    }
    for (name, value) in &identity.headers {
        args.push("--add-header".to_string());
        args.push(format!("{}:{}", name, value));
    }
    if let Some(ref extractor_args) = identity.extractor_args {
        args.push("--extractor-args".to_string());
        args.push(extractor_args.clone());
    }
    args
}

/// Arguments for the metadata-only run
pub fn probe_args(plan: &RetrievalPlan) -> Vec<String> {
    let mut args: Vec<String> = ["--dump-single-json", "--skip-download", "--no-playlist", "--no-warnings"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    args.extend(identity_args(plan));
    args.push("--".to_string());
    args.push(plan.url.clone());
    args
}

/// Arguments for the download run
pub fn download_args(plan: &RetrievalPlan, output_template: &str) -> Vec<String> {
    let mut args: Vec<String> = vec![
        "-o".to_string(),
        output_template.to_string(),
        "--newline".to_string(),
        "--progress".to_string(),
        "--no-simulate".to_string(),
        "--dump-json".to_string(),
        "--no-playlist".to_string(),
        "--force-overwrites".to_string(),
        "--socket-timeout".to_string(),
        "30".to_string(),
        "--retries".to_string(),
        "10".to_string(),
        "--fragment-retries".to_string(),
        "10".to_string(),
        "--format".to_string(),
        plan.format.clone(),
    ];
    if plan.mode == Mode::Video {
        args.push("--merge-output-format".to_string());
        args.push("mp4".to_string());
    }
    args.extend(identity_args(plan));
    args.push("--".to_string());
    args.push(plan.url.clone());
    args
}

/// Generic extraction engine backend
pub struct YtDlpExtractor {
    bin: String,
    max_source_bytes: u64,
}

impl YtDlpExtractor {
    pub fn new(bin: impl Into<String>, max_source_bytes: u64) -> Self {
        Self {
            bin: bin.into(),
            max_source_bytes,
        }
    }

    /// Runs the metadata probe and returns the parsed info.
    pub async fn probe(&self, plan: &RetrievalPlan) -> PipelineResult<YtDlpInfo> {
        let args = probe_args(plan);
        log::debug!("yt-dlp probe: {} {}", self.bin, args.join(" "));

        let output = tokio::process::Command::new(&self.bin)
            .args(&args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| {
                PipelineError::extraction(
                    ExtractionFailure::Unknown,
                    format!("Failed to start downloader '{}': {}", self.bin, e),
                )
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(extraction_error_from_stderr(&stderr, output.status.code()));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let json = stdout.lines().find(|l| l.trim_start().starts_with('{')).ok_or_else(|| {
            PipelineError::extraction(ExtractionFailure::Unknown, "yt-dlp returned no metadata")
        })?;
        Ok(serde_json::from_str(json)?)
    }

    /// Rejects content that can't or shouldn't be downloaded.
    fn check_downloadable(&self, info: &YtDlpInfo) -> PipelineResult<()> {
        if info.is_live() {
            return Err(PipelineError::extraction(
                ExtractionFailure::LiveStream,
                "live streams can't be downloaded",
            ));
        }
        if let Some(size) = info.announced_size() {
            if size > self.max_source_bytes {
                return Err(PipelineError::extraction(
                    ExtractionFailure::TooLarge,
                    format!(
                        "source is {:.1} MB, limit is {:.1} MB",
                        size as f64 / (1024.0 * 1024.0),
                        self.max_source_bytes as f64 / (1024.0 * 1024.0)
                    ),
                ));
            }
        }
        Ok(())
    }

    /// Combined formats and the first audio-only format for `plan.url`.
    pub async fn list_formats(&self, plan: &RetrievalPlan) -> PipelineResult<FormatListing> {
        let info = self.probe(plan).await?;
        Ok(FormatListing::from_info(&info))
    }
}

#[async_trait]
impl MediaExtractor for YtDlpExtractor {
    fn name(&self) -> &str {
        "yt-dlp"
    }

    fn handles(&self, strategy: Strategy) -> bool {
        strategy == Strategy::GenericExtractor
    }

    async fn extract(
        &self,
        plan: &RetrievalPlan,
        job: &JobFiles,
        progress: Option<ProgressCallback>,
    ) -> PipelineResult<RawMedia> {
        let probed = self.probe(plan).await?;
        self.check_downloadable(&probed)?;

        let template = job.raw_template().to_string_lossy().to_string();
        let args = download_args(plan, &template);
        log::info!("[{}] yt-dlp download ({}): {}", job.id(), plan.site, plan.url);
        log::debug!("[{}] yt-dlp command: {} {}", job.id(), self.bin, args.join(" "));

        let bin = self.bin.clone();
        let job_id = job.id().to_string();
        let json_lines = tokio::task::spawn_blocking(move || run_ytdlp_with_progress(&bin, &args, progress, &job_id))
            .await??;

        let downloaded: YtDlpInfo = json_lines
            .last()
            .and_then(|line| serde_json::from_str(line).ok())
            .unwrap_or_default();

        let path = locate_downloaded_file(downloaded.reported_path().as_deref(), job)?;
        let size_bytes = file_size(&path)?;

        // The probe and the download describe the same item; prefer the download's view
        let pick = |a: Option<String>, b: Option<String>| a.or(b).filter(|s| !s.trim().is_empty());

        Ok(RawMedia::builder()
            .path(path)
            .maybe_title(pick(downloaded.title.clone(), probed.title.clone()))
            .maybe_author(downloaded.author().or_else(|| probed.author()))
            .maybe_duration_secs(downloaded.duration_secs().or_else(|| probed.duration_secs()))
            .maybe_width(downloaded.width.or(probed.width))
            .maybe_height(downloaded.height.or(probed.height))
            .maybe_thumbnail_url(pick(downloaded.thumbnail.clone(), probed.thumbnail.clone()))
            .size_bytes(size_bytes)
            .build())
    }
}

/// Runs yt-dlp, forwarding progress and collecting the info JSON lines from stdout.
///
/// Blocking: call from `spawn_blocking`. stderr is drained on its own thread
/// and its tail is kept for error classification.
fn run_ytdlp_with_progress(
    bin: &str,
    args: &[String],
    progress: Option<ProgressCallback>,
    job_id: &str,
) -> PipelineResult<Vec<String>> {
    let mut child = Command::new(bin)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| {
            PipelineError::extraction(
                ExtractionFailure::Unknown,
                format!("Failed to start downloader '{}': {}", bin, e),
            )
        })?;

    let reporter = Arc::new(Mutex::new(ProgressReporter::new(progress)));
    let stderr_tail = Arc::new(Mutex::new(LineTail::new(STDERR_TAIL_LINES)));

    let stderr_thread = child.stderr.take().map(|stderr_stream| {
        let reporter = Arc::clone(&reporter);
        let stderr_tail = Arc::clone(&stderr_tail);
        let job_id = job_id.to_string();
        std::thread::spawn(move || {
            let reader = BufReader::new(stderr_stream);
            for line in reader.lines().map_while(Result::ok) {
                log::debug!("[{}] yt-dlp stderr: {}", job_id, line);
                if let Ok(mut reporter) = reporter.lock() {
                    reporter.report_line(&line);
                }
                if let Ok(mut tail) = stderr_tail.lock() {
                    tail.push(line);
                }
            }
        })
    });

    let mut json_lines = Vec::new();
    if let Some(stdout_stream) = child.stdout.take() {
        let reader = BufReader::new(stdout_stream);
        for line in reader.lines().map_while(Result::ok) {
            if line.trim_start().starts_with('{') {
                json_lines.push(line);
                continue;
            }
            log::debug!("[{}] yt-dlp stdout: {}", job_id, line);
            if let Ok(mut reporter) = reporter.lock() {
                reporter.report_line(&line);
            }
        }
    }

    let status = child.wait()?;
    if let Some(handle) = stderr_thread {
        let _ = handle.join();
    }

    if status.success() {
        return Ok(json_lines);
    }

    let stderr_text = stderr_tail.lock().map(|tail| tail.joined()).unwrap_or_default();
    let err = extraction_error_from_stderr(&stderr_text, status.code());
    if let Some(kind) = err.extraction_kind() {
        if is_operator_issue(kind) {
            log::error!("[{}] yt-dlp failed ({}): {}", job_id, kind, fix_recommendation(kind));
        } else {
            log::warn!("[{}] yt-dlp failed ({})", job_id, kind);
        }
    }
    Err(err)
}
