//! Media extraction backends.
//!
//! Provides the `MediaExtractor` trait implemented by every retrieval
//! strategy, the `RawMedia` value they produce, and an `ExtractorRegistry`
//! that routes a `RetrievalPlan` to its backend.
//!
//! Built-in backends:
//! - `YtDlpExtractor`: generic extraction engine (YouTube, Instagram, VK, anything else yt-dlp knows)
//! - `TikTokApiExtractor`: dedicated lookup API for TikTok with streaming download

pub mod tiktok;
pub mod ytdlp;

use async_trait::async_trait;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::core::config::PipelineConfig;
use crate::core::error::{ExtractionFailure, PipelineError, PipelineResult};
use crate::download::job::JobFiles;
use crate::download::progress::ProgressCallback;
use crate::download::selector::{RetrievalPlan, Strategy};
use crate::transcode::probe::probe_media;

/// Placeholder title when upstream provides none
pub const DEFAULT_TITLE: &str = "Video";
/// Placeholder author when upstream provides none
pub const DEFAULT_AUTHOR: &str = "Unknown";

/// Downloaded file plus the metadata extracted for it.
///
/// Numeric fields are present-with-zero when unknown.
#[derive(Debug, Clone, PartialEq, Serialize, bon::Builder)]
pub struct RawMedia {
    #[builder(into)]
    pub path: PathBuf,
    #[builder(into, default = DEFAULT_TITLE.to_string())]
    pub title: String,
    #[builder(into, default = DEFAULT_AUTHOR.to_string())]
    pub author: String,
    #[builder(default)]
    pub duration_secs: u32,
    #[builder(default)]
    pub width: u32,
    #[builder(default)]
    pub height: u32,
    #[builder(into, default)]
    pub thumbnail_url: String,
    #[builder(default)]
    pub size_bytes: u64,
}

impl RawMedia {
    /// Lowercase file extension (empty if none)
    pub fn extension(&self) -> String {
        self.path
            .extension()
            .map(|e| e.to_string_lossy().to_ascii_lowercase())
            .unwrap_or_default()
    }
}

/// One retrieval strategy.
#[async_trait]
pub trait MediaExtractor: Send + Sync {
    /// Human-readable name of this backend (e.g., "yt-dlp", "tiktok-api")
    fn name(&self) -> &str;

    /// Whether this backend implements the given strategy.
    fn handles(&self, strategy: Strategy) -> bool;

    /// Resolves metadata and writes the raw file inside `job`'s namespace.
    async fn extract(
        &self,
        plan: &RetrievalPlan,
        job: &JobFiles,
        progress: Option<ProgressCallback>,
    ) -> PipelineResult<RawMedia>;
}

/// Routes strategies to backends.
///
/// Backends are tried in registration order; the first one that handles
/// the strategy is used.
pub struct ExtractorRegistry {
    extractors: Vec<Arc<dyn MediaExtractor>>,
}

impl ExtractorRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self { extractors: Vec::new() }
    }

    pub fn register(&mut self, extractor: Arc<dyn MediaExtractor>) {
        self.extractors.push(extractor);
    }

    pub fn resolve(&self, strategy: Strategy) -> Option<Arc<dyn MediaExtractor>> {
        self.extractors.iter().find(|e| e.handles(strategy)).cloned()
    }

    /// Registry with the built-in backends configured from `config`.
    pub fn from_config(config: &PipelineConfig) -> PipelineResult<Self> {
        let mut registry = Self::new();
        registry.register(Arc::new(tiktok::TikTokApiExtractor::new(
            config.tiktok_api_url.clone(),
            config.ffprobe_bin.clone(),
        )?));
        registry.register(Arc::new(ytdlp::YtDlpExtractor::new(
            config.ytdlp_bin.clone(),
            config.max_source_bytes,
        )));
        Ok(registry)
    }
}

impl Default for ExtractorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Resolves the file the extractor actually produced.
///
/// The extractor may report a name whose extension differs from what
/// landed on disk (post-merge container changes). When the expected path is
/// missing, the request's directory is scanned for any finished file with
/// the request's id.
pub fn locate_downloaded_file(expected: Option<&Path>, job: &JobFiles) -> PipelineResult<PathBuf> {
    if let Some(path) = expected {
        if path.is_file() {
            return Ok(path.to_path_buf());
        }
        log::warn!(
            "[{}] extractor reported {} but it does not exist, scanning download dir",
            job.id(),
            path.display()
        );
    }

    match job.find_raw_file() {
        Some(found) => {
            log::info!("[{}] adopted downloaded file {}", job.id(), found.display());
            Ok(found)
        }
        None => Err(PipelineError::extraction(
            ExtractionFailure::FileMissing,
            "file not found after download",
        )),
    }
}

/// On-disk size of `path`
pub fn file_size(path: &Path) -> PipelineResult<u64> {
    Ok(fs_err::metadata(path)?.len())
}

/// Fills zero duration/width/height from ffprobe; unknown values stay zero.
pub async fn fill_missing_from_probe(mut raw: RawMedia, ffprobe_bin: &str) -> RawMedia {
    if raw.duration_secs > 0 && raw.width > 0 && raw.height > 0 {
        return raw;
    }
    if let Some(info) = probe_media(ffprobe_bin, &raw.path).await {
        if raw.duration_secs == 0 {
            raw.duration_secs = info.duration_secs.unwrap_or(0);
        }
        if raw.width == 0 || raw.height == 0 {
            raw.width = info.width.unwrap_or(0);
            raw.height = info.height.unwrap_or(0);
        }
    }
    raw
}
