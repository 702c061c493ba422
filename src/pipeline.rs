//! Pipeline entry point and result assembly.
//!
//! One call to [`Pipeline::download`] runs every stage for one URL:
//! normalize → select strategy → extract → decide → transcode → assemble.
//! All intermediate files live under the request's `raw_<id>`/`final_<id>`
//! namespace; on failure nothing with that id is left behind, on success
//! only the final file remains and the caller owns it.

use serde::Serialize;
use std::path::PathBuf;
use std::time::Instant;

use crate::core::config::PipelineConfig;
use crate::core::error::{PipelineError, PipelineResult};
use crate::core::metrics;
use crate::download::job::JobFiles;
use crate::download::normalize::normalize;
use crate::download::progress::ProgressCallback;
use crate::download::selector::{MediaRequest, Mode, RetrievalPlan, Strategy, StrategySelector};
use crate::download::source::ytdlp::{FormatListing, YtDlpExtractor};
use crate::download::source::{ExtractorRegistry, RawMedia};
use crate::transcode::decision::{decide, output_dimensions, SizeTier, TranscodePlan};
use crate::transcode::executor::{FinalFile, TranscodeExecutor};

/// Deliverable handed back to the caller
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MediaResult {
    pub path: PathBuf,
    pub title: String,
    pub author: String,
    pub duration_secs: u32,
    pub width: u32,
    pub height: u32,
    pub thumbnail_url: String,
    /// On-disk size of `path`
    pub file_size: u64,
}

/// Packs the encoder output and the extracted metadata into a [`MediaResult`].
pub fn assemble(final_file: &FinalFile, raw: &RawMedia, plan: &TranscodePlan) -> MediaResult {
    let (width, height) = output_dimensions(plan, raw);
    MediaResult {
        path: final_file.path.clone(),
        title: raw.title.clone(),
        author: raw.author.clone(),
        duration_secs: raw.duration_secs,
        width,
        height,
        thumbnail_url: raw.thumbnail_url.clone(),
        file_size: final_file.size_bytes,
    }
}

/// Media acquisition and transcode pipeline.
///
/// Holds only read-only state, so one instance can serve concurrent requests.
pub struct Pipeline {
    config: PipelineConfig,
    selector: StrategySelector,
    registry: ExtractorRegistry,
    executor: TranscodeExecutor,
}

impl Pipeline {
    /// Pipeline with the built-in extractors.
    pub fn new(config: PipelineConfig) -> PipelineResult<Self> {
        let registry = ExtractorRegistry::from_config(&config)?;
        Ok(Self::with_registry(config, registry))
    }

    pub fn with_registry(config: PipelineConfig, registry: ExtractorRegistry) -> Self {
        Self {
            selector: StrategySelector::new(&config),
            executor: TranscodeExecutor::new(config.ffmpeg_bin.clone(), config.timeouts),
            registry,
            config,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Tier used when the caller does not pick one
    pub fn default_tier(&self) -> SizeTier {
        if self.config.bulk_by_default {
            SizeTier::Bulk
        } else {
            SizeTier::Standard
        }
    }

    pub fn ceiling_for(&self, tier: SizeTier) -> u64 {
        match tier {
            SizeTier::Standard => self.config.standard_ceiling_bytes,
            SizeTier::Bulk => self.config.bulk_ceiling_bytes,
        }
    }

    /// Retrieval plan for `url` without touching the network.
    pub fn plan(&self, url: &str, mode: Mode, quality: Option<&str>) -> RetrievalPlan {
        self.selector.select(&MediaRequest::new(normalize(url), mode, quality))
    }

    /// Available formats for `url` as reported by the generic extractor.
    pub async fn list_formats(&self, url: &str) -> PipelineResult<FormatListing> {
        let plan = self.plan(url, Mode::Video, None).as_generic();
        YtDlpExtractor::new(self.config.ytdlp_bin.clone(), self.config.max_source_bytes)
            .list_formats(&plan)
            .await
    }

    /// Downloads `url` and returns the deliverable sized for the default tier.
    pub async fn download(
        &self,
        url: &str,
        mode: Mode,
        quality: Option<&str>,
        progress: Option<ProgressCallback>,
    ) -> PipelineResult<MediaResult> {
        self.download_with_tier(url, mode, quality, progress, self.default_tier())
            .await
    }

    pub async fn download_with_tier(
        &self,
        url: &str,
        mode: Mode,
        quality: Option<&str>,
        progress: Option<ProgressCallback>,
        tier: SizeTier,
    ) -> PipelineResult<MediaResult> {
        let started = Instant::now();
        let result = self.run(url, mode, quality, progress, tier).await;
        metrics::observe_stage("total", started.elapsed().as_secs_f64());

        if let Err(ref e) = result {
            metrics::record_failure(e.kind());
            log::error!("Download failed for {} ({}): {}", url, e.kind(), e);
        }
        result
    }

    async fn run(
        &self,
        url: &str,
        mode: Mode,
        quality: Option<&str>,
        progress: Option<ProgressCallback>,
        tier: SizeTier,
    ) -> PipelineResult<MediaResult> {
        fs_err::tokio::create_dir_all(&self.config.download_dir).await?;
        let download_dir = fs_err::tokio::canonicalize(&self.config.download_dir).await?;

        let plan = self.plan(url, mode, quality);
        let mut job = JobFiles::new(download_dir, &plan.url);
        log::info!(
            "[{}] {} → {} (site {}, mode {}, tier {})",
            job.id(),
            url,
            plan.strategy,
            plan.site,
            plan.mode,
            tier
        );
        metrics::record_request(&plan.strategy.to_string());

        let stage = Instant::now();
        let raw = self.extract(&plan, &job, progress).await?;
        metrics::observe_stage("extract", stage.elapsed().as_secs_f64());
        log::info!(
            "[{}] extracted {} ({:.2} MB, {}s, {}x{})",
            job.id(),
            raw.path.display(),
            raw.size_bytes as f64 / (1024.0 * 1024.0),
            raw.duration_secs,
            raw.width,
            raw.height
        );

        let transcode_plan = decide(&raw, plan.mode, plan.is_sensitive_source, self.ceiling_for(tier));
        metrics::record_plan(transcode_plan.label());
        log::info!("[{}] transcode plan: {:?}", job.id(), transcode_plan);

        let stage = Instant::now();
        let final_file = self.executor.execute(&transcode_plan, &raw, &job).await?;
        metrics::observe_stage("transcode", stage.elapsed().as_secs_f64());

        job.keep(&final_file.path);
        Ok(assemble(&final_file, &raw, &transcode_plan))
    }

    /// Runs the plan's extractor; a failing direct API falls back to the generic one.
    async fn extract(
        &self,
        plan: &RetrievalPlan,
        job: &JobFiles,
        progress: Option<ProgressCallback>,
    ) -> PipelineResult<RawMedia> {
        let generic = || {
            self.registry
                .resolve(Strategy::GenericExtractor)
                .ok_or_else(|| PipelineError::other("no generic extractor registered"))
        };

        let Strategy::DirectApi(site) = plan.strategy else {
            return generic()?.extract(plan, job, progress).await;
        };

        let direct = match self.registry.resolve(plan.strategy) {
            Some(extractor) => extractor,
            None => {
                log::warn!("[{}] no direct API for {}, using generic extractor", job.id(), site);
                return generic()?.extract(&plan.as_generic(), job, progress).await;
            }
        };

        match direct.extract(plan, job, progress.clone()).await {
            Ok(raw) => Ok(raw),
            Err(e) if e.extraction_kind().is_some() => {
                log::warn!(
                    "[{}] {} failed ({}), falling back to generic extractor",
                    job.id(),
                    direct.name(),
                    e
                );
                generic()?.extract(&plan.as_generic(), job, progress).await
            }
            Err(e) => Err(e),
        }
    }
}

/// Downloads `url` with configuration read from the environment.
pub async fn download(
    url: &str,
    mode: Mode,
    quality: Option<&str>,
    progress: Option<ProgressCallback>,
) -> PipelineResult<MediaResult> {
    Pipeline::new(PipelineConfig::from_env())?
        .download(url, mode, quality, progress)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::download::selector::Site;
    use pretty_assertions::assert_eq;

    fn raw() -> RawMedia {
        RawMedia::builder()
            .path("/d/raw_abc.mkv")
            .title("Clip")
            .author("Chan")
            .duration_secs(900)
            .width(1920)
            .height(1080)
            .thumbnail_url("https://img/t.jpg")
            .size_bytes(140 * 1024 * 1024)
            .build()
    }

    #[test]
    fn test_assemble_uses_final_size() {
        let final_file = FinalFile {
            path: PathBuf::from("/d/final_abc.mp4"),
            size_bytes: 44 * 1024 * 1024,
        };
        let plan = TranscodePlan::Recode {
            target_bitrate_bps: 356_515,
            target_height: 360,
            audio_bitrate_bps: 41_943,
        };
        let result = assemble(&final_file, &raw(), &plan);
        assert_eq!(
            result,
            MediaResult {
                path: PathBuf::from("/d/final_abc.mp4"),
                title: "Clip".to_string(),
                author: "Chan".to_string(),
                duration_secs: 900,
                width: 640,
                height: 360,
                thumbnail_url: "https://img/t.jpg".to_string(),
                file_size: 44 * 1024 * 1024,
            }
        );
    }

    #[test]
    fn test_assemble_audio_has_no_picture() {
        let final_file = FinalFile {
            path: PathBuf::from("/d/final_abc.mp3"),
            size_bytes: 1,
        };
        let result = assemble(&final_file, &raw(), &TranscodePlan::AudioExtract);
        assert_eq!((result.width, result.height), (0, 0));
        assert_eq!(result.duration_secs, 900);
    }

    #[test]
    fn test_tiers_and_plan() {
        let mut config = PipelineConfig::with_download_dir("/tmp/reelpipe-test");
        let pipeline = Pipeline::with_registry(config.clone(), ExtractorRegistry::new());
        assert_eq!(pipeline.default_tier(), SizeTier::Standard);
        assert_eq!(pipeline.ceiling_for(SizeTier::Standard), 45 * 1024 * 1024);
        assert_eq!(pipeline.ceiling_for(SizeTier::Bulk), 1900 * 1024 * 1024);

        let plan = pipeline.plan("https://youtu.be/abc123", Mode::Video, Some("720"));
        assert_eq!(plan.url, "https://www.youtube.com/watch?v=abc123");
        assert_eq!(plan.site, Site::YouTube);
        assert_eq!(plan.quality, Some(720));

        config.bulk_by_default = true;
        let pipeline = Pipeline::with_registry(config, ExtractorRegistry::new());
        assert_eq!(pipeline.default_tier(), SizeTier::Bulk);
    }

    #[tokio::test]
    async fn test_missing_extractor_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = Pipeline::with_registry(PipelineConfig::with_download_dir(dir.path()), ExtractorRegistry::new());
        let err = pipeline
            .download("https://example.com/v", Mode::Video, None, None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "other");
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
