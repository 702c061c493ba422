//! TikTokApiExtractor: dedicated lookup API for TikTok.
//!
//! TikTok's pages block the generic extractor often enough that a
//! lightweight third-party lookup API is used instead:
//! - POST the page URL to the lookup endpoint (form: `url`, `hd=1`)
//! - read the direct media URL, title, author, duration, and cover from the JSON
//! - stream the media to `raw_<id>.mp4` with progress every 5%
//!
//! Any failure here is an `Extraction` error; the pipeline falls back to the
//! generic extractor.

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::Client;
use serde::Deserialize;
use tokio::io::AsyncWriteExt;
use url::Url;

use crate::core::config::{network, tiktok};
use crate::core::error::{ExtractionFailure, PipelineError, PipelineResult};
use crate::download::job::{remove_file_quiet, JobFiles};
use crate::download::progress::{ProgressCallback, ProgressReporter};
use crate::download::selector::{RetrievalPlan, Site, Strategy};
use crate::download::source::{fill_missing_from_probe, MediaExtractor, RawMedia};

/// Progress granularity for the streamed download
const PROGRESS_STEP: u8 = 5;

#[derive(Debug, Deserialize)]
pub struct ApiResponse {
    #[serde(default = "default_code")]
    pub code: i64,
    #[serde(default)]
    pub msg: String,
    pub data: Option<ApiData>,
}

fn default_code() -> i64 {
    -1
}

#[derive(Debug, Default, Deserialize)]
pub struct ApiData {
    pub title: Option<String>,
    pub cover: Option<String>,
    pub duration: Option<u32>,
    pub play: Option<String>,
    pub hdplay: Option<String>,
    pub author: Option<ApiAuthor>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ApiAuthor {
    pub nickname: Option<String>,
    pub unique_id: Option<String>,
}

impl ApiData {
    /// HD stream when offered, else the regular one
    pub fn media_url(&self) -> Option<&str> {
        self.hdplay
            .as_deref()
            .filter(|u| !u.is_empty())
            .or_else(|| self.play.as_deref().filter(|u| !u.is_empty()))
    }

    pub fn author_name(&self) -> Option<String> {
        let author = self.author.as_ref()?;
        author
            .nickname
            .clone()
            .or_else(|| author.unique_id.clone())
            .filter(|a| !a.trim().is_empty())
    }
}

/// Validates an API response and extracts its payload.
pub fn parse_api_response(response: ApiResponse) -> PipelineResult<ApiData> {
    if response.code != 0 {
        return Err(PipelineError::extraction(
            ExtractionFailure::Api,
            format!("TikTok API error {}: {}", response.code, response.msg),
        ));
    }
    let data = response
        .data
        .ok_or_else(|| PipelineError::extraction(ExtractionFailure::Api, "TikTok API returned no data"))?;
    if data.media_url().is_none() {
        return Err(PipelineError::extraction(
            ExtractionFailure::Api,
            "no media URL in TikTok API response",
        ));
    }
    Ok(data)
}

/// Resolves relative media links against the API endpoint.
pub fn absolutize(api_url: &str, media_url: &str) -> PipelineResult<String> {
    if media_url.starts_with("http://") || media_url.starts_with("https://") {
        return Ok(media_url.to_string());
    }
    let base = Url::parse(api_url)
        .map_err(|e| PipelineError::extraction(ExtractionFailure::Api, format!("bad API URL: {}", e)))?;
    base.join(media_url)
        .map(|u| u.to_string())
        .map_err(|e| PipelineError::extraction(ExtractionFailure::Api, format!("bad media URL: {}", e)))
}

/// Dedicated-API backend for TikTok
pub struct TikTokApiExtractor {
    client: Client,
    api_url: String,
    ffprobe_bin: String,
}

impl TikTokApiExtractor {
    pub fn new(api_url: impl Into<String>, ffprobe_bin: impl Into<String>) -> PipelineResult<Self> {
        let client = Client::builder()
            .user_agent(network::DEFAULT_USER_AGENT)
            .connect_timeout(tiktok::connect_timeout())
            .build()
            .map_err(|e| PipelineError::other(format!("HTTP client build failed: {}", e)))?;
        Ok(Self {
            client,
            api_url: api_url.into(),
            ffprobe_bin: ffprobe_bin.into(),
        })
    }

    /// Looks the page URL up and returns the validated payload.
    pub async fn lookup(&self, plan: &RetrievalPlan) -> PipelineResult<ApiData> {
        let response = self
            .client
            .post(&self.api_url)
            .form(&[("url", plan.url.as_str()), ("hd", "1")])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(PipelineError::extraction(
                ExtractionFailure::Api,
                format!("TikTok API HTTP {}", response.status()),
            ));
        }

        let body: ApiResponse = response.json().await?;
        parse_api_response(body)
    }

    /// Streams `media_url` into `dest`, reporting progress.
    async fn stream_to_file(
        &self,
        plan: &RetrievalPlan,
        media_url: &str,
        dest: &std::path::Path,
        progress: Option<ProgressCallback>,
    ) -> PipelineResult<u64> {
        let mut request = self.client.get(media_url);
        for (name, value) in &plan.identity.headers {
            request = request.header(name.as_str(), value.as_str());
        }
        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(PipelineError::extraction(
                ExtractionFailure::Api,
                format!("media download HTTP {}", response.status()),
            ));
        }

        let total_size = response.content_length().filter(|t| *t > 0);
        let mut reporter = ProgressReporter::with_step(progress, PROGRESS_STEP);
        let mut file = fs_err::tokio::File::create(dest).await?;
        let mut downloaded: u64 = 0;

        let mut stream = response.bytes_stream();
        while let Some(chunk_result) = stream.next().await {
            let chunk = chunk_result?;
            file.write_all(&chunk).await?;
            downloaded += chunk.len() as u64;

            if let Some(total) = total_size {
                let percent = ((downloaded as f64 / total as f64) * 100.0).min(100.0) as u8;
                reporter.report(percent);
            }
        }
        file.flush().await?;
        reporter.report(100);

        if downloaded == 0 {
            return Err(PipelineError::extraction(
                ExtractionFailure::FileMissing,
                "media download returned an empty body",
            ));
        }
        Ok(downloaded)
    }
}

#[async_trait]
impl MediaExtractor for TikTokApiExtractor {
    fn name(&self) -> &str {
        "tiktok-api"
    }

    fn handles(&self, strategy: Strategy) -> bool {
        strategy == Strategy::DirectApi(Site::TikTok)
    }

    async fn extract(
        &self,
        plan: &RetrievalPlan,
        job: &JobFiles,
        progress: Option<ProgressCallback>,
    ) -> PipelineResult<RawMedia> {
        log::info!("[{}] TikTok API lookup: {}", job.id(), plan.url);
        let data = self.lookup(plan).await?;
        let media_url = absolutize(&self.api_url, data.media_url().unwrap_or_default())?;

        let dest = job.raw_path("mp4");
        let size_bytes = match self.stream_to_file(plan, &media_url, &dest, progress).await {
            Ok(size) => size,
            Err(e) => {
                remove_file_quiet(&dest);
                return Err(e);
            }
        };
        log::info!(
            "[{}] TikTok media downloaded ({:.2} MB)",
            job.id(),
            size_bytes as f64 / (1024.0 * 1024.0)
        );

        let raw = RawMedia::builder()
            .path(dest)
            .maybe_title(data.title.clone().filter(|t| !t.trim().is_empty()))
            .maybe_author(data.author_name())
            .maybe_duration_secs(data.duration)
            .maybe_thumbnail_url(data.cover.clone())
            .size_bytes(size_bytes)
            .build();

        Ok(fill_missing_from_probe(raw, &self.ffprobe_bin).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(json: &str) -> ApiResponse {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_parse_ok_prefers_hd() {
        let data = parse_api_response(response(
            r#"{"code":0,"msg":"success","data":{"play":"https://cdn/p.mp4","hdplay":"https://cdn/hd.mp4",
                "duration":15,"title":"Dance","cover":"https://cdn/c.jpg",
                "author":{"nickname":"","unique_id":"dancer"}}}"#,
        ))
        .unwrap();
        assert_eq!(data.media_url(), Some("https://cdn/hd.mp4"));
        assert_eq!(data.author_name(), None);
        assert_eq!(data.duration, Some(15));
    }

    #[test]
    fn test_parse_author_fallback() {
        let data = parse_api_response(response(
            r#"{"code":0,"data":{"play":"https://cdn/p.mp4","hdplay":"","author":{"unique_id":"dancer"}}}"#,
        ))
        .unwrap();
        assert_eq!(data.media_url(), Some("https://cdn/p.mp4"));
        assert_eq!(data.author_name().as_deref(), Some("dancer"));
    }

    #[test]
    fn test_parse_api_error() {
        let err = parse_api_response(response(r#"{"code":-1,"msg":"Url parsing is failed!"}"#)).unwrap_err();
        assert_eq!(err.extraction_kind(), Some(ExtractionFailure::Api));
        assert!(err.to_string().contains("Url parsing is failed!"));
    }

    #[test]
    fn test_parse_missing_url() {
        let err = parse_api_response(response(r#"{"code":0,"data":{"title":"x"}}"#)).unwrap_err();
        assert_eq!(err.extraction_kind(), Some(ExtractionFailure::Api));
        assert!(parse_api_response(response(r#"{"msg":"?"}"#)).is_err());
    }

    #[test]
    fn test_absolutize() {
        assert_eq!(
            absolutize("https://www.tikwm.com/api/", "/video/media/play/1.mp4").unwrap(),
            "https://www.tikwm.com/video/media/play/1.mp4"
        );
        assert_eq!(absolutize("https://a/api/", "https://cdn/x.mp4").unwrap(), "https://cdn/x.mp4");
    }
}
