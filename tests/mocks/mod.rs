//! Fake extraction backend
//!
//! Writes a raw file into the request's namespace (or fails) without any
//! network access, and records what it was asked to do.

#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::Mutex;

use reelpipe::core::{ExtractionFailure, PipelineError, PipelineResult};
use reelpipe::download::{JobFiles, MediaExtractor, ProgressCallback, RawMedia, RetrievalPlan, Strategy};

/// What the fake produces
#[derive(Debug, Clone)]
pub enum FakeOutcome {
    File {
        ext: &'static str,
        bytes: usize,
        duration_secs: u32,
        width: u32,
        height: u32,
    },
    /// Renders a real test-pattern clip (picture plus tone) with ffmpeg's lavfi sources
    Synthesized {
        ffmpeg: &'static str,
        seconds: u32,
        width: u32,
        height: u32,
    },
    /// Leaves a partial download behind, then fails
    Fail(ExtractionFailure, &'static str),
}

pub struct FakeExtractor {
    strategy: Strategy,
    outcome: FakeOutcome,
    calls: Mutex<Vec<RetrievalPlan>>,
}

impl FakeExtractor {
    pub fn new(strategy: Strategy, outcome: FakeOutcome) -> Self {
        Self {
            strategy,
            outcome,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn video(ext: &'static str, bytes: usize, duration_secs: u32) -> Self {
        Self::new(
            Strategy::GenericExtractor,
            FakeOutcome::File {
                ext,
                bytes,
                duration_secs,
                width: 1280,
                height: 720,
            },
        )
    }

    pub fn calls(&self) -> Vec<RetrievalPlan> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl MediaExtractor for FakeExtractor {
    fn name(&self) -> &str {
        "fake"
    }

    fn handles(&self, strategy: Strategy) -> bool {
        strategy == self.strategy
    }

    async fn extract(
        &self,
        plan: &RetrievalPlan,
        job: &JobFiles,
        progress: Option<ProgressCallback>,
    ) -> PipelineResult<RawMedia> {
        self.calls.lock().unwrap().push(plan.clone());

        match self.outcome {
            FakeOutcome::File {
                ext,
                bytes,
                duration_secs,
                width,
                height,
            } => {
                let path = job.raw_path(ext);
                std::fs::write(&path, vec![0u8; bytes])?;
                if let Some(cb) = progress {
                    cb("50%");
                    cb("100%");
                }
                Ok(RawMedia::builder()
                    .path(path)
                    .title("Fake clip")
                    .author("Fake author")
                    .duration_secs(duration_secs)
                    .width(width)
                    .height(height)
                    .thumbnail_url("https://img.example/t.jpg")
                    .size_bytes(bytes as u64)
                    .build())
            }
            FakeOutcome::Synthesized {
                ffmpeg,
                seconds,
                width,
                height,
            } => {
                let path = job.raw_path("mkv");
                let status = tokio::process::Command::new(ffmpeg)
                    .args(["-hide_banner", "-loglevel", "error", "-nostdin", "-y", "-f", "lavfi", "-i"])
                    .arg(format!("testsrc=size={}x{}:rate=25:duration={}", width, height, seconds))
                    .args(["-f", "lavfi", "-i"])
                    .arg(format!("sine=frequency=440:duration={}", seconds))
                    .args(["-c:v", "libx264", "-preset", "ultrafast", "-c:a", "aac", "-shortest"])
                    .arg(&path)
                    .status()
                    .await?;
                if !status.success() {
                    return Err(PipelineError::other("lavfi clip generation failed"));
                }
                Ok(RawMedia::builder()
                    .size_bytes(std::fs::metadata(&path)?.len())
                    .path(path)
                    .title("Test pattern")
                    .duration_secs(seconds)
                    .width(width)
                    .height(height)
                    .build())
            }
            FakeOutcome::Fail(kind, message) => {
                std::fs::write(job.raw_path("mp4.part"), b"half")?;
                Err(PipelineError::extraction(kind, message))
            }
        }
    }
}
