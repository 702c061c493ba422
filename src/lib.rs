//! reelpipe - media acquisition and transcode pipeline for chat-bot delivery
//!
//! Takes a user-supplied video URL (YouTube, TikTok, Instagram, VK, or
//! anything yt-dlp understands), pulls the media down, and hands back a file
//! that fits the delivery transport's size ceiling.
//!
//! # Module Structure
//!
//! - `core`: configuration, errors, logging, metrics, subprocess helpers
//! - `download`: URL normalization, strategy selection, extractors
//! - `transcode`: decision engine, ffmpeg executor, ffprobe helpers
//! - `pipeline`: the `download()` entry point and result assembly

pub mod core;
pub mod download;
pub mod pipeline;
pub mod transcode;

// Re-export commonly used types for convenience
pub use core::{config, PipelineConfig, PipelineError, PipelineResult};
pub use download::{normalize, Mode, ProgressCallback};
pub use pipeline::{download, MediaResult, Pipeline};
pub use transcode::{SizeTier, TranscodePlan};
