use strum::{Display, EnumString, IntoStaticStr};
use thiserror::Error;

use crate::core::config::limits::MAX_ERROR_CHARS;

/// Why an extraction attempt failed.
///
/// Derived from the extractor's diagnostic output (see
/// [`crate::download::ytdlp_errors::analyze_ytdlp_error`]) or set directly
/// by the stage that detected the problem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum ExtractionFailure {
    /// Cookies are missing, expired, or rejected
    InvalidCookies,
    /// Platform asked for a challenge / flagged the client as a bot
    BotDetection,
    /// Removed, private, geo-blocked, or otherwise unavailable content
    Unavailable,
    /// Network problems (timeouts, resets, DNS)
    Network,
    /// Live broadcasts can't be downloaded as a finished file
    LiveStream,
    /// Source announced a size above the acceptable maximum
    TooLarge,
    /// The extractor reported success but no file materialized
    FileMissing,
    /// Dedicated API answered with an error or an unusable payload
    Api,
    Unknown,
}

/// Closed error taxonomy returned by the pipeline.
///
/// Every message is bounded to [`MAX_ERROR_CHARS`] characters so callers can
/// display it without further sanitizing.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Upstream refused, content unavailable, or nothing landed on disk
    #[error("Extraction error ({kind}): {message}")]
    Extraction { kind: ExtractionFailure, message: String },

    /// Encoder exited with a non-zero status
    #[error("Transcode error: {0}")]
    Transcode(String),

    /// Encoder exceeded its wall-clock budget
    #[error("Transcode timed out after {seconds}s")]
    TranscodeTimeout { seconds: u64 },

    /// Filesystem, parsing, and other unclassified failures
    #[error("Pipeline error: {0}")]
    Other(String),
}

/// Type alias for Result with PipelineError
pub type PipelineResult<T> = Result<T, PipelineError>;

impl PipelineError {
    pub fn extraction(kind: ExtractionFailure, message: impl AsRef<str>) -> Self {
        PipelineError::Extraction {
            kind,
            message: truncate_message(message.as_ref()),
        }
    }

    pub fn transcode(message: impl AsRef<str>) -> Self {
        PipelineError::Transcode(truncate_message(message.as_ref()))
    }

    pub fn other(message: impl AsRef<str>) -> Self {
        PipelineError::Other(truncate_message(message.as_ref()))
    }

    /// Short static label, used for metrics and front-end message lookup.
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::Extraction { kind, .. } => kind.into(),
            PipelineError::Transcode(_) => "transcode",
            PipelineError::TranscodeTimeout { .. } => "transcode_timeout",
            PipelineError::Other(_) => "other",
        }
    }

    /// Extraction failure kind, if this is an extraction error.
    pub fn extraction_kind(&self) -> Option<ExtractionFailure> {
        match self {
            PipelineError::Extraction { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}

impl From<std::io::Error> for PipelineError {
    fn from(err: std::io::Error) -> Self {
        PipelineError::other(format!("IO error: {}", err))
    }
}

impl From<serde_json::Error> for PipelineError {
    fn from(err: serde_json::Error) -> Self {
        PipelineError::other(format!("Malformed JSON: {}", err))
    }
}

impl From<tokio::task::JoinError> for PipelineError {
    fn from(err: tokio::task::JoinError) -> Self {
        PipelineError::other(format!("Worker task failed: {}", err))
    }
}

impl From<reqwest::Error> for PipelineError {
    fn from(err: reqwest::Error) -> Self {
        let kind = if err.is_timeout() || err.is_connect() {
            ExtractionFailure::Network
        } else {
            ExtractionFailure::Api
        };
        PipelineError::extraction(kind, format!("HTTP error: {}", err))
    }
}

/// Cuts `message` to at most [`MAX_ERROR_CHARS`] characters on a char boundary.
///
/// Truncated messages end with an ellipsis so the reader can tell.
pub fn truncate_message(message: &str) -> String {
    let trimmed = message.trim();
    if trimmed.chars().count() <= MAX_ERROR_CHARS {
        return trimmed.to_string();
    }
    let mut out: String = trimmed.chars().take(MAX_ERROR_CHARS - 1).collect();
    out.push('…');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_message_short_is_unchanged() {
        assert_eq!(truncate_message("  boom \n"), "boom");
    }

    #[test]
    fn test_truncate_message_long_is_bounded() {
        let long = "x".repeat(5_000);
        let out = truncate_message(&long);
        assert_eq!(out.chars().count(), MAX_ERROR_CHARS);
        assert!(out.ends_with('…'));
    }

    #[test]
    fn test_truncate_message_multibyte() {
        let long = "ошибка ".repeat(200);
        let out = truncate_message(&long);
        assert_eq!(out.chars().count(), MAX_ERROR_CHARS);
    }

    #[test]
    fn test_constructors_truncate() {
        let err = PipelineError::transcode("e".repeat(1_000));
        match err {
            PipelineError::Transcode(msg) => assert_eq!(msg.chars().count(), MAX_ERROR_CHARS),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_kind_labels() {
        assert_eq!(
            PipelineError::extraction(ExtractionFailure::BotDetection, "x").kind(),
            "bot_detection"
        );
        assert_eq!(PipelineError::transcode("x").kind(), "transcode");
        assert_eq!(PipelineError::TranscodeTimeout { seconds: 3 }.kind(), "transcode_timeout");
        assert_eq!(PipelineError::other("x").kind(), "other");
    }

    #[test]
    fn test_io_error_becomes_other() {
        let err: PipelineError = std::io::Error::new(std::io::ErrorKind::NotFound, "gone").into();
        assert_eq!(err.kind(), "other");
        assert!(err.to_string().contains("gone"));
    }

    #[test]
    fn test_failure_parses_from_label() {
        assert_eq!("live_stream".parse::<ExtractionFailure>().ok(), Some(ExtractionFailure::LiveStream));
    }
}
