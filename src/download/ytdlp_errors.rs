//! Classification of yt-dlp diagnostics
//!
//! Maps the free-form stderr of a failed extraction onto an
//! [`ExtractionFailure`] kind and picks the line worth showing to the caller.

use crate::core::error::{ExtractionFailure, PipelineError};
use crate::core::process::tail_lines;

/// Analyzes yt-dlp stderr and determines the failure kind
pub fn analyze_ytdlp_error(stderr: &str) -> ExtractionFailure {
    let stderr_lower = stderr.to_lowercase();

    if stderr_lower.contains("is live")
        || stderr_lower.contains("live event will begin")
        || stderr_lower.contains("premieres in")
        || stderr_lower.contains("this live event")
    {
        return ExtractionFailure::LiveStream;
    }

    if stderr_lower.contains("cookies are no longer valid")
        || stderr_lower.contains("cookies have likely been rotated")
        || stderr_lower.contains("use --cookies-from-browser")
        || stderr_lower.contains("use --cookies for the authentication")
        || stderr_lower.contains("login required")
        || stderr_lower.contains("please sign in")
    {
        return ExtractionFailure::InvalidCookies;
    }

    if stderr_lower.contains("sign in to confirm you're not a bot")
        || stderr_lower.contains("bot detection")
        || stderr_lower.contains("http error 403")
        || stderr_lower.contains("http error 429")
        || stderr_lower.contains("rate-limit reached")
        || stderr_lower.contains("unable to extract")
        || stderr_lower.contains("signature extraction failed")
    {
        return ExtractionFailure::BotDetection;
    }

    if stderr_lower.contains("private video")
        || stderr_lower.contains("video unavailable")
        || stderr_lower.contains("this video is not available")
        || stderr_lower.contains("video is private")
        || stderr_lower.contains("has been removed")
        || stderr_lower.contains("does not exist")
        || stderr_lower.contains("available in your country")
        || stderr_lower.contains("not made this video available")
        || stderr_lower.contains("geo restriction")
        || stderr_lower.contains("http error 404")
        || stderr_lower.contains("unsupported url")
    {
        return ExtractionFailure::Unavailable;
    }

    if stderr_lower.contains("timed out")
        || stderr_lower.contains("timeout")
        || stderr_lower.contains("connection")
        || stderr_lower.contains("network")
        || stderr_lower.contains("socket")
        || stderr_lower.contains("dns")
        || stderr_lower.contains("failed to connect")
    {
        return ExtractionFailure::Network;
    }

    ExtractionFailure::Unknown
}

/// Picks the line a caller should see: the last `ERROR:` line, or the last line overall.
pub fn summarize_stderr(stderr: &str) -> String {
    stderr
        .lines()
        .rev()
        .map(str::trim)
        .find(|line| line.starts_with("ERROR:"))
        .map(|line| line.trim_start_matches("ERROR:").trim().to_string())
        .unwrap_or_else(|| tail_lines(stderr, 1))
}

/// Builds the typed error for a failed yt-dlp run.
pub fn extraction_error_from_stderr(stderr: &str, exit_code: Option<i32>) -> PipelineError {
    let kind = analyze_ytdlp_error(stderr);
    let summary = summarize_stderr(stderr);
    let message = if summary.is_empty() {
        format!("yt-dlp exited with code {:?}", exit_code)
    } else {
        summary
    };
    PipelineError::extraction(kind, message)
}

/// Operator hint logged alongside a failure
pub fn fix_recommendation(kind: ExtractionFailure) -> &'static str {
    match kind {
        ExtractionFailure::InvalidCookies => "Cookies are stale or missing: re-export them and update YTDL_COOKIES_FILE / INSTAGRAM_COOKIES_FILE",
        ExtractionFailure::BotDetection => "Platform flagged the client: refresh cookies and update yt-dlp",
        ExtractionFailure::Network => "Check connectivity to the platform",
        ExtractionFailure::Unknown => "Check the yt-dlp output above and make sure yt-dlp is up to date",
        ExtractionFailure::Unavailable
        | ExtractionFailure::LiveStream
        | ExtractionFailure::TooLarge
        | ExtractionFailure::FileMissing
        | ExtractionFailure::Api => "No action required",
    }
}

/// Whether the failure points at our setup rather than at the content
pub fn is_operator_issue(kind: ExtractionFailure) -> bool {
    matches!(
        kind,
        ExtractionFailure::InvalidCookies | ExtractionFailure::BotDetection | ExtractionFailure::Unknown
    )
}
