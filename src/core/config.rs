use once_cell::sync::Lazy;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::download::selector::Site;

/// Configuration constants for the pipeline
/// Cached yt-dlp binary path
/// Read once at startup from YTDL_BIN environment variable or defaults to "yt-dlp"
pub static YTDL_BIN: Lazy<String> = Lazy::new(|| env::var("YTDL_BIN").unwrap_or_else(|_| "yt-dlp".to_string()));

/// Cached ffmpeg binary path
/// Read from FFMPEG_BIN environment variable or defaults to "ffmpeg"
pub static FFMPEG_BIN: Lazy<String> = Lazy::new(|| env::var("FFMPEG_BIN").unwrap_or_else(|_| "ffmpeg".to_string()));

/// Cached ffprobe binary path
/// Read from FFPROBE_BIN environment variable or defaults to "ffprobe"
pub static FFPROBE_BIN: Lazy<String> =
    Lazy::new(|| env::var("FFPROBE_BIN").unwrap_or_else(|_| "ffprobe".to_string()));

/// Path to cookies file for YouTube
/// Read from YTDL_COOKIES_FILE environment variable
/// Optional: attached only when the file exists on disk at selection time
pub static YTDL_COOKIES_FILE: Lazy<Option<String>> = Lazy::new(|| non_empty_var("YTDL_COOKIES_FILE"));

/// Path to cookies file for Instagram
/// Read from INSTAGRAM_COOKIES_FILE environment variable
pub static INSTAGRAM_COOKIES_FILE: Lazy<Option<String>> = Lazy::new(|| non_empty_var("INSTAGRAM_COOKIES_FILE"));

/// Download folder path
/// Read from DOWNLOAD_FOLDER environment variable
/// Supports tilde (~) expansion for home directory
pub static DOWNLOAD_FOLDER: Lazy<String> =
    Lazy::new(|| env::var("DOWNLOAD_FOLDER").unwrap_or_else(|_| "~/downloads/reelpipe".to_string()));

/// Log file path
/// Read from LOG_FILE_PATH environment variable
/// Default: reelpipe.log
pub static LOG_FILE_PATH: Lazy<String> =
    Lazy::new(|| env::var("LOG_FILE_PATH").unwrap_or_else(|_| "reelpipe.log".to_string()));

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name).ok().and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

fn parse_var<T: std::str::FromStr>(name: &str, default: T) -> T {
    env::var(name).ok().and_then(|s| s.trim().parse().ok()).unwrap_or(default)
}

/// Expands `~` and returns an owned path.
pub fn expand_path(raw: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(raw).to_string())
}

/// Size ceilings for the two delivery transports
pub mod limits {
    use super::parse_var;
    use once_cell::sync::Lazy;

    const MB: u64 = 1024 * 1024;

    /// Synchronous delivery path (direct upload through the Bot API)
    /// Read from SIZE_CEILING_STANDARD_MB, default 45 MB (leaves room under the 50 MB API limit)
    pub static STANDARD_CEILING_BYTES: Lazy<u64> = Lazy::new(|| parse_var("SIZE_CEILING_STANDARD_MB", 45u64) * MB);

    /// Bulk-transfer path (local Bot API server / MTProto client)
    /// Read from SIZE_CEILING_BULK_MB, default 1900 MB
    pub static BULK_CEILING_BYTES: Lazy<u64> = Lazy::new(|| parse_var("SIZE_CEILING_BULK_MB", 1900u64) * MB);

    /// Sources announcing more than this are refused before download
    /// Read from MAX_SOURCE_SIZE_MB, default 4096 MB
    pub static MAX_SOURCE_BYTES: Lazy<u64> = Lazy::new(|| parse_var("MAX_SOURCE_SIZE_MB", 4096u64) * MB);

    /// Maximum characters of any error message handed to the caller
    pub const MAX_ERROR_CHARS: usize = 300;
}

/// Bot API server detection
///
/// A local Bot API server accepts far larger uploads, so its presence
/// switches the default delivery tier to bulk.
pub mod bot_api {
    /// Returns the BOT_API_URL environment variable if set.
    pub fn get_url() -> Option<String> {
        std::env::var("BOT_API_URL").ok()
    }

    /// Checks if the given URL string points to a local Bot API server.
    pub fn is_local_url(url: &str) -> bool {
        !url.contains("api.telegram.org")
    }

    /// Returns true if using a local Bot API server (not api.telegram.org).
    pub fn is_local() -> bool {
        get_url().map(|url| is_local_url(&url)).unwrap_or(false)
    }
}

/// Dedicated short-video API configuration
pub mod tiktok {
    use once_cell::sync::Lazy;
    use std::time::Duration;

    /// Lookup endpoint
    /// Read from TIKTOK_API_URL, default https://www.tikwm.com/api/
    pub static API_URL: Lazy<String> =
        Lazy::new(|| std::env::var("TIKTOK_API_URL").unwrap_or_else(|_| "https://www.tikwm.com/api/".to_string()));

    /// Connect timeout for the API client
    pub const CONNECT_TIMEOUT_SECS: u64 = 15;

    pub fn connect_timeout() -> Duration {
        Duration::from_secs(CONNECT_TIMEOUT_SECS)
    }
}

/// Network identity defaults
pub mod network {
    /// Desktop browser user-agent sent to every platform unless a site overrides it
    pub const DEFAULT_USER_AGENT: &str =
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";

    /// YouTube clients least likely to trigger the bot-detection challenge
    pub const YOUTUBE_PLAYER_CLIENTS: &str = "youtube:player_client=android_vr,web_safari;formats=missing_pot";
}

/// Transcode configuration
pub mod transcode {
    use super::parse_var;
    use once_cell::sync::Lazy;

    /// Timeout floor for any encoder run (seconds)
    pub static TIMEOUT_BASE_SECS: Lazy<u64> = Lazy::new(|| parse_var("TRANSCODE_TIMEOUT_BASE_SECS", 120u64));

    /// Extra seconds granted per second of media for full encodes
    pub static TIMEOUT_PER_MEDIA_SEC: Lazy<f64> = Lazy::new(|| parse_var("TRANSCODE_TIMEOUT_PER_MEDIA_SEC", 1.5f64));

    /// Timeout cap (seconds)
    pub static TIMEOUT_MAX_SECS: Lazy<u64> = Lazy::new(|| parse_var("TRANSCODE_TIMEOUT_MAX_SECS", 3600u64));

    /// Fraction of the size budget given to the video track
    pub const SAFETY_MARGIN: f64 = 0.85;

    /// Audio bitrate for recodes when the budget allows it
    pub const RECODE_AUDIO_BITRATE_BPS: u64 = 128_000;

    /// Lowest audio bitrate a recode will use
    pub const MIN_AUDIO_BITRATE_BPS: u64 = 16_000;

    /// Audio bitrate for audio extraction
    pub const AUDIO_EXTRACT_BITRATE: &str = "192k";

    /// Container every video deliverable ends up in
    pub const TARGET_VIDEO_CONTAINER: &str = "mp4";

    /// Extension of audio deliverables
    pub const TARGET_AUDIO_EXTENSION: &str = "mp3";

    /// Downscale ladder: (minimum video bitrate, maximum height)
    pub const HEIGHT_LADDER: &[(u64, u32)] = &[(2_500_000, u32::MAX), (1_000_000, 720), (500_000, 480), (0, 360)];
}

/// Sites whose content is always fully re-encoded
/// Read from FORCE_RECODE_SITES (comma separated), default "instagram"
pub static FORCE_RECODE_SITES: Lazy<Vec<Site>> = Lazy::new(|| {
    env::var("FORCE_RECODE_SITES")
        .map(|raw| parse_site_list(&raw))
        .unwrap_or_else(|_| vec![Site::Instagram])
});

/// Parses a comma/space separated list of site names, skipping unknown ones.
pub fn parse_site_list(raw: &str) -> Vec<Site> {
    raw.split([',', ' ', '\n', '\t'])
        .filter_map(|part| part.trim().parse::<Site>().ok())
        .collect()
}

/// Encoder timeout policy.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TranscodeTimeouts {
    pub base: Duration,
    pub per_media_second: f64,
    pub max: Duration,
}

impl TranscodeTimeouts {
    pub fn from_env() -> Self {
        Self {
            base: Duration::from_secs(*transcode::TIMEOUT_BASE_SECS),
            per_media_second: *transcode::TIMEOUT_PER_MEDIA_SEC,
            max: Duration::from_secs(*transcode::TIMEOUT_MAX_SECS),
        }
    }
}

/// Owned configuration snapshot handed to the pipeline.
///
/// Built from the environment by [`PipelineConfig::from_env`]; tests
/// construct it directly so nothing depends on process-wide state.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub download_dir: PathBuf,
    pub ytdlp_bin: String,
    pub ffmpeg_bin: String,
    pub ffprobe_bin: String,
    pub youtube_cookies: Option<PathBuf>,
    pub instagram_cookies: Option<PathBuf>,
    pub tiktok_api_url: String,
    pub standard_ceiling_bytes: u64,
    pub bulk_ceiling_bytes: u64,
    pub max_source_bytes: u64,
    pub force_recode_sites: Vec<Site>,
    pub bulk_by_default: bool,
    pub timeouts: TranscodeTimeouts,
}

impl PipelineConfig {
    pub fn from_env() -> Self {
        Self {
            download_dir: expand_path(&DOWNLOAD_FOLDER),
            ytdlp_bin: YTDL_BIN.clone(),
            ffmpeg_bin: FFMPEG_BIN.clone(),
            ffprobe_bin: FFPROBE_BIN.clone(),
            youtube_cookies: YTDL_COOKIES_FILE.as_deref().map(expand_path),
            instagram_cookies: INSTAGRAM_COOKIES_FILE.as_deref().map(expand_path),
            tiktok_api_url: tiktok::API_URL.clone(),
            standard_ceiling_bytes: *limits::STANDARD_CEILING_BYTES,
            bulk_ceiling_bytes: *limits::BULK_CEILING_BYTES,
            max_source_bytes: *limits::MAX_SOURCE_BYTES,
            force_recode_sites: FORCE_RECODE_SITES.clone(),
            bulk_by_default: bot_api::is_local(),
            timeouts: TranscodeTimeouts::from_env(),
        }
    }

    /// Configuration rooted at `download_dir` with stock tool names and limits.
    pub fn with_download_dir(download_dir: impl Into<PathBuf>) -> Self {
        Self {
            download_dir: download_dir.into(),
            ytdlp_bin: "yt-dlp".to_string(),
            ffmpeg_bin: "ffmpeg".to_string(),
            ffprobe_bin: "ffprobe".to_string(),
            youtube_cookies: None,
            instagram_cookies: None,
            tiktok_api_url: "https://www.tikwm.com/api/".to_string(),
            standard_ceiling_bytes: 45 * 1024 * 1024,
            bulk_ceiling_bytes: 1900 * 1024 * 1024,
            max_source_bytes: 4096 * 1024 * 1024,
            force_recode_sites: vec![Site::Instagram],
            bulk_by_default: false,
            timeouts: TranscodeTimeouts {
                base: Duration::from_secs(120),
                per_media_second: 1.5,
                max: Duration::from_secs(3600),
            },
        }
    }
}
