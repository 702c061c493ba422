//! Retrieval strategy selection
//!
//! Classifies a normalized URL against an ordered site table and produces an
//! immutable [`RetrievalPlan`]: which extractor to use, the network identity
//! to present, and the format expression to request.

use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use strum::{Display, EnumString, IntoStaticStr};
use url::Url;

use crate::core::config::{network, PipelineConfig};

/// Platforms with site-specific handling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, IntoStaticStr, Serialize)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
#[serde(rename_all = "lowercase")]
pub enum Site {
    TikTok,
    Instagram,
    YouTube,
    Vk,
    Other,
}

/// Requested output kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, EnumString, IntoStaticStr, Serialize)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    #[default]
    Video,
    Audio,
}

/// How the media is pulled from upstream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Strategy {
    /// yt-dlp with site-tuned options
    GenericExtractor,
    /// Dedicated lightweight HTTP API for one platform
    DirectApi(Site),
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Strategy::GenericExtractor => write!(f, "generic-extractor"),
            Strategy::DirectApi(site) => write!(f, "direct-api:{}", site),
        }
    }
}

/// Caller input for one pipeline invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaRequest {
    pub url: String,
    pub mode: Mode,
    /// Target vertical resolution; `None` means best available
    pub quality: Option<u32>,
}

impl MediaRequest {
    pub fn new(url: impl Into<String>, mode: Mode, quality: Option<&str>) -> Self {
        Self {
            url: url.into(),
            mode,
            quality: parse_quality(quality),
        }
    }
}

/// Parses quality hints such as "720", "720p" or "best".
///
/// Unparseable or zero values are treated as "best available".
pub fn parse_quality(raw: Option<&str>) -> Option<u32> {
    let raw = raw?.trim();
    if raw.is_empty() || raw.eq_ignore_ascii_case("best") {
        return None;
    }
    match raw.trim_end_matches(['p', 'P']).parse::<u32>() {
        Ok(0) => None,
        Ok(height) => Some(height),
        Err(_) => {
            log::warn!("Ignoring unrecognized quality hint '{}'", raw);
            None
        }
    }
}

/// User-agent, cookies, and headers presented to the platform
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NetworkIdentity {
    pub user_agent: String,
    pub cookie_file: Option<PathBuf>,
    pub headers: Vec<(String, String)>,
    /// Raw `--extractor-args` value for yt-dlp
    pub extractor_args: Option<String>,
}

impl Default for NetworkIdentity {
    fn default() -> Self {
        Self {
            user_agent: network::DEFAULT_USER_AGENT.to_string(),
            cookie_file: None,
            headers: Vec::new(),
            extractor_args: None,
        }
    }
}

impl NetworkIdentity {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// Everything the extractor needs for one request
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RetrievalPlan {
    pub url: String,
    pub site: Site,
    pub strategy: Strategy,
    pub identity: NetworkIdentity,
    pub format: String,
    pub mode: Mode,
    pub quality: Option<u32>,
    pub is_sensitive_source: bool,
}

impl RetrievalPlan {
    /// Same plan routed through the generic extractor.
    pub fn as_generic(&self) -> Self {
        Self {
            strategy: Strategy::GenericExtractor,
            ..self.clone()
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum CookieSource {
    None,
    YouTube,
    Instagram,
}

/// One row of the site table
struct SiteRule {
    site: Site,
    domains: &'static [&'static str],
    direct_api: bool,
    referer: Option<&'static str>,
    send_origin: bool,
    cookies: CookieSource,
    extractor_args: Option<&'static str>,
}

/// Checked top to bottom; first match wins.
const SITE_RULES: &[SiteRule] = &[
    SiteRule {
        site: Site::TikTok,
        domains: &["tiktok.com"],
        direct_api: true,
        referer: Some("https://www.tiktok.com/"),
        send_origin: false,
        cookies: CookieSource::None,
        extractor_args: None,
    },
    SiteRule {
        site: Site::Instagram,
        domains: &["instagram.com", "instagr.am"],
        direct_api: false,
        referer: Some("https://www.instagram.com/"),
        send_origin: true,
        cookies: CookieSource::Instagram,
        extractor_args: None,
    },
    SiteRule {
        site: Site::YouTube,
        domains: &["youtube.com", "youtu.be", "youtube-nocookie.com"],
        direct_api: false,
        referer: None,
        send_origin: false,
        cookies: CookieSource::YouTube,
        extractor_args: Some(network::YOUTUBE_PLAYER_CLIENTS),
    },
    SiteRule {
        site: Site::Vk,
        domains: &["vk.com", "vk.ru", "vkvideo.ru"],
        direct_api: false,
        referer: Some("https://vk.com/"),
        send_origin: false,
        cookies: CookieSource::None,
        extractor_args: None,
    },
];

fn host_matches(host: &str, domain: &str) -> bool {
    host == domain || host.strip_suffix(domain).is_some_and(|prefix| prefix.ends_with('.'))
}

fn find_rule(url: &str) -> Option<&'static SiteRule> {
    let host = Url::parse(url).ok()?.host_str()?.to_ascii_lowercase();
    SITE_RULES
        .iter()
        .find(|rule| rule.domains.iter().any(|domain| host_matches(&host, domain)))
}

/// Site a URL belongs to.
pub fn detect_site(url: &str) -> Site {
    find_rule(url).map(|rule| rule.site).unwrap_or(Site::Other)
}

/// Standard heights offered as fallbacks below the requested one
const STANDARD_HEIGHTS: &[u32] = &[2160, 1440, 1080, 720, 480, 360, 240, 144];

/// Format expression for video mode.
///
/// With a height: the requested height first, then each lower standard
/// height, preferring H.264 + AAC at every step; then any split streams at or
/// below the height, then the best combined stream.
pub fn video_format(quality: Option<u32>) -> String {
    let Some(height) = quality else {
        return "bv*[vcodec^=avc1]+ba[acodec^=mp4a]/bv*[ext=mp4]+ba[ext=m4a]/bv*+ba/b".to_string();
    };

    let mut heights = vec![height];
    heights.extend(STANDARD_HEIGHTS.iter().copied().filter(|&h| h < height));

    let mut parts: Vec<String> = Vec::new();
    for h in heights {
        let filt = format!("[height<={h}]");
        parts.push(format!("bv*{filt}[vcodec^=avc1]+ba[acodec^=mp4a]"));
        parts.push(format!("bv*{filt}[ext=mp4]+ba[ext=m4a]"));
    }
    parts.push(format!("bv*[height<={height}]+ba"));
    parts.push(format!("b[height<={height}]"));
    parts.push("b".to_string());
    parts.join("/")
}

/// Format expression for audio mode
pub const AUDIO_FORMAT: &str = "ba[acodec^=mp4a]/ba/b";

/// Builds retrieval plans.
///
/// Holds only read-only configuration; the one side effect of selection is
/// checking whether an optional cookie file exists.
#[derive(Debug, Clone)]
pub struct StrategySelector {
    youtube_cookies: Option<PathBuf>,
    instagram_cookies: Option<PathBuf>,
    force_recode_sites: Vec<Site>,
}

impl StrategySelector {
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            youtube_cookies: config.youtube_cookies.clone(),
            instagram_cookies: config.instagram_cookies.clone(),
            force_recode_sites: config.force_recode_sites.clone(),
        }
    }

    fn cookie_file(&self, source: CookieSource) -> Option<PathBuf> {
        let path = match source {
            CookieSource::None => return None,
            CookieSource::YouTube => self.youtube_cookies.as_deref(),
            CookieSource::Instagram => self.instagram_cookies.as_deref(),
        }?;
        existing_file(path)
    }

    /// Plan for an already normalized request.
    pub fn select(&self, request: &MediaRequest) -> RetrievalPlan {
        let rule = find_rule(&request.url);
        let site = rule.map(|r| r.site).unwrap_or(Site::Other);

        let mut identity = NetworkIdentity::default();
        let mut strategy = Strategy::GenericExtractor;

        if let Some(rule) = rule {
            if rule.direct_api {
                strategy = Strategy::DirectApi(rule.site);
            }
            if let Some(referer) = rule.referer {
                identity.headers.push(("Referer".to_string(), referer.to_string()));
                if rule.send_origin {
                    identity
                        .headers
                        .push(("Origin".to_string(), referer.trim_end_matches('/').to_string()));
                }
            }
            identity.cookie_file = self.cookie_file(rule.cookies);
            identity.extractor_args = rule.extractor_args.map(str::to_string);
        }

        let format = match request.mode {
            Mode::Video => video_format(request.quality),
            Mode::Audio => AUDIO_FORMAT.to_string(),
        };

        RetrievalPlan {
            url: request.url.clone(),
            site,
            strategy,
            identity,
            format,
            mode: request.mode,
            quality: request.quality,
            is_sensitive_source: self.force_recode_sites.contains(&site),
        }
    }
}

fn existing_file(path: &Path) -> Option<PathBuf> {
    if path.is_file() {
        Some(path.to_path_buf())
    } else {
        log::debug!("Cookie file {} not present, continuing without it", path.display());
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::NamedTempFile;

    fn selector() -> StrategySelector {
        StrategySelector::new(&PipelineConfig::with_download_dir("/tmp"))
    }

    fn video(url: &str, quality: Option<&str>) -> MediaRequest {
        MediaRequest::new(url, Mode::Video, quality)
    }

    #[test]
    fn test_parse_quality() {
        assert_eq!(parse_quality(Some("720")), Some(720));
        assert_eq!(parse_quality(Some(" 1080p ")), Some(1080));
        assert_eq!(parse_quality(Some("best")), None);
        assert_eq!(parse_quality(Some("0")), None);
        assert_eq!(parse_quality(Some("hd")), None);
        assert_eq!(parse_quality(None), None);
    }

    #[test]
    fn test_detect_site() {
        assert_eq!(detect_site("https://www.tiktok.com/@u/video/1"), Site::TikTok);
        assert_eq!(detect_site("https://vm.tiktok.com/ZMabc/"), Site::TikTok);
        assert_eq!(detect_site("https://www.instagram.com/reel/x/"), Site::Instagram);
        assert_eq!(detect_site("https://music.youtube.com/watch?v=a"), Site::YouTube);
        assert_eq!(detect_site("https://vk.com/video-1_2"), Site::Vk);
        assert_eq!(detect_site("https://notyoutube.com/watch"), Site::Other);
        assert_eq!(detect_site("garbage"), Site::Other);
    }

    #[test]
    fn test_strategy_display() {
        assert_eq!(Strategy::GenericExtractor.to_string(), "generic-extractor");
        assert_eq!(Strategy::DirectApi(Site::TikTok).to_string(), "direct-api:tiktok");
    }

    #[test]
    fn test_tiktok_uses_direct_api() {
        let plan = selector().select(&video("https://www.tiktok.com/@u/video/1", None));
        assert_eq!(plan.strategy, Strategy::DirectApi(Site::TikTok));
        assert_eq!(plan.as_generic().strategy, Strategy::GenericExtractor);
    }

    #[test]
    fn test_instagram_headers_and_cookies() {
        let cookies = NamedTempFile::new().unwrap();
        let mut config = PipelineConfig::with_download_dir("/tmp");
        config.instagram_cookies = Some(cookies.path().to_path_buf());
        let plan = StrategySelector::new(&config).select(&video("https://www.instagram.com/reel/x/", None));

        assert_eq!(plan.strategy, Strategy::GenericExtractor);
        assert_eq!(plan.identity.header("referer"), Some("https://www.instagram.com/"));
        assert_eq!(plan.identity.header("Origin"), Some("https://www.instagram.com"));
        assert_eq!(plan.identity.cookie_file.as_deref(), Some(cookies.path()));
        assert!(plan.is_sensitive_source);
    }

    #[test]
    fn test_missing_cookie_file_is_skipped() {
        let mut config = PipelineConfig::with_download_dir("/tmp");
        config.youtube_cookies = Some("/nonexistent/cookies.txt".into());
        let plan = StrategySelector::new(&config).select(&video("https://www.youtube.com/watch?v=a", None));
        assert_eq!(plan.identity.cookie_file, None);
        assert_eq!(plan.identity.extractor_args.as_deref(), Some(network::YOUTUBE_PLAYER_CLIENTS));
        assert!(!plan.is_sensitive_source);
    }

    #[test]
    fn test_unknown_site_gets_defaults() {
        let plan = selector().select(&video("https://example.com/clip.mp4", None));
        assert_eq!(plan.site, Site::Other);
        assert_eq!(plan.strategy, Strategy::GenericExtractor);
        assert_eq!(plan.identity, NetworkIdentity::default());
    }

    #[test]
    fn test_selection_is_deterministic() {
        let s = selector();
        let request = video("https://vk.com/video-1_2", Some("480"));
        assert_eq!(s.select(&request), s.select(&request));
    }

    #[test]
    fn test_video_format_with_height() {
        let format = video_format(Some(720));
        assert!(format.starts_with("bv*[height<=720][vcodec^=avc1]+ba[acodec^=mp4a]/"));
        assert!(format.contains("bv*[height<=480][vcodec^=avc1]"));
        assert!(!format.contains("[height<=1080]"));
        assert!(format.ends_with("/bv*[height<=720]+ba/b[height<=720]/b"));
    }

    #[test]
    fn test_video_format_nonstandard_height() {
        let format = video_format(Some(600));
        let first_480 = format.find("[height<=480]").unwrap();
        let first_600 = format.find("[height<=600]").unwrap();
        assert!(first_600 < first_480);
    }

    #[test]
    fn test_audio_mode_format() {
        let plan = selector().select(&MediaRequest::new("https://www.youtube.com/watch?v=a", Mode::Audio, Some("720")));
        assert_eq!(plan.format, AUDIO_FORMAT);
    }

    #[test]
    fn test_mode_parse() {
        assert_eq!("AUDIO".parse::<Mode>().ok(), Some(Mode::Audio));
        assert_eq!(Mode::default(), Mode::Video);
    }
}
