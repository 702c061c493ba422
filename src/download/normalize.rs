//! URL normalization
//!
//! Canonicalizes user-supplied links before any retrieval attempt: host
//! aliases collapse onto the primary host and short-form video paths expand
//! to the long-form watch URL. Pure and idempotent; anything that is not a
//! parseable http(s) URL passes through unchanged.

use once_cell::sync::Lazy;
use regex::Regex;
use url::Url;

/// Alias host → canonical host
const HOST_ALIASES: &[(&str, &str)] = &[
    ("youtube.com", "www.youtube.com"),
    ("m.youtube.com", "www.youtube.com"),
    ("instagram.com", "www.instagram.com"),
    ("instagr.am", "www.instagram.com"),
    ("m.instagram.com", "www.instagram.com"),
    ("tiktok.com", "www.tiktok.com"),
    ("m.tiktok.com", "www.tiktok.com"),
    ("m.vk.com", "vk.com"),
    ("www.vk.com", "vk.com"),
    ("vk.ru", "vk.com"),
    ("m.vk.ru", "vk.com"),
];

const YOUTUBE_SHORT_HOST: &str = "youtu.be";
const YOUTUBE_HOST: &str = "www.youtube.com";

/// Path prefixes on the canonical YouTube host that carry the video id as the next segment
const YOUTUBE_ID_PATHS: &[&str] = &["shorts", "live"];

/// Shape of a YouTube video id; anything else is left for the extractor to reject
#[allow(clippy::unwrap_used)]
static VIDEO_ID_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z0-9_-]{1,64}$").unwrap());

/// Canonical form of `url`.
///
/// `normalize(normalize(u)) == normalize(u)` for every input.
pub fn normalize(url: &str) -> String {
    let trimmed = url.trim();
    let Ok(mut parsed) = Url::parse(trimmed) else {
        return trimmed.to_string();
    };
    if !matches!(parsed.scheme(), "http" | "https") {
        return trimmed.to_string();
    }
    let Some(host) = parsed.host_str().map(str::to_ascii_lowercase) else {
        return trimmed.to_string();
    };

    if host == YOUTUBE_SHORT_HOST {
        return match first_segment(&parsed) {
            Some(id) => youtube_watch_url(&id),
            None => trimmed.to_string(),
        };
    }

    let canonical_host = canonical_host(&host);

    if canonical_host == YOUTUBE_HOST {
        if let Some(id) = youtube_path_id(&parsed) {
            return youtube_watch_url(&id);
        }
    }

    if canonical_host == host {
        return trimmed.to_string();
    }
    if parsed.set_host(Some(canonical_host)).is_err() {
        return trimmed.to_string();
    }
    let _ = parsed.set_scheme("https");
    parsed.to_string()
}

fn canonical_host(host: &str) -> &str {
    HOST_ALIASES
        .iter()
        .find(|(alias, _)| *alias == host)
        .map(|(_, canonical)| *canonical)
        .unwrap_or(host)
}

fn first_segment(url: &Url) -> Option<String> {
    url.path_segments()?
        .next()
        .filter(|segment| VIDEO_ID_REGEX.is_match(segment))
        .map(str::to_string)
}

/// `/shorts/<id>` and `/live/<id>` → `<id>`
fn youtube_path_id(url: &Url) -> Option<String> {
    let mut segments = url.path_segments()?;
    let kind = segments.next()?;
    if !YOUTUBE_ID_PATHS.contains(&kind) {
        return None;
    }
    segments.next().filter(|id| VIDEO_ID_REGEX.is_match(id)).map(str::to_string)
}

fn youtube_watch_url(id: &str) -> String {
    format!("https://{}/watch?v={}", YOUTUBE_HOST, id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_youtu_be_expands() {
        assert_eq!(normalize("https://youtu.be/abc123"), "https://www.youtube.com/watch?v=abc123");
        assert_eq!(
            normalize("https://youtu.be/abc123?si=tracking&t=5"),
            "https://www.youtube.com/watch?v=abc123"
        );
    }

    #[test]
    fn test_shorts_expand() {
        assert_eq!(
            normalize("https://youtube.com/shorts/xyz789?feature=share"),
            "https://www.youtube.com/watch?v=xyz789"
        );
        assert_eq!(
            normalize("https://www.youtube.com/shorts/xyz789/"),
            "https://www.youtube.com/watch?v=xyz789"
        );
        assert_eq!(normalize("https://m.youtube.com/live/L1"), "https://www.youtube.com/watch?v=L1");
    }

    #[test]
    fn test_host_aliases() {
        assert_eq!(
            normalize("https://m.youtube.com/watch?v=abc&t=10"),
            "https://www.youtube.com/watch?v=abc&t=10"
        );
        assert_eq!(normalize("https://vk.ru/video-1_2"), "https://vk.com/video-1_2");
        assert_eq!(normalize("https://instagr.am/reel/C1/"), "https://www.instagram.com/reel/C1/");
        assert_eq!(normalize("http://m.tiktok.com/@u/video/1"), "https://www.tiktok.com/@u/video/1");
    }

    #[test]
    fn test_canonical_unchanged() {
        for url in [
            "https://www.youtube.com/watch?v=abc123",
            "https://www.instagram.com/reel/C1/",
            "https://vk.com/video-1_2",
            "https://example.com/some/page?x=1",
        ] {
            assert_eq!(normalize(url), url);
        }
    }

    #[test]
    fn test_malformed_passes_through() {
        assert_eq!(normalize("not a url"), "not a url");
        assert_eq!(normalize("ftp://youtu.be/abc"), "ftp://youtu.be/abc");
        assert_eq!(normalize("https://youtu.be/"), "https://youtu.be/");
        assert_eq!(normalize(""), "");
        assert_eq!(normalize("https://youtu.be/%3Cx%3E"), "https://youtu.be/%3Cx%3E");
    }

    #[test]
    fn test_idempotent() {
        for url in [
            "https://youtu.be/abc123?si=1",
            "https://youtube.com/shorts/xyz",
            "https://M.YOUTUBE.COM/watch?v=q",
            "https://vk.ru",
            "https://instagram.com/p/x",
            "garbage",
            "  https://youtu.be/abc  ",
            "https://youtu.be/",
        ] {
            let once = normalize(url);
            assert_eq!(normalize(&once), once, "not idempotent for {}", url);
        }
    }
}
