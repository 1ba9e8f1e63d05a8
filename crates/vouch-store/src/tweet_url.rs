//! Tweet URL parsing and normalization.
//!
//! Duplicate detection compares normalized URL keys: the numeric status id
//! when the URL carries a `/status/<digits>` segment, otherwise the
//! lower-cased URL with any trailing slashes removed.

use std::sync::OnceLock;

use regex::Regex;

fn tweet_url_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)^https?://(www\.)?(twitter\.com|x\.com)/.+/status/\d+")
            .expect("static pattern")
    })
}

fn status_id_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)/status/(\d+)").expect("static pattern"))
}

fn share_suffix_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\?s=\d+$").expect("static pattern"))
}

/// Whether the string looks like a twitter.com / x.com status URL.
pub fn is_tweet_url(url: &str) -> bool {
    tweet_url_re().is_match(url.trim())
}

/// Extract the numeric status id from a tweet URL, if present.
pub fn status_id(url: &str) -> Option<String> {
    status_id_re()
        .captures(url.trim())
        .map(|caps| caps[1].to_string())
}

/// Normalize a tweet URL into its duplicate-comparison key.
pub fn normalize(url: &str) -> String {
    let lowered = url.trim().to_lowercase();
    let trimmed = lowered.trim_end_matches('/');
    match status_id(trimmed) {
        Some(id) => id,
        None => trimmed.to_string(),
    }
}

/// Remove a trailing `?s=<digits>` share suffix pasted from the mobile apps.
pub fn strip_share_suffix(url: &str) -> String {
    share_suffix_re().replace(url.trim(), "").into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognizes_status_urls() {
        assert!(is_tweet_url("https://x.com/alice/status/123"));
        assert!(is_tweet_url("http://www.twitter.com/alice/status/123"));
        assert!(is_tweet_url("https://X.com/alice/status/123/"));
        assert!(!is_tweet_url("https://x.com/alice"));
        assert!(!is_tweet_url("https://example.com/alice/status/123"));
    }

    #[test]
    fn extracts_status_id() {
        assert_eq!(
            status_id("https://x.com/alice/status/123").as_deref(),
            Some("123")
        );
        assert_eq!(
            status_id("https://x.com/alice/STATUS/456?ref=1").as_deref(),
            Some("456")
        );
        assert_eq!(status_id("https://x.com/alice"), None);
    }

    #[test]
    fn normalize_prefers_status_id() {
        assert_eq!(normalize("https://X.com/alice/status/123/"), "123");
        assert_eq!(normalize("https://x.com/alice/status/123"), "123");
        // No recognizable id: falls back to the cleaned URL string.
        assert_eq!(normalize("https://X.com/Alice/"), "https://x.com/alice");
    }

    #[test]
    fn strips_share_suffix() {
        assert_eq!(
            strip_share_suffix("https://x.com/a/status/1?s=20"),
            "https://x.com/a/status/1"
        );
        assert_eq!(
            strip_share_suffix("https://x.com/a/status/1?lang=en"),
            "https://x.com/a/status/1?lang=en"
        );
    }
}
