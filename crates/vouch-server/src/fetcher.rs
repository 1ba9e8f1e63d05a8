//! Best-effort tweet metadata fetcher.
//!
//! Resolves a tweet URL to author name, handle, text, and a candidate avatar
//! via the public oEmbed endpoint.  Every network call carries its own
//! timeout.  A missing avatar is never fatal; the caller falls back to a
//! manual upload.

use std::sync::OnceLock;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::Utc;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use vouch_store::tweet_url;

use crate::avatar_store::{AvatarStore, MAX_AVATAR_SIZE_BYTES};
use crate::error::ApiError;

const OEMBED_BASE: &str = "https://publish.twitter.com/oembed";
const AVATAR_FALLBACK_BASE: &str = "https://unavatar.io/twitter";

const OEMBED_TIMEOUT: Duration = Duration::from_secs(10);
const AVATAR_TIMEOUT: Duration = Duration::from_secs(8);

/// Metadata resolved for a tweet URL.  `avatar_token` names a staged file in
/// the avatar store; `avatar_data_url` is an inline preview of the same
/// bytes.  Both are `None` when no avatar could be fetched.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchedTweet {
    pub author_name: String,
    pub handle: String,
    pub tweet_text: String,
    pub date: String,
    pub avatar_token: Option<String>,
    pub avatar_data_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OembedResponse {
    author_name: Option<String>,
    author_url: Option<String>,
    html: Option<String>,
}

struct StagedAvatar {
    token: String,
    data_url: String,
}

pub struct TweetFetcher {
    client: reqwest::Client,
}

impl TweetFetcher {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    /// Resolve a tweet URL against the oEmbed service.
    ///
    /// Connection failure surfaces as a retryable [`ApiError::Upstream`];
    /// a non-success status means the tweet is gone ([`ApiError::NotFound`]).
    pub async fn fetch(
        &self,
        raw_url: &str,
        avatars: &AvatarStore,
    ) -> Result<FetchedTweet, ApiError> {
        let url = tweet_url::strip_share_suffix(raw_url);
        if url.is_empty() {
            return Err(ApiError::InvalidArgument("Missing url".to_string()));
        }
        if !tweet_url::is_tweet_url(&url) {
            return Err(ApiError::InvalidArgument(
                "Invalid Twitter/X tweet URL".to_string(),
            ));
        }

        let res = self
            .client
            .get(OEMBED_BASE)
            .query(&[("url", url.as_str())])
            .header(reqwest::header::ACCEPT, "application/json")
            .timeout(OEMBED_TIMEOUT)
            .send()
            .await
            .map_err(|e| {
                debug!(error = %e, "oEmbed request failed");
                ApiError::Upstream("Could not reach Twitter. Try again.".to_string())
            })?;

        if !res.status().is_success() {
            return Err(ApiError::NotFound(
                "Tweet not found or unavailable.".to_string(),
            ));
        }

        let data: OembedResponse = res
            .json()
            .await
            .map_err(|_| ApiError::Upstream("Invalid response from Twitter.".to_string()))?;

        let author_name = match data.author_name.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => "Unknown".to_string(),
        };
        let handle = data
            .author_url
            .as_deref()
            .map(extract_handle)
            .unwrap_or_default();
        let tweet_text = data
            .html
            .as_deref()
            .map(extract_tweet_text)
            .unwrap_or_default();
        let today = Utc::now().format("%Y-%m-%d").to_string();

        // Avatar is best-effort: the embed markup first, then the
        // by-handle fallback service.  Both failing is not an error.
        let mut avatar = None;
        if let Some(src) = data.html.as_deref().and_then(first_img_src) {
            avatar = self.try_fetch_avatar(&src, avatars).await;
        }
        if avatar.is_none() && !handle.is_empty() {
            let username = handle.trim_start_matches('@');
            let fallback = format!("{AVATAR_FALLBACK_BASE}/{username}");
            avatar = self.try_fetch_avatar(&fallback, avatars).await;
        }

        let (avatar_token, avatar_data_url) = match avatar {
            Some(staged) => (Some(staged.token), Some(staged.data_url)),
            None => (None, None),
        };

        Ok(FetchedTweet {
            handle: if handle.is_empty() {
                author_name.clone()
            } else {
                handle
            },
            author_name,
            tweet_text: if tweet_text.is_empty() {
                "—".to_string()
            } else {
                tweet_text
            },
            date: today,
            avatar_token,
            avatar_data_url,
        })
    }

    /// Download an avatar candidate and stage it.  Any failure, oversize, or
    /// empty body just yields `None`.
    async fn try_fetch_avatar(&self, url: &str, avatars: &AvatarStore) -> Option<StagedAvatar> {
        if !url.starts_with("http") {
            return None;
        }

        let res = self
            .client
            .get(url)
            .timeout(AVATAR_TIMEOUT)
            .send()
            .await
            .ok()?;
        if !res.status().is_success() {
            return None;
        }

        let bytes = res.bytes().await.ok()?;
        if bytes.is_empty() || bytes.len() > MAX_AVATAR_SIZE_BYTES {
            return None;
        }

        let ext = if url.contains("png") { ".png" } else { ".jpg" };
        let token = avatars.stage(&bytes, ext).await.ok()?;

        let mime = if ext == ".png" {
            "image/png"
        } else {
            "image/jpeg"
        };
        let data_url = format!("data:{mime};base64,{}", BASE64.encode(&bytes));

        Some(StagedAvatar { token, data_url })
    }
}

impl Default for TweetFetcher {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Markup helpers
// ---------------------------------------------------------------------------

fn author_url_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)(?:twitter\.com|x\.com)/([^/?]+)").expect("static pattern")
    })
}

fn paragraph_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?is)<p[^>]*>(.*?)</p>").expect("static pattern"))
}

fn tag_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)<[^>]+>").expect("static pattern"))
}

fn img_src_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"(?i)<img[^>]+src=["']([^"']+)["']"#).expect("static pattern"))
}

fn whitespace_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s+").expect("static pattern"))
}

/// `https://twitter.com/alice?ref=x` becomes `@alice`.
fn extract_handle(author_url: &str) -> String {
    author_url_re()
        .captures(author_url)
        .map(|caps| format!("@{}", &caps[1]))
        .unwrap_or_default()
}

/// Pull the tweet body out of the oEmbed blockquote markup: the first
/// paragraph, tags stripped, entities decoded, whitespace collapsed.
fn extract_tweet_text(html: &str) -> String {
    if html.is_empty() {
        return String::new();
    }

    let raw = paragraph_re()
        .captures(html)
        .map(|caps| caps[1].to_string())
        .unwrap_or_else(|| html.to_string());

    let stripped = tag_re().replace_all(&raw, " ");
    let decoded = stripped
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&mdash;", "\u{2014}")
        .replace("&#x27;", "'")
        .replace("&#39;", "'");

    whitespace_re().replace_all(&decoded, " ").trim().to_string()
}

/// First `<img src=…>` in the markup, if any.
fn first_img_src(html: &str) -> Option<String> {
    img_src_re()
        .captures(html)
        .map(|caps| caps[1].to_string())
}
