//! URL set validation: split the raw input into exactly four image URLs,
//! normalize them, and check each one for size and reachability.
//!
//! The check is all-or-nothing: one oversized or unreachable image rejects the
//! whole set before any provider is called.

use futures::future::try_join_all;
use once_cell::sync::OnceCell;
use regex::Regex;
use reqwest::header::CONTENT_LENGTH;
use reqwest::{Client, Url};
use tracing::{debug, info, warn};

use crate::error::{AnalyzeError, ImageRejection};

/// Number of photos of the same item every request must carry.
pub const EXPECTED_URL_COUNT: usize = 4;

/// Exactly four normalized http(s) URLs, kept as strings so providers see
/// them as the client wrote them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageUrlSet {
    urls: Vec<String>,
}

impl ImageUrlSet {
    /// Split + normalize without touching the network.
    pub fn parse(raw: &str) -> Result<Self, AnalyzeError> {
        let parts = split_urls(raw)?;
        let mut urls = Vec::with_capacity(parts.len());
        for p in parts {
            match normalize_url(&p) {
                Some(u) => urls.push(u),
                None => {
                    return Err(AnalyzeError::OversizedOrUnreachableImage {
                        url: p,
                        reason: ImageRejection::InvalidUrl,
                    })
                }
            }
        }
        Ok(Self { urls })
    }

    pub fn urls(&self) -> &[String] {
        &self.urls
    }

    pub fn to_strings(&self) -> Vec<String> {
        self.urls.clone()
    }
}

/// Split the raw input into URL fragments and enforce the count.
///
/// Whitespace present → split on whitespace. Otherwise the URLs are assumed to be
/// glued together and are cut right after every `.jpg` / `.png` (any case).
pub fn split_urls(raw: &str) -> Result<Vec<String>, AnalyzeError> {
    let s = raw.trim();
    let urls: Vec<String> = if s.chars().any(char::is_whitespace) {
        s.split_whitespace().map(str::to_string).collect()
    } else {
        split_after_extensions(s)
    };

    if urls.len() != EXPECTED_URL_COUNT {
        warn!(found = urls.len(), "expected {EXPECTED_URL_COUNT} URLs");
        return Err(AnalyzeError::MalformedInput { found: urls.len() });
    }
    debug!(?urls, "split URLs");
    Ok(urls)
}

fn split_after_extensions(s: &str) -> Vec<String> {
    static RE_EXT: OnceCell<Regex> = OnceCell::new();
    let re = RE_EXT.get_or_init(|| Regex::new(r"(?i)\.(?:jpg|png)").expect("extension regex"));

    let mut out = Vec::new();
    let mut start = 0usize;
    for m in re.find_iter(s) {
        out.push(&s[start..m.end()]);
        start = m.end();
    }
    out.push(&s[start..]);

    out.into_iter()
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect()
}

/// Trim and lowercase the scheme and host. Everything else (userinfo, port,
/// path, query, fragment) is returned byte for byte.
/// Returns `None` for anything that is not an absolute http(s) URL with a host.
pub fn normalize_url(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    let parsed = Url::parse(trimmed).ok()?;
    if !matches!(parsed.scheme(), "http" | "https") || parsed.host_str().is_none() {
        return None;
    }

    let authority_start = trimmed.find("://")? + 3;
    let authority_end = trimmed[authority_start..]
        .find(['/', '?', '#'])
        .map_or(trimmed.len(), |i| authority_start + i);
    let host_start = trimmed[authority_start..authority_end]
        .rfind('@')
        .map_or(authority_start, |i| authority_start + i + 1);

    Some(format!(
        "{}://{}{}{}",
        parsed.scheme(),
        &trimmed[authority_start..host_start],
        trimmed[host_start..authority_end].to_ascii_lowercase(),
        &trimmed[authority_end..],
    ))
}

/// HEAD for the declared size, then a streamed GET that stops as soon as the
/// body grows past `max_bytes`.
pub async fn check_image(client: &Client, url: &str, max_bytes: u64) -> Result<(), ImageRejection> {
    let head = client
        .head(url)
        .send()
        .await
        .and_then(|r| r.error_for_status())
        .map_err(|e| ImageRejection::Unreachable(e.to_string()))?;

    // reqwest's content_length() reports the (empty) HEAD body, so read the header.
    let declared = head
        .headers()
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok());
    if let Some(size) = declared {
        if size > max_bytes {
            return Err(ImageRejection::DeclaredTooLarge(size));
        }
    }

    let mut resp = client
        .get(url)
        .send()
        .await
        .and_then(|r| r.error_for_status())
        .map_err(|e| ImageRejection::Unreachable(e.to_string()))?;

    let mut downloaded: u64 = 0;
    while let Some(chunk) = resp
        .chunk()
        .await
        .map_err(|e| ImageRejection::Unreachable(e.to_string()))?
    {
        downloaded += chunk.len() as u64;
        if downloaded > max_bytes {
            return Err(ImageRejection::StreamTooLarge(downloaded));
        }
    }
    Ok(())
}

/// Parse the raw string and check all four images concurrently. The first
/// rejection wins; the remaining checks are dropped.
pub async fn validate(
    client: &Client,
    raw: &str,
    max_bytes: u64,
) -> Result<ImageUrlSet, AnalyzeError> {
    let set = ImageUrlSet::parse(raw)?;

    let checks = set.urls().iter().map(|url| async move {
        check_image(client, url, max_bytes).await.map_err(|reason| {
            warn!(%url, %reason, "image rejected");
            AnalyzeError::OversizedOrUnreachableImage {
                url: url.to_string(),
                reason,
            }
        })
    });
    try_join_all(checks).await?;

    info!(urls = ?set.to_strings(), "URL set validated");
    Ok(set)
}
