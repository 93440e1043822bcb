//! Snapshot source backed by the Internet Archive's Wayback Machine.
//!
//! Captures are listed through the CDX API and then downloaded raw (the
//! `id_` flag skips the archive's toolbar rewriting).

use crate::config::ArchiveConfig;
use crate::snapshot::{FetchError, SnapshotRecord, SnapshotSource};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use regex::Regex;
use reqwest::Client;
use std::sync::OnceLock;
use std::time::Duration;
use url::Url;

/// A capture listed by the CDX API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureRef {
    pub timestamp: String,
    pub original: String,
}

pub struct WaybackClient {
    client: Client,
    cdx_endpoint: String,
    capture_endpoint: String,
    max_text_chars: usize,
}

impl WaybackClient {
    pub fn new(config: &ArchiveConfig) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .user_agent(config.user_agent.as_str())
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()?;

        Ok(Self {
            client,
            cdx_endpoint: config.cdx_endpoint.trim_end_matches('/').to_string(),
            capture_endpoint: config.capture_endpoint.trim_end_matches('/').to_string(),
            max_text_chars: config.max_text_chars,
        })
    }

    /// Most recent `limit` successful HTML captures of `host`, newest first.
    pub async fn list_captures(&self, host: &str, limit: usize) -> Result<Vec<CaptureRef>, FetchError> {
        let limit = format!("-{limit}");
        let response = self
            .client
            .get(&self.cdx_endpoint)
            .query(&[
                ("url", host),
                ("output", "json"),
                ("fl", "timestamp,original"),
                ("filter", "statuscode:200"),
                ("filter", "mimetype:text/html"),
                ("collapse", "digest"),
                ("limit", limit.as_str()),
            ])
            .send()
            .await?
            .error_for_status()?;

        // No captures can come back as an empty body instead of `[]`
        if response.content_length() == Some(0) {
            return Ok(Vec::new());
        }
        let rows: Vec<Vec<String>> = response.json().await?;
        let mut captures = parse_cdx(&rows)?;
        captures.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(captures)
    }

    pub fn capture_url(&self, capture: &CaptureRef) -> String {
        format!(
            "{}/{}id_/{}",
            self.capture_endpoint, capture.timestamp, capture.original
        )
    }

    async fn fetch_capture(&self, domain: &str, capture: &CaptureRef) -> Result<SnapshotRecord, FetchError> {
        let url = self.capture_url(capture);
        log::debug!("Downloading capture {url}");

        let html = self
            .client
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;

        let mut text = html_to_text(&html);
        if text.chars().count() > self.max_text_chars {
            text = text.chars().take(self.max_text_chars).collect();
        }

        Ok(SnapshotRecord::new(
            domain,
            parse_timestamp(&capture.timestamp)?,
            text,
        ))
    }
}

#[async_trait]
impl SnapshotSource for WaybackClient {
    async fn fetch_snapshots(
        &self,
        domain: &str,
        limit: usize,
    ) -> Result<Vec<SnapshotRecord>, FetchError> {
        let host = normalize_domain(domain)?;
        let captures = self.list_captures(&host, limit).await?;
        log::debug!("{} captures listed for {host}", captures.len());

        let mut records = Vec::with_capacity(captures.len());
        let mut last_error = None;
        for capture in captures.iter().take(limit) {
            match self.fetch_capture(domain, capture).await {
                Ok(record) => records.push(record),
                Err(e) => {
                    log::debug!("Skipping capture {} of {host}: {e}", capture.timestamp);
                    last_error = Some(e);
                }
            }
        }

        match last_error {
            Some(e) if records.is_empty() => Err(e),
            _ => Ok(records),
        }
    }

    fn name(&self) -> &str {
        "wayback"
    }
}

/// Host to query the archive with: no scheme, path, port or `www.` prefix.
pub fn normalize_domain(input: &str) -> Result<String, FetchError> {
    let trimmed = input.trim().to_lowercase();
    let with_scheme = if trimmed.contains("://") {
        trimmed.clone()
    } else {
        format!("http://{trimmed}")
    };

    let host = Url::parse(&with_scheme)
        .ok()
        .and_then(|url| url.host_str().map(str::to_string))
        .filter(|host| !host.is_empty())
        .ok_or_else(|| FetchError::Malformed(format!("invalid domain: {input}")))?;

    Ok(host.strip_prefix("www.").unwrap_or(&host).to_string())
}

/// Turn CDX `output=json` rows into captures. The first row is the field
/// header.
pub fn parse_cdx(rows: &[Vec<String>]) -> Result<Vec<CaptureRef>, FetchError> {
    let Some((header, rows)) = rows.split_first() else {
        return Ok(Vec::new());
    };

    let column = |name: &str| {
        header
            .iter()
            .position(|h| h == name)
            .ok_or_else(|| FetchError::Malformed(format!("CDX response has no {name} field")))
    };
    let ts_col = column("timestamp")?;
    let original_col = column("original")?;

    Ok(rows
        .iter()
        .filter_map(|row| {
            Some(CaptureRef {
                timestamp: row.get(ts_col)?.clone(),
                original: row.get(original_col)?.clone(),
            })
        })
        .collect())
}

pub fn parse_timestamp(timestamp: &str) -> Result<DateTime<Utc>, FetchError> {
    NaiveDateTime::parse_from_str(timestamp, "%Y%m%d%H%M%S")
        .map(|naive| Utc.from_utc_datetime(&naive))
        .map_err(|e| FetchError::Malformed(format!("bad capture timestamp {timestamp}: {e}")))
}

fn markup_patterns() -> &'static (Regex, Regex, Regex) {
    static PATTERNS: OnceLock<(Regex, Regex, Regex)> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        (
            Regex::new(r"(?is)<(script|style|noscript)\b.*?</(script|style|noscript)\s*>").unwrap(),
            Regex::new(r"(?s)<!--.*?-->|<[^>]*>").unwrap(),
            Regex::new(r"\s+").unwrap(),
        )
    })
}

/// Visible text of an HTML document, whitespace collapsed.
pub fn html_to_text(html: &str) -> String {
    let (hidden, tags, whitespace) = markup_patterns();

    let text = hidden.replace_all(html, " ");
    let text = tags.replace_all(&text, " ");
    let text = text
        .replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&");

    whitespace.replace_all(&text, " ").trim().to_string()
}
