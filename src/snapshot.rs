use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;

/// A single archived capture of a domain's content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotRecord {
    pub domain: String,
    pub captured_at: DateTime<Utc>,
    pub text_content: String,
}

impl SnapshotRecord {
    pub fn new(domain: &str, captured_at: DateTime<Utc>, text_content: impl Into<String>) -> Self {
        Self {
            domain: domain.to_string(),
            captured_at,
            text_content: text_content.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("archive has no record of {0}")]
    NotFound(String),
    #[error("archive unreachable: {0}")]
    Unreachable(String),
    #[error("archive request timed out")]
    Timeout,
    #[error("archive returned HTTP {0}")]
    Http(u16),
    #[error("malformed archive response: {0}")]
    Malformed(String),
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            FetchError::Timeout
        } else if let Some(status) = e.status() {
            if status == reqwest::StatusCode::NOT_FOUND {
                FetchError::NotFound(e.url().map(|u| u.to_string()).unwrap_or_default())
            } else {
                FetchError::Http(status.as_u16())
            }
        } else if e.is_decode() {
            FetchError::Malformed(e.to_string())
        } else {
            FetchError::Unreachable(e.to_string())
        }
    }
}

/// Source of historical captures for a domain.
///
/// Implementations return at most `limit` records, most recent first. An
/// archive with no captures is `Ok(vec![])`, not an error.
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    async fn fetch_snapshots(
        &self,
        domain: &str,
        limit: usize,
    ) -> Result<Vec<SnapshotRecord>, FetchError>;

    fn name(&self) -> &str;
}

#[derive(Debug, Clone)]
enum CannedResponse {
    Records(Vec<SnapshotRecord>),
    Failure(FetchError),
}

/// In-memory snapshot source with canned responses per domain.
///
/// Unknown domains return no snapshots. An optional delay simulates
/// archive latency.
#[derive(Debug, Clone, Default)]
pub struct StaticSnapshotSource {
    responses: HashMap<String, CannedResponse>,
    delay: Option<Duration>,
}

impl StaticSnapshotSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Register captures for `domain`, one per text, with timestamps one
    /// day apart counting back from now.
    pub fn with_texts<I, S>(mut self, domain: &str, texts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let now = Utc::now();
        let records = texts
            .into_iter()
            .enumerate()
            .map(|(i, text)| SnapshotRecord::new(domain, now - chrono::Duration::days(i as i64), text))
            .collect();
        self.responses
            .insert(domain.to_string(), CannedResponse::Records(records));
        self
    }

    pub fn with_failure(mut self, domain: &str, error: FetchError) -> Self {
        self.responses
            .insert(domain.to_string(), CannedResponse::Failure(error));
        self
    }

    /// Canned data for `--demo` runs.
    pub fn demo() -> Self {
        Self::new()
            .with_delay(Duration::from_millis(250))
            .with_texts(
                "clean.example",
                [
                    "Welcome to our family bakery. Fresh bread every morning.",
                    "Opening hours and contact details for the bakery.",
                ],
            )
            .with_texts(
                "spammy.example",
                [
                    "Best online casino! Casino bonuses and cheap viagra.",
                    "About us",
                ],
            )
            .with_texts(
                "borderline.example",
                ["Community news. Our poker night is on Friday."],
            )
            .with_texts("empty.example", Vec::<String>::new())
            .with_failure(
                "dead.example",
                FetchError::Unreachable("connection refused".to_string()),
            )
    }

    pub fn domains(&self) -> impl Iterator<Item = &str> {
        self.responses.keys().map(String::as_str)
    }
}

#[async_trait]
impl SnapshotSource for StaticSnapshotSource {
    async fn fetch_snapshots(
        &self,
        domain: &str,
        limit: usize,
    ) -> Result<Vec<SnapshotRecord>, FetchError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        match self.responses.get(domain) {
            Some(CannedResponse::Records(records)) => {
                Ok(records.iter().take(limit).cloned().collect())
            }
            Some(CannedResponse::Failure(e)) => Err(e.clone()),
            None => Ok(Vec::new()),
        }
    }

    fn name(&self) -> &str {
        "static"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_source_limits_and_failures() {
        let source = StaticSnapshotSource::new()
            .with_texts("a.example", ["one", "two", "three"])
            .with_failure("b.example", FetchError::Timeout);

        let records = source.fetch_snapshots("a.example", 2).await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].text_content, "one");
        assert!(records[0].captured_at > records[1].captured_at);

        assert_eq!(
            source.fetch_snapshots("b.example", 2).await,
            Err(FetchError::Timeout)
        );
        assert!(source
            .fetch_snapshots("unknown.example", 2)
            .await
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_demo_has_every_outcome() {
        let source = StaticSnapshotSource::demo();
        let mut domains: Vec<&str> = source.domains().collect();
        domains.sort();
        assert_eq!(
            domains,
            vec![
                "borderline.example",
                "clean.example",
                "dead.example",
                "empty.example",
                "spammy.example"
            ]
        );
    }

    #[tokio::test]
    async fn test_reqwest_error_mapping() {
        use wiremock::matchers::path;
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(path("/gone"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(path("/teapot"))
            .respond_with(ResponseTemplate::new(418))
            .mount(&server)
            .await;
        Mock::given(path("/garbage"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let client = reqwest::Client::new();
        let status_error = |url: String| {
            let client = client.clone();
            async move {
                let e = client
                    .get(url)
                    .send()
                    .await
                    .unwrap()
                    .error_for_status()
                    .unwrap_err();
                FetchError::from(e)
            }
        };

        match status_error(format!("{}/gone", server.uri())).await {
            FetchError::NotFound(url) => assert!(url.ends_with("/gone")),
            other => panic!("expected NotFound, got {other:?}"),
        }
        assert_eq!(
            status_error(format!("{}/teapot", server.uri())).await,
            FetchError::Http(418)
        );

        let decode = client
            .get(format!("{}/garbage", server.uri()))
            .send()
            .await
            .unwrap()
            .json::<Vec<String>>()
            .await
            .unwrap_err();
        assert!(matches!(FetchError::from(decode), FetchError::Malformed(_)));

        // Nothing listens on port 1
        let refused = client.get("http://127.0.0.1:1/").send().await.unwrap_err();
        assert!(matches!(FetchError::from(refused), FetchError::Unreachable(_)));
    }
}
