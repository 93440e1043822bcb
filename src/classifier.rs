use crate::analyzer::{analyze, TermCount};
use crate::snapshot::SnapshotSource;
use crate::stop_words::StopWordSet;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Aggregate score at or above which a domain is classified as spam.
pub const DEFAULT_SPAM_THRESHOLD: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScanStatus {
    /// Domain has entered processing; never a final verdict.
    Pending,
    Clean,
    Suspicious,
    Spam,
    Unavailable,
    NoSnapshots,
}

impl ScanStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ScanStatus::Pending)
    }
}

impl fmt::Display for ScanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ScanStatus::Pending => "PENDING",
            ScanStatus::Clean => "CLEAN",
            ScanStatus::Suspicious => "SUSPICIOUS",
            ScanStatus::Spam => "SPAM",
            ScanStatus::Unavailable => "UNAVAILABLE",
            ScanStatus::NoSnapshots => "NO_SNAPSHOTS",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainStatus {
    pub domain: String,
    pub status: ScanStatus,
    pub snapshot_count: usize,
    pub total_score: u32,
    /// Matched stop words across all snapshots, most frequent first.
    pub evidence: Vec<TermCount>,
    pub error: Option<String>,
    pub last_updated: DateTime<Utc>,
}

impl DomainStatus {
    pub fn pending(domain: &str) -> Self {
        Self {
            domain: domain.to_string(),
            status: ScanStatus::Pending,
            snapshot_count: 0,
            total_score: 0,
            evidence: Vec::new(),
            error: None,
            last_updated: Utc::now(),
        }
    }

    /// Terminal UNAVAILABLE status for a domain whose fetch failed.
    pub fn unavailable(domain: &str, reason: impl Into<String>) -> Self {
        Self {
            status: ScanStatus::Unavailable,
            error: Some(reason.into()),
            ..Self::pending(domain)
        }
    }

    /// UNAVAILABLE status for a classification that failed unexpectedly.
    /// The failure message is kept as evidence so it shows up in reports.
    pub fn internal_failure(domain: &str, message: &str) -> Self {
        let mut status = Self::unavailable(domain, message);
        status.evidence.push(TermCount {
            term: format!("internal error: {message}"),
            count: 0,
        });
        status
    }

    fn touch(&mut self, status: ScanStatus) {
        self.status = status;
        self.last_updated = Utc::now();
    }
}

/// Maps an aggregate score to a verdict.
///
/// `0` is CLEAN, anything below `spam_threshold` is SUSPICIOUS, the rest
/// is SPAM.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThresholdPolicy {
    pub spam_threshold: u32,
}

impl Default for ThresholdPolicy {
    fn default() -> Self {
        Self {
            spam_threshold: DEFAULT_SPAM_THRESHOLD,
        }
    }
}

impl ThresholdPolicy {
    pub fn new(spam_threshold: u32) -> Self {
        Self { spam_threshold }
    }

    pub fn classify(&self, total_score: u32) -> ScanStatus {
        match total_score {
            0 => ScanStatus::Clean,
            score if score < self.spam_threshold => ScanStatus::Suspicious,
            _ => ScanStatus::Spam,
        }
    }
}

/// Fetches a domain's snapshots and reduces them to one [`DomainStatus`].
#[derive(Clone)]
pub struct DomainClassifier {
    source: Arc<dyn SnapshotSource>,
    stop_words: Arc<StopWordSet>,
    snapshot_limit: usize,
    policy: ThresholdPolicy,
}

impl DomainClassifier {
    /// `snapshot_limit` must be positive; the batch scheduler rejects zero
    /// before building a classifier.
    pub fn new(
        source: Arc<dyn SnapshotSource>,
        stop_words: Arc<StopWordSet>,
        snapshot_limit: usize,
        policy: ThresholdPolicy,
    ) -> Self {
        debug_assert!(snapshot_limit > 0);
        Self {
            source,
            stop_words,
            snapshot_limit,
            policy,
        }
    }

    /// Classify `domain`, reporting every status transition to `on_status`.
    ///
    /// The first update is always PENDING and the last is the returned
    /// terminal status.
    pub async fn classify<F>(&self, domain: &str, on_status: F) -> DomainStatus
    where
        F: Fn(&DomainStatus),
    {
        let mut status = DomainStatus::pending(domain);
        on_status(&status);

        let records = match self
            .source
            .fetch_snapshots(domain, self.snapshot_limit)
            .await
        {
            Ok(records) => records,
            Err(e) => {
                log::warn!(
                    "Fetching snapshots for {domain} from {} failed: {e}",
                    self.source.name()
                );
                status.error = Some(e.to_string());
                status.touch(ScanStatus::Unavailable);
                on_status(&status);
                return status;
            }
        };

        if records.is_empty() {
            log::debug!("No snapshots archived for {domain}");
            status.touch(ScanStatus::NoSnapshots);
            on_status(&status);
            return status;
        }

        let signals: Vec<_> = records
            .iter()
            .take(self.snapshot_limit)
            .map(|record| analyze(record, &self.stop_words))
            .collect();

        status.snapshot_count = signals.len();
        status.total_score = signals.iter().map(|s| s.score).sum();
        status.evidence = aggregate_evidence(signals.iter().flat_map(|s| s.matches.iter()));

        let verdict = self.policy.classify(status.total_score);
        log::debug!(
            "{domain}: {} snapshots, score {} -> {verdict}",
            status.snapshot_count,
            status.total_score
        );
        status.touch(verdict);
        on_status(&status);
        status
    }
}

/// Sum counts per term; most frequent first, alphabetical on ties.
fn aggregate_evidence<'a, I>(matches: I) -> Vec<TermCount>
where
    I: IntoIterator<Item = &'a TermCount>,
{
    let mut totals: HashMap<&str, u32> = HashMap::new();
    for m in matches {
        *totals.entry(m.term.as_str()).or_insert(0) += m.count;
    }

    let mut evidence: Vec<TermCount> = totals
        .into_iter()
        .map(|(term, count)| TermCount {
            term: term.to_string(),
            count,
        })
        .collect();
    evidence.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.term.cmp(&b.term)));
    evidence
}
