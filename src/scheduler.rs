use crate::classifier::{DomainClassifier, DomainStatus, ScanStatus, ThresholdPolicy};
use crate::observer::{BatchLog, BatchObserver, LogEntry};
use crate::snapshot::SnapshotSource;
use crate::stop_words::StopWordSet;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinHandle};
use tokio::time::Instant;

pub const DEFAULT_SNAPSHOT_LIMIT: usize = 10;
pub const DEFAULT_MAX_CONCURRENT: usize = 3;

const DEADLINE_EXCEEDED: &str = "batch deadline exceeded";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BatchError {
    #[error("no domains to scan")]
    EmptyDomainList,
    #[error("domain at position {0} is empty")]
    EmptyDomain(usize),
    #[error("max_concurrent must be at least 1")]
    InvalidConcurrency,
    #[error("snapshot_limit must be at least 1")]
    InvalidSnapshotLimit,
    #[error("spam_threshold must be at least 1")]
    InvalidThreshold,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchOptions {
    pub snapshot_limit: usize,
    pub max_concurrent: usize,
    pub policy: ThresholdPolicy,
    /// When set, domains still running after this long are marked
    /// UNAVAILABLE and the batch returns.
    pub deadline: Option<Duration>,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            snapshot_limit: DEFAULT_SNAPSHOT_LIMIT,
            max_concurrent: DEFAULT_MAX_CONCURRENT,
            policy: ThresholdPolicy::default(),
            deadline: None,
        }
    }
}

impl BatchOptions {
    pub fn validate(&self) -> Result<(), BatchError> {
        if self.max_concurrent < 1 {
            return Err(BatchError::InvalidConcurrency);
        }
        if self.snapshot_limit < 1 {
            return Err(BatchError::InvalidSnapshotLimit);
        }
        if self.policy.spam_threshold < 1 {
            return Err(BatchError::InvalidThreshold);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub total: usize,
    pub clean: usize,
    pub suspicious: usize,
    pub spam: usize,
    pub unavailable: usize,
    pub no_snapshots: usize,
}

impl BatchSummary {
    pub fn from_results(results: &[DomainStatus]) -> Self {
        let mut summary = Self {
            total: results.len(),
            ..Self::default()
        };
        for result in results {
            match result.status {
                ScanStatus::Clean => summary.clean += 1,
                ScanStatus::Suspicious => summary.suspicious += 1,
                ScanStatus::Spam => summary.spam += 1,
                ScanStatus::NoSnapshots => summary.no_snapshots += 1,
                // The scheduler never returns a pending status
                ScanStatus::Unavailable | ScanStatus::Pending => summary.unavailable += 1,
            }
        }
        summary
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchResult {
    /// One terminal status per input domain, in input order.
    pub results: Vec<DomainStatus>,
    pub summary: BatchSummary,
    pub log: Vec<LogEntry>,
}

/// Runs the domain classifier over a list of domains with a fixed
/// concurrency ceiling.
pub struct BatchScheduler {
    source: Arc<dyn SnapshotSource>,
    options: BatchOptions,
}

impl BatchScheduler {
    pub fn new(source: Arc<dyn SnapshotSource>, options: BatchOptions) -> Result<Self, BatchError> {
        options.validate()?;
        Ok(Self { source, options })
    }

    /// Classify every domain, streaming progress to `observer`.
    ///
    /// Only input validation fails; per-domain problems end up as
    /// UNAVAILABLE results.
    pub async fn run(
        &self,
        domains: &[String],
        stop_words: Arc<StopWordSet>,
        observer: Arc<dyn BatchObserver>,
    ) -> Result<BatchResult, BatchError> {
        if domains.is_empty() {
            return Err(BatchError::EmptyDomainList);
        }
        if let Some(index) = domains.iter().position(|d| d.trim().is_empty()) {
            return Err(BatchError::EmptyDomain(index));
        }

        let started = Instant::now();
        let deadline = self.options.deadline.map(|d| started + d);
        let log = Arc::new(BatchLog::new(observer.clone()));

        log.info(format!(
            "Starting scan of {} domains with {} stop words, up to {} snapshots each, {} at a time (source: {})",
            domains.len(),
            stop_words.len(),
            self.options.snapshot_limit,
            self.options.max_concurrent,
            self.source.name()
        ));

        let classifier = DomainClassifier::new(
            self.source.clone(),
            stop_words,
            self.options.snapshot_limit,
            self.options.policy,
        );
        let semaphore = Arc::new(Semaphore::new(self.options.max_concurrent));
        let mut handles: Vec<Option<(JoinHandle<DomainStatus>, Arc<StatusGate>)>> =
            Vec::with_capacity(domains.len());

        for domain in domains {
            if deadline.is_some_and(|d| Instant::now() >= d) {
                handles.push(None);
                continue;
            }

            // Acquire before spawning so dispatch follows input order
            let permit = match within(deadline, semaphore.clone().acquire_owned()).await {
                Some(Ok(permit)) => permit,
                Some(Err(_)) | None => {
                    handles.push(None);
                    continue;
                }
            };

            let gate = Arc::new(StatusGate::default());
            let classifier = classifier.clone();
            let observer = observer.clone();
            let log = log.clone();
            let domain = domain.clone();
            let task_gate = gate.clone();
            let handle = tokio::spawn(async move {
                let _permit = permit;
                let status = classifier
                    .classify(&domain, |status| {
                        if !status.status.is_terminal() {
                            task_gate.forward(observer.as_ref(), status);
                        }
                    })
                    .await;
                if task_gate.forward(observer.as_ref(), &status) {
                    report_outcome(&log, &status);
                }
                status
            });
            handles.push(Some((handle, gate)));
        }

        let mut results = Vec::with_capacity(domains.len());
        for (domain, handle) in domains.iter().zip(handles) {
            let status = match handle {
                Some((mut handle, gate)) => match within(deadline, &mut handle).await {
                    Some(Ok(status)) => status,
                    Some(Err(e)) => internal_failure(domain, e, &log, &gate, observer.as_ref()),
                    None => match gate.expire(domain, observer.as_ref()) {
                        Some(status) => {
                            handle.abort();
                            log.error(format!("{domain}: unavailable ({DEADLINE_EXCEEDED})"));
                            status
                        }
                        // The task reported its verdict first; it only has to return
                        None => match handle.await {
                            Ok(status) => status,
                            Err(e) => internal_failure(domain, e, &log, &gate, observer.as_ref()),
                        },
                    },
                },
                None => {
                    observer.on_status(&DomainStatus::pending(domain));
                    let status = DomainStatus::unavailable(domain, DEADLINE_EXCEEDED);
                    observer.on_status(&status);
                    log.error(format!("{domain}: unavailable ({DEADLINE_EXCEEDED})"));
                    status
                }
            };
            results.push(status);
        }

        let summary = BatchSummary::from_results(&results);
        log.success(format!(
            "Scan finished in {:.1}s: {} domains, {} clean, {} suspicious, {} spam, {} unavailable, {} without snapshots",
            started.elapsed().as_secs_f64(),
            summary.total,
            summary.clean,
            summary.suspicious,
            summary.spam,
            summary.unavailable,
            summary.no_snapshots
        ));

        // An aborted task can still hold its clone until the runtime drops it
        let log = Arc::try_unwrap(log)
            .map(BatchLog::into_entries)
            .unwrap_or_else(|log| log.entries());

        Ok(BatchResult {
            results,
            summary,
            log,
        })
    }
}

/// Build a scheduler for `options` and run it once.
pub async fn run_batch(
    domains: &[String],
    stop_words: Arc<StopWordSet>,
    options: BatchOptions,
    source: Arc<dyn SnapshotSource>,
    observer: Arc<dyn BatchObserver>,
) -> Result<BatchResult, BatchError> {
    BatchScheduler::new(source, options)?
        .run(domains, stop_words, observer)
        .await
}

/// Await `future`, giving up at `deadline` if there is one.
async fn within<F: Future>(deadline: Option<Instant>, future: F) -> Option<F::Output> {
    match deadline {
        Some(deadline) => tokio::time::timeout_at(deadline, future).await.ok(),
        None => Some(future.await),
    }
}

fn report_outcome(log: &BatchLog, status: &DomainStatus) {
    match status.status {
        ScanStatus::Unavailable => log.error(format!(
            "{}: unavailable ({})",
            status.domain,
            status.error.as_deref().unwrap_or("unknown error")
        )),
        ScanStatus::NoSnapshots => log.success(format!("{}: no archived snapshots", status.domain)),
        verdict => {
            let terms: Vec<String> = status
                .evidence
                .iter()
                .take(5)
                .map(|e| format!("{} x{}", e.term, e.count))
                .collect();
            let mut message = format!(
                "{}: {} ({} snapshots, score {})",
                status.domain, verdict, status.snapshot_count, status.total_score
            );
            if !terms.is_empty() {
                message.push_str(&format!(" [{}]", terms.join(", ")));
            }
            log.success(message);
        }
    }
}

fn internal_failure(
    domain: &str,
    error: JoinError,
    log: &BatchLog,
    gate: &StatusGate,
    observer: &dyn BatchObserver,
) -> DomainStatus {
    let message = join_error_message(error);
    log.error(format!(
        "{domain}: classification failed unexpectedly: {message}"
    ));
    let status = DomainStatus::internal_failure(domain, &message);
    gate.forward(observer, &status);
    status
}

/// Serializes one domain's status updates between its task and the
/// deadline, so the observer sees exactly one terminal status.
#[derive(Default)]
struct StatusGate {
    state: Mutex<GateState>,
}

#[derive(Default)]
struct GateState {
    started: bool,
    finalized: bool,
}

impl StatusGate {
    /// Forward `status` unless a terminal status already went out.
    fn forward(&self, observer: &dyn BatchObserver, status: &DomainStatus) -> bool {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if state.finalized {
            return false;
        }
        if status.status.is_terminal() {
            state.finalized = true;
        } else {
            state.started = true;
        }
        observer.on_status(status);
        true
    }

    /// Finalize as UNAVAILABLE, or `None` if the task got there first.
    fn expire(&self, domain: &str, observer: &dyn BatchObserver) -> Option<DomainStatus> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if state.finalized {
            return None;
        }
        if !state.started {
            observer.on_status(&DomainStatus::pending(domain));
        }
        state.finalized = true;
        let status = DomainStatus::unavailable(domain, DEADLINE_EXCEEDED);
        observer.on_status(&status);
        Some(status)
    }
}

fn join_error_message(e: JoinError) -> String {
    if e.is_panic() {
        let payload = e.into_panic();
        if let Some(message) = payload.downcast_ref::<&str>() {
            format!("panic: {message}")
        } else if let Some(message) = payload.downcast_ref::<String>() {
            format!("panic: {message}")
        } else {
            "panic".to_string()
        }
    } else {
        e.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observer::{LogLevel, NullObserver, StatusBoard};
    use crate::snapshot::{FetchError, SnapshotRecord, StaticSnapshotSource};
    use async_trait::async_trait;

    fn domains(names: &[&str]) -> Vec<String> {
        names.iter().map(|d| d.to_string()).collect()
    }

    fn stop_words() -> Arc<StopWordSet> {
        Arc::new(StopWordSet::new(["casino", "viagra"]))
    }

    #[test]
    fn test_options_validation() {
        assert!(BatchOptions::default().validate().is_ok());

        let options = BatchOptions {
            max_concurrent: 0,
            ..BatchOptions::default()
        };
        assert_eq!(options.validate(), Err(BatchError::InvalidConcurrency));

        let options = BatchOptions {
            snapshot_limit: 0,
            ..BatchOptions::default()
        };
        assert_eq!(options.validate(), Err(BatchError::InvalidSnapshotLimit));

        let options = BatchOptions {
            policy: ThresholdPolicy::new(0),
            ..BatchOptions::default()
        };
        assert_eq!(options.validate(), Err(BatchError::InvalidThreshold));

        let source = Arc::new(StaticSnapshotSource::new());
        assert!(BatchScheduler::new(
            source,
            BatchOptions {
                max_concurrent: 0,
                ..BatchOptions::default()
            }
        )
        .is_err());
    }

    #[tokio::test]
    async fn test_rejects_empty_input() {
        let scheduler =
            BatchScheduler::new(Arc::new(StaticSnapshotSource::new()), BatchOptions::default())
                .unwrap();

        let result = scheduler
            .run(&[], stop_words(), Arc::new(NullObserver))
            .await;
        assert_eq!(result.unwrap_err(), BatchError::EmptyDomainList);

        let result = scheduler
            .run(
                &domains(&["ok.example", "  "]),
                stop_words(),
                Arc::new(NullObserver),
            )
            .await;
        assert_eq!(result.unwrap_err(), BatchError::EmptyDomain(1));
    }

    #[tokio::test]
    async fn test_summary_and_order() {
        let source = StaticSnapshotSource::new()
            .with_texts("b.example", ["casino casino casino"])
            .with_texts("a.example", ["bread"])
            .with_failure("c.example", FetchError::Timeout);
        let scheduler = BatchScheduler::new(
            Arc::new(source),
            BatchOptions {
                max_concurrent: 2,
                ..BatchOptions::default()
            },
        )
        .unwrap();
        let input = domains(&["b.example", "a.example", "c.example", "b.example", "d.example"]);

        let board = Arc::new(StatusBoard::new());
        let result = scheduler.run(&input, stop_words(), board.clone()).await.unwrap();

        let order: Vec<&str> = result.results.iter().map(|r| r.domain.as_str()).collect();
        assert_eq!(order, vec!["b.example", "a.example", "c.example", "b.example", "d.example"]);
        assert_eq!(
            result.summary,
            BatchSummary {
                total: 5,
                clean: 1,
                suspicious: 0,
                spam: 2,
                unavailable: 1,
                no_snapshots: 1,
            }
        );
        assert_eq!(board.len(), 4);
        assert!(board.snapshot().values().all(|s| s.status.is_terminal()));

        assert_eq!(result.log.first().map(|e| e.level), Some(LogLevel::Info));
        assert_eq!(result.log.last().map(|e| e.level), Some(LogLevel::Success));
        assert!(result
            .log
            .iter()
            .any(|e| e.level == LogLevel::Error && e.message.contains("c.example")));
    }

    struct PanickingSource;

    #[async_trait]
    impl SnapshotSource for PanickingSource {
        async fn fetch_snapshots(
            &self,
            domain: &str,
            _limit: usize,
        ) -> Result<Vec<SnapshotRecord>, FetchError> {
            if domain == "boom.example" {
                panic!("parser exploded");
            }
            Ok(vec![SnapshotRecord::new(domain, chrono::Utc::now(), "fine")])
        }

        fn name(&self) -> &str {
            "panicking"
        }
    }

    #[tokio::test]
    async fn test_internal_failure_does_not_abort_batch() {
        let scheduler =
            BatchScheduler::new(Arc::new(PanickingSource), BatchOptions::default()).unwrap();
        let input = domains(&["ok.example", "boom.example", "fine.example"]);

        let result = scheduler
            .run(&input, stop_words(), Arc::new(NullObserver))
            .await
            .unwrap();

        assert_eq!(result.results[0].status, ScanStatus::Clean);
        assert_eq!(result.results[1].status, ScanStatus::Unavailable);
        assert!(result.results[1].evidence[0].term.contains("parser exploded"));
        assert_eq!(result.results[2].status, ScanStatus::Clean);
        assert_eq!(result.summary.unavailable, 1);
        assert!(result
            .log
            .iter()
            .any(|e| e.level == LogLevel::Error && e.message.contains("boom.example")));
    }

    #[tokio::test]
    async fn test_deadline_marks_unfinished_unavailable() {
        let source = StaticSnapshotSource::new()
            .with_delay(Duration::from_secs(30))
            .with_texts("slow.example", ["casino"]);
        let scheduler = BatchScheduler::new(
            Arc::new(source),
            BatchOptions {
                max_concurrent: 1,
                deadline: Some(Duration::from_millis(50)),
                ..BatchOptions::default()
            },
        )
        .unwrap();
        let input = domains(&["slow.example", "queued.example"]);

        let board = Arc::new(StatusBoard::new());
        let result = scheduler.run(&input, stop_words(), board.clone()).await.unwrap();

        assert_eq!(result.summary.unavailable, 2);
        for status in &result.results {
            assert_eq!(status.error.as_deref(), Some(DEADLINE_EXCEEDED));
        }
        assert_eq!(
            board.get("queued.example").map(|s| s.status),
            Some(ScanStatus::Unavailable)
        );
    }

    #[test]
    fn test_status_gate_admits_one_terminal_status() {
        let board = StatusBoard::new();

        let gate = StatusGate::default();
        assert!(gate.forward(&board, &DomainStatus::pending("late.example")));
        assert!(gate.expire("late.example", &board).is_some());
        let mut verdict = DomainStatus::pending("late.example");
        verdict.status = ScanStatus::Spam;
        assert!(!gate.forward(&board, &verdict));
        assert!(!gate.forward(&board, &DomainStatus::pending("late.example")));
        assert_eq!(
            board.get("late.example").map(|s| s.status),
            Some(ScanStatus::Unavailable)
        );

        let gate = StatusGate::default();
        let mut verdict = DomainStatus::pending("quick.example");
        verdict.status = ScanStatus::Clean;
        assert!(gate.forward(&board, &verdict));
        assert!(gate.expire("quick.example", &board).is_none());
        assert_eq!(
            board.get("quick.example").map(|s| s.status),
            Some(ScanStatus::Clean)
        );
    }
}
