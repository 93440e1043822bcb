use crate::classifier::DomainStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
}

/// Receives live progress from a batch run.
///
/// Both methods are called from worker tasks and must not block for long.
/// A domain gets at least two status updates: PENDING, then its verdict.
pub trait BatchObserver: Send + Sync {
    fn on_log(&self, _entry: &LogEntry) {}
    fn on_status(&self, _status: &DomainStatus) {}
}

/// Observer that ignores everything.
pub struct NullObserver;

impl BatchObserver for NullObserver {}

/// Append-only log for one batch.
///
/// Entries are forwarded to the observer while the lock is held so the
/// observer sees them in the same order they are stored.
pub(crate) struct BatchLog {
    entries: Mutex<Vec<LogEntry>>,
    observer: Arc<dyn BatchObserver>,
}

impl BatchLog {
    pub(crate) fn new(observer: Arc<dyn BatchObserver>) -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
            observer,
        }
    }

    pub(crate) fn push(&self, level: LogLevel, message: impl Into<String>) {
        let entry = LogEntry {
            timestamp: Utc::now(),
            level,
            message: message.into(),
        };

        match level {
            LogLevel::Error => log::warn!("{}", entry.message),
            _ => log::info!("{}", entry.message),
        }

        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        self.observer.on_log(&entry);
        entries.push(entry);
    }

    pub(crate) fn info(&self, message: impl Into<String>) {
        self.push(LogLevel::Info, message);
    }

    pub(crate) fn success(&self, message: impl Into<String>) {
        self.push(LogLevel::Success, message);
    }

    pub(crate) fn error(&self, message: impl Into<String>) {
        self.push(LogLevel::Error, message);
    }

    pub(crate) fn entries(&self) -> Vec<LogEntry> {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub(crate) fn into_entries(self) -> Vec<LogEntry> {
        self.entries.into_inner().unwrap_or_else(|e| e.into_inner())
    }
}

/// Latest status per domain for one run.
///
/// Each update replaces the stored status for its domain. Duplicate domains
/// in a batch share a key, so the board shows whichever finished last.
#[derive(Default)]
pub struct StatusBoard {
    statuses: Mutex<HashMap<String, DomainStatus>>,
}

impl StatusBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, domain: &str) -> Option<DomainStatus> {
        self.lock().get(domain).cloned()
    }

    pub fn snapshot(&self) -> HashMap<String, DomainStatus> {
        self.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, DomainStatus>> {
        self.statuses.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl BatchObserver for StatusBoard {
    fn on_status(&self, status: &DomainStatus) {
        self.lock().insert(status.domain.clone(), status.clone());
    }
}

/// Prints log lines as they arrive, for the command line.
pub struct ConsoleObserver {
    pub show_status: bool,
}

impl BatchObserver for ConsoleObserver {
    fn on_log(&self, entry: &LogEntry) {
        let marker = match entry.level {
            LogLevel::Info => "ℹ️ ",
            LogLevel::Success => "✅",
            LogLevel::Error => "❌",
        };
        println!(
            "[{}] {} {}",
            entry.timestamp.format("%H:%M:%S"),
            marker,
            entry.message
        );
    }

    fn on_status(&self, status: &DomainStatus) {
        if self.show_status {
            println!("    {} → {}", status.domain, status.status);
        }
    }
}
