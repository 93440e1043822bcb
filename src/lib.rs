pub mod analyzer;
pub mod classifier;
pub mod config;
pub mod observer;
pub mod scheduler;
pub mod snapshot;
pub mod stop_words;
pub mod wayback;

pub use analyzer::{analyze, SnapshotSignal, TermCount};
pub use classifier::{DomainClassifier, DomainStatus, ScanStatus, ThresholdPolicy};
pub use config::Config;
pub use observer::{BatchObserver, ConsoleObserver, LogEntry, LogLevel, NullObserver, StatusBoard};
pub use scheduler::{run_batch, BatchError, BatchOptions, BatchResult, BatchScheduler, BatchSummary};
pub use snapshot::{FetchError, SnapshotRecord, SnapshotSource, StaticSnapshotSource};
pub use stop_words::StopWordSet;
pub use wayback::WaybackClient;
