use crate::classifier::{ThresholdPolicy, DEFAULT_SPAM_THRESHOLD};
use crate::scheduler::{BatchOptions, DEFAULT_MAX_CONCURRENT, DEFAULT_SNAPSHOT_LIMIT};
use crate::stop_words::StopWordSet;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub scan: ScanConfig,
    pub thresholds: ThresholdConfig,
    pub archive: ArchiveConfig,
    pub stop_words: StopWordsConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    pub snapshot_limit: usize,
    pub max_concurrent: usize,
    /// Overall batch deadline; unfinished domains become UNAVAILABLE.
    pub deadline_seconds: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThresholdConfig {
    pub spam_threshold: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchiveConfig {
    pub cdx_endpoint: String,
    pub capture_endpoint: String,
    pub timeout_seconds: u64,
    pub user_agent: String,
    pub max_text_chars: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StopWordsConfig {
    pub use_defaults: bool,
    pub extra: Vec<String>,
    pub file: Option<PathBuf>,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            snapshot_limit: DEFAULT_SNAPSHOT_LIMIT,
            max_concurrent: DEFAULT_MAX_CONCURRENT,
            deadline_seconds: None,
        }
    }
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            spam_threshold: DEFAULT_SPAM_THRESHOLD,
        }
    }
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            cdx_endpoint: "https://web.archive.org/cdx/search/cdx".to_string(),
            capture_endpoint: "https://web.archive.org/web".to_string(),
            timeout_seconds: 20,
            user_agent: format!("wayback-spam-scanner/{}", env!("CARGO_PKG_VERSION")),
            max_text_chars: 200_000,
        }
    }
}

impl Default for StopWordsConfig {
    fn default() -> Self {
        Self {
            use_defaults: true,
            extra: Vec::new(),
            file: None,
        }
    }
}

impl Config {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Config = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        Ok(config)
    }

    pub fn to_file(&self, path: &Path) -> anyhow::Result<()> {
        let content = serde_yaml::to_string(self)?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file {}", path.display()))?;
        Ok(())
    }

    pub fn batch_options(&self) -> BatchOptions {
        BatchOptions {
            snapshot_limit: self.scan.snapshot_limit,
            max_concurrent: self.scan.max_concurrent,
            policy: ThresholdPolicy::new(self.thresholds.spam_threshold),
            deadline: self.scan.deadline_seconds.map(Duration::from_secs),
        }
    }

    /// Defaults (unless disabled), then the stop-word file, then `extra`.
    pub fn stop_words(&self) -> anyhow::Result<StopWordSet> {
        let mut set = if self.stop_words.use_defaults {
            StopWordSet::defaults()
        } else {
            StopWordSet::default()
        };

        if let Some(path) = &self.stop_words.file {
            set = set.merged(&StopWordSet::from_file(path)?);
        }

        Ok(set.merged(&StopWordSet::new(&self.stop_words.extra)))
    }
}
