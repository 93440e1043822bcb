use crate::analyzer::tokenize;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;

/// Built-in spam indicators used when the caller does not opt out of defaults.
pub const DEFAULT_STOP_WORDS: &[&str] = &[
    "casino",
    "viagra",
    "cialis",
    "poker",
    "betting",
    "slots",
    "porn",
    "xxx",
    "escort",
    "payday loan",
    "replica",
    "pharmacy",
    "pills",
    "forex",
    "crypto giveaway",
    "weight loss",
    "hack",
    "cracked",
    "torrent",
    "dating",
];

#[derive(Debug, Error)]
pub enum StopWordError {
    #[error("failed to read stop-word file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Ordered, deduplicated set of normalized stop words.
///
/// Entries keep their insertion order, which the analyzer uses to break
/// frequency ties. Multi-word entries (and entries containing punctuation,
/// e.g. `e-mail`) are stored as space-joined tokens.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<String>", into = "Vec<String>")]
pub struct StopWordSet {
    words: Vec<String>,
    positions: HashMap<String, usize>,
}

impl StopWordSet {
    pub fn new<I, S>(words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut set = Self::default();
        for word in words {
            set.insert(word.as_ref());
        }
        set
    }

    pub fn defaults() -> Self {
        Self::new(DEFAULT_STOP_WORDS.iter())
    }

    /// Parse a comma, semicolon or newline separated list.
    /// Lines starting with `#` are comments.
    pub fn parse_delimited(input: &str) -> Self {
        let words = input
            .lines()
            .map(str::trim)
            .filter(|line| !line.starts_with('#'))
            .flat_map(|line| line.split([',', ';']));
        Self::new(words)
    }

    pub fn from_file(path: &Path) -> Result<Self, StopWordError> {
        let content = std::fs::read_to_string(path).map_err(|source| StopWordError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let set = Self::parse_delimited(&content);
        log::info!(
            "Loaded {} stop words from {}",
            set.len(),
            path.display()
        );
        Ok(set)
    }

    /// New set holding this set's words followed by any new ones from `other`.
    pub fn merged(&self, other: &StopWordSet) -> Self {
        let mut merged = self.clone();
        for word in other.iter() {
            merged.insert(word);
        }
        merged
    }

    /// Lower-case and re-join on single spaces, splitting on the same
    /// boundaries the analyzer tokenizes text with.
    pub fn normalize(word: &str) -> Option<String> {
        let normalized = tokenize(word).collect::<Vec<_>>().join(" ");
        if normalized.is_empty() {
            None
        } else {
            Some(normalized)
        }
    }

    fn insert(&mut self, word: &str) {
        if let Some(word) = Self::normalize(word) {
            if !self.positions.contains_key(&word) {
                self.positions.insert(word.clone(), self.words.len());
                self.words.push(word);
            }
        }
    }

    pub fn contains(&self, word: &str) -> bool {
        self.positions.contains_key(word)
    }

    /// Insertion index of a normalized word.
    pub fn position(&self, word: &str) -> Option<usize> {
        self.positions.get(word).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.words.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }
}

impl From<Vec<String>> for StopWordSet {
    fn from(words: Vec<String>) -> Self {
        Self::new(words)
    }
}

impl From<StopWordSet> for Vec<String> {
    fn from(set: StopWordSet) -> Self {
        set.words
    }
}
