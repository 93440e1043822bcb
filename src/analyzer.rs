//! Per-snapshot stop-word scoring.
//!
//! Scoring is a raw frequency sum: every occurrence of a stop word adds one
//! point regardless of how long the page is. Short pages with a handful of
//! matches are therefore not penalized relative to long ones; the domain
//! threshold (see [`crate::classifier::ThresholdPolicy`]) is calibrated
//! against absolute counts.

use crate::snapshot::SnapshotRecord;
use crate::stop_words::StopWordSet;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A stop word and how many times it matched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TermCount {
    pub term: String,
    pub count: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotSignal {
    pub captured_at: DateTime<Utc>,
    pub score: u32,
    /// Distinct matches, most frequent first; ties keep stop-word set order.
    pub matches: Vec<TermCount>,
}

impl SnapshotSignal {
    pub fn matched_terms(&self) -> Vec<&str> {
        self.matches.iter().map(|m| m.term.as_str()).collect()
    }
}

/// Lower-cased alphanumeric runs of `text`.
pub fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
}

pub fn analyze(snapshot: &SnapshotRecord, stop_words: &StopWordSet) -> SnapshotSignal {
    let tokens: Vec<String> = tokenize(&snapshot.text_content).collect();
    let mut counts: HashMap<&str, u32> = HashMap::new();

    if !tokens.is_empty() {
        for word in stop_words.iter() {
            let occurrences = count_occurrences(&tokens, word);
            if occurrences > 0 {
                counts.insert(word, occurrences);
            }
        }
    }

    let mut matches: Vec<TermCount> = counts
        .into_iter()
        .map(|(term, count)| TermCount {
            term: term.to_string(),
            count,
        })
        .collect();
    matches.sort_by(|a, b| {
        b.count.cmp(&a.count).then_with(|| {
            stop_words
                .position(&a.term)
                .cmp(&stop_words.position(&b.term))
        })
    });

    let score = matches.iter().map(|m| m.count).sum();

    log::debug!(
        "Snapshot {} of {} scored {} ({} distinct terms)",
        snapshot.captured_at,
        snapshot.domain,
        score,
        matches.len()
    );

    SnapshotSignal {
        captured_at: snapshot.captured_at,
        score,
        matches,
    }
}

/// Non-overlapping occurrences of a (possibly multi-token) stop word.
fn count_occurrences(tokens: &[String], word: &str) -> u32 {
    let needle: Vec<&str> = word.split(' ').collect();
    if needle.len() == 1 {
        return tokens.iter().filter(|t| t.as_str() == needle[0]).count() as u32;
    }

    let mut count = 0;
    let mut i = 0;
    while i + needle.len() <= tokens.len() {
        if tokens[i..i + needle.len()]
            .iter()
            .zip(&needle)
            .all(|(t, n)| t == n)
        {
            count += 1;
            i += needle.len();
        } else {
            i += 1;
        }
    }
    count
}
