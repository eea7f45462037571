//! Session summary types
//!
//! The summary is the final product of a session besides the exported files:
//! it feeds the Markdown index, `session.json`, and the CLI report.

use crate::crawler::{CounterSnapshot, TerminationReason};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One page touched by the session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub url: String,
    /// Output path relative to the output root
    pub path: String,
    pub title: Option<String>,
    /// Page status code (`exported`, `unchanged`, `not_modified`)
    pub status: String,
}

/// One URL that failed or was skipped
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureEntry {
    pub url: String,
    /// Stable reason code
    pub reason: String,
    pub detail: String,
}

/// Final report of an export session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_secs: f64,
    pub termination: TerminationReason,
    pub counters: CounterSnapshot,
    pub pages: Vec<IndexEntry>,
    pub failures: Vec<FailureEntry>,
}

impl SessionSummary {
    /// Pages skipped because nothing changed (304 or identical output)
    pub fn cached(&self) -> u64 {
        self.counters.unchanged + self.counters.not_modified
    }

    /// Calculates the share of attempted pages that ended with a file, as a percentage
    pub fn success_rate(&self) -> f64 {
        let ok = self.counters.exported + self.cached();
        let attempted = ok + self.counters.failed;
        if attempted == 0 {
            return 0.0;
        }
        (ok as f64 / attempted as f64) * 100.0
    }

    /// Returns true if any URL failed
    pub fn has_failures(&self) -> bool {
        self.counters.failed > 0
    }
}
