//! Output module for the exported tree
//!
//! This module handles:
//! - Mapping URLs to collision-free Markdown paths
//! - Atomic file placement used by manifest commits
//! - The session index (`SUMMARY.md`) and `session.json`

mod markdown;
mod paths;
mod summary;
mod writer;

pub use markdown::{format_index, write_index, SESSION_JSON};
pub use paths::{host_key, relative_link, sanitize_segment, PathPlanner};
pub use summary::{FailureEntry, IndexEntry, SessionSummary};
pub use writer::{check_writable, write_atomic, StagedFile};

use thiserror::Error;

/// Errors that can occur during output operations
#[derive(Debug, Error)]
pub enum OutputError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to serialize summary: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for output operations
pub type OutputResult<T> = Result<T, OutputError>;
