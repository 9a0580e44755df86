//! Error types for snapshot loading, delta parsing and ingestion.

use std::path::PathBuf;

use thiserror::Error;

use crate::types::{Side, Timestamp};

/// Errors surfaced by the replay engine. None of them are retried: the
/// computation is deterministic, so the caller decides whether to skip the
/// window or abort.
#[derive(Debug, Error)]
pub enum BookError {
    /// Snapshot is missing required fields or carries unparseable numbers.
    #[error("malformed snapshot {}: {reason}", .path.display())]
    MalformedSnapshot { path: PathBuf, reason: String },

    /// A side has no levels when a best price is required.
    #[error("{side} side of the book is empty")]
    EmptyBook { side: Side },

    /// Delta sequence went backwards in time (strict ordering only).
    #[error("delta {index} has timestamp {timestamp} earlier than {previous}")]
    TimestampOrder {
        index: usize,
        previous: Timestamp,
        timestamp: Timestamp,
    },

    /// Pre-allocated series cannot hold every distinct timestamp.
    #[error("time series holds {available} slots but deltas need {required}")]
    ArraySizeMismatch { required: usize, available: usize },

    /// A delta row could not be parsed.
    #[error("malformed delta at line {line}: {reason}")]
    MalformedDelta { line: usize, reason: String },

    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl BookError {
    /// Stable name of the error kind, used in per-window diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            BookError::MalformedSnapshot { .. } => "MalformedSnapshotError",
            BookError::EmptyBook { .. } => "EmptyBookError",
            BookError::TimestampOrder { .. } => "TimestampOrderError",
            BookError::ArraySizeMismatch { .. } => "ArraySizeMismatchError",
            BookError::MalformedDelta { .. } => "MalformedDeltaError",
            BookError::Io { .. } => "IoError",
        }
    }

    pub(crate) fn malformed_snapshot(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        BookError::MalformedSnapshot {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn malformed_delta(line: usize, reason: impl Into<String>) -> Self {
        BookError::MalformedDelta {
            line,
            reason: reason.into(),
        }
    }
}
