//! Error types for the replay subsystem.
//!
//! Stale or missing cache entries are never errors: they degrade to "no
//! delta" or "no checkpoint". [`ReplayError`] covers storage failures,
//! producer failures and caller mistakes.

use thiserror::Error;

/// Failure reported by a [`DeltaProducer`](crate::DeltaProducer).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProducerError {
    /// The producer could not derive a delta.
    #[error("derivation failed: {0}")]
    Failed(String),

    /// Derivation was cancelled before it finished.
    #[error("derivation cancelled")]
    Cancelled,
}

/// Errors that can occur during replay operations.
#[derive(Debug, Error)]
pub enum ReplayError {
    /// `SQLite` database error.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// JSON serialization/deserialization error.
    #[error("serde error: {0}")]
    Serde(#[from] serde_json::Error),

    /// Reading or writing a session file failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The delta producer failed; nothing was stored.
    #[error("producer error: {0}")]
    Producer(#[from] ProducerError),

    /// A position outside the log was requested.
    #[error("position {position} is outside a log of {len} entries")]
    InvalidPosition {
        /// Requested position.
        position: i64,
        /// Log length.
        len: usize,
    },

    /// Internal error (e.g. poisoned lock, corrupt row).
    #[error("internal error: {0}")]
    Internal(String),
}

/// Convenience type alias for replay results.
pub type Result<T> = std::result::Result<T, ReplayError>;

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
