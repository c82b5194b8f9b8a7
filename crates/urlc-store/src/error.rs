use std::time::Duration;

use urlc_types::ShortId;

/// Coarse classification of a [`StoreError`].
///
/// Callers that only need to decide between "tell the client" and "retry
/// later" match on this instead of on the backend-specific variants.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// The key is already claimed by different content.
    Conflict,
    /// The key was never assigned (or the owner has no records).
    NotFound,
    /// The key exists but is tombstoned.
    Gone,
    /// Transient or permanent I/O, database, or lifecycle failure.
    IoFailure,
}

/// Errors from storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The short id is already bound to a different payload.
    #[error("short id {0} is already bound to different content")]
    Conflict(ShortId),

    /// Nothing is stored under the requested key.
    #[error("not found: {0}")]
    NotFound(String),

    /// The record exists but has been soft-deleted.
    #[error("short id {0} has been deleted")]
    Gone(ShortId),

    /// I/O error from the underlying file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Error reported by the SQL driver.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Schema migration failed while connecting.
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// Record could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// A complete line of the append-only log does not decode.
    #[error("corrupt log line {line}: {reason}")]
    CorruptLog { line: usize, reason: String },

    /// An earlier append failed and could not be rolled back.
    #[error("record log {} is unusable after a failed append", .0.display())]
    LogUnusable(std::path::PathBuf),

    /// The operation exceeded its deadline.
    #[error("operation timed out after {0:?}")]
    Timeout(Duration),

    /// The store has been shut down.
    #[error("store is shut down")]
    Closed,
}

impl StoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Conflict(_) => ErrorKind::Conflict,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Gone(_) => ErrorKind::Gone,
            Self::Io(_)
            | Self::Database(_)
            | Self::Migration(_)
            | Self::Serialization(_)
            | Self::CorruptLog { .. }
            | Self::LogUnusable(_)
            | Self::Timeout(_)
            | Self::Closed => ErrorKind::IoFailure,
        }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
