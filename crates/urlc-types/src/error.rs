use thiserror::Error;

/// Errors produced by type operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("short id is empty")]
    EmptyShortId,

    #[error("invalid character {ch:?} in short id {id:?}")]
    InvalidShortIdChar { id: String, ch: char },
}
