use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::short_id::ShortId;

/// The persisted unit of every storage backend.
///
/// Field names on the wire follow the file-log format, one JSON object per
/// line:
///
/// ```text
/// {"user_id": "...", "uuid": "...", "short_url": "...", "original_url": "...",
///  "correlation_id": "...", "is_deleted": false}
/// ```
///
/// A record is created once, may later be tombstoned, and is never otherwise
/// mutated or physically removed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UrlRecord {
    /// Session that submitted the payload; empty when anonymous.
    #[serde(rename = "user_id", default)]
    pub owner_id: String,
    /// Audit/log correlation id, independent of the short id.
    #[serde(rename = "uuid")]
    pub record_id: Uuid,
    /// Content-derived lookup key.
    #[serde(rename = "short_url")]
    pub short_id: ShortId,
    /// The original content being shortened.
    #[serde(rename = "original_url")]
    pub payload: String,
    /// Caller-supplied tag echoed back by batch operations. Not unique.
    #[serde(default)]
    pub correlation_id: String,
    /// Tombstone flag.
    #[serde(rename = "is_deleted", default)]
    pub deleted: bool,
}

impl UrlRecord {
    /// Build a live record with a fresh time-ordered record id.
    pub fn new(short_id: ShortId, payload: impl Into<String>, owner_id: impl Into<String>) -> Self {
        Self {
            owner_id: owner_id.into(),
            record_id: Uuid::now_v7(),
            short_id,
            payload: payload.into(),
            correlation_id: String::new(),
            deleted: false,
        }
    }

    /// Attach a correlation id.
    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = correlation_id.into();
        self
    }

    /// A copy of this record with the tombstone set.
    pub fn tombstoned(&self) -> Self {
        Self {
            deleted: true,
            ..self.clone()
        }
    }

    /// Whether `owner_id` may tombstone this record.
    pub fn owned_by(&self, owner_id: &str) -> bool {
        self.owner_id == owner_id
    }
}

/// A soft-delete request, consumed once by the deletion batcher.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeletionRequest {
    pub short_id: ShortId,
    pub owner_id: String,
}

impl DeletionRequest {
    pub fn new(short_id: ShortId, owner_id: impl Into<String>) -> Self {
        Self {
            short_id,
            owner_id: owner_id.into(),
        }
    }
}
