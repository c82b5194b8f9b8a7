use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use urlc_types::{DeletionRequest, ShortId, UrlRecord};

use crate::error::StoreResult;

/// Which backend variant a store is.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    Map,
    File,
    Sql,
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Map => "map",
            Self::File => "file",
            Self::Sql => "sql",
        };
        f.write_str(name)
    }
}

/// Aggregate counters reported by [`UrlStore::stats`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreStats {
    /// Live (not tombstoned) records.
    pub urls: u64,
    /// Distinct non-empty owners across all records.
    pub users: u64,
}

/// The storage contract shared by every backend.
///
/// All implementations must satisfy these invariants:
/// - A short id maps to exactly one payload for the lifetime of the store.
///   Re-inserting the identical payload succeeds without side effects;
///   inserting a different payload under a taken short id is a `Conflict`.
/// - Batch inserts are all-or-nothing.
/// - A tombstoned record resolves to `Gone`, never to its payload and never
///   to `NotFound`. Records are never physically removed.
/// - Listings exclude tombstoned records.
/// - `shutdown` is idempotent; operations after it fail with `Closed`.
///
/// Every operation may be cancelled by dropping its future.
#[async_trait]
pub trait UrlStore: Send + Sync {
    /// Which variant this store is.
    fn backend(&self) -> Backend;

    /// Insert one record.
    async fn insert_one(&self, record: &UrlRecord) -> StoreResult<()>;

    /// Insert a batch of records atomically.
    async fn insert_batch(&self, records: &[UrlRecord]) -> StoreResult<()>;

    /// Resolve a short id to its payload.
    ///
    /// Returns `Gone` for tombstoned records and `NotFound` for ids that were
    /// never assigned.
    async fn resolve(&self, short_id: &ShortId) -> StoreResult<String>;

    /// All live records submitted by `owner_id`, oldest first.
    ///
    /// Returns `NotFound` when the owner has no live records.
    async fn list_by_owner(&self, owner_id: &str) -> StoreResult<Vec<UrlRecord>>;

    /// Tombstone every record named in `requests` that belongs to the
    /// requesting owner. Unknown ids and foreign owners are skipped.
    async fn mark_deleted(&self, requests: &[DeletionRequest]) -> StoreResult<()>;

    /// Aggregate counters.
    async fn stats(&self) -> StoreResult<StoreStats>;

    /// Liveness check. Must not wait behind insert/resolve traffic.
    async fn health_check(&self) -> StoreResult<()>;

    /// Release files or connections.
    async fn shutdown(&self) -> StoreResult<()>;
}
