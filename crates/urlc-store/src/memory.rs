use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

use async_trait::async_trait;
use tracing::debug;
use urlc_types::{DeletionRequest, ShortId, UrlRecord};

use crate::error::{StoreError, StoreResult};
use crate::index::{Admission, RecordIndex};
use crate::traits::{Backend, StoreStats, UrlStore};

/// In-memory, HashMap-based store.
///
/// Nothing survives a restart. All reads and writes go through one `RwLock`,
/// so concurrent callers never observe a half-applied batch.
pub struct MapStore {
    index: RwLock<RecordIndex>,
    closed: AtomicBool,
}

impl MapStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self {
            index: RwLock::new(RecordIndex::new()),
            closed: AtomicBool::new(false),
        }
    }

    /// Number of records held, tombstoned included.
    pub fn len(&self) -> usize {
        self.index.read().expect("lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn ensure_open(&self) -> StoreResult<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(StoreError::Closed);
        }
        Ok(())
    }
}

impl Default for MapStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl UrlStore for MapStore {
    fn backend(&self) -> Backend {
        Backend::Map
    }

    async fn insert_one(&self, record: &UrlRecord) -> StoreResult<()> {
        self.ensure_open()?;
        let mut index = self.index.write().expect("lock poisoned");
        if index.admit(record)? == Admission::New {
            index.insert(record.clone());
            debug!(short_id = %record.short_id, "map insert");
        }
        Ok(())
    }

    async fn insert_batch(&self, records: &[UrlRecord]) -> StoreResult<()> {
        self.ensure_open()?;
        let mut index = self.index.write().expect("lock poisoned");
        let fresh = index.plan_batch(records)?;
        let count = fresh.len();
        for record in fresh {
            index.insert(record);
        }
        debug!(requested = records.len(), inserted = count, "map batch insert");
        Ok(())
    }

    async fn resolve(&self, short_id: &ShortId) -> StoreResult<String> {
        self.ensure_open()?;
        self.index.read().expect("lock poisoned").resolve(short_id)
    }

    async fn list_by_owner(&self, owner_id: &str) -> StoreResult<Vec<UrlRecord>> {
        self.ensure_open()?;
        self.index
            .read()
            .expect("lock poisoned")
            .list_by_owner(owner_id)
    }

    async fn mark_deleted(&self, requests: &[DeletionRequest]) -> StoreResult<()> {
        self.ensure_open()?;
        let mut index = self.index.write().expect("lock poisoned");
        let doomed = index.plan_deletions(requests);
        for record in &doomed {
            index.tombstone(&record.short_id);
        }
        debug!(requested = requests.len(), tombstoned = doomed.len(), "map mark deleted");
        Ok(())
    }

    async fn stats(&self) -> StoreResult<StoreStats> {
        self.ensure_open()?;
        Ok(self.index.read().expect("lock poisoned").stats())
    }

    async fn health_check(&self) -> StoreResult<()> {
        self.ensure_open()
    }

    async fn shutdown(&self) -> StoreResult<()> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}

impl std::fmt::Debug for MapStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MapStore")
            .field("record_count", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    fn rec(id: &str, payload: &str, owner: &str) -> UrlRecord {
        UrlRecord::new(ShortId::new_unchecked(id), payload, owner)
    }

    #[tokio::test]
    async fn insert_and_resolve() {
        let store = MapStore::new();
        store.insert_one(&rec("a1", "https://example.com/a", "u")).await.unwrap();
        let payload = store.resolve(&ShortId::new_unchecked("a1")).await.unwrap();
        assert_eq!(payload, "https://example.com/a");
    }

    #[tokio::test]
    async fn reinsert_same_payload_is_noop() {
        let store = MapStore::new();
        let record = rec("a1", "https://example.com/a", "u");
        store.insert_one(&record).await.unwrap();
        store.insert_one(&record).await.unwrap();
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn different_payload_conflicts() {
        let store = MapStore::new();
        store.insert_one(&rec("a1", "https://example.com/a", "u")).await.unwrap();
        let err = store
            .insert_one(&rec("a1", "https://example.com/b", "u"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
        assert_eq!(
            store.resolve(&ShortId::new_unchecked("a1")).await.unwrap(),
            "https://example.com/a"
        );
    }

    #[tokio::test]
    async fn conflicting_batch_writes_nothing() {
        let store = MapStore::new();
        store.insert_one(&rec("a1", "https://example.com/a", "u")).await.unwrap();
        let err = store
            .insert_batch(&[
                rec("b1", "https://example.com/b", "u"),
                rec("a1", "https://example.com/zzz", "u"),
            ])
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
        assert!(matches!(
            store.resolve(&ShortId::new_unchecked("b1")).await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn deletion_requires_owner() {
        let store = MapStore::new();
        store.insert_one(&rec("a1", "https://example.com/a", "alice")).await.unwrap();
        store
            .mark_deleted(&[DeletionRequest::new(ShortId::new_unchecked("a1"), "mallory")])
            .await
            .unwrap();
        assert!(store.resolve(&ShortId::new_unchecked("a1")).await.is_ok());

        store
            .mark_deleted(&[DeletionRequest::new(ShortId::new_unchecked("a1"), "alice")])
            .await
            .unwrap();
        assert!(matches!(
            store.resolve(&ShortId::new_unchecked("a1")).await,
            Err(StoreError::Gone(_))
        ));
    }

    #[tokio::test]
    async fn concurrent_inserts_are_all_visible() {
        let store = Arc::new(MapStore::new());
        let mut handles = Vec::new();
        for i in 0..32 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                let record = rec(&format!("k{i}"), &format!("https://example.com/{i}"), "u");
                store.insert_one(&record).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }
        assert_eq!(store.len(), 32);
        assert_eq!(store.stats().await.unwrap(), StoreStats { urls: 32, users: 1 });
    }

    #[tokio::test]
    async fn shutdown_is_idempotent_and_closes() {
        let store = MapStore::new();
        store.shutdown().await.unwrap();
        store.shutdown().await.unwrap();
        assert!(matches!(store.health_check().await, Err(StoreError::Closed)));
        assert!(matches!(
            store.resolve(&ShortId::new_unchecked("a")).await,
            Err(StoreError::Closed)
        ));
    }
}
