use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use async_trait::async_trait;
use tracing::{debug, info};
use urlc_types::{DeletionRequest, ShortId, UrlRecord};

use crate::error::{StoreError, StoreResult};
use crate::index::{Admission, RecordIndex};
use crate::log::{RecordLog, SyncMode};
use crate::traits::{Backend, StoreStats, UrlStore};

/// State shared with blocking write tasks.
///
/// Writers hold the `log` mutex for the whole plan-append-apply step, which
/// serializes them. Readers only ever take the `index` lock, so they never
/// wait behind an append or an `fsync`. `log` is `None` once shut down.
struct Shared {
    index: RwLock<RecordIndex>,
    log: Mutex<Option<RecordLog>>,
}

/// Append-only file backend.
///
/// The [`RecordLog`] is the durable source of truth; the in-memory index is
/// rebuilt from it at startup and updated after every successful append.
/// Writes go to the log first, so the index never holds a record the log
/// does not. File I/O runs on the blocking thread pool.
pub struct FileStore {
    path: PathBuf,
    shared: Arc<Shared>,
    closed: AtomicBool,
}

impl FileStore {
    /// Open the log at `path`, replaying it into a fresh index.
    ///
    /// Fails if the file cannot be opened or a complete line is corrupt.
    pub fn open(path: impl AsRef<Path>, sync_mode: SyncMode) -> StoreResult<Self> {
        let path = path.as_ref();
        let (log, replay) = RecordLog::open(path, sync_mode)?;

        let mut index = RecordIndex::new();
        let lines = replay.records.len();
        for record in replay.records {
            index.replay(record);
        }

        info!(
            path = %path.display(),
            lines,
            records = index.len(),
            torn_bytes = replay.torn_bytes,
            "file store opened"
        );

        Ok(Self {
            path: path.to_path_buf(),
            shared: Arc::new(Shared {
                index: RwLock::new(index),
                log: Mutex::new(Some(log)),
            }),
            closed: AtomicBool::new(false),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of records held, tombstoned included.
    pub fn len(&self) -> usize {
        self.shared.index.read().expect("lock poisoned").len()
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

    /// Run `op` with exclusive access to the log on the blocking pool.
    async fn write<T, F>(&self, op: F) -> StoreResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&RwLock<RecordIndex>, &mut RecordLog) -> StoreResult<T> + Send + 'static,
    {
        self.ensure_open()?;
        let shared = Arc::clone(&self.shared);
        tokio::task::spawn_blocking(move || {
            let mut log = shared.log.lock().expect("lock poisoned");
            let log = log.as_mut().ok_or(StoreError::Closed)?;
            op(&shared.index, log)
        })
        .await
        .map_err(|e| StoreError::Io(std::io::Error::other(e)))?
    }
}

#[async_trait]
impl UrlStore for FileStore {
    fn backend(&self) -> Backend {
        Backend::File
    }

    async fn insert_one(&self, record: &UrlRecord) -> StoreResult<()> {
        let record = record.clone();
        self.write(move |index, log| {
            if index.read().expect("lock poisoned").admit(&record)? == Admission::Duplicate {
                debug!(short_id = %record.short_id, "file insert of existing record");
                return Ok(());
            }
            log.append(std::slice::from_ref(&record))?;
            index.write().expect("lock poisoned").insert(record);
            Ok(())
        })
        .await
    }

    async fn insert_batch(&self, records: &[UrlRecord]) -> StoreResult<()> {
        let records = records.to_vec();
        self.write(move |index, log| {
            let fresh = index.read().expect("lock poisoned").plan_batch(&records)?;
            if fresh.is_empty() {
                return Ok(());
            }
            log.append(&fresh)?;
            let mut index = index.write().expect("lock poisoned");
            for record in fresh {
                index.insert(record);
            }
            Ok(())
        })
        .await
    }

    async fn resolve(&self, short_id: &ShortId) -> StoreResult<String> {
        self.ensure_open()?;
        self.shared
            .index
            .read()
            .expect("lock poisoned")
            .resolve(short_id)
    }

    async fn list_by_owner(&self, owner_id: &str) -> StoreResult<Vec<UrlRecord>> {
        self.ensure_open()?;
        self.shared
            .index
            .read()
            .expect("lock poisoned")
            .list_by_owner(owner_id)
    }

    async fn mark_deleted(&self, requests: &[DeletionRequest]) -> StoreResult<()> {
        let requests = requests.to_vec();
        self.write(move |index, log| {
            let tombstones = index.read().expect("lock poisoned").plan_deletions(&requests);
            if tombstones.is_empty() {
                return Ok(());
            }
            log.append(&tombstones)?;
            let mut index = index.write().expect("lock poisoned");
            for record in &tombstones {
                index.tombstone(&record.short_id);
            }
            debug!(requested = requests.len(), tombstoned = tombstones.len(), "file mark deleted");
            Ok(())
        })
        .await
    }

    async fn stats(&self) -> StoreResult<StoreStats> {
        self.ensure_open()?;
        Ok(self.shared.index.read().expect("lock poisoned").stats())
    }

    async fn health_check(&self) -> StoreResult<()> {
        self.ensure_open()?;
        tokio::fs::metadata(&self.path).await?;
        Ok(())
    }

    async fn shutdown(&self) -> StoreResult<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        let shared = Arc::clone(&self.shared);
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || {
            let log = shared.log.lock().expect("lock poisoned").take();
            if let Some(mut log) = log {
                log.sync()?;
                info!(path = %path.display(), offset = log.offset(), "file store closed");
            }
            Ok::<(), StoreError>(())
        })
        .await
        .map_err(|e| StoreError::Io(std::io::Error::other(e)))?
    }
}

impl std::fmt::Debug for FileStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileStore")
            .field("path", &self.path)
            .field("record_count", &self.len())
            .finish()
    }
}
