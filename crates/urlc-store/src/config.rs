use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::StoreResult;
use crate::file::FileStore;
use crate::log::SyncMode;
use crate::memory::MapStore;
use crate::sql::SqlStore;
use crate::traits::{Backend, UrlStore};

/// Settings for the SQL backend.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SqlConfig {
    pub max_connections: u32,
    /// Per-operation deadline in milliseconds; `0` disables it.
    pub op_timeout_ms: u64,
}

impl SqlConfig {
    pub fn op_timeout(&self) -> Option<Duration> {
        (self.op_timeout_ms > 0).then(|| Duration::from_millis(self.op_timeout_ms))
    }
}

impl Default for SqlConfig {
    fn default() -> Self {
        Self {
            max_connections: 5,
            op_timeout_ms: 5_000,
        }
    }
}

/// Storage settings; decides which backend [`open_store`] builds.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Path of the append-only record log.
    pub file_storage_path: Option<PathBuf>,
    /// SQL connection string, e.g. `sqlite://urls.db`.
    pub database_dsn: Option<String>,
    pub sync_mode: SyncMode,
    pub sql: SqlConfig,
}

impl StorageConfig {
    /// The backend this configuration selects.
    ///
    /// A file path wins over a DSN; with neither, the map backend is used.
    /// Empty strings count as absent.
    pub fn backend(&self) -> Backend {
        if self
            .file_storage_path
            .as_ref()
            .is_some_and(|p| !p.as_os_str().is_empty())
        {
            Backend::File
        } else if self.database_dsn.as_ref().is_some_and(|d| !d.is_empty()) {
            Backend::Sql
        } else {
            Backend::Map
        }
    }
}

/// Build the backend selected by `config`.
///
/// Failing to open the log or to connect and migrate the database is an
/// error the caller should treat as fatal.
pub async fn open_store(config: &StorageConfig) -> StoreResult<Arc<dyn UrlStore>> {
    let backend = config.backend();
    let store: Arc<dyn UrlStore> = match (backend, &config.file_storage_path, &config.database_dsn) {
        (Backend::File, Some(path), _) => Arc::new(FileStore::open(path, config.sync_mode)?),
        (Backend::Sql, _, Some(dsn)) => Arc::new(SqlStore::connect(dsn, &config.sql).await?),
        _ => Arc::new(MapStore::new()),
    };
    info!(backend = %backend, "storage backend ready");
    Ok(store)
}
