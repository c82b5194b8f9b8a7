//! Storage backends for URLc.
//!
//! Every backend implements the [`UrlStore`] contract:
//!
//! - [`MapStore`] -- process memory, lost on restart
//! - [`FileStore`] -- append-only JSON-lines [`RecordLog`] plus an index
//!   rebuilt by replaying the log at startup
//! - [`SqlStore`] -- transactional SQLite via `sqlx`, migrated on connect
//!
//! [`open_store`] picks one from a [`StorageConfig`]: a log path selects the
//! file backend, otherwise a DSN selects the SQL backend, otherwise the map.
//!
//! # Rules shared by all backends
//!
//! 1. A short id is bound to one payload forever. Identical re-inserts
//!    succeed; a different payload is a [`StoreError::Conflict`].
//! 2. Batch inserts are all-or-nothing.
//! 3. Deletion is a tombstone. Tombstoned ids resolve to
//!    [`StoreError::Gone`] and drop out of owner listings.
//! 4. All I/O errors are propagated, never silently ignored.

pub mod config;
pub mod error;
pub mod file;
mod index;
pub mod log;
pub mod memory;
pub mod sql;
pub mod traits;

pub use config::{open_store, SqlConfig, StorageConfig};
pub use error::{ErrorKind, StoreError, StoreResult};
pub use file::FileStore;
pub use log::{RecordLog, Replay, SyncMode};
pub use memory::MapStore;
pub use sql::SqlStore;
pub use traits::{Backend, StoreStats, UrlStore};
