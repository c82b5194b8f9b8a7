use std::future::Future;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::FromRow;
use tracing::{debug, info};
use urlc_types::{DeletionRequest, ShortId, UrlRecord};
use uuid::Uuid;

use crate::config::SqlConfig;
use crate::error::{StoreError, StoreResult};
use crate::traits::{Backend, StoreStats, UrlStore};

const INSERT_URL: &str = r#"
INSERT INTO urls (short_url, original_url, correlation_id, user_id, uuid, is_deleted)
VALUES (?, ?, ?, ?, ?, ?)
ON CONFLICT(short_url) DO NOTHING
"#;

/// How long a connection waits for the database write lock.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Row shape of the `urls` table.
#[derive(Debug, FromRow)]
struct UrlRow {
    short_url: String,
    original_url: String,
    correlation_id: Option<String>,
    user_id: Option<String>,
    uuid: Option<String>,
    is_deleted: bool,
}

impl TryFrom<UrlRow> for UrlRecord {
    type Error = StoreError;

    fn try_from(row: UrlRow) -> Result<Self, Self::Error> {
        // Rows written before the uuid column existed carry no record id.
        let record_id = match row.uuid.as_deref() {
            Some(raw) => Uuid::parse_str(raw).map_err(|e| {
                StoreError::Serialization(format!("uuid of {}: {e}", row.short_url))
            })?,
            None => Uuid::nil(),
        };
        Ok(UrlRecord {
            owner_id: row.user_id.unwrap_or_default(),
            record_id,
            short_id: ShortId::new_unchecked(row.short_url),
            payload: row.original_url,
            correlation_id: row.correlation_id.unwrap_or_default(),
            deleted: row.is_deleted,
        })
    }
}

/// Transactional SQL backend on SQLite.
///
/// The schema is brought up to date by the embedded migrations before
/// [`SqlStore::connect`] returns. Every operation runs under the configured
/// timeout.
///
/// Reads go through `pool`. Writes go through `writer`, a pool of exactly
/// one connection, so in-process writers queue for that connection instead
/// of racing each other for the SQLite write lock.
#[derive(Debug, Clone)]
pub struct SqlStore {
    pool: SqlitePool,
    writer: SqlitePool,
    op_timeout: Option<Duration>,
}

impl SqlStore {
    /// Connect to `dsn` and run migrations.
    ///
    /// `sqlite::memory:` databases are pinned to one long-lived pooled
    /// connection; each SQLite memory connection is a separate database.
    pub async fn connect(dsn: &str, config: &SqlConfig) -> StoreResult<Self> {
        let options = SqliteConnectOptions::from_str(dsn)?
            .create_if_missing(true)
            .busy_timeout(BUSY_TIMEOUT);
        let in_memory = dsn.contains(":memory:") || dsn.contains("mode=memory");

        let (pool, writer) = if in_memory {
            let pool = SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None::<Duration>)
                .max_lifetime(None::<Duration>)
                .connect_with(options)
                .await?;
            (pool.clone(), pool)
        } else {
            let options = options.journal_mode(SqliteJournalMode::Wal);
            let writer = SqlitePoolOptions::new()
                .max_connections(1)
                .connect_with(options.clone())
                .await?;
            let pool = SqlitePoolOptions::new()
                .max_connections(config.max_connections.max(1))
                .connect_with(options)
                .await?;
            (pool, writer)
        };

        sqlx::migrate!("./migrations").run(&writer).await?;

        info!(in_memory, max_connections = config.max_connections, "sql store connected");
        Ok(Self {
            pool,
            writer,
            op_timeout: config.op_timeout(),
        })
    }

    /// In-memory database, used by tests and ephemeral deployments.
    pub async fn connect_in_memory() -> StoreResult<Self> {
        Self::connect("sqlite::memory:", &SqlConfig::default()).await
    }

    fn ensure_open(&self) -> StoreResult<()> {
        if self.writer.is_closed() {
            return Err(StoreError::Closed);
        }
        Ok(())
    }

    /// Run `fut` under the per-operation deadline, if one is configured.
    async fn bounded<T, F>(&self, fut: F) -> StoreResult<T>
    where
        F: Future<Output = StoreResult<T>> + Send,
    {
        self.ensure_open()?;
        match self.op_timeout {
            Some(limit) => tokio::time::timeout(limit, fut)
                .await
                .map_err(|_| StoreError::Timeout(limit))?,
            None => fut.await,
        }
    }

    /// Insert `records` in one transaction; any conflict rolls back all.
    ///
    /// Each row is inserted first and compared second, so the transaction
    /// holds the write lock from its first statement on. A row that already
    /// exists is a duplicate when the stored payload matches and a conflict
    /// otherwise.
    async fn insert_records(&self, records: &[UrlRecord]) -> StoreResult<()> {
        let mut tx = self.writer.begin().await?;
        let mut inserted = 0usize;

        for record in records {
            let result = sqlx::query(INSERT_URL)
                .bind(record.short_id.as_str())
                .bind(&record.payload)
                .bind(&record.correlation_id)
                .bind(&record.owner_id)
                .bind(record.record_id.to_string())
                .bind(record.deleted)
                .execute(&mut *tx)
                .await;
            let affected = match result {
                Ok(done) => done.rows_affected(),
                Err(e) => {
                    tx.rollback().await?;
                    return Err(map_insert_error(e, &record.short_id));
                }
            };
            if affected > 0 {
                inserted += 1;
                continue;
            }

            let existing: Option<String> =
                sqlx::query_scalar("SELECT original_url FROM urls WHERE short_url = ?")
                    .bind(record.short_id.as_str())
                    .fetch_optional(&mut *tx)
                    .await?;
            if existing.as_deref() != Some(record.payload.as_str()) {
                tx.rollback().await?;
                return Err(StoreError::Conflict(record.short_id.clone()));
            }
        }

        tx.commit().await?;
        debug!(requested = records.len(), inserted, "sql insert committed");
        Ok(())
    }

    async fn select_resolve(&self, short_id: &ShortId) -> StoreResult<String> {
        let row: Option<(String, bool)> =
            sqlx::query_as("SELECT original_url, is_deleted FROM urls WHERE short_url = ?")
                .bind(short_id.as_str())
                .fetch_optional(&self.pool)
                .await?;
        match row {
            None => Err(StoreError::NotFound(short_id.to_string())),
            Some((_, true)) => Err(StoreError::Gone(short_id.clone())),
            Some((payload, false)) => Ok(payload),
        }
    }

    async fn select_by_owner(&self, owner_id: &str) -> StoreResult<Vec<UrlRecord>> {
        let rows: Vec<UrlRow> = sqlx::query_as(
            r#"
            SELECT short_url, original_url, correlation_id, user_id, uuid, is_deleted
            FROM urls
            WHERE user_id = ? AND is_deleted = FALSE
            ORDER BY rowid
            "#,
        )
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await?;

        if rows.is_empty() {
            return Err(StoreError::NotFound(format!("records of owner {owner_id:?}")));
        }
        rows.into_iter().map(UrlRecord::try_from).collect()
    }

    async fn update_deleted(&self, requests: &[DeletionRequest]) -> StoreResult<()> {
        let mut tx = self.writer.begin().await?;
        let mut tombstoned = 0u64;
        for request in requests {
            tombstoned += sqlx::query(
                "UPDATE urls SET is_deleted = TRUE WHERE short_url = ? AND user_id = ? AND is_deleted = FALSE",
            )
            .bind(request.short_id.as_str())
            .bind(&request.owner_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        }
        tx.commit().await?;
        debug!(requested = requests.len(), tombstoned, "sql mark deleted");
        Ok(())
    }

    async fn select_stats(&self) -> StoreResult<StoreStats> {
        let urls: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM urls WHERE is_deleted = FALSE")
            .fetch_one(&self.pool)
            .await?;
        let users: i64 = sqlx::query_scalar(
            "SELECT COUNT(DISTINCT user_id) FROM urls WHERE user_id IS NOT NULL AND user_id <> ''",
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(StoreStats {
            urls: urls as u64,
            users: users as u64,
        })
    }

    async fn ping(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

/// Unique-constraint violations become `Conflict`; everything else stays a
/// database failure.
fn map_insert_error(err: sqlx::Error, short_id: &ShortId) -> StoreError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            StoreError::Conflict(short_id.clone())
        }
        _ => StoreError::Database(err),
    }
}

#[async_trait]
impl UrlStore for SqlStore {
    fn backend(&self) -> Backend {
        Backend::Sql
    }

    async fn insert_one(&self, record: &UrlRecord) -> StoreResult<()> {
        self.bounded(self.insert_records(std::slice::from_ref(record)))
            .await
    }

    async fn insert_batch(&self, records: &[UrlRecord]) -> StoreResult<()> {
        if records.is_empty() {
            return Ok(());
        }
        self.bounded(self.insert_records(records)).await
    }

    async fn resolve(&self, short_id: &ShortId) -> StoreResult<String> {
        self.bounded(self.select_resolve(short_id)).await
    }

    async fn list_by_owner(&self, owner_id: &str) -> StoreResult<Vec<UrlRecord>> {
        self.bounded(self.select_by_owner(owner_id)).await
    }

    async fn mark_deleted(&self, requests: &[DeletionRequest]) -> StoreResult<()> {
        if requests.is_empty() {
            return Ok(());
        }
        self.bounded(self.update_deleted(requests)).await
    }

    async fn stats(&self) -> StoreResult<StoreStats> {
        self.bounded(self.select_stats()).await
    }

    async fn health_check(&self) -> StoreResult<()> {
        self.bounded(self.ping()).await
    }

    async fn shutdown(&self) -> StoreResult<()> {
        if !self.writer.is_closed() {
            self.writer.close().await;
            self.pool.close().await;
            info!("sql store closed");
        }
        Ok(())
    }
}
