use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};
use urlc_id::ShortIdGenerator;
use urlc_store::{open_store, StoreStats, UrlStore};
use urlc_types::{DeletionRequest, ShortId, UrlRecord};

use crate::batcher::{BatcherStats, DeletionBatcher, FlushReport};
use crate::config::{BatcherConfig, ServiceConfig};
use crate::error::{ServiceError, ServiceResult};

/// One entry of a batch shortening request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchItem {
    pub correlation_id: String,
    pub original_url: String,
}

/// Result for one [`BatchItem`], in request order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchResult {
    pub correlation_id: String,
    pub short_url: String,
}

/// A live URL belonging to an owner.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserUrl {
    pub short_url: String,
    pub original_url: String,
}

/// The shortening workflow over a single storage backend.
///
/// Short ids come from the generator, records go to the store, and deletion
/// requests are handed to the [`DeletionBatcher`].
pub struct UrlService {
    store: Arc<dyn UrlStore>,
    batcher: DeletionBatcher,
    generator: ShortIdGenerator,
    base_url: String,
}

impl UrlService {
    /// Must be called from within a Tokio runtime; spawns the deletion worker.
    pub fn new(store: Arc<dyn UrlStore>, base_url: impl Into<String>, deletion: BatcherConfig) -> Self {
        let base_url: String = base_url.into();
        let batcher = DeletionBatcher::spawn(Arc::clone(&store), deletion);
        Self {
            store,
            batcher,
            generator: ShortIdGenerator::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Open the configured backend and build a service on it.
    pub async fn start(config: &ServiceConfig) -> ServiceResult<Self> {
        let store = open_store(&config.storage).await?;
        info!(backend = %store.backend(), base_url = %config.base_url, "url service started");
        Ok(Self::new(store, config.base_url.clone(), config.deletion.clone()))
    }

    pub fn store(&self) -> &Arc<dyn UrlStore> {
        &self.store
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Render `id` as a full short URL.
    pub fn short_url(&self, id: &ShortId) -> String {
        format!("{}/{}", self.base_url, id)
    }

    /// Store `payload` for `owner_id` and return its short id.
    ///
    /// Shortening the same payload twice yields the same id.
    #[instrument(skip(self, payload), fields(len = payload.len()))]
    pub async fn shorten(&self, payload: &[u8], owner_id: &str) -> ServiceResult<ShortId> {
        let url = validate_payload(payload)?;
        let short_id = self.generator.assign(url.as_bytes())?;
        self.store
            .insert_one(&UrlRecord::new(short_id.clone(), url, owner_id))
            .await?;
        debug!(%short_id, "payload shortened");
        Ok(short_id)
    }

    /// Shorten several payloads atomically, echoing each correlation id.
    pub async fn shorten_batch(
        &self,
        items: &[BatchItem],
        owner_id: &str,
    ) -> ServiceResult<Vec<BatchResult>> {
        let mut records = Vec::with_capacity(items.len());
        let mut results = Vec::with_capacity(items.len());
        for item in items {
            let url = validate_payload(item.original_url.as_bytes())?;
            let short_id = self.generator.assign(url.as_bytes())?;
            results.push(BatchResult {
                correlation_id: item.correlation_id.clone(),
                short_url: self.short_url(&short_id),
            });
            records.push(
                UrlRecord::new(short_id, url, owner_id)
                    .with_correlation_id(item.correlation_id.clone()),
            );
        }
        if records.is_empty() {
            return Ok(results);
        }

        self.store.insert_batch(&records).await?;
        debug!(count = records.len(), "batch shortened");
        Ok(results)
    }

    /// Look up the original URL behind `raw_id`.
    pub async fn resolve(&self, raw_id: &str) -> ServiceResult<String> {
        let short_id = ShortId::parse(raw_id)?;
        Ok(self.store.resolve(&short_id).await?)
    }

    /// Live URLs owned by `owner_id`.
    pub async fn user_urls(&self, owner_id: &str) -> ServiceResult<Vec<UserUrl>> {
        let records = self.store.list_by_owner(owner_id).await?;
        Ok(records
            .into_iter()
            .map(|r| UserUrl {
                short_url: self.short_url(&r.short_id),
                original_url: r.payload,
            })
            .collect())
    }

    /// Queue `ids` for deletion on behalf of `owner_id`.
    ///
    /// All ids are validated before any is queued. The tombstones become
    /// visible after the next flush.
    pub async fn request_deletion<S: AsRef<str>>(
        &self,
        ids: &[S],
        owner_id: &str,
    ) -> ServiceResult<usize> {
        let ids = ids
            .iter()
            .map(|id| ShortId::parse(id.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        let count = ids.len();
        for short_id in ids {
            self.batcher
                .enqueue(DeletionRequest::new(short_id, owner_id))
                .await?;
        }
        debug!(count, owner_id, "deletion requested");
        Ok(count)
    }

    /// Apply queued deletions now instead of waiting for the next tick.
    pub async fn flush_deletions(&self) -> ServiceResult<FlushReport> {
        Ok(self.batcher.flush().await?)
    }

    pub async fn stats(&self) -> ServiceResult<StoreStats> {
        Ok(self.store.stats().await?)
    }

    pub fn deletion_stats(&self) -> BatcherStats {
        self.batcher.stats()
    }

    pub async fn ping(&self) -> ServiceResult<()> {
        Ok(self.store.health_check().await?)
    }

    /// Drain pending deletions, then close the store.
    pub async fn shutdown(&self) -> ServiceResult<FlushReport> {
        let report = self.batcher.shutdown().await?;
        self.store.shutdown().await?;
        info!(applied = report.applied, dropped = report.dropped, "url service stopped");
        Ok(report)
    }
}

impl std::fmt::Debug for UrlService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UrlService")
            .field("backend", &self.store.backend())
            .field("base_url", &self.base_url)
            .finish()
    }
}

fn validate_payload(payload: &[u8]) -> ServiceResult<String> {
    if payload.is_empty() {
        return Err(ServiceError::InvalidPayload("payload is empty".into()));
    }
    let url = std::str::from_utf8(payload)
        .map_err(|e| ServiceError::InvalidPayload(format!("not UTF-8: {e}")))?;
    Ok(url.to_string())
}

#[cfg(test)]
mod tests {
    use urlc_store::{MapStore, StoreError};

    use super::*;

    fn service() -> UrlService {
        UrlService::new(
            Arc::new(MapStore::new()),
            "http://localhost:8080/",
            BatcherConfig {
                flush_interval_ms: 3_600_000,
                ..BatcherConfig::default()
            },
        )
    }

    #[tokio::test]
    async fn shorten_resolve_delete() {
        let svc = service();
        let id = svc.shorten(b"https://example.com/a", "u1").await.unwrap();
        assert_eq!(
            svc.shorten(b"https://example.com/a", "u1").await.unwrap(),
            id
        );
        assert_eq!(svc.resolve(id.as_str()).await.unwrap(), "https://example.com/a");

        assert_eq!(svc.request_deletion(&[id.as_str()], "u1").await.unwrap(), 1);
        assert_eq!(svc.flush_deletions().await.unwrap().applied, 1);
        assert!(matches!(
            svc.resolve(id.as_str()).await,
            Err(ServiceError::Store(StoreError::Gone(_)))
        ));
    }

    #[tokio::test]
    async fn rejects_bad_input() {
        let svc = service();
        assert!(matches!(
            svc.shorten(b"", "u").await,
            Err(ServiceError::InvalidPayload(_))
        ));
        assert!(matches!(
            svc.shorten(&[0xff, 0xfe], "u").await,
            Err(ServiceError::InvalidPayload(_))
        ));
        assert!(matches!(
            svc.resolve("no/slashes").await,
            Err(ServiceError::InvalidShortId(_))
        ));
        assert!(matches!(
            svc.request_deletion(&["ok", ""], "u").await,
            Err(ServiceError::InvalidShortId(_))
        ));
        assert_eq!(svc.flush_deletions().await.unwrap(), FlushReport::default());
    }

    #[tokio::test]
    async fn batch_echoes_correlation_ids() {
        let svc = service();
        let items = vec![
            BatchItem {
                correlation_id: "c1".into(),
                original_url: "https://a.example".into(),
            },
            BatchItem {
                correlation_id: "c2".into(),
                original_url: "https://b.example".into(),
            },
        ];
        let results = svc.shorten_batch(&items, "u").await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].correlation_id, "c1");
        assert_eq!(results[1].correlation_id, "c2");
        assert!(results[0].short_url.starts_with("http://localhost:8080/"));

        let urls = svc.user_urls("u").await.unwrap();
        assert_eq!(urls.len(), 2);
        assert_eq!(urls[0].short_url, results[0].short_url);
        assert_eq!(urls[0].original_url, "https://a.example");

        assert!(svc.shorten_batch(&[], "u").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn stats_and_shutdown() {
        let svc = service();
        svc.shorten(b"https://a.example", "u1").await.unwrap();
        svc.shorten(b"https://b.example", "u2").await.unwrap();
        svc.shorten(b"https://c.example", "").await.unwrap();
        assert_eq!(svc.stats().await.unwrap(), StoreStats { urls: 3, users: 2 });
        svc.ping().await.unwrap();

        let id = svc.shorten(b"https://d.example", "u1").await.unwrap();
        svc.request_deletion(&[id.as_str()], "u1").await.unwrap();
        assert_eq!(svc.shutdown().await.unwrap().applied, 1);
        assert!(matches!(
            svc.ping().await,
            Err(ServiceError::Store(StoreError::Closed))
        ));
        assert!(matches!(
            svc.request_deletion(&[id.as_str()], "u1").await,
            Err(ServiceError::Batch(_))
        ));
    }

    #[tokio::test]
    async fn start_uses_configured_backend() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = ServiceConfig::default();
        config.storage.file_storage_path = Some(dir.path().join("urls.log"));

        let svc = UrlService::start(&config).await.unwrap();
        assert_eq!(svc.store().backend(), urlc_store::Backend::File);
        let id = svc.shorten(b"https://persist.example", "u").await.unwrap();
        svc.shutdown().await.unwrap();

        let svc = UrlService::start(&config).await.unwrap();
        assert_eq!(svc.resolve(id.as_str()).await.unwrap(), "https://persist.example");
        svc.shutdown().await.unwrap();
    }
}
