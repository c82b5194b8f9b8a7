use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use urlc_store::StorageConfig;

use crate::error::{ServiceError, ServiceResult};

/// Tuning for the deletion batcher.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatcherConfig {
    /// Pending requests the queue holds before producers wait.
    pub queue_capacity: usize,
    pub flush_interval_ms: u64,
    /// Failed flush attempts after which a batch is dropped.
    pub max_attempts: u32,
    /// Delay before the first retry; doubles on every further failure.
    pub retry_backoff_ms: u64,
}

impl BatcherConfig {
    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms.max(1))
    }

    /// Delay before retrying after `attempts` consecutive failures.
    pub fn backoff(&self, attempts: u32) -> Duration {
        let factor = 1u32 << attempts.saturating_sub(1).min(16);
        Duration::from_millis(self.retry_backoff_ms).saturating_mul(factor)
    }
}

impl Default for BatcherConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 1024,
            flush_interval_ms: 10_000,
            max_attempts: 3,
            retry_backoff_ms: 500,
        }
    }
}

/// Top-level service configuration.
///
/// Layered as defaults, then a TOML file, then environment variables
/// (`BASE_URL`, `FILE_STORAGE_PATH`, `DATABASE_DSN`), then explicit flags
/// applied by the binary.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Prefix of rendered short URLs, without a trailing slash.
    pub base_url: String,
    pub storage: StorageConfig,
    pub deletion: BatcherConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".into(),
            storage: StorageConfig::default(),
            deletion: BatcherConfig::default(),
        }
    }
}

impl ServiceConfig {
    pub fn from_toml_str(raw: &str) -> ServiceResult<Self> {
        toml::from_str(raw).map_err(|e| ServiceError::Config(e.to_string()))
    }

    pub fn load(path: &Path) -> ServiceResult<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }

    /// Override fields from the process environment.
    pub fn apply_env(&mut self) {
        self.apply_env_from(|key| std::env::var(key).ok());
    }

    /// Override fields from `lookup`; empty values are ignored.
    pub fn apply_env_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |key: &str| lookup(key).filter(|v| !v.is_empty());
        if let Some(base_url) = get("BASE_URL") {
            self.base_url = base_url;
        }
        if let Some(path) = get("FILE_STORAGE_PATH") {
            self.storage.file_storage_path = Some(path.into());
        }
        if let Some(dsn) = get("DATABASE_DSN") {
            self.storage.database_dsn = Some(dsn);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::path::PathBuf;

    use urlc_store::Backend;

    use super::*;

    #[test]
    fn default_config() {
        let c = ServiceConfig::default();
        assert_eq!(c.base_url, "http://localhost:8080");
        assert_eq!(c.storage.backend(), Backend::Map);
        assert_eq!(c.deletion.queue_capacity, 1024);
        assert_eq!(c.deletion.flush_interval(), Duration::from_secs(10));
    }

    #[test]
    fn parses_toml() {
        let c = ServiceConfig::from_toml_str(
            r#"
            base_url = "https://sho.rt"

            [storage]
            database_dsn = "sqlite://urls.db"

            [storage.sql]
            op_timeout_ms = 250

            [deletion]
            flush_interval_ms = 100
            "#,
        )
        .unwrap();
        assert_eq!(c.base_url, "https://sho.rt");
        assert_eq!(c.storage.backend(), Backend::Sql);
        assert_eq!(c.storage.sql.op_timeout_ms, 250);
        assert_eq!(c.storage.sql.max_connections, 5);
        assert_eq!(c.deletion.flush_interval_ms, 100);
        assert_eq!(c.deletion.max_attempts, 3);
    }

    #[test]
    fn rejects_malformed_toml() {
        assert!(matches!(
            ServiceConfig::from_toml_str("base_url = "),
            Err(ServiceError::Config(_))
        ));
    }

    #[test]
    fn load_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("urlc.toml");
        std::fs::write(&path, "base_url = \"https://x.y\"\n").unwrap();
        assert_eq!(ServiceConfig::load(&path).unwrap().base_url, "https://x.y");
        assert!(matches!(
            ServiceConfig::load(&dir.path().join("missing.toml")),
            Err(ServiceError::Io(_))
        ));
    }

    #[test]
    fn env_overrides_file_values() {
        let env: HashMap<&str, &str> = [
            ("BASE_URL", "https://env.example"),
            ("FILE_STORAGE_PATH", "/var/lib/urlc/urls.log"),
            ("DATABASE_DSN", ""),
        ]
        .into_iter()
        .collect();

        let mut c = ServiceConfig::default();
        c.storage.database_dsn = Some("sqlite://file.db".into());
        c.apply_env_from(|k| env.get(k).map(|v| v.to_string()));

        assert_eq!(c.base_url, "https://env.example");
        assert_eq!(
            c.storage.file_storage_path,
            Some(PathBuf::from("/var/lib/urlc/urls.log"))
        );
        assert_eq!(c.storage.database_dsn.as_deref(), Some("sqlite://file.db"));
        assert_eq!(c.storage.backend(), Backend::File);
    }

    #[test]
    fn backoff_doubles() {
        let c = BatcherConfig {
            retry_backoff_ms: 100,
            ..BatcherConfig::default()
        };
        assert_eq!(c.backoff(1), Duration::from_millis(100));
        assert_eq!(c.backoff(2), Duration::from_millis(200));
        assert_eq!(c.backoff(4), Duration::from_millis(800));
    }
}
