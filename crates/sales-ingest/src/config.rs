//! Ingestion configuration
//!
//! Batch size, worker pool sizing and the finalization deadline for the
//! ingestion pipeline, plus the storage connection settings the pool size is
//! checked against.

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

// ============================================================================
// Ingestion Configuration Constants
// ============================================================================

/// Default number of accepted rows per batch.
pub const DEFAULT_BATCH_SIZE: usize = 1000;

/// Default number of parallel batch workers.
pub const DEFAULT_WORKER_COUNT: usize = 10;

/// Default deadline for outstanding batches once the stream ends (1 hour).
pub const DEFAULT_COMPLETION_TIMEOUT_SECS: u64 = 3600;

/// Default actor recorded in job audit fields.
pub const DEFAULT_IMPORT_ACTOR: &str = "sales-ingest";

/// Default database URL for local development.
pub const DEFAULT_DATABASE_URL: &str = "postgresql://localhost/sales";

/// Default maximum database connections in the pool.
pub const DEFAULT_DATABASE_MAX_CONNECTIONS: u32 = 10;

/// Default database connection timeout in seconds.
pub const DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    pub batch_size: usize,
    pub worker_count: usize,
    /// Bounded queue length between producer and workers; `None` means one
    /// slot per worker
    pub queue_capacity: Option<usize>,
    pub completion_timeout_secs: u64,
    pub import_actor: String,
    pub database: DatabaseConfig,
}

/// Storage connection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Set only when `DATABASE_URL` is present
    pub url: Option<String>,
    pub max_connections: u32,
    pub connect_timeout_secs: u64,
}

impl DatabaseConfig {
    pub fn connection_url(&self) -> &str {
        self.url.as_deref().unwrap_or(DEFAULT_DATABASE_URL)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

impl IngestConfig {
    /// Load `.env` (if any), then read configuration from the environment
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_env()
    }

    /// Read configuration from environment variables, falling back to the
    /// `DEFAULT_*` constants
    pub fn from_env() -> anyhow::Result<Self> {
        let config = Self {
            batch_size: env_or("SALES_BATCH_SIZE", DEFAULT_BATCH_SIZE)?,
            worker_count: env_or("SALES_WORKER_COUNT", DEFAULT_WORKER_COUNT)?,
            queue_capacity: std::env::var("SALES_QUEUE_CAPACITY")
                .ok()
                .map(|v| parse_var("SALES_QUEUE_CAPACITY", &v))
                .transpose()?,
            completion_timeout_secs: env_or(
                "SALES_COMPLETION_TIMEOUT_SECS",
                DEFAULT_COMPLETION_TIMEOUT_SECS,
            )?,
            import_actor: std::env::var("SALES_IMPORT_ACTOR")
                .unwrap_or_else(|_| DEFAULT_IMPORT_ACTOR.to_string()),
            database: DatabaseConfig {
                url: std::env::var("DATABASE_URL").ok(),
                max_connections: env_or(
                    "DATABASE_MAX_CONNECTIONS",
                    DEFAULT_DATABASE_MAX_CONNECTIONS,
                )?,
                connect_timeout_secs: env_or(
                    "DATABASE_CONNECT_TIMEOUT",
                    DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS,
                )?,
            },
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.batch_size == 0 {
            anyhow::bail!("SALES_BATCH_SIZE must be greater than 0");
        }
        if self.worker_count == 0 {
            anyhow::bail!("SALES_WORKER_COUNT must be greater than 0");
        }
        if self.queue_capacity == Some(0) {
            anyhow::bail!("SALES_QUEUE_CAPACITY must be greater than 0");
        }
        if self.completion_timeout_secs == 0 {
            anyhow::bail!("SALES_COMPLETION_TIMEOUT_SECS must be greater than 0");
        }
        if self.database.max_connections == 0 {
            anyhow::bail!("DATABASE_MAX_CONNECTIONS must be greater than 0");
        }

        // Each worker holds one connection for the length of a batch save
        if self.worker_count > self.database.max_connections as usize {
            anyhow::bail!(
                "SALES_WORKER_COUNT ({}) cannot be greater than DATABASE_MAX_CONNECTIONS ({})",
                self.worker_count,
                self.database.max_connections
            );
        }

        Ok(())
    }

    pub fn queue_capacity(&self) -> usize {
        self.queue_capacity.unwrap_or(self.worker_count)
    }

    pub fn completion_timeout(&self) -> Duration {
        Duration::from_secs(self.completion_timeout_secs)
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_worker_count(mut self, worker_count: usize) -> Self {
        self.worker_count = worker_count;
        self
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = Some(capacity);
        self
    }

    pub fn with_completion_timeout(mut self, timeout: Duration) -> Self {
        self.completion_timeout_secs = timeout.as_secs().max(1);
        self
    }

    pub fn with_import_actor(mut self, actor: impl Into<String>) -> Self {
        self.import_actor = actor.into();
        self
    }

    pub fn with_max_connections(mut self, max_connections: u32) -> Self {
        self.database.max_connections = max_connections;
        self
    }
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            worker_count: DEFAULT_WORKER_COUNT,
            queue_capacity: None,
            completion_timeout_secs: DEFAULT_COMPLETION_TIMEOUT_SECS,
            import_actor: DEFAULT_IMPORT_ACTOR.to_string(),
            database: DatabaseConfig {
                url: None,
                max_connections: DEFAULT_DATABASE_MAX_CONNECTIONS,
                connect_timeout_secs: DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS,
            },
        }
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> anyhow::Result<T>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(value) => parse_var(key, &value),
        Err(_) => Ok(default),
    }
}

fn parse_var<T: FromStr>(key: &str, value: &str) -> anyhow::Result<T>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid value for {}: '{}' ({})", key, value, e))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = IngestConfig::default();
        assert_eq!(config.batch_size, 1000);
        assert_eq!(config.worker_count, 10);
        assert_eq!(config.queue_capacity(), 10);
        assert_eq!(config.completion_timeout(), Duration::from_secs(3600));
        assert_eq!(config.database.connection_url(), DEFAULT_DATABASE_URL);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rejects_zero_sizes() {
        assert!(IngestConfig::default().with_batch_size(0).validate().is_err());
        assert!(IngestConfig::default().with_worker_count(0).validate().is_err());
        assert!(IngestConfig::default().with_queue_capacity(0).validate().is_err());
        assert!(IngestConfig::default().with_max_connections(0).validate().is_err());
    }

    #[test]
    fn test_workers_bounded_by_connections() {
        let config = IngestConfig::default()
            .with_worker_count(12)
            .with_max_connections(8);
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("SALES_WORKER_COUNT (12)"));

        assert!(IngestConfig::default()
            .with_worker_count(8)
            .with_max_connections(8)
            .validate()
            .is_ok());
    }

    #[test]
    fn test_queue_capacity_override() {
        let config = IngestConfig::default().with_worker_count(4);
        assert_eq!(config.queue_capacity(), 4);
        assert_eq!(config.with_queue_capacity(16).queue_capacity(), 16);
    }

    #[test]
    fn test_parse_var_reports_key() {
        let err = parse_var::<usize>("SALES_BATCH_SIZE", "lots").unwrap_err();
        assert!(err.to_string().contains("SALES_BATCH_SIZE"));
        assert_eq!(parse_var::<usize>("SALES_BATCH_SIZE", " 250 ").unwrap(), 250);
    }
}
