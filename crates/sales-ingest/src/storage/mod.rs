//! Storage sinks for game sales and import jobs
//!
//! The pipeline only talks to [`SalesStore`]. Two implementations ship:
//!
//! - [`MemoryStore`]: in-process maps, for tests and dry runs
//! - `PgStore` (feature `database`): PostgreSQL through `sqlx`

use async_trait::async_trait;
use chrono::NaiveDateTime;
use sales_common::{DailySales, GameSale, ImportJob, Page, PageRequest, SalesFilter};
use uuid::Uuid;

use crate::error::StorageError;

pub mod memory;
#[cfg(feature = "database")]
pub mod postgres;

pub use memory::MemoryStore;
#[cfg(feature = "database")]
pub use postgres::PgStore;

pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Persistence collaborator of the ingestion pipeline
#[async_trait]
pub trait SalesStore: Send + Sync {
    /// Persist one batch atomically and return the number of rows written.
    ///
    /// All-or-nothing: on error none of `sales` is stored.
    async fn save(&self, sales: Vec<GameSale>) -> StorageResult<u64>;

    /// Filtered page of stored sales, ordered by id ascending
    async fn query(&self, filter: &SalesFilter, page: PageRequest) -> StorageResult<Page<GameSale>>;

    /// Count and sale price total per sale timestamp within `from..=to`,
    /// optionally for a single game number
    async fn aggregate(
        &self,
        from: NaiveDateTime,
        to: NaiveDateTime,
        game_no: Option<i32>,
    ) -> StorageResult<Vec<DailySales>>;

    /// Create or overwrite the stored copy of `job`
    async fn upsert_job(&self, job: &ImportJob) -> StorageResult<()>;

    async fn get_job(&self, id: Uuid) -> StorageResult<Option<ImportJob>>;

    /// All jobs, most recent first
    async fn list_jobs(&self) -> StorageResult<Vec<ImportJob>>;

    /// Concurrent connection capacity, if the sink has a limit
    fn max_connections(&self) -> Option<u32> {
        None
    }
}
