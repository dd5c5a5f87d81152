//! Direct bulk load
//!
//! Shortcut that skips batching and per-row validation: the whole file is
//! mapped and handed to the store in a single `save`. A row that cannot be
//! converted aborts the load, as does any row the store refuses. The run is
//! still tracked as an import job, with `failed = 0` on success.

use bigdecimal::BigDecimal;
use sales_common::{parse_sale_timestamp, GameSale, GameType, ImportJob};
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use tracing::info;

use crate::error::{IngestError, Result};
use crate::job::JobLifecycle;
use crate::parser::{RawRow, RowParser};
use crate::progress::ProgressSnapshot;
use crate::storage::SalesStore;

pub struct DirectLoader {
    store: Arc<dyn SalesStore>,
    actor: String,
}

impl DirectLoader {
    pub fn new(store: Arc<dyn SalesStore>, actor: impl Into<String>) -> Self {
        Self {
            store,
            actor: actor.into(),
        }
    }

    /// Load the file at `path` in one shot and return the finished job
    pub async fn load(&self, path: impl AsRef<Path>, file_name: &str) -> ImportJob {
        let mut lifecycle =
            JobLifecycle::create(file_name, self.actor.clone(), Arc::clone(&self.store)).await;

        let finalized = match lifecycle.ensure_processing().await {
            Ok(()) => match self.load_file(path.as_ref()).await {
                Ok(inserted) => {
                    info!(job_id = %lifecycle.id(), rows = inserted, "Direct load finished");
                    let progress = ProgressSnapshot {
                        total: inserted,
                        succeeded: inserted,
                        failed: 0,
                    };
                    lifecycle.complete(progress, None).await
                },
                Err(e) => lifecycle.fail(e.to_string(), ProgressSnapshot::default()).await,
            },
            Err(e) => Err(e),
        };

        if let Err(e) = finalized {
            tracing::warn!(job_id = %lifecycle.id(), error = %e, "Could not finalize load job");
        }
        lifecycle.into_job()
    }

    async fn load_file(&self, path: &Path) -> Result<u64> {
        let file = tokio::fs::File::open(path).await?;
        let mut parser = RowParser::open(file).await?;

        let mut sales = Vec::new();
        while let Some(parsed) = parser.next_row().await? {
            let row = parsed.map_err(|e| IngestError::InvalidRow {
                line: e.line,
                reason: e.reason,
            })?;
            sales.push(map_row(&row)?);
        }

        Ok(self.store.save(sales).await?)
    }
}

/// Type conversion only; value ranges are left to the store
fn map_row(row: &RawRow) -> Result<GameSale> {
    let game_type: i32 = field(row, "type")?;
    let date = raw(row, "date_of_sale")?;

    Ok(GameSale {
        id: field(row, "id")?,
        game_no: field(row, "game_no")?,
        game_name: raw(row, "game_name")?.to_string(),
        game_code: raw(row, "game_code")?.to_string(),
        game_type: GameType::from_code(game_type).map_err(|e| invalid(row, e))?,
        cost_price: field::<BigDecimal>(row, "cost_price")?,
        tax: field::<BigDecimal>(row, "tax")?,
        sale_price: field::<BigDecimal>(row, "sale_price")?,
        date_of_sale: parse_sale_timestamp(date.trim()).map_err(|e| invalid(row, e))?,
    })
}

fn raw<'a>(row: &'a RawRow, column: &str) -> Result<&'a str> {
    row.get(column)
        .ok_or_else(|| invalid(row, format!("column '{}' is missing", column)))
}

fn field<T: FromStr>(row: &RawRow, column: &str) -> Result<T> {
    let value = raw(row, column)?;
    value
        .trim()
        .parse()
        .map_err(|_| invalid(row, format!("column '{}' has an unreadable value '{}'", column, value)))
}

fn invalid(row: &RawRow, reason: impl ToString) -> IngestError {
    IngestError::InvalidRow {
        line: row.line,
        reason: reason.to_string(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use sales_common::ImportStatus;
    use std::io::Write;

    const HEADER: &str = "id,game_no,game_name,game_code,type,cost_price,tax,sale_price,date_of_sale\n";

    fn write_csv(body: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{HEADER}{body}").unwrap();
        file
    }

    #[tokio::test]
    async fn test_load_skips_range_checks() {
        let store = Arc::new(MemoryStore::new());
        let loader = DirectLoader::new(store.clone(), "loader");

        // tax 8.5 would be rejected by the batch pipeline
        let file = write_csv(
            "1,10,A,B,1,5.00,8.5,5.45,2025-04-01 10:00:00\n\
             2,11,C,D,2,6.00,9.0,6.54,2025-04-02 10:00:00\n",
        );
        let job = loader.load(file.path(), "bulk.csv").await;

        assert_eq!(job.status, ImportStatus::Completed);
        assert_eq!(
            (job.total_records, job.successful_records, job.failed_records),
            (2, 2, 0)
        );
        assert_eq!(store.sales_count().await, 2);
        assert_eq!(
            store.job_history(job.id).await,
            vec![ImportStatus::Pending, ImportStatus::Processing, ImportStatus::Completed]
        );
    }

    #[tokio::test]
    async fn test_unconvertible_row_fails_whole_load() {
        let store = Arc::new(MemoryStore::new());
        let loader = DirectLoader::new(store.clone(), "loader");

        let file = write_csv(
            "1,10,A,B,1,5.00,9.0,5.45,2025-04-01 10:00:00\n\
             x,10,A,B,1,5.00,9.0,5.45,2025-04-01 10:00:00\n",
        );
        let job = loader.load(file.path(), "bulk.csv").await;

        assert_eq!(job.status, ImportStatus::Failed);
        assert!(job.error_message.unwrap().contains("Line 3"));
        assert_eq!(store.sales_count().await, 0);
    }

    #[tokio::test]
    async fn test_missing_file_fails_job() {
        let store = Arc::new(MemoryStore::new());
        let loader = DirectLoader::new(store, "loader");

        let job = loader.load("/nonexistent/sales.csv", "sales.csv").await;
        assert_eq!(job.status, ImportStatus::Failed);
        assert!(job.error_message.is_some());
    }
}
