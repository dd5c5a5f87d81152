//! PostgreSQL storage sink
//!
//! Batches are written with multi-row INSERTs inside one transaction, so a
//! duplicate id anywhere in the batch rolls the whole batch back. Large saves
//! (the direct loader) are split into chunks to stay under PostgreSQL's
//! 65,535 bind parameter limit.

use async_trait::async_trait;
use chrono::NaiveDateTime;
use sales_common::{
    DailySales, GameSale, GameType, ImportJob, Page, PageRequest, SalesFilter,
};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::{Postgres, QueryBuilder, Row};
use tracing::{debug, info};
use uuid::Uuid;

use super::{SalesStore, StorageResult};
use crate::config::DatabaseConfig;
use crate::error::StorageError;

/// 9 binds per row
const INSERT_CHUNK_SIZE: usize = 5000;

const SALE_COLUMNS: &str =
    "id, game_no, game_name, game_code, type, cost_price, tax, sale_price, date_of_sale";

const JOB_COLUMNS: &str = "id, file_name, status, total_records, successful_records, \
     failed_records, error_message, start_time, end_time, create_time, create_by, \
     update_time, update_by";

/// Sink writing to the `game_sales` and `csv_import_info` tables
pub struct PgStore {
    pool: PgPool,
    max_connections: u32,
}

impl PgStore {
    /// Open a pool sized by `config.max_connections`
    pub async fn connect(config: &DatabaseConfig) -> StorageResult<Self> {
        info!(
            max_connections = config.max_connections,
            "Connecting to PostgreSQL sales store"
        );

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.connect_timeout())
            .connect(config.connection_url())
            .await?;

        Ok(Self::from_pool(pool, config.max_connections))
    }

    pub fn from_pool(pool: PgPool, max_connections: u32) -> Self {
        Self {
            pool,
            max_connections,
        }
    }

    /// Create the sales tables if they do not exist yet
    pub async fn migrate(&self) -> StorageResult<()> {
        sqlx::migrate!("../../migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(format!("Migration failed: {}", e)))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn push_filter(builder: &mut QueryBuilder<'_, Postgres>, filter: &SalesFilter) {
    builder.push(" WHERE TRUE");
    if let Some((from, to)) = filter.date_range {
        builder
            .push(" AND date_of_sale BETWEEN ")
            .push_bind(from)
            .push(" AND ")
            .push_bind(to);
    }
    if let Some(min) = &filter.min_price {
        builder.push(" AND sale_price >= ").push_bind(min.clone());
    }
    if let Some(max) = &filter.max_price {
        builder.push(" AND sale_price <= ").push_bind(max.clone());
    }
}

fn sale_from_row(row: &PgRow) -> StorageResult<GameSale> {
    let type_code: i32 = row.try_get("type")?;
    Ok(GameSale {
        id: row.try_get("id")?,
        game_no: row.try_get("game_no")?,
        game_name: row.try_get("game_name")?,
        game_code: row.try_get("game_code")?,
        game_type: GameType::from_code(type_code)
            .map_err(|e| StorageError::Backend(e.to_string()))?,
        cost_price: row.try_get("cost_price")?,
        tax: row.try_get("tax")?,
        sale_price: row.try_get("sale_price")?,
        date_of_sale: row.try_get("date_of_sale")?,
    })
}

fn job_from_row(row: &PgRow) -> StorageResult<ImportJob> {
    let status: String = row.try_get("status")?;
    Ok(ImportJob {
        id: row.try_get("id")?,
        file_name: row.try_get("file_name")?,
        status: status
            .parse()
            .map_err(|e: sales_common::SalesError| StorageError::Backend(e.to_string()))?,
        total_records: row.try_get("total_records")?,
        successful_records: row.try_get("successful_records")?,
        failed_records: row.try_get("failed_records")?,
        error_message: row.try_get("error_message")?,
        start_time: row.try_get("start_time")?,
        end_time: row.try_get("end_time")?,
        created_at: row.try_get("create_time")?,
        created_by: row.try_get("create_by")?,
        updated_at: row.try_get("update_time")?,
        updated_by: row.try_get("update_by")?,
    })
}

#[async_trait]
impl SalesStore for PgStore {
    async fn save(&self, sales: Vec<GameSale>) -> StorageResult<u64> {
        if sales.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await?;
        let mut inserted = 0u64;

        for chunk in sales.chunks(INSERT_CHUNK_SIZE) {
            let mut builder: QueryBuilder<Postgres> =
                QueryBuilder::new(format!("INSERT INTO game_sales ({}) ", SALE_COLUMNS));

            builder.push_values(chunk, |mut b, sale| {
                b.push_bind(sale.id)
                    .push_bind(sale.game_no)
                    .push_bind(&sale.game_name)
                    .push_bind(&sale.game_code)
                    .push_bind(sale.game_type.code())
                    .push_bind(&sale.cost_price)
                    .push_bind(&sale.tax)
                    .push_bind(&sale.sale_price)
                    .push_bind(sale.date_of_sale);
            });

            inserted += builder.build().execute(&mut *tx).await?.rows_affected();
        }

        tx.commit().await?;
        debug!(rows = inserted, "Committed game_sales batch");
        Ok(inserted)
    }

    async fn query(&self, filter: &SalesFilter, page: PageRequest) -> StorageResult<Page<GameSale>> {
        let mut count: QueryBuilder<Postgres> = QueryBuilder::new("SELECT COUNT(*) FROM game_sales");
        push_filter(&mut count, filter);
        let total_elements: i64 = count.build_query_scalar().fetch_one(&self.pool).await?;

        let mut select: QueryBuilder<Postgres> =
            QueryBuilder::new(format!("SELECT {} FROM game_sales", SALE_COLUMNS));
        push_filter(&mut select, filter);
        select
            .push(" ORDER BY id ASC LIMIT ")
            .push_bind(i64::from(page.size))
            .push(" OFFSET ")
            .push_bind(i64::try_from(page.offset()).unwrap_or(i64::MAX));

        let rows = select.build().fetch_all(&self.pool).await?;
        let items = rows.iter().map(sale_from_row).collect::<StorageResult<Vec<_>>>()?;

        Ok(Page {
            items,
            page: page.page,
            size: page.size,
            total_elements: u64::try_from(total_elements).unwrap_or_default(),
        })
    }

    async fn aggregate(
        &self,
        from: NaiveDateTime,
        to: NaiveDateTime,
        game_no: Option<i32>,
    ) -> StorageResult<Vec<DailySales>> {
        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
            "SELECT date_of_sale, COUNT(*) AS total_count, SUM(sale_price) AS total_sales \
             FROM game_sales WHERE date_of_sale BETWEEN ",
        );
        builder.push_bind(from).push(" AND ").push_bind(to);
        if let Some(game_no) = game_no {
            builder.push(" AND game_no = ").push_bind(game_no);
        }
        builder.push(" GROUP BY date_of_sale ORDER BY date_of_sale");

        let rows = builder.build().fetch_all(&self.pool).await?;
        rows.iter()
            .map(|row| -> StorageResult<DailySales> {
                Ok(DailySales {
                    date_of_sale: row.try_get("date_of_sale")?,
                    total_count: row.try_get("total_count")?,
                    total_sales: row.try_get("total_sales")?,
                })
            })
            .collect()
    }

    async fn upsert_job(&self, job: &ImportJob) -> StorageResult<()> {
        sqlx::query(&format!(
            "INSERT INTO csv_import_info ({})
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
             ON CONFLICT (id) DO UPDATE SET
                 status = EXCLUDED.status,
                 total_records = EXCLUDED.total_records,
                 successful_records = EXCLUDED.successful_records,
                 failed_records = EXCLUDED.failed_records,
                 error_message = EXCLUDED.error_message,
                 end_time = EXCLUDED.end_time,
                 update_time = EXCLUDED.update_time,
                 update_by = EXCLUDED.update_by",
            JOB_COLUMNS
        ))
        .bind(job.id)
        .bind(&job.file_name)
        .bind(job.status.as_str())
        .bind(job.total_records)
        .bind(job.successful_records)
        .bind(job.failed_records)
        .bind(&job.error_message)
        .bind(job.start_time)
        .bind(job.end_time)
        .bind(job.created_at)
        .bind(&job.created_by)
        .bind(job.updated_at)
        .bind(&job.updated_by)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_job(&self, id: Uuid) -> StorageResult<Option<ImportJob>> {
        let row = sqlx::query(&format!("SELECT {} FROM csv_import_info WHERE id = $1", JOB_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(job_from_row).transpose()
    }

    async fn list_jobs(&self) -> StorageResult<Vec<ImportJob>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM csv_import_info ORDER BY create_time DESC",
            JOB_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(job_from_row).collect()
    }

    fn max_connections(&self) -> Option<u32> {
        Some(self.max_connections)
    }
}
