//! In-memory storage sink

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::NaiveDateTime;
use sales_common::{
    DailySales, GameSale, ImportJob, ImportStatus, Page, PageRequest, SalesFilter,
};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{SalesStore, StorageResult};
use crate::error::StorageError;

#[derive(Debug, Default)]
struct State {
    sales: BTreeMap<i64, GameSale>,
    jobs: HashMap<Uuid, ImportJob>,
    job_history: HashMap<Uuid, Vec<ImportStatus>>,
}

/// Sink backed by in-process maps.
///
/// Behaves like a table with a primary key on `id`: a batch that repeats an
/// id, or carries one already stored, is refused as a whole. Latency and
/// failures can be injected, and it keeps track of how many saves ran at
/// once.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<State>,
    save_delay: Option<Duration>,
    max_connections: Option<u32>,
    fail_saves: AtomicBool,
    fail_job_updates: AtomicBool,
    saves_in_flight: AtomicUsize,
    peak_saves_in_flight: AtomicUsize,
    save_calls: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep this long inside every `save`
    pub fn with_save_delay(mut self, delay: Duration) -> Self {
        self.save_delay = Some(delay);
        self
    }

    pub fn with_max_connections(mut self, max_connections: u32) -> Self {
        self.max_connections = Some(max_connections);
        self
    }

    /// Make every following `save` fail with a backend error
    pub fn set_fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    /// Make every following `upsert_job` fail with a backend error
    pub fn set_fail_job_updates(&self, fail: bool) {
        self.fail_job_updates.store(fail, Ordering::SeqCst);
    }

    pub async fn sales_count(&self) -> usize {
        self.state.lock().await.sales.len()
    }

    /// Statuses `job` was stored with, in order
    pub async fn job_history(&self, id: Uuid) -> Vec<ImportStatus> {
        self.state
            .lock()
            .await
            .job_history
            .get(&id)
            .cloned()
            .unwrap_or_default()
    }

    /// Highest number of `save` calls that were running at the same time
    pub fn peak_concurrent_saves(&self) -> usize {
        self.peak_saves_in_flight.load(Ordering::SeqCst)
    }

    pub fn save_calls(&self) -> u64 {
        self.save_calls.load(Ordering::SeqCst)
    }

    async fn store_batch(&self, sales: Vec<GameSale>) -> StorageResult<u64> {
        if let Some(delay) = self.save_delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(StorageError::Backend("save rejected by store".to_string()));
        }

        let mut state = self.state.lock().await;

        let mut batch_ids = HashSet::with_capacity(sales.len());
        for sale in &sales {
            if state.sales.contains_key(&sale.id) || !batch_ids.insert(sale.id) {
                return Err(StorageError::DuplicateKey(format!("game_sales.id = {}", sale.id)));
            }
        }

        let count = sales.len() as u64;
        for sale in sales {
            state.sales.insert(sale.id, sale);
        }
        Ok(count)
    }
}

/// Decrements the in-flight counter even if the save future is dropped
struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl SalesStore for MemoryStore {
    async fn save(&self, sales: Vec<GameSale>) -> StorageResult<u64> {
        self.save_calls.fetch_add(1, Ordering::SeqCst);
        let running = self.saves_in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        let _in_flight = InFlight(&self.saves_in_flight);
        self.peak_saves_in_flight.fetch_max(running, Ordering::SeqCst);

        self.store_batch(sales).await
    }

    async fn query(&self, filter: &SalesFilter, page: PageRequest) -> StorageResult<Page<GameSale>> {
        let state = self.state.lock().await;

        let matching: Vec<&GameSale> = state.sales.values().filter(|s| filter.matches(s)).collect();
        let total_elements = matching.len() as u64;
        let items = matching
            .into_iter()
            .skip(usize::try_from(page.offset()).unwrap_or(usize::MAX))
            .take(page.size as usize)
            .cloned()
            .collect();

        Ok(Page {
            items,
            page: page.page,
            size: page.size,
            total_elements,
        })
    }

    async fn aggregate(
        &self,
        from: NaiveDateTime,
        to: NaiveDateTime,
        game_no: Option<i32>,
    ) -> StorageResult<Vec<DailySales>> {
        let state = self.state.lock().await;

        let mut groups: BTreeMap<NaiveDateTime, (i64, BigDecimal)> = BTreeMap::new();
        for sale in state.sales.values() {
            if sale.date_of_sale < from || sale.date_of_sale > to {
                continue;
            }
            if game_no.is_some_and(|n| n != sale.game_no) {
                continue;
            }
            let entry = groups
                .entry(sale.date_of_sale)
                .or_insert_with(|| (0, BigDecimal::from(0)));
            entry.0 += 1;
            entry.1 += &sale.sale_price;
        }

        Ok(groups
            .into_iter()
            .map(|(date_of_sale, (total_count, total_sales))| DailySales {
                date_of_sale,
                total_count,
                total_sales,
            })
            .collect())
    }

    async fn upsert_job(&self, job: &ImportJob) -> StorageResult<()> {
        if self.fail_job_updates.load(Ordering::SeqCst) {
            return Err(StorageError::Backend("job update rejected by store".to_string()));
        }

        let mut state = self.state.lock().await;
        let history = state.job_history.entry(job.id).or_default();
        if history.last() != Some(&job.status) {
            history.push(job.status);
        }
        state.jobs.insert(job.id, job.clone());
        Ok(())
    }

    async fn get_job(&self, id: Uuid) -> StorageResult<Option<ImportJob>> {
        Ok(self.state.lock().await.jobs.get(&id).cloned())
    }

    async fn list_jobs(&self) -> StorageResult<Vec<ImportJob>> {
        let state = self.state.lock().await;
        let mut jobs: Vec<ImportJob> = state.jobs.values().cloned().collect();
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(jobs)
    }

    fn max_connections(&self) -> Option<u32> {
        self.max_connections
    }
}
