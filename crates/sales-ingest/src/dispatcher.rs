//! Bounded worker pool for batch persistence
//!
//! The producer hands batches to [`Dispatcher::submit`], which only waits
//! when the queue is full. A fixed set of workers pull from the shared queue;
//! each one re-validates its batch, maps it to storage form and makes one
//! `save` call. With `W` workers at most `W` saves run at once, which is what
//! keeps the pool inside the store's connection capacity.
//!
//! [`Dispatcher::finish`] closes the queue and waits for the workers up to a
//! deadline. Whatever the outcome, no worker is running once it returns.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use tracing::{debug, error, instrument, warn};

use crate::batcher::Batch;
use crate::error::{IngestError, Result};
use crate::progress::ProgressTracker;
use crate::storage::SalesStore;
use crate::validator;

type SharedReceiver = Arc<Mutex<mpsc::Receiver<Batch>>>;

/// What the workers did with the submitted batches
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchSummary {
    pub batches_submitted: u64,
    pub batches_saved: u64,
    /// Batches the store refused; their records count neither way
    pub batches_failed: u64,
    /// Batches left empty by re-validation; never sent to the store
    pub batches_skipped: u64,
    pub records_saved: u64,
    /// Records dropped by worker-side re-validation
    pub records_rejected: u64,
}

#[derive(Debug, Default)]
struct WorkerReport {
    batches_saved: u64,
    batches_failed: u64,
    batches_skipped: u64,
    records_saved: u64,
    records_rejected: u64,
}

impl DispatchSummary {
    fn absorb(&mut self, report: WorkerReport) {
        self.batches_saved += report.batches_saved;
        self.batches_failed += report.batches_failed;
        self.batches_skipped += report.batches_skipped;
        self.records_saved += report.records_saved;
        self.records_rejected += report.records_rejected;
    }
}

/// Fixed-size pool of batch workers fed through a bounded queue
pub struct Dispatcher {
    sender: mpsc::Sender<Batch>,
    workers: JoinSet<WorkerReport>,
    batches_submitted: u64,
}

impl Dispatcher {
    /// Spawn `worker_count` workers behind a queue of `queue_capacity` batches.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(
        worker_count: usize,
        queue_capacity: usize,
        store: Arc<dyn SalesStore>,
        progress: Arc<ProgressTracker>,
    ) -> Self {
        let (sender, receiver) = mpsc::channel(queue_capacity.max(1));
        let receiver: SharedReceiver = Arc::new(Mutex::new(receiver));

        let mut workers = JoinSet::new();
        for worker_id in 0..worker_count.max(1) {
            workers.spawn(run_worker(
                worker_id,
                Arc::clone(&receiver),
                Arc::clone(&store),
                Arc::clone(&progress),
            ));
        }

        debug!(worker_count, queue_capacity, "Started batch workers");

        Self {
            sender,
            workers,
            batches_submitted: 0,
        }
    }

    /// Queue `batch` for a worker; waits only while the queue is full
    pub async fn submit(&mut self, batch: Batch) -> Result<()> {
        self.sender
            .send(batch)
            .await
            .map_err(|_| IngestError::DispatcherClosed)?;
        self.batches_submitted += 1;
        Ok(())
    }

    pub fn batches_submitted(&self) -> u64 {
        self.batches_submitted
    }

    /// Close the queue and wait for every worker, at most `deadline`.
    ///
    /// On timeout or a worker panic the remaining workers are aborted and
    /// joined before the error is returned.
    pub async fn finish(self, deadline: Duration) -> Result<DispatchSummary> {
        let Dispatcher {
            sender,
            mut workers,
            batches_submitted,
        } = self;
        drop(sender);

        let mut summary = DispatchSummary {
            batches_submitted,
            ..DispatchSummary::default()
        };

        let joined = tokio::time::timeout(deadline, async {
            while let Some(result) = workers.join_next().await {
                match result {
                    Ok(report) => summary.absorb(report),
                    Err(join_err) => return Err(IngestError::WorkerPanicked(join_err.to_string())),
                }
            }
            Ok(())
        })
        .await;

        match joined {
            Ok(Ok(())) => Ok(summary),
            Ok(Err(err)) => {
                error!(error = %err, "Batch worker failed, aborting remaining workers");
                workers.shutdown().await;
                Err(err)
            },
            Err(_) => {
                error!(
                    ?deadline,
                    outstanding_workers = workers.len(),
                    "Batches did not finish in time, aborting workers"
                );
                workers.shutdown().await;
                Err(IngestError::CompletionTimeout(deadline))
            },
        }
    }
}

#[instrument(name = "batch_worker", skip(receiver, store, progress))]
async fn run_worker(
    worker_id: usize,
    receiver: SharedReceiver,
    store: Arc<dyn SalesStore>,
    progress: Arc<ProgressTracker>,
) -> WorkerReport {
    let mut report = WorkerReport::default();

    loop {
        // Lock is released as soon as a batch (or end of queue) arrives
        let next = receiver.lock().await.recv().await;
        let Some(batch) = next else {
            break;
        };
        process_batch(batch, store.as_ref(), &progress, &mut report).await;
    }

    debug!(
        batches_saved = report.batches_saved,
        batches_failed = report.batches_failed,
        batches_skipped = report.batches_skipped,
        "Worker finished"
    );
    report
}

async fn process_batch(
    batch: Batch,
    store: &dyn SalesStore,
    progress: &ProgressTracker,
    report: &mut WorkerReport,
) {
    let batch_number = batch.number;
    let mut sales = Vec::with_capacity(batch.len());
    let mut rejected = 0u64;

    for record in batch.records {
        let violations = validator::check(&record);
        if !violations.is_empty() {
            warn!(line = record.line, batch = batch_number, reasons = ?violations, "Row rejected");
            rejected += 1;
            continue;
        }

        let line = record.line;
        match record.into_game_sale() {
            Ok(sale) => sales.push(sale),
            Err(e) => {
                warn!(line, batch = batch_number, error = %e, "Row could not be mapped");
                rejected += 1;
            },
        }
    }

    // Rejects count as failed whatever happens to the rest of the batch
    if rejected > 0 {
        progress.add_failed(rejected);
        report.records_rejected += rejected;
    }

    if sales.is_empty() {
        report.batches_skipped += 1;
        debug!(batch = batch_number, "Nothing left to save in batch");
        return;
    }

    let size = sales.len();
    match store.save(sales).await {
        Ok(saved) => {
            progress.add_succeeded(saved);
            report.batches_saved += 1;
            report.records_saved += saved;
            debug!(batch = batch_number, saved, "Batch saved");
        },
        Err(e) => {
            report.batches_failed += 1;
            error!(batch = batch_number, records = size, error = %e, "Batch save failed");
        },
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::error::StorageError;
    use crate::storage::{MemoryStore, StorageResult};
    use crate::validator::CandidateRecord;
    use async_trait::async_trait;
    use bigdecimal::BigDecimal;
    use chrono::NaiveDateTime;
    use sales_common::{
        parse_sale_timestamp, DailySales, GameSale, ImportJob, Page, PageRequest, SalesFilter,
    };
    use uuid::Uuid;

    fn record(id: i64) -> CandidateRecord {
        CandidateRecord {
            line: id as u64 + 1,
            id,
            game_no: 5,
            game_name: "Game".to_string(),
            game_code: "G5".to_string(),
            game_type: 2,
            cost_price: BigDecimal::from(10),
            tax: BigDecimal::from(9),
            sale_price: BigDecimal::from(11),
            date_of_sale: parse_sale_timestamp("2025-04-05 08:00:00").unwrap(),
        }
    }

    fn batch(number: u64, ids: std::ops::RangeInclusive<i64>) -> Batch {
        Batch {
            number,
            records: ids.map(record).collect(),
        }
    }

    struct PanickingStore;

    #[async_trait]
    impl SalesStore for PanickingStore {
        async fn save(&self, _sales: Vec<GameSale>) -> StorageResult<u64> {
            panic!("store exploded");
        }
        async fn query(&self, _: &SalesFilter, _: PageRequest) -> StorageResult<Page<GameSale>> {
            Err(StorageError::Backend("unsupported".to_string()))
        }
        async fn aggregate(
            &self,
            _: NaiveDateTime,
            _: NaiveDateTime,
            _: Option<i32>,
        ) -> StorageResult<Vec<DailySales>> {
            Ok(Vec::new())
        }
        async fn upsert_job(&self, _: &ImportJob) -> StorageResult<()> {
            Ok(())
        }
        async fn get_job(&self, _: Uuid) -> StorageResult<Option<ImportJob>> {
            Ok(None)
        }
        async fn list_jobs(&self) -> StorageResult<Vec<ImportJob>> {
            Ok(Vec::new())
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_all_batches_saved() {
        let store = Arc::new(MemoryStore::new().with_save_delay(Duration::from_millis(5)));
        let progress = Arc::new(ProgressTracker::new());
        let mut dispatcher = Dispatcher::start(3, 3, store.clone(), progress.clone());

        for n in 0..10 {
            let first = n * 100 + 1;
            dispatcher.submit(batch(n as u64 + 1, first..=first + 99)).await.unwrap();
        }
        let summary = dispatcher.finish(Duration::from_secs(30)).await.unwrap();

        assert_eq!(summary.batches_submitted, 10);
        assert_eq!(summary.batches_saved, 10);
        assert_eq!(summary.records_saved, 1000);
        assert_eq!(progress.snapshot().succeeded, 1000);
        assert_eq!(store.sales_count().await, 1000);
        assert!(store.peak_concurrent_saves() <= 3);
    }

    #[tokio::test]
    async fn test_revalidation_rejects_count_failed() {
        let store = Arc::new(MemoryStore::new());
        let progress = Arc::new(ProgressTracker::new());
        let mut dispatcher = Dispatcher::start(1, 1, store.clone(), progress.clone());

        let mut tampered = batch(1, 1..=4);
        tampered.records[1].tax = BigDecimal::from(10);
        dispatcher.submit(tampered).await.unwrap();

        let summary = dispatcher.finish(Duration::from_secs(5)).await.unwrap();
        assert_eq!(summary.records_rejected, 1);
        assert_eq!(summary.records_saved, 3);
        let snapshot = progress.snapshot();
        assert_eq!((snapshot.succeeded, snapshot.failed), (3, 1));
    }

    #[tokio::test]
    async fn test_fully_rejected_batch_is_skipped() {
        let store = Arc::new(MemoryStore::new());
        let progress = Arc::new(ProgressTracker::new());
        let mut dispatcher = Dispatcher::start(1, 1, store.clone(), progress.clone());

        let mut tampered = batch(1, 1..=3);
        for record in &mut tampered.records {
            record.game_type = 3;
        }
        dispatcher.submit(tampered).await.unwrap();
        dispatcher.submit(batch(2, 4..=5)).await.unwrap();

        let summary = dispatcher.finish(Duration::from_secs(5)).await.unwrap();
        assert_eq!(summary.batches_submitted, 2);
        assert_eq!(summary.batches_saved, 1);
        assert_eq!(summary.batches_skipped, 1);
        assert_eq!(summary.batches_failed, 0);
        assert_eq!(summary.records_rejected, 3);
        assert_eq!(store.save_calls(), 1);
        let snapshot = progress.snapshot();
        assert_eq!((snapshot.succeeded, snapshot.failed), (2, 3));
    }

    #[tokio::test]
    async fn test_store_failure_fails_batch_only() {
        let store = Arc::new(MemoryStore::new());
        let progress = Arc::new(ProgressTracker::new());
        let mut dispatcher = Dispatcher::start(2, 2, store.clone(), progress.clone());

        dispatcher.submit(batch(1, 1..=5)).await.unwrap();
        // same ids again: refused by the store
        dispatcher.submit(batch(2, 1..=5)).await.unwrap();

        let summary = dispatcher.finish(Duration::from_secs(5)).await.unwrap();
        assert_eq!(summary.batches_saved, 1);
        assert_eq!(summary.batches_failed, 1);
        let snapshot = progress.snapshot();
        assert_eq!((snapshot.succeeded, snapshot.failed), (5, 0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_submit_waits_when_queue_full() {
        let store = Arc::new(MemoryStore::new().with_save_delay(Duration::from_secs(1)));
        let progress = Arc::new(ProgressTracker::new());
        let mut dispatcher = Dispatcher::start(1, 1, store, progress);

        dispatcher.submit(batch(1, 1..=2)).await.unwrap();
        dispatcher.submit(batch(2, 3..=4)).await.unwrap();

        // worker busy with batch 1, batch 2 fills the queue
        let blocked =
            tokio::time::timeout(Duration::from_millis(10), dispatcher.submit(batch(3, 5..=6))).await;
        assert!(blocked.is_err());

        let summary = dispatcher.finish(Duration::from_secs(60)).await.unwrap();
        assert_eq!(summary.batches_submitted, 2);
        assert_eq!(summary.records_saved, 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_aborts_workers() {
        let store = Arc::new(MemoryStore::new().with_save_delay(Duration::from_secs(30)));
        let progress = Arc::new(ProgressTracker::new());
        let mut dispatcher = Dispatcher::start(2, 2, store.clone(), progress.clone());

        dispatcher.submit(batch(1, 1..=3)).await.unwrap();
        let err = dispatcher.finish(Duration::from_secs(1)).await.unwrap_err();
        assert!(matches!(err, IngestError::CompletionTimeout(_)));

        // aborted save never completes
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(progress.snapshot().succeeded, 0);
        assert_eq!(store.sales_count().await, 0);
    }

    #[tokio::test]
    async fn test_worker_panic_reported() {
        let progress = Arc::new(ProgressTracker::new());
        let mut dispatcher = Dispatcher::start(1, 1, Arc::new(PanickingStore), progress);

        dispatcher.submit(batch(1, 1..=2)).await.unwrap();
        let err = dispatcher.finish(Duration::from_secs(5)).await.unwrap_err();
        assert!(matches!(err, IngestError::WorkerPanicked(_)));
    }
}
