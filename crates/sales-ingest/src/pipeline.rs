//! Batch ingestion pipeline
//!
//! One producer reads the file row by row, validates each row and cuts the
//! accepted ones into batches; a [`Dispatcher`] persists the batches in
//! parallel. The [`JobLifecycle`] records the run from `PENDING` to its
//! terminal state.
//!
//! ```text
//! RowParser -> validate -> Batcher -> Dispatcher (W workers) -> SalesStore
//!                  \                        |
//!                   +--> ProgressTracker <--+--> JobLifecycle
//! ```
//!
//! Re-importing a file that was already loaded is not idempotent: every
//! batch carrying an existing id is refused by the store.

use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use tokio::io::AsyncRead;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use sales_common::ImportJob;

use crate::batcher::{Batch, Batcher};
use crate::config::IngestConfig;
use crate::dispatcher::{DispatchSummary, Dispatcher};
use crate::error::{IngestError, Result};
use crate::job::JobLifecycle;
use crate::parser::RowParser;
use crate::progress::ProgressTracker;
use crate::storage::SalesStore;
use crate::validator::{validate, ValidationOutcome};

/// Entry point for CSV imports
#[derive(Clone)]
pub struct IngestService {
    config: IngestConfig,
    store: Arc<dyn SalesStore>,
}

impl IngestService {
    /// Fails if the configuration is invalid or asks for more workers than
    /// the store has connections
    pub fn new(config: IngestConfig, store: Arc<dyn SalesStore>) -> Result<Self> {
        config
            .validate()
            .map_err(|e| IngestError::Config(e.to_string()))?;

        if let Some(max) = store.max_connections() {
            if config.worker_count > max as usize {
                return Err(IngestError::Config(format!(
                    "worker count {} exceeds store connection capacity {}",
                    config.worker_count, max
                )));
            }
        }

        Ok(Self { config, store })
    }

    pub fn config(&self) -> &IngestConfig {
        &self.config
    }

    /// Start importing `reader` in the background.
    ///
    /// The job is stored as `PENDING` before this returns; its id is the
    /// handle for following the run through the store. A run that panics
    /// still ends `FAILED`.
    pub async fn ingest<R>(&self, reader: R, file_name: &str) -> Uuid
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let lifecycle = self.create_job(file_name).await;
        let job_id = lifecycle.id();

        let service = self.clone();
        tokio::spawn(async move {
            service.process(lifecycle, reader).await;
        });

        job_id
    }

    /// Import `reader` and return the finished job
    pub async fn run<R>(&self, reader: R, file_name: &str) -> ImportJob
    where
        R: AsyncRead + Unpin + Send,
    {
        let lifecycle = self.create_job(file_name).await;
        self.process(lifecycle, reader).await
    }

    async fn create_job(&self, file_name: &str) -> JobLifecycle {
        JobLifecycle::create(
            file_name,
            self.config.import_actor.clone(),
            Arc::clone(&self.store),
        )
        .await
    }

    #[instrument(name = "import", skip_all, fields(job_id = %lifecycle.id(), file_name = %lifecycle.job().file_name))]
    async fn process<R>(&self, mut lifecycle: JobLifecycle, reader: R) -> ImportJob
    where
        R: AsyncRead + Unpin + Send,
    {
        let started = Instant::now();
        info!(
            batch_size = self.config.batch_size,
            workers = self.config.worker_count,
            "Starting import"
        );

        let progress = Arc::new(ProgressTracker::new());

        // A panic anywhere in the run still has to leave the job FAILED
        let outcome = AssertUnwindSafe(self.execute(&mut lifecycle, reader, &progress))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| {
                Err(IngestError::TaskPanicked(panic_message(panic.as_ref())))
            });

        let finalized = match outcome {
            Ok(summary) => {
                lifecycle
                    .complete(progress.snapshot(), failed_batches_note(&summary))
                    .await
            },
            Err(err) => lifecycle.fail(err.to_string(), progress.snapshot()).await,
        };

        if let Err(e) = finalized {
            warn!(error = %e, "Could not finalize import job");
        }

        info!(
            status = %lifecycle.status(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Import finished"
        );
        lifecycle.into_job()
    }

    async fn execute<R>(
        &self,
        lifecycle: &mut JobLifecycle,
        reader: R,
        progress: &Arc<ProgressTracker>,
    ) -> Result<DispatchSummary>
    where
        R: AsyncRead + Unpin + Send,
    {
        let mut dispatcher = Dispatcher::start(
            self.config.worker_count,
            self.config.queue_capacity(),
            Arc::clone(&self.store),
            Arc::clone(progress),
        );

        let produced = self.produce(lifecycle, reader, progress, &mut dispatcher).await;

        // Batches already handed over still get their chance to finish
        let finished = dispatcher.finish(self.config.completion_timeout()).await;

        match (produced, finished) {
            (Ok(()), Ok(summary)) => {
                info!(
                    batches = summary.batches_submitted,
                    failed_batches = summary.batches_failed,
                    "All batches finished"
                );
                Ok(summary)
            },
            (Err(err), _) | (Ok(()), Err(err)) => Err(err),
        }
    }

    async fn produce<R>(
        &self,
        lifecycle: &mut JobLifecycle,
        reader: R,
        progress: &ProgressTracker,
        dispatcher: &mut Dispatcher,
    ) -> Result<()>
    where
        R: AsyncRead + Unpin + Send,
    {
        let mut parser = RowParser::open(reader).await?;
        let mut batcher = Batcher::new(self.config.batch_size);

        while let Some(parsed) = parser.next_row().await? {
            progress.record_seen();

            let row = match parsed {
                Ok(row) => row,
                Err(row_err) => {
                    warn!(line = row_err.line, reason = %row_err.reason, "Row could not be parsed");
                    progress.add_failed(1);
                    continue;
                },
            };

            match validate(&row) {
                ValidationOutcome::Accepted(record) => {
                    if let Some(batch) = batcher.add(record) {
                        submit(lifecycle, dispatcher, batch).await?;
                    }
                },
                ValidationOutcome::Rejected(rejection) => {
                    warn!(line = rejection.line, reasons = ?rejection.violations, "Row rejected");
                    progress.add_failed(1);
                },
            }
        }

        if let Some(batch) = batcher.finish() {
            submit(lifecycle, dispatcher, batch).await?;
        }

        // Files with no accepted rows still pass through PROCESSING
        lifecycle.ensure_processing().await?;

        info!(rows = parser.rows_read(), "Reached end of input");
        Ok(())
    }
}

async fn submit(lifecycle: &mut JobLifecycle, dispatcher: &mut Dispatcher, batch: Batch) -> Result<()> {
    lifecycle.ensure_processing().await?;
    dispatcher.submit(batch).await
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

fn failed_batches_note(summary: &DispatchSummary) -> Option<String> {
    (summary.batches_failed > 0).then(|| {
        format!(
            "{} of {} batches failed to persist",
            summary.batches_failed, summary.batches_submitted
        )
    })
}
