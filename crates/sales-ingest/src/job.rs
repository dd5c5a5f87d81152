//! Import job lifecycle
//!
//! [`JobLifecycle`] owns the [`ImportJob`] of one run and is the only thing
//! that moves it between states. Every transition is written to the store
//! straight away. A store failure on a status write is logged and the run
//! carries on; the in-memory job stays authoritative.

use sales_common::{ImportJob, ImportStatus};
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::error::Result;
use crate::progress::ProgressSnapshot;
use crate::storage::SalesStore;

pub struct JobLifecycle {
    job: ImportJob,
    store: Arc<dyn SalesStore>,
    actor: String,
}

impl JobLifecycle {
    /// Create the `PENDING` job for `file_name` and store it
    pub async fn create(
        file_name: impl Into<String>,
        actor: impl Into<String>,
        store: Arc<dyn SalesStore>,
    ) -> Self {
        let actor = actor.into();
        let lifecycle = Self {
            job: ImportJob::new(file_name, actor.clone()),
            store,
            actor,
        };
        info!(job_id = %lifecycle.job.id, file_name = %lifecycle.job.file_name, "Import job created");
        lifecycle.persist().await;
        lifecycle
    }

    pub fn id(&self) -> Uuid {
        self.job.id
    }

    pub fn job(&self) -> &ImportJob {
        &self.job
    }

    pub fn status(&self) -> ImportStatus {
        self.job.status
    }

    pub fn into_job(self) -> ImportJob {
        self.job
    }

    /// `PENDING -> PROCESSING`; a no-op once the job is already processing
    pub async fn ensure_processing(&mut self) -> Result<()> {
        if self.job.status == ImportStatus::Processing {
            return Ok(());
        }
        self.job.transition(ImportStatus::Processing, &self.actor)?;
        self.persist().await;
        Ok(())
    }

    /// Freeze `progress` into the job and mark it `COMPLETED`.
    ///
    /// `note` ends up in the job's error message, e.g. for batches the store
    /// refused.
    pub async fn complete(&mut self, progress: ProgressSnapshot, note: Option<String>) -> Result<()> {
        self.ensure_processing().await?;
        self.record(progress)?;
        self.job.error_message = note;
        self.job.transition(ImportStatus::Completed, &self.actor)?;
        self.persist().await;

        info!(
            job_id = %self.job.id,
            total = self.job.total_records,
            succeeded = self.job.successful_records,
            failed = self.job.failed_records,
            "Import job completed"
        );
        if let Some(note) = &self.job.error_message {
            warn!(job_id = %self.job.id, note = %note, "Import job completed with errors");
        }
        Ok(())
    }

    /// Mark the job `FAILED` with `cause` and a best-effort counter snapshot.
    ///
    /// A job still `PENDING` passes through `PROCESSING` first.
    pub async fn fail(&mut self, cause: impl Into<String>, progress: ProgressSnapshot) -> Result<()> {
        let cause = cause.into();
        self.ensure_processing().await?;
        self.record(progress)?;
        self.job.error_message = Some(cause.clone());
        self.job.transition(ImportStatus::Failed, &self.actor)?;
        self.persist().await;

        error!(
            job_id = %self.job.id,
            error = %cause,
            total = self.job.total_records,
            succeeded = self.job.successful_records,
            failed = self.job.failed_records,
            "Import job failed"
        );
        Ok(())
    }

    fn record(&mut self, progress: ProgressSnapshot) -> Result<()> {
        self.job.record_counts(
            to_count(progress.total),
            to_count(progress.succeeded),
            to_count(progress.failed),
        )?;
        Ok(())
    }

    async fn persist(&self) {
        if let Err(e) = self.store.upsert_job(&self.job).await {
            error!(
                job_id = %self.job.id,
                status = %self.job.status,
                error = %e,
                "Failed to store import job status"
            );
        }
    }
}

fn to_count(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    fn snapshot(total: u64, succeeded: u64, failed: u64) -> ProgressSnapshot {
        ProgressSnapshot {
            total,
            succeeded,
            failed,
        }
    }

    #[tokio::test]
    async fn test_successful_sequence() {
        let store = Arc::new(MemoryStore::new());
        let mut lifecycle = JobLifecycle::create("sales.csv", "tester", store.clone()).await;
        assert_eq!(
            store.get_job(lifecycle.id()).await.unwrap().unwrap().status,
            ImportStatus::Pending
        );

        lifecycle.ensure_processing().await.unwrap();
        lifecycle.ensure_processing().await.unwrap();
        lifecycle.complete(snapshot(10, 8, 2), None).await.unwrap();

        assert_eq!(
            store.job_history(lifecycle.id()).await,
            vec![ImportStatus::Pending, ImportStatus::Processing, ImportStatus::Completed]
        );
        let stored = store.get_job(lifecycle.id()).await.unwrap().unwrap();
        assert_eq!(stored.total_records, 10);
        assert_eq!(stored.successful_records, 8);
        assert_eq!(stored.failed_records, 2);
        assert!(stored.end_time.is_some());
        assert!(stored.error_message.is_none());
    }

    #[tokio::test]
    async fn test_fail_from_pending_passes_through_processing() {
        let store = Arc::new(MemoryStore::new());
        let mut lifecycle = JobLifecycle::create("sales.csv", "tester", store.clone()).await;

        lifecycle.fail("header is missing 'tax'", snapshot(0, 0, 0)).await.unwrap();

        assert_eq!(
            store.job_history(lifecycle.id()).await,
            vec![ImportStatus::Pending, ImportStatus::Processing, ImportStatus::Failed]
        );
        let job = lifecycle.into_job();
        assert_eq!(job.error_message.as_deref(), Some("header is missing 'tax'"));
    }

    #[tokio::test]
    async fn test_terminal_job_cannot_be_finalized_again() {
        let store = Arc::new(MemoryStore::new());
        let mut lifecycle = JobLifecycle::create("sales.csv", "tester", store).await;
        lifecycle.complete(snapshot(1, 1, 0), None).await.unwrap();

        assert!(lifecycle.fail("late", snapshot(1, 0, 1)).await.is_err());
        assert_eq!(lifecycle.status(), ImportStatus::Completed);
        assert_eq!(lifecycle.job().successful_records, 1);
    }

    #[tokio::test]
    async fn test_store_outage_does_not_stop_lifecycle() {
        let store = Arc::new(MemoryStore::new());
        store.set_fail_job_updates(true);

        let mut lifecycle = JobLifecycle::create("sales.csv", "tester", store.clone()).await;
        lifecycle
            .complete(snapshot(3, 3, 0), Some("1 of 2 batches failed to persist".to_string()))
            .await
            .unwrap();

        assert_eq!(lifecycle.status(), ImportStatus::Completed);
        assert!(store.get_job(lifecycle.id()).await.unwrap().is_none());
    }
}
