//! Sales Ingest Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Concurrent batch import of game sales CSV files.
//!
//! # Pipeline
//!
//! - **Parser**: streams rows out of the file ([`parser`])
//! - **Validator**: typed conversion and field checks ([`validator`])
//! - **Batcher**: cuts accepted records into fixed-size batches ([`batcher`])
//! - **Dispatcher**: bounded worker pool persisting batches ([`dispatcher`])
//! - **Job lifecycle**: `PENDING -> PROCESSING -> COMPLETED | FAILED` ([`job`])
//!
//! Besides the pipeline the crate ships a one-shot [`DirectLoader`], a
//! [`ReportService`] for reading sales back, and [`generate`] for sample
//! files.
//!
//! # Example
//!
//! ```no_run
//! use sales_ingest::{IngestConfig, IngestService, MemoryStore};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = IngestConfig::load()?;
//!     let store = Arc::new(MemoryStore::new());
//!     let service = IngestService::new(config, store)?;
//!
//!     let file = tokio::fs::File::open("game_sales.csv").await?;
//!     let job = service.run(file, "game_sales.csv").await;
//!     println!("{} rows, status {}", job.total_records, job.status);
//!     Ok(())
//! }
//! ```

pub mod batcher;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod generator;
pub mod job;
pub mod loader;
pub mod parser;
pub mod pipeline;
pub mod progress;
pub mod report;
pub mod storage;
pub mod validator;

pub use config::{DatabaseConfig, IngestConfig};
pub use error::{IngestError, Result, StorageError};
pub use generator::generate;
pub use loader::DirectLoader;
pub use pipeline::IngestService;
pub use progress::{ProgressSnapshot, ProgressTracker};
pub use report::ReportService;
#[cfg(feature = "database")]
pub use storage::PgStore;
pub use storage::{MemoryStore, SalesStore};
