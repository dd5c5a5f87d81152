//! Sales Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared types, logging setup, and error handling for the game sales
//! ingestion workspace.
//!
//! # Overview
//!
//! - **Error Handling**: [`SalesError`] and the [`Result`] alias
//! - **Logging**: tracing subscriber setup driven by [`logging::LogConfig`]
//! - **Types**: persisted sales rows, import jobs, query filters and pages
//!
//! # Example
//!
//! ```no_run
//! use sales_common::types::{ImportJob, ImportStatus};
//!
//! let mut job = ImportJob::new("game_sales.csv", "sales-ingest");
//! job.transition(ImportStatus::Processing, "sales-ingest")?;
//! assert_eq!(job.status, ImportStatus::Processing);
//! # Ok::<(), sales_common::SalesError>(())
//! ```

pub mod error;
pub mod logging;
pub mod types;

// Re-export commonly used types
pub use error::{Result, SalesError};
pub use types::{
    parse_sale_timestamp, DailySales, GameSale, GameType, ImportJob, ImportStatus, Page,
    PageRequest, SalesFilter,
};
