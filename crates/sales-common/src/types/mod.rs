//! Common types used across the sales workspace

use bigdecimal::BigDecimal;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Result, SalesError};

/// Timestamp pattern of sale dates (`yyyy-MM-dd HH:mm:ss`)
pub const SALE_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Largest page a sales query may return.
pub const MAX_PAGE_SIZE: u32 = 100;

/// Parse a sale timestamp in `yyyy-MM-dd HH:mm:ss` form
pub fn parse_sale_timestamp(value: &str) -> Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(value, SALE_TIMESTAMP_FORMAT).map_err(|e| {
        SalesError::Parse(format!("'{}' does not match yyyy-MM-dd HH:mm:ss: {}", value, e))
    })
}

// ============================================================================
// Sales Records
// ============================================================================

/// Sales channel of a game sale
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GameType {
    /// Code 1
    Online,
    /// Code 2
    Offline,
}

impl GameType {
    /// Numeric code used in sales files and the `type` column
    pub fn code(self) -> i32 {
        match self {
            GameType::Online => 1,
            GameType::Offline => 2,
        }
    }

    pub fn from_code(code: i32) -> Result<Self> {
        match code {
            1 => Ok(GameType::Online),
            2 => Ok(GameType::Offline),
            other => Err(SalesError::UnknownGameType(other)),
        }
    }
}

impl std::fmt::Display for GameType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GameType::Online => write!(f, "online"),
            GameType::Offline => write!(f, "offline"),
        }
    }
}

/// A validated game sale in the form handed to storage (maps to `game_sales`).
///
/// Every field has already passed the range checks of the record validator,
/// so storage implementations persist it as-is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameSale {
    /// Primary key, starts from 1
    pub id: i64,
    /// Game number, 1 to 100
    pub game_no: i32,
    /// At most 20 characters
    pub game_name: String,
    /// At most 5 characters
    pub game_code: String,
    pub game_type: GameType,
    pub cost_price: BigDecimal,
    pub tax: BigDecimal,
    pub sale_price: BigDecimal,
    pub date_of_sale: NaiveDateTime,
}

// ============================================================================
// Import Jobs
// ============================================================================

/// Lifecycle status of an import job.
///
/// The only legal sequence is `PENDING -> PROCESSING -> COMPLETED | FAILED`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ImportStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl ImportStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImportStatus::Pending => "PENDING",
            ImportStatus::Processing => "PROCESSING",
            ImportStatus::Completed => "COMPLETED",
            ImportStatus::Failed => "FAILED",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, ImportStatus::Completed | ImportStatus::Failed)
    }

    /// Whether `next` directly follows `self` in the job lifecycle
    pub fn can_transition_to(self, next: ImportStatus) -> bool {
        matches!(
            (self, next),
            (ImportStatus::Pending, ImportStatus::Processing)
                | (ImportStatus::Processing, ImportStatus::Completed)
                | (ImportStatus::Processing, ImportStatus::Failed)
        )
    }
}

impl std::fmt::Display for ImportStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ImportStatus {
    type Err = SalesError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "PENDING" => Ok(ImportStatus::Pending),
            "PROCESSING" => Ok(ImportStatus::Processing),
            "COMPLETED" => Ok(ImportStatus::Completed),
            "FAILED" => Ok(ImportStatus::Failed),
            _ => Err(SalesError::UnknownStatus(s.to_string())),
        }
    }
}

/// One ingestion run (maps to the `csv_import_info` table)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportJob {
    pub id: Uuid,
    pub file_name: String,
    pub status: ImportStatus,
    pub total_records: i64,
    pub successful_records: i64,
    pub failed_records: i64,
    pub error_message: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub created_by: String,
    pub updated_at: DateTime<Utc>,
    pub updated_by: String,
}

impl ImportJob {
    /// Create a new `PENDING` job for `file_name`
    pub fn new(file_name: impl Into<String>, actor: impl Into<String>) -> Self {
        let now = Utc::now();
        let actor = actor.into();
        Self {
            id: Uuid::new_v4(),
            file_name: file_name.into(),
            status: ImportStatus::Pending,
            total_records: 0,
            successful_records: 0,
            failed_records: 0,
            error_message: None,
            start_time: now,
            end_time: None,
            created_at: now,
            created_by: actor.clone(),
            updated_at: now,
            updated_by: actor,
        }
    }

    /// Move the job to `next`, stamping the end time on terminal states.
    ///
    /// Fails with [`SalesError::InvalidTransition`] for anything outside
    /// `PENDING -> PROCESSING -> COMPLETED | FAILED`.
    pub fn transition(&mut self, next: ImportStatus, actor: &str) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(SalesError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }

        self.status = next;
        self.touch(actor);
        if next.is_terminal() {
            self.end_time = Some(self.updated_at);
        }

        Ok(())
    }

    /// Overwrite the progress counts; refused once the job is terminal
    pub fn record_counts(&mut self, total: i64, succeeded: i64, failed: i64) -> Result<()> {
        if self.status.is_terminal() {
            return Err(SalesError::JobFinalized(self.id));
        }

        self.total_records = total;
        self.successful_records = succeeded;
        self.failed_records = failed;
        Ok(())
    }

    fn touch(&mut self, actor: &str) {
        self.updated_at = Utc::now();
        self.updated_by = actor.to_string();
    }
}

// ============================================================================
// Queries and Reports
// ============================================================================

/// Filter over stored sales; every bound is inclusive
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SalesFilter {
    /// Applied only when both ends are known
    pub date_range: Option<(NaiveDateTime, NaiveDateTime)>,
    pub min_price: Option<BigDecimal>,
    pub max_price: Option<BigDecimal>,
}

impl SalesFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_date_range(mut self, from: NaiveDateTime, to: NaiveDateTime) -> Self {
        self.date_range = Some((from, to));
        self
    }

    pub fn with_min_price(mut self, price: BigDecimal) -> Self {
        self.min_price = Some(price);
        self
    }

    pub fn with_max_price(mut self, price: BigDecimal) -> Self {
        self.max_price = Some(price);
        self
    }

    /// Whether `sale` passes every configured bound
    pub fn matches(&self, sale: &GameSale) -> bool {
        if let Some((from, to)) = self.date_range {
            if sale.date_of_sale < from || sale.date_of_sale > to {
                return false;
            }
        }
        if let Some(min) = &self.min_price {
            if &sale.sale_price < min {
                return false;
            }
        }
        if let Some(max) = &self.max_price {
            if &sale.sale_price > max {
                return false;
            }
        }
        true
    }
}

/// Zero-based page request; results are ordered by id ascending
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    pub page: u32,
    pub size: u32,
}

impl PageRequest {
    /// Build a request, clamping `size` into `1..=MAX_PAGE_SIZE`
    pub fn new(page: u32, size: u32) -> Self {
        Self {
            page,
            size: size.clamp(1, MAX_PAGE_SIZE),
        }
    }

    /// Number of rows skipped before this page
    pub fn offset(&self) -> u64 {
        u64::from(self.page) * u64::from(self.size)
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: 0,
            size: MAX_PAGE_SIZE,
        }
    }
}

/// One page of query results
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: u32,
    pub size: u32,
    pub total_elements: u64,
}

impl<T> Page<T> {
    pub fn total_pages(&self) -> u64 {
        if self.size == 0 {
            return 0;
        }
        self.total_elements.div_ceil(u64::from(self.size))
    }
}

/// Sales aggregated per sale timestamp
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailySales {
    pub date_of_sale: NaiveDateTime,
    pub total_count: i64,
    pub total_sales: BigDecimal,
}
