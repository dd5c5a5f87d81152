//! Read side: paged sales listing and per-timestamp totals

use chrono::NaiveDateTime;
use sales_common::types::MAX_PAGE_SIZE;
use sales_common::{DailySales, GameSale, Page, PageRequest, SalesFilter};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::Result;
use crate::storage::SalesStore;

pub struct ReportService {
    store: Arc<dyn SalesStore>,
}

impl ReportService {
    pub fn new(store: Arc<dyn SalesStore>) -> Self {
        Self { store }
    }

    /// One page of sales matching `filter`, ordered by id.
    ///
    /// Page sizes above the limit are clamped rather than refused.
    pub async fn list_sales(&self, filter: &SalesFilter, page: u32, size: u32) -> Result<Page<GameSale>> {
        if size > MAX_PAGE_SIZE {
            warn!(requested = size, max = MAX_PAGE_SIZE, "Page size clamped");
        }
        let request = PageRequest::new(page, size);
        debug!(page = request.page, size = request.size, ?filter, "Listing sales");

        Ok(self.store.query(filter, request).await?)
    }

    /// Sales count and total per sale timestamp in `from..=to`
    pub async fn sales_totals(
        &self,
        from: NaiveDateTime,
        to: NaiveDateTime,
        game_no: Option<i32>,
    ) -> Result<Vec<DailySales>> {
        if from > to {
            warn!(%from, %to, "Empty report range");
            return Ok(Vec::new());
        }
        Ok(self.store.aggregate(from, to, game_no).await?)
    }
}
