//! Shared helpers for the sales-ingest integration tests
#![allow(dead_code)]

use tracing_subscriber::{fmt, EnvFilter};

pub const HEADER: &str =
    "id,game_no,game_name,game_code,type,cost_price,tax,sale_price,date_of_sale\n";

/// Initialize tracing once per test binary
pub fn init_tracing() {
    let _ = fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,sales_ingest=debug")),
        )
        .with_test_writer()
        .try_init();
}

/// A valid sales line with the given id and game number
pub fn sale_line(id: u64, game_no: i32) -> String {
    format!(
        "{},{},Game {},G{},{},10.00,9.0,10.90,2025-04-{:02} 12:00:00\n",
        id,
        game_no,
        id % 1000,
        id % 100,
        id % 2 + 1,
        id % 28 + 1
    )
}

/// A file of `rows` valid lines; ids listed in `bad_ids` get game number 0
pub fn sales_csv(rows: u64, bad_ids: impl Fn(u64) -> bool) -> String {
    let mut csv = String::from(HEADER);
    for id in 1..=rows {
        let game_no = if bad_ids(id) { 0 } else { (id % 100) as i32 + 1 };
        csv.push_str(&sale_line(id, game_no));
    }
    csv
}
