//! Sample sales file generator
//!
//! Produces files whose rows all pass validation, for load testing and
//! demos. Output is reproducible when a seed is given.

use bigdecimal::BigDecimal;
use chrono::{Duration, NaiveDate, NaiveDateTime};
use rand::distributions::Uniform;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use sales_common::types::SALE_TIMESTAMP_FORMAT;
use std::io::Write;
use tracing::debug;

use crate::error::Result;
use crate::parser::REQUIRED_COLUMNS;

const SALE_WINDOW_SECS: i64 = 30 * 24 * 60 * 60;
const TAX: &str = "9.0";

/// Write a header and `rows` generated sales to `writer`.
///
/// Returns the number of data rows written.
pub fn generate<W: Write>(writer: W, rows: u64, seed: Option<u64>) -> Result<u64> {
    let mut rng = match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let mut out = csv::Writer::from_writer(writer);
    out.write_record(REQUIRED_COLUMNS)?;

    let window_start = sale_window_start();
    for id in 1..=rows {
        let cost_cents: i64 = rng.gen_range(100..=10_000);
        let sale_cents = sale_price_cents(cost_cents);
        let sold_at = window_start + Duration::seconds(rng.gen_range(0..SALE_WINDOW_SECS));

        out.write_record([
            id.to_string(),
            rng.gen_range(1..=100).to_string(),
            letters(&mut rng, 5..=20, b'a'),
            letters(&mut rng, 2..=5, b'A'),
            rng.gen_range(1..=2).to_string(),
            BigDecimal::new(cost_cents.into(), 2).to_string(),
            TAX.to_string(),
            BigDecimal::new(sale_cents.into(), 2).to_string(),
            sold_at.format(SALE_TIMESTAMP_FORMAT).to_string(),
        ])?;
    }

    out.flush()?;
    debug!(rows, ?seed, "Generated sales file");
    Ok(rows)
}

/// Cost plus 9% tax, rounded half up to whole cents
fn sale_price_cents(cost_cents: i64) -> i64 {
    (cost_cents * 109 + 50) / 100
}

fn letters(rng: &mut StdRng, len: std::ops::RangeInclusive<usize>, base: u8) -> String {
    let len = rng.gen_range(len);
    let alphabet = Uniform::new(0u8, 26);
    (0..len)
        .map(|_| char::from(base + rng.sample(alphabet)))
        .collect()
}

fn sale_window_start() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2025, 4, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .unwrap_or_default()
}
