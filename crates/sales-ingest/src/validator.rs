//! Record validation
//!
//! Turns a [`RawRow`] into a typed [`CandidateRecord`] and checks it against
//! the field constraints of a game sale. A failed conversion counts as a
//! violation like any other; every violation of a row is collected.

use bigdecimal::BigDecimal;
use chrono::NaiveDateTime;
use sales_common::{parse_sale_timestamp, GameSale, GameType};
use std::str::FromStr;

use crate::parser::RawRow;

pub const MSG_ID: &str = "ID should start from 1";
pub const MSG_GAME_NO_MIN: &str = "Game number should be at least 1";
pub const MSG_GAME_NO_MAX: &str = "Game number should not be more than 100";
pub const MSG_GAME_NAME_BLANK: &str = "Game Name cannot be blank";
pub const MSG_GAME_NAME_LONG: &str = "Game Name cannot exceed 20 characters";
pub const MSG_GAME_CODE_BLANK: &str = "Game Code cannot be blank";
pub const MSG_GAME_CODE_LONG: &str = "Game Code cannot exceed 5 characters";
pub const MSG_TYPE: &str = "Type should be 1 (Online) or 2 (Offline)";
pub const MSG_COST_MIN: &str = "Cost Price cannot be less than 0";
pub const MSG_COST_MAX: &str = "Cost Price cannot exceed 100.00";
pub const MSG_TAX: &str = "Tax should be exactly 9%";
pub const MSG_SALE_MIN: &str = "Sale Price cannot be less than 0";
pub const MSG_DATE_NULL: &str = "Date of Sale cannot be null";
pub const MSG_DATE_FORMAT: &str = "Date of Sale must match yyyy-MM-dd HH:mm:ss";

const MAX_GAME_NO: i32 = 100;
const MAX_GAME_NAME_CHARS: usize = 20;
const MAX_GAME_CODE_CHARS: usize = 5;
const MAX_COST_PRICE: i32 = 100;
const TAX_RATE: i32 = 9;

/// A typed, not yet accepted sales row
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateRecord {
    pub line: u64,
    pub id: i64,
    pub game_no: i32,
    pub game_name: String,
    pub game_code: String,
    pub game_type: i32,
    pub cost_price: BigDecimal,
    pub tax: BigDecimal,
    pub sale_price: BigDecimal,
    pub date_of_sale: NaiveDateTime,
}

impl CandidateRecord {
    /// Map to the storage form; only valid for a record [`check`] accepts
    pub fn into_game_sale(self) -> sales_common::Result<GameSale> {
        Ok(GameSale {
            id: self.id,
            game_no: self.game_no,
            game_name: self.game_name,
            game_code: self.game_code,
            game_type: GameType::from_code(self.game_type)?,
            cost_price: self.cost_price,
            tax: self.tax,
            sale_price: self.sale_price,
            date_of_sale: self.date_of_sale,
        })
    }
}

/// Why a row was turned away
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    pub line: u64,
    pub violations: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ValidationOutcome {
    Accepted(CandidateRecord),
    Rejected(Rejection),
}

impl ValidationOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, ValidationOutcome::Accepted(_))
    }
}

/// Convert and check one raw row
pub fn validate(row: &RawRow) -> ValidationOutcome {
    let mut violations = Vec::new();

    let id = convert::<i64>(row, "id", &mut violations);
    let game_no = convert::<i32>(row, "game_no", &mut violations);
    let game_type = convert::<i32>(row, "type", &mut violations);
    let cost_price = convert::<BigDecimal>(row, "cost_price", &mut violations);
    let tax = convert::<BigDecimal>(row, "tax", &mut violations);
    let sale_price = convert::<BigDecimal>(row, "sale_price", &mut violations);
    let date_of_sale = convert_date(row, &mut violations);

    // Text columns need no conversion, only presence
    let game_name = row.get("game_name").unwrap_or_default().to_string();
    let game_code = row.get("game_code").unwrap_or_default().to_string();

    if let Some(id) = id {
        check_id(id, &mut violations);
    }
    if let Some(game_no) = game_no {
        check_game_no(game_no, &mut violations);
    }
    check_game_name(&game_name, &mut violations);
    check_game_code(&game_code, &mut violations);
    if let Some(game_type) = game_type {
        check_type(game_type, &mut violations);
    }
    if let Some(cost_price) = &cost_price {
        check_cost_price(cost_price, &mut violations);
    }
    if let Some(tax) = &tax {
        check_tax(tax, &mut violations);
    }
    if let Some(sale_price) = &sale_price {
        check_sale_price(sale_price, &mut violations);
    }

    match (id, game_no, game_type, cost_price, tax, sale_price, date_of_sale) {
        (
            Some(id),
            Some(game_no),
            Some(game_type),
            Some(cost_price),
            Some(tax),
            Some(sale_price),
            Some(date_of_sale),
        ) if violations.is_empty() => ValidationOutcome::Accepted(CandidateRecord {
            line: row.line,
            id,
            game_no,
            game_name,
            game_code,
            game_type,
            cost_price,
            tax,
            sale_price,
            date_of_sale,
        }),
        _ => ValidationOutcome::Rejected(Rejection {
            line: row.line,
            violations,
        }),
    }
}

/// Re-run the field constraints on an already typed record
pub fn check(record: &CandidateRecord) -> Vec<String> {
    let mut violations = Vec::new();
    check_id(record.id, &mut violations);
    check_game_no(record.game_no, &mut violations);
    check_game_name(&record.game_name, &mut violations);
    check_game_code(&record.game_code, &mut violations);
    check_type(record.game_type, &mut violations);
    check_cost_price(&record.cost_price, &mut violations);
    check_tax(&record.tax, &mut violations);
    check_sale_price(&record.sale_price, &mut violations);
    violations
}

fn convert<T: FromStr>(row: &RawRow, column: &str, violations: &mut Vec<String>) -> Option<T> {
    match row.get(column) {
        None => {
            violations.push(format!("Column '{}' is missing", column));
            None
        },
        Some(raw) => match raw.trim().parse::<T>() {
            Ok(value) => Some(value),
            Err(_) => {
                violations.push(format!("Column '{}' has an unreadable value '{}'", column, raw));
                None
            },
        },
    }
}

fn convert_date(row: &RawRow, violations: &mut Vec<String>) -> Option<NaiveDateTime> {
    match row.get("date_of_sale").map(str::trim) {
        None | Some("") => {
            violations.push(MSG_DATE_NULL.to_string());
            None
        },
        Some(raw) => match parse_sale_timestamp(raw) {
            Ok(date) => Some(date),
            Err(_) => {
                violations.push(MSG_DATE_FORMAT.to_string());
                None
            },
        },
    }
}

fn check_id(id: i64, violations: &mut Vec<String>) {
    if id < 1 {
        violations.push(MSG_ID.to_string());
    }
}

fn check_game_no(game_no: i32, violations: &mut Vec<String>) {
    if game_no < 1 {
        violations.push(MSG_GAME_NO_MIN.to_string());
    }
    if game_no > MAX_GAME_NO {
        violations.push(MSG_GAME_NO_MAX.to_string());
    }
}

fn check_game_name(name: &str, violations: &mut Vec<String>) {
    if name.trim().is_empty() {
        violations.push(MSG_GAME_NAME_BLANK.to_string());
    }
    if name.chars().count() > MAX_GAME_NAME_CHARS {
        violations.push(MSG_GAME_NAME_LONG.to_string());
    }
}

fn check_game_code(code: &str, violations: &mut Vec<String>) {
    if code.trim().is_empty() {
        violations.push(MSG_GAME_CODE_BLANK.to_string());
    }
    if code.chars().count() > MAX_GAME_CODE_CHARS {
        violations.push(MSG_GAME_CODE_LONG.to_string());
    }
}

fn check_type(game_type: i32, violations: &mut Vec<String>) {
    if GameType::from_code(game_type).is_err() {
        violations.push(MSG_TYPE.to_string());
    }
}

fn check_cost_price(cost: &BigDecimal, violations: &mut Vec<String>) {
    if *cost > BigDecimal::from(MAX_COST_PRICE) {
        violations.push(MSG_COST_MAX.to_string());
    }
    if *cost < BigDecimal::from(0) {
        violations.push(MSG_COST_MIN.to_string());
    }
}

fn check_tax(tax: &BigDecimal, violations: &mut Vec<String>) {
    // Scale-insensitive: 9, 9.0 and 9.00 are all accepted
    if *tax != BigDecimal::from(TAX_RATE) {
        violations.push(MSG_TAX.to_string());
    }
}

fn check_sale_price(price: &BigDecimal, violations: &mut Vec<String>) {
    if *price < BigDecimal::from(0) {
        violations.push(MSG_SALE_MIN.to_string());
    }
}
