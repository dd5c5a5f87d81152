//! Streaming CSV row parser
//!
//! Reads a sales file lazily, one physical line at a time, and hands back
//! each row as a map from header name to raw field text. Fields never span
//! lines, so a line with a broken structure (unbalanced quotes, wrong column
//! count, invalid UTF-8) is reported as a [`RowError`] for that line only and
//! reading carries on with the next one. I/O failures end the stream with an
//! [`IngestError`].

use csv::{ReaderBuilder, StringRecord};
use std::collections::HashMap;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader, Split};

use crate::error::{IngestError, Result};

/// Columns every sales file header must name
pub const REQUIRED_COLUMNS: [&str; 9] = [
    "id",
    "game_no",
    "game_name",
    "game_code",
    "type",
    "cost_price",
    "tax",
    "sale_price",
    "date_of_sale",
];

/// One data line of the input, fields keyed by header name (untrimmed)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRow {
    pub line: u64,
    fields: HashMap<String, String>,
}

impl RawRow {
    pub fn new(line: u64, fields: HashMap<String, String>) -> Self {
        Self { line, fields }
    }

    pub fn get(&self, column: &str) -> Option<&str> {
        self.fields.get(column).map(String::as_str)
    }
}

/// A line that could not be split into fields
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowError {
    pub line: u64,
    pub reason: String,
}

pub type ParsedRow = std::result::Result<RawRow, RowError>;

/// Single-pass reader over a sales file.
///
/// Owns the underlying reader; dropping the parser closes it.
pub struct RowParser<R> {
    lines: Split<BufReader<R>>,
    headers: Vec<String>,
    /// Physical line number of the last line taken from `lines`
    line: u64,
    rows_read: u64,
}

impl<R> RowParser<R>
where
    R: AsyncRead + Unpin + Send,
{
    /// Read the header line and check it names every required column
    pub async fn open(reader: R) -> Result<Self> {
        let mut lines = BufReader::new(reader).split(b'\n');

        let header = lines.next_segment().await?.unwrap_or_default();
        let headers: Vec<String> = split_fields(strip_cr(&header))?
            .iter()
            .map(|h| h.trim().to_string())
            .collect();

        if let Some(missing) = REQUIRED_COLUMNS
            .iter()
            .find(|column| !headers.iter().any(|h| h == *column))
        {
            return Err(IngestError::MissingColumn(missing.to_string()));
        }

        Ok(Self {
            lines,
            headers,
            line: 1,
            rows_read: 0,
        })
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    /// Number of data lines read so far, broken ones included
    pub fn rows_read(&self) -> u64 {
        self.rows_read
    }

    /// Next row of the file; blank lines are skipped.
    ///
    /// `Ok(None)` at end of input; `Ok(Some(Err(_)))` for a line that failed
    /// on its own; `Err(_)` when the stream itself broke.
    pub async fn next_row(&mut self) -> Result<Option<ParsedRow>> {
        while let Some(bytes) = self.lines.next_segment().await? {
            self.line += 1;
            let bytes = strip_cr(&bytes);
            if bytes.is_empty() {
                continue;
            }

            self.rows_read += 1;
            return Ok(Some(self.parse_line(bytes)));
        }
        Ok(None)
    }

    fn parse_line(&self, bytes: &[u8]) -> ParsedRow {
        let line = self.line;
        let row_error = |reason: String| RowError { line, reason };

        // Doubled quotes inside a quoted field keep the count even
        if bytes.iter().filter(|&&b| b == b'"').count() % 2 != 0 {
            return Err(row_error("unterminated quoted field".to_string()));
        }

        let record = split_fields(bytes).map_err(|e| row_error(e.to_string()))?;
        if record.len() != self.headers.len() {
            return Err(row_error(format!(
                "found {} fields, expected {}",
                record.len(),
                self.headers.len()
            )));
        }

        let fields = self
            .headers
            .iter()
            .cloned()
            .zip(record.iter().map(str::to_string))
            .collect();
        Ok(RawRow::new(line, fields))
    }
}

/// Split one line into fields; an empty line yields an empty record
fn split_fields(bytes: &[u8]) -> std::result::Result<StringRecord, csv::Error> {
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(bytes);
    let mut record = StringRecord::new();
    reader.read_record(&mut record)?;
    Ok(record)
}

fn strip_cr(bytes: &[u8]) -> &[u8] {
    bytes.strip_suffix(b"\r").unwrap_or(bytes)
}
