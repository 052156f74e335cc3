//! Historical Price Logger
//!
//! Appends price snapshots to a single CSV file for offline analysis.
//! One row per recorder invocation, never rewritten or truncated.
//!
//! Output format (CSV, default columns):
//!   timestamp, datetime, susde_usdt_price, gho_susde_price, susde_official_price,
//!   event_type, pool_affected, notes
//!
//! Prices are written with 6 decimals or the `N/A` sentinel. Free text
//! (pool label, notes) has commas replaced with `;` and line breaks with
//! spaces so every row keeps the header's column count.
//!
//! Author: AI-Generated
//! Created: 2026-10-14
//! Modified: 2026-10-14 - Refuse an existing file with a different header

use chrono::{DateTime, SecondsFormat, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, ErrorKind, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

/// Written in place of a price that could not be read
pub const UNAVAILABLE: &str = "N/A";

/// Decimal places for every price column
const PRICE_DECIMALS: u32 = 6;

#[derive(Debug, Error)]
pub enum RecordError {
    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{path} has header '{found}', expected '{expected}'")]
    HeaderMismatch {
        path: PathBuf,
        expected: String,
        found: String,
    },
    #[error("malformed row: expected {expected} fields, found {found}")]
    FieldCount { expected: usize, found: usize },
    #[error("malformed {field} field: '{value}'")]
    Field { field: &'static str, value: String },
}

/// One CSV row
#[derive(Debug, Clone, PartialEq)]
pub struct CsvRecord {
    /// Unix milliseconds
    pub timestamp: i64,
    /// ISO-8601 UTC with milliseconds
    pub datetime: String,
    /// One entry per configured price column, in header order
    pub prices: Vec<Option<Decimal>>,
    pub reference_price: Option<Decimal>,
    pub event_type: String,
    pub pool_affected: String,
    pub notes: String,
}

impl CsvRecord {
    pub fn new(
        now: DateTime<Utc>,
        prices: Vec<Option<Decimal>>,
        reference_price: Option<Decimal>,
        event_type: &str,
        pool_affected: &str,
        notes: &str,
    ) -> Self {
        Self {
            timestamp: now.timestamp_millis(),
            datetime: now.to_rfc3339_opts(SecondsFormat::Millis, true),
            prices,
            reference_price,
            event_type: sanitize(event_type),
            pool_affected: sanitize(pool_affected),
            notes: sanitize(notes),
        }
    }

    /// Serialize to a CSV line including the trailing newline
    pub fn to_line(&self) -> String {
        let mut fields: Vec<String> = Vec::with_capacity(self.prices.len() + 6);
        fields.push(self.timestamp.to_string());
        fields.push(self.datetime.clone());
        fields.extend(self.prices.iter().map(|p| format_price(*p)));
        fields.push(format_price(self.reference_price));
        fields.push(self.event_type.clone());
        fields.push(self.pool_affected.clone());
        fields.push(self.notes.clone());

        let mut line = fields.join(",");
        line.push('\n');
        line
    }

    /// Parse a line written by `to_line` for a file with `price_columns` pair columns
    pub fn parse_line(line: &str, price_columns: usize) -> Result<Self, RecordError> {
        let line = line.trim_end_matches(['\n', '\r']);
        let fields: Vec<&str> = line.split(',').collect();
        let expected = price_columns + 6;
        if fields.len() != expected {
            return Err(RecordError::FieldCount {
                expected,
                found: fields.len(),
            });
        }

        let timestamp = fields[0].parse::<i64>().map_err(|_| RecordError::Field {
            field: "timestamp",
            value: fields[0].to_string(),
        })?;

        let prices = fields[2..2 + price_columns]
            .iter()
            .map(|f| parse_price(f, "price"))
            .collect::<Result<Vec<_>, _>>()?;
        let tail = &fields[2 + price_columns..];

        Ok(Self {
            timestamp,
            datetime: fields[1].to_string(),
            prices,
            reference_price: parse_price(tail[0], "reference_price")?,
            event_type: tail[1].to_string(),
            pool_affected: tail[2].to_string(),
            notes: tail[3].to_string(),
        })
    }
}

/// Replace characters that would break the row layout
pub fn sanitize(text: &str) -> String {
    text.replace(',', ";").replace(['\n', '\r'], " ")
}

/// `value` with exactly `dp` decimals, rounded half away from zero.
/// `Decimal`'s own `{:.N}` drops extra digits instead of rounding.
pub fn format_fixed(value: Decimal, dp: u32) -> String {
    let rounded = value.round_dp_with_strategy(dp, RoundingStrategy::MidpointAwayFromZero);
    format!("{:.*}", dp as usize, rounded)
}

/// Price with 6 decimals, or the sentinel
pub fn format_price(price: Option<Decimal>) -> String {
    match price {
        Some(p) => format_fixed(p, PRICE_DECIMALS),
        None => UNAVAILABLE.to_string(),
    }
}

fn parse_price(field: &str, name: &'static str) -> Result<Option<Decimal>, RecordError> {
    if field == UNAVAILABLE {
        return Ok(None);
    }
    field
        .parse::<Decimal>()
        .map(Some)
        .map_err(|_| RecordError::Field {
            field: name,
            value: field.to_string(),
        })
}

/// Append-only CSV writer
#[derive(Debug, Clone)]
pub struct PriceLogger {
    path: PathBuf,
    price_columns: usize,
}

impl PriceLogger {
    /// Open (or create with header) the CSV file at `path`.
    /// `headers` is the full header row; an existing file must start with it.
    pub fn new<P: AsRef<Path>>(path: P, headers: &[String]) -> Result<Self, RecordError> {
        let path = path.as_ref().to_path_buf();
        let io_err = |source| RecordError::Io {
            path: path.clone(),
            source,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(io_err)?;
        }

        let header = headers.join(",");
        // create_new fails if the file exists, so an existing log is never truncated
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(mut f) => {
                f.write_all(format!("{}\n", header).as_bytes()).map_err(io_err)?;
                info!("Created CSV log file: {}", path.display());
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                let mut first = String::new();
                BufReader::new(File::open(&path).map_err(io_err)?)
                    .read_line(&mut first)
                    .map_err(io_err)?;
                let found = first.trim_end_matches(['\n', '\r']);
                if first.is_empty() {
                    let mut f = OpenOptions::new().append(true).open(&path).map_err(io_err)?;
                    f.write_all(format!("{}\n", header).as_bytes()).map_err(io_err)?;
                    info!("Wrote header to empty CSV log file: {}", path.display());
                } else if found != header {
                    return Err(RecordError::HeaderMismatch {
                        path: path.clone(),
                        expected: header,
                        found: found.to_string(),
                    });
                } else {
                    info!("Using existing CSV log file: {}", path.display());
                }
            }
            Err(e) => return Err(io_err(e)),
        }

        Ok(Self {
            path,
            price_columns: headers.len().saturating_sub(6),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of pair price columns in this file's layout
    pub fn price_columns(&self) -> usize {
        self.price_columns
    }

    /// Append one record as a single write on an append-mode handle
    pub fn append(&self, record: &CsvRecord) -> Result<(), RecordError> {
        let io_err = |source| RecordError::Io {
            path: self.path.clone(),
            source,
        };

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(io_err)?;
        file.write_all(record.to_line().as_bytes()).map_err(io_err)?;
        Ok(())
    }
}
