//! Core data types for the entry backtester.
//!
//! A backtest walks an ordered list of [`TradingDay`]s. Each day points at
//! one options-chain snapshot on disk through a [`ChainLocator`], and a
//! loaded snapshot is a flat list of [`ContractRecord`] rows covering every
//! symbol quoted that day.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Expiration format used by the chain snapshots.
pub const EXPIRATION_FORMAT: &str = "%m/%d/%Y";

/// Format a Date column takes once cast to text.
const ISO_FORMAT: &str = "%Y-%m-%d";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LocatorError {
    #[error("Expected an 8-digit YYYYMMDD date, got {0:?}")]
    Malformed(String),

    #[error("Not a calendar date: {0}")]
    InvalidDate(String),
}

/// Relative path of one day's chain snapshot.
///
/// Snapshot stores are laid out as `/<YYYY>/<YYYYMM>/<YYYYMMDD>_edited.<ext>`
/// below a data root.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChainLocator(String);

impl ChainLocator {
    /// Build a locator from an 8-digit `YYYYMMDD` string.
    pub fn from_date_str(date: &str, extension: &str) -> Result<Self, LocatorError> {
        if date.len() != 8 || !date.bytes().all(|b| b.is_ascii_digit()) {
            return Err(LocatorError::Malformed(date.to_string()));
        }
        NaiveDate::parse_from_str(date, "%Y%m%d")
            .map_err(|_| LocatorError::InvalidDate(date.to_string()))?;

        Ok(Self(format!(
            "/{}/{}/{}_edited.{}",
            &date[..4],
            &date[..6],
            date,
            extension
        )))
    }

    /// Build a locator for a calendar date.
    pub fn for_date(date: NaiveDate, extension: &str) -> Self {
        let stamp = date.format("%Y%m%d").to_string();
        Self(format!(
            "/{}/{}/{}_edited.{}",
            &stamp[..4],
            &stamp[..6],
            stamp,
            extension
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Full path of the snapshot below `root`.
    pub fn resolve(&self, root: &Path) -> PathBuf {
        root.join(self.0.trim_start_matches('/'))
    }
}

impl fmt::Display for ChainLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One day of the backtest calendar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradingDay {
    /// As-of date (no time component).
    pub as_of: NaiveDate,

    /// Where this day's chain snapshot lives.
    pub locator: ChainLocator,
}

impl TradingDay {
    pub fn new(as_of: NaiveDate, extension: &str) -> Self {
        Self {
            as_of,
            locator: ChainLocator::for_date(as_of, extension),
        }
    }
}

/// A single row of an options chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContractRecord {
    /// Underlying symbol (e.g., "BAC")
    pub symbol: String,

    /// Option expiration date
    pub expiration: NaiveDate,

    /// Strike price
    pub strike: Decimal,

    /// Underlying price at snapshot time
    pub underlying_price: Decimal,

    /// Every other column of the snapshot, untouched
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub fields: BTreeMap<String, String>,
}

impl ContractRecord {
    pub fn new(symbol: &str, expiration: NaiveDate, strike: Decimal, underlying_price: Decimal) -> Self {
        Self {
            symbol: symbol.to_string(),
            expiration,
            strike,
            underlying_price,
            fields: BTreeMap::new(),
        }
    }

    /// Attach a passthrough field.
    pub fn with_field(mut self, name: &str, value: &str) -> Self {
        self.fields.insert(name.to_string(), value.to_string());
        self
    }

    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }
}

/// Full options chain for every symbol on one trading day.
#[derive(Debug, Clone, Default)]
pub struct ChainSnapshot {
    pub as_of: NaiveDate,
    pub records: Vec<ContractRecord>,
}

impl ChainSnapshot {
    pub fn new(as_of: NaiveDate, records: Vec<ContractRecord>) -> Self {
        Self { as_of, records }
    }

    /// Rows for one underlying, in snapshot order.
    pub fn rows_for(&self, symbol: &str) -> Vec<&ContractRecord> {
        self.records.iter().filter(|r| r.symbol == symbol).collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Parse a stored expiration.
///
/// Snapshots store `MM/DD/YYYY`; binary stores with a typed Date column
/// come through as `YYYY-MM-DD`.
pub fn parse_expiration(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    NaiveDate::parse_from_str(value, EXPIRATION_FORMAT)
        .or_else(|_| NaiveDate::parse_from_str(value, ISO_FORMAT))
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_locator_from_date_str() {
        let locator = ChainLocator::from_date_str("20190104", "h5").unwrap();
        assert_eq!(locator.as_str(), "/2019/201901/20190104_edited.h5");
    }

    #[test]
    fn test_locator_rejects_bad_input() {
        assert_eq!(
            ChainLocator::from_date_str("2019014", "csv"),
            Err(LocatorError::Malformed("2019014".to_string()))
        );
        assert_eq!(
            ChainLocator::from_date_str("2019-1-4", "csv"),
            Err(LocatorError::Malformed("2019-1-4".to_string()))
        );
        assert_eq!(
            ChainLocator::from_date_str("20190231", "csv"),
            Err(LocatorError::InvalidDate("20190231".to_string()))
        );
    }

    #[test]
    fn test_locator_for_date_matches_string_form() {
        let from_date = ChainLocator::for_date(date(2016, 7, 6), "parquet");
        let from_str = ChainLocator::from_date_str("20160706", "parquet").unwrap();
        assert_eq!(from_date, from_str);
    }

    #[test]
    fn test_locator_resolves_under_root() {
        let locator = ChainLocator::for_date(date(2016, 7, 6), "csv");
        let path = locator.resolve(Path::new("/data/options"));
        assert_eq!(path, PathBuf::from("/data/options/2016/201607/20160706_edited.csv"));
    }

    #[test]
    fn test_parse_expiration_formats() {
        assert_eq!(parse_expiration("01/15/2016"), Some(date(2016, 1, 15)));
        assert_eq!(parse_expiration("2016-01-15"), Some(date(2016, 1, 15)));
        assert_eq!(parse_expiration("15/01/2016"), None);
    }

    #[test]
    fn test_rows_for_symbol() {
        let snapshot = ChainSnapshot::new(
            date(2016, 1, 4),
            vec![
                ContractRecord::new("BAC", date(2016, 1, 15), dec!(15), dec!(15.2)),
                ContractRecord::new("AMAT", date(2016, 1, 15), dec!(18), dec!(18.4)),
                ContractRecord::new("BAC", date(2016, 1, 15), dec!(16), dec!(15.2)),
            ],
        );
        let rows = snapshot.rows_for("BAC");
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].strike, dec!(16));
        assert!(snapshot.rows_for("AAPL").is_empty());
    }
}
