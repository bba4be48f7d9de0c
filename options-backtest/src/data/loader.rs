//! Chain snapshot loader.
//!
//! Reads one trading day's options chain from the snapshot store into
//! [`ContractRecord`] rows. Two on-disk formats are supported, both read
//! through polars:
//! - delimited text (`.csv`)
//! - binary columnar tables (`.parquet`)
//!
//! Every snapshot must carry the symbol, expiration, strike and underlying
//! price columns; any other column is passed through as text. CSV columns
//! are read as strings, so passthrough values keep their exact spelling.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use polars::prelude::*;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::types::{parse_expiration, ChainSnapshot, ContractRecord, TradingDay};

#[derive(Error, Debug)]
pub enum LoaderError {
    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Polars error: {0}")]
    Polars(#[from] PolarsError),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Anything that can produce a day's chain snapshot.
pub trait ChainLoader {
    fn load(&self, day: &TradingDay) -> Result<ChainSnapshot, LoaderError>;
}

/// On-disk snapshot format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChainFormat {
    #[default]
    Csv,
    Parquet,
}

impl ChainFormat {
    /// File extension used in snapshot locators.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Parquet => "parquet",
        }
    }
}

/// Column names of the required chain fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChainColumns {
    pub symbol: String,
    pub expiration: String,
    pub strike: String,
    pub underlying_price: String,
}

impl Default for ChainColumns {
    fn default() -> Self {
        Self {
            symbol: "UnderlyingSymbol".to_string(),
            expiration: "Expiration".to_string(),
            strike: "Strike".to_string(),
            underlying_price: "UnderlyingPrice".to_string(),
        }
    }
}

impl ChainColumns {
    fn is_required(&self, name: &str) -> bool {
        name == self.symbol
            || name == self.expiration
            || name == self.strike
            || name == self.underlying_price
    }
}

/// Loader for snapshot files stored below a data root.
#[derive(Debug, Clone)]
pub struct SnapshotLoader {
    root: PathBuf,
    format: ChainFormat,
    columns: ChainColumns,
}

impl SnapshotLoader {
    /// Create a loader reading `format` snapshots below `root`.
    pub fn new(root: impl Into<PathBuf>, format: ChainFormat) -> Self {
        Self {
            root: root.into(),
            format,
            columns: ChainColumns::default(),
        }
    }

    /// Override the required column names.
    pub fn with_columns(mut self, columns: ChainColumns) -> Self {
        self.columns = columns;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn format(&self) -> ChainFormat {
        self.format
    }

    /// Read a snapshot file as a DataFrame.
    pub fn load_dataframe(&self, path: &Path) -> Result<DataFrame, LoaderError> {
        if !path.exists() {
            return Err(LoaderError::FileNotFound(path.display().to_string()));
        }

        let df = match self.format {
            ChainFormat::Csv => CsvReadOptions::default()
                .with_has_header(true)
                .with_infer_schema_length(Some(0))
                .try_into_reader_with_file_path(Some(path.to_path_buf()))?
                .finish()?,
            ChainFormat::Parquet => {
                LazyFrame::scan_parquet(path, ScanArgsParquet::default())?.collect()?
            }
        };
        Ok(df)
    }
}

impl ChainLoader for SnapshotLoader {
    fn load(&self, day: &TradingDay) -> Result<ChainSnapshot, LoaderError> {
        let path = day.locator.resolve(&self.root);
        let df = self.load_dataframe(&path)?;
        let records = dataframe_to_records(&df, &self.columns)?;
        Ok(ChainSnapshot::new(day.as_of, records))
    }
}

/// Fetch a required column, erroring with its name when absent.
fn required_column<'a>(df: &'a DataFrame, name: &str) -> Result<&'a Column, LoaderError> {
    df.column(name)
        .map_err(|_| LoaderError::InvalidData(format!("Missing column: {}", name)))
}

/// Convert a chain DataFrame into contract records.
fn dataframe_to_records(
    df: &DataFrame,
    columns: &ChainColumns,
) -> Result<Vec<ContractRecord>, LoaderError> {
    let symbol_col = required_column(df, &columns.symbol)?.cast(&DataType::String)?;
    let expir_col = required_column(df, &columns.expiration)?.cast(&DataType::String)?;
    let strike_col = required_column(df, &columns.strike)?.cast(&DataType::Float64)?;
    let price_col = required_column(df, &columns.underlying_price)?.cast(&DataType::Float64)?;

    let symbols = symbol_col.str()?;
    let expirations = expir_col.str()?;
    let strikes = strike_col.f64()?;
    let prices = price_col.f64()?;

    let extra: Vec<&Column> = df
        .get_columns()
        .iter()
        .filter(|c| !columns.is_required(c.name().as_str()))
        .collect();

    let mut records = Vec::with_capacity(df.height());

    for idx in 0..df.height() {
        let symbol = symbols.get(idx).ok_or_else(|| missing_value(&columns.symbol, idx))?;

        let raw_expiration = expirations
            .get(idx)
            .ok_or_else(|| missing_value(&columns.expiration, idx))?;
        let expiration = parse_expiration(raw_expiration).ok_or_else(|| {
            LoaderError::InvalidData(format!(
                "Row {}: unparsable expiration {:?}",
                idx, raw_expiration
            ))
        })?;

        let strike = strikes.get(idx).ok_or_else(|| missing_value(&columns.strike, idx))?;
        let price = prices
            .get(idx)
            .ok_or_else(|| missing_value(&columns.underlying_price, idx))?;

        let mut fields = BTreeMap::new();
        for column in &extra {
            let value = column.get(idx)?;
            if matches!(value, AnyValue::Null) {
                continue;
            }
            let text = match value.get_str() {
                Some(s) => s.to_string(),
                None => value.to_string(),
            };
            fields.insert(column.name().to_string(), text);
        }

        records.push(ContractRecord {
            symbol: symbol.to_string(),
            expiration,
            strike: to_decimal(strike, &columns.strike, idx)?,
            underlying_price: to_decimal(price, &columns.underlying_price, idx)?,
            fields,
        });
    }

    Ok(records)
}

fn missing_value(column: &str, idx: usize) -> LoaderError {
    LoaderError::InvalidData(format!("Row {}: missing {}", idx, column))
}

fn to_decimal(value: f64, column: &str, idx: usize) -> Result<Decimal, LoaderError> {
    Decimal::try_from(value).map_err(|_| {
        LoaderError::InvalidData(format!("Row {}: {} is not a finite number", idx, column))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;
    use std::fs;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn write_snapshot(root: &Path, day: &TradingDay, contents: &[u8]) {
        let path = day.locator.resolve(root);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    #[test]
    fn test_format_extensions() {
        assert_eq!(ChainFormat::Csv.extension(), "csv");
        assert_eq!(ChainFormat::Parquet.extension(), "parquet");
    }

    #[test]
    fn test_load_csv_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let day = TradingDay::new(date(2015, 12, 1), "csv");
        write_snapshot(
            dir.path(),
            &day,
            b"UnderlyingSymbol,UnderlyingPrice,Type,Expiration,Strike,Bid\n\
              BAC,17.25,call,01/15/2016,17,0.71\n\
              BAC,17.25,put,01/15/2016,17,0.45\n\
              AMAT,18.4,call,02/19/2016,18.5,0.9\n",
        );

        let loader = SnapshotLoader::new(dir.path(), ChainFormat::Csv);
        let snapshot = loader.load(&day).unwrap();

        assert_eq!(snapshot.as_of, date(2015, 12, 1));
        assert_eq!(snapshot.len(), 3);

        let first = &snapshot.records[0];
        assert_eq!(first.symbol, "BAC");
        assert_eq!(first.expiration, date(2016, 1, 15));
        assert_eq!(first.strike, dec!(17));
        assert_eq!(first.underlying_price, dec!(17.25));
        assert_eq!(first.field("Type"), Some("call"));
        assert_eq!(first.field("Bid"), Some("0.71"));
        assert!(first.field("Strike").is_none());

        assert_eq!(snapshot.records[2].strike, dec!(18.5));
    }

    #[test]
    fn test_csv_types_are_not_inferred_from_leading_rows() {
        let dir = tempfile::tempdir().unwrap();
        let day = TradingDay::new(date(2015, 12, 1), "csv");

        let mut contents = String::from("UnderlyingSymbol,UnderlyingPrice,Expiration,Strike,Bid\n");
        for _ in 0..150 {
            contents.push_str("AMAT,18,01/15/2016,40,0\n");
        }
        contents.push_str("BAC,17.25,01/15/2016,17.5,0.05\n");
        write_snapshot(dir.path(), &day, contents.as_bytes());

        let loader = SnapshotLoader::new(dir.path(), ChainFormat::Csv);
        let snapshot = loader.load(&day).unwrap();

        assert_eq!(snapshot.len(), 151);
        let last = &snapshot.records[150];
        assert_eq!(last.symbol, "BAC");
        assert_eq!(last.strike, dec!(17.5));
        assert_eq!(last.underlying_price, dec!(17.25));
        assert_eq!(last.field("Bid"), Some("0.05"));
        assert_eq!(snapshot.records[0].field("Bid"), Some("0"));
    }

    #[test]
    fn test_csv_passthrough_fields_keep_their_text() {
        let dir = tempfile::tempdir().unwrap();
        let day = TradingDay::new(date(2015, 12, 1), "csv");
        write_snapshot(
            dir.path(),
            &day,
            b"UnderlyingSymbol,UnderlyingPrice,Expiration,Strike,Bid,OptionRoot\n\
              BAC,17.25,01/15/2016,17,1.50,007\n",
        );

        let loader = SnapshotLoader::new(dir.path(), ChainFormat::Csv);
        let record = &loader.load(&day).unwrap().records[0];

        assert_eq!(record.field("Bid"), Some("1.50"));
        assert_eq!(record.field("OptionRoot"), Some("007"));
    }

    #[test]
    fn test_load_parquet_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let day = TradingDay::new(date(2015, 12, 1), "parquet");
        let path = day.locator.resolve(dir.path());
        fs::create_dir_all(path.parent().unwrap()).unwrap();

        let mut df = df!(
            "UnderlyingSymbol" => ["BAC", "BAC"],
            "UnderlyingPrice" => [30.4, 30.4],
            "Expiration" => ["01/15/2016", "02/10/2016"],
            "Strike" => [30.0, 32.0],
            "OpenInterest" => [120i64, 45i64]
        )
        .unwrap();
        let mut file = fs::File::create(&path).unwrap();
        ParquetWriter::new(&mut file).finish(&mut df).unwrap();

        let loader = SnapshotLoader::new(dir.path(), ChainFormat::Parquet);
        let snapshot = loader.load(&day).unwrap();

        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot.records[1].expiration, date(2016, 2, 10));
        assert_eq!(snapshot.records[0].underlying_price, dec!(30.4));
        assert_eq!(snapshot.records[0].field("OpenInterest"), Some("120"));
    }

    #[test]
    fn test_missing_snapshot_is_file_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let day = TradingDay::new(date(2015, 12, 1), "csv");
        let loader = SnapshotLoader::new(dir.path(), ChainFormat::Csv);

        let err = loader.load(&day).unwrap_err();
        assert!(matches!(err, LoaderError::FileNotFound(_)));
    }

    #[test]
    fn test_missing_required_column() {
        let dir = tempfile::tempdir().unwrap();
        let day = TradingDay::new(date(2015, 12, 1), "csv");
        write_snapshot(
            dir.path(),
            &day,
            b"UnderlyingSymbol,Expiration,Strike\nBAC,01/15/2016,17\n",
        );

        let loader = SnapshotLoader::new(dir.path(), ChainFormat::Csv);
        let err = loader.load(&day).unwrap_err();
        assert!(matches!(err, LoaderError::InvalidData(msg) if msg.contains("UnderlyingPrice")));
    }

    #[test]
    fn test_unparsable_expiration() {
        let dir = tempfile::tempdir().unwrap();
        let day = TradingDay::new(date(2015, 12, 1), "csv");
        write_snapshot(
            dir.path(),
            &day,
            b"UnderlyingSymbol,UnderlyingPrice,Expiration,Strike\nBAC,17.25,Jan 2016,17\n",
        );

        let loader = SnapshotLoader::new(dir.path(), ChainFormat::Csv);
        let err = loader.load(&day).unwrap_err();
        assert!(matches!(err, LoaderError::InvalidData(msg) if msg.contains("expiration")));
    }

    #[test]
    fn test_custom_column_names() {
        let dir = tempfile::tempdir().unwrap();
        let day = TradingDay::new(date(2015, 12, 1), "csv");
        write_snapshot(
            dir.path(),
            &day,
            b"root,px,expiry,k\nBAC,17.25,01/15/2016,17\n",
        );

        let columns = ChainColumns {
            symbol: "root".to_string(),
            expiration: "expiry".to_string(),
            strike: "k".to_string(),
            underlying_price: "px".to_string(),
        };
        let loader = SnapshotLoader::new(dir.path(), ChainFormat::Csv).with_columns(columns);
        let snapshot = loader.load(&day).unwrap();
        assert_eq!(snapshot.records[0].strike, dec!(17));
        assert!(snapshot.records[0].fields.is_empty());
    }
}
