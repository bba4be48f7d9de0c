//! Backtest profile: what to trade, when to enter, and which expirations
//! each entry may use.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::StrategyKind;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProfileError {
    #[error("Profile has no symbols")]
    NoSymbols,

    #[error("Symbol listed twice: {0}")]
    DuplicateSymbol(String),

    #[error("{field} references unknown symbol {symbol}")]
    UnknownSymbol { field: &'static str, symbol: String },

    #[error("{symbol}: DTE window ({earliest}, {latest}) is empty")]
    EmptyWindow {
        symbol: String,
        earliest: NaiveDate,
        latest: NaiveDate,
    },

    #[error("{0} has entry dates but no DTE windows")]
    MissingWindows(String),
}

/// Expiration bounds for one entry bucket.
///
/// Written in config as a two-element array `["2016-01-01", "2016-02-01"]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "(NaiveDate, NaiveDate)", into = "(NaiveDate, NaiveDate)")]
pub struct DteWindow {
    pub earliest: NaiveDate,
    pub latest: NaiveDate,
}

impl DteWindow {
    pub fn new(earliest: NaiveDate, latest: NaiveDate) -> Self {
        Self { earliest, latest }
    }

    /// A window is eligible on `as_of` only while its lower bound is still ahead.
    pub fn is_eligible(&self, as_of: NaiveDate) -> bool {
        self.earliest > as_of
    }

    /// Open interval test, both bounds excluded.
    pub fn contains_strictly(&self, date: NaiveDate) -> bool {
        self.earliest < date && date < self.latest
    }
}

impl fmt::Display for DteWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.earliest, self.latest)
    }
}

impl From<(NaiveDate, NaiveDate)> for DteWindow {
    fn from((earliest, latest): (NaiveDate, NaiveDate)) -> Self {
        Self { earliest, latest }
    }
}

impl From<DteWindow> for (NaiveDate, NaiveDate) {
    fn from(window: DteWindow) -> Self {
        (window.earliest, window.latest)
    }
}

/// Read-only description of a backtest run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestProfile {
    /// Tradable symbols, in processing order.
    pub symbols: Vec<String>,

    /// Dates on which each symbol opens a new position.
    #[serde(default)]
    pub entry_dates: HashMap<String, BTreeSet<NaiveDate>>,

    /// Per-symbol expiration windows, in order of preference.
    #[serde(default, rename = "DTE_range", alias = "dte_range")]
    pub dte_range: HashMap<String, Vec<DteWindow>>,

    /// Entry algorithm.
    pub strategy: StrategyKind,

    /// Generic execution parameters.
    #[serde(default)]
    pub exec_params: toml::Table,

    /// Strategy-specific parameters.
    #[serde(default)]
    pub strat_params: toml::Table,
}

impl BacktestProfile {
    pub fn new(symbols: Vec<String>, strategy: StrategyKind) -> Self {
        Self {
            symbols,
            entry_dates: HashMap::new(),
            dte_range: HashMap::new(),
            strategy,
            exec_params: toml::Table::new(),
            strat_params: toml::Table::new(),
        }
    }

    /// Register entry dates for a symbol.
    pub fn with_entry_dates(mut self, symbol: &str, dates: &[NaiveDate]) -> Self {
        self.entry_dates
            .entry(symbol.to_string())
            .or_default()
            .extend(dates.iter().copied());
        self
    }

    /// Append DTE windows for a symbol.
    pub fn with_windows(mut self, symbol: &str, windows: &[DteWindow]) -> Self {
        self.dte_range
            .entry(symbol.to_string())
            .or_default()
            .extend(windows.iter().copied());
        self
    }

    /// Windows for a symbol (empty if none configured).
    pub fn windows(&self, symbol: &str) -> &[DteWindow] {
        self.dte_range.get(symbol).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Whether `symbol` has an entry scheduled on `as_of`.
    pub fn is_entry_date(&self, symbol: &str, as_of: NaiveDate) -> bool {
        self.entry_dates
            .get(symbol)
            .is_some_and(|dates| dates.contains(&as_of))
    }

    /// Symbols entering on `as_of`, in `symbols` order.
    pub fn entry_symbols(&self, as_of: NaiveDate) -> Vec<&str> {
        self.symbols
            .iter()
            .filter(|s| self.is_entry_date(s, as_of))
            .map(String::as_str)
            .collect()
    }

    /// Check the profile is internally consistent.
    pub fn validate(&self) -> Result<(), ProfileError> {
        if self.symbols.is_empty() {
            return Err(ProfileError::NoSymbols);
        }

        let mut seen = HashSet::new();
        for symbol in &self.symbols {
            if !seen.insert(symbol.as_str()) {
                return Err(ProfileError::DuplicateSymbol(symbol.clone()));
            }
        }

        // Sorted so the reported error does not depend on hash order.
        let mut entry_keys: Vec<&String> = self.entry_dates.keys().collect();
        entry_keys.sort();
        for symbol in entry_keys {
            if !seen.contains(symbol.as_str()) {
                return Err(ProfileError::UnknownSymbol {
                    field: "entry_dates",
                    symbol: symbol.clone(),
                });
            }
            if !self.entry_dates[symbol].is_empty() && self.windows(symbol).is_empty() {
                return Err(ProfileError::MissingWindows(symbol.clone()));
            }
        }

        let mut window_keys: Vec<&String> = self.dte_range.keys().collect();
        window_keys.sort();
        for symbol in window_keys {
            if !seen.contains(symbol.as_str()) {
                return Err(ProfileError::UnknownSymbol {
                    field: "DTE_range",
                    symbol: symbol.clone(),
                });
            }
            if let Some(w) = self.dte_range[symbol]
                .iter()
                .find(|w| w.earliest >= w.latest)
            {
                return Err(ProfileError::EmptyWindow {
                    symbol: symbol.clone(),
                    earliest: w.earliest,
                    latest: w.latest,
                });
            }
        }

        Ok(())
    }
}
