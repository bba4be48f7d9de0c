//! Run configuration.
//!
//! A backtest is described by one TOML file with a `[run]` table (where the
//! data lives and how to read it) and a `[profile]` table (what to trade):
//!
//! ```toml
//! [run]
//! data_root = "options_data"
//! calendar = "tradingdays.txt"
//! format = "csv"
//!
//! [profile]
//! symbols = ["BAC"]
//! strategy = "earnings"
//!
//! [profile.entry_dates]
//! BAC = ["2016-01-04"]
//!
//! [profile.DTE_range]
//! BAC = [["2016-01-08", "2016-02-01"]]
//! ```
//!
//! Relative paths resolve against the directory holding the config file.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::backtest::MissingChainPolicy;
use crate::data::{ChainColumns, ChainFormat, FileCalendar, SnapshotLoader, DEFAULT_MAX_DAYS};
use crate::strategy::{BacktestProfile, ProfileError};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Invalid profile: {0}")]
    Profile(#[from] ProfileError),
}

/// Data locations and loading options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    /// Root of the chain snapshot store.
    pub data_root: PathBuf,

    /// Trading-day file.
    pub calendar: PathBuf,

    /// Snapshot format.
    #[serde(default)]
    pub format: ChainFormat,

    /// Most recent trading days to walk.
    #[serde(default = "default_max_days")]
    pub max_trading_days: usize,

    /// Walk the whole calendar, ignoring `max_trading_days`.
    #[serde(default)]
    pub full_history: bool,

    /// What to do when a needed snapshot is missing.
    #[serde(default)]
    pub on_missing_chain: MissingChainPolicy,

    /// Names of the required chain columns.
    #[serde(default)]
    pub columns: ChainColumns,
}

fn default_max_days() -> usize {
    DEFAULT_MAX_DAYS
}

impl RunConfig {
    pub fn new(data_root: impl Into<PathBuf>, calendar: impl Into<PathBuf>) -> Self {
        Self {
            data_root: data_root.into(),
            calendar: calendar.into(),
            format: ChainFormat::default(),
            max_trading_days: DEFAULT_MAX_DAYS,
            full_history: false,
            on_missing_chain: MissingChainPolicy::default(),
            columns: ChainColumns::default(),
        }
    }

    /// Calendar limit, `None` for full history.
    pub fn day_limit(&self) -> Option<usize> {
        if self.full_history {
            None
        } else {
            Some(self.max_trading_days)
        }
    }

    /// Calendar reader for this configuration.
    pub fn calendar(&self) -> FileCalendar {
        FileCalendar::new(&self.calendar, self.format.extension()).with_max_days(self.day_limit())
    }

    /// Snapshot loader for this configuration.
    pub fn loader(&self) -> SnapshotLoader {
        SnapshotLoader::new(&self.data_root, self.format).with_columns(self.columns.clone())
    }

    fn resolve_paths(&mut self, base: &Path) {
        if self.data_root.is_relative() {
            self.data_root = base.join(&self.data_root);
        }
        if self.calendar.is_relative() {
            self.calendar = base.join(&self.calendar);
        }
    }
}

/// Complete backtest description.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestFile {
    pub run: RunConfig,
    pub profile: BacktestProfile,
}

impl BacktestFile {
    /// Load and validate a config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let base = path.parent().unwrap_or_else(|| Path::new(""));
        Self::from_toml_str(&contents, base)
    }

    /// Parse a config, resolving relative paths against `base`.
    pub fn from_toml_str(contents: &str, base: &Path) -> Result<Self, ConfigError> {
        let mut file: BacktestFile = toml::from_str(contents)?;
        file.run.resolve_paths(base);
        file.profile.validate()?;
        Ok(file)
    }
}
