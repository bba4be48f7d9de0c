//! Trading-day calendar.
//!
//! The calendar file is plain comma-delimited text with one trading day per
//! line; the first eight characters of the first field are the `YYYYMMDD`
//! date. Each date is paired with the locator of its chain snapshot.

use std::fs;
use std::path::PathBuf;

use chrono::NaiveDate;
use thiserror::Error;

use super::types::{ChainLocator, TradingDay};

/// Number of most recent trading days kept when no explicit limit is set.
pub const DEFAULT_MAX_DAYS: usize = 600;

#[derive(Error, Debug)]
pub enum CalendarError {
    #[error("IO error reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Line {line}: invalid trading day {value:?}")]
    InvalidDate { line: usize, value: String },

    #[error("Trading days out of order: {next} follows {previous}")]
    OutOfOrder {
        previous: NaiveDate,
        next: NaiveDate,
    },
}

/// Source of the ordered trading days a backtest walks.
pub trait CalendarProvider {
    /// Trading days in strictly ascending order.
    fn trading_days(&self) -> Result<Vec<TradingDay>, CalendarError>;
}

/// Calendar read from a trading-day file.
#[derive(Debug, Clone)]
pub struct FileCalendar {
    path: PathBuf,
    extension: String,
    max_days: Option<usize>,
}

impl FileCalendar {
    /// Create a calendar for `path` whose snapshots use `extension`.
    pub fn new(path: impl Into<PathBuf>, extension: &str) -> Self {
        Self {
            path: path.into(),
            extension: extension.to_string(),
            max_days: Some(DEFAULT_MAX_DAYS),
        }
    }

    /// Keep only the most recent `max_days` entries; `None` keeps all of them.
    pub fn with_max_days(mut self, max_days: Option<usize>) -> Self {
        self.max_days = max_days;
        self
    }

    fn parse(&self, contents: &str) -> Result<Vec<TradingDay>, CalendarError> {
        let mut lines: Vec<(usize, &str)> = contents
            .lines()
            .enumerate()
            .map(|(idx, line)| (idx + 1, line.trim()))
            .filter(|(_, line)| !line.is_empty())
            .collect();

        // Older history is dropped unparsed.
        if let Some(max) = self.max_days {
            if lines.len() > max {
                lines.drain(..lines.len() - max);
            }
        }

        let mut days: Vec<TradingDay> = Vec::with_capacity(lines.len());

        for (line_no, line) in lines {
            let first = line.split(',').next().unwrap_or_default().trim();
            let stamp = first.get(..8).unwrap_or(first);
            let invalid = || CalendarError::InvalidDate {
                line: line_no,
                value: stamp.to_string(),
            };

            let locator = ChainLocator::from_date_str(stamp, &self.extension).map_err(|_| invalid())?;
            let as_of = NaiveDate::parse_from_str(stamp, "%Y%m%d").map_err(|_| invalid())?;

            if let Some(previous) = days.last() {
                if as_of <= previous.as_of {
                    return Err(CalendarError::OutOfOrder {
                        previous: previous.as_of,
                        next: as_of,
                    });
                }
            }

            days.push(TradingDay { as_of, locator });
        }

        Ok(days)
    }
}

impl CalendarProvider for FileCalendar {
    fn trading_days(&self) -> Result<Vec<TradingDay>, CalendarError> {
        let contents = fs::read_to_string(&self.path).map_err(|source| CalendarError::Io {
            path: self.path.display().to_string(),
            source,
        })?;
        self.parse(&contents)
    }
}

/// In-memory calendar.
#[derive(Debug, Clone, Default)]
pub struct StaticCalendar {
    days: Vec<TradingDay>,
}

impl StaticCalendar {
    pub fn new(days: Vec<TradingDay>) -> Self {
        Self { days }
    }

    /// Calendar over `dates`, snapshots using `extension`.
    pub fn from_dates(dates: &[NaiveDate], extension: &str) -> Self {
        Self {
            days: dates.iter().map(|d| TradingDay::new(*d, extension)).collect(),
        }
    }
}

impl CalendarProvider for StaticCalendar {
    fn trading_days(&self) -> Result<Vec<TradingDay>, CalendarError> {
        for pair in self.days.windows(2) {
            if pair[1].as_of <= pair[0].as_of {
                return Err(CalendarError::OutOfOrder {
                    previous: pair[0].as_of,
                    next: pair[1].as_of,
                });
            }
        }
        Ok(self.days.clone())
    }
}
