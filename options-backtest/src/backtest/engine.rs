//! Event-driven backtest engine.
//!
//! Walks the trading calendar one day at a time:
//! 1. Find the symbols with an entry scheduled today
//! 2. Check whether any position is still open
//! 3. Skip the day if neither holds (no chain is loaded)
//! 4. Otherwise load the day's chain and run the entry strategy for each
//!    entering symbol, recording selections in the position book
//!
//! Days are processed strictly in ascending order since open positions carry
//! forward from one day to the next.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::data::{ChainLoader, ChainSnapshot, LoaderError, TradingDay};
use crate::strategy::{BacktestProfile, EntryStrategy, ProfileError};

use super::book::{BookError, PositionBook};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Invalid profile: {0}")]
    Profile(#[from] ProfileError),

    #[error("Chain data unavailable for {date}: {source}")]
    DataUnavailable {
        date: NaiveDate,
        #[source]
        source: LoaderError,
    },

    #[error("Trading day {next} does not follow {previous}")]
    OutOfOrder {
        previous: NaiveDate,
        next: NaiveDate,
    },

    #[error("Position book error: {0}")]
    Book(#[from] BookError),
}

/// What to do when a required day's chain cannot be loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingChainPolicy {
    /// Stop the run with `DataUnavailable`.
    #[default]
    Abort,
    /// Log, count and move on to the next day.
    SkipDay,
}

/// Events found on one trading day.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DayEvent {
    /// Symbols with an entry scheduled today, in profile order.
    pub entry_symbols: Vec<String>,
    /// Whether the book holds any open position.
    pub has_open_positions: bool,
}

impl DayEvent {
    /// A day with no entries and no open positions needs no chain.
    pub fn is_idle(&self) -> bool {
        self.entry_symbols.is_empty() && !self.has_open_positions
    }
}

/// How a single day was handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DayOutcome {
    /// Nothing to do; chain not loaded.
    Idle,
    /// Chain loaded and entries attempted.
    Processed { opened: usize },
    /// Chain missing and skipped under `MissingChainPolicy::SkipDay`.
    Unavailable,
}

/// Counters for a completed run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub strategy: String,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    /// Trading days walked.
    pub days_seen: usize,
    /// Days skipped without loading a chain.
    pub days_skipped: usize,
    /// Days whose chain was loaded.
    pub days_processed: usize,
    /// Days whose chain could not be loaded (skip-day policy only).
    pub days_unavailable: usize,
    /// Chain load attempts.
    pub chain_loads: usize,
    /// Positions opened.
    pub positions_opened: usize,
    /// Entries with no expiration inside the window.
    pub selection_misses: usize,
    /// Entries failing on configuration or data integrity.
    pub selection_errors: usize,
    /// Positions still open at the end of the run.
    pub open_positions: usize,
}

impl RunSummary {
    /// Generate summary string.
    pub fn summary(&self) -> String {
        let range = match (self.start_date, self.end_date) {
            (Some(start), Some(end)) => format!("{} to {}", start, end),
            _ => "no trading days".to_string(),
        };
        format!(
            "Backtest Run ({}, strategy: {})\n\
             ----------------------------------------\n\
             Trading Days: {} (processed: {}, skipped: {}, unavailable: {})\n\
             Chain Loads: {}\n\
             \n\
             Positions Opened: {}\n\
             Open At End: {}\n\
             Selection Misses: {}\n\
             Selection Errors: {}",
            range,
            self.strategy,
            self.days_seen,
            self.days_processed,
            self.days_skipped,
            self.days_unavailable,
            self.chain_loads,
            self.positions_opened,
            self.open_positions,
            self.selection_misses,
            self.selection_errors,
        )
    }
}

/// The backtest engine.
pub struct BacktestEngine<L: ChainLoader> {
    profile: BacktestProfile,
    loader: L,
    strategy: Box<dyn EntryStrategy>,
    book: PositionBook,
    missing_chain: MissingChainPolicy,
    last_date: Option<NaiveDate>,
    stats: RunSummary,
}

impl<L: ChainLoader> BacktestEngine<L> {
    /// Create an engine for a validated profile.
    pub fn new(profile: BacktestProfile, loader: L) -> Result<Self, EngineError> {
        profile.validate()?;
        let strategy = profile.strategy.build();
        let book = PositionBook::new(&profile.symbols);
        let stats = RunSummary {
            strategy: strategy.name().to_string(),
            ..Default::default()
        };
        Ok(Self {
            profile,
            loader,
            strategy,
            book,
            missing_chain: MissingChainPolicy::default(),
            last_date: None,
            stats,
        })
    }

    /// Set the policy for days whose chain cannot be loaded.
    pub fn with_missing_chain_policy(mut self, policy: MissingChainPolicy) -> Self {
        self.missing_chain = policy;
        self
    }

    pub fn profile(&self) -> &BacktestProfile {
        &self.profile
    }

    pub fn book(&self) -> &PositionBook {
        &self.book
    }

    /// Mutable access to the book, e.g. to close positions between days.
    pub fn book_mut(&mut self) -> &mut PositionBook {
        &mut self.book
    }

    pub fn loader(&self) -> &L {
        &self.loader
    }

    /// Consume the engine, returning the book.
    pub fn into_book(self) -> PositionBook {
        self.book
    }

    /// Find today's entries and whether any position is open.
    pub fn check_event(&self, as_of: NaiveDate) -> DayEvent {
        DayEvent {
            entry_symbols: self
                .profile
                .entry_symbols(as_of)
                .into_iter()
                .map(str::to_string)
                .collect(),
            has_open_positions: self.book.any_open(),
        }
    }

    /// Walk `days` in order.
    pub fn run(&mut self, days: &[TradingDay]) -> Result<RunSummary, EngineError> {
        info!(
            "Running {} backtest over {} trading days for {} symbols",
            self.strategy.name(),
            days.len(),
            self.profile.symbols.len()
        );

        for day in days {
            self.process_day(day)?;
        }

        let summary = self.summary();
        info!(
            "Backtest complete: {} positions opened, {} chain loads, {} days skipped",
            summary.positions_opened, summary.chain_loads, summary.days_skipped
        );
        Ok(summary)
    }

    /// Counters so far.
    pub fn summary(&self) -> RunSummary {
        RunSummary {
            open_positions: self.book.open_count(),
            ..self.stats.clone()
        }
    }

    /// Process a single trading day.
    pub fn process_day(&mut self, day: &TradingDay) -> Result<DayOutcome, EngineError> {
        if let Some(previous) = self.last_date {
            if day.as_of <= previous {
                return Err(EngineError::OutOfOrder {
                    previous,
                    next: day.as_of,
                });
            }
        }
        self.last_date = Some(day.as_of);
        self.stats.start_date.get_or_insert(day.as_of);
        self.stats.end_date = Some(day.as_of);
        self.stats.days_seen += 1;

        let event = self.check_event(day.as_of);
        if event.is_idle() {
            debug!("{}: no entries and no open positions, skipping", day.as_of);
            self.stats.days_skipped += 1;
            return Ok(DayOutcome::Idle);
        }

        debug!(
            "{}: {} entries, open positions: {}",
            day.as_of,
            event.entry_symbols.len(),
            event.has_open_positions
        );

        self.stats.chain_loads += 1;
        let chain = match self.loader.load(day) {
            Ok(chain) => chain,
            Err(source) => match self.missing_chain {
                MissingChainPolicy::Abort => {
                    return Err(EngineError::DataUnavailable {
                        date: day.as_of,
                        source,
                    })
                }
                MissingChainPolicy::SkipDay => {
                    warn!("{}: skipping day, chain unavailable: {}", day.as_of, source);
                    self.stats.days_unavailable += 1;
                    return Ok(DayOutcome::Unavailable);
                }
            },
        };
        self.stats.days_processed += 1;

        let opened = self.open_positions(&chain, &event.entry_symbols, day.as_of)?;
        Ok(DayOutcome::Processed { opened })
    }

    /// Run the entry strategy for each entering symbol.
    fn open_positions(
        &mut self,
        chain: &ChainSnapshot,
        entry_symbols: &[String],
        as_of: NaiveDate,
    ) -> Result<usize, EngineError> {
        let mut opened = 0;

        for symbol in entry_symbols {
            let windows = self.profile.windows(symbol);
            match self.strategy.select(chain, symbol, as_of, windows) {
                Ok(selection) => {
                    let position = self.book.open(symbol, as_of, selection)?;
                    info!(
                        "{}: opened {} #{} strike {} ({} contracts, underlying {})",
                        as_of,
                        symbol,
                        position.id,
                        position.strike,
                        position.contracts.len(),
                        position.underlying_price
                    );
                    opened += 1;
                }
                Err(e) if e.is_fatal() => {
                    error!("{}: entry failed: {}", as_of, e);
                    self.stats.selection_errors += 1;
                }
                Err(e) => {
                    warn!("{}: {}", as_of, e);
                    self.stats.selection_misses += 1;
                }
            }
        }

        self.stats.positions_opened += opened;
        Ok(opened)
    }
}
