//! Backtest execution for options entry strategies.
//!
//! This module provides the day-by-day walk of a backtest:
//! - Event scheduling (which days need a chain at all)
//! - Entry execution through the profile's strategy
//! - Position bookkeeping (open and closed positions per symbol)

pub mod book;
pub mod engine;

pub use book::{BookError, Position, PositionBook, PositionStatus};
pub use engine::{BacktestEngine, DayEvent, DayOutcome, EngineError, MissingChainPolicy, RunSummary};
