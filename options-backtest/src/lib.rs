pub mod backtest;
pub mod config;
pub mod data;
pub mod strategy;

// Re-export commonly used types
pub use backtest::{
    BacktestEngine, DayEvent, EngineError, MissingChainPolicy, Position, PositionBook, RunSummary,
};
pub use config::{BacktestFile, ConfigError, RunConfig};
pub use data::{
    CalendarProvider, ChainFormat, ChainLoader, ChainSnapshot, ContractRecord, FileCalendar,
    SnapshotLoader, TradingDay,
};
pub use strategy::{
    BacktestProfile, DteWindow, EntryStrategy, Selection, SelectionError, StrategyKind,
};
