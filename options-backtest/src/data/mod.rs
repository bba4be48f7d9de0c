pub mod calendar;
pub mod loader;
pub mod types;

pub use calendar::{CalendarError, CalendarProvider, FileCalendar, StaticCalendar, DEFAULT_MAX_DAYS};
pub use loader::{ChainColumns, ChainFormat, ChainLoader, LoaderError, SnapshotLoader};
pub use types::{
    parse_expiration, ChainLocator, ChainSnapshot, ContractRecord, LocatorError, TradingDay,
    EXPIRATION_FORMAT,
};
