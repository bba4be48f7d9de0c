//! Entry strategies.
//!
//! A strategy turns one symbol's slice of a day's chain into the contract
//! rows to open. The profile's `strategy` tag chooses the implementation;
//! tags outside [`StrategyKind`] are rejected when the profile is parsed.

pub mod profile;
pub mod selector;

pub use profile::{BacktestProfile, DteWindow, ProfileError};
pub use selector::{
    atm_strike, distinct_expirations, distinct_strikes, pick_expiration, select_contracts,
    select_window, Selection, SelectionError,
};

use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::data::ChainSnapshot;

/// Known entry algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrategyKind {
    /// Single at-the-money expiration from the next eligible window.
    Earnings,
    /// Same strike in two consecutive windows (near and far leg).
    Calendar,
}

impl StrategyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Earnings => "earnings",
            Self::Calendar => "calendar",
        }
    }

    /// Strategy implementation for this tag.
    pub fn build(&self) -> Box<dyn EntryStrategy> {
        match self {
            Self::Earnings => Box::new(EarningsEntry),
            Self::Calendar => Box::new(CalendarEntry),
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Chooses the contracts a symbol enters on a given day.
pub trait EntryStrategy {
    fn name(&self) -> &'static str;

    fn select(
        &self,
        chain: &ChainSnapshot,
        symbol: &str,
        as_of: NaiveDate,
        windows: &[DteWindow],
    ) -> Result<Selection, SelectionError>;
}

/// Earnings entry: the ATM contract of the next eligible expiration window.
#[derive(Debug, Clone, Copy, Default)]
pub struct EarningsEntry;

impl EntryStrategy for EarningsEntry {
    fn name(&self) -> &'static str {
        "earnings"
    }

    fn select(
        &self,
        chain: &ChainSnapshot,
        symbol: &str,
        as_of: NaiveDate,
        windows: &[DteWindow],
    ) -> Result<Selection, SelectionError> {
        select_contracts(chain, symbol, as_of, windows)
    }
}

/// Calendar entry.
///
/// The near leg is the earnings selection. The far leg uses the window
/// listed right after the near one and the near leg's strike, so both legs
/// share a strike but not an expiration.
#[derive(Debug, Clone, Copy, Default)]
pub struct CalendarEntry;

impl EntryStrategy for CalendarEntry {
    fn name(&self) -> &'static str {
        "calendar"
    }

    fn select(
        &self,
        chain: &ChainSnapshot,
        symbol: &str,
        as_of: NaiveDate,
        windows: &[DteWindow],
    ) -> Result<Selection, SelectionError> {
        let rows = chain.rows_for(symbol);
        let no_window = || SelectionError::NoEligibleWindow {
            symbol: symbol.to_string(),
            as_of,
        };

        let (idx, near_window) = select_window(windows, as_of).ok_or_else(no_window)?;
        let far_window = windows.get(idx + 1).copied().ok_or_else(no_window)?;

        let mut selection = selector::select_in_window(&rows, symbol, near_window)?;
        let far_expiration = selector::expiration_in_window(&rows, symbol, far_window)?;
        let far_leg = selector::rows_at_strike(&rows, symbol, far_expiration, selection.strike)?;

        selection.contracts.extend(far_leg);
        Ok(selection)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::ContractRecord;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn row(expiration: NaiveDate, strike: Decimal) -> ContractRecord {
        ContractRecord::new("BAC", expiration, strike, dec!(30.40))
    }

    fn windows() -> Vec<DteWindow> {
        vec![
            DteWindow::new(date(2016, 1, 1), date(2016, 2, 1)),
            DteWindow::new(date(2016, 3, 1), date(2016, 4, 1)),
        ]
    }

    #[test]
    fn test_parse_strategy_tags() {
        #[derive(Deserialize)]
        struct Tag {
            strategy: StrategyKind,
        }

        let tag: Tag = toml::from_str(r#"strategy = "calendar""#).unwrap();
        assert_eq!(tag.strategy, StrategyKind::Calendar);
        assert!(toml::from_str::<Tag>(r#"strategy = "Earnings""#).is_err());
        assert!(toml::from_str::<Tag>(r#"strategy = "butterfly""#).is_err());
    }

    #[test]
    fn test_build_dispatches_by_tag() {
        assert_eq!(StrategyKind::Earnings.build().name(), "earnings");
        assert_eq!(StrategyKind::Calendar.build().name(), "calendar");
        assert_eq!(StrategyKind::Calendar.to_string(), "calendar");
    }

    #[test]
    fn test_earnings_entry_matches_selector() {
        let chain = ChainSnapshot::new(
            date(2015, 12, 1),
            vec![row(date(2016, 1, 15), dec!(30)), row(date(2016, 1, 15), dec!(32))],
        );
        let via_strategy = EarningsEntry
            .select(&chain, "BAC", date(2015, 12, 1), &windows())
            .unwrap();
        let direct = select_contracts(&chain, "BAC", date(2015, 12, 1), &windows()).unwrap();
        assert_eq!(via_strategy, direct);
    }

    #[test]
    fn test_calendar_entry_pairs_near_and_far_legs() {
        let chain = ChainSnapshot::new(
            date(2015, 12, 1),
            vec![
                row(date(2016, 1, 15), dec!(28)),
                row(date(2016, 1, 15), dec!(30)),
                row(date(2016, 3, 18), dec!(30)),
                row(date(2016, 3, 18), dec!(32)),
            ],
        );

        let selection = CalendarEntry
            .select(&chain, "BAC", date(2015, 12, 1), &windows())
            .unwrap();

        assert_eq!(selection.strike, dec!(30));
        assert_eq!(selection.window, windows()[0]);
        assert_eq!(selection.expirations(), vec![date(2016, 1, 15), date(2016, 3, 18)]);
        assert!(selection.contracts.iter().all(|c| c.strike == dec!(30)));
    }

    #[test]
    fn test_calendar_entry_needs_a_following_window() {
        let chain = ChainSnapshot::new(date(2016, 2, 15), vec![row(date(2016, 3, 18), dec!(30))]);
        let err = CalendarEntry
            .select(&chain, "BAC", date(2016, 2, 15), &windows())
            .unwrap_err();
        assert!(matches!(err, SelectionError::NoEligibleWindow { .. }));
    }

    #[test]
    fn test_calendar_entry_far_leg_must_share_strike() {
        let chain = ChainSnapshot::new(
            date(2015, 12, 1),
            vec![row(date(2016, 1, 15), dec!(30)), row(date(2016, 3, 18), dec!(31))],
        );
        let err = CalendarEntry
            .select(&chain, "BAC", date(2015, 12, 1), &windows())
            .unwrap_err();
        assert_eq!(
            err,
            SelectionError::NoMatchingStrike {
                symbol: "BAC".to_string(),
                expiration: date(2016, 3, 18),
                strike: dec!(30),
            }
        );
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_calendar_entry_without_far_expiration() {
        let chain = ChainSnapshot::new(date(2015, 12, 1), vec![row(date(2016, 1, 15), dec!(30))]);
        let err = CalendarEntry
            .select(&chain, "BAC", date(2015, 12, 1), &windows())
            .unwrap_err();
        assert!(matches!(err, SelectionError::NoContractFound { window, .. } if window == windows()[1]));
    }
}
