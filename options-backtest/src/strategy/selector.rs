//! Contract selection.
//!
//! Narrows a day's chain to the rows of a single contract:
//! 1. Keep the symbol's rows
//! 2. Take the first DTE window whose lower bound is after the as-of date
//! 3. Pick the expiration strictly inside that window
//! 4. Pick the strike closest to the underlying price
//!
//! Expiration and strike ties are resolved by snapshot order, not by
//! sorting. When several expirations fall inside the window the last one
//! seen wins; when several strikes are equally close to the underlying the
//! first one seen wins. Both rules are deterministic for a given snapshot.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::data::{ChainSnapshot, ContractRecord};

use super::profile::DteWindow;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SelectionError {
    #[error("{symbol}: no DTE window starts after {as_of}")]
    NoEligibleWindow { symbol: String, as_of: NaiveDate },

    #[error("{symbol}: no option contracts with expirations inside {window}")]
    NoContractFound { symbol: String, window: DteWindow },

    #[error("{symbol} {expiration}: underlying price {other} differs from {first}")]
    InconsistentUnderlying {
        symbol: String,
        expiration: NaiveDate,
        first: Decimal,
        other: Decimal,
    },

    #[error("{symbol} {expiration}: no contracts at strike {strike}")]
    NoMatchingStrike {
        symbol: String,
        expiration: NaiveDate,
        strike: Decimal,
    },
}

impl SelectionError {
    /// Configuration or data-integrity problems, as opposed to a plain miss.
    ///
    /// A chain without a usable expiration or strike is a miss.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            Self::NoContractFound { .. } | Self::NoMatchingStrike { .. }
        )
    }
}

/// Rows chosen for one entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Selection {
    pub symbol: String,
    pub window: DteWindow,
    pub strike: Decimal,
    pub underlying_price: Decimal,
    pub contracts: Vec<ContractRecord>,
}

impl Selection {
    /// Distinct expirations across the selected rows, in row order.
    pub fn expirations(&self) -> Vec<NaiveDate> {
        let mut seen = Vec::new();
        for record in &self.contracts {
            if !seen.contains(&record.expiration) {
                seen.push(record.expiration);
            }
        }
        seen
    }
}

/// First window whose lower bound is strictly after `as_of`.
pub fn select_window(windows: &[DteWindow], as_of: NaiveDate) -> Option<(usize, DteWindow)> {
    windows
        .iter()
        .copied()
        .enumerate()
        .find(|(_, w)| w.is_eligible(as_of))
}

/// Distinct expirations in first-seen order.
pub fn distinct_expirations(rows: &[&ContractRecord]) -> Vec<NaiveDate> {
    let mut expirations = Vec::new();
    for row in rows {
        if !expirations.contains(&row.expiration) {
            expirations.push(row.expiration);
        }
    }
    expirations
}

/// Expiration strictly inside `window`; the last qualifying one wins.
pub fn pick_expiration(expirations: &[NaiveDate], window: &DteWindow) -> Option<NaiveDate> {
    expirations
        .iter()
        .rev()
        .find(|e| window.contains_strictly(**e))
        .copied()
}

/// Distinct strikes in first-seen order.
pub fn distinct_strikes(rows: &[&ContractRecord]) -> Vec<Decimal> {
    let mut strikes = Vec::new();
    for row in rows {
        if !strikes.contains(&row.strike) {
            strikes.push(row.strike);
        }
    }
    strikes
}

/// Strike closest to `price`; the first of equally close strikes wins.
pub fn atm_strike(strikes: &[Decimal], price: Decimal) -> Option<Decimal> {
    // min_by_key returns the first of several equal minima.
    strikes
        .iter()
        .copied()
        .min_by_key(|strike| (*strike - price).abs())
}

/// Rows of `symbol` expiring on `expiration`, with their shared underlying price.
fn expiration_rows<'a>(
    rows: &[&'a ContractRecord],
    symbol: &str,
    expiration: NaiveDate,
) -> Result<(Vec<&'a ContractRecord>, Decimal), SelectionError> {
    let matching: Vec<&ContractRecord> = rows
        .iter()
        .copied()
        .filter(|r| r.expiration == expiration)
        .collect();

    // Callers only pass expirations taken from `rows`.
    let first = matching.first().map(|r| r.underlying_price).unwrap_or_default();
    if let Some(other) = matching.iter().find(|r| r.underlying_price != first) {
        return Err(SelectionError::InconsistentUnderlying {
            symbol: symbol.to_string(),
            expiration,
            first,
            other: other.underlying_price,
        });
    }

    Ok((matching, first))
}

/// Expiration for `symbol` inside `window`, or `NoContractFound`.
pub(crate) fn expiration_in_window(
    rows: &[&ContractRecord],
    symbol: &str,
    window: DteWindow,
) -> Result<NaiveDate, SelectionError> {
    pick_expiration(&distinct_expirations(rows), &window).ok_or_else(|| {
        SelectionError::NoContractFound {
            symbol: symbol.to_string(),
            window,
        }
    })
}

/// Rows of `symbol` at `expiration` and `strike`.
pub(crate) fn rows_at_strike(
    rows: &[&ContractRecord],
    symbol: &str,
    expiration: NaiveDate,
    strike: Decimal,
) -> Result<Vec<ContractRecord>, SelectionError> {
    let (matching, _) = expiration_rows(rows, symbol, expiration)?;
    let contracts: Vec<ContractRecord> = matching
        .into_iter()
        .filter(|r| r.strike == strike)
        .cloned()
        .collect();

    if contracts.is_empty() {
        return Err(SelectionError::NoMatchingStrike {
            symbol: symbol.to_string(),
            expiration,
            strike,
        });
    }
    Ok(contracts)
}

/// Select the at-the-money contract for `symbol` inside `window`.
pub(crate) fn select_in_window(
    rows: &[&ContractRecord],
    symbol: &str,
    window: DteWindow,
) -> Result<Selection, SelectionError> {
    let expiration = expiration_in_window(rows, symbol, window)?;
    let (matching, underlying_price) = expiration_rows(rows, symbol, expiration)?;

    let strike = atm_strike(&distinct_strikes(&matching), underlying_price).ok_or_else(|| {
        SelectionError::NoContractFound {
            symbol: symbol.to_string(),
            window,
        }
    })?;

    let contracts = matching
        .into_iter()
        .filter(|r| r.strike == strike)
        .cloned()
        .collect();

    Ok(Selection {
        symbol: symbol.to_string(),
        window,
        strike,
        underlying_price,
        contracts,
    })
}

/// Pick the contract rows `symbol` should enter on `as_of`.
pub fn select_contracts(
    chain: &ChainSnapshot,
    symbol: &str,
    as_of: NaiveDate,
    windows: &[DteWindow],
) -> Result<Selection, SelectionError> {
    let rows = chain.rows_for(symbol);
    let (_, window) = select_window(windows, as_of).ok_or_else(|| {
        SelectionError::NoEligibleWindow {
            symbol: symbol.to_string(),
            as_of,
        }
    })?;
    select_in_window(&rows, symbol, window)
}
