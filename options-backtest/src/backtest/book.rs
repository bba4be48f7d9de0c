//! Position book.
//!
//! Keeps open and closed positions per symbol. Every profile symbol has a
//! (possibly empty) open list and closed list for the whole run.

use std::collections::HashMap;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::data::ContractRecord;
use crate::strategy::Selection;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BookError {
    #[error("Symbol not in book: {0}")]
    UnknownSymbol(String),

    #[error("{symbol}: no open position with id {id}")]
    PositionNotFound { symbol: String, id: u64 },
}

/// Status of a position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PositionStatus {
    /// Position is open.
    Open,
    /// Position has been closed.
    Closed,
}

/// Contracts entered together for one symbol on one day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    /// Book-assigned ID, unique within the book.
    pub id: u64,
    /// Underlying symbol.
    pub symbol: String,
    /// Date position was opened.
    pub entry_date: NaiveDate,
    /// Date position was closed (if closed).
    pub exit_date: Option<NaiveDate>,
    /// Strike shared by the selected rows.
    pub strike: Decimal,
    /// Underlying price at entry.
    pub underlying_price: Decimal,
    /// Selected chain rows.
    pub contracts: Vec<ContractRecord>,
    /// Position status.
    pub status: PositionStatus,
}

impl Position {
    pub fn is_open(&self) -> bool {
        self.status == PositionStatus::Open
    }

    /// Earliest expiration among the position's rows.
    pub fn expiration(&self) -> Option<NaiveDate> {
        self.contracts.iter().map(|c| c.expiration).min()
    }
}

/// Open and closed positions for every symbol of a run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PositionBook {
    symbols: Vec<String>,
    open: HashMap<String, Vec<Position>>,
    closed: HashMap<String, Vec<Position>>,
    next_id: u64,
}

impl PositionBook {
    /// Create an empty book tracking `symbols`.
    pub fn new(symbols: &[String]) -> Self {
        Self {
            symbols: symbols.to_vec(),
            open: symbols.iter().map(|s| (s.clone(), Vec::new())).collect(),
            closed: symbols.iter().map(|s| (s.clone(), Vec::new())).collect(),
            next_id: 1,
        }
    }

    /// Symbols tracked by the book, in profile order.
    pub fn symbols(&self) -> &[String] {
        &self.symbols
    }

    /// Record a new open position from a selection.
    ///
    /// No duplicate check is made; the caller opens at most once per symbol
    /// and entry date.
    pub fn open(
        &mut self,
        symbol: &str,
        entry_date: NaiveDate,
        selection: Selection,
    ) -> Result<&Position, BookError> {
        let list = self
            .open
            .get_mut(symbol)
            .ok_or_else(|| BookError::UnknownSymbol(symbol.to_string()))?;

        let id = self.next_id;
        self.next_id += 1;

        list.push(Position {
            id,
            symbol: symbol.to_string(),
            entry_date,
            exit_date: None,
            strike: selection.strike,
            underlying_price: selection.underlying_price,
            contracts: selection.contracts,
            status: PositionStatus::Open,
        });
        Ok(&list[list.len() - 1])
    }

    /// Move an open position to the closed list.
    pub fn close(
        &mut self,
        symbol: &str,
        id: u64,
        exit_date: NaiveDate,
    ) -> Result<&Position, BookError> {
        let open = self
            .open
            .get_mut(symbol)
            .ok_or_else(|| BookError::UnknownSymbol(symbol.to_string()))?;
        let idx = open
            .iter()
            .position(|p| p.id == id)
            .ok_or_else(|| BookError::PositionNotFound {
                symbol: symbol.to_string(),
                id,
            })?;

        let mut position = open.remove(idx);
        position.status = PositionStatus::Closed;
        position.exit_date = Some(exit_date);

        // Both maps are built from the same symbol list.
        let closed = self.closed.entry(symbol.to_string()).or_default();
        closed.push(position);
        Ok(&closed[closed.len() - 1])
    }

    /// Whether `symbol` has any open position.
    pub fn has_open(&self, symbol: &str) -> bool {
        self.open.get(symbol).is_some_and(|l| !l.is_empty())
    }

    /// Whether any symbol has an open position.
    pub fn any_open(&self) -> bool {
        self.open.values().any(|l| !l.is_empty())
    }

    /// Open positions for `symbol`, oldest first.
    pub fn open_positions(&self, symbol: &str) -> &[Position] {
        self.open.get(symbol).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Closed positions for `symbol`, in close order.
    pub fn closed_positions(&self, symbol: &str) -> &[Position] {
        self.closed.get(symbol).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Total open positions across symbols.
    pub fn open_count(&self) -> usize {
        self.open.values().map(Vec::len).sum()
    }

    /// Total closed positions across symbols.
    pub fn closed_count(&self) -> usize {
        self.closed.values().map(Vec::len).sum()
    }
}
