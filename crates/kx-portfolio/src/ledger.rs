//! Fill applier and ledger façade (C8/C9).
//!
//! # Purpose
//! [`accounting`](crate::accounting) contains the raw average-cost
//! arithmetic. This module wraps it behind a typed, append-only [`Ledger`]
//! façade that:
//!
//! - Enforces invariants on every append (I2: positive price/qty; non-empty
//!   symbol).
//! - Deduplicates fills by natural key (I5) before any mutation.
//! - Exposes only the minimal write surface (`append_fill`, `append_cash`).
//! - Provides read-only snapshot views of cash, positions, and realized P&L.
//!
//! # Determinism
//! `Ledger` is deterministic and pure — no IO, no time source beyond the
//! timestamps callers supply on each fill. Two `Ledger` instances fed the
//! same sequence of entries always reach identical state.

use std::collections::BTreeMap;

use rust_decimal::Decimal;

use kx_schemas::Side;

use crate::accounting::{apply_buy, apply_sell};
use crate::metrics::MarkMap;
use crate::types::{Fill, LedgerEntry, LedgerEventType, PortfolioState, PositionState};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// All invariant violations that `Ledger` can surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// `Fill.qty` must be strictly positive (I2).
    NonPositiveQty { qty: i64 },
    /// `Fill.price` must be strictly positive (I2).
    NonPositivePrice { price: Decimal },
    /// `Fill.fee`/`Fill.tax` must be non-negative.
    NegativeFeeOrTax,
    /// `Fill.symbol` (or cash entry reason) must be non-empty.
    EmptySymbol,
}

impl std::fmt::Display for LedgerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NonPositiveQty { qty } => {
                write!(f, "ledger invariant: qty must be > 0, got {qty}")
            }
            Self::NonPositivePrice { price } => {
                write!(f, "ledger invariant: price must be > 0, got {price}")
            }
            Self::NegativeFeeOrTax => write!(f, "ledger invariant: fee/tax must be >= 0"),
            Self::EmptySymbol => write!(f, "ledger invariant: symbol must not be empty"),
        }
    }
}

impl std::error::Error for LedgerError {}

// ---------------------------------------------------------------------------
// Fill application result
// ---------------------------------------------------------------------------

/// Result of [`Ledger::append_fill`], matching the `apply(fill)` contract in
/// §4.3: `{updatedPosition, realizedPnlDelta, isDuplicate}`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FillApplyResult {
    pub position: PositionState,
    pub realized_pnl_delta: Decimal,
    pub is_duplicate: bool,
    pub fee: Decimal,
    pub tax: Decimal,
}

// ---------------------------------------------------------------------------
// Snapshot (read-only view)
// ---------------------------------------------------------------------------

/// A point-in-time read-only view of the ledger's derived state.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LedgerSnapshot {
    pub cash: Decimal,
    pub realized_pnl: Decimal,
    pub positions: BTreeMap<String, PositionState>,
    pub entry_count: usize,
}

impl LedgerSnapshot {
    pub fn qty(&self, symbol: &str) -> i64 {
        self.positions.get(symbol).map(|p| p.qty).unwrap_or(0)
    }

    pub fn is_flat(&self) -> bool {
        self.positions.values().all(PositionState::is_flat)
    }
}

// ---------------------------------------------------------------------------
// Ledger
// ---------------------------------------------------------------------------

/// Append-only ledger façade with invariant enforcement and fill dedup.
///
/// Internally delegates the average-cost arithmetic to
/// [`accounting`](crate::accounting). `Ledger` owns the append boundary, the
/// dedup check (I5), and the derived portfolio state for one account.
#[derive(Clone, Debug)]
pub struct Ledger {
    state: PortfolioState,
}

impl Ledger {
    pub fn new(account_id: impl Into<String>, initial_cash: Decimal) -> Self {
        Self {
            state: PortfolioState::new(account_id, initial_cash),
        }
    }

    // -----------------------------------------------------------------------
    // Write surface
    // -----------------------------------------------------------------------

    /// Apply a fill per the §4.3 algorithm: dedup, average-cost apply, cash
    /// movement, and ledger rows for FILL/FEE/TAX.
    ///
    /// Returns [`LedgerError`] if the fill violates an invariant; the ledger
    /// is not mutated on error.
    pub fn append_fill(&mut self, fill: Fill) -> Result<FillApplyResult, LedgerError> {
        Self::validate_fill(&fill)?;

        let key = fill.natural_key();
        if self.state.has_seen_fill(&key) {
            let position = self
                .state
                .positions
                .get(&fill.symbol)
                .cloned()
                .unwrap_or_else(|| PositionState::flat(fill.symbol.clone()));
            return Ok(FillApplyResult {
                position,
                realized_pnl_delta: Decimal::ZERO,
                is_duplicate: true,
                fee: Decimal::ZERO,
                tax: Decimal::ZERO,
            });
        }
        self.state.record_seen_fill(key);

        let pos = self
            .state
            .positions
            .entry(fill.symbol.clone())
            .or_insert_with(|| PositionState::flat(fill.symbol.clone()));
        let prev_realized = pos.realized_pnl;

        match fill.side {
            Side::Buy => apply_buy(pos, fill.price, fill.qty),
            Side::Sell => apply_sell(pos, fill.price, fill.qty),
        }

        let realized_pnl_delta = pos.realized_pnl - prev_realized;
        let position = pos.clone();

        match fill.side {
            Side::Buy => {
                self.state.cash -= fill.price * Decimal::from(fill.qty);
            }
            Side::Sell => {
                self.state.cash += fill.price * Decimal::from(fill.qty);
            }
        }
        self.state.cash -= fill.fee;
        self.state.cash -= fill.tax;

        if realized_pnl_delta != Decimal::ZERO {
            self.state.ledger.push(LedgerEntry {
                symbol: fill.symbol.clone(),
                event_type: LedgerEventType::Fill,
                amount: realized_pnl_delta,
                ref_id: fill.order_id.clone(),
                event_timestamp: fill.fill_timestamp,
            });
        }
        if fill.fee > Decimal::ZERO {
            self.state.ledger.push(LedgerEntry {
                symbol: fill.symbol.clone(),
                event_type: LedgerEventType::Fee,
                amount: -fill.fee,
                ref_id: fill.order_id.clone(),
                event_timestamp: fill.fill_timestamp,
            });
        }
        if fill.tax > Decimal::ZERO {
            self.state.ledger.push(LedgerEntry {
                symbol: fill.symbol.clone(),
                event_type: LedgerEventType::Tax,
                amount: -fill.tax,
                ref_id: fill.order_id.clone(),
                event_timestamp: fill.fill_timestamp,
            });
        }

        Ok(FillApplyResult {
            position,
            realized_pnl_delta,
            is_duplicate: false,
            fee: fill.fee,
            tax: fill.tax,
        })
    }

    /// Append a cash adjustment entry (positive = credit, negative = debit).
    pub fn append_cash(
        &mut self,
        amount: Decimal,
        reason: impl Into<String>,
        symbol: impl Into<String>,
        event_timestamp: chrono::DateTime<chrono::Utc>,
    ) -> Result<(), LedgerError> {
        let reason = reason.into();
        if reason.trim().is_empty() {
            return Err(LedgerError::EmptySymbol);
        }
        let symbol = symbol.into();
        self.state.cash += amount;
        self.state.ledger.push(LedgerEntry {
            symbol: symbol.clone(),
            event_type: LedgerEventType::Adjust,
            amount,
            ref_id: reason.clone(),
            event_timestamp,
        });
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Read surface
    // -----------------------------------------------------------------------

    pub fn snapshot(&self) -> LedgerSnapshot {
        LedgerSnapshot {
            cash: self.state.cash,
            realized_pnl: self.state.realized_pnl(),
            positions: self.state.positions.clone(),
            entry_count: self.state.ledger.len(),
        }
    }

    pub fn cash(&self) -> Decimal {
        self.state.cash
    }

    pub fn realized_pnl(&self) -> Decimal {
        self.state.realized_pnl()
    }

    pub fn qty(&self, symbol: &str) -> i64 {
        self.state.positions.get(symbol).map(|p| p.qty).unwrap_or(0)
    }

    pub fn equity(&self, marks: &MarkMap) -> Decimal {
        crate::metrics::compute_equity(self.state.cash, &self.state.positions, marks)
    }

    pub fn unrealized_pnl(&self, marks: &MarkMap) -> Decimal {
        crate::metrics::compute_unrealized_pnl(&self.state.positions, marks)
    }

    /// Build a point-in-time [`crate::types::PortfolioSnapshot`].
    pub fn build_snapshot(
        &self,
        marks: &MarkMap,
        timestamp: chrono::DateTime<chrono::Utc>,
    ) -> crate::types::PortfolioSnapshot {
        crate::types::PortfolioSnapshot {
            account_id: self.state.account_id.clone(),
            cash: self.state.cash,
            total_value: self.equity(marks),
            realized_pnl: self.realized_pnl(),
            unrealized_pnl: self.unrealized_pnl(marks),
            timestamp,
        }
    }

    fn validate_fill(fill: &Fill) -> Result<(), LedgerError> {
        if fill.symbol.trim().is_empty() {
            return Err(LedgerError::EmptySymbol);
        }
        if fill.qty <= 0 {
            return Err(LedgerError::NonPositiveQty { qty: fill.qty });
        }
        if fill.price <= Decimal::ZERO {
            return Err(LedgerError::NonPositivePrice { price: fill.price });
        }
        if fill.fee < Decimal::ZERO || fill.tax < Decimal::ZERO {
            return Err(LedgerError::NegativeFeeOrTax);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn fill(
        order_id: &str,
        symbol: &str,
        side: Side,
        qty: i64,
        price: Decimal,
        fee: Decimal,
        tax: Decimal,
    ) -> Fill {
        Fill::new(order_id, "acct-1", symbol, side, qty, price, fee, tax, Utc::now())
    }

    #[test]
    fn buy_then_sell_round_trip_realizes_pnl() {
        let mut ledger = Ledger::new("acct-1", dec!(10_000_000));
        ledger
            .append_fill(fill(
                "ord-1",
                "005930",
                Side::Buy,
                10,
                dec!(70000),
                dec!(150),
                Decimal::ZERO,
            ))
            .unwrap();
        let result = ledger
            .append_fill(fill(
                "ord-2",
                "005930",
                Side::Sell,
                10,
                dec!(72000),
                dec!(150),
                dec!(165),
            ))
            .unwrap();

        assert_eq!(result.realized_pnl_delta, dec!(20000));
        assert!(!result.is_duplicate);
        let snap = ledger.snapshot();
        assert!(snap.is_flat());
        assert_eq!(snap.realized_pnl, dec!(20000));
    }

    #[test]
    fn duplicate_fill_by_natural_key_is_a_noop() {
        let mut ledger = Ledger::new("acct-1", dec!(1_000_000));
        let f = fill(
            "ord-1",
            "005930",
            Side::Buy,
            10,
            dec!(70000),
            dec!(150),
            Decimal::ZERO,
        );
        ledger.append_fill(f.clone()).unwrap();
        let before = ledger.snapshot();

        let dup = ledger.append_fill(f).unwrap();
        assert!(dup.is_duplicate);
        assert_eq!(dup.realized_pnl_delta, Decimal::ZERO);
        assert_eq!(ledger.snapshot(), before);
    }

    #[test]
    fn rejects_non_positive_price() {
        let mut ledger = Ledger::new("acct-1", dec!(1_000_000));
        let f = fill(
            "ord-1",
            "005930",
            Side::Buy,
            10,
            Decimal::ZERO,
            Decimal::ZERO,
            Decimal::ZERO,
        );
        assert!(matches!(
            ledger.append_fill(f),
            Err(LedgerError::NonPositivePrice { .. })
        ));
    }

    #[test]
    fn fee_and_tax_reduce_cash_and_append_ledger_rows() {
        let mut ledger = Ledger::new("acct-1", dec!(1_000_000));
        ledger
            .append_fill(fill(
                "ord-1",
                "005930",
                Side::Sell,
                10,
                dec!(70000),
                dec!(150),
                dec!(161),
            ))
            .unwrap();

        assert_eq!(ledger.cash(), dec!(1_000_000) + dec!(700000) - dec!(150) - dec!(161));
        let snap = ledger.snapshot();
        assert_eq!(snap.entry_count, 2); // FEE + TAX, no FILL row (delta == 0, opening a short)
    }

    #[test]
    fn short_flip_realizes_and_resets_avg_price() {
        let mut ledger = Ledger::new("acct-1", dec!(10_000_000));
        ledger
            .append_fill(fill(
                "ord-1",
                "005930",
                Side::Sell,
                10,
                dec!(72000),
                Decimal::ZERO,
                dec!(165),
            ))
            .unwrap();
        let result = ledger
            .append_fill(fill(
                "ord-2",
                "005930",
                Side::Buy,
                15,
                dec!(70000),
                Decimal::ZERO,
                Decimal::ZERO,
            ))
            .unwrap();

        assert_eq!(result.realized_pnl_delta, dec!(20000));
        assert_eq!(ledger.qty("005930"), 5);
    }
}
