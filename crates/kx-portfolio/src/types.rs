use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use kx_schemas::Side;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A single executed fill (the accounting atom).
///
/// `qty` is always positive; `side` carries direction. `fill_timestamp` plus
/// `order_id`/`price`/`qty` form the natural key used for dedup (I5).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Fill {
    pub order_id: String,
    pub account_id: String,
    pub symbol: String,
    pub side: Side,
    pub qty: i64,
    pub price: Decimal,
    pub fee: Decimal,
    pub tax: Decimal,
    pub fill_timestamp: DateTime<Utc>,
}

impl Fill {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        order_id: impl Into<String>,
        account_id: impl Into<String>,
        symbol: impl Into<String>,
        side: Side,
        qty: i64,
        price: Decimal,
        fee: Decimal,
        tax: Decimal,
        fill_timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            order_id: order_id.into(),
            account_id: account_id.into(),
            symbol: symbol.into(),
            side,
            qty,
            price,
            fee,
            tax,
            fill_timestamp,
        }
    }

    /// Natural dedup key per I5: `(orderId, fillTimestamp, fillPrice, fillQty)`.
    pub fn natural_key(&self) -> (String, DateTime<Utc>, Decimal, i64) {
        (
            self.order_id.clone(),
            self.fill_timestamp,
            self.price,
            self.qty,
        )
    }
}

/// PnlLedger event kind: the append-only audit trail backing realized P&L.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum LedgerEventType {
    Fill,
    Fee,
    Tax,
    Adjust,
}

/// A single append-only ledger row.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LedgerEntry {
    pub symbol: String,
    pub event_type: LedgerEventType,
    pub amount: Decimal,
    pub ref_id: String,
    pub event_timestamp: DateTime<Utc>,
}

/// Net position in a single symbol, average-cost accounted.
///
/// I1: `qty == 0 ⇔ avg_price == 0`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionState {
    pub symbol: String,
    pub qty: i64,
    pub avg_price: Decimal,
    pub realized_pnl: Decimal,
}

impl PositionState {
    pub fn flat(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            qty: 0,
            avg_price: Decimal::ZERO,
            realized_pnl: Decimal::ZERO,
        }
    }

    pub fn is_flat(&self) -> bool {
        self.qty == 0
    }

    /// Unrealized P&L at mark `c`: `Q>0: (c-A)*Q; Q<0: (A-c)*|Q|; Q==0: 0`.
    pub fn unrealized_pnl(&self, mark: Decimal) -> Decimal {
        if self.qty > 0 {
            (mark - self.avg_price) * Decimal::from(self.qty)
        } else if self.qty < 0 {
            (self.avg_price - mark) * Decimal::from(-self.qty)
        } else {
            Decimal::ZERO
        }
    }

    /// Market value of the position at mark `c`: `qty * c`.
    pub fn market_value(&self, mark: Decimal) -> Decimal {
        Decimal::from(self.qty) * mark
    }
}

/// The account-level portfolio state derived from a ledger stream.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PortfolioState {
    pub account_id: String,
    pub initial_cash: Decimal,
    pub cash: Decimal,
    pub ledger: Vec<LedgerEntry>,
    pub positions: BTreeMap<String, PositionState>,
    seen_fill_keys: Vec<(String, DateTime<Utc>, Decimal, i64)>,
}

impl PortfolioState {
    pub fn new(account_id: impl Into<String>, initial_cash: Decimal) -> Self {
        Self {
            account_id: account_id.into(),
            initial_cash,
            cash: initial_cash,
            ledger: Vec::new(),
            positions: BTreeMap::new(),
            seen_fill_keys: Vec::new(),
        }
    }

    pub fn realized_pnl(&self) -> Decimal {
        self.positions.values().map(|p| p.realized_pnl).sum()
    }

    pub fn has_seen_fill(&self, key: &(String, DateTime<Utc>, Decimal, i64)) -> bool {
        self.seen_fill_keys.iter().any(|k| k == key)
    }

    pub(crate) fn record_seen_fill(&mut self, key: (String, DateTime<Utc>, Decimal, i64)) {
        self.seen_fill_keys.push(key);
    }
}

/// Point-in-time account snapshot.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortfolioSnapshot {
    pub account_id: String,
    pub cash: Decimal,
    pub total_value: Decimal,
    pub realized_pnl: Decimal,
    pub unrealized_pnl: Decimal,
    pub timestamp: DateTime<Utc>,
}
