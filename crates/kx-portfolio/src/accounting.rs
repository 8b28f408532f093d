//! Average-cost position accounting (C9).
//!
//! Pure, deterministic arithmetic: no IO, no time source. `apply_buy` and
//! `apply_sell` mutate a [`PositionState`] in place following the weighted-
//! average-cost rule; callers (the ledger façade) own invariant enforcement
//! and persistence.

use kx_schemas::round_half_up;
use rust_decimal::Decimal;

use crate::types::PositionState;

const AVG_PRICE_DP: u32 = 4;

/// Apply a BUY fill of `(price, qty)` to `pos`.
pub fn apply_buy(pos: &mut PositionState, price: Decimal, qty: i64) {
    let q = Decimal::from(qty);

    if pos.qty >= 0 {
        // Adding to long or opening from flat.
        let new_qty = pos.qty + qty;
        let new_avg = (Decimal::from(pos.qty) * pos.avg_price + q * price) / Decimal::from(new_qty);
        pos.avg_price = round_half_up(new_avg, AVG_PRICE_DP);
        pos.qty = new_qty;
        return;
    }

    let new_qty = pos.qty + qty;
    if new_qty <= 0 {
        // Reducing short: realize (A - p) * q.
        pos.realized_pnl += (pos.avg_price - price) * q;
        pos.qty = new_qty;
        if new_qty == 0 {
            pos.avg_price = Decimal::ZERO;
        }
    } else {
        // Flip short -> long: realize (A - p) * |Q|, reset avg to p.
        let short_qty = Decimal::from(-pos.qty);
        pos.realized_pnl += (pos.avg_price - price) * short_qty;
        pos.avg_price = price;
        pos.qty = new_qty;
    }
}

/// Apply a SELL fill of `(price, qty)` to `pos`.
pub fn apply_sell(pos: &mut PositionState, price: Decimal, qty: i64) {
    let q = Decimal::from(qty);

    if pos.qty <= 0 {
        // Adding to short or opening from flat.
        if pos.qty == 0 {
            pos.avg_price = price;
        } else {
            let abs_qty = Decimal::from(-pos.qty);
            let new_abs_qty = abs_qty + q;
            let new_avg = (abs_qty * pos.avg_price + q * price) / new_abs_qty;
            pos.avg_price = round_half_up(new_avg, AVG_PRICE_DP);
        }
        pos.qty -= qty;
        return;
    }

    let new_qty = pos.qty - qty;
    if new_qty >= 0 {
        // Reducing long: realize (p - A) * q.
        pos.realized_pnl += (price - pos.avg_price) * q;
        pos.qty = new_qty;
        if new_qty == 0 {
            pos.avg_price = Decimal::ZERO;
        }
    } else {
        // Flip long -> short: realize (p - A) * Q, reset avg to p.
        let long_qty = Decimal::from(pos.qty);
        pos.realized_pnl += (price - pos.avg_price) * long_qty;
        pos.avg_price = price;
        pos.qty = new_qty;
    }
}
