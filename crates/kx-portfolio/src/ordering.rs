//! Canonical fill ordering policy.
//!
//! Applying fills in canonical order is a mandatory invariant: the same set
//! of fills must always produce the same ledger state regardless of the
//! order in which they arrived from the broker or were replayed from the
//! audit log.
//!
//! # Canonical sort key
//!
//! `(fill_timestamp, symbol, side_ord, qty)` ascending. `side_ord`: `Buy = 0`,
//! `Sell = 1` — buys precede sells on a tied `(timestamp, symbol)` so a
//! position is opened before it is reduced.

use kx_schemas::Side;

use crate::types::Fill;

fn side_ord(side: Side) -> u8 {
    match side {
        Side::Buy => 0,
        Side::Sell => 1,
    }
}

/// Sort `fills` into canonical order **in place**.
pub fn sort_fills_canonical(fills: &mut [Fill]) {
    fills.sort_by(|a, b| {
        a.fill_timestamp
            .cmp(&b.fill_timestamp)
            .then_with(|| a.symbol.cmp(&b.symbol))
            .then_with(|| side_ord(a.side).cmp(&side_ord(b.side)))
            .then_with(|| a.qty.cmp(&b.qty))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use rust_decimal_macros::dec;

    fn fill_at(ts_secs: i64, symbol: &str, side: Side, qty: i64) -> Fill {
        Fill::new(
            "ord-1",
            "acct-1",
            symbol,
            side,
            qty,
            dec!(1000),
            Decimal::ZERO,
            Decimal::ZERO,
            Utc.timestamp_opt(ts_secs, 0).unwrap(),
        )
    }

    use rust_decimal::Decimal;

    #[test]
    fn sorts_by_timestamp_then_buy_before_sell() {
        let mut fills = vec![
            fill_at(2, "AAA", Side::Sell, 5),
            fill_at(1, "AAA", Side::Sell, 5),
            fill_at(1, "AAA", Side::Buy, 5),
        ];
        sort_fills_canonical(&mut fills);
        assert_eq!(fills[0].side, Side::Buy);
        assert_eq!(fills[1].side, Side::Sell);
        assert_eq!(fills[2].fill_timestamp, Utc.timestamp_opt(2, 0).unwrap());
    }
}
