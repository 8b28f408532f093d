//! Mark-to-market metrics derived from positions (feeds `PortfolioSnapshot`).

use std::collections::BTreeMap;

use rust_decimal::Decimal;

use crate::types::PositionState;

/// Canonical mark map type (symbol -> last known price).
pub type MarkMap = BTreeMap<String, Decimal>;

/// Total unrealized P&L across all open positions at the given marks.
/// Symbols with no mark available are treated as flat (contribute 0).
pub fn compute_unrealized_pnl(positions: &BTreeMap<String, PositionState>, marks: &MarkMap) -> Decimal {
    positions
        .values()
        .map(|pos| {
            let mark = marks.get(&pos.symbol).copied().unwrap_or(pos.avg_price);
            pos.unrealized_pnl(mark)
        })
        .sum()
}

/// `equity = cash + Σ(qty * mark)`.
pub fn compute_equity(
    cash: Decimal,
    positions: &BTreeMap<String, PositionState>,
    marks: &MarkMap,
) -> Decimal {
    let market_value: Decimal = positions
        .values()
        .map(|pos| {
            let mark = marks.get(&pos.symbol).copied().unwrap_or(pos.avg_price);
            pos.market_value(mark)
        })
        .sum();
    cash + market_value
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PositionState;
    use rust_decimal_macros::dec;

    #[test]
    fn equity_is_cash_plus_market_value() {
        let mut positions = BTreeMap::new();
        positions.insert(
            "005930".to_string(),
            PositionState {
                symbol: "005930".to_string(),
                qty: 10,
                avg_price: dec!(70000),
                realized_pnl: Decimal::ZERO,
            },
        );
        let mut marks = MarkMap::new();
        marks.insert("005930".to_string(), dec!(72000));

        assert_eq!(
            compute_equity(dec!(1_000_000), &positions, &marks),
            dec!(1_720_000)
        );
        assert_eq!(compute_unrealized_pnl(&positions, &marks), dec!(20000));
    }

    #[test]
    fn missing_mark_falls_back_to_avg_price() {
        let mut positions = BTreeMap::new();
        positions.insert(
            "005930".to_string(),
            PositionState {
                symbol: "005930".to_string(),
                qty: 10,
                avg_price: dec!(70000),
                realized_pnl: Decimal::ZERO,
            },
        );
        assert_eq!(compute_unrealized_pnl(&positions, &MarkMap::new()), Decimal::ZERO);
    }
}
