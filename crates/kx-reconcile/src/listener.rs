//! Fill Reconciliation Listener (C11): validates incoming broker fill
//! messages, matches them to a known order, prices fee/tax, and hands the
//! result to the portfolio ledger.

use std::sync::Arc;

use kx_execution::{OrderRepository, StoreError};
use kx_fees::FeeCalculator;
use kx_portfolio::{Fill, FillApplyResult, Ledger, LedgerError};
use chrono::{DateTime, Utc};

use crate::types::{validate, RawFill, ValidationError};

#[derive(Debug)]
pub enum ReconcileError {
    Invalid(ValidationError),
    UnknownBrokerOrder { broker_order_no: String },
    SymbolMismatch { expected: String, got: String },
    Store(StoreError),
    Ledger(LedgerError),
}

impl std::fmt::Display for ReconcileError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Invalid(e) => write!(f, "{e}"),
            Self::UnknownBrokerOrder { broker_order_no } => {
                write!(f, "no local order for broker order number '{broker_order_no}'")
            }
            Self::SymbolMismatch { expected, got } => {
                write!(f, "symbol mismatch: order has '{expected}', fill has '{got}'")
            }
            Self::Store(e) => write!(f, "{e}"),
            Self::Ledger(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for ReconcileError {}

pub struct FillReconciler {
    orders: Arc<dyn OrderRepository>,
    fees: Arc<FeeCalculator>,
}

impl FillReconciler {
    pub fn new(orders: Arc<dyn OrderRepository>, fees: Arc<FeeCalculator>) -> Self {
        Self { orders, fees }
    }

    /// Processes one raw broker fill message against the ledger for its
    /// account. Callers are expected to route `raw` to the `Ledger` owning
    /// the matched order's `account_id` (account routing is the runtime's
    /// concern, not this crate's).
    pub async fn process(&self, raw: &RawFill, ledger: &mut Ledger, now: DateTime<Utc>) -> Result<FillApplyResult, ReconcileError> {
        validate(raw, now).map_err(ReconcileError::Invalid)?;

        let order = self
            .orders
            .find_by_broker_order_no(&raw.broker_order_no)
            .await
            .map_err(ReconcileError::Store)?
            .ok_or_else(|| ReconcileError::UnknownBrokerOrder {
                broker_order_no: raw.broker_order_no.clone(),
            })?;

        if order.symbol != raw.symbol {
            return Err(ReconcileError::SymbolMismatch {
                expected: order.symbol.clone(),
                got: raw.symbol.clone(),
            });
        }

        let fee = self.fees.calculate_fee(raw.price, raw.qty);
        let tax = self.fees.calculate_tax(&raw.symbol, raw.price, raw.qty, raw.side);

        let fill = Fill::new(
            order.order_id.as_str().to_string(),
            order.account_id.clone(),
            raw.symbol.clone(),
            raw.side,
            raw.qty,
            raw.price,
            fee,
            tax,
            raw.fill_timestamp,
        );

        ledger.append_fill(fill).map_err(ReconcileError::Ledger)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use kx_execution::{Order, OrderType};
    use kx_fees::CommissionSchedule;
    use kx_fees::{DefaultTaxRuleSet, PrefixSymbolClassifier};
    use kx_schemas::{Id, Side};
    use rust_decimal_macros::dec;
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeOrders {
        by_broker_no: Mutex<BTreeMap<String, Order>>,
    }

    #[async_trait]
    impl OrderRepository for FakeOrders {
        async fn find_by_idempotency_key(&self, _key: &str) -> Result<Option<Order>, StoreError> {
            Ok(None)
        }
        async fn find_by_id(&self, _id: &Id) -> Result<Option<Order>, StoreError> {
            Ok(None)
        }
        async fn find_by_broker_order_no(&self, broker_order_no: &str) -> Result<Option<Order>, StoreError> {
            Ok(self.by_broker_no.lock().unwrap().get(broker_order_no).cloned())
        }
        async fn persist_new_with_risk_state(
            &self,
            _order: &Order,
            _risk_state: &kx_risk::RiskState,
            _expected_version: i64,
        ) -> Result<bool, StoreError> {
            Ok(true)
        }
        async fn save_risk_state(&self, _risk_state: &kx_risk::RiskState, _expected_version: i64) -> Result<bool, StoreError> {
            Ok(true)
        }
        async fn record_transition(&self, _order: &Order, _event_type: &str) -> Result<(), StoreError> {
            Ok(())
        }
    }

    fn test_order(account_id: &str, symbol: &str, broker_order_no: &str, now: DateTime<Utc>) -> Order {
        let mut order = Order::new(
            Id::new(now),
            account_id,
            symbol,
            Side::Buy,
            OrderType::Limit,
            10,
            dec!(70000),
            None,
            now,
        )
        .unwrap();
        order.broker_order_no = Some(broker_order_no.to_string());
        order
    }

    fn test_fees() -> Arc<FeeCalculator> {
        Arc::new(FeeCalculator::new(
            CommissionSchedule::sane_default(),
            Box::new(DefaultTaxRuleSet),
            Box::new(PrefixSymbolClassifier::default()),
        ))
    }

    #[tokio::test]
    async fn matched_fill_moves_cash_and_position() {
        let now = Utc::now();
        let order = test_order("acct-1", "005930", "BRK-1", now);
        let orders = Arc::new(FakeOrders::default());
        orders.by_broker_no.lock().unwrap().insert("BRK-1".to_string(), order);

        let reconciler = FillReconciler::new(orders, test_fees());
        let mut ledger = Ledger::new("acct-1".to_string(), dec!(1000000));

        let raw = RawFill {
            broker_order_no: "BRK-1".to_string(),
            symbol: "005930".to_string(),
            side: Side::Buy,
            qty: 10,
            price: dec!(70000),
            fill_timestamp: now,
        };

        let result = reconciler.process(&raw, &mut ledger, now).await.unwrap();
        assert_eq!(result.position.qty, 10);
        assert!(!result.is_duplicate);
    }

    #[tokio::test]
    async fn unknown_broker_order_is_rejected() {
        let now = Utc::now();
        let orders = Arc::new(FakeOrders::default());
        let reconciler = FillReconciler::new(orders, test_fees());
        let mut ledger = Ledger::new("acct-1".to_string(), dec!(1000000));

        let raw = RawFill {
            broker_order_no: "MISSING".to_string(),
            symbol: "005930".to_string(),
            side: Side::Buy,
            qty: 10,
            price: dec!(70000),
            fill_timestamp: now,
        };

        let err = reconciler.process(&raw, &mut ledger, now).await.unwrap_err();
        assert!(matches!(err, ReconcileError::UnknownBrokerOrder { .. }));
    }

    #[tokio::test]
    async fn symbol_mismatch_is_rejected() {
        let now = Utc::now();
        let order = test_order("acct-1", "005930", "BRK-2", now);
        let orders = Arc::new(FakeOrders::default());
        orders.by_broker_no.lock().unwrap().insert("BRK-2".to_string(), order);

        let reconciler = FillReconciler::new(orders, test_fees());
        let mut ledger = Ledger::new("acct-1".to_string(), dec!(1000000));

        let raw = RawFill {
            broker_order_no: "BRK-2".to_string(),
            symbol: "000660".to_string(),
            side: Side::Buy,
            qty: 10,
            price: dec!(70000),
            fill_timestamp: now,
        };

        let err = reconciler.process(&raw, &mut ledger, now).await.unwrap_err();
        assert!(matches!(err, ReconcileError::SymbolMismatch { .. }));
    }

    #[tokio::test]
    async fn out_of_range_price_is_rejected_before_lookup() {
        let now = Utc::now();
        let orders = Arc::new(FakeOrders::default());
        let reconciler = FillReconciler::new(orders, test_fees());
        let mut ledger = Ledger::new("acct-1".to_string(), dec!(1000000));

        let raw = RawFill {
            broker_order_no: "BRK-3".to_string(),
            symbol: "005930".to_string(),
            side: Side::Buy,
            qty: 10,
            price: dec!(50),
            fill_timestamp: now,
        };

        let err = reconciler.process(&raw, &mut ledger, now).await.unwrap_err();
        assert!(matches!(err, ReconcileError::Invalid(ValidationError::PriceOutOfRange)));
    }
}
