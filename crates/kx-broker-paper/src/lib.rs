//! Deterministic in-memory "paper" broker adapter.
//!
//! Design decisions (kept intentionally simple/deterministic):
//! - `broker_order_no` is exactly `client_order_id`; there is no separate
//!   broker-assigned identifier to fabricate.
//! - This broker accepts every order it is asked to place. Rejections are
//!   out of scope here; exercise `OrderManager`'s own reject paths with a
//!   broker double that returns `BrokerError` instead.
//! - No randomness, no timestamps, no background fill generation. Fills are
//!   driven externally (see `kx-reconcile`), not synthesized by this crate.

use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;
use rust_decimal::Decimal;

use kx_execution::{BrokerAck, BrokerClient, BrokerError, BrokerOrderRequest};
use kx_schemas::Side;

pub mod types;

use types::{PaperOrder, PaperOrderStatus};

/// In-memory broker double keyed by `client_order_id`.
#[derive(Default)]
pub struct PaperBroker {
    orders: Mutex<BTreeMap<String, PaperOrder>>,
}

impl PaperBroker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn order_snapshot(&self, client_order_id: &str) -> Option<PaperOrder> {
        self.orders.lock().unwrap().get(client_order_id).cloned()
    }

    pub fn list_orders(&self) -> Vec<PaperOrder> {
        self.orders.lock().unwrap().values().cloned().collect()
    }

    pub fn set_position(&self, _symbol: impl Into<String>, _qty_signed: i64) {
        // Positions live in kx-portfolio's ledger, derived from fills; this
        // broker double has no position book of its own to seed.
    }
}

#[async_trait]
impl BrokerClient for PaperBroker {
    /// Idempotent: resubmitting a `client_order_id` already on file returns
    /// the ack it was given the first time, without mutating state.
    async fn place_order(&self, req: &BrokerOrderRequest) -> Result<BrokerAck, BrokerError> {
        let mut orders = self.orders.lock().unwrap();

        if orders.contains_key(&req.client_order_id) {
            return Ok(BrokerAck {
                broker_order_no: req.client_order_id.clone(),
            });
        }

        orders.insert(
            req.client_order_id.clone(),
            PaperOrder {
                broker_order_no: req.client_order_id.clone(),
                symbol: req.symbol.clone(),
                side: req.side,
                qty: req.qty,
                price: req.price,
                status: PaperOrderStatus::Accepted,
            },
        );

        Ok(BrokerAck {
            broker_order_no: req.client_order_id.clone(),
        })
    }

    /// Idempotent: canceling an unknown or already-canceled order is a no-op.
    async fn cancel_order(&self, client_order_id: &str) -> Result<(), BrokerError> {
        let mut orders = self.orders.lock().unwrap();
        if let Some(order) = orders.get_mut(client_order_id) {
            order.status = PaperOrderStatus::Canceled;
        }
        Ok(())
    }

    async fn modify_order(
        &self,
        client_order_id: &str,
        new_qty: Option<i64>,
        new_price: Option<Decimal>,
    ) -> Result<(), BrokerError> {
        let mut orders = self.orders.lock().unwrap();
        let order = orders.get_mut(client_order_id).ok_or_else(|| BrokerError::BusinessReject {
            code: "UNKNOWN_ORDER".to_string(),
            message: format!("no resting order for client_order_id {client_order_id}"),
        })?;

        if order.status == PaperOrderStatus::Canceled {
            return Err(BrokerError::BusinessReject {
                code: "ALREADY_CANCELED".to_string(),
                message: format!("order {client_order_id} is already canceled"),
            });
        }

        if let Some(qty) = new_qty {
            order.qty = qty;
        }
        if let Some(price) = new_price {
            order.price = price;
        }
        Ok(())
    }
}

/// Convenience constructor for tests/examples.
pub fn order_request(
    client_order_id: impl Into<String>,
    symbol: impl Into<String>,
    side: Side,
    qty: i64,
    price: Decimal,
) -> BrokerOrderRequest {
    BrokerOrderRequest {
        client_order_id: client_order_id.into(),
        symbol: symbol.into(),
        side,
        order_type: kx_execution::OrderType::Market,
        qty,
        price,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn place_order_is_idempotent_on_client_order_id() {
        let broker = PaperBroker::new();
        let req = order_request("c-1", "SPY", Side::Buy, 10, dec!(500.00));

        let ack1 = broker.place_order(&req).await.unwrap();
        let ack2 = broker.place_order(&req).await.unwrap();

        assert_eq!(ack1.broker_order_no, "c-1");
        assert_eq!(ack1, ack2);
        assert_eq!(broker.list_orders().len(), 1);
    }

    #[tokio::test]
    async fn cancel_unknown_order_is_a_no_op() {
        let broker = PaperBroker::new();
        assert!(broker.cancel_order("missing").await.is_ok());
    }

    #[tokio::test]
    async fn cancel_then_modify_is_rejected() {
        let broker = PaperBroker::new();
        let req = order_request("c-2", "AAPL", Side::Sell, 5, dec!(100.00));
        broker.place_order(&req).await.unwrap();
        broker.cancel_order("c-2").await.unwrap();

        let err = broker.modify_order("c-2", Some(3), None).await.unwrap_err();
        assert!(matches!(err, BrokerError::BusinessReject { code, .. } if code == "ALREADY_CANCELED"));
    }

    #[tokio::test]
    async fn modify_order_updates_qty_and_price() {
        let broker = PaperBroker::new();
        let req = order_request("c-3", "QQQ", Side::Buy, 10, dec!(300.00));
        broker.place_order(&req).await.unwrap();

        broker.modify_order("c-3", Some(20), Some(dec!(310.00))).await.unwrap();

        let snap = broker.order_snapshot("c-3").unwrap();
        assert_eq!(snap.qty, 20);
        assert_eq!(snap.price, dec!(310.00));
    }

    #[tokio::test]
    async fn modify_unknown_order_is_rejected() {
        let broker = PaperBroker::new();
        let err = broker.modify_order("ghost", Some(1), None).await.unwrap_err();
        assert!(matches!(err, BrokerError::BusinessReject { code, .. } if code == "UNKNOWN_ORDER"));
    }
}
