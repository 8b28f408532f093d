//! Persistence boundary for orders.
//!
//! `persist_new_with_risk_state` and `record_transition` are each expected to
//! be a single atomic write: the order row (and, for the former, the risk
//! state row that produced it) lands together with its outbox event row in
//! the same database transaction (see the outbox module in `kx-db`). This
//! crate only defines the contract; `kx-db` provides the production
//! implementation and `kx-runtime` wires it in.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Mutex;

use kx_risk::RiskState;
use kx_schemas::Id;

use crate::types::Order;

#[derive(Debug)]
pub enum StoreError {
    Backend(String),
    Invariant(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Backend(msg) => write!(f, "store backend error: {msg}"),
            StoreError::Invariant(msg) => write!(f, "store invariant violated: {msg}"),
        }
    }
}

impl std::error::Error for StoreError {}

#[async_trait::async_trait]
pub trait OrderRepository: Send + Sync {
    async fn find_by_idempotency_key(&self, key: &str) -> Result<Option<Order>, StoreError>;
    async fn find_by_id(&self, id: &Id) -> Result<Option<Order>, StoreError>;
    async fn find_by_broker_order_no(&self, broker_order_no: &str) -> Result<Option<Order>, StoreError>;

    /// Persists a brand new `NEW` order together with the risk state row
    /// that approved it (the order-frequency-tracker bump belongs to this
    /// same write), in one transaction: a failure in either leaves neither
    /// committed. Returns `false` on a risk-state version conflict, meaning
    /// the order row was rolled back along with it.
    async fn persist_new_with_risk_state(
        &self,
        order: &Order,
        risk_state: &RiskState,
        expected_version: i64,
    ) -> Result<bool, StoreError>;

    /// Persists a `RiskState` mutated after a broker round-trip (ack/reject
    /// bookkeeping), independent of any single order row. Returns `false` on
    /// a version conflict; the caller decides whether to retry or accept
    /// the loss.
    async fn save_risk_state(&self, risk_state: &RiskState, expected_version: i64) -> Result<bool, StoreError>;

    /// Persists the order's current state together with an outbox event of
    /// `event_type`, atomically.
    async fn record_transition(&self, order: &Order, event_type: &str) -> Result<(), StoreError>;
}

/// In-memory double used by this crate's own unit tests.
#[derive(Default)]
pub struct InMemoryOrderRepository {
    orders: Mutex<BTreeMap<String, Order>>,
    by_idempotency_key: Mutex<BTreeMap<String, String>>,
}

#[async_trait::async_trait]
impl OrderRepository for InMemoryOrderRepository {
    async fn find_by_idempotency_key(&self, key: &str) -> Result<Option<Order>, StoreError> {
        let map = self.by_idempotency_key.lock().unwrap();
        let orders = self.orders.lock().unwrap();
        Ok(map.get(key).and_then(|id| orders.get(id)).cloned())
    }

    async fn find_by_id(&self, id: &Id) -> Result<Option<Order>, StoreError> {
        let orders = self.orders.lock().unwrap();
        Ok(orders.get(id.as_str()).cloned())
    }

    async fn find_by_broker_order_no(&self, broker_order_no: &str) -> Result<Option<Order>, StoreError> {
        let orders = self.orders.lock().unwrap();
        Ok(orders
            .values()
            .find(|o| o.broker_order_no.as_deref() == Some(broker_order_no))
            .cloned())
    }

    async fn persist_new_with_risk_state(
        &self,
        order: &Order,
        _risk_state: &RiskState,
        _expected_version: i64,
    ) -> Result<bool, StoreError> {
        let mut orders = self.orders.lock().unwrap();
        if let Some(key) = &order.idempotency_key {
            self.by_idempotency_key
                .lock()
                .unwrap()
                .insert(key.clone(), order.order_id.as_str().to_string());
        }
        orders.insert(order.order_id.as_str().to_string(), order.clone());
        Ok(true)
    }

    async fn save_risk_state(&self, _risk_state: &RiskState, _expected_version: i64) -> Result<bool, StoreError> {
        Ok(true)
    }

    async fn record_transition(&self, order: &Order, _event_type: &str) -> Result<(), StoreError> {
        let mut orders = self.orders.lock().unwrap();
        orders.insert(order.order_id.as_str().to_string(), order.clone());
        Ok(())
    }
}
