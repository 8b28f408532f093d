//! Order Manager — the single choke-point for order submission, cancel, and
//! modify (C7).
//!
//! # Invariant
//! No broker call happens outside `OrderManager::place/cancel/modify`. Risk
//! approval always runs before the broker is touched; idempotent replay
//! never touches the broker at all.

use std::fmt;
use std::sync::Arc;

use kx_schemas::{Clock, Id};
use rust_decimal::Decimal;

use crate::broker::{BrokerClient, BrokerError, BrokerOrderRequest};
use crate::oms::{apply as apply_event, OmsEvent};
use crate::retry::BackoffPolicy;
use crate::store::{OrderRepository, StoreError};
use crate::types::{Order, OrderStatus, OrderType};
use kx_risk::{RiskDecision, RiskOrderInput, RiskRule, RiskState};

#[derive(Debug)]
pub enum PlaceError {
    RiskLimitExceeded(kx_risk::ReasonCode),
    Store(StoreError),
}

impl fmt::Display for PlaceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlaceError::RiskLimitExceeded(reason) => {
                write!(f, "risk limit exceeded: {reason:?}")
            }
            PlaceError::Store(e) => write!(f, "store error: {e}"),
        }
    }
}

impl std::error::Error for PlaceError {}

#[derive(Debug)]
pub enum MutationError {
    OrderNotFound,
    NotInMutableState(OrderStatus),
    NoFieldsProvided,
    Broker(BrokerError),
    Store(StoreError),
}

impl fmt::Display for MutationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MutationError::OrderNotFound => write!(f, "order not found"),
            MutationError::NotInMutableState(s) => {
                write!(f, "order not in a cancellable/modifiable state: {s:?}")
            }
            MutationError::NoFieldsProvided => write!(f, "modify requires qty or price"),
            MutationError::Broker(e) => write!(f, "{e}"),
            MutationError::Store(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for MutationError {}

/// Everything `OrderManager::place` needs to build and submit an order.
pub struct PlaceRequest {
    pub account_id: String,
    pub symbol: String,
    pub side: kx_schemas::Side,
    pub order_type: OrderType,
    pub qty: i64,
    pub price: Decimal,
    pub idempotency_key: Option<String>,
    pub estimated_price: Option<Decimal>,
}

pub struct OrderManager<B: BrokerClient, R: OrderRepository> {
    broker: Arc<B>,
    store: Arc<R>,
    clock: Arc<dyn Clock>,
    backoff: BackoffPolicy,
}

impl<B: BrokerClient, R: OrderRepository> OrderManager<B, R> {
    pub fn new(broker: Arc<B>, store: Arc<R>, clock: Arc<dyn Clock>) -> Self {
        Self {
            broker,
            store,
            clock,
            backoff: BackoffPolicy::orders(),
        }
    }

    pub async fn place(
        &self,
        req: PlaceRequest,
        rules: &[RiskRule],
        risk_state: &mut RiskState,
    ) -> Result<Order, PlaceError> {
        if let Some(key) = &req.idempotency_key {
            if let Some(existing) = self
                .store
                .find_by_idempotency_key(key)
                .await
                .map_err(PlaceError::Store)?
            {
                return Ok(existing);
            }
        }

        let expected_version = risk_state.version;

        let risk_input = RiskOrderInput {
            account_id: req.account_id.clone(),
            symbol: req.symbol.clone(),
            qty: req.qty,
            estimated_price: req.estimated_price,
        };
        let decision: RiskDecision =
            kx_risk::evaluate(&risk_input, rules, risk_state, self.clock.now());
        if !decision.is_approved() {
            return Err(PlaceError::RiskLimitExceeded(
                decision.reason.expect("reject always carries a reason"),
            ));
        }

        risk_state.record_order_timestamp(self.clock.now());

        let order = Order::new(
            self.clock.new_id(),
            req.account_id,
            req.symbol,
            req.side,
            req.order_type,
            req.qty,
            req.price,
            req.idempotency_key,
            self.clock.now(),
        )
        .map_err(|e| PlaceError::Store(StoreError::Invariant(e.to_string())))?;

        let committed = self
            .store
            .persist_new_with_risk_state(&order, risk_state, expected_version)
            .await
            .map_err(PlaceError::Store)?;
        if !committed {
            return Err(PlaceError::Store(StoreError::Invariant(
                "risk state version conflict while persisting new order".to_string(),
            )));
        }
        let expected_version = risk_state.version;

        let mut order = order;
        let wire = BrokerOrderRequest::from_order(&order);
        match self.dispatch_with_retry(&wire).await {
            Ok(ack) => {
                apply_event(
                    &mut order,
                    OmsEvent::DispatchSucceeded {
                        broker_order_no: ack.broker_order_no,
                    },
                )
                .ok();
                kx_risk::on_order_acked(risk_state);
                self.store
                    .record_transition(&order, "ORDER_SENT")
                    .await
                    .map_err(PlaceError::Store)?;
            }
            Err(BrokerError::BusinessReject { code, message }) => {
                apply_event(&mut order, OmsEvent::DispatchRejected { code, message }).ok();
                kx_risk::on_order_rejected(
                    risk_state,
                    &kx_risk::resolve_applicable_rule(rules, &order.account_id, &order.symbol),
                    self.clock.now(),
                );
                self.store
                    .record_transition(&order, "ORDER_REJECTED")
                    .await
                    .map_err(PlaceError::Store)?;
            }
            Err(BrokerError::Transport(message)) => {
                apply_event(&mut order, OmsEvent::DispatchErrored { message }).ok();
                self.store
                    .record_transition(&order, "ORDER_ERROR")
                    .await
                    .map_err(PlaceError::Store)?;
            }
        }

        if !self
            .store
            .save_risk_state(risk_state, expected_version)
            .await
            .map_err(PlaceError::Store)?
        {
            tracing::error!(
                account_id = %order.account_id,
                "risk state version conflict persisting post-dispatch ack/reject bookkeeping"
            );
        }

        Ok(order)
    }

    pub async fn cancel(&self, order_id: &Id) -> Result<Order, MutationError> {
        let mut order = self
            .store
            .find_by_id(order_id)
            .await
            .map_err(MutationError::Store)?
            .ok_or(MutationError::OrderNotFound)?;

        if !order.is_cancellable_or_modifiable() {
            return Err(MutationError::NotInMutableState(order.status));
        }

        self.broker
            .cancel_order(&order.client_order_id())
            .await
            .map_err(MutationError::Broker)?;

        apply_event(&mut order, OmsEvent::CancelAcked)
            .map_err(|e| MutationError::NotInMutableState(e.from))?;

        self.store
            .record_transition(&order, "ORDER_CANCELLED")
            .await
            .map_err(MutationError::Store)?;

        Ok(order)
    }

    pub async fn modify(
        &self,
        order_id: &Id,
        new_qty: Option<i64>,
        new_price: Option<Decimal>,
    ) -> Result<Order, MutationError> {
        if new_qty.is_none() && new_price.is_none() {
            return Err(MutationError::NoFieldsProvided);
        }

        let mut order = self
            .store
            .find_by_id(order_id)
            .await
            .map_err(MutationError::Store)?
            .ok_or(MutationError::OrderNotFound)?;

        if !order.is_cancellable_or_modifiable() {
            return Err(MutationError::NotInMutableState(order.status));
        }

        self.broker
            .modify_order(&order.client_order_id(), new_qty, new_price)
            .await
            .map_err(MutationError::Broker)?;

        if let Some(q) = new_qty {
            order.qty = q;
        }
        if let Some(p) = new_price {
            order.price = p;
        }
        apply_event(&mut order, OmsEvent::ModifyAcked)
            .map_err(|e| MutationError::NotInMutableState(e.from))?;

        self.store
            .record_transition(&order, "ORDER_MODIFIED")
            .await
            .map_err(MutationError::Store)?;

        Ok(order)
    }

    async fn dispatch_with_retry(
        &self,
        req: &BrokerOrderRequest,
    ) -> Result<crate::broker::BrokerAck, BrokerError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.broker.place_order(req).await {
                Ok(ack) => return Ok(ack),
                Err(BrokerError::Transport(msg)) if attempt < self.backoff.max_attempts => {
                    tokio::time::sleep(self.backoff.delay_for(attempt)).await;
                    tracing::warn!(attempt, %msg, "retrying broker dispatch after transport error");
                    continue;
                }
                Err(other) => return Err(other),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::BrokerAck;
    use crate::store::InMemoryOrderRepository;
    use chrono::Utc;
    use kx_schemas::{FixedClock, Side};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct AlwaysOkBroker;

    #[async_trait::async_trait]
    impl BrokerClient for AlwaysOkBroker {
        async fn place_order(&self, req: &BrokerOrderRequest) -> Result<BrokerAck, BrokerError> {
            Ok(BrokerAck {
                broker_order_no: format!("B-{}", req.client_order_id),
            })
        }
        async fn cancel_order(&self, _client_order_id: &str) -> Result<(), BrokerError> {
            Ok(())
        }
        async fn modify_order(
            &self,
            _client_order_id: &str,
            _new_qty: Option<i64>,
            _new_price: Option<Decimal>,
        ) -> Result<(), BrokerError> {
            Ok(())
        }
    }

    struct CountingBroker {
        calls: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl BrokerClient for CountingBroker {
        async fn place_order(&self, req: &BrokerOrderRequest) -> Result<BrokerAck, BrokerError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(BrokerAck {
                broker_order_no: format!("B-{}", req.client_order_id),
            })
        }
        async fn cancel_order(&self, _: &str) -> Result<(), BrokerError> {
            Ok(())
        }
        async fn modify_order(
            &self,
            _: &str,
            _: Option<i64>,
            _: Option<Decimal>,
        ) -> Result<(), BrokerError> {
            Ok(())
        }
    }

    struct AlwaysRejectBroker;

    #[async_trait::async_trait]
    impl BrokerClient for AlwaysRejectBroker {
        async fn place_order(&self, _req: &BrokerOrderRequest) -> Result<BrokerAck, BrokerError> {
            Err(BrokerError::BusinessReject {
                code: "INSUFFICIENT_FUNDS".to_string(),
                message: "not enough cash".to_string(),
            })
        }
        async fn cancel_order(&self, _: &str) -> Result<(), BrokerError> {
            Ok(())
        }
        async fn modify_order(
            &self,
            _: &str,
            _: Option<i64>,
            _: Option<Decimal>,
        ) -> Result<(), BrokerError> {
            Ok(())
        }
    }

    fn manager(broker: Arc<impl BrokerClient + 'static>) -> OrderManager<impl BrokerClient, InMemoryOrderRepository> {
        let clock = Arc::new(FixedClock::at(Utc::now()));
        OrderManager::new(broker, Arc::new(InMemoryOrderRepository::default()), clock)
    }

    fn place_req(idempotency_key: Option<&str>) -> PlaceRequest {
        PlaceRequest {
            account_id: "acct-1".to_string(),
            symbol: "005930".to_string(),
            side: Side::Buy,
            order_type: OrderType::Market,
            qty: 10,
            price: Decimal::ZERO,
            idempotency_key: idempotency_key.map(str::to_string),
            estimated_price: Some(Decimal::new(70000, 0)),
        }
    }

    #[tokio::test]
    async fn idempotent_replay_never_calls_broker_twice() {
        let broker = Arc::new(CountingBroker {
            calls: AtomicUsize::new(0),
        });
        let mgr = manager(broker.clone());
        let rules = vec![RiskRule::global_sane_defaults()];
        let mut state = RiskState::new_global();

        let first = mgr.place(place_req(Some("K1")), &rules, &mut state).await.unwrap();
        let second = mgr.place(place_req(Some("K1")), &rules, &mut state).await.unwrap();

        assert_eq!(first.order_id, second.order_id);
        assert_eq!(broker.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn risk_reject_produces_no_order_and_no_broker_call() {
        let broker = Arc::new(CountingBroker {
            calls: AtomicUsize::new(0),
        });
        let mgr = manager(broker.clone());
        let mut rule = RiskRule::global_sane_defaults();
        rule.max_open_orders = Some(0);
        let rules = vec![rule];
        let mut state = RiskState::new_global();

        let err = mgr.place(place_req(None), &rules, &mut state).await.unwrap_err();
        assert!(matches!(err, PlaceError::RiskLimitExceeded(_)));
        assert_eq!(broker.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn successful_place_transitions_to_sent() {
        let mgr = manager(Arc::new(AlwaysOkBroker));
        let rules = vec![RiskRule::global_sane_defaults()];
        let mut state = RiskState::new_global();

        let order = mgr.place(place_req(None), &rules, &mut state).await.unwrap();
        assert_eq!(order.status, OrderStatus::Sent);
        assert!(order.broker_order_no.is_some());
    }

    #[tokio::test]
    async fn business_reject_transitions_to_rejected_and_bumps_failures() {
        let mgr = manager(Arc::new(AlwaysRejectBroker));
        let rules = vec![RiskRule::global_sane_defaults()];
        let mut state = RiskState::new_global();

        let order = mgr.place(place_req(None), &rules, &mut state).await.unwrap();
        assert_eq!(order.status, OrderStatus::Rejected);
        assert_eq!(state.consecutive_order_failures, 1);
    }

    #[tokio::test]
    async fn cancel_requires_mutable_state() {
        let mgr = manager(Arc::new(AlwaysOkBroker));
        let rules = vec![RiskRule::global_sane_defaults()];
        let mut state = RiskState::new_global();
        let order = mgr.place(place_req(None), &rules, &mut state).await.unwrap();

        let cancelled = mgr.cancel(&order.order_id).await.unwrap();
        assert_eq!(cancelled.status, OrderStatus::Cancelled);

        let err = mgr.cancel(&order.order_id).await.unwrap_err();
        assert!(matches!(err, MutationError::NotInMutableState(_)));
    }
}
