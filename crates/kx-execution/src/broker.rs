//! Broker wire boundary (C7 external collaborator).
//!
//! Encoding the actual wire protocol is out of scope; this trait is the only
//! surface a concrete adapter (e.g. the paper broker) must implement.

use std::fmt;

use rust_decimal::Decimal;

use crate::types::{Order, OrderType};
use kx_schemas::Side;

#[derive(Clone, Debug, PartialEq)]
pub struct BrokerOrderRequest {
    pub client_order_id: String,
    pub symbol: String,
    pub side: Side,
    pub order_type: OrderType,
    pub qty: i64,
    pub price: Decimal,
}

impl BrokerOrderRequest {
    pub fn from_order(order: &Order) -> Self {
        Self {
            client_order_id: order.client_order_id(),
            symbol: order.symbol.clone(),
            side: order.side,
            order_type: order.order_type,
            qty: order.qty,
            price: order.price,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct BrokerAck {
    pub broker_order_no: String,
}

#[derive(Clone, Debug, PartialEq)]
pub enum BrokerError {
    /// The broker validated and rejected the request; retrying is pointless.
    BusinessReject { code: String, message: String },
    /// Network/timeout/5xx; eligible for retry per policy.
    Transport(String),
}

impl fmt::Display for BrokerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BrokerError::BusinessReject { code, message } => {
                write!(f, "broker rejected ({code}): {message}")
            }
            BrokerError::Transport(msg) => write!(f, "broker transport error: {msg}"),
        }
    }
}

impl std::error::Error for BrokerError {}

#[async_trait::async_trait]
pub trait BrokerClient: Send + Sync {
    async fn place_order(&self, req: &BrokerOrderRequest) -> Result<BrokerAck, BrokerError>;
    async fn cancel_order(&self, client_order_id: &str) -> Result<(), BrokerError>;
    async fn modify_order(
        &self,
        client_order_id: &str,
        new_qty: Option<i64>,
        new_price: Option<Decimal>,
    ) -> Result<(), BrokerError>;
}
