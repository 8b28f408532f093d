use chrono::{DateTime, Utc};
use kx_schemas::{Id, Side};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderType {
    Market,
    Limit,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    New,
    Sent,
    Accepted,
    PartiallyFilled,
    Filled,
    Cancelled,
    Rejected,
    Error,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub order_id: Id,
    pub account_id: String,
    pub strategy_id: Option<Id>,
    pub signal_id: Option<Id>,
    pub symbol: String,
    pub side: Side,
    pub order_type: OrderType,
    pub qty: i64,
    pub price: Decimal,
    pub status: OrderStatus,
    pub idempotency_key: Option<String>,
    pub broker_order_no: Option<String>,
    pub reject_code: Option<String>,
    pub reject_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        order_id: Id,
        account_id: impl Into<String>,
        symbol: impl Into<String>,
        side: Side,
        order_type: OrderType,
        qty: i64,
        price: Decimal,
        idempotency_key: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<Self, OrderValidationError> {
        if qty <= 0 {
            return Err(OrderValidationError::NonPositiveQty);
        }
        if matches!(order_type, OrderType::Market) && price != Decimal::ZERO {
            return Err(OrderValidationError::MarketOrderWithPrice);
        }
        if matches!(order_type, OrderType::Limit) && price <= Decimal::ZERO {
            return Err(OrderValidationError::LimitOrderWithoutPrice);
        }
        Ok(Self {
            order_id,
            account_id: account_id.into(),
            strategy_id: None,
            signal_id: None,
            symbol: symbol.into(),
            side,
            order_type,
            qty,
            price,
            status: OrderStatus::New,
            idempotency_key,
            broker_order_no: None,
            reject_code: None,
            reject_message: None,
            created_at: now,
            updated_at: now,
        })
    }

    /// Wire-level client order id: reused across retries of the same
    /// logical submission so the broker itself also deduplicates.
    pub fn client_order_id(&self) -> String {
        self.order_id.as_str().to_string()
    }

    pub fn is_cancellable_or_modifiable(&self) -> bool {
        matches!(
            self.status,
            OrderStatus::Sent | OrderStatus::Accepted | OrderStatus::PartiallyFilled
        )
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OrderValidationError {
    NonPositiveQty,
    MarketOrderWithPrice,
    LimitOrderWithoutPrice,
}

impl std::fmt::Display for OrderValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NonPositiveQty => write!(f, "order quantity must be positive"),
            Self::MarketOrderWithPrice => write!(f, "market order must carry price == 0"),
            Self::LimitOrderWithoutPrice => write!(f, "limit order must carry price > 0"),
        }
    }
}

impl std::error::Error for OrderValidationError {}
