use chrono::{DateTime, Utc};
use kx_schemas::Side;
use rust_decimal::Decimal;

/// A fill message as it arrives off the broker fill stream, before it is
/// matched to a known order.
#[derive(Clone, Debug, PartialEq)]
pub struct RawFill {
    pub broker_order_no: String,
    pub symbol: String,
    pub side: Side,
    pub qty: i64,
    pub price: Decimal,
    pub fill_timestamp: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ValidationError {
    BlankBrokerOrderNo,
    TimestampTooFarInFuture,
    PriceOutOfRange,
    QtyOutOfRange,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BlankBrokerOrderNo => write!(f, "broker order number is blank"),
            Self::TimestampTooFarInFuture => write!(f, "fill timestamp is more than 60s in the future"),
            Self::PriceOutOfRange => write!(f, "fill price outside [100, 10000000]"),
            Self::QtyOutOfRange => write!(f, "fill qty outside [1, 1000000]"),
        }
    }
}

impl std::error::Error for ValidationError {}

const MIN_PRICE: i64 = 100;
const MAX_PRICE: i64 = 10_000_000;
const MIN_QTY: i64 = 1;
const MAX_QTY: i64 = 1_000_000;
const MAX_FUTURE_SECS: i64 = 60;

pub fn validate(raw: &RawFill, now: DateTime<Utc>) -> Result<(), ValidationError> {
    if raw.broker_order_no.trim().is_empty() {
        return Err(ValidationError::BlankBrokerOrderNo);
    }
    if raw.fill_timestamp > now + chrono::Duration::seconds(MAX_FUTURE_SECS) {
        return Err(ValidationError::TimestampTooFarInFuture);
    }
    if raw.price < Decimal::from(MIN_PRICE) || raw.price > Decimal::from(MAX_PRICE) {
        return Err(ValidationError::PriceOutOfRange);
    }
    if raw.qty < MIN_QTY || raw.qty > MAX_QTY {
        return Err(ValidationError::QtyOutOfRange);
    }
    Ok(())
}
