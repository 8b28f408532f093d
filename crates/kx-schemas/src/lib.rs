//! Shared identifiers, clock, and event-envelope types used across the
//! engine crates.

mod clock;
mod id;

pub use clock::{Clock, FixedClock, SystemClock};
pub use id::Id;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Side of an order or fill.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn sign(self) -> i64 {
        match self {
            Side::Buy => 1,
            Side::Sell => -1,
        }
    }
}

/// Envelope wrapping every event published through the outbox (C5), keeping
/// the correlation/causation chain visible to downstream consumers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope<T> {
    pub event_id: Id,
    pub occurred_at: DateTime<Utc>,
    pub event_type: String,
    pub correlation_id: Id,
    pub causation_id: Option<Id>,
    pub payload: T,
}

impl<T> EventEnvelope<T> {
    pub fn new(
        clock: &dyn Clock,
        event_type: impl Into<String>,
        correlation_id: Id,
        causation_id: Option<Id>,
        payload: T,
    ) -> Self {
        Self {
            event_id: clock.new_id(),
            occurred_at: clock.now(),
            event_type: event_type.into(),
            correlation_id,
            causation_id,
            payload,
        }
    }
}

/// Canonical outbox event type names (see the event catalog in the project
/// configuration docs).
pub mod event_types {
    pub const ORDER_SENT: &str = "ORDER_SENT";
    pub const ORDER_REJECTED: &str = "ORDER_REJECTED";
    pub const ORDER_ERROR: &str = "ORDER_ERROR";
    pub const ORDER_CANCELLED: &str = "ORDER_CANCELLED";
    pub const ORDER_MODIFIED: &str = "ORDER_MODIFIED";
    pub const FILL_RECEIVED: &str = "FillReceived";
    pub const POSITION_UPDATED: &str = "PositionUpdated";
    pub const PNL_UPDATED: &str = "PnlUpdated";
    pub const SIGNAL_GENERATED: &str = "SignalGenerated";
    pub const TOKEN_REFRESHED: &str = "TokenRefreshed";
    pub const KILL_SWITCH_TOGGLED: &str = "KillSwitchToggled";
}

/// Rounds a decimal to `dp` places using HALF_UP (midpoint away from zero),
/// the rounding rule the position/accounting math requires throughout.
pub fn round_half_up(value: Decimal, dp: u32) -> Decimal {
    value.round_dp_with_strategy(dp, rust_decimal::RoundingStrategy::MidpointAwayFromZero)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn half_up_rounds_midpoint_away_from_zero() {
        let v = Decimal::new(125, 2); // 1.25
        assert_eq!(round_half_up(v, 1), Decimal::new(13, 1));
        let v = Decimal::new(-125, 2);
        assert_eq!(round_half_up(v, 1), Decimal::new(-13, 1));
    }
}
