//! Order status machine.
//!
//! ```text
//! New ──dispatch ok──▶ Sent ──broker ack──▶ Accepted
//!  │                     │                    │
//!  │                     │                    ├─partial fill─▶ PartiallyFilled ─fills complete─▶ Filled
//!  │                     │                    ├─cancel ack───▶ Cancelled
//!  │                     │                    └─broker reject▶ Rejected
//!  │                     └─transport failure──▶ Error
//!  └─local reject/timeout▶ Error
//! ```
//!
//! Transitions are the only allowed mutation; everything else is a
//! `TransitionError`, never a panic.

use std::fmt;

use crate::types::{Order, OrderStatus};

#[derive(Clone, Debug, PartialEq)]
pub enum OmsEvent {
    DispatchSucceeded { broker_order_no: String },
    DispatchRejected { code: String, message: String },
    DispatchErrored { message: String },
    PartialFilled,
    FillsComplete,
    CancelAcked,
    ModifyAcked,
}

#[derive(Clone, Debug, PartialEq)]
pub struct TransitionError {
    pub from: OrderStatus,
    pub event: OmsEvent,
}

impl fmt::Display for TransitionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "no transition from {:?} on event {:?}",
            self.from, self.event
        )
    }
}

impl std::error::Error for TransitionError {}

/// Applies an OMS event to the order, mutating `status` and any
/// event-carried fields in place.
pub fn apply(order: &mut Order, event: OmsEvent) -> Result<(), TransitionError> {
    use OrderStatus::*;

    let next = match (order.status, &event) {
        (New, OmsEvent::DispatchSucceeded { broker_order_no }) => {
            order.broker_order_no = Some(broker_order_no.clone());
            Sent
        }
        (New, OmsEvent::DispatchRejected { code, message }) => {
            order.reject_code = Some(code.clone());
            order.reject_message = Some(message.clone());
            Rejected
        }
        (New, OmsEvent::DispatchErrored { message }) => {
            order.reject_message = Some(message.clone());
            Error
        }
        (Sent, OmsEvent::DispatchSucceeded { broker_order_no }) => {
            order.broker_order_no = Some(broker_order_no.clone());
            Accepted
        }
        (Sent, OmsEvent::DispatchRejected { code, message }) => {
            order.reject_code = Some(code.clone());
            order.reject_message = Some(message.clone());
            Rejected
        }
        (Sent, OmsEvent::DispatchErrored { message }) => {
            order.reject_message = Some(message.clone());
            Error
        }
        (Accepted, OmsEvent::PartialFilled) => PartiallyFilled,
        (Accepted, OmsEvent::FillsComplete) => Filled,
        (Accepted, OmsEvent::CancelAcked) => Cancelled,
        (Accepted, OmsEvent::ModifyAcked) => Accepted,
        (PartiallyFilled, OmsEvent::PartialFilled) => PartiallyFilled,
        (PartiallyFilled, OmsEvent::FillsComplete) => Filled,
        (PartiallyFilled, OmsEvent::CancelAcked) => Cancelled,
        (PartiallyFilled, OmsEvent::ModifyAcked) => PartiallyFilled,
        (Sent, OmsEvent::ModifyAcked) => Sent,
        _ => {
            return Err(TransitionError {
                from: order.status,
                event,
            })
        }
    };

    order.status = next;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use kx_schemas::{Id, Side};
    use rust_decimal::Decimal;

    fn new_order() -> Order {
        Order::new(
            Id::from_parts(1, [0; 10]),
            "acct-1",
            "005930",
            Side::Buy,
            crate::types::OrderType::Market,
            10,
            Decimal::ZERO,
            None,
            chrono::Utc::now(),
        )
        .unwrap()
    }

    #[test]
    fn new_to_sent_on_dispatch_success() {
        let mut o = new_order();
        apply(
            &mut o,
            OmsEvent::DispatchSucceeded {
                broker_order_no: "B1".to_string(),
            },
        )
        .unwrap();
        assert_eq!(o.status, OrderStatus::Sent);
        assert_eq!(o.broker_order_no.as_deref(), Some("B1"));
    }

    #[test]
    fn sent_to_accepted_then_partial_then_filled() {
        let mut o = new_order();
        apply(
            &mut o,
            OmsEvent::DispatchSucceeded {
                broker_order_no: "B1".to_string(),
            },
        )
        .unwrap();
        apply(
            &mut o,
            OmsEvent::DispatchSucceeded {
                broker_order_no: "B1".to_string(),
            },
        )
        .unwrap();
        assert_eq!(o.status, OrderStatus::Accepted);
        apply(&mut o, OmsEvent::PartialFilled).unwrap();
        assert_eq!(o.status, OrderStatus::PartiallyFilled);
        apply(&mut o, OmsEvent::FillsComplete).unwrap();
        assert_eq!(o.status, OrderStatus::Filled);
    }

    #[test]
    fn cancel_from_partially_filled() {
        let mut o = new_order();
        o.status = OrderStatus::PartiallyFilled;
        apply(&mut o, OmsEvent::CancelAcked).unwrap();
        assert_eq!(o.status, OrderStatus::Cancelled);
    }

    #[test]
    fn transport_failure_from_sent_is_error_terminal() {
        let mut o = new_order();
        o.status = OrderStatus::Sent;
        apply(
            &mut o,
            OmsEvent::DispatchErrored {
                message: "timeout".to_string(),
            },
        )
        .unwrap();
        assert_eq!(o.status, OrderStatus::Error);
    }

    #[test]
    fn filled_order_rejects_further_transitions() {
        let mut o = new_order();
        o.status = OrderStatus::Filled;
        let err = apply(&mut o, OmsEvent::CancelAcked).unwrap_err();
        assert_eq!(err.from, OrderStatus::Filled);
    }
}
