//! Pre-trade risk engine (C6).
//!
//! Deterministic, pure logic: no IO, no time source beyond what callers pass
//! in, no broker calls. `evaluate` is the pre-trade gate; the `on_*` hooks
//! update risk state after fills, rejects, and acks feed back into it.

mod engine;
mod types;

pub use engine::{evaluate, on_fill_applied, on_order_acked, on_order_rejected, toggle_kill_switch};
pub use types::{
    resolve_applicable_rule, KillSwitchEvent, KillSwitchState, ReasonCode, RiskAction,
    RiskDecision, RiskOrderInput, RiskRule, RiskScope, RiskState,
};
