//! Pre-trade risk evaluation (C6).
//!
//! `evaluate` is pure and deterministic: no IO, no broker calls. Checks run
//! in a fixed order and short-circuit on the first violation, matching the
//! ordering in the risk-rule catalog.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::types::{
    resolve_applicable_rule, KillSwitchEvent, KillSwitchState, ReasonCode, RiskAction,
    RiskDecision, RiskOrderInput, RiskRule, RiskState,
};

/// Evaluates a candidate order against the applicable rule and the
/// account's current risk state. Never panics; unknown prices reject rather
/// than raise.
pub fn evaluate(
    order: &RiskOrderInput,
    rules: &[RiskRule],
    state: &mut RiskState,
    now: DateTime<Utc>,
) -> RiskDecision {
    let rule = resolve_applicable_rule(rules, &order.account_id, &order.symbol);

    if state.kill_switch == KillSwitchState::On {
        return RiskDecision::reject(ReasonCode::KillSwitch, rule.rule_id);
    }

    if let Some(limit) = rule.daily_loss_limit {
        if state.daily_pnl < -limit {
            return RiskDecision::reject(ReasonCode::DailyLossLimit, rule.rule_id);
        }
    }

    if let Some(limit) = rule.max_open_orders {
        if state.open_order_count >= limit {
            return RiskDecision::reject(ReasonCode::MaxOpenOrders, rule.rule_id);
        }
    }

    if let Some(limit) = rule.max_position_value_per_symbol {
        match order.estimated_price {
            Some(price) => {
                let value = price * Decimal::from(order.qty);
                if value > limit {
                    return RiskDecision::reject(ReasonCode::MaxPositionValue, rule.rule_id);
                }
            }
            None => {
                return RiskDecision::reject(ReasonCode::PriceUnknown, rule.rule_id);
            }
        }
    }

    if let Some(limit) = rule.max_orders_per_minute {
        if state.orders_in_last_minute(now) >= limit {
            return RiskDecision::reject(ReasonCode::MaxOrderFrequency, rule.rule_id);
        }
    }

    if let Some(limit) = rule.consecutive_order_failures_limit {
        if state.consecutive_order_failures >= limit {
            return RiskDecision::reject(ReasonCode::ConsecutiveFailures, rule.rule_id);
        }
    }

    RiskDecision::allow()
}

/// Called after a fill is applied: updates daily P&L and trips the
/// kill-switch if the daily loss limit is breached.
pub fn on_fill_applied(
    state: &mut RiskState,
    rule: &RiskRule,
    realized_pnl_delta: Decimal,
    now: DateTime<Utc>,
) -> Option<KillSwitchEvent> {
    state.apply_daily_pnl_delta(realized_pnl_delta);

    if let Some(limit) = rule.daily_loss_limit {
        if state.daily_pnl < -limit {
            state.trigger_kill_switch("DAILY_LOSS");
            return Some(
                KillSwitchEvent::new("DAILY_LOSS", now)
                    .with_evidence("daily_pnl", state.daily_pnl)
                    .with_evidence("limit", limit),
            );
        }
    }
    None
}

/// Called after an order is rejected by the broker: bumps the consecutive
/// failure counter and trips the kill-switch if the configured threshold is
/// crossed.
pub fn on_order_rejected(
    state: &mut RiskState,
    rule: &RiskRule,
    now: DateTime<Utc>,
) -> Option<KillSwitchEvent> {
    state.record_reject();
    if let Some(limit) = rule.consecutive_order_failures_limit {
        if state.consecutive_order_failures >= limit {
            state.trigger_kill_switch("CONSECUTIVE_FAILURES");
            return Some(
                KillSwitchEvent::new("CONSECUTIVE_FAILURES", now)
                    .with_evidence("consecutive_failures", state.consecutive_order_failures)
                    .with_evidence("limit", limit),
            );
        }
    }
    None
}

/// Called after a broker ack: resets the consecutive failure counter.
pub fn on_order_acked(state: &mut RiskState) {
    state.record_ack();
}

/// Admin toggle, always effective regardless of other rules (matches the
/// "kill-switch dominance" property: while ON, no order is ever approved).
pub fn toggle_kill_switch(state: &mut RiskState, on: bool, reason: impl Into<String>) {
    state.toggle_kill_switch(on, reason);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RiskScope;

    fn now() -> DateTime<Utc> {
        "2026-01-01T00:00:00Z".parse().unwrap()
    }

    fn input(account: &str, symbol: &str, qty: i64, price: Option<Decimal>) -> RiskOrderInput {
        RiskOrderInput {
            account_id: account.to_string(),
            symbol: symbol.to_string(),
            qty,
            estimated_price: price,
        }
    }

    #[test]
    fn kill_switch_dominates_every_other_rule() {
        let rules = vec![RiskRule::global_sane_defaults()];
        let mut state = RiskState::new_global();
        state.trigger_kill_switch("manual");

        let decision = evaluate(
            &input("acct-1", "005930", 1, Some(Decimal::new(1000, 0))),
            &rules,
            &mut state,
            now(),
        );
        assert_eq!(decision.action, RiskAction::Reject);
        assert_eq!(decision.reason, Some(ReasonCode::KillSwitch));
    }

    #[test]
    fn max_open_orders_rejects_at_threshold() {
        let mut rule = RiskRule::global_sane_defaults();
        rule.max_open_orders = Some(0);
        let rules = vec![rule];
        let mut state = RiskState::new_global();

        let decision = evaluate(
            &input("acct-1", "005930", 1, Some(Decimal::new(1000, 0))),
            &rules,
            &mut state,
            now(),
        );
        assert_eq!(decision.reason, Some(ReasonCode::MaxOpenOrders));
    }

    #[test]
    fn monotonic_open_order_count_flips_decision() {
        let mut rule = RiskRule::global_sane_defaults();
        rule.max_open_orders = Some(1);
        let rules = vec![rule];
        let mut state = RiskState::new_global();
        state.open_order_count = 1;

        let rejected = evaluate(
            &input("acct-1", "005930", 1, Some(Decimal::new(1000, 0))),
            &rules,
            &mut state,
            now(),
        );
        assert!(!rejected.is_approved());

        state.open_order_count = 0;
        let allowed = evaluate(
            &input("acct-1", "005930", 1, Some(Decimal::new(1000, 0))),
            &rules,
            &mut state,
            now(),
        );
        assert!(allowed.is_approved());
    }

    #[test]
    fn unknown_market_price_rejects_when_position_limit_set() {
        let rules = vec![RiskRule::global_sane_defaults()];
        let mut state = RiskState::new_global();

        let decision = evaluate(&input("acct-1", "005930", 1, None), &rules, &mut state, now());
        assert_eq!(decision.reason, Some(ReasonCode::PriceUnknown));
    }

    #[test]
    fn per_symbol_rule_overrides_global_for_its_field() {
        let global = RiskRule::global_sane_defaults();
        let per_symbol = RiskRule {
            rule_id: "sym-override".to_string(),
            scope: RiskScope::PerSymbol,
            account_id: Some("acct-1".to_string()),
            symbol: Some("005930".to_string()),
            max_position_value_per_symbol: Some(Decimal::new(10, 0)),
            max_open_orders: None,
            max_orders_per_minute: None,
            daily_loss_limit: None,
            consecutive_order_failures_limit: None,
        };
        let rules = vec![global, per_symbol];
        let mut state = RiskState::new_global();

        let decision = evaluate(
            &input("acct-1", "005930", 1, Some(Decimal::new(1000, 0))),
            &rules,
            &mut state,
            now(),
        );
        assert_eq!(decision.reason, Some(ReasonCode::MaxPositionValue));
    }

    #[test]
    fn daily_loss_breach_trips_kill_switch_on_fill() {
        let mut rule = RiskRule::global_sane_defaults();
        rule.daily_loss_limit = Some(Decimal::new(100, 0));
        let mut state = RiskState::new_global();

        let event = on_fill_applied(&mut state, &rule, Decimal::new(-150, 0), now());
        assert!(event.is_some());
        assert_eq!(state.kill_switch, KillSwitchState::On);
    }

    #[test]
    fn consecutive_failures_trip_kill_switch_and_ack_resets() {
        let mut rule = RiskRule::global_sane_defaults();
        rule.consecutive_order_failures_limit = Some(2);
        let mut state = RiskState::new_global();

        assert!(on_order_rejected(&mut state, &rule, now()).is_none());
        let event = on_order_rejected(&mut state, &rule, now());
        assert!(event.is_some());
        assert_eq!(state.kill_switch, KillSwitchState::On);

        state.kill_switch = KillSwitchState::Off;
        on_order_acked(&mut state);
        assert_eq!(state.consecutive_order_failures, 0);
    }

    #[test]
    fn order_frequency_limit_uses_sliding_window() {
        let mut rule = RiskRule::global_sane_defaults();
        rule.max_orders_per_minute = Some(1);
        let rules = vec![rule];
        let mut state = RiskState::new_global();
        state.record_order_timestamp(now());

        let decision = evaluate(
            &input("acct-1", "005930", 1, Some(Decimal::new(1000, 0))),
            &rules,
            &mut state,
            now(),
        );
        assert_eq!(decision.reason, Some(ReasonCode::MaxOrderFrequency));

        let later = now() + chrono::Duration::seconds(61);
        let decision = evaluate(
            &input("acct-1", "005930", 1, Some(Decimal::new(1000, 0))),
            &rules,
            &mut state,
            later,
        );
        assert!(decision.is_approved());
    }
}
