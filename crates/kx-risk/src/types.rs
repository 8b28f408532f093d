use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Scope a [`RiskRule`] applies at. Resolution picks the most specific scope
/// that defines a given field: `PerSymbol` > `PerAccount` > `Global`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RiskScope {
    Global,
    PerAccount,
    PerSymbol,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RiskRule {
    pub rule_id: String,
    pub scope: RiskScope,
    pub account_id: Option<String>,
    pub symbol: Option<String>,
    pub max_position_value_per_symbol: Option<Decimal>,
    pub max_open_orders: Option<i64>,
    pub max_orders_per_minute: Option<i64>,
    pub daily_loss_limit: Option<Decimal>,
    pub consecutive_order_failures_limit: Option<i64>,
}

impl RiskRule {
    pub fn global_sane_defaults() -> Self {
        Self {
            rule_id: "global-default".to_string(),
            scope: RiskScope::Global,
            account_id: None,
            symbol: None,
            max_position_value_per_symbol: Some(Decimal::new(100_000_000, 0)),
            max_open_orders: Some(50),
            max_orders_per_minute: Some(30),
            daily_loss_limit: Some(Decimal::new(5_000_000, 0)),
            consecutive_order_failures_limit: Some(5),
        }
    }
}

/// Resolves the applicable rule for an (account, symbol) pair by taking,
/// per field, the most specific rule that defines it.
pub fn resolve_applicable_rule(rules: &[RiskRule], account_id: &str, symbol: &str) -> RiskRule {
    let mut resolved = RiskRule {
        rule_id: format!("resolved:{account_id}:{symbol}"),
        scope: RiskScope::Global,
        account_id: Some(account_id.to_string()),
        symbol: Some(symbol.to_string()),
        max_position_value_per_symbol: None,
        max_open_orders: None,
        max_orders_per_minute: None,
        daily_loss_limit: None,
        consecutive_order_failures_limit: None,
    };

    // Apply Global, then PerAccount, then PerSymbol — later (more specific)
    // scopes override earlier ones field-by-field, but only where the
    // more specific rule actually sets the field.
    for scope in [RiskScope::Global, RiskScope::PerAccount, RiskScope::PerSymbol] {
        for rule in rules.iter().filter(|r| r.scope == scope) {
            let applies = match scope {
                RiskScope::Global => true,
                RiskScope::PerAccount => rule.account_id.as_deref() == Some(account_id),
                RiskScope::PerSymbol => {
                    rule.account_id.as_deref() == Some(account_id)
                        && rule.symbol.as_deref() == Some(symbol)
                }
            };
            if !applies {
                continue;
            }
            if rule.max_position_value_per_symbol.is_some() {
                resolved.max_position_value_per_symbol = rule.max_position_value_per_symbol;
            }
            if rule.max_open_orders.is_some() {
                resolved.max_open_orders = rule.max_open_orders;
            }
            if rule.max_orders_per_minute.is_some() {
                resolved.max_orders_per_minute = rule.max_orders_per_minute;
            }
            if rule.daily_loss_limit.is_some() {
                resolved.daily_loss_limit = rule.daily_loss_limit;
            }
            if rule.consecutive_order_failures_limit.is_some() {
                resolved.consecutive_order_failures_limit = rule.consecutive_order_failures_limit;
            }
        }
    }

    resolved
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum KillSwitchState {
    Off,
    Armed,
    On,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct KillSwitchEvent {
    pub reason: String,
    pub triggered_at: DateTime<Utc>,
    pub evidence: Vec<(String, String)>,
}

impl KillSwitchEvent {
    pub fn new(reason: impl Into<String>, triggered_at: DateTime<Utc>) -> Self {
        Self {
            reason: reason.into(),
            triggered_at,
            evidence: Vec::new(),
        }
    }

    pub fn with_evidence(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.evidence.push((key.into(), value.to_string()));
        self
    }
}

/// Per-account (or the single global) mutable risk state.
#[derive(Clone, Debug)]
pub struct RiskState {
    pub account_id: Option<String>,
    pub kill_switch: KillSwitchState,
    pub kill_switch_reason: Option<String>,
    pub daily_pnl: Decimal,
    pub exposure: Decimal,
    pub consecutive_order_failures: i64,
    pub open_order_count: i64,
    /// Never persisted — it self-heals within its own rolling window, so a
    /// process restart losing it just means one cold window, not a stuck
    /// limit. Callers that need it to survive across calls within a process
    /// (not across restarts) hold their own cache and splice it back in via
    /// `restore_frequency_tracker`.
    order_frequency_tracker: VecDeque<DateTime<Utc>>,
    /// Optimistic-concurrency version, incremented on every mutation.
    pub version: i64,
}

impl RiskState {
    pub fn new_global() -> Self {
        Self::for_account(None)
    }

    pub fn for_account(account_id: Option<String>) -> Self {
        Self {
            account_id,
            kill_switch: KillSwitchState::Off,
            kill_switch_reason: None,
            daily_pnl: Decimal::ZERO,
            exposure: Decimal::ZERO,
            consecutive_order_failures: 0,
            open_order_count: 0,
            order_frequency_tracker: VecDeque::new(),
            version: 0,
        }
    }

    pub fn record_order_timestamp(&mut self, now: DateTime<Utc>) {
        self.order_frequency_tracker.push_back(now);
        self.prune_frequency_tracker(now);
        self.version += 1;
    }

    pub fn orders_in_last_minute(&mut self, now: DateTime<Utc>) -> i64 {
        self.prune_frequency_tracker(now);
        self.order_frequency_tracker.len() as i64
    }

    /// Snapshots the in-memory order-frequency tracker so a caller can cache
    /// it across a reload of the persisted fields (the tracker itself is
    /// never written to `risk_states`).
    pub fn frequency_tracker_snapshot(&self) -> Vec<DateTime<Utc>> {
        self.order_frequency_tracker.iter().copied().collect()
    }

    /// Restores a previously snapshotted tracker onto a freshly loaded
    /// `RiskState`, splicing process-resident, non-persisted state back into
    /// an otherwise-fresh read of the persisted fields.
    pub fn restore_frequency_tracker(&mut self, timestamps: Vec<DateTime<Utc>>) {
        self.order_frequency_tracker = timestamps.into_iter().collect();
    }

    fn prune_frequency_tracker(&mut self, now: DateTime<Utc>) {
        let cutoff = now - chrono::Duration::seconds(60);
        while matches!(self.order_frequency_tracker.front(), Some(ts) if *ts < cutoff) {
            self.order_frequency_tracker.pop_front();
        }
    }

    pub fn record_reject(&mut self) {
        self.consecutive_order_failures += 1;
        self.version += 1;
    }

    pub fn record_ack(&mut self) {
        self.consecutive_order_failures = 0;
        self.version += 1;
    }

    pub fn apply_daily_pnl_delta(&mut self, delta: Decimal) {
        self.daily_pnl += delta;
        self.version += 1;
    }

    pub fn trigger_kill_switch(&mut self, reason: impl Into<String>) {
        self.kill_switch = KillSwitchState::On;
        self.kill_switch_reason = Some(reason.into());
        self.version += 1;
    }

    pub fn toggle_kill_switch(&mut self, on: bool, reason: impl Into<String>) {
        self.kill_switch = if on {
            KillSwitchState::On
        } else {
            KillSwitchState::Off
        };
        self.kill_switch_reason = Some(reason.into());
        self.version += 1;
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReasonCode {
    KillSwitch,
    DailyLossLimit,
    MaxOpenOrders,
    MaxPositionValue,
    MaxOrderFrequency,
    ConsecutiveFailures,
    PriceUnknown,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RiskAction {
    Allow,
    Reject,
    Halt,
    FlattenAndHalt,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RiskDecision {
    pub action: RiskAction,
    pub reason: Option<ReasonCode>,
    pub rule_violated: Option<String>,
}

impl RiskDecision {
    pub fn allow() -> Self {
        Self {
            action: RiskAction::Allow,
            reason: None,
            rule_violated: None,
        }
    }

    pub fn reject(reason: ReasonCode, rule_id: impl Into<String>) -> Self {
        Self {
            action: RiskAction::Reject,
            reason: Some(reason),
            rule_violated: Some(rule_id.into()),
        }
    }

    pub fn is_approved(&self) -> bool {
        self.action == RiskAction::Allow
    }
}

/// The order the engine needs to evaluate — deliberately decoupled from
/// `kx-execution`'s `Order` so this crate has no dependency on it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RiskOrderInput {
    pub account_id: String,
    pub symbol: String,
    pub qty: i64,
    /// Price used to estimate order value; `None` for a MARKET order whose
    /// latest tick is unavailable (forces a `PriceUnknown` rejection when a
    /// position-value limit is configured).
    pub estimated_price: Option<Decimal>,
}
