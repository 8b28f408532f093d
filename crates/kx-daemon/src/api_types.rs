//! Wire DTOs for the HTTP control plane. Kept separate from `kx-risk` /
//! `kx-strategy`'s own types because not everything there derives
//! `Serialize` (`RiskState` notably doesn't, since it carries an internal
//! order-frequency tracker nobody outside the crate needs on the wire).

use std::collections::BTreeMap;

use kx_risk::{KillSwitchState, RiskState};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub ok: bool,
    pub service: &'static str,
    pub version: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusResponse {
    pub service: &'static str,
    pub version: &'static str,
    pub uptime_secs: u64,
    pub risk: RiskStateView,
}

/// Public projection of `RiskState`, leaving out the frequency tracker.
#[derive(Debug, Clone, Serialize)]
pub struct RiskStateView {
    pub account_id: Option<String>,
    pub kill_switch: KillSwitchState,
    pub kill_switch_reason: Option<String>,
    pub daily_pnl: String,
    pub exposure: String,
    pub consecutive_order_failures: i64,
    pub open_order_count: i64,
    pub version: i64,
}

impl From<&RiskState> for RiskStateView {
    fn from(s: &RiskState) -> Self {
        Self {
            account_id: s.account_id.clone(),
            kill_switch: s.kill_switch,
            kill_switch_reason: s.kill_switch_reason.clone(),
            daily_pnl: s.daily_pnl.to_string(),
            exposure: s.exposure.to_string(),
            consecutive_order_failures: s.consecutive_order_failures,
            open_order_count: s.open_order_count,
            version: s.version,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct KillSwitchRequest {
    pub on: bool,
    pub reason: String,
    #[serde(default)]
    pub account_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct KillSwitchResponse {
    pub risk: RiskStateView,
}

/// Body for POST /v1/strategy/trigger: the identity of one (strategy,
/// account, symbol) evaluation target plus its flat param map, mirroring
/// `kx_strategy::StrategySpec`/`StrategyParams` without pulling their
/// opaque internal map type across the wire boundary.
#[derive(Debug, Clone, Deserialize)]
pub struct StrategyTriggerRequest {
    pub strategy_id: String,
    pub strategy_version_id: String,
    pub engine_type: String,
    pub timeframe_secs: i64,
    pub account_id: String,
    pub symbol: String,
    #[serde(default)]
    pub params: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}
