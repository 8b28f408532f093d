//! Per-account risk state loading and optimistic-concurrency save retry
//! (§5: "optimistic concurrency via version column, retry on conflict").

use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use kx_risk::{RiskRule, RiskState};
use sqlx::PgPool;

/// How many times to reload-and-retry a `save_if_version_matches` conflict
/// before giving up. A real conflict storm past this count means something
/// else is wrong (e.g. two processes racing the same account).
const MAX_SAVE_RETRIES: u32 = 5;

/// Loads the rule set applicable to `account_id`, falling back to the
/// built-in sane defaults if no rows are configured yet so a fresh
/// deployment isn't wide open.
pub async fn load_rules(pool: &PgPool, account_id: &str) -> Result<Vec<RiskRule>> {
    let rules = kx_db::risk_rules::load_for_account(pool, account_id).await?;
    if rules.is_empty() {
        Ok(vec![RiskRule::global_sane_defaults()])
    } else {
        Ok(rules)
    }
}

pub async fn load_state(pool: &PgPool, account_id: Option<&str>) -> Result<RiskState> {
    let state = kx_db::risk_state::load_or_default(pool, account_id).await?;
    if state.version == 0 {
        kx_db::risk_state::insert(pool, &state).await?;
    }
    Ok(state)
}

/// Toggles the kill switch, retrying on version conflicts, and appends a
/// `KillSwitchToggled` outbox event atomically with the save that commits
/// it (§4.1: the event is emitted either way — whether the switch is turned
/// on or off).
pub async fn toggle_kill_switch_and_emit(
    pool: &PgPool,
    account_id: Option<&str>,
    on: bool,
    reason: String,
    now: DateTime<Utc>,
) -> Result<RiskState> {
    let mut attempt = 0;
    loop {
        attempt += 1;
        let mut state = load_state(pool, account_id).await?;
        let expected_version = state.version;
        state.toggle_kill_switch(on, reason.clone());

        let mut tx = pool.begin().await?;
        let committed =
            kx_db::risk_state::save_if_version_matches_tx(&mut tx, &state, expected_version).await?;
        if committed {
            let event_id = format!("kill_switch:{}:{}", account_id.unwrap_or("<global>"), state.version);
            let payload = serde_json::json!({
                "account_id": account_id,
                "on": on,
                "reason": state.kill_switch_reason,
                "version": state.version,
            });
            kx_db::outbox::append_event(&mut tx, &event_id, "KillSwitchToggled", now, payload).await?;
            tx.commit().await?;
            return Ok(state);
        }
        tx.rollback().await?;

        if attempt >= MAX_SAVE_RETRIES {
            bail!("risk state save conflict persisted after {MAX_SAVE_RETRIES} retries");
        }
        tracing::warn!(attempt, ?account_id, "risk state version conflict, retrying");
    }
}
