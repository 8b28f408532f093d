//! Persistence for per-account/global risk state (§6 `risk_states`).
//!
//! `kx_risk::RiskState` has no repository trait either, and its
//! `order_frequency_tracker` field is private with no public setter. This
//! store does not attempt to persist it: on load the tracker starts empty,
//! which is conservative (briefly under-restrictive rather than
//! over-restrictive) and self-heals within the tracker's own 60s window.
//!
//! Writes use `version` for optimistic concurrency (§5): `save` only
//! applies when the stored `version` still matches what the caller read,
//! and the caller retries on a `false` return.

use anyhow::{Context, Result};
use kx_risk::{KillSwitchState, RiskState};
use rust_decimal::Decimal;
use sqlx::PgPool;

/// Reserved key for the single global (account-less) risk state row.
const GLOBAL_KEY: &str = "";

fn account_key(account_id: Option<&str>) -> &str {
    account_id.unwrap_or(GLOBAL_KEY)
}

fn kill_switch_str(state: KillSwitchState) -> &'static str {
    match state {
        KillSwitchState::Off => "OFF",
        KillSwitchState::Armed => "ARMED",
        KillSwitchState::On => "ON",
    }
}

fn parse_kill_switch(s: &str) -> KillSwitchState {
    match s {
        "ARMED" => KillSwitchState::Armed,
        "ON" => KillSwitchState::On,
        _ => KillSwitchState::Off,
    }
}

/// Loads the risk state for `account_id` (`None` for the global scope),
/// creating a fresh `RiskState` in memory if no row exists yet. The caller
/// is responsible for inserting it on first save.
pub async fn load_or_default(pool: &PgPool, account_id: Option<&str>) -> Result<RiskState> {
    let key = account_key(account_id);
    let row: Option<(String, Option<String>, Decimal, Decimal, i64, i64, i64)> = sqlx::query_as(
        r#"
        select kill_switch, kill_switch_reason, daily_pnl, exposure,
               consecutive_order_failures, open_order_count, version
        from risk_states
        where account_id = $1
        "#,
    )
    .bind(key)
    .fetch_optional(pool)
    .await
    .context("load_or_default failed")?;

    let Some((kill_switch, kill_switch_reason, daily_pnl, exposure, consecutive_order_failures, open_order_count, version)) =
        row
    else {
        return Ok(RiskState::for_account(account_id.map(str::to_string)));
    };

    let mut state = RiskState::for_account(account_id.map(str::to_string));
    state.kill_switch = parse_kill_switch(&kill_switch);
    state.kill_switch_reason = kill_switch_reason;
    state.daily_pnl = daily_pnl;
    state.exposure = exposure;
    state.consecutive_order_failures = consecutive_order_failures;
    state.open_order_count = open_order_count;
    state.version = version;
    Ok(state)
}

/// Inserts the row for an account seen for the first time.
pub async fn insert(pool: &PgPool, state: &RiskState) -> Result<()> {
    let key = account_key(state.account_id.as_deref());
    sqlx::query(
        r#"
        insert into risk_states (
            account_id, kill_switch, kill_switch_reason, daily_pnl, exposure,
            consecutive_order_failures, open_order_count, version, updated_at
        ) values ($1,$2,$3,$4,$5,$6,$7,$8, now())
        on conflict (account_id) do nothing
        "#,
    )
    .bind(key)
    .bind(kill_switch_str(state.kill_switch))
    .bind(&state.kill_switch_reason)
    .bind(state.daily_pnl)
    .bind(state.exposure)
    .bind(state.consecutive_order_failures)
    .bind(state.open_order_count)
    .bind(state.version)
    .execute(pool)
    .await
    .context("insert risk state failed")?;

    Ok(())
}

/// Saves `state` iff the stored `version` equals `expected_version`.
/// Returns `false` on a version mismatch (caller reloads and retries).
pub async fn save_if_version_matches(pool: &PgPool, state: &RiskState, expected_version: i64) -> Result<bool> {
    let key = account_key(state.account_id.as_deref());
    let result = sqlx::query(
        r#"
        update risk_states set
            kill_switch = $2,
            kill_switch_reason = $3,
            daily_pnl = $4,
            exposure = $5,
            consecutive_order_failures = $6,
            open_order_count = $7,
            version = $8,
            updated_at = now()
        where account_id = $1 and version = $9
        "#,
    )
    .bind(key)
    .bind(kill_switch_str(state.kill_switch))
    .bind(&state.kill_switch_reason)
    .bind(state.daily_pnl)
    .bind(state.exposure)
    .bind(state.consecutive_order_failures)
    .bind(state.open_order_count)
    .bind(state.version)
    .bind(expected_version)
    .execute(pool)
    .await
    .context("save_if_version_matches failed")?;

    Ok(result.rows_affected() > 0)
}

/// Transaction-taking twin of `save_if_version_matches`, for callers that
/// need this write to land atomically alongside another row (a new order,
/// a kill-switch-toggle outbox event).
pub async fn save_if_version_matches_tx(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    state: &RiskState,
    expected_version: i64,
) -> Result<bool> {
    let key = account_key(state.account_id.as_deref());
    let result = sqlx::query(
        r#"
        update risk_states set
            kill_switch = $2,
            kill_switch_reason = $3,
            daily_pnl = $4,
            exposure = $5,
            consecutive_order_failures = $6,
            open_order_count = $7,
            version = $8,
            updated_at = now()
        where account_id = $1 and version = $9
        "#,
    )
    .bind(key)
    .bind(kill_switch_str(state.kill_switch))
    .bind(&state.kill_switch_reason)
    .bind(state.daily_pnl)
    .bind(state.exposure)
    .bind(state.consecutive_order_failures)
    .bind(state.open_order_count)
    .bind(state.version)
    .bind(expected_version)
    .execute(&mut **tx)
    .await
    .context("save_if_version_matches_tx failed")?;

    Ok(result.rows_affected() > 0)
}
