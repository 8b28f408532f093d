//! Persistence for `risk_rules` (§6): the configured limits `kx_risk`
//! resolves against via `resolve_applicable_rule`.
//!
//! `kx_risk::RiskRule` carries no repository trait, so this is a plain
//! loader like [`crate::risk_state`]: rows come back as a flat `Vec`, and
//! the caller hands it straight to `resolve_applicable_rule`/`evaluate`.

use anyhow::{Context, Result};
use kx_risk::{RiskRule, RiskScope};
use rust_decimal::Decimal;
use sqlx::PgPool;

fn scope_str(scope: RiskScope) -> &'static str {
    match scope {
        RiskScope::Global => "GLOBAL",
        RiskScope::PerAccount => "PER_ACCOUNT",
        RiskScope::PerSymbol => "PER_SYMBOL",
    }
}

fn parse_scope(s: &str) -> RiskScope {
    match s {
        "PER_ACCOUNT" => RiskScope::PerAccount,
        "PER_SYMBOL" => RiskScope::PerSymbol,
        _ => RiskScope::Global,
    }
}

type RiskRuleRow = (
    String,
    String,
    Option<String>,
    Option<String>,
    Option<Decimal>,
    Option<i64>,
    Option<i64>,
    Option<Decimal>,
    Option<i64>,
);

fn row_to_rule(row: RiskRuleRow) -> RiskRule {
    let (
        rule_id,
        scope,
        account_id,
        symbol,
        max_position_value_per_symbol,
        max_open_orders,
        max_orders_per_minute,
        daily_loss_limit,
        consecutive_order_failures_limit,
    ) = row;

    RiskRule {
        rule_id,
        scope: parse_scope(&scope),
        account_id,
        symbol,
        max_position_value_per_symbol,
        max_open_orders,
        max_orders_per_minute,
        daily_loss_limit,
        consecutive_order_failures_limit,
    }
}

/// Loads every configured rule. `resolve_applicable_rule` picks the
/// applicable subset per (account, symbol) at evaluation time, so callers
/// load the whole table rather than filtering in SQL.
pub async fn load_all(pool: &PgPool) -> Result<Vec<RiskRule>> {
    let rows: Vec<RiskRuleRow> = sqlx::query_as(
        r#"
        select rule_id, scope, account_id, symbol,
               max_position_value_per_symbol, max_open_orders, max_orders_per_minute,
               daily_loss_limit, consecutive_order_failures_limit
        from risk_rules
        order by rule_id
        "#,
    )
    .fetch_all(pool)
    .await
    .context("load_all risk rules failed")?;

    Ok(rows.into_iter().map(row_to_rule).collect())
}

/// Loads `rule_id`s relevant to `account_id`: global rules plus any
/// per-account/per-symbol rule scoped to that account. Narrower than
/// [`load_all`] for a runtime that wants to avoid shipping every other
/// account's per-symbol rules into a single evaluation path.
pub async fn load_for_account(pool: &PgPool, account_id: &str) -> Result<Vec<RiskRule>> {
    let rows: Vec<RiskRuleRow> = sqlx::query_as(
        r#"
        select rule_id, scope, account_id, symbol,
               max_position_value_per_symbol, max_open_orders, max_orders_per_minute,
               daily_loss_limit, consecutive_order_failures_limit
        from risk_rules
        where scope = 'GLOBAL' or account_id = $1
        order by rule_id
        "#,
    )
    .bind(account_id)
    .fetch_all(pool)
    .await
    .context("load_for_account risk rules failed")?;

    Ok(rows.into_iter().map(row_to_rule).collect())
}

/// Upserts a rule. Used by the CLI/admin surface to seed or adjust limits
/// without a migration.
pub async fn upsert(pool: &PgPool, rule: &RiskRule) -> Result<()> {
    sqlx::query(
        r#"
        insert into risk_rules (
            rule_id, scope, account_id, symbol,
            max_position_value_per_symbol, max_open_orders, max_orders_per_minute,
            daily_loss_limit, consecutive_order_failures_limit
        ) values ($1,$2,$3,$4,$5,$6,$7,$8,$9)
        on conflict (rule_id) do update set
            scope = excluded.scope,
            account_id = excluded.account_id,
            symbol = excluded.symbol,
            max_position_value_per_symbol = excluded.max_position_value_per_symbol,
            max_open_orders = excluded.max_open_orders,
            max_orders_per_minute = excluded.max_orders_per_minute,
            daily_loss_limit = excluded.daily_loss_limit,
            consecutive_order_failures_limit = excluded.consecutive_order_failures_limit
        "#,
    )
    .bind(&rule.rule_id)
    .bind(scope_str(rule.scope))
    .bind(&rule.account_id)
    .bind(&rule.symbol)
    .bind(rule.max_position_value_per_symbol)
    .bind(rule.max_open_orders)
    .bind(rule.max_orders_per_minute)
    .bind(rule.daily_loss_limit)
    .bind(rule.consecutive_order_failures_limit)
    .execute(pool)
    .await
    .context("upsert risk rule failed")?;

    Ok(())
}
