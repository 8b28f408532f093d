//! Active strategy-evaluation target lookup (§6 `strategies`,
//! `strategy_versions`, `strategy_symbols`), feeding `kx-runtime`'s
//! scheduler tick with `kx_strategy::EvalTarget`s.

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use kx_schemas::Id;
use kx_strategy::{EvalTarget, StrategyParams, StrategySpec};
use serde_json::Value;
use sqlx::PgPool;

/// Returns every `(strategy, account, symbol)` target whose strategy
/// version is currently active, for the scheduler to drive one evaluation
/// pass over.
pub async fn active_eval_targets(pool: &PgPool) -> Result<Vec<EvalTarget>> {
    let rows: Vec<(String, String, String, i64, Value, String, String)> = sqlx::query_as(
        r#"
        select sv.strategy_version_id, sv.strategy_id, sv.engine_type, sv.timeframe_secs,
               sv.params_json, ss.account_id, ss.symbol
        from strategy_versions sv
        join strategies s on s.strategy_id = sv.strategy_id
        join strategy_symbols ss on ss.strategy_version_id = sv.strategy_version_id
        where sv.is_active
        "#,
    )
    .fetch_all(pool)
    .await
    .context("active_eval_targets failed")?;

    Ok(rows
        .into_iter()
        .map(
            |(strategy_version_id, strategy_id, engine_type, timeframe_secs, params_json, account_id, symbol)| {
                let values: BTreeMap<String, String> = match params_json {
                    Value::Object(map) => map
                        .into_iter()
                        .map(|(k, v)| (k, value_to_string(v)))
                        .collect(),
                    _ => BTreeMap::new(),
                };

                EvalTarget {
                    spec: StrategySpec {
                        strategy_id: Id::from_stored(strategy_id),
                        strategy_version_id: Id::from_stored(strategy_version_id),
                        engine_type,
                        timeframe_secs,
                        params: StrategyParams::new(values),
                    },
                    account_id,
                    symbol,
                }
            },
        )
        .collect())
}

fn value_to_string(value: Value) -> String {
    match value {
        Value::String(s) => s,
        other => other.to_string(),
    }
}
