//! Postgres-backed `kx_strategy::SignalStore` and `kx_strategy::BarSource`
//! (§6 `signals`, `bars`).
//!
//! `PgBarSource` is the persistent fallback behind the in-memory
//! `kx_marketdata::BarRing` (§4.5 step 2: bars come from C3 first, then the
//! persistent store).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use kx_schemas::Id;
use kx_strategy::{Bar, BarSource, Signal, SignalStore, SignalStoreError, SignalType};
use sqlx::PgPool;

fn signal_type_str(signal_type: SignalType) -> &'static str {
    match signal_type {
        SignalType::Buy => "BUY",
        SignalType::Sell => "SELL",
        SignalType::Hold => unreachable!("HOLD signals are never persisted"),
    }
}

fn parse_signal_type(s: &str) -> Result<SignalType, SignalStoreError> {
    match s {
        "BUY" => Ok(SignalType::Buy),
        "SELL" => Ok(SignalType::Sell),
        other => Err(SignalStoreError::Backend(format!("unknown signal_type '{other}'"))),
    }
}

pub struct PgSignalStore {
    pool: PgPool,
}

impl PgSignalStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SignalStore for PgSignalStore {
    async fn recent_signals(
        &self,
        strategy_id: &Id,
        symbol: &str,
        lookback_secs: i64,
        now: DateTime<Utc>,
    ) -> Result<Vec<Signal>, SignalStoreError> {
        let cutoff = now - chrono::Duration::seconds(lookback_secs);
        let rows: Vec<(String, String, String, String, String, String, i64, String, DateTime<Utc>)> = sqlx::query_as(
            r#"
            select signal_id, strategy_id, strategy_version_id, account_id, symbol,
                   signal_type, ttl_seconds, reason, created_at
            from signals
            where strategy_id = $1 and symbol = $2 and created_at >= $3
            order by created_at asc
            "#,
        )
        .bind(strategy_id.as_str())
        .bind(symbol)
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| SignalStoreError::Backend(e.to_string()))?;

        rows.into_iter()
            .map(
                |(signal_id, strategy_id, strategy_version_id, account_id, symbol, signal_type, ttl_seconds, reason, created_at)| {
                    Ok(Signal {
                        signal_id: Id::from_stored(signal_id),
                        strategy_id: Id::from_stored(strategy_id),
                        strategy_version_id: Id::from_stored(strategy_version_id),
                        account_id,
                        symbol,
                        signal_type: parse_signal_type(&signal_type)?,
                        ttl_seconds,
                        reason,
                        created_at,
                    })
                },
            )
            .collect()
    }

    async fn persist(&self, signal: &Signal) -> Result<(), SignalStoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| SignalStoreError::Backend(e.to_string()))?;

        sqlx::query(
            r#"
            insert into signals (
                signal_id, strategy_id, strategy_version_id, account_id, symbol,
                signal_type, ttl_seconds, reason, created_at
            ) values ($1,$2,$3,$4,$5,$6,$7,$8,$9)
            "#,
        )
        .bind(signal.signal_id.as_str())
        .bind(signal.strategy_id.as_str())
        .bind(signal.strategy_version_id.as_str())
        .bind(&signal.account_id)
        .bind(&signal.symbol)
        .bind(signal_type_str(signal.signal_type))
        .bind(signal.ttl_seconds)
        .bind(&signal.reason)
        .bind(signal.created_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| SignalStoreError::Backend(e.to_string()))?;

        let payload = serde_json::json!({
            "signal_id": signal.signal_id.as_str(),
            "strategy_id": signal.strategy_id.as_str(),
            "account_id": signal.account_id,
            "symbol": signal.symbol,
            "signal_type": signal_type_str(signal.signal_type),
        });
        crate::outbox::append_event(&mut tx, signal.signal_id.as_str(), "SignalGenerated", signal.created_at, payload)
            .await
            .map_err(|e| SignalStoreError::Backend(e.to_string()))?;

        tx.commit().await.map_err(|e| SignalStoreError::Backend(e.to_string()))?;
        Ok(())
    }
}

pub struct PgBarSource {
    pool: PgPool,
}

impl PgBarSource {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Persists one closed bar, keyed on `(symbol, timeframe_secs, end_ts)`.
    pub async fn persist_bar(&self, symbol: &str, bar: &kx_marketdata::ClosedBar) -> Result<(), SignalStoreError> {
        sqlx::query(
            r#"
            insert into bars (symbol, timeframe_secs, end_ts, open, high, low, close, volume)
            values ($1,$2,$3,$4,$5,$6,$7,$8)
            on conflict (symbol, timeframe_secs, end_ts) do nothing
            "#,
        )
        .bind(symbol)
        .bind(bar.symbol_timeframe_secs)
        .bind(bar.end_ts)
        .bind(bar.open)
        .bind(bar.high)
        .bind(bar.low)
        .bind(bar.close)
        .bind(bar.volume)
        .execute(&self.pool)
        .await
        .map_err(|e| SignalStoreError::Backend(e.to_string()))?;

        Ok(())
    }
}

#[async_trait]
impl BarSource for PgBarSource {
    async fn recent_bars(&self, symbol: &str, timeframe_secs: i64, n: usize) -> Result<Vec<Bar>, SignalStoreError> {
        let rows: Vec<(DateTime<Utc>, rust_decimal::Decimal, i64)> = sqlx::query_as(
            r#"
            select end_ts, close, volume
            from bars
            where symbol = $1 and timeframe_secs = $2
            order by end_ts desc
            limit $3
            "#,
        )
        .bind(symbol)
        .bind(timeframe_secs)
        .bind(n as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| SignalStoreError::Backend(e.to_string()))?;

        let mut bars: Vec<Bar> = rows
            .into_iter()
            .map(|(end_ts, close, volume)| Bar::new(end_ts, close, volume))
            .collect();
        bars.reverse();
        Ok(bars)
    }
}
