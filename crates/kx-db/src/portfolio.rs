//! Persistence for the fill-applier's outputs (C8/C9): `fills`, `positions`,
//! `pnl_ledger`, `portfolio_snapshots`.
//!
//! `kx_portfolio::Ledger` is a pure in-memory engine with no repository
//! trait of its own, so this is plain functions called by the runtime after
//! each `Ledger::append_fill`, not a trait impl. `persist_fill`,
//! `upsert_position`, and `append_ledger_entry` each take the caller's open
//! transaction rather than a bare pool: a fill's three writes (plus the
//! outbox events it produces) must commit or roll back together.

use anyhow::{Context, Result};
use kx_portfolio::{Fill, LedgerEntry, LedgerEventType, PortfolioSnapshot, PositionState};
use kx_schemas::Side;
use sqlx::PgPool;

fn side_str(side: Side) -> &'static str {
    match side {
        Side::Buy => "BUY",
        Side::Sell => "SELL",
    }
}

fn event_type_str(event_type: LedgerEventType) -> &'static str {
    match event_type {
        LedgerEventType::Fill => "FILL",
        LedgerEventType::Fee => "FEE",
        LedgerEventType::Tax => "TAX",
        LedgerEventType::Adjust => "ADJUST",
    }
}

/// Inserts a fill row. The `fills` natural-key unique index makes this a
/// no-op on replay (I5), mirroring `Ledger`'s in-memory dedup.
pub async fn persist_fill(tx: &mut sqlx::Transaction<'_, sqlx::Postgres>, fill: &Fill) -> Result<bool> {
    let result = sqlx::query(
        r#"
        insert into fills (
            order_id, account_id, symbol, side, fill_price, fill_qty, fee, tax, fill_timestamp
        ) values ($1,$2,$3,$4,$5,$6,$7,$8,$9)
        on conflict (order_id, fill_timestamp, fill_price, fill_qty) do nothing
        "#,
    )
    .bind(&fill.order_id)
    .bind(&fill.account_id)
    .bind(&fill.symbol)
    .bind(side_str(fill.side))
    .bind(fill.price)
    .bind(fill.qty)
    .bind(fill.fee)
    .bind(fill.tax)
    .bind(fill.fill_timestamp)
    .execute(&mut **tx)
    .await
    .context("persist_fill failed")?;

    Ok(result.rows_affected() > 0)
}

/// Upserts the current position snapshot for `(account_id, symbol)`.
pub async fn upsert_position(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    account_id: &str,
    position: &PositionState,
) -> Result<()> {
    sqlx::query(
        r#"
        insert into positions (account_id, symbol, qty, avg_price, realized_pnl, updated_at)
        values ($1, $2, $3, $4, $5, now())
        on conflict (account_id, symbol) do update set
            qty = excluded.qty,
            avg_price = excluded.avg_price,
            realized_pnl = excluded.realized_pnl,
            updated_at = now()
        "#,
    )
    .bind(account_id)
    .bind(&position.symbol)
    .bind(position.qty)
    .bind(position.avg_price)
    .bind(position.realized_pnl)
    .execute(&mut **tx)
    .await
    .context("upsert_position failed")?;

    Ok(())
}

/// Loads every persisted position for an account (restart recovery).
pub async fn load_positions(pool: &PgPool, account_id: &str) -> Result<Vec<PositionState>> {
    let rows: Vec<(String, i64, rust_decimal::Decimal, rust_decimal::Decimal)> = sqlx::query_as(
        r#"
        select symbol, qty, avg_price, realized_pnl
        from positions
        where account_id = $1
        "#,
    )
    .bind(account_id)
    .fetch_all(pool)
    .await
    .context("load_positions failed")?;

    Ok(rows
        .into_iter()
        .map(|(symbol, qty, avg_price, realized_pnl)| PositionState {
            symbol,
            qty,
            avg_price,
            realized_pnl,
        })
        .collect())
}

/// Appends one ledger row to the append-only audit trail.
pub async fn append_ledger_entry(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    account_id: &str,
    entry: &LedgerEntry,
) -> Result<()> {
    sqlx::query(
        r#"
        insert into pnl_ledger (account_id, symbol, event_type, amount, ref_id, event_timestamp)
        values ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(account_id)
    .bind(&entry.symbol)
    .bind(event_type_str(entry.event_type))
    .bind(entry.amount)
    .bind(&entry.ref_id)
    .bind(entry.event_timestamp)
    .execute(&mut **tx)
    .await
    .context("append_ledger_entry failed")?;

    Ok(())
}

/// Inserts a point-in-time account snapshot.
pub async fn insert_snapshot(pool: &PgPool, snapshot: &PortfolioSnapshot) -> Result<()> {
    sqlx::query(
        r#"
        insert into portfolio_snapshots (
            account_id, cash, total_value, realized_pnl, unrealized_pnl, taken_at
        ) values ($1,$2,$3,$4,$5,$6)
        "#,
    )
    .bind(&snapshot.account_id)
    .bind(snapshot.cash)
    .bind(snapshot.total_value)
    .bind(snapshot.realized_pnl)
    .bind(snapshot.unrealized_pnl)
    .bind(snapshot.timestamp)
    .execute(pool)
    .await
    .context("insert_snapshot failed")?;

    Ok(())
}
