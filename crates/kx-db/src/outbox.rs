//! Transactional Outbox (C5).
//!
//! Grounded on the teacher's `oms_outbox`/`outbox_claim_batch`/`outbox_mark_sent`
//! family: the `PENDING -> CLAIMED -> SENT/FAILED` claim protocol generalizes
//! directly to this spec's at-least-once publisher. `retry_count`/`last_error`
//! and the dead-letter threshold are additions this spec requires that the
//! teacher's outbox did not carry.
//!
//! `claim_batch` durably records the claim (`claimed_at`/`claimed_by`) in the
//! same statement that locks the rows, so the exclusivity the teacher's
//! separate CLAIMED state gave it holds across the whole claim-to-publish
//! span, not just the instant of the `SELECT`.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{PgPool, Row};

/// Dead-letter a row once its retry count reaches this many failed publish
/// attempts (§4.7: "a dead-letter threshold is configurable, default 50").
pub const DEFAULT_DEAD_LETTER_THRESHOLD: i64 = 50;

#[derive(Debug, Clone)]
pub struct OutboxRow {
    pub outbox_id: i64,
    pub event_id: String,
    pub event_type: String,
    pub occurred_at: DateTime<Utc>,
    pub payload: Value,
    pub published_at: Option<DateTime<Utc>>,
    pub claimed_at: Option<DateTime<Utc>>,
    pub claimed_by: Option<String>,
    pub retry_count: i64,
    pub last_error: Option<String>,
    pub dead_lettered: bool,
}

fn row_from(row: sqlx::postgres::PgRow) -> Result<OutboxRow, sqlx::Error> {
    Ok(OutboxRow {
        outbox_id: row.try_get("outbox_id")?,
        event_id: row.try_get("event_id")?,
        event_type: row.try_get("event_type")?,
        occurred_at: row.try_get("occurred_at")?,
        payload: row.try_get("payload")?,
        published_at: row.try_get("published_at")?,
        claimed_at: row.try_get("claimed_at")?,
        claimed_by: row.try_get("claimed_by")?,
        retry_count: row.try_get("retry_count")?,
        last_error: row.try_get("last_error")?,
        dead_lettered: row.try_get("dead_lettered")?,
    })
}

const SELECT_COLUMNS: &str = "outbox_id, event_id, event_type, occurred_at, payload, published_at, \
     claimed_at, claimed_by, retry_count, last_error, dead_lettered";

/// Writes one outbox row within the caller's transaction, satisfying I7
/// ("events emitted atomically with the state change that produced them").
/// Callers append this alongside their own state-row writes on the same
/// `sqlx::Transaction`.
pub async fn append_event(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    event_id: &str,
    event_type: &str,
    occurred_at: DateTime<Utc>,
    payload: Value,
) -> Result<()> {
    sqlx::query(
        r#"
        insert into event_outbox (event_id, event_type, occurred_at, payload)
        values ($1, $2, $3, $4)
        on conflict (event_id) do nothing
        "#,
    )
    .bind(event_id)
    .bind(event_type)
    .bind(occurred_at)
    .bind(payload)
    .execute(&mut **tx)
    .await
    .context("append_event failed")?;
    Ok(())
}

/// Atomically claims up to `batch_size` unpublished, unclaimed (or
/// stale-claimed) rows for exclusive dispatch by `dispatcher_id`, oldest
/// first.
///
/// The inner `SELECT ... FOR UPDATE SKIP LOCKED` picks candidate rows and
/// locks them against concurrent claimants; the outer `UPDATE` stamps
/// `claimed_at`/`claimed_by` in the same statement, so the claim survives
/// past the transaction that took it. A claim older than
/// `stale_after_secs` is treated as abandoned (dispatcher crashed
/// mid-publish) and is eligible for re-claim by anyone.
pub async fn claim_batch(
    pool: &PgPool,
    dispatcher_id: &str,
    batch_size: i64,
    stale_after_secs: i64,
) -> Result<Vec<OutboxRow>> {
    let rows = sqlx::query(&format!(
        r#"
        update event_outbox
           set claimed_at = now(), claimed_by = $1
         where outbox_id in (
             select outbox_id
             from event_outbox
             where published_at is null
               and not dead_lettered
               and (claimed_at is null or claimed_at < now() - make_interval(secs => $3))
             order by occurred_at asc
             limit $2
             for update skip locked
         )
         returning {SELECT_COLUMNS}
        "#
    ))
    .bind(dispatcher_id)
    .bind(batch_size)
    .bind(stale_after_secs)
    .fetch_all(pool)
    .await
    .context("claim_batch failed")?;

    rows.into_iter().map(|r| row_from(r).map_err(Into::into)).collect()
}

/// Releases a claim without publishing, returning the row to the pool for
/// the next dispatcher (used when a publish attempt is abandoned cleanly
/// rather than left to expire via `stale_after_secs`).
pub async fn release_claim(pool: &PgPool, event_id: &str) -> Result<bool> {
    let row: Option<(i64,)> = sqlx::query_as(
        r#"
        update event_outbox
           set claimed_at = null, claimed_by = null
         where event_id = $1
           and published_at is null
        returning outbox_id
        "#,
    )
    .bind(event_id)
    .fetch_optional(pool)
    .await
    .context("release_claim failed")?;
    Ok(row.is_some())
}

/// Marks a row published after a successful bus send.
pub async fn mark_published(pool: &PgPool, event_id: &str) -> Result<bool> {
    let row: Option<(i64,)> = sqlx::query_as(
        r#"
        update event_outbox
           set published_at = now()
         where event_id = $1
           and published_at is null
        returning outbox_id
        "#,
    )
    .bind(event_id)
    .fetch_optional(pool)
    .await
    .context("mark_published failed")?;
    Ok(row.is_some())
}

/// Records a failed publish attempt: increments `retry_count`, stores
/// `last_error`, releases the claim so the row is immediately eligible for
/// a retry by the next `claim_batch` call, and dead-letters the row once
/// `threshold` is reached.
pub async fn record_publish_failure(
    pool: &PgPool,
    event_id: &str,
    error: &str,
    threshold: i64,
) -> Result<bool> {
    let row: Option<(i64, i64)> = sqlx::query_as(
        r#"
        update event_outbox
           set retry_count = retry_count + 1,
               last_error = $2,
               dead_lettered = (retry_count + 1) >= $3,
               claimed_at = null,
               claimed_by = null
         where event_id = $1
         returning outbox_id, retry_count
        "#,
    )
    .bind(event_id)
    .bind(error)
    .bind(threshold)
    .fetch_optional(pool)
    .await
    .context("record_publish_failure failed")?;

    Ok(row.map(|(_, retry_count)| retry_count >= threshold).unwrap_or(false))
}

/// Lists undispatched rows (not yet published, not dead-lettered) for
/// recovery/inspection, oldest first.
pub async fn list_unpublished(pool: &PgPool) -> Result<Vec<OutboxRow>> {
    let rows = sqlx::query(&format!(
        r#"
        select {SELECT_COLUMNS}
        from event_outbox
        where published_at is null and not dead_lettered
        order by occurred_at asc
        "#
    ))
    .fetch_all(pool)
    .await
    .context("list_unpublished failed")?;

    rows.into_iter().map(|r| row_from(r).map_err(Into::into)).collect()
}

/// Fetches a single row by its event id (for tests and debugging).
pub async fn fetch_by_event_id(pool: &PgPool, event_id: &str) -> Result<Option<OutboxRow>> {
    let row = sqlx::query(&format!("select {SELECT_COLUMNS} from event_outbox where event_id = $1"))
        .bind(event_id)
        .fetch_optional(pool)
        .await
        .context("fetch_by_event_id failed")?;

    row.map(row_from).transpose().map_err(Into::into)
}
