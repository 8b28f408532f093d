//! Scenario: outbox-first publish protocol.
//!
//! A row is written by `append_event` before anything external is ever
//! attempted; a crash between write and publish leaves the row pending,
//! discoverable, and replayable exactly once.

use chrono::Utc;
use serde_json::json;
use uuid::Uuid;

#[tokio::test]
async fn outbox_row_is_pending_before_publish_and_moves_to_published() -> anyhow::Result<()> {
    let url = match std::env::var(kx_db::ENV_DB_URL) {
        Ok(v) => v,
        Err(_) => {
            eprintln!("SKIP: KX_DATABASE_URL not set");
            return Ok(());
        }
    };

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(2)
        .connect(&url)
        .await?;
    kx_db::migrate(&pool).await?;

    let event_id = format!("order:{}:SENT", Uuid::new_v4());

    let mut tx = pool.begin().await?;
    kx_db::outbox::append_event(&mut tx, &event_id, "OrderSent", Utc::now(), json!({"symbol": "SPY", "qty": 100})).await?;
    tx.commit().await?;

    let row = kx_db::outbox::fetch_by_event_id(&pool, &event_id).await?.expect("row must exist");
    assert!(row.published_at.is_none(), "row must be unpublished before dispatch");

    let claimed = kx_db::outbox::claim_batch(&pool, "test-dispatcher", 1, 300).await?;
    assert_eq!(claimed.len(), 1, "dispatcher must claim exactly one row");
    assert_eq!(claimed[0].event_id, event_id);
    assert!(claimed[0].claimed_by.as_deref() == Some("test-dispatcher"));

    let marked = kx_db::outbox::mark_published(&pool, &event_id).await?;
    assert!(marked, "mark_published must succeed");

    let row2 = kx_db::outbox::fetch_by_event_id(&pool, &event_id).await?.expect("row must still exist");
    assert!(row2.published_at.is_some(), "row must be published after dispatch");

    Ok(())
}
