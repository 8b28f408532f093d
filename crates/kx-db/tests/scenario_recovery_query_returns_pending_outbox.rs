use chrono::Utc;
use serde_json::json;
use uuid::Uuid;

#[tokio::test]
async fn recovery_query_returns_pending_outbox() -> anyhow::Result<()> {
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

    let now = Utc::now();
    let k1 = format!("order:{}:SENT", Uuid::new_v4());
    let k2 = format!("order:{}:SENT", Uuid::new_v4());

    let mut tx = pool.begin().await?;
    kx_db::outbox::append_event(&mut tx, &k1, "OrderSent", now, json!({"sym": "SPY"})).await?;
    kx_db::outbox::append_event(&mut tx, &k2, "OrderSent", now, json!({"sym": "QQQ"})).await?;
    tx.commit().await?;

    // Claim and publish k1; k2 stays pending.
    let claimed = kx_db::outbox::claim_batch(&pool, "test-dispatcher", 1, 300).await?;
    assert_eq!(claimed.len(), 1, "must claim exactly one row");
    kx_db::outbox::mark_published(&pool, &claimed[0].event_id).await?;

    let pending = kx_db::outbox::list_unpublished(&pool).await?;
    assert!(
        pending.iter().any(|r| r.event_id == k2),
        "expected the unclaimed row to remain pending"
    );
    assert!(
        !pending.iter().any(|r| r.event_id == claimed[0].event_id),
        "the published row must no longer be pending"
    );

    Ok(())
}
