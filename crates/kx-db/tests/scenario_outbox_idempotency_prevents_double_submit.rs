use chrono::Utc;
use serde_json::json;
use uuid::Uuid;

#[tokio::test]
async fn outbox_event_id_dedupes_inserts() -> anyhow::Result<()> {
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
    let now = Utc::now();

    let mut tx = pool.begin().await?;
    kx_db::outbox::append_event(&mut tx, &event_id, "OrderSent", now, json!({"symbol": "SPY"})).await?;
    tx.commit().await?;

    // Retry with the same event_id must not create a second row.
    let mut tx = pool.begin().await?;
    kx_db::outbox::append_event(&mut tx, &event_id, "OrderSent", now, json!({"symbol": "SPY"})).await?;
    tx.commit().await?;

    let row = kx_db::outbox::fetch_by_event_id(&pool, &event_id).await?;
    assert!(row.is_some(), "expected outbox row to exist");
    assert_eq!(row.unwrap().event_id, event_id);

    Ok(())
}
