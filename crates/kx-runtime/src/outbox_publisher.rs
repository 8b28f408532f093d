//! Outbox publisher (§4.7): polls undispatched rows and hands them to an
//! `EventPublisher`, marking published/failed per the claim protocol in
//! `kx-db::outbox`.

use std::sync::Arc;
use std::time::Duration;

use kx_db::outbox;
use sqlx::PgPool;

/// The external bus boundary. Left abstract: this spec's scope is the
/// outbox's own claim/retry/dead-letter machinery, not a specific message
/// broker's wire protocol.
#[async_trait::async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, event_type: &str, event_id: &str, payload: &serde_json::Value) -> Result<(), String>;
}

/// Publishes by logging at info level. Stands in for a real bus adapter
/// (Kafka, SNS, whatever the deployment wires in) without this crate
/// depending on one.
pub struct LoggingPublisher;

#[async_trait::async_trait]
impl EventPublisher for LoggingPublisher {
    async fn publish(&self, event_type: &str, event_id: &str, payload: &serde_json::Value) -> Result<(), String> {
        tracing::info!(event_type, event_id, %payload, "publishing outbox event");
        Ok(())
    }
}

/// Runs one claim-publish-ack pass. Returns the number of rows processed.
pub async fn publish_batch(
    pool: &PgPool,
    publisher: &dyn EventPublisher,
    dispatcher_id: &str,
    batch_size: i64,
    retry_limit: i64,
    stale_after_secs: i64,
) -> anyhow::Result<usize> {
    let rows = outbox::claim_batch(pool, dispatcher_id, batch_size, stale_after_secs).await?;
    let count = rows.len();

    for row in rows {
        match publisher.publish(&row.event_type, &row.event_id, &row.payload).await {
            Ok(()) => {
                outbox::mark_published(pool, &row.event_id).await?;
            }
            Err(err) => {
                let dead_lettered =
                    outbox::record_publish_failure(pool, &row.event_id, &err, retry_limit).await?;
                if dead_lettered {
                    tracing::error!(event_id = row.event_id, "outbox row dead-lettered after repeated publish failures");
                } else {
                    tracing::warn!(event_id = row.event_id, error = %err, "outbox publish failed, will retry");
                }
            }
        }
    }

    Ok(count)
}

/// Spawns the publisher's own poll loop.
pub fn spawn_publisher_loop(
    pool: PgPool,
    publisher: Arc<dyn EventPublisher>,
    dispatcher_id: String,
    interval: Duration,
    batch_size: i64,
    retry_limit: i64,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            let stale_after_secs = 60;
            if let Err(err) =
                publish_batch(&pool, publisher.as_ref(), &dispatcher_id, batch_size, retry_limit, stale_after_secs).await
            {
                tracing::error!(%err, "outbox publish pass failed");
            }
        }
    })
}
