//! Broker token audit trail (§6 `broker_tokens`).
//!
//! `kx_auth::TokenManager` caches and refreshes tokens entirely in memory;
//! this table is a side audit log of issued tokens, not a hot-path
//! dependency of the cache itself.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use kx_auth::{TokenAuditSink, TokenResponse as AuthTokenResponse};
use sqlx::PgPool;

#[derive(Debug, Clone)]
pub struct BrokerTokenRecord {
    pub app_key: String,
    pub paper: bool,
    pub access_token: String,
    pub token_type: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

pub async fn persist_token(pool: &PgPool, record: &BrokerTokenRecord) -> Result<()> {
    sqlx::query(
        r#"
        insert into broker_tokens (app_key, paper, access_token, token_type, issued_at, expires_at)
        values ($1,$2,$3,$4,$5,$6)
        "#,
    )
    .bind(&record.app_key)
    .bind(record.paper)
    .bind(&record.access_token)
    .bind(&record.token_type)
    .bind(record.issued_at)
    .bind(record.expires_at)
    .execute(pool)
    .await
    .context("persist_token failed")?;

    Ok(())
}

pub async fn load_latest_token(pool: &PgPool, app_key: &str, paper: bool) -> Result<Option<BrokerTokenRecord>> {
    let row: Option<(String, bool, String, String, DateTime<Utc>, DateTime<Utc>)> = sqlx::query_as(
        r#"
        select app_key, paper, access_token, token_type, issued_at, expires_at
        from broker_tokens
        where app_key = $1 and paper = $2
        order by issued_at desc
        limit 1
        "#,
    )
    .bind(app_key)
    .bind(paper)
    .fetch_optional(pool)
    .await
    .context("load_latest_token failed")?;

    Ok(row.map(|(app_key, paper, access_token, token_type, issued_at, expires_at)| BrokerTokenRecord {
        app_key,
        paper,
        access_token,
        token_type,
        issued_at,
        expires_at,
    }))
}

/// `kx_auth::TokenAuditSink` backed by `persist_token`. A write failure here
/// never propagates to the caller waiting on a token: it's an audit trail,
/// not part of the refresh path.
pub struct PgTokenAuditSink {
    pool: PgPool,
}

impl PgTokenAuditSink {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl TokenAuditSink for PgTokenAuditSink {
    async fn record(&self, app_key: &str, paper: bool, token: &AuthTokenResponse, issued_at: DateTime<Utc>) {
        let record = BrokerTokenRecord {
            app_key: app_key.to_string(),
            paper,
            access_token: token.access_token.clone(),
            token_type: token.token_type.clone(),
            issued_at,
            expires_at: issued_at + chrono::Duration::seconds(token.expires_in_secs),
        };
        if let Err(e) = persist_token(&self.pool, &record).await {
            tracing::error!(error = %e, app_key, paper, "failed to persist broker token audit record");
        }
    }
}
