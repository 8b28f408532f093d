//! Broker token lifecycle (C12).
//!
//! `AuthClient` is the wire boundary (left unimplemented here — encoding the
//! broker's actual auth request is out of scope); `TokenManager` owns the
//! refresh-before-expiry policy every broker call sits behind.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use kx_schemas::Clock;
use tokio::sync::Mutex;

/// Issued by the broker's auth endpoint.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TokenResponse {
    pub access_token: String,
    pub expires_in_secs: i64,
    pub token_type: String,
}

#[derive(Debug)]
pub enum AuthError {
    Transport(String),
    Rejected { code: Option<String>, message: String },
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthError::Transport(msg) => write!(f, "auth transport error: {msg}"),
            AuthError::Rejected {
                code: Some(c),
                message,
            } => write!(f, "auth rejected ({c}): {message}"),
            AuthError::Rejected { code: None, message } => write!(f, "auth rejected: {message}"),
        }
    }
}

impl std::error::Error for AuthError {}

/// Wire boundary for issuing broker tokens. Left to the concrete broker
/// adapter to implement; the paper broker never needs tokens and does not
/// implement this trait.
#[async_trait::async_trait]
pub trait AuthClient: Send + Sync {
    async fn issue_token(
        &self,
        app_key: &str,
        app_secret: &str,
        paper: bool,
    ) -> Result<TokenResponse, AuthError>;

    async fn issue_approval_key(&self, app_key: &str, app_secret: &str) -> Result<String, AuthError>;
}

/// Side audit trail for issued tokens (kept separate from the cache itself:
/// a sink failure never blocks a caller waiting on `access_token`).
#[async_trait::async_trait]
pub trait TokenAuditSink: Send + Sync {
    async fn record(&self, app_key: &str, paper: bool, token: &TokenResponse, issued_at: DateTime<Utc>);
}

struct CachedToken {
    token: TokenResponse,
    issued_at: DateTime<Utc>,
}

/// Caches the current broker token and refreshes it a configurable margin
/// before expiry. Concurrent callers share a single in-flight refresh via the
/// mutex rather than each triggering their own.
pub struct TokenManager {
    client: Arc<dyn AuthClient>,
    clock: Arc<dyn Clock>,
    app_key: String,
    app_secret: String,
    paper: bool,
    refresh_margin: Duration,
    cached: Mutex<Option<CachedToken>>,
    audit_sink: Option<Arc<dyn TokenAuditSink>>,
}

impl TokenManager {
    pub fn new(
        client: Arc<dyn AuthClient>,
        clock: Arc<dyn Clock>,
        app_key: impl Into<String>,
        app_secret: impl Into<String>,
        paper: bool,
        refresh_margin: Duration,
    ) -> Self {
        Self {
            client,
            clock,
            app_key: app_key.into(),
            app_secret: app_secret.into(),
            paper,
            refresh_margin,
            cached: Mutex::new(None),
            audit_sink: None,
        }
    }

    /// Attaches an audit sink every successful refresh is recorded to.
    pub fn with_audit_sink(mut self, sink: Arc<dyn TokenAuditSink>) -> Self {
        self.audit_sink = Some(sink);
        self
    }

    /// Returns a live access token, refreshing if absent or within the
    /// refresh margin of expiry.
    pub async fn access_token(&self) -> Result<String, AuthError> {
        let mut guard = self.cached.lock().await;
        if let Some(cached) = guard.as_ref() {
            if !self.needs_refresh(cached) {
                return Ok(cached.token.access_token.clone());
            }
        }

        let token = self
            .client
            .issue_token(&self.app_key, &self.app_secret, self.paper)
            .await?;
        let access_token = token.access_token.clone();
        let issued_at = self.clock.now();
        if let Some(sink) = &self.audit_sink {
            sink.record(&self.app_key, self.paper, &token, issued_at).await;
        }
        *guard = Some(CachedToken { token, issued_at });
        Ok(access_token)
    }

    fn needs_refresh(&self, cached: &CachedToken) -> bool {
        let expires_at = cached.issued_at + chrono::Duration::seconds(cached.token.expires_in_secs);
        let margin = chrono::Duration::from_std(self.refresh_margin).unwrap_or_default();
        self.clock.now() + margin >= expires_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kx_schemas::FixedClock;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingAuthClient {
        calls: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl AuthClient for CountingAuthClient {
        async fn issue_token(
            &self,
            _app_key: &str,
            _app_secret: &str,
            _paper: bool,
        ) -> Result<TokenResponse, AuthError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(TokenResponse {
                access_token: format!("token-{n}"),
                expires_in_secs: 60,
                token_type: "Bearer".to_string(),
            })
        }

        async fn issue_approval_key(&self, _: &str, _: &str) -> Result<String, AuthError> {
            Ok("approval".to_string())
        }
    }

    #[tokio::test]
    async fn caches_token_until_refresh_margin() {
        let clock = Arc::new(FixedClock::at(Utc::now()));
        let client = Arc::new(CountingAuthClient {
            calls: AtomicUsize::new(0),
        });
        let mgr = TokenManager::new(
            client.clone(),
            clock.clone(),
            "key",
            "secret",
            true,
            Duration::from_secs(5),
        );

        let t1 = mgr.access_token().await.unwrap();
        let t2 = mgr.access_token().await.unwrap();
        assert_eq!(t1, t2);
        assert_eq!(client.calls.load(Ordering::SeqCst), 1);

        clock.advance(chrono::Duration::seconds(56));
        let t3 = mgr.access_token().await.unwrap();
        assert_ne!(t1, t3);
        assert_eq!(client.calls.load(Ordering::SeqCst), 2);
    }
}
