//! Paper-mode `kx_auth::AuthClient`.
//!
//! The paper broker never makes a wire call that needs a bearer token, so
//! there is no real auth endpoint to encode here. This stub exists only so
//! `TokenManager`'s refresh-before-expiry lifecycle (§4.10) stays wired for
//! a live broker adapter to slot in later without touching the composition
//! root's shape.

use kx_auth::{AuthClient, AuthError, TokenResponse};

pub struct PaperAuthClient;

#[async_trait::async_trait]
impl AuthClient for PaperAuthClient {
    async fn issue_token(&self, _app_key: &str, _app_secret: &str, _paper: bool) -> Result<TokenResponse, AuthError> {
        Ok(TokenResponse {
            access_token: "paper-mode-token".to_string(),
            expires_in_secs: 3600,
            token_type: "Bearer".to_string(),
        })
    }

    async fn issue_approval_key(&self, _app_key: &str, _app_secret: &str) -> Result<String, AuthError> {
        Ok("paper-mode-approval".to_string())
    }
}
