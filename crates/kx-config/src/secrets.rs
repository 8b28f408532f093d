//! Secrets & broker mode resolution.
//!
//! This module is the single source of truth for runtime secret resolution.
//!
//! # Contract
//! - Config YAML stores only **env var NAMES** (e.g. `"KX_BROKER_APP_KEY"`).
//! - At startup, callers invoke `resolve_secrets_for_mode()` once and thread
//!   the returned `ResolvedSecrets` into constructors; never scatter
//!   `std::env::var` calls across the codebase.
//! - `Debug` impls on all secret-containing structs redact values.
//! - Error messages reference the env var NAME, never the value.
//!
//! # Mode-aware enforcement
//! Both `PAPER` and `LIVE` require the broker app key/secret — `AuthClient`
//! needs them for both, distinguished only by the `paperFlag` passed to
//! `issueToken`. There is no mode with optional broker credentials.

use anyhow::{bail, Result};
use serde_json::Value;

/// All runtime-resolved secrets for one engine instantiation.
///
/// Built once at startup via [`resolve_secrets_for_mode`]. Pass to
/// constructors. Do not scatter `std::env::var` calls elsewhere.
#[derive(Clone)]
pub struct ResolvedSecrets {
    /// Broker app key. `None` if the named env var was absent or empty.
    pub broker_app_key: Option<String>,
    /// Broker app secret. `None` if the named env var was absent or empty.
    pub broker_app_secret: Option<String>,
}

impl std::fmt::Debug for ResolvedSecrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedSecrets")
            .field("broker_app_key", &self.broker_app_key.as_ref().map(|_| "<REDACTED>"))
            .field("broker_app_secret", &self.broker_app_secret.as_ref().map(|_| "<REDACTED>"))
            .finish()
    }
}

/// Env var names extracted from the config JSON. These are the NAMES stored
/// in YAML, not values.
struct SecretEnvNames {
    broker_app_key_var: String,
    broker_app_secret_var: String,
}

/// Read a non-empty string value at `pointer` from a JSON config. Returns
/// `None` if the pointer is absent, not a string, or blank after trimming.
fn read_str_at(config: &Value, pointer: &str) -> Option<String> {
    let s = config.pointer(pointer)?.as_str()?;
    let trimmed = s.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Resolve a named environment variable. Returns `None` if the variable is
/// unset or blank. Never returns the value in an error path.
fn resolve_env(var_name: &str) -> Option<String> {
    match std::env::var(var_name) {
        Ok(v) if !v.trim().is_empty() => Some(v),
        _ => None,
    }
}

fn parse_env_names(config_json: &Value) -> SecretEnvNames {
    SecretEnvNames {
        broker_app_key_var: read_str_at(config_json, "/broker/appKey")
            .unwrap_or_else(|| "KX_BROKER_APP_KEY".to_string()),
        broker_app_secret_var: read_str_at(config_json, "/broker/appSecret")
            .unwrap_or_else(|| "KX_BROKER_APP_SECRET".to_string()),
    }
}

/// Resolve all secrets from the environment for the given `mode` string.
///
/// `mode` is case-insensitive: `"LIVE"` or `"PAPER"`.
///
/// # Errors
/// Returns `Err` with the env var NAME of the first missing variable. The
/// actual value is never mentioned.
pub fn resolve_secrets_for_mode(config_json: &Value, mode: &str) -> Result<ResolvedSecrets> {
    let names = parse_env_names(config_json);
    let mode_upper = mode.trim().to_ascii_uppercase();

    match mode_upper.as_str() {
        "LIVE" | "PAPER" => {}
        other => {
            bail!(
                "SECRETS_UNKNOWN_MODE: unrecognised mode '{}'; expected one of: LIVE | PAPER",
                other,
            );
        }
    }

    let broker_app_key = resolve_env(&names.broker_app_key_var);
    let broker_app_secret = resolve_env(&names.broker_app_secret_var);

    if broker_app_key.is_none() {
        bail!(
            "SECRETS_MISSING mode={mode_upper}: required env var '{}' (broker app key) is not set or empty",
            names.broker_app_key_var,
        );
    }
    if broker_app_secret.is_none() {
        bail!(
            "SECRETS_MISSING mode={mode_upper}: required env var '{}' (broker app secret) is not set or empty",
            names.broker_app_secret_var,
        );
    }

    Ok(ResolvedSecrets {
        broker_app_key,
        broker_app_secret,
    })
}
