use anyhow::{bail, Context, Result};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fs;

pub mod consumption;
pub mod secrets;

pub use consumption::RunMode as ConfigMode;
pub use consumption::{report_unused_keys, UnusedKeyPolicy, UnusedKeysReport};
pub use secrets::{resolve_secrets_for_mode, ResolvedSecrets};

/// Load + merge YAML files in order, then canonicalize to JSON and hash.
/// Later files override earlier files via deep-merge.
pub fn load_layered_yaml(paths: &[&str]) -> Result<LoadedConfig> {
    let mut sources = Vec::with_capacity(paths.len());
    for p in paths {
        let s = fs::read_to_string(p).with_context(|| format!("read config: {p}"))?;
        sources.push(s);
    }
    let refs: Vec<&str> = sources.iter().map(String::as_str).collect();
    load_layered_yaml_from_strings(&refs)
}

/// Same as [`load_layered_yaml`] but takes YAML source text directly, for
/// tests and inline overlays that don't round-trip through the filesystem.
pub fn load_layered_yaml_from_strings(yamls: &[&str]) -> Result<LoadedConfig> {
    let mut merged = Value::Object(Default::default());

    for s in yamls {
        let yaml_val: serde_yaml::Value = serde_yaml::from_str(s).context("parse yaml")?;
        let json_val = serde_json::to_value(yaml_val).context("yaml->json conversion failed")?;
        deep_merge(&mut merged, json_val);
    }

    if let Some(pointer) = find_secret_like_value(&merged, String::new()) {
        bail!("CONFIG_SECRET_DETECTED at '{pointer}': config must store env var NAMES, not literal secret values");
    }

    let canonical = canonicalize_json(&merged);

    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    let hash = hex::encode(hasher.finalize());

    Ok(LoadedConfig {
        config_json: serde_json::from_str(&canonical).context("canonical json parse failed")?,
        canonical_json: canonical,
        config_hash: hash,
    })
}

#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config_json: Value,
    pub canonical_json: String,
    pub config_hash: String,
}

/// Deep-merge: objects merge recursively; arrays replaced; scalars overwritten.
fn deep_merge(dst: &mut Value, src: Value) {
    match (dst, src) {
        (Value::Object(dst_map), Value::Object(src_map)) => {
            for (k, v) in src_map {
                match dst_map.get_mut(&k) {
                    Some(existing) => deep_merge(existing, v),
                    None => {
                        dst_map.insert(k, v);
                    }
                }
            }
        }
        (dst_slot, src_val) => {
            *dst_slot = src_val;
        }
    }
}

/// Canonicalize JSON by sorting all object keys recursively and emitting
/// compact JSON, so hash equality depends only on content, never key order.
fn canonicalize_json(v: &Value) -> String {
    let sorted = sort_keys(v);
    serde_json::to_string(&sorted).expect("json serialization must not fail")
}

fn sort_keys(v: &Value) -> Value {
    match v {
        Value::Object(map) => {
            let mut keys: Vec<_> = map.keys().cloned().collect();
            keys.sort();
            let mut new = serde_json::Map::new();
            for k in keys {
                new.insert(k.clone(), sort_keys(&map[&k]));
            }
            Value::Object(new)
        }
        Value::Array(arr) => Value::Array(arr.iter().map(sort_keys).collect()),
        _ => v.clone(),
    }
}

/// Heuristics for literal secret values that should never appear in
/// checked-in config. Env var names (`KX_BROKER_APP_KEY`) never match these.
fn looks_like_secret(s: &str) -> bool {
    s.starts_with("sk-")
        || s.starts_with("AKIA")
        || s.contains("BEGIN RSA PRIVATE KEY")
        || s.contains("BEGIN PRIVATE KEY")
        || s.contains("BEGIN OPENSSH PRIVATE KEY")
}

/// Depth-first search for a string leaf (anywhere, including inside arrays)
/// that looks like a literal secret. Returns the JSON pointer of the first
/// offending leaf found.
fn find_secret_like_value(v: &Value, path: String) -> Option<String> {
    match v {
        Value::String(s) if looks_like_secret(s) => Some(path),
        Value::Object(map) => map
            .iter()
            .find_map(|(k, val)| find_secret_like_value(val, format!("{path}/{k}"))),
        Value::Array(arr) => arr
            .iter()
            .enumerate()
            .find_map(|(i, val)| find_secret_like_value(val, format!("{path}/{i}"))),
        _ => None,
    }
}

