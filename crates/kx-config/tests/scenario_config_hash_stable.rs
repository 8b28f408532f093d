//! Config hash stability.
//!
//! - `load_layered_yaml_from_strings` called twice on the same inputs returns
//!   an identical `config_hash`.
//! - Reordering keys within YAML doesn't change the hash (canonicalization).
//! - Different values produce different hashes.
//! - Multiple merge layers produce a stable hash regardless of call order.

use kx_config::load_layered_yaml_from_strings;

const BASE_YAML: &str = r#"
runtime:
  mode: "PAPER"
risk:
  dailyLossLimit: 0.02
  maxDrawdown: 0.18
broker:
  appKey: "KX_BROKER_APP_KEY"
  appSecret: "KX_BROKER_APP_SECRET"
"#;

/// Same content as BASE_YAML but with keys in different order.
const BASE_YAML_REORDERED: &str = r#"
risk:
  maxDrawdown: 0.18
  dailyLossLimit: 0.02
broker:
  appSecret: "KX_BROKER_APP_SECRET"
  appKey: "KX_BROKER_APP_KEY"
runtime:
  mode: "PAPER"
"#;

const OVERLAY_YAML: &str = r#"
runtime:
  mode: "LIVE"
risk:
  dailyLossLimit: 0.01
"#;

#[test]
fn same_input_produces_identical_hash() {
    let a = load_layered_yaml_from_strings(&[BASE_YAML]).unwrap();
    let b = load_layered_yaml_from_strings(&[BASE_YAML]).unwrap();

    assert_eq!(a.config_hash, b.config_hash, "same YAML input must produce identical hash");
    assert_eq!(a.canonical_json, b.canonical_json, "canonical JSON must be identical for same input");
}

#[test]
fn reordered_keys_produce_same_hash() {
    let original = load_layered_yaml_from_strings(&[BASE_YAML]).unwrap();
    let reordered = load_layered_yaml_from_strings(&[BASE_YAML_REORDERED]).unwrap();

    assert_eq!(original.config_hash, reordered.config_hash, "reordering keys must not change the hash");
    assert_eq!(original.canonical_json, reordered.canonical_json);
}

#[test]
fn different_values_produce_different_hash() {
    let a = load_layered_yaml_from_strings(&[BASE_YAML]).unwrap();

    let modified = r#"
runtime:
  mode: "PAPER"
risk:
  dailyLossLimit: 0.05
  maxDrawdown: 0.30
broker:
  appKey: "KX_BROKER_APP_KEY_EXP"
  appSecret: "KX_BROKER_APP_SECRET_EXP"
"#;
    let b = load_layered_yaml_from_strings(&[modified]).unwrap();

    assert_ne!(a.config_hash, b.config_hash, "different config values must produce different hashes");
}

#[test]
fn merged_layers_produce_stable_hash() {
    let a = load_layered_yaml_from_strings(&[BASE_YAML, OVERLAY_YAML]).unwrap();
    let b = load_layered_yaml_from_strings(&[BASE_YAML, OVERLAY_YAML]).unwrap();

    assert_eq!(a.config_hash, b.config_hash, "same merge layers must produce identical hash");

    let mode = a.config_json.pointer("/runtime/mode").and_then(|v| v.as_str()).unwrap();
    assert_eq!(mode, "LIVE", "overlay should override base runtime.mode");

    let dll = a.config_json.pointer("/risk/dailyLossLimit").and_then(|v| v.as_f64()).unwrap();
    assert!((dll - 0.01).abs() < 1e-9, "overlay should override base dailyLossLimit");
}

#[test]
fn hash_is_64_hex_chars() {
    let loaded = load_layered_yaml_from_strings(&[BASE_YAML]).unwrap();

    assert_eq!(loaded.config_hash.len(), 64, "SHA-256 hash should be 64 hex chars");
    assert!(loaded.config_hash.chars().all(|c| c.is_ascii_hexdigit()));
}

#[test]
fn empty_config_produces_stable_hash() {
    let a = load_layered_yaml_from_strings(&["{}"]).unwrap();
    let b = load_layered_yaml_from_strings(&["{}"]).unwrap();

    assert_eq!(a.config_hash, b.config_hash, "empty configs must produce identical hash");
}
