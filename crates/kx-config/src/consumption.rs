use anyhow::{bail, Result};
use serde_json::Value;

/// Which config leaves each run mode is expected to read. Used by
/// `report_unused_keys` to flag config nobody consumes — a typo in
/// `risk.maxExposure` should be loud, not silently ignored.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunMode {
    Paper,
    Live,
}

pub fn consumed_pointers(mode: RunMode) -> &'static [&'static str] {
    match mode {
        RunMode::Paper => PAPER,
        RunMode::Live => LIVE,
    }
}

// `/risk/*` is a subtree: the risk engine reads a configurable family of
// per-rule limits (§4.3), not a fixed enumerated set.
static PAPER: &[&str] = &[
    "/runtime/mode",
    "/broker/paper/baseUrl",
    "/broker/appKey",
    "/broker/appSecret",
    "/broker/commissionRate",
    "/broker/minimumCommission",
    "/risk/*",
    "/scheduler/strategyIntervalMs",
    "/scheduler/workerPoolSize",
    "/outbox/batchSize",
    "/outbox/retryLimit",
    "/marketdata/maxBarsPerSymbol",
    "/reconnect/max",
    "/reconnect/initialDelayMs",
    "/reconnect/backoffMultiplier",
    "/heartbeat/pingIntervalMs",
    "/heartbeat/pongTimeoutMs",
];

static LIVE: &[&str] = &[
    "/runtime/mode",
    "/broker/live/baseUrl",
    "/broker/appKey",
    "/broker/appSecret",
    "/broker/commissionRate",
    "/broker/minimumCommission",
    "/risk/*",
    "/scheduler/strategyIntervalMs",
    "/scheduler/workerPoolSize",
    "/outbox/batchSize",
    "/outbox/retryLimit",
    "/marketdata/maxBarsPerSymbol",
    "/reconnect/max",
    "/reconnect/initialDelayMs",
    "/reconnect/backoffMultiplier",
    "/heartbeat/pingIntervalMs",
    "/heartbeat/pongTimeoutMs",
];

/// What to do with config leaves nobody consumes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnusedKeyPolicy {
    Warn,
    Fail,
}

/// Every unused leaf pointer found, sorted for deterministic output.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UnusedKeysReport {
    pub unused_leaf_pointers: Vec<String>,
}

impl UnusedKeysReport {
    pub fn is_clean(&self) -> bool {
        self.unused_leaf_pointers.is_empty()
    }
}

/// Walks every leaf of `config_json` and flags pointers not covered by
/// `mode`'s consumed set. A `/risk/*`-style entry consumes the whole
/// subtree; anything else must match a leaf pointer exactly.
pub fn report_unused_keys(
    mode: RunMode,
    config_json: &Value,
    policy: UnusedKeyPolicy,
) -> Result<UnusedKeysReport> {
    let consumed = consumed_pointers(mode);
    let mut unused = Vec::new();
    collect_unused(config_json, String::new(), consumed, &mut unused);
    unused.sort();

    let report = UnusedKeysReport {
        unused_leaf_pointers: unused,
    };

    if policy == UnusedKeyPolicy::Fail && !report.is_clean() {
        bail!(
            "CONFIG_UNUSED_KEYS: {} config leaf key(s) not consumed by any component: {}",
            report.unused_leaf_pointers.len(),
            report.unused_leaf_pointers.join(", "),
        );
    }

    Ok(report)
}

fn collect_unused(value: &Value, prefix: String, consumed: &[&str], out: &mut Vec<String>) {
    match value {
        Value::Object(map) => {
            for (k, v) in map {
                let pointer = format!("{prefix}/{k}");
                if is_consumed(&pointer, consumed) {
                    continue;
                }
                collect_unused(v, pointer, consumed, out);
            }
        }
        _ => {
            if !is_consumed(&prefix, consumed) {
                out.push(prefix);
            }
        }
    }
}

fn is_consumed(pointer: &str, consumed: &[&str]) -> bool {
    consumed.iter().any(|c| match c.strip_suffix("/*") {
        Some(subtree) => pointer == subtree || pointer.starts_with(&format!("{subtree}/")),
        None => pointer == *c,
    })
}
