use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use kx_schemas::Id;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Identity + the single timeframe a strategy version runs on.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StrategySpec {
    pub strategy_id: Id,
    pub strategy_version_id: Id,
    pub engine_type: String,
    pub timeframe_secs: i64,
    pub params: StrategyParams,
}

/// Opaque key/value parameter map parsed from a strategy version's
/// configuration blob.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StrategyParams {
    values: BTreeMap<String, String>,
}

impl StrategyParams {
    pub fn new(values: BTreeMap<String, String>) -> Self {
        Self { values }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(|s| s.as_str())
    }

    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(|v| v.parse().ok())
    }

    pub fn get_i64_or(&self, key: &str, default: i64) -> i64 {
        self.get_i64(key).unwrap_or(default)
    }
}

/// A single closed OHLCV bar used as strategy input.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Bar {
    pub end_ts: DateTime<Utc>,
    pub close: Decimal,
    pub volume: i64,
}

impl Bar {
    pub fn new(end_ts: DateTime<Utc>, close: Decimal, volume: i64) -> Self {
        Self {
            end_ts,
            close,
            volume,
        }
    }
}

/// Bounded recent-bars window, keeping the most recent `max_len` closed bars.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecentBarsWindow {
    max_len: usize,
    bars: Vec<Bar>,
}

impl RecentBarsWindow {
    pub fn new(max_len: usize, mut bars: Vec<Bar>) -> Self {
        debug_assert!(max_len > 0);
        if bars.len() > max_len {
            let start = bars.len() - max_len;
            bars = bars.split_off(start);
        }
        Self { max_len, bars }
    }

    pub fn max_len(&self) -> usize {
        self.max_len
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn closes(&self) -> Vec<Decimal> {
        self.bars.iter().map(|b| b.close).collect()
    }

    pub fn last(&self) -> Option<&Bar> {
        self.bars.last()
    }
}

/// Deterministic, IO-free evaluation context handed to a strategy engine.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StrategyContext {
    pub account_id: String,
    pub symbol: String,
    pub now: DateTime<Utc>,
    pub recent: RecentBarsWindow,
}

/// Signal classification, matching the persisted `signalType` domain.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignalType {
    Buy,
    Sell,
    Hold,
}

/// What a strategy engine produces for one evaluation. HOLD decisions are
/// discarded by the runner before persistence.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SignalDecision {
    pub signal_type: SignalType,
    pub reason: String,
}

impl SignalDecision {
    pub fn hold() -> Self {
        Self {
            signal_type: SignalType::Hold,
            reason: String::new(),
        }
    }

    pub fn buy(reason: impl Into<String>) -> Self {
        Self {
            signal_type: SignalType::Buy,
            reason: reason.into(),
        }
    }

    pub fn sell(reason: impl Into<String>) -> Self {
        Self {
            signal_type: SignalType::Sell,
            reason: reason.into(),
        }
    }

    pub fn is_hold(&self) -> bool {
        self.signal_type == SignalType::Hold
    }
}

/// A persisted trading signal. HOLD signals are never constructed here —
/// the runner filters them out before this type is built.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signal {
    pub signal_id: Id,
    pub strategy_id: Id,
    pub strategy_version_id: Id,
    pub account_id: String,
    pub symbol: String,
    pub signal_type: SignalType,
    pub ttl_seconds: i64,
    pub reason: String,
    pub created_at: DateTime<Utc>,
}

/// Engine capability set: pure functions, no IO.
pub trait StrategyEngine: Send + Sync {
    fn evaluate(&self, ctx: &StrategyContext, params: &StrategyParams) -> SignalDecision;
    fn validate_params(&self, params: &StrategyParams) -> Result<(), ParamError>;

    /// Periods the engine reads from params, used by the runner to size the
    /// recent-bars window (`N = max(indicatorPeriods) + 10 + 1`, capped 200).
    fn indicator_periods(&self, params: &StrategyParams) -> Vec<i64>;
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParamError(pub String);

impl std::fmt::Display for ParamError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid strategy parameters: {}", self.0)
    }
}

impl std::error::Error for ParamError {}
