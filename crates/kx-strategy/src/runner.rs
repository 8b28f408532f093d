//! Strategy scheduler (C10): loads context, evaluates an engine, applies
//! cooldown/dedup, and persists the resulting signal.

use std::sync::Arc;

use async_trait::async_trait;
use kx_schemas::Clock;

use crate::registry::{RegistryError, StrategyEngineRegistry};
use crate::types::{Bar, RecentBarsWindow, Signal, SignalDecision, StrategyContext, StrategySpec};

const COOLDOWN_LOOKBACK_SECS: i64 = 60;
const DEDUP_LOOKBACK_SECS: i64 = 300;
const MAX_RECENT_BARS: usize = 200;
const DEFAULT_SIGNAL_TTL_SECS: i64 = 300;

#[derive(Debug)]
pub enum SignalStoreError {
    Backend(String),
}

impl std::fmt::Display for SignalStoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Backend(msg) => write!(f, "signal store error: {msg}"),
        }
    }
}

impl std::error::Error for SignalStoreError {}

/// Persistence boundary for signals. Production implementation lives in
/// `kx-db`; this crate only defines the contract.
#[async_trait]
pub trait SignalStore: Send + Sync {
    async fn recent_signals(
        &self,
        strategy_id: &kx_schemas::Id,
        symbol: &str,
        lookback_secs: i64,
        now: chrono::DateTime<chrono::Utc>,
    ) -> Result<Vec<Signal>, SignalStoreError>;

    async fn persist(&self, signal: &Signal) -> Result<(), SignalStoreError>;
}

/// Source of recently closed bars. C3 (market data cache) is the primary
/// implementation; a persistent-store-backed fallback is acceptable too.
#[async_trait]
pub trait BarSource: Send + Sync {
    async fn recent_bars(
        &self,
        symbol: &str,
        timeframe_secs: i64,
        n: usize,
    ) -> Result<Vec<Bar>, SignalStoreError>;
}

#[derive(Debug)]
pub enum RunnerError {
    UnknownEngineType(RegistryError),
    InvalidParams(crate::types::ParamError),
    BarSource(SignalStoreError),
    Store(SignalStoreError),
}

impl std::fmt::Display for RunnerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownEngineType(e) => write!(f, "{e}"),
            Self::InvalidParams(e) => write!(f, "{e}"),
            Self::BarSource(e) => write!(f, "{e}"),
            Self::Store(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for RunnerError {}

/// One (strategy, account, symbol) evaluation target for a scheduler tick.
#[derive(Clone, Debug)]
pub struct EvalTarget {
    pub spec: StrategySpec,
    pub account_id: String,
    pub symbol: String,
}

pub struct StrategyRunner<B: BarSource, S: SignalStore> {
    engines: StrategyEngineRegistry,
    bars: Arc<B>,
    store: Arc<S>,
    clock: Arc<dyn Clock>,
}

impl<B: BarSource, S: SignalStore> StrategyRunner<B, S> {
    pub fn new(engines: StrategyEngineRegistry, bars: Arc<B>, store: Arc<S>, clock: Arc<dyn Clock>) -> Self {
        Self {
            engines,
            bars,
            store,
            clock,
        }
    }

    /// Run the full pipeline once for a single target: load context,
    /// evaluate, cooldown/dedup, persist. Used both by the scheduler tick
    /// and the manual-trigger admin path.
    pub async fn run_once(&self, target: &EvalTarget) -> Result<Option<Signal>, RunnerError> {
        let engine = self
            .engines
            .instantiate(&target.spec.engine_type)
            .map_err(RunnerError::UnknownEngineType)?;
        engine
            .validate_params(&target.spec.params)
            .map_err(RunnerError::InvalidParams)?;

        let periods = engine.indicator_periods(&target.spec.params);
        let n = (periods.into_iter().max().unwrap_or(0) + 10 + 1).clamp(1, MAX_RECENT_BARS as i64) as usize;

        let raw_bars = self
            .bars
            .recent_bars(&target.symbol, target.spec.timeframe_secs, n)
            .await
            .map_err(RunnerError::BarSource)?;

        let now = self.clock.now();
        let ctx = StrategyContext {
            account_id: target.account_id.clone(),
            symbol: target.symbol.clone(),
            now,
            recent: RecentBarsWindow::new(n, raw_bars),
        };

        let decision = engine.evaluate(&ctx, &target.spec.params);
        if decision.is_hold() {
            return Ok(None);
        }

        if self.is_suppressed(&target.spec, &target.symbol, &decision, now).await? {
            return Ok(None);
        }

        let signal = Signal {
            signal_id: self.clock.new_id(),
            strategy_id: target.spec.strategy_id.clone(),
            strategy_version_id: target.spec.strategy_version_id.clone(),
            account_id: target.account_id.clone(),
            symbol: target.symbol.clone(),
            signal_type: decision.signal_type,
            ttl_seconds: DEFAULT_SIGNAL_TTL_SECS,
            reason: decision.reason,
            created_at: now,
        };

        self.store.persist(&signal).await.map_err(RunnerError::Store)?;
        Ok(Some(signal))
    }

    /// Cooldown/dedup: discard if any signal of the same type exists within
    /// the 300s lookback, or if any signal at all exists within the 60s
    /// cooldown window.
    async fn is_suppressed(
        &self,
        spec: &StrategySpec,
        symbol: &str,
        decision: &SignalDecision,
        now: chrono::DateTime<chrono::Utc>,
    ) -> Result<bool, RunnerError> {
        let recent = self
            .store
            .recent_signals(&spec.strategy_id, symbol, DEDUP_LOOKBACK_SECS, now)
            .await
            .map_err(RunnerError::Store)?;

        if recent.iter().any(|s| s.signal_type == decision.signal_type) {
            return Ok(true);
        }
        let cooldown_cutoff = now - chrono::Duration::seconds(COOLDOWN_LOOKBACK_SECS);
        if recent.iter().any(|s| s.created_at >= cooldown_cutoff) {
            return Ok(true);
        }
        Ok(false)
    }

    /// Run one scheduler tick across every target. Evaluation failures for
    /// one target are logged and do not abort the remaining targets.
    pub async fn run_tick(&self, targets: &[EvalTarget]) -> Vec<Signal> {
        let mut emitted = Vec::new();
        for target in targets {
            match self.run_once(target).await {
                Ok(Some(signal)) => emitted.push(signal),
                Ok(None) => {}
                Err(err) => {
                    tracing::error!(
                        strategy_id = %target.spec.strategy_id,
                        symbol = %target.symbol,
                        error = %err,
                        "strategy evaluation failed, continuing tick"
                    );
                }
            }
        }
        emitted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ParamError, StrategyParams};
    use chrono::Utc;
    use kx_schemas::FixedClock;
    use std::sync::Mutex;

    struct FixedBars(Vec<Bar>);

    #[async_trait]
    impl BarSource for FixedBars {
        async fn recent_bars(&self, _symbol: &str, _timeframe_secs: i64, n: usize) -> Result<Vec<Bar>, SignalStoreError> {
            let bars = &self.0;
            let start = bars.len().saturating_sub(n);
            Ok(bars[start..].to_vec())
        }
    }

    #[derive(Default)]
    struct InMemorySignalStore {
        signals: Mutex<Vec<Signal>>,
    }

    #[async_trait]
    impl SignalStore for InMemorySignalStore {
        async fn recent_signals(
            &self,
            strategy_id: &kx_schemas::Id,
            symbol: &str,
            lookback_secs: i64,
            now: chrono::DateTime<chrono::Utc>,
        ) -> Result<Vec<Signal>, SignalStoreError> {
            let cutoff = now - chrono::Duration::seconds(lookback_secs);
            Ok(self
                .signals
                .lock()
                .unwrap()
                .iter()
                .filter(|s| &s.strategy_id == strategy_id && s.symbol == symbol && s.created_at >= cutoff)
                .cloned()
                .collect())
        }

        async fn persist(&self, signal: &Signal) -> Result<(), SignalStoreError> {
            self.signals.lock().unwrap().push(signal.clone());
            Ok(())
        }
    }

    struct AlwaysBuy;
    impl crate::types::StrategyEngine for AlwaysBuy {
        fn evaluate(&self, _ctx: &StrategyContext, _params: &StrategyParams) -> SignalDecision {
            SignalDecision::buy("always")
        }
        fn validate_params(&self, _params: &StrategyParams) -> Result<(), ParamError> {
            Ok(())
        }
        fn indicator_periods(&self, _params: &StrategyParams) -> Vec<i64> {
            vec![1]
        }
    }

    fn target(clock: &FixedClock) -> EvalTarget {
        EvalTarget {
            spec: StrategySpec {
                strategy_id: clock.new_id(),
                strategy_version_id: clock.new_id(),
                engine_type: "always_buy".into(),
                timeframe_secs: 60,
                params: StrategyParams::default(),
            },
            account_id: "acct-1".into(),
            symbol: "005930".into(),
        }
    }

    #[tokio::test]
    async fn second_signal_within_cooldown_is_suppressed() {
        let clock = Arc::new(FixedClock::at(Utc::now()));
        let mut engines = StrategyEngineRegistry::new();
        engines.register("always_buy", || Box::new(AlwaysBuy)).unwrap();
        let bars = Arc::new(FixedBars(vec![Bar::new(Utc::now(), rust_decimal::Decimal::from(100), 1)]));
        let store = Arc::new(InMemorySignalStore::default());
        let runner = StrategyRunner::new(engines, bars, store, clock.clone());

        let t = target(&clock);
        let first = runner.run_once(&t).await.unwrap();
        assert!(first.is_some());

        let second = runner.run_once(&t).await.unwrap();
        assert!(second.is_none());
    }

    #[tokio::test]
    async fn hold_decision_is_never_persisted() {
        struct AlwaysHold;
        impl crate::types::StrategyEngine for AlwaysHold {
            fn evaluate(&self, _ctx: &StrategyContext, _params: &StrategyParams) -> SignalDecision {
                SignalDecision::hold()
            }
            fn validate_params(&self, _params: &StrategyParams) -> Result<(), ParamError> {
                Ok(())
            }
            fn indicator_periods(&self, _params: &StrategyParams) -> Vec<i64> {
                vec![1]
            }
        }
        let clock = Arc::new(FixedClock::at(Utc::now()));
        let mut engines = StrategyEngineRegistry::new();
        engines.register("always_hold", || Box::new(AlwaysHold)).unwrap();
        let bars = Arc::new(FixedBars(vec![Bar::new(Utc::now(), rust_decimal::Decimal::from(100), 1)]));
        let store = Arc::new(InMemorySignalStore::default());
        let runner = StrategyRunner::new(engines, bars, store, clock.clone());

        let mut t = target(&clock);
        t.spec.engine_type = "always_hold".into();
        assert!(runner.run_once(&t).await.unwrap().is_none());
    }
}
