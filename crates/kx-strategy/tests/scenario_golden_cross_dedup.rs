use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use kx_schemas::{Clock, FixedClock};
use kx_strategy::{
    Bar, BarSource, EvalTarget, Signal, SignalStore, SignalStoreError, StrategyEngineRegistry,
    StrategyParams, StrategyRunner, StrategySpec,
};

struct FixedBars(Vec<Bar>);

#[async_trait]
impl BarSource for FixedBars {
    async fn recent_bars(&self, _symbol: &str, _timeframe_secs: i64, n: usize) -> Result<Vec<Bar>, SignalStoreError> {
        let start = self.0.len().saturating_sub(n);
        Ok(self.0[start..].to_vec())
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

fn rising_closes(flat_len: usize, bump: i64) -> Vec<Bar> {
    let now = Utc::now();
    let mut bars: Vec<Bar> = (0..flat_len).map(|_| Bar::new(now, dec!(100), 1)).collect();
    bars.push(Bar::new(now, Decimal::from(100 + bump), 1));
    bars
}

#[tokio::test]
async fn second_golden_cross_within_cooldown_is_discarded() {
    let clock = Arc::new(FixedClock::at(Utc::now()));
    let engines = StrategyEngineRegistry::with_builtins();
    let store = Arc::new(InMemorySignalStore::default());

    let spec = StrategySpec {
        strategy_id: clock.new_id(),
        strategy_version_id: clock.new_id(),
        engine_type: "ma_crossover".to_string(),
        timeframe_secs: 60,
        params: StrategyParams::new(BTreeMap::new()),
    };
    let target = EvalTarget {
        spec,
        account_id: "acct-1".to_string(),
        symbol: "005930".to_string(),
    };

    let bars = Arc::new(FixedBars(rising_closes(20, 15)));
    let runner = StrategyRunner::new(engines, bars, store.clone(), clock.clone());

    let first = runner.run_once(&target).await.unwrap();
    assert!(first.is_some(), "first golden cross should emit a BUY signal");

    let second = runner.run_once(&target).await.unwrap();
    assert!(
        second.is_none(),
        "a second signal for the same (strategy, symbol) inside the dedup window must be discarded"
    );

    assert_eq!(store.signals.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn distinct_symbols_are_evaluated_independently() {
    let clock = Arc::new(FixedClock::at(Utc::now()));
    let engines = StrategyEngineRegistry::with_builtins();
    let store = Arc::new(InMemorySignalStore::default());
    let bars = Arc::new(FixedBars(rising_closes(20, 15)));
    let runner = StrategyRunner::new(engines, bars, store.clone(), clock.clone());

    let base_spec = StrategySpec {
        strategy_id: clock.new_id(),
        strategy_version_id: clock.new_id(),
        engine_type: "ma_crossover".to_string(),
        timeframe_secs: 60,
        params: StrategyParams::new(BTreeMap::new()),
    };

    let a = EvalTarget {
        spec: base_spec.clone(),
        account_id: "acct-1".to_string(),
        symbol: "005930".to_string(),
    };
    let b = EvalTarget {
        spec: base_spec,
        account_id: "acct-1".to_string(),
        symbol: "000660".to_string(),
    };

    assert!(runner.run_once(&a).await.unwrap().is_some());
    assert!(runner.run_once(&b).await.unwrap().is_some());
    assert_eq!(store.signals.lock().unwrap().len(), 2);
}
