//! Wires `kx_marketdata`'s live cache into a `kx_strategy::BarSource` (§4.5
//! step 2: bars come from C3 first, then the persistent store).
//!
//! Each `(symbol, timeframe)` series gets its own `BarRing`; a series with
//! fewer than the requested number of bars falls back to `PgBarSource`
//! wholesale rather than splicing the two sources together.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use kx_db::PgBarSource;
use kx_marketdata::{BarAggregator, ClosedBar, Tick, TickCache};
use kx_strategy::{Bar, BarSource, SignalStoreError};

pub struct MarketDataHub {
    ticks: TickCache,
    ring_capacity: usize,
    aggregators: Mutex<HashMap<i64, BarAggregator>>,
    rings: Mutex<HashMap<(String, i64), kx_marketdata::BarRing>>,
    bar_store: PgBarSource,
}

impl MarketDataHub {
    pub fn new(ring_capacity: usize, bar_store: PgBarSource) -> Self {
        Self {
            ticks: TickCache::new(),
            ring_capacity,
            aggregators: Mutex::new(HashMap::new()),
            rings: Mutex::new(HashMap::new()),
            bar_store,
        }
    }

    pub fn last_tick(&self, symbol: &str) -> Option<Tick> {
        self.ticks.last(symbol)
    }

    /// Feeds one tick for `symbol` at `timeframe_secs` into the cache,
    /// returning the newly closed bar if this tick crossed a bucket
    /// boundary. Callers persist the closed bar themselves (this hub has no
    /// async write path of its own).
    pub fn on_tick(&self, symbol: &str, timeframe_secs: i64, tick: Tick) -> Option<ClosedBar> {
        self.ticks.update(symbol, tick);

        let closed = {
            let mut aggregators = self.aggregators.lock().unwrap();
            let aggregator = aggregators
                .entry(timeframe_secs)
                .or_insert_with(|| BarAggregator::new(timeframe_secs));
            aggregator.on_tick(symbol, tick)
        };

        if let Some(bar) = closed {
            let mut rings = self.rings.lock().unwrap();
            rings
                .entry((symbol.to_string(), timeframe_secs))
                .or_insert_with(|| kx_marketdata::BarRing::new(self.ring_capacity))
                .push(bar);
        }

        closed
    }

    fn recent_in_memory(&self, symbol: &str, timeframe_secs: i64, n: usize) -> Vec<ClosedBar> {
        self.rings
            .lock()
            .unwrap()
            .get(&(symbol.to_string(), timeframe_secs))
            .map(|ring| ring.recent(n))
            .unwrap_or_default()
    }
}

#[async_trait]
impl BarSource for MarketDataHub {
    async fn recent_bars(&self, symbol: &str, timeframe_secs: i64, n: usize) -> Result<Vec<Bar>, SignalStoreError> {
        let in_memory = self.recent_in_memory(symbol, timeframe_secs, n);
        if in_memory.len() >= n {
            return Ok(in_memory
                .into_iter()
                .map(|b| Bar::new(b.end_ts, b.close, b.volume))
                .collect());
        }

        self.bar_store.recent_bars(symbol, timeframe_secs, n).await
    }
}
