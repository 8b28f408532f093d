//! Last-tick-per-symbol cache (C3), concurrent-readable with writes
//! serialized per symbol.

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Tick {
    pub price: Decimal,
    pub qty: i64,
    pub ts: DateTime<Utc>,
}

/// Last tick observed per symbol. Reads never block each other; a write
/// takes the map's write lock only for the duration of the single insert,
/// so writes to different symbols never contend beyond that.
#[derive(Default)]
pub struct TickCache {
    last: RwLock<HashMap<String, Tick>>,
}

impl TickCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&self, symbol: &str, tick: Tick) {
        self.last.write().unwrap().insert(symbol.to_string(), tick);
    }

    pub fn last(&self, symbol: &str) -> Option<Tick> {
        self.last.read().unwrap().get(symbol).copied()
    }

    pub fn symbols(&self) -> Vec<String> {
        self.last.read().unwrap().keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn update_then_last_round_trips() {
        let cache = TickCache::new();
        let now = Utc::now();
        cache.update("005930", Tick { price: dec!(70000), qty: 10, ts: now });
        let tick = cache.last("005930").unwrap();
        assert_eq!(tick.price, dec!(70000));
        assert_eq!(tick.qty, 10);
    }

    #[test]
    fn unknown_symbol_returns_none() {
        let cache = TickCache::new();
        assert!(cache.last("000000").is_none());
    }

    #[test]
    fn later_update_overwrites_last() {
        let cache = TickCache::new();
        let now = Utc::now();
        cache.update("005930", Tick { price: dec!(70000), qty: 10, ts: now });
        cache.update("005930", Tick { price: dec!(70500), qty: 5, ts: now });
        assert_eq!(cache.last("005930").unwrap().price, dec!(70500));
    }
}
