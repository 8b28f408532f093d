//! Fixed-capacity bar ring (C3) and tick-to-bar aggregator (C4).

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::tick::Tick;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ClosedBar {
    pub symbol_timeframe_secs: i64,
    pub end_ts: DateTime<Utc>,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: i64,
}

/// Fixed-capacity ring of closed bars for one `(symbol, timeframe)` series.
/// Oldest bar is evicted once `capacity` is reached.
pub struct BarRing {
    capacity: usize,
    bars: VecDeque<ClosedBar>,
}

impl BarRing {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "BarRing capacity must be > 0");
        Self {
            capacity,
            bars: VecDeque::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, bar: ClosedBar) {
        if self.bars.len() == self.capacity {
            self.bars.pop_front();
        }
        self.bars.push_back(bar);
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn recent(&self, n: usize) -> Vec<ClosedBar> {
        let start = self.bars.len().saturating_sub(n);
        self.bars.iter().skip(start).copied().collect()
    }
}

/// Accumulates ticks within the current timeframe bucket for one symbol.
struct Bucket {
    bucket_start: DateTime<Utc>,
    open: Decimal,
    high: Decimal,
    low: Decimal,
    close: Decimal,
    volume: i64,
}

fn bucket_start(ts: DateTime<Utc>, timeframe_secs: i64) -> DateTime<Utc> {
    let epoch = ts.timestamp();
    let floored = epoch - epoch.rem_euclid(timeframe_secs);
    DateTime::from_timestamp(floored, 0).unwrap_or(ts)
}

/// Accumulates ticks into closed OHLCV bars for a single `(symbol,
/// timeframe)` series, pushing the newly closed bar into an owned
/// `BarRing` exactly when a timeframe boundary is crossed.
pub struct BarAggregator {
    timeframe_secs: i64,
    buckets: Mutex<HashMap<String, Bucket>>,
}

impl BarAggregator {
    pub fn new(timeframe_secs: i64) -> Self {
        assert!(timeframe_secs > 0, "timeframe_secs must be > 0");
        Self {
            timeframe_secs,
            buckets: Mutex::new(HashMap::new()),
        }
    }

    pub fn timeframe_secs(&self) -> i64 {
        self.timeframe_secs
    }

    /// Feeds one tick into the aggregator. Returns `Some(ClosedBar)` exactly
    /// when this tick belongs to a new bucket, closing the previous one.
    pub fn on_tick(&self, symbol: &str, tick: Tick) -> Option<ClosedBar> {
        let this_bucket = bucket_start(tick.ts, self.timeframe_secs);
        let mut buckets = self.buckets.lock().unwrap();

        match buckets.get_mut(symbol) {
            None => {
                buckets.insert(
                    symbol.to_string(),
                    Bucket {
                        bucket_start: this_bucket,
                        open: tick.price,
                        high: tick.price,
                        low: tick.price,
                        close: tick.price,
                        volume: tick.qty,
                    },
                );
                None
            }
            Some(bucket) if bucket.bucket_start == this_bucket => {
                bucket.high = bucket.high.max(tick.price);
                bucket.low = bucket.low.min(tick.price);
                bucket.close = tick.price;
                bucket.volume += tick.qty;
                None
            }
            Some(bucket) => {
                let closed = ClosedBar {
                    symbol_timeframe_secs: self.timeframe_secs,
                    end_ts: bucket.bucket_start,
                    open: bucket.open,
                    high: bucket.high,
                    low: bucket.low,
                    close: bucket.close,
                    volume: bucket.volume,
                };
                *bucket = Bucket {
                    bucket_start: this_bucket,
                    open: tick.price,
                    high: tick.price,
                    low: tick.price,
                    close: tick.price,
                    volume: tick.qty,
                };
                Some(closed)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn tick(price: Decimal, qty: i64, ts: DateTime<Utc>) -> Tick {
        Tick { price, qty, ts }
    }

    #[test]
    fn first_tick_never_closes_a_bar() {
        let agg = BarAggregator::new(60);
        let now = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        assert!(agg.on_tick("005930", tick(dec!(70000), 10, now)).is_none());
    }

    #[test]
    fn tick_in_same_bucket_does_not_close() {
        let agg = BarAggregator::new(60);
        let t0 = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        let t1 = t0 + chrono::Duration::seconds(10);
        agg.on_tick("005930", tick(dec!(70000), 10, t0));
        assert!(agg.on_tick("005930", tick(dec!(70100), 5, t1)).is_none());
    }

    #[test]
    fn crossing_boundary_closes_bar_with_correct_ohlcv() {
        let agg = BarAggregator::new(60);
        let t0 = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        let t1 = t0 + chrono::Duration::seconds(5);
        let t2 = t0 + chrono::Duration::seconds(65);

        agg.on_tick("005930", tick(dec!(70000), 10, t0));
        agg.on_tick("005930", tick(dec!(70500), 3, t1));
        let closed = agg.on_tick("005930", tick(dec!(69800), 7, t2)).unwrap();

        assert_eq!(closed.open, dec!(70000));
        assert_eq!(closed.high, dec!(70500));
        assert_eq!(closed.low, dec!(70000));
        assert_eq!(closed.close, dec!(70500));
        assert_eq!(closed.volume, 13);
    }

    #[test]
    fn bar_ring_evicts_oldest_past_capacity() {
        let mut ring = BarRing::new(2);
        let t0 = DateTime::from_timestamp(0, 0).unwrap();
        for i in 0..3 {
            ring.push(ClosedBar {
                symbol_timeframe_secs: 60,
                end_ts: t0 + chrono::Duration::seconds(i * 60),
                open: dec!(1),
                high: dec!(1),
                low: dec!(1),
                close: dec!(1),
                volume: 1,
            });
        }
        assert_eq!(ring.len(), 2);
        assert_eq!(ring.recent(2)[0].end_ts, t0 + chrono::Duration::seconds(60));
    }

    #[test]
    fn independent_symbols_track_separate_buckets() {
        let agg = BarAggregator::new(60);
        let t0 = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        assert!(agg.on_tick("005930", tick(dec!(70000), 1, t0)).is_none());
        assert!(agg.on_tick("000660", tick(dec!(120000), 1, t0)).is_none());
    }
}
