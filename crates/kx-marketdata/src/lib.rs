//! Live market data cache (C3/C4).
//!
//! Holds the last tick per symbol and aggregates ticks into closed bars per
//! `(symbol, timeframe)`, feeding strategy evaluation without touching a
//! durable store.

mod bar;
mod tick;

pub use bar::{BarAggregator, BarRing, ClosedBar};
pub use tick::{Tick, TickCache};
