//! Strategy engines and the scheduler that runs them (C10).
//!
//! - Engines are pure functions of context + params, selected by name from
//!   a registry.
//! - The runner loads a bounded recent-bars window, evaluates an engine,
//!   applies cooldown/dedup, and persists the resulting signal.
//! - One (strategy, symbol) failing a tick never aborts the others.

mod engines;
mod registry;
mod runner;
mod types;

pub use engines::{BollingerBands, Macd, MovingAverageCrossover, RelativeStrengthIndex};
pub use registry::{EngineFactory, RegistryError, StrategyEngineRegistry};
pub use runner::{BarSource, EvalTarget, RunnerError, SignalStore, SignalStoreError, StrategyRunner};
pub use types::{
    Bar, ParamError, RecentBarsWindow, Signal, SignalDecision, SignalType, StrategyContext,
    StrategyEngine, StrategyParams, StrategySpec,
};
