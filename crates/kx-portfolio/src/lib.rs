//! Fill Applier and average-cost Position/P&L engine (C8/C9).
//!
//! - Fill-driven ledger is the source of truth.
//! - Average-cost accounting (not FIFO lots).
//! - Realized vs unrealized P&L.
//! - Equity and portfolio snapshots.
//! - Pure deterministic logic (no IO, no time beyond caller-supplied
//!   timestamps, no broker wiring).

mod accounting;
pub mod ledger;
mod metrics;
mod ordering;
mod types;

pub use accounting::{apply_buy, apply_sell};
pub use ledger::{FillApplyResult, Ledger, LedgerError, LedgerSnapshot};
pub use metrics::{compute_equity, compute_unrealized_pnl, MarkMap};
pub use ordering::sort_fills_canonical;
pub use types::{Fill, LedgerEntry, LedgerEventType, PortfolioSnapshot, PortfolioState, PositionState};
