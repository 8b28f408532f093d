//! Fill Reconciliation Listener (C11).
//!
//! Subscribes to the broker fill stream. Each message is validated, matched
//! to a known local order by broker order number, priced for fee/tax, and
//! handed to the portfolio ledger as a `Fill`.

mod listener;
mod types;

pub use listener::{FillReconciler, ReconcileError};
pub use types::{validate, RawFill, ValidationError};
