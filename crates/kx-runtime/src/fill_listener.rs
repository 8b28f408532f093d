//! Fill reconciliation listener (§4.6): matches an incoming broker fill to
//! its order, applies it to the owning account's ledger, and persists the
//! result.
//!
//! One `Ledger` per account is kept resident in memory (§5: fills for the
//! same account/symbol are linearized) and rebuilt from `positions` on
//! first touch; all mutation happens behind the account's entry in
//! `ledgers`, so cross-account fills never contend.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use kx_execution::{OrderRepository, StoreError};
use kx_portfolio::{Fill, Ledger, LedgerEntry, LedgerEventType};
use kx_reconcile::{FillReconciler, RawFill, ReconcileError};
use rust_decimal::Decimal;
use sqlx::PgPool;
use tokio::sync::Mutex;

pub struct FillListener {
    pool: PgPool,
    orders: Arc<dyn OrderRepository>,
    reconciler: FillReconciler,
    ledgers: Mutex<HashMap<String, Ledger>>,
    initial_cash: Decimal,
}

impl FillListener {
    pub fn new(
        pool: PgPool,
        orders: Arc<dyn OrderRepository>,
        reconciler: FillReconciler,
        initial_cash: Decimal,
    ) -> Self {
        Self {
            pool,
            orders,
            reconciler,
            ledgers: Mutex::new(HashMap::new()),
            initial_cash,
        }
    }

    /// Processes one raw fill end to end: validate/match/price (C11), apply
    /// to the account ledger (C8/C9), and persist the fill/position/ledger
    /// rows together with the outbox events the state change produced in
    /// one transaction — a crash partway through leaves none of it committed.
    pub async fn handle(&self, raw: &RawFill, now: DateTime<Utc>) -> Result<(), ReconcileError> {
        let order = self
            .orders
            .find_by_broker_order_no(&raw.broker_order_no)
            .await
            .map_err(ReconcileError::Store)?
            .ok_or_else(|| ReconcileError::UnknownBrokerOrder {
                broker_order_no: raw.broker_order_no.clone(),
            })?;

        let mut ledgers = self.ledgers.lock().await;
        let ledger = ledgers
            .entry(order.account_id.clone())
            .or_insert_with(|| Ledger::new(order.account_id.clone(), self.initial_cash));

        let result = self.reconciler.process(raw, ledger, now).await?;
        if result.is_duplicate {
            tracing::info!(broker_order_no = raw.broker_order_no, "duplicate fill ignored");
            return Ok(());
        }

        let fill = Fill::new(
            order.order_id.as_str().to_string(),
            order.account_id.clone(),
            raw.symbol.clone(),
            raw.side,
            raw.qty,
            raw.price,
            result.fee,
            result.tax,
            raw.fill_timestamp,
        );

        // Shared with the `fills` table's own natural-key unique index, so
        // this tags every outbox row this one fill produces.
        let fill_key = format!(
            "{}:{}:{}:{}",
            fill.order_id,
            fill.fill_timestamp.timestamp_micros(),
            fill.price,
            fill.qty
        );

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| ReconcileError::Store(StoreError::Backend(e.to_string())))?;

        kx_db::portfolio::persist_fill(&mut tx, &fill)
            .await
            .map_err(|e| ReconcileError::Store(StoreError::Backend(e.to_string())))?;
        kx_db::portfolio::upsert_position(&mut tx, &order.account_id, &result.position)
            .await
            .map_err(|e| ReconcileError::Store(StoreError::Backend(e.to_string())))?;

        for entry in ledger_entries_for(&fill, result.realized_pnl_delta) {
            kx_db::portfolio::append_ledger_entry(&mut tx, &order.account_id, &entry)
                .await
                .map_err(|e| ReconcileError::Store(StoreError::Backend(e.to_string())))?;
        }

        let fill_payload = serde_json::json!({
            "order_id": fill.order_id,
            "account_id": fill.account_id,
            "symbol": fill.symbol,
            "qty": fill.qty,
            "price": fill.price,
            "fee": fill.fee,
            "tax": fill.tax,
        });
        kx_db::outbox::append_event(
            &mut tx,
            &format!("fill_received:{fill_key}"),
            "FillReceived",
            fill.fill_timestamp,
            fill_payload,
        )
        .await
        .map_err(|e| ReconcileError::Store(StoreError::Backend(e.to_string())))?;

        let position_payload = serde_json::json!({
            "account_id": order.account_id,
            "symbol": result.position.symbol,
            "qty": result.position.qty,
            "avg_price": result.position.avg_price,
            "realized_pnl": result.position.realized_pnl,
        });
        kx_db::outbox::append_event(
            &mut tx,
            &format!("position_updated:{fill_key}"),
            "PositionUpdated",
            fill.fill_timestamp,
            position_payload,
        )
        .await
        .map_err(|e| ReconcileError::Store(StoreError::Backend(e.to_string())))?;

        if result.realized_pnl_delta != Decimal::ZERO {
            let pnl_payload = serde_json::json!({
                "account_id": order.account_id,
                "symbol": fill.symbol,
                "realized_pnl_delta": result.realized_pnl_delta,
            });
            kx_db::outbox::append_event(
                &mut tx,
                &format!("pnl_updated:{fill_key}"),
                "PnlUpdated",
                fill.fill_timestamp,
                pnl_payload,
            )
            .await
            .map_err(|e| ReconcileError::Store(StoreError::Backend(e.to_string())))?;
        }

        tx.commit()
            .await
            .map_err(|e| ReconcileError::Store(StoreError::Backend(e.to_string())))?;

        Ok(())
    }
}

/// Mirrors `kx_portfolio::Ledger::append_fill`'s own row construction so the
/// runtime's persisted `pnl_ledger` rows match what the in-memory ledger
/// recorded (only nonzero components are written).
fn ledger_entries_for(fill: &Fill, realized_pnl_delta: Decimal) -> Vec<LedgerEntry> {
    let mut entries = Vec::new();
    if realized_pnl_delta != Decimal::ZERO {
        entries.push(LedgerEntry {
            symbol: fill.symbol.clone(),
            event_type: LedgerEventType::Fill,
            amount: realized_pnl_delta,
            ref_id: fill.order_id.clone(),
            event_timestamp: fill.fill_timestamp,
        });
    }
    if fill.fee > Decimal::ZERO {
        entries.push(LedgerEntry {
            symbol: fill.symbol.clone(),
            event_type: LedgerEventType::Fee,
            amount: -fill.fee,
            ref_id: fill.order_id.clone(),
            event_timestamp: fill.fill_timestamp,
        });
    }
    if fill.tax > Decimal::ZERO {
        entries.push(LedgerEntry {
            symbol: fill.symbol.clone(),
            event_type: LedgerEventType::Tax,
            amount: -fill.tax,
            ref_id: fill.order_id.clone(),
            event_timestamp: fill.fill_timestamp,
        });
    }
    entries
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use kx_schemas::Side;
    use rust_decimal_macros::dec;

    fn fill(fee: Decimal, tax: Decimal) -> Fill {
        Fill::new(
            "order-1",
            "acct-1",
            "005930",
            Side::Buy,
            10,
            dec!(70000),
            fee,
            tax,
            Utc::now(),
        )
    }

    #[test]
    fn zero_components_produce_no_rows() {
        let f = fill(Decimal::ZERO, Decimal::ZERO);
        let entries = ledger_entries_for(&f, Decimal::ZERO);
        assert!(entries.is_empty());
    }

    #[test]
    fn nonzero_realized_pnl_produces_a_fill_row() {
        let f = fill(Decimal::ZERO, Decimal::ZERO);
        let entries = ledger_entries_for(&f, dec!(150));
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].event_type, LedgerEventType::Fill);
        assert_eq!(entries[0].amount, dec!(150));
    }

    #[test]
    fn fee_and_tax_produce_negative_rows() {
        let f = fill(dec!(10), dec!(23));
        let entries = ledger_entries_for(&f, Decimal::ZERO);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].event_type, LedgerEventType::Fee);
        assert_eq!(entries[0].amount, dec!(-10));
        assert_eq!(entries[1].event_type, LedgerEventType::Tax);
        assert_eq!(entries[1].amount, dec!(-23));
    }
}
