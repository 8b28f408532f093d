//! Postgres-backed `kx_execution::OrderRepository` (§6 `orders` table).
//!
//! `persist_new_with_risk_state`/`record_transition` each write the order row
//! and an accompanying row (the risk state, or an `event_outbox` row) in one
//! transaction, matching I7.

use async_trait::async_trait;
use kx_execution::{Order, OrderRepository, OrderStatus, OrderType, StoreError};
use kx_risk::RiskState;
use kx_schemas::{Id, Side};
use sqlx::{PgPool, Row};

pub struct PgOrderRepository {
    pool: PgPool,
}

impl PgOrderRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn side_str(side: Side) -> &'static str {
    match side {
        Side::Buy => "BUY",
        Side::Sell => "SELL",
    }
}

fn parse_side(s: &str) -> Result<Side, StoreError> {
    match s {
        "BUY" => Ok(Side::Buy),
        "SELL" => Ok(Side::Sell),
        other => Err(StoreError::Invariant(format!("unknown side '{other}'"))),
    }
}

fn order_type_str(ot: OrderType) -> &'static str {
    match ot {
        OrderType::Market => "MARKET",
        OrderType::Limit => "LIMIT",
    }
}

fn parse_order_type(s: &str) -> Result<OrderType, StoreError> {
    match s {
        "MARKET" => Ok(OrderType::Market),
        "LIMIT" => Ok(OrderType::Limit),
        other => Err(StoreError::Invariant(format!("unknown order_type '{other}'"))),
    }
}

fn status_str(status: OrderStatus) -> &'static str {
    match status {
        OrderStatus::New => "NEW",
        OrderStatus::Sent => "SENT",
        OrderStatus::Accepted => "ACCEPTED",
        OrderStatus::PartiallyFilled => "PARTIALLY_FILLED",
        OrderStatus::Filled => "FILLED",
        OrderStatus::Cancelled => "CANCELLED",
        OrderStatus::Rejected => "REJECTED",
        OrderStatus::Error => "ERROR",
    }
}

fn parse_status(s: &str) -> Result<OrderStatus, StoreError> {
    Ok(match s {
        "NEW" => OrderStatus::New,
        "SENT" => OrderStatus::Sent,
        "ACCEPTED" => OrderStatus::Accepted,
        "PARTIALLY_FILLED" => OrderStatus::PartiallyFilled,
        "FILLED" => OrderStatus::Filled,
        "CANCELLED" => OrderStatus::Cancelled,
        "REJECTED" => OrderStatus::Rejected,
        "ERROR" => OrderStatus::Error,
        other => return Err(StoreError::Invariant(format!("unknown status '{other}'"))),
    })
}

const SELECT_COLUMNS: &str = "order_id, account_id, strategy_id, signal_id, symbol, side, order_type, \
     qty, price, status, idempotency_key, broker_order_no, reject_code, reject_message, \
     created_at, updated_at";

fn order_from_row(row: sqlx::postgres::PgRow) -> Result<Order, StoreError> {
    let side: String = row.try_get("side").map_err(|e| StoreError::Backend(e.to_string()))?;
    let order_type: String = row
        .try_get("order_type")
        .map_err(|e| StoreError::Backend(e.to_string()))?;
    let status: String = row.try_get("status").map_err(|e| StoreError::Backend(e.to_string()))?;
    let order_id: String = row
        .try_get("order_id")
        .map_err(|e| StoreError::Backend(e.to_string()))?;
    let strategy_id: Option<String> = row
        .try_get("strategy_id")
        .map_err(|e| StoreError::Backend(e.to_string()))?;
    let signal_id: Option<String> = row
        .try_get("signal_id")
        .map_err(|e| StoreError::Backend(e.to_string()))?;

    Ok(Order {
        order_id: Id::from_stored(order_id),
        account_id: row.try_get("account_id").map_err(|e| StoreError::Backend(e.to_string()))?,
        strategy_id: strategy_id.map(Id::from_stored),
        signal_id: signal_id.map(Id::from_stored),
        symbol: row.try_get("symbol").map_err(|e| StoreError::Backend(e.to_string()))?,
        side: parse_side(&side)?,
        order_type: parse_order_type(&order_type)?,
        qty: row.try_get("qty").map_err(|e| StoreError::Backend(e.to_string()))?,
        price: row.try_get("price").map_err(|e| StoreError::Backend(e.to_string()))?,
        status: parse_status(&status)?,
        idempotency_key: row
            .try_get("idempotency_key")
            .map_err(|e| StoreError::Backend(e.to_string()))?,
        broker_order_no: row
            .try_get("broker_order_no")
            .map_err(|e| StoreError::Backend(e.to_string()))?,
        reject_code: row.try_get("reject_code").map_err(|e| StoreError::Backend(e.to_string()))?,
        reject_message: row
            .try_get("reject_message")
            .map_err(|e| StoreError::Backend(e.to_string()))?,
        created_at: row.try_get("created_at").map_err(|e| StoreError::Backend(e.to_string()))?,
        updated_at: row.try_get("updated_at").map_err(|e| StoreError::Backend(e.to_string()))?,
    })
}

#[async_trait]
impl OrderRepository for PgOrderRepository {
    async fn find_by_idempotency_key(&self, key: &str) -> Result<Option<Order>, StoreError> {
        let row = sqlx::query(&format!("select {SELECT_COLUMNS} from orders where idempotency_key = $1"))
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        row.map(order_from_row).transpose()
    }

    async fn find_by_id(&self, id: &Id) -> Result<Option<Order>, StoreError> {
        let row = sqlx::query(&format!("select {SELECT_COLUMNS} from orders where order_id = $1"))
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        row.map(order_from_row).transpose()
    }

    async fn find_by_broker_order_no(&self, broker_order_no: &str) -> Result<Option<Order>, StoreError> {
        let row = sqlx::query(&format!("select {SELECT_COLUMNS} from orders where broker_order_no = $1"))
            .bind(broker_order_no)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        row.map(order_from_row).transpose()
    }

    async fn persist_new_with_risk_state(
        &self,
        order: &Order,
        risk_state: &RiskState,
        expected_version: i64,
    ) -> Result<bool, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        sqlx::query(
            r#"
            insert into orders (
                order_id, account_id, strategy_id, signal_id, symbol, side, order_type,
                qty, price, status, idempotency_key, broker_order_no, reject_code,
                reject_message, created_at, updated_at
            ) values ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14,$15,$16)
            "#,
        )
        .bind(order.order_id.as_str())
        .bind(&order.account_id)
        .bind(order.strategy_id.as_ref().map(Id::as_str))
        .bind(order.signal_id.as_ref().map(Id::as_str))
        .bind(&order.symbol)
        .bind(side_str(order.side))
        .bind(order_type_str(order.order_type))
        .bind(order.qty)
        .bind(order.price)
        .bind(status_str(order.status))
        .bind(&order.idempotency_key)
        .bind(&order.broker_order_no)
        .bind(&order.reject_code)
        .bind(&order.reject_message)
        .bind(order.created_at)
        .bind(order.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| StoreError::Backend(e.to_string()))?;

        let committed = crate::risk_state::save_if_version_matches_tx(&mut tx, risk_state, expected_version)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        if !committed {
            tx.rollback().await.map_err(|e| StoreError::Backend(e.to_string()))?;
            return Ok(false);
        }

        tx.commit().await.map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(true)
    }

    async fn save_risk_state(&self, risk_state: &RiskState, expected_version: i64) -> Result<bool, StoreError> {
        crate::risk_state::save_if_version_matches(&self.pool, risk_state, expected_version)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))
    }

    async fn record_transition(&self, order: &Order, event_type: &str) -> Result<(), StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        sqlx::query(
            r#"
            update orders set
                status = $2, broker_order_no = $3, reject_code = $4,
                reject_message = $5, updated_at = $6
            where order_id = $1
            "#,
        )
        .bind(order.order_id.as_str())
        .bind(status_str(order.status))
        .bind(&order.broker_order_no)
        .bind(&order.reject_code)
        .bind(&order.reject_message)
        .bind(order.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| StoreError::Backend(e.to_string()))?;

        let event_id = format!("{}:{}", order.order_id.as_str(), event_type);
        let payload = serde_json::json!({
            "order_id": order.order_id.as_str(),
            "status": status_str(order.status),
            "broker_order_no": order.broker_order_no,
        });
        crate::outbox::append_event(&mut tx, &event_id, event_type, order.updated_at, payload)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        tx.commit().await.map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(())
    }
}
