//! Composition root: wires every crate's concrete pieces into the one
//! process this spec describes (§2, §5). Nothing downstream of this module
//! knows about `sqlx`, `PaperBroker`, or any other concrete adapter — they
//! only see the trait objects this module builds.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, Utc};
use kx_auth::TokenManager;
use kx_broker_paper::PaperBroker;
use kx_db::{PgBarSource, PgOrderRepository, PgSignalStore};
use kx_execution::{OrderManager, OrderRepository, PlaceError, PlaceRequest};
use kx_fees::FeeCalculator;
use kx_reconcile::{FillReconciler, RawFill, ReconcileError};
use kx_risk::RiskState;
use kx_schemas::{Clock, SystemClock};
use kx_strategy::{EvalTarget, RunnerError, Signal, StrategyEngineRegistry, StrategyRunner};
use rust_decimal::Decimal;
use sqlx::PgPool;
use tokio::sync::Mutex;

use crate::auth_stub::PaperAuthClient;
use crate::fill_listener::FillListener;
use crate::marketdata_hub::MarketDataHub;
use crate::outbox_publisher::{self, EventPublisher, LoggingPublisher};
use crate::risk_context;
use crate::scheduler;

/// The configuration knobs §6 enumerates, already resolved out of
/// `kx-config` (this crate takes plain values, not the raw JSON).
#[derive(Clone, Debug)]
pub struct RuntimeConfig {
    pub scheduler_interval: Duration,
    pub worker_pool_size: usize,
    pub outbox_poll_interval: Duration,
    pub outbox_batch_size: i64,
    pub outbox_retry_limit: i64,
    pub marketdata_max_bars_per_symbol: usize,
    pub initial_cash_per_account: Decimal,
    pub token_refresh_margin: Duration,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            scheduler_interval: Duration::from_millis(1000),
            worker_pool_size: 8,
            outbox_poll_interval: Duration::from_millis(500),
            outbox_batch_size: 100,
            outbox_retry_limit: 50,
            marketdata_max_bars_per_symbol: 200,
            initial_cash_per_account: Decimal::new(100_000_000, 0),
            token_refresh_margin: Duration::from_secs(60),
        }
    }
}

/// Everything the daemon/CLI need to drive a trading session. Built once
/// per process from a `PgPool` and a `RuntimeConfig`.
pub struct Runtime {
    pub pool: PgPool,
    pub clock: Arc<dyn Clock>,
    pub orders: Arc<PgOrderRepository>,
    pub order_manager: Arc<OrderManager<PaperBroker, PgOrderRepository>>,
    pub strategy_runner: Arc<StrategyRunner<MarketDataHub, PgSignalStore>>,
    pub market_data: Arc<MarketDataHub>,
    pub fill_listener: Arc<FillListener>,
    pub token_manager: Arc<TokenManager>,
    /// Per-account order-frequency tracker, resident for the life of the
    /// process. `RiskState.order_frequency_tracker` is never persisted (§5:
    /// it self-heals within its own 60s window), so every other field is
    /// re-read from Postgres on each call while this one is carried across
    /// calls in memory, keyed by account.
    frequency_trackers: Mutex<HashMap<String, Vec<DateTime<Utc>>>>,
    config: RuntimeConfig,
}

impl Runtime {
    pub fn new(pool: PgPool, config: RuntimeConfig, app_key: impl Into<String>, app_secret: impl Into<String>) -> Self {
        let app_key = app_key.into();
        let app_secret = app_secret.into();
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);

        let broker = Arc::new(PaperBroker::new());
        let orders = Arc::new(PgOrderRepository::new(pool.clone()));
        let order_manager = Arc::new(OrderManager::new(broker, orders.clone(), clock.clone()));

        let fees = Arc::new(FeeCalculator::sane_default());
        let orders_dyn: Arc<dyn OrderRepository> = orders.clone();
        let reconciler = FillReconciler::new(orders_dyn.clone(), fees);
        let fill_listener = Arc::new(FillListener::new(
            pool.clone(),
            orders_dyn,
            reconciler,
            config.initial_cash_per_account,
        ));

        let bar_store = PgBarSource::new(pool.clone());
        let market_data = Arc::new(MarketDataHub::new(config.marketdata_max_bars_per_symbol, bar_store));
        let signal_store = Arc::new(PgSignalStore::new(pool.clone()));
        let strategy_runner = Arc::new(StrategyRunner::new(
            StrategyEngineRegistry::with_builtins(),
            market_data.clone(),
            signal_store,
            clock.clone(),
        ));

        let token_audit_sink: Arc<dyn kx_auth::TokenAuditSink> = Arc::new(kx_db::PgTokenAuditSink::new(pool.clone()));
        let token_manager = Arc::new(
            TokenManager::new(
                Arc::new(PaperAuthClient),
                clock.clone(),
                app_key,
                app_secret,
                true,
                config.token_refresh_margin,
            )
            .with_audit_sink(token_audit_sink),
        );

        Self {
            pool,
            clock,
            orders,
            order_manager,
            strategy_runner,
            market_data,
            fill_listener,
            token_manager,
            frequency_trackers: Mutex::new(HashMap::new()),
            config,
        }
    }

    /// Submits an order through the single choke-point (C7). The persisted
    /// risk fields (kill switch, daily P&L, exposure, ...) are re-read from
    /// Postgres on every call — an out-of-band kill-switch toggle from
    /// another process takes effect on the very next order — while the
    /// order-frequency tracker, which is never persisted, is spliced back in
    /// from this process's resident cache. `OrderManager::place` persists
    /// the (possibly mutated) risk state itself, atomically with the order
    /// row it produced.
    pub async fn place_order(&self, req: PlaceRequest) -> Result<kx_execution::Order, PlaceError> {
        let account_id = req.account_id.clone();
        let rules = risk_context::load_rules(&self.pool, &account_id)
            .await
            .map_err(|e| PlaceError::Store(kx_execution::StoreError::Backend(e.to_string())))?;
        let mut state = risk_context::load_state(&self.pool, Some(&account_id))
            .await
            .map_err(|e| PlaceError::Store(kx_execution::StoreError::Backend(e.to_string())))?;

        if let Some(cached) = self.frequency_trackers.lock().await.get(&account_id) {
            state.restore_frequency_tracker(cached.clone());
        }

        let order = self.order_manager.place(req, &rules, &mut state).await;

        self.frequency_trackers
            .lock()
            .await
            .insert(account_id, state.frequency_tracker_snapshot());

        order
    }

    /// Runs one manual strategy-evaluation trigger (§4.5 "manual trigger").
    pub async fn trigger_strategy(&self, target: &EvalTarget) -> Result<Option<Signal>, RunnerError> {
        self.strategy_runner.run_once(target).await
    }

    /// Routes one raw broker fill message through reconciliation and
    /// persistence (§4.6).
    pub async fn ingest_fill(&self, raw: &RawFill) -> Result<(), ReconcileError> {
        self.fill_listener.handle(raw, self.clock.now()).await
    }

    /// Spawns the background scheduler and outbox publisher loops, returning
    /// their task handles so the caller (daemon/CLI) can hold onto them for
    /// graceful shutdown.
    pub fn spawn_background_loops(self: &Arc<Self>) -> RuntimeHandles {
        let scheduler_handle = scheduler::spawn_scheduler_loop(
            self.pool.clone(),
            self.strategy_runner.clone(),
            self.config.scheduler_interval,
            self.config.worker_pool_size,
        );

        let publisher: Arc<dyn EventPublisher> = Arc::new(LoggingPublisher);
        let outbox_handle = outbox_publisher::spawn_publisher_loop(
            self.pool.clone(),
            publisher,
            "kx-runtime".to_string(),
            self.config.outbox_poll_interval,
            self.config.outbox_batch_size,
            self.config.outbox_retry_limit,
        );

        RuntimeHandles {
            scheduler: scheduler_handle,
            outbox_publisher: outbox_handle,
        }
    }

    pub async fn risk_state(&self, account_id: Option<&str>) -> Result<RiskState> {
        Ok(risk_context::load_state(&self.pool, account_id).await?)
    }
}

/// Handles to the runtime's background loops, held by the caller for
/// shutdown (`abort()` each on process stop).
pub struct RuntimeHandles {
    pub scheduler: tokio::task::JoinHandle<()>,
    pub outbox_publisher: tokio::task::JoinHandle<()>,
}

impl RuntimeHandles {
    pub fn abort_all(&self) {
        self.scheduler.abort();
        self.outbox_publisher.abort();
    }
}
