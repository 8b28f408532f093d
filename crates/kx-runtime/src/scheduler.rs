//! Strategy scheduler (§5): one tick loop enqueuing per-(strategy, symbol,
//! account) evaluation tasks onto a bounded worker pool, sized by
//! `scheduler.workerPoolSize` (default 8).
//!
//! "Thread"/"pool" in the concurrency model map onto `tokio` tasks and a
//! `JoinSet`-backed bounded pool here, the same substitution `kx-daemon`
//! makes for its heartbeat loop (`tokio::spawn` + `tokio::time::interval`).

use std::sync::Arc;
use std::time::Duration;

use kx_db::PgSignalStore;
use kx_strategy::{EvalTarget, StrategyRunner};
use tokio::task::JoinSet;

use crate::marketdata_hub::MarketDataHub;

/// Runs one evaluation pass over every active target, fanning out across
/// `worker_pool_size` concurrent tasks. A single target's failure is logged
/// and does not affect the others (§4.5 failure isolation).
pub async fn run_tick(
    runner: Arc<StrategyRunner<MarketDataHub, PgSignalStore>>,
    targets: Vec<EvalTarget>,
    worker_pool_size: usize,
) {
    let mut in_flight = JoinSet::new();
    let mut remaining = targets.into_iter();

    for target in remaining.by_ref().take(worker_pool_size) {
        spawn_one(&mut in_flight, runner.clone(), target);
    }

    while let Some(finished) = in_flight.join_next().await {
        if let Err(join_err) = finished {
            tracing::error!(%join_err, "strategy evaluation task panicked");
        }
        if let Some(target) = remaining.next() {
            spawn_one(&mut in_flight, runner.clone(), target);
        }
    }
}

fn spawn_one(in_flight: &mut JoinSet<()>, runner: Arc<StrategyRunner<MarketDataHub, PgSignalStore>>, target: EvalTarget) {
    in_flight.spawn(async move {
        match runner.run_once(&target).await {
            Ok(Some(signal)) => {
                tracing::info!(
                    strategy_id = %signal.strategy_id,
                    symbol = %target.symbol,
                    signal_type = ?signal.signal_type,
                    "signal generated"
                );
            }
            Ok(None) => {}
            Err(err) => {
                tracing::error!(
                    strategy_id = %target.spec.strategy_id,
                    symbol = %target.symbol,
                    error = %err,
                    "strategy evaluation failed"
                );
            }
        }
    });
}

/// Spawns the scheduler's own tick loop: every `interval`, loads the active
/// target set and runs one `run_tick` pass over it. Returns the task handle
/// so the composition root can hold/abort it on shutdown.
pub fn spawn_scheduler_loop(
    pool: sqlx::PgPool,
    runner: Arc<StrategyRunner<MarketDataHub, PgSignalStore>>,
    interval: Duration,
    worker_pool_size: usize,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            match kx_db::strategies::active_eval_targets(&pool).await {
                Ok(targets) => run_tick(runner.clone(), targets, worker_pool_size).await,
                Err(err) => tracing::error!(%err, "failed to load active strategy targets"),
            }
        }
    })
}
