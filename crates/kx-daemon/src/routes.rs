//! Axum router and all HTTP handlers for kx-daemon.
//!
//! `build_router` is the single entry point; `main.rs` calls it and attaches
//! middleware layers. All handlers are `pub(crate)` so the scenario tests in
//! `tests/` can compose the router directly.

use std::collections::BTreeMap;
use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    extract::State,
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::{get, post},
    Json, Router,
};
use futures_util::{Stream, StreamExt};
use kx_schemas::Id;
use kx_strategy::{EvalTarget, StrategyParams, StrategySpec};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tracing::info;

use crate::{
    api_types::{
        ErrorResponse, HealthResponse, KillSwitchRequest, KillSwitchResponse, RiskStateView,
        StatusResponse, StrategyTriggerRequest,
    },
    state::{uptime_secs, AppState, BusMsg},
};

/// Build the complete application router wired to the given shared state.
///
/// Middleware layers (CORS, tracing) are **not** applied here; `main.rs`
/// attaches them after this call so tests can use the bare router.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/v1/health", get(health))
        .route("/v1/status", get(status_handler))
        .route("/v1/stream", get(stream))
        .route("/v1/risk/kill-switch", post(kill_switch_toggle))
        .route("/v1/strategy/trigger", post(strategy_trigger))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// GET /v1/health
// ---------------------------------------------------------------------------

pub(crate) async fn health(State(st): State<Arc<AppState>>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            ok: true,
            service: st.build.service,
            version: st.build.version,
        }),
    )
}

// ---------------------------------------------------------------------------
// GET /v1/status
// ---------------------------------------------------------------------------

pub(crate) async fn status_handler(State(st): State<Arc<AppState>>) -> Response {
    let risk = match st.runtime.risk_state(None).await {
        Ok(state) => RiskStateView::from(&state),
        Err(err) => {
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse { error: err.to_string() }),
            )
                .into_response()
        }
    };

    let resp = StatusResponse {
        service: st.build.service,
        version: st.build.version,
        uptime_secs: uptime_secs(),
        risk,
    };

    (StatusCode::OK, Json(resp)).into_response()
}

// ---------------------------------------------------------------------------
// POST /v1/risk/kill-switch
// ---------------------------------------------------------------------------

pub(crate) async fn kill_switch_toggle(
    State(st): State<Arc<AppState>>,
    Json(body): Json<KillSwitchRequest>,
) -> Response {
    let on = body.on;
    let reason = body.reason.clone();
    let account_id = body.account_id.clone();

    let result = kx_runtime::toggle_kill_switch_and_emit(
        &st.runtime.pool,
        account_id.as_deref(),
        on,
        reason.clone(),
        chrono::Utc::now(),
    )
    .await;

    match result {
        Ok(state) => {
            info!(on, account_id = ?account_id, "kill switch toggled");
            let _ = st.bus.send(BusMsg::KillSwitchToggled {
                account_id: account_id.clone(),
                on,
                reason: body.reason.clone(),
            });
            (
                StatusCode::OK,
                Json(KillSwitchResponse {
                    risk: RiskStateView::from(&state),
                }),
            )
                .into_response()
        }
        Err(err) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse { error: err.to_string() }),
        )
            .into_response(),
    }
}

// ---------------------------------------------------------------------------
// POST /v1/strategy/trigger
// ---------------------------------------------------------------------------

pub(crate) async fn strategy_trigger(
    State(st): State<Arc<AppState>>,
    Json(body): Json<StrategyTriggerRequest>,
) -> Response {
    let params: BTreeMap<String, String> = body.params;
    let target = EvalTarget {
        spec: StrategySpec {
            strategy_id: Id::from_stored(body.strategy_id.clone()),
            strategy_version_id: Id::from_stored(body.strategy_version_id.clone()),
            engine_type: body.engine_type.clone(),
            timeframe_secs: body.timeframe_secs,
            params: StrategyParams::new(params),
        },
        account_id: body.account_id.clone(),
        symbol: body.symbol.clone(),
    };

    match st.runtime.trigger_strategy(&target).await {
        Ok(signal) => {
            if let Some(ref s) = signal {
                let _ = st.bus.send(BusMsg::SignalGenerated {
                    strategy_id: s.strategy_id.to_string(),
                    symbol: s.symbol.clone(),
                    signal_type: format!("{:?}", s.signal_type),
                });
            }
            (StatusCode::OK, Json(signal)).into_response()
        }
        Err(err) => (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse { error: err.to_string() }),
        )
            .into_response(),
    }
}

// ---------------------------------------------------------------------------
// GET /v1/stream  (SSE)
// ---------------------------------------------------------------------------

pub(crate) async fn stream(State(st): State<Arc<AppState>>) -> Response {
    let mut headers = HeaderMap::new();
    headers.insert("Cache-Control", HeaderValue::from_static("no-cache"));
    headers.insert("Connection", HeaderValue::from_static("keep-alive"));

    let rx = st.bus.subscribe();
    let events = broadcast_to_sse(rx);

    (headers, Sse::new(events).keep_alive(KeepAlive::new())).into_response()
}

fn broadcast_to_sse(rx: broadcast::Receiver<BusMsg>) -> impl Stream<Item = Result<Event, Infallible>> {
    BroadcastStream::new(rx).filter_map(|msg| async move {
        match msg {
            Ok(m) => {
                let event_name = match &m {
                    BusMsg::Heartbeat { .. } => "heartbeat",
                    BusMsg::SignalGenerated { .. } => "signal_generated",
                    BusMsg::KillSwitchToggled { .. } => "kill_switch_toggled",
                    BusMsg::LogLine { .. } => "log",
                };
                let data = serde_json::to_string(&m).ok()?;
                Some(Ok(Event::default().event(event_name).data(data)))
            }
            Err(_) => None,
        }
    })
}
