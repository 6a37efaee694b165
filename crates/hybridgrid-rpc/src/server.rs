//! The coordinator's `axum` server: routes from `hybridgrid-proto` wired to
//! `hybridgrid-dispatcher::Dispatcher`, gated by an `AuthGuard` middleware
//! layer.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::HeaderMap;
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use hybridgrid_auth::AuthGuard;
use hybridgrid_dispatcher::{Dispatcher, WorkerTransport};
use hybridgrid_metrics::Metrics;
use hybridgrid_proto::{
    DispatchResponse, HandshakeRequest, HandshakeResponse, HealthResponse, HeartbeatRequest, HeartbeatResponse,
    WorkerStatusEntry, WorkerStatusResponse, DISPATCH_ROUTE, HANDSHAKE_ROUTE, HEALTH_ROUTE, HEARTBEAT_ROUTE,
    METRICS_ROUTE, WORKER_STATUS_ROUTE,
};
use hybridgrid_types::CompileTask;
use tower_http::trace::TraceLayer;
use tracing::instrument;

use crate::error::ApiError;

#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<Dispatcher>,
    pub transport: Arc<dyn WorkerTransport>,
    pub guard: AuthGuard,
    pub metrics: Arc<Metrics>,
}

/// Build the coordinator's router. `HealthCheck` is always allow-listed
/// (an unauthenticated monitor needs to reach it); every other route is
/// gated by `state.guard`.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route(HANDSHAKE_ROUTE, post(handshake))
        .route(HEARTBEAT_ROUTE, post(heartbeat))
        .route(DISPATCH_ROUTE, post(dispatch))
        .route(HEALTH_ROUTE, get(health))
        .route(WORKER_STATUS_ROUTE, get(worker_status))
        .route(METRICS_ROUTE, get(metrics))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Maps a request path onto the RPC method name `AuthGuard::verify` and the
/// allow-list in `hybridgrid-core`'s wiring expect, e.g. `"HealthCheck"`.
fn method_name_for(path: &str) -> &'static str {
    match path {
        HANDSHAKE_ROUTE => "Handshake",
        HEARTBEAT_ROUTE => "Heartbeat",
        DISPATCH_ROUTE => "Dispatch",
        WORKER_STATUS_ROUTE => "GetWorkerStatus",
        METRICS_ROUTE => "Metrics",
        _ => "HealthCheck",
    }
}

async fn auth_middleware(State(state): State<AppState>, headers: HeaderMap, request: Request, next: Next) -> Response {
    let method = method_name_for(request.uri().path());
    let authorization = headers.get(axum::http::header::AUTHORIZATION).and_then(|v| v.to_str().ok());
    match state.guard.verify(method, authorization) {
        Ok(()) => next.run(request).await,
        Err(error) => ApiError(error).into_response(),
    }
}

#[instrument(skip(state, request))]
async fn handshake(
    State(state): State<AppState>,
    Json(request): Json<HandshakeRequest>,
) -> Result<Json<HandshakeResponse>, ApiError> {
    Ok(Json(state.dispatcher.handshake(&request)?))
}

#[instrument(skip(state, request))]
async fn heartbeat(
    State(state): State<AppState>,
    Json(request): Json<HeartbeatRequest>,
) -> Result<Json<HeartbeatResponse>, ApiError> {
    state.dispatcher.heartbeat(&request.worker_id)?;
    Ok(Json(HeartbeatResponse { acknowledged: true }))
}

#[instrument(skip(state, task))]
async fn dispatch(
    State(state): State<AppState>,
    Json(task): Json<CompileTask>,
) -> Result<Json<DispatchResponse>, ApiError> {
    let outcome = state.dispatcher.dispatch(task, state.transport.as_ref()).await?;
    Ok(Json(DispatchResponse { worker_id: outcome.worker_id, outcome: outcome.outcome }))
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse::ok())
}

async fn worker_status(State(state): State<AppState>) -> Json<WorkerStatusResponse> {
    let workers = state
        .dispatcher
        .worker_status()
        .into_iter()
        .map(|entry| WorkerStatusEntry {
            worker_id: entry.capabilities.worker_id,
            address: entry.address,
            circuit_state: entry.circuit_state.label().to_string(),
            active_tasks: entry.active_tasks,
            max_parallel_tasks: entry.capabilities.max_parallel_tasks,
            tasks_succeeded: entry.tasks_succeeded,
            tasks_failed: entry.tasks_failed,
        })
        .collect();
    Json(WorkerStatusResponse { workers })
}

async fn metrics(State(state): State<AppState>) -> Result<String, ApiError> {
    state.metrics.render().map_err(ApiError)
}
