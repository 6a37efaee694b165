//! HTTP/JSON wire schema for the RPC Surface (§4.12).
//!
//! This crate owns only the route paths and the request/response bodies
//! that travel over them; it has no opinion on how those bodies are served
//! or fetched (`hybridgrid-rpc` owns the `axum` server and `reqwest`
//! client). Request/response bodies that mirror a `hybridgrid-types` type
//! one-to-one are re-exported rather than duplicated.

use serde::{Deserialize, Serialize};

use hybridgrid_types::{CompileOutcome, CompileTask, HybridGridError};

pub const HANDSHAKE_ROUTE: &str = "/v1/handshake";
pub const HEARTBEAT_ROUTE: &str = "/v1/heartbeat";
pub const DISPATCH_ROUTE: &str = "/v1/dispatch";
pub const HEALTH_ROUTE: &str = "/v1/health";
pub const WORKER_STATUS_ROUTE: &str = "/v1/worker-status";
pub const METRICS_ROUTE: &str = "/metrics";

/// Route a worker's own RPC server exposes for the coordinator to forward a
/// task onto it. Distinct from [`DISPATCH_ROUTE`] (client-to-coordinator):
/// the coordinator re-sends the same [`CompileTask`] here as a plain
/// worker-to-task request, already worker-bound.
pub const COMPILE_ROUTE: &str = "/v1/compile";

pub type DispatchRequest = CompileTask;
pub type CompileRequest = CompileTask;
pub type CompileResponse = CompileOutcome;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatRequest {
    pub worker_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatResponse {
    pub acknowledged: bool,
}

/// The coordinator's reply to a dispatched task: which worker ran it, plus
/// its outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchResponse {
    pub worker_id: String,
    pub outcome: CompileOutcome,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

impl HealthResponse {
    pub fn ok() -> Self {
        Self { status: "ok", version: env!("CARGO_PKG_VERSION") }
    }
}

/// One row of the `GET /v1/worker-status` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerStatusEntry {
    pub worker_id: String,
    pub address: String,
    pub circuit_state: String,
    pub active_tasks: u32,
    pub max_parallel_tasks: u32,
    pub tasks_succeeded: u64,
    pub tasks_failed: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerStatusResponse {
    pub workers: Vec<WorkerStatusEntry>,
}

/// The JSON body returned for every non-2xx response. `code` is the same
/// stable string as [`HybridGridError::code`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

impl From<&HybridGridError> for ErrorBody {
    fn from(error: &HybridGridError) -> Self {
        Self { code: error.code().to_string(), message: error.to_string() }
    }
}

pub use hybridgrid_types::{HandshakeRequest, HandshakeResponse};
