//! The outbound half of the RPC Surface: a `reqwest`-based [`WorkerClient`]
//! (coordinator -> worker, implementing `hybridgrid_dispatcher::WorkerTransport`)
//! and [`CoordinatorClient`] (worker/CLI -> coordinator).

use std::time::Duration;

use async_trait::async_trait;
use hybridgrid_dispatcher::WorkerTransport;
use hybridgrid_proto::{
    DispatchResponse, HandshakeRequest, HandshakeResponse, HealthResponse, HeartbeatRequest, HeartbeatResponse,
    WorkerStatusResponse, COMPILE_ROUTE, DISPATCH_ROUTE, HANDSHAKE_ROUTE, HEALTH_ROUTE, HEARTBEAT_ROUTE,
    WORKER_STATUS_ROUTE,
};
use hybridgrid_types::{CompileOutcome, CompileTask, HybridGridError, WorkerEntry};
use reqwest::Client;

fn transport_error(worker_id: &str, message: impl std::fmt::Display) -> HybridGridError {
    HybridGridError::WorkerTransportError { worker_id: worker_id.to_string(), message: message.to_string() }
}

/// Calls a worker's own `/v1/compile` route. One instance is shared across
/// every dispatch (a `reqwest::Client` pools connections internally).
pub struct WorkerClient {
    client: Client,
    token: Option<String>,
}

impl WorkerClient {
    pub fn new(token: Option<String>) -> Result<Self, HybridGridError> {
        let client = Client::builder()
            .build()
            .map_err(|e| HybridGridError::Internal(format!("failed to build http client: {e}")))?;
        Ok(Self { client, token })
    }

    fn request(&self, url: &str) -> reqwest::RequestBuilder {
        let request = self.client.post(url);
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

#[async_trait]
impl WorkerTransport for WorkerClient {
    async fn compile(&self, worker: &WorkerEntry, task: &CompileTask) -> Result<CompileOutcome, HybridGridError> {
        let worker_id = &worker.capabilities.worker_id;
        let url = format!("http://{}{COMPILE_ROUTE}", worker.address);
        let timeout = Duration::from_secs(task.timeout_seconds.max(1) as u64);

        let response = self
            .request(&url)
            .json(task)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| transport_error(worker_id, e))?;

        if !response.status().is_success() {
            return Err(transport_error(worker_id, format!("worker returned HTTP {}", response.status())));
        }

        response.json::<CompileOutcome>().await.map_err(|e| transport_error(worker_id, e))
    }
}

/// The client half a worker process (or the CLI, for one-shot `compile`
/// invocations) uses to talk to a coordinator.
pub struct CoordinatorClient {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl CoordinatorClient {
    pub fn new(base_url: impl Into<String>, token: Option<String>) -> Result<Self, HybridGridError> {
        let client = Client::builder()
            .build()
            .map_err(|e| HybridGridError::Internal(format!("failed to build http client: {e}")))?;
        Ok(Self { client, base_url: base_url.into(), token })
    }

    fn request(&self, method: reqwest::Method, route: &str) -> reqwest::RequestBuilder {
        let request = self.client.request(method, format!("{}{route}", self.base_url));
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    pub async fn handshake(&self, request: &HandshakeRequest) -> Result<HandshakeResponse, HybridGridError> {
        self.post_json(HANDSHAKE_ROUTE, request).await
    }

    pub async fn heartbeat(&self, worker_id: &str) -> Result<HeartbeatResponse, HybridGridError> {
        self.post_json(HEARTBEAT_ROUTE, &HeartbeatRequest { worker_id: worker_id.to_string() }).await
    }

    pub async fn dispatch(&self, task: &CompileTask) -> Result<DispatchResponse, HybridGridError> {
        self.post_json(DISPATCH_ROUTE, task).await
    }

    pub async fn health(&self) -> Result<HealthResponse, HybridGridError> {
        let response = self
            .request(reqwest::Method::GET, HEALTH_ROUTE)
            .send()
            .await
            .map_err(|e| HybridGridError::Internal(format!("health check failed: {e}")))?;
        response
            .json()
            .await
            .map_err(|e| HybridGridError::Internal(format!("health response decode failed: {e}")))
    }

    pub async fn worker_status(&self) -> Result<WorkerStatusResponse, HybridGridError> {
        let response = self
            .request(reqwest::Method::GET, WORKER_STATUS_ROUTE)
            .send()
            .await
            .map_err(|e| HybridGridError::Internal(format!("worker-status request failed: {e}")))?;
        response
            .json()
            .await
            .map_err(|e| HybridGridError::Internal(format!("worker-status response decode failed: {e}")))
    }

    async fn post_json<Req: serde::Serialize + ?Sized, Res: serde::de::DeserializeOwned>(
        &self,
        route: &str,
        body: &Req,
    ) -> Result<Res, HybridGridError> {
        let response = self
            .request(reqwest::Method::POST, route)
            .json(body)
            .send()
            .await
            .map_err(|e| HybridGridError::Internal(format!("request to {route} failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body: hybridgrid_proto::ErrorBody = response
                .json()
                .await
                .unwrap_or_else(|_| hybridgrid_proto::ErrorBody { code: "INTERNAL".into(), message: status.to_string() });
            return Err(error_from_code(&body.code, body.message));
        }

        response.json().await.map_err(|e| HybridGridError::Internal(format!("response from {route} decode failed: {e}")))
    }
}

/// Reconstruct a best-effort [`HybridGridError`] from a coordinator's
/// stable error code, for callers that want to branch on error kind rather
/// than only the HTTP status.
fn error_from_code(code: &str, message: String) -> HybridGridError {
    match code {
        "NO_WORKERS_AVAILABLE" => HybridGridError::NoWorkersAvailable,
        "UNAUTHENTICATED" => HybridGridError::Unauthenticated(message),
        "VALIDATION_FAILED" => HybridGridError::ValidationFailed(vec![message]),
        "DISCOVERY_TIMEOUT" => HybridGridError::DiscoveryTimeout(Duration::from_secs(0)),
        _ => HybridGridError::Internal(message),
    }
}
