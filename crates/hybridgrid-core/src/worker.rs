//! Worker agent process wiring (§4.3): detects this host's capabilities,
//! handshakes with a coordinator, announces itself over mDNS, serves its
//! own `/v1/compile` route, and heartbeats until cancelled.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::Command;
use std::sync::Arc;
use std::time::Duration;

use hybridgrid_discovery::Announcer;
use hybridgrid_retry::{calculate_delay, RetryPolicy};
use hybridgrid_rpc::CoordinatorClient;
use hybridgrid_types::{AuthToken, CompileOutcome, CompileTask, HandshakeRequest, HybridGridError, WorkerCapabilities};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// A running worker: holds the id the coordinator assigned at handshake
/// time and the address it's reachable on.
pub struct WorkerAgent {
    coordinator: CoordinatorClient,
    capabilities: WorkerCapabilities,
    address: SocketAddr,
    token: Option<String>,
}

impl WorkerAgent {
    pub fn new(coordinator: CoordinatorClient, capabilities: WorkerCapabilities, address: SocketAddr, token: Option<String>) -> Self {
        Self { coordinator, capabilities, address, token }
    }

    /// Handshake, announce over mDNS, serve `/v1/compile`, and heartbeat
    /// until `cancel` fires.
    pub async fn run(&self, cancel: CancellationToken) -> Result<(), HybridGridError> {
        let token = self.token.clone().unwrap_or_default();
        let response = self
            .coordinator
            .handshake(&HandshakeRequest {
                capabilities: self.capabilities.clone(),
                address: self.address.to_string(),
                token: AuthToken::new(token),
            })
            .await?;

        if !response.accepted {
            return Err(HybridGridError::Unauthenticated(response.message));
        }
        info!(worker_id = %response.worker_id, "handshake accepted");

        let announcer = Announcer::new(self.capabilities.clone(), self.address.ip(), self.address.port())
            .map_err(|e| HybridGridError::Internal(format!("mdns announcer init failed: {e}")))?;
        if let Err(e) = announcer.start() {
            warn!(error = %e, "mdns announcement failed, continuing without it");
        }

        let listener = TcpListener::bind(self.address)
            .await
            .map_err(|e| HybridGridError::Internal(format!("failed to bind {}: {e}", self.address)))?;
        let app = compile_router();

        let serve_cancel = cancel.clone();
        let server = axum::serve(listener, app).with_graceful_shutdown(async move {
            serve_cancel.cancelled().await;
        });

        let heartbeat_interval = Duration::from_millis(response.heartbeat_interval_ms.max(1) / 2);
        let worker_id = response.worker_id.clone();
        let coordinator = &self.coordinator;
        let backoff_config = RetryPolicy::Conservative.to_config();
        let heartbeat_loop = async move {
            let mut interval = tokio::time::interval(heartbeat_interval);
            let mut consecutive_failures = 0u32;
            loop {
                interval.tick().await;
                match coordinator.heartbeat(&worker_id).await {
                    Ok(_) => consecutive_failures = 0,
                    Err(e) => {
                        consecutive_failures += 1;
                        let delay = calculate_delay(&backoff_config, consecutive_failures);
                        warn!(error = %e, attempt = consecutive_failures, ?delay, "heartbeat failed, backing off");
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        };

        tokio::select! {
            result = server => {
                if let Err(e) = result {
                    error!(error = %e, "worker compile server exited with error");
                }
            }
            _ = heartbeat_loop => {}
            _ = cancel.cancelled() => {}
        }

        let _ = announcer.stop();
        Ok(())
    }
}

fn compile_router() -> axum::Router {
    axum::Router::new().route(hybridgrid_proto::COMPILE_ROUTE, axum::routing::post(compile))
}

async fn compile(axum::Json(task): axum::Json<CompileTask>) -> axum::Json<CompileOutcome> {
    axum::Json(execute(&task))
}

/// Run a dispatched task's compiler invocation against its already
/// preprocessed source, writing it to a scratch file first since every
/// supported compiler needs a real path to read from.
fn execute(task: &CompileTask) -> CompileOutcome {
    let started = std::time::Instant::now();
    let scratch = match write_scratch_source(task) {
        Ok(path) => path,
        Err(e) => {
            return CompileOutcome {
                success: false,
                artifact: Vec::new(),
                stderr: e.to_string(),
                exit_code: -1,
                duration_ms: started.elapsed().as_millis() as u64,
            }
        }
    };

    let mut args = task.sanitized_args.clone();
    args.push(scratch.to_string_lossy().to_string());

    let output = Command::new(&task.compiler).args(&args).current_dir(scratch.parent().unwrap_or(&scratch)).output();

    let duration_ms = started.elapsed().as_millis() as u64;
    let _ = std::fs::remove_file(&scratch);

    match output {
        Ok(output) => CompileOutcome {
            success: output.status.success(),
            artifact: Vec::new(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            exit_code: output.status.code().unwrap_or(-1),
            duration_ms,
        },
        Err(e) => CompileOutcome { success: false, artifact: Vec::new(), stderr: e.to_string(), exit_code: -1, duration_ms },
    }
}

fn write_scratch_source(task: &CompileTask) -> std::io::Result<PathBuf> {
    let extension = match task.build_type {
        hybridgrid_types::BuildType::C => "i",
        hybridgrid_types::BuildType::Cxx => "ii",
        hybridgrid_types::BuildType::Unspecified => "i",
    };
    let path = std::env::temp_dir().join(format!("{}.{extension}", task.task_id));
    std::fs::write(&path, &task.preprocessed_source)?;
    Ok(path)
}

/// Probe this host's capabilities (§4.3): cores, memory, OS/arch, and
/// whether a usable `docker` binary is on `PATH`.
pub fn detect_capabilities(worker_id: impl Into<String>, max_parallel_tasks: u32) -> WorkerCapabilities {
    let cpu_cores = std::thread::available_parallelism().map(|n| n.get() as u32).unwrap_or(1);
    WorkerCapabilities {
        worker_id: worker_id.into(),
        hostname: hostname(),
        os: std::env::consts::OS.to_string(),
        arch: hybridgrid_types::Arch::parse(std::env::consts::ARCH),
        cpu_cores,
        memory_bytes: total_memory_bytes(),
        docker_available: Command::new("docker").arg("--version").output().map(|o| o.status.success()).unwrap_or(false),
        docker_images: Vec::new(),
        max_parallel_tasks,
        version: env!("CARGO_PKG_VERSION").to_string(),
    }
}

fn hostname() -> String {
    std::env::var("HOSTNAME")
        .ok()
        .or_else(|| std::fs::read_to_string("/proc/sys/kernel/hostname").ok().map(|s| s.trim().to_string()))
        .unwrap_or_else(|| "unknown-host".to_string())
}

fn total_memory_bytes() -> u64 {
    let Ok(meminfo) = std::fs::read_to_string("/proc/meminfo") else {
        return 1024 * 1024 * 1024;
    };
    meminfo
        .lines()
        .find(|line| line.starts_with("MemTotal:"))
        .and_then(|line| line.split_whitespace().nth(1))
        .and_then(|kb| kb.parse::<u64>().ok())
        .map(|kb| kb * 1024)
        .unwrap_or(1024 * 1024 * 1024)
}
