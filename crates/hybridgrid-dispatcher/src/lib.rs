//! Dispatcher orchestration (§4.9): handshake, heartbeat, dispatch, and
//! worker-status, plus the worker selection policy and the
//! retry-once-then-give-up rule for transport failures.
//!
//! The dispatcher owns no network code. `WorkerTransport` is the seam
//! `hybridgrid-rpc` implements with a `reqwest` client; this crate only
//! decides *which* worker a task goes to and *whether* a transport failure
//! deserves a second attempt.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use hybridgrid_auth::AuthGuard;
use hybridgrid_metrics::Metrics;
use hybridgrid_registry::Registry;
use hybridgrid_types::{
    CompileOutcome, CompileTask, HandshakeRequest, HandshakeResponse, HybridGridError, WorkerEntry,
};
use tracing::{info, warn};

/// A handle for dispatching a compile task to a specific worker address.
/// `Err(WorkerTransportError)` is the only error variant the dispatcher's
/// retry logic inspects; any other error is propagated without a retry.
#[async_trait]
pub trait WorkerTransport: Send + Sync {
    async fn compile(&self, worker: &WorkerEntry, task: &CompileTask) -> Result<CompileOutcome, HybridGridError>;
}

/// What a successful dispatch produced: which worker ran the task and what
/// it returned. A failed *build* (non-zero exit) is still a successful
/// dispatch — the failure lives in `outcome`, not in the `Result`.
#[derive(Debug, Clone)]
pub struct DispatchOutcome {
    pub worker_id: String,
    pub outcome: CompileOutcome,
}

/// How long a worker's heartbeat interval is advertised as, in the
/// handshake response. Workers are expected to heartbeat at roughly half
/// this cadence.
const DEFAULT_HEARTBEAT_INTERVAL_MS: u64 = 5_000;

pub struct Dispatcher {
    registry: Arc<Registry>,
    guard: AuthGuard,
    metrics: Option<Arc<Metrics>>,
}

impl Dispatcher {
    pub fn new(registry: Arc<Registry>, guard: AuthGuard) -> Self {
        Self { registry, guard, metrics: None }
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Handshake (§4.9): validate capabilities, verify the bearer token,
    /// register the worker, and hand back its assigned id.
    pub fn handshake(&self, request: &HandshakeRequest) -> Result<HandshakeResponse, HybridGridError> {
        hybridgrid_validate::validate_handshake(request)?;
        self.guard.verify("Handshake", Some(&format!("Bearer {}", request.token.as_str())))?;

        let worker_id = self.registry.register(
            request.capabilities.clone(),
            request.address.clone(),
            hybridgrid_types::DiscoverySource::Manual,
        );

        info!(worker_id, address = %request.address, "worker handshake accepted");
        Ok(HandshakeResponse {
            accepted: true,
            worker_id,
            heartbeat_interval_ms: DEFAULT_HEARTBEAT_INTERVAL_MS,
            message: "accepted".to_string(),
        })
    }

    /// Heartbeat (§4.9): refresh a known worker's liveness epoch.
    pub fn heartbeat(&self, worker_id: &str) -> Result<(), HybridGridError> {
        if self.registry.heartbeat(worker_id) {
            Ok(())
        } else {
            Err(HybridGridError::Internal(format!("heartbeat from unknown worker {worker_id}")))
        }
    }

    pub fn worker_status(&self) -> Vec<WorkerEntry> {
        self.registry.snapshot()
    }

    /// Dispatch (§4.9): validate, sanitize, select a worker, forward the
    /// task, and apply the retry-once policy for transport errors.
    ///
    /// A non-empty sanitizer removal list means the caller submitted a task
    /// whose args were not sanitized the way §4.5 requires — rejected
    /// outright rather than silently cleaned, so the caller can fix its
    /// pipeline instead of unknowingly shipping stripped flags.
    pub async fn dispatch(
        &self,
        mut task: CompileTask,
        transport: &dyn WorkerTransport,
    ) -> Result<DispatchOutcome, HybridGridError> {
        hybridgrid_validate::validate_compile_task(&task)?;

        let (cleaned, removed) = hybridgrid_sanitize::sanitize(&task.sanitized_args);
        if !removed.is_empty() {
            return Err(HybridGridError::SanitizationRejected { removed: removed.len(), removed_list: removed });
        }
        task.sanitized_args = cleaned;

        let mut excluded = Vec::new();
        let mut last_error = HybridGridError::NoWorkersAvailable;

        for attempt in 0..2 {
            let Some(worker) = self.select(&task, &excluded) else {
                return Err(last_error);
            };
            let worker_id = worker.capabilities.worker_id.clone();

            if !self.registry.begin_task(&worker_id) {
                excluded.push(worker_id);
                continue;
            }

            let started = Instant::now();
            match transport.compile(&worker, &task).await {
                Ok(outcome) => {
                    let latency_ms = started.elapsed().as_millis() as u64;
                    self.registry.complete_task(&worker_id, true, outcome.success, Some(latency_ms));
                    if let Some(metrics) = &self.metrics {
                        let label = if outcome.success { "success" } else { "build_failure" };
                        metrics.tasks_dispatched_total.with_label_values(&[&worker_id, label]).inc();
                        metrics
                            .dispatch_latency_seconds
                            .with_label_values(&[&worker_id])
                            .observe(latency_ms as f64 / 1000.0);
                        metrics.record_circuit_state(&worker_id, self.registry.breaker(&worker_id).state().label());
                    }
                    return Ok(DispatchOutcome { worker_id, outcome });
                }
                Err(error @ HybridGridError::WorkerTransportError { .. }) => {
                    self.registry.complete_task(&worker_id, false, false, None);
                    if let Some(metrics) = &self.metrics {
                        metrics.tasks_dispatched_total.with_label_values(&[&worker_id, "transport_error"]).inc();
                        metrics.record_circuit_state(&worker_id, self.registry.breaker(&worker_id).state().label());
                    }
                    warn!(worker_id, attempt, "transport error dispatching task, will retry once");
                    excluded.push(worker_id);
                    last_error = error;
                }
                Err(other) => {
                    self.registry.complete_task(&worker_id, false, false, None);
                    return Err(other);
                }
            }
        }

        Err(last_error)
    }

    /// Select the best candidate not in `excluded`: prefer an
    /// architecture/platform match, then the least-loaded worker, then the
    /// one with the lowest recent median dispatch latency. A worker with no
    /// latency samples yet is treated as the best possible tie-break value,
    /// so new workers get their first chance promptly.
    fn select(&self, task: &CompileTask, excluded: &[String]) -> Option<WorkerEntry> {
        let candidates = self.registry.candidates();
        let mut pool: Vec<WorkerEntry> =
            candidates.into_iter().filter(|w| !excluded.contains(&w.capabilities.worker_id)).collect();
        if pool.is_empty() {
            return None;
        }

        let platform_matches: Vec<WorkerEntry> = pool
            .iter()
            .filter(|w| platform_matches(task, w))
            .cloned()
            .collect();
        if !platform_matches.is_empty() {
            pool = platform_matches;
        }

        pool.into_iter().min_by(|a, b| {
            let active_cmp = a.active_tasks.cmp(&b.active_tasks);
            if active_cmp != std::cmp::Ordering::Equal {
                return active_cmp;
            }
            let latency_a = self.registry.median_latency_ms(&a.capabilities.worker_id).unwrap_or(0);
            let latency_b = self.registry.median_latency_ms(&b.capabilities.worker_id).unwrap_or(0);
            latency_a.cmp(&latency_b)
        })
    }
}

fn platform_matches(task: &CompileTask, worker: &WorkerEntry) -> bool {
    if task.target_platform.trim().is_empty() {
        return true;
    }
    let platform = task.target_platform.to_lowercase();
    platform.contains(worker.capabilities.arch.as_str()) || platform.contains(&worker.capabilities.os.to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use hybridgrid_breaker::BreakerConfig;
    use hybridgrid_types::{Arch, AuthToken, BuildType, DiscoverySource, LanguageConfig, WorkerCapabilities};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    fn caps(worker_id: &str, arch: Arch) -> WorkerCapabilities {
        WorkerCapabilities {
            worker_id: worker_id.to_string(),
            hostname: "host".into(),
            os: "linux".into(),
            arch,
            cpu_cores: 8,
            memory_bytes: 16 * 1024 * 1024 * 1024,
            docker_available: false,
            docker_images: vec![],
            max_parallel_tasks: 4,
            version: "1.0.0".into(),
        }
    }

    fn task() -> CompileTask {
        CompileTask {
            task_id: "t1".into(),
            source_hash: "ab".into(),
            compiler: "gcc".into(),
            build_type: BuildType::C,
            target_platform: "x86_64-linux".into(),
            preprocessed_source: "int main(){}".into(),
            sanitized_args: vec!["-c".into()],
            timeout_seconds: 60,
            priority: 50,
            language_config: Some(LanguageConfig::C { std: None }),
        }
    }

    struct AlwaysOkTransport;

    #[async_trait]
    impl WorkerTransport for AlwaysOkTransport {
        async fn compile(&self, _worker: &WorkerEntry, _task: &CompileTask) -> Result<CompileOutcome, HybridGridError> {
            Ok(CompileOutcome {
                success: true,
                artifact: vec![1, 2, 3],
                stderr: String::new(),
                exit_code: 0,
                duration_ms: 10,
            })
        }
    }

    struct FailNTimesThenOk {
        remaining_failures: AtomicUsize,
        attempts: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl WorkerTransport for FailNTimesThenOk {
        async fn compile(&self, worker: &WorkerEntry, _task: &CompileTask) -> Result<CompileOutcome, HybridGridError> {
            self.attempts.lock().unwrap().push(worker.capabilities.worker_id.clone());
            if self.remaining_failures.fetch_sub(1, Ordering::SeqCst) > 0 {
                return Err(HybridGridError::WorkerTransportError {
                    worker_id: worker.capabilities.worker_id.clone(),
                    message: "connection refused".into(),
                });
            }
            Ok(CompileOutcome { success: true, artifact: vec![], stderr: String::new(), exit_code: 0, duration_ms: 5 })
        }
    }

    fn dispatcher() -> (Dispatcher, Arc<Registry>) {
        let registry = Arc::new(Registry::new(BreakerConfig::default()));
        let dispatcher = Dispatcher::new(registry.clone(), AuthGuard::disabled());
        (dispatcher, registry)
    }

    #[tokio::test]
    async fn dispatches_to_only_available_worker() {
        let (dispatcher, registry) = dispatcher();
        registry.register(caps("w1", Arch::X86_64), "addr".into(), DiscoverySource::Manual);

        let result = dispatcher.dispatch(task(), &AlwaysOkTransport).await.unwrap();
        assert_eq!(result.worker_id, "w1");
        assert!(result.outcome.success);
        assert_eq!(registry.get("w1").unwrap().active_tasks, 0);
    }

    #[tokio::test]
    async fn retries_once_on_transport_error_then_succeeds() {
        let (dispatcher, registry) = dispatcher();
        registry.register(caps("w1", Arch::X86_64), "addr1".into(), DiscoverySource::Manual);
        registry.register(caps("w2", Arch::X86_64), "addr2".into(), DiscoverySource::Manual);

        let transport = FailNTimesThenOk { remaining_failures: AtomicUsize::new(1), attempts: Mutex::new(vec![]) };
        let result = dispatcher.dispatch(task(), &transport).await.unwrap();
        assert!(result.outcome.success);
        assert_eq!(transport.attempts.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn exhausting_retry_yields_no_workers_available() {
        let (dispatcher, registry) = dispatcher();
        registry.register(caps("w1", Arch::X86_64), "addr1".into(), DiscoverySource::Manual);

        let transport = FailNTimesThenOk { remaining_failures: AtomicUsize::new(99), attempts: Mutex::new(vec![]) };
        let error = dispatcher.dispatch(task(), &transport).await.unwrap_err();
        assert!(matches!(error, HybridGridError::NoWorkersAvailable | HybridGridError::WorkerTransportError { .. }));
    }

    #[tokio::test]
    async fn no_candidates_yields_no_workers_available() {
        let (dispatcher, _registry) = dispatcher();
        let error = dispatcher.dispatch(task(), &AlwaysOkTransport).await.unwrap_err();
        assert!(matches!(error, HybridGridError::NoWorkersAvailable));
    }

    #[tokio::test]
    async fn unsanitized_args_are_rejected() {
        let (dispatcher, registry) = dispatcher();
        registry.register(caps("w1", Arch::X86_64), "addr".into(), DiscoverySource::Manual);
        let mut t = task();
        t.sanitized_args = vec!["--plugin".into(), "evil.so".into()];
        let error = dispatcher.dispatch(t, &AlwaysOkTransport).await.unwrap_err();
        assert!(matches!(error, HybridGridError::SanitizationRejected { .. }));
    }

    #[test]
    fn handshake_requires_valid_token_when_guard_enabled() {
        let registry = Arc::new(Registry::new(BreakerConfig::default()));
        let dispatcher = Dispatcher::new(registry, AuthGuard::enabled("a".repeat(32)));
        let request = HandshakeRequest {
            capabilities: caps("w1", Arch::X86_64),
            address: "addr".into(),
            token: AuthToken::new("wrong-token-wrong-token-wrong-to"),
        };
        assert!(matches!(dispatcher.handshake(&request), Err(HybridGridError::Unauthenticated(_))));
    }

    #[test]
    fn handshake_accepts_matching_token() {
        let registry = Arc::new(Registry::new(BreakerConfig::default()));
        let token = "a".repeat(32);
        let dispatcher = Dispatcher::new(registry, AuthGuard::enabled(token.clone()));
        let request =
            HandshakeRequest { capabilities: caps("w1", Arch::X86_64), address: "addr".into(), token: AuthToken::new(token) };
        let response = dispatcher.handshake(&request).unwrap();
        assert!(response.accepted);
        assert_eq!(response.worker_id, "w1");
    }
}
