//! Coordinator process wiring (§4.2): owns the worker [`Registry`], the
//! [`Dispatcher`], the `axum` RPC server, the mDNS [`Announcer`], and the
//! [`HeartbeatMonitor`] that reaps silent workers, and runs them all under
//! one [`CancellationToken`] until [`crate::shutdown`] fires.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use hybridgrid_auth::AuthGuard;
use hybridgrid_breaker::BreakerConfig;
use hybridgrid_config::HybridGridConfig;
use hybridgrid_dispatcher::{Dispatcher, WorkerTransport};
use hybridgrid_discovery::Announcer;
use hybridgrid_metrics::Metrics;
use hybridgrid_registry::{HeartbeatMonitor, Registry};
use hybridgrid_rpc::{router, AppState, WorkerClient};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// A fully wired, not-yet-running coordinator. Construction never fails on
/// bad network state; only [`Self::run`] can.
pub struct Coordinator {
    registry: Arc<Registry>,
    dispatcher: Arc<Dispatcher>,
    transport: Arc<dyn WorkerTransport>,
    guard: AuthGuard,
    metrics: Arc<Metrics>,
    heartbeat_ttl: Duration,
}

impl Coordinator {
    pub fn new(config: &HybridGridConfig) -> Result<Self, hybridgrid_types::HybridGridError> {
        let breaker_config = BreakerConfig {
            fail_threshold: config.breaker.fail_threshold,
            fail_window: config.breaker.fail_window,
            open_duration: config.breaker.open_duration,
            probe_success_threshold: config.breaker.probe_success_threshold,
        };
        let registry = Arc::new(Registry::new(breaker_config));
        let guard = match &config.token {
            Some(token) => AuthGuard::enabled(token.clone()),
            None => AuthGuard::disabled(),
        };
        let metrics = Arc::new(
            Metrics::new().map_err(|e| hybridgrid_types::HybridGridError::Internal(format!("metrics init failed: {e}")))?,
        );
        let dispatcher = Arc::new(Dispatcher::new(registry.clone(), guard.clone()).with_metrics(metrics.clone()));
        let transport = Arc::new(WorkerClient::new(config.token.clone())?);

        Ok(Self { registry, dispatcher, transport, guard, metrics, heartbeat_ttl: config.heartbeat_ttl })
    }

    /// Serve on `addr` until `cancel` fires, then drain in-flight requests
    /// and return. The heartbeat reaper runs alongside the server and is
    /// cancelled by the same token.
    pub async fn run(&self, addr: SocketAddr, cancel: CancellationToken) -> Result<(), hybridgrid_types::HybridGridError> {
        let state = AppState {
            dispatcher: self.dispatcher.clone(),
            transport: self.transport.clone(),
            guard: self.guard.clone(),
            metrics: self.metrics.clone(),
        };
        let app = router(state);

        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| hybridgrid_types::HybridGridError::Internal(format!("failed to bind {addr}: {e}")))?;
        let bound_addr = listener.local_addr().unwrap_or(addr);
        info!(addr = %bound_addr, "coordinator listening");

        let instance_id = format!("coordinator-{}", std::process::id());
        let announcer = Announcer::for_coordinator(instance_id, bound_addr.ip(), bound_addr.port(), bound_addr.port())
            .map_err(|e| hybridgrid_types::HybridGridError::Internal(format!("mdns announcer init failed: {e}")))?;
        if let Err(e) = announcer.start() {
            warn!(error = %e, "mdns announcement failed, continuing without it");
        }

        let monitor = HeartbeatMonitor::new(self.registry.clone(), self.heartbeat_ttl).with_metrics(self.metrics.clone());
        let monitor_cancel = cancel.clone();
        let monitor_handle = tokio::spawn(async move {
            monitor
                .run(monitor_cancel, |worker| {
                    warn!(worker_id = %worker.capabilities.worker_id, "evicted unresponsive worker");
                })
                .await;
        });

        let serve_cancel = cancel.clone();
        let server = axum::serve(listener, app).with_graceful_shutdown(async move {
            serve_cancel.cancelled().await;
        });

        if let Err(e) = server.await {
            error!(error = %e, "coordinator server exited with error");
        }

        if let Err(e) = monitor_handle.await {
            error!(error = %e, "heartbeat monitor task panicked");
        }
        let _ = announcer.stop();
        Ok(())
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hybridgrid_config::BreakerTunables;

    fn test_config() -> HybridGridConfig {
        HybridGridConfig {
            coordinator: None,
            token: None,
            max_parallel: 4,
            discovery_timeout: Duration::from_secs(5),
            discovery_ttl: Duration::from_secs(30),
            heartbeat_ttl: Duration::from_secs(15),
            breaker: BreakerTunables {
                fail_threshold: 5,
                fail_window: Duration::from_secs(60),
                open_duration: Duration::from_secs(30),
                probe_success_threshold: 2,
            },
            log_level: "info".to_string(),
        }
    }

    #[test]
    fn new_wires_components_without_error() {
        let coordinator = Coordinator::new(&test_config()).unwrap();
        assert!(coordinator.registry().is_empty());
    }

    #[tokio::test]
    async fn run_shuts_down_on_cancellation() {
        let coordinator = Coordinator::new(&test_config()).unwrap();
        let cancel = CancellationToken::new();
        let addr: SocketAddr = "127.0.0.1:0".parse().unwrap();

        let run_cancel = cancel.clone();
        let handle = tokio::spawn(async move { coordinator.run(addr, run_cancel).await });

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("coordinator did not shut down in time")
            .unwrap()
            .unwrap();
    }
}
