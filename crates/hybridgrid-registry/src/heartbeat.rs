//! HeartbeatMonitor (§4.11): periodically reaps workers whose heartbeat has
//! gone silent for longer than the configured TTL.
//!
//! The monitor is the sole writer of eviction transitions; the dispatcher
//! only reads the callback it is handed to decide what to do with
//! in-flight tasks bound to an evicted worker (normally: fail them with
//! [`hybridgrid_types::HybridGridError::WorkerTransportError`] so the
//! caller's own retry path picks a different worker).

use std::sync::Arc;
use std::time::Duration;

use hybridgrid_metrics::Metrics;
use hybridgrid_types::WorkerEntry;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::Registry;

/// Ticks at `ttl / 3` (so a worker typically gets at least two missed-tick
/// grace periods before eviction) and evicts anything silent for longer
/// than `ttl`.
pub struct HeartbeatMonitor {
    registry: Arc<Registry>,
    ttl: Duration,
    metrics: Option<Arc<Metrics>>,
}

impl HeartbeatMonitor {
    pub fn new(registry: Arc<Registry>, ttl: Duration) -> Self {
        Self { registry, ttl, metrics: None }
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Run until `cancel` fires. `on_evict` is invoked once per evicted
    /// worker, in registration order within a tick, for every worker the
    /// monitor just removed. Each tick also republishes the
    /// `workers_available` gauge from a fresh registry snapshot.
    pub async fn run(&self, cancel: CancellationToken, mut on_evict: impl FnMut(WorkerEntry)) {
        let tick_period = self.ttl / 3;
        let mut interval = tokio::time::interval(tick_period.max(Duration::from_millis(1)));

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("heartbeat monitor shutting down");
                    return;
                }
                _ = interval.tick() => {
                    for evicted in self.registry.reap_expired(self.ttl) {
                        on_evict(evicted);
                    }
                    if let Some(metrics) = &self.metrics {
                        metrics.workers_available.set(self.registry.candidates().len() as i64);
                    }
                }
            }
        }
    }
}
