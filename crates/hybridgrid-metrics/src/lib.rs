//! Coordinator/worker metrics surface (§4.12 ambient concerns).
//!
//! A fresh [`Metrics`] owns its own [`prometheus::Registry`] rather than
//! reaching for a process-global singleton, so tests and multiple
//! in-process coordinator instances (as in integration tests that spin up
//! a coordinator and several workers in one process) each get an
//! independent set of collectors.

use hybridgrid_types::HybridGridError;
use prometheus::{
    HistogramOpts, HistogramVec, IntCounterVec, IntGauge, IntGaugeVec, Opts, Registry, TextEncoder,
};

pub struct Metrics {
    registry: Registry,
    pub tasks_dispatched_total: IntCounterVec,
    pub dispatch_latency_seconds: HistogramVec,
    pub preprocess_duration_seconds: HistogramVec,
    pub workers_available: IntGauge,
    pub worker_circuit_state: IntGaugeVec,
    pub breaker_trips_total: IntCounterVec,
}

impl Metrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let tasks_dispatched_total = IntCounterVec::new(
            Opts::new("hybridgrid_tasks_dispatched_total", "Compile tasks dispatched to workers"),
            &["worker_id", "outcome"],
        )?;
        let dispatch_latency_seconds = HistogramVec::new(
            HistogramOpts::new(
                "hybridgrid_dispatch_latency_seconds",
                "Time from dispatch to a worker's response",
            ),
            &["worker_id"],
        )?;
        let preprocess_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "hybridgrid_preprocess_duration_seconds",
                "Local preprocessor wall-clock time",
            ),
            &["compiler_family"],
        )?;
        let workers_available =
            IntGauge::new("hybridgrid_workers_available", "Workers with a non-open breaker and spare capacity")?;
        let worker_circuit_state = IntGaugeVec::new(
            Opts::new("hybridgrid_worker_circuit_state", "1 if the worker's breaker is in this state, else 0"),
            &["worker_id", "state"],
        )?;
        let breaker_trips_total = IntCounterVec::new(
            Opts::new("hybridgrid_breaker_trips_total", "Times a worker's circuit breaker tripped open"),
            &["worker_id"],
        )?;

        registry.register(Box::new(tasks_dispatched_total.clone()))?;
        registry.register(Box::new(dispatch_latency_seconds.clone()))?;
        registry.register(Box::new(preprocess_duration_seconds.clone()))?;
        registry.register(Box::new(workers_available.clone()))?;
        registry.register(Box::new(worker_circuit_state.clone()))?;
        registry.register(Box::new(breaker_trips_total.clone()))?;

        Ok(Self {
            registry,
            tasks_dispatched_total,
            dispatch_latency_seconds,
            preprocess_duration_seconds,
            workers_available,
            worker_circuit_state,
            breaker_trips_total,
        })
    }

    /// Record a circuit breaker state transition for `worker_id`: sets the
    /// gauge for `new_state` to 1 and every other known state to 0.
    pub fn record_circuit_state(&self, worker_id: &str, new_state: &str) {
        for state in ["CLOSED", "HALF_OPEN", "OPEN"] {
            let value = if state == new_state { 1 } else { 0 };
            self.worker_circuit_state.with_label_values(&[worker_id, state]).set(value);
        }
        if new_state == "OPEN" {
            self.breaker_trips_total.with_label_values(&[worker_id]).inc();
        }
    }

    /// Render the current snapshot in Prometheus text exposition format, as
    /// served by the `/metrics` route (§4.12).
    pub fn render(&self) -> Result<String, HybridGridError> {
        let families = self.registry.gather();
        let encoder = TextEncoder::new();
        encoder
            .encode_to_string(&families)
            .map_err(|e| HybridGridError::Internal(format!("metrics encode failed: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_instances_are_independent() {
        let a = Metrics::new().unwrap();
        let b = Metrics::new().unwrap();
        a.tasks_dispatched_total.with_label_values(&["w1", "success"]).inc();
        assert!(a.render().unwrap().contains("hybridgrid_tasks_dispatched_total"));
        assert!(!b.render().unwrap().contains("w1"));
    }

    #[test]
    fn circuit_state_transition_is_exclusive() {
        let metrics = Metrics::new().unwrap();
        metrics.record_circuit_state("w1", "OPEN");
        let rendered = metrics.render().unwrap();
        assert!(rendered.contains("state=\"OPEN\",worker_id=\"w1\"} 1") || rendered.contains("worker_id=\"w1\",state=\"OPEN\"} 1"));
        assert_eq!(metrics.breaker_trips_total.with_label_values(&["w1"]).get(), 1);
    }

    #[test]
    fn workers_available_gauge_tracks_sets() {
        let metrics = Metrics::new().unwrap();
        metrics.workers_available.set(3);
        assert_eq!(metrics.workers_available.get(), 3);
    }
}
