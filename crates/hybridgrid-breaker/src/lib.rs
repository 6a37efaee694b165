//! Per-worker circuit breaker (§4.10).
//!
//! CLOSED admits every request. After `fail_threshold` failures within
//! `fail_window`, the breaker trips OPEN and admits nothing until
//! `open_duration` has elapsed, at which point it moves to HALF_OPEN and
//! admits a single probe request at a time. `probe_success_threshold`
//! consecutive probe successes close the breaker again; any probe failure
//! reopens it immediately.
//!
//! Adapted from the dispatcher's per-endpoint wrapper pattern: one breaker
//! instance per worker, held behind a registry keyed by worker id so the
//! dispatcher can look one up without threading it through every call site.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use dashmap::DashMap;
use hybridgrid_types::CircuitState;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy)]
pub struct BreakerConfig {
    pub fail_threshold: u32,
    pub fail_window: Duration,
    pub open_duration: Duration,
    pub probe_success_threshold: u32,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            fail_threshold: 5,
            fail_window: Duration::from_secs(60),
            open_duration: Duration::from_secs(30),
            probe_success_threshold: 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Closed,
    HalfOpen,
    Open,
}

struct Inner {
    phase: Phase,
    failures: VecDeque<Instant>,
    opened_at: Option<Instant>,
    opened_at_ms: u64,
    half_open_successes: u32,
    half_open_probe_in_flight: bool,
}

impl Inner {
    fn new() -> Self {
        Self {
            phase: Phase::Closed,
            failures: VecDeque::new(),
            opened_at: None,
            opened_at_ms: 0,
            half_open_successes: 0,
            half_open_probe_in_flight: false,
        }
    }
}

fn now_ms() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_millis() as u64).unwrap_or(0)
}

/// A single worker's breaker. Cheap to construct; state lives behind an
/// internal mutex so it can be shared via `Arc` without an outer lock.
pub struct CircuitBreaker {
    config: BreakerConfig,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new(config: BreakerConfig) -> Self {
        Self { config, inner: Mutex::new(Inner::new()) }
    }

    /// Current externally-visible snapshot, advancing OPEN -> HALF_OPEN if
    /// `open_duration` has elapsed since the trip.
    pub fn state(&self) -> CircuitState {
        let mut inner = self.inner.lock().expect("breaker mutex poisoned");
        self.maybe_half_open(&mut inner);
        match inner.phase {
            Phase::Closed => CircuitState::Closed { consecutive_failures: inner.failures.len() as u32 },
            Phase::HalfOpen => CircuitState::HalfOpen { successes: inner.half_open_successes },
            Phase::Open => CircuitState::Open { opened_at_ms: inner.opened_at_ms },
        }
    }

    /// Whether a new request may be dispatched right now. In HALF_OPEN only
    /// one probe is admitted at a time; concurrent callers beyond the first
    /// are rejected until that probe resolves.
    pub fn allow_request(&self) -> bool {
        let mut inner = self.inner.lock().expect("breaker mutex poisoned");
        self.maybe_half_open(&mut inner);
        match inner.phase {
            Phase::Closed => true,
            Phase::Open => false,
            Phase::HalfOpen => {
                if inner.half_open_probe_in_flight {
                    false
                } else {
                    inner.half_open_probe_in_flight = true;
                    true
                }
            }
        }
    }

    fn maybe_half_open(&self, inner: &mut Inner) {
        if inner.phase != Phase::Open {
            return;
        }
        let Some(opened_at) = inner.opened_at else { return };
        if opened_at.elapsed() >= self.config.open_duration {
            inner.phase = Phase::HalfOpen;
            inner.half_open_successes = 0;
            inner.half_open_probe_in_flight = false;
        }
    }

    pub fn record_success(&self) {
        let mut inner = self.inner.lock().expect("breaker mutex poisoned");
        match inner.phase {
            Phase::Closed => {
                inner.failures.clear();
            }
            Phase::HalfOpen => {
                inner.half_open_successes += 1;
                inner.half_open_probe_in_flight = false;
                if inner.half_open_successes >= self.config.probe_success_threshold {
                    inner.phase = Phase::Closed;
                    inner.failures.clear();
                    inner.opened_at = None;
                    info!("circuit breaker closed after successful probes");
                }
            }
            Phase::Open => {}
        }
    }

    pub fn record_failure(&self) {
        let mut inner = self.inner.lock().expect("breaker mutex poisoned");
        match inner.phase {
            Phase::Closed => {
                let now = Instant::now();
                inner.failures.push_back(now);
                let window = self.config.fail_window;
                while inner.failures.front().is_some_and(|t| now.duration_since(*t) > window) {
                    inner.failures.pop_front();
                }
                if inner.failures.len() as u32 >= self.config.fail_threshold {
                    inner.phase = Phase::Open;
                    inner.opened_at = Some(now);
                    inner.opened_at_ms = now_ms();
                    warn!(failures = inner.failures.len(), "circuit breaker tripped open");
                }
            }
            Phase::HalfOpen => {
                inner.phase = Phase::Open;
                inner.opened_at = Some(Instant::now());
                inner.opened_at_ms = now_ms();
                inner.half_open_probe_in_flight = false;
                inner.failures.clear();
                warn!("probe failed, circuit breaker reopened");
            }
            Phase::Open => {}
        }
    }
}

/// One breaker per worker id, created lazily on first use.
pub struct BreakerRegistry {
    config: BreakerConfig,
    breakers: DashMap<String, std::sync::Arc<CircuitBreaker>>,
}

impl BreakerRegistry {
    pub fn new(config: BreakerConfig) -> Self {
        Self { config, breakers: DashMap::new() }
    }

    pub fn get_or_create(&self, worker_id: &str) -> std::sync::Arc<CircuitBreaker> {
        self.breakers
            .entry(worker_id.to_string())
            .or_insert_with(|| std::sync::Arc::new(CircuitBreaker::new(self.config)))
            .clone()
    }

    pub fn remove(&self, worker_id: &str) {
        self.breakers.remove(worker_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_config() -> BreakerConfig {
        BreakerConfig {
            fail_threshold: 3,
            fail_window: Duration::from_secs(60),
            open_duration: Duration::from_millis(20),
            probe_success_threshold: 2,
        }
    }

    #[test]
    fn closed_admits_until_threshold() {
        let breaker = CircuitBreaker::new(fast_config());
        assert!(breaker.allow_request());
        breaker.record_failure();
        breaker.record_failure();
        assert!(breaker.state().is_healthy());
        breaker.record_failure();
        assert!(matches!(breaker.state(), CircuitState::Open { .. }));
        assert!(!breaker.allow_request());
    }

    #[test]
    fn success_resets_failure_count_while_closed() {
        let breaker = CircuitBreaker::new(fast_config());
        breaker.record_failure();
        breaker.record_failure();
        breaker.record_success();
        breaker.record_failure();
        breaker.record_failure();
        assert!(breaker.state().is_healthy());
    }

    #[test]
    fn open_moves_to_half_open_after_duration_and_closes_on_probe_successes() {
        let breaker = CircuitBreaker::new(fast_config());
        for _ in 0..3 {
            breaker.record_failure();
        }
        assert!(matches!(breaker.state(), CircuitState::Open { .. }));

        std::thread::sleep(Duration::from_millis(30));
        assert!(matches!(breaker.state(), CircuitState::HalfOpen { .. }));
        assert!(breaker.allow_request());
        assert!(!breaker.allow_request(), "only one probe admitted at a time");

        breaker.record_success();
        assert!(matches!(breaker.state(), CircuitState::HalfOpen { .. }));
        assert!(breaker.allow_request());
        breaker.record_success();
        assert!(breaker.state().is_healthy());
    }

    #[test]
    fn half_open_probe_failure_reopens_immediately() {
        let breaker = CircuitBreaker::new(fast_config());
        for _ in 0..3 {
            breaker.record_failure();
        }
        std::thread::sleep(Duration::from_millis(30));
        assert!(matches!(breaker.state(), CircuitState::HalfOpen { .. }));
        breaker.allow_request();
        breaker.record_failure();
        assert!(matches!(breaker.state(), CircuitState::Open { .. }));
    }

    #[test]
    fn registry_reuses_breaker_per_worker() {
        let registry = BreakerRegistry::new(fast_config());
        let a = registry.get_or_create("w1");
        let b = registry.get_or_create("w1");
        a.record_failure();
        a.record_failure();
        a.record_failure();
        assert!(matches!(b.state(), CircuitState::Open { .. }));
    }

    proptest::proptest! {
        #[test]
        fn never_opens_below_threshold(failures in 0u32..2) {
            let breaker = CircuitBreaker::new(fast_config());
            for _ in 0..failures {
                breaker.record_failure();
            }
            proptest::prop_assert!(breaker.state().is_healthy());
        }
    }
}
