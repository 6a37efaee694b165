//! The coordinator's worker registry (§4.9) and heartbeat eviction monitor
//! (§4.11).
//!
//! [`Registry`] is the single writer of worker state: every other component
//! (the dispatcher's selection policy, the `/v1/worker-status` handler)
//! reads a cloned [`WorkerEntry`] snapshot rather than holding a reference
//! into the map. A worker's circuit breaker is a value owned by the
//! registry entry's slot (held in a sibling `BreakerRegistry` keyed by the
//! same worker id) so the dispatcher looks the breaker up through the
//! registry instead of threading an `Arc<CircuitBreaker>` through call
//! sites that only need to read worker metadata.

mod heartbeat;

pub use heartbeat::HeartbeatMonitor;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use hybridgrid_breaker::{BreakerConfig, BreakerRegistry, CircuitBreaker};
use hybridgrid_types::{DiscoverySource, WorkerCapabilities, WorkerEntry};
use parking_lot::RwLock;
use tracing::info;

fn now_ms() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_millis() as u64).unwrap_or(0)
}

/// A recent dispatch latency sample, used only for the dispatcher's
/// least-loaded tie-break (lowest recent median latency). Capped per worker
/// so the registry's memory footprint does not grow unbounded.
const LATENCY_SAMPLE_CAP: usize = 32;

struct Slot {
    entry: WorkerEntry,
    recent_latencies_ms: Vec<u64>,
}

/// The coordinator's live view of every handshaken worker.
pub struct Registry {
    slots: RwLock<HashMap<String, Slot>>,
    breakers: BreakerRegistry,
    next_anonymous_id: AtomicU64,
}

impl Registry {
    pub fn new(breaker_config: BreakerConfig) -> Self {
        Self {
            slots: RwLock::new(HashMap::new()),
            breakers: BreakerRegistry::new(breaker_config),
            next_anonymous_id: AtomicU64::new(1),
        }
    }

    /// Register (or re-register) a worker. A worker handshaking again with
    /// the same `worker_id` replaces its prior entry outright rather than
    /// merging fields, since the new handshake reflects current reality.
    pub fn register(
        &self,
        mut capabilities: WorkerCapabilities,
        address: String,
        source: DiscoverySource,
    ) -> String {
        if capabilities.worker_id.trim().is_empty() {
            capabilities.worker_id =
                format!("anon-{}", self.next_anonymous_id.fetch_add(1, Ordering::SeqCst));
        }
        let worker_id = capabilities.worker_id.clone();

        let entry = WorkerEntry {
            capabilities,
            address,
            heartbeat_epoch_ms: now_ms(),
            active_tasks: 0,
            tasks_issued: 0,
            tasks_succeeded: 0,
            tasks_failed: 0,
            circuit_state: hybridgrid_types::CircuitState::default(),
            discovery_source: source,
        };

        self.breakers.get_or_create(&worker_id);
        self.slots.write().insert(worker_id.clone(), Slot { entry, recent_latencies_ms: Vec::new() });
        info!(worker_id, "worker registered");
        worker_id
    }

    /// Refresh a worker's heartbeat epoch. Returns `false` if the worker is
    /// unknown (it must handshake before it can heartbeat).
    pub fn heartbeat(&self, worker_id: &str) -> bool {
        let mut slots = self.slots.write();
        let Some(slot) = slots.get_mut(worker_id) else { return false };
        slot.entry.heartbeat_epoch_ms = now_ms();
        true
    }

    pub fn snapshot(&self) -> Vec<WorkerEntry> {
        self.slots.read().values().map(|slot| slot.entry.clone()).collect()
    }

    pub fn get(&self, worker_id: &str) -> Option<WorkerEntry> {
        self.slots.read().get(worker_id).map(|slot| slot.entry.clone())
    }

    /// The worker's breaker, created lazily if this is somehow the first
    /// lookup (should not happen outside tests: `register` always creates
    /// one first).
    pub fn breaker(&self, worker_id: &str) -> Arc<CircuitBreaker> {
        self.breakers.get_or_create(worker_id)
    }

    /// Candidate workers for dispatch: present in the registry, breaker not
    /// OPEN, and with spare `active_tasks` capacity. Does not filter by
    /// platform/architecture; that is the dispatcher's concern.
    pub fn candidates(&self) -> Vec<WorkerEntry> {
        let slots = self.slots.read();
        slots
            .values()
            .filter(|slot| slot.entry.is_available())
            .map(|slot| {
                let mut entry = slot.entry.clone();
                entry.circuit_state = self.breakers.get_or_create(&entry.capabilities.worker_id).state();
                entry
            })
            .filter(|entry| entry.is_available())
            .collect()
    }

    /// The median of a worker's recent dispatch latencies, used as the
    /// dispatcher's tie-break among equally-loaded candidates. `None` if no
    /// samples have been recorded yet (treated as "unknown", sorts last).
    pub fn median_latency_ms(&self, worker_id: &str) -> Option<u64> {
        let slots = self.slots.read();
        let samples = &slots.get(worker_id)?.recent_latencies_ms;
        if samples.is_empty() {
            return None;
        }
        let mut sorted = samples.clone();
        sorted.sort_unstable();
        Some(sorted[sorted.len() / 2])
    }

    /// Reserve a task slot on `worker_id` ahead of dispatch. Returns `false`
    /// if the worker is gone or already at capacity (a race with a
    /// concurrent dispatch or an eviction).
    pub fn begin_task(&self, worker_id: &str) -> bool {
        let mut slots = self.slots.write();
        let Some(slot) = slots.get_mut(worker_id) else { return false };
        if slot.entry.active_tasks >= slot.entry.capabilities.max_parallel_tasks {
            return false;
        }
        slot.entry.active_tasks += 1;
        slot.entry.tasks_issued += 1;
        true
    }

    /// Release a reserved task slot and record its outcome.
    ///
    /// `breaker_success` drives the circuit breaker (a transport round trip
    /// that completed at all, even carrying a failed build, is a breaker
    /// success); `task_succeeded` drives the `tasks_succeeded`/`tasks_failed`
    /// counters, which reflect the actual build outcome.
    pub fn complete_task(&self, worker_id: &str, breaker_success: bool, task_succeeded: bool, latency_ms: Option<u64>) {
        let breaker = self.breakers.get_or_create(worker_id);
        if breaker_success {
            breaker.record_success();
        } else {
            breaker.record_failure();
        }

        let mut slots = self.slots.write();
        if let Some(slot) = slots.get_mut(worker_id) {
            slot.entry.active_tasks = slot.entry.active_tasks.saturating_sub(1);
            if task_succeeded {
                slot.entry.tasks_succeeded += 1;
            } else {
                slot.entry.tasks_failed += 1;
            }
            slot.entry.circuit_state = breaker.state();
            if let Some(latency_ms) = latency_ms {
                slot.recent_latencies_ms.push(latency_ms);
                if slot.recent_latencies_ms.len() > LATENCY_SAMPLE_CAP {
                    slot.recent_latencies_ms.remove(0);
                }
            }
        }
    }

    /// Remove every worker whose heartbeat is older than `ttl`, returning
    /// the evicted entries so the caller (normally [`HeartbeatMonitor`]) can
    /// reschedule any in-flight tasks bound to them.
    pub fn reap_expired(&self, ttl: Duration) -> Vec<WorkerEntry> {
        let now = now_ms();
        let ttl_ms = ttl.as_millis() as u64;
        let mut slots = self.slots.write();
        let expired: Vec<String> = slots
            .iter()
            .filter(|(_, slot)| now.saturating_sub(slot.entry.heartbeat_epoch_ms) > ttl_ms)
            .map(|(worker_id, _)| worker_id.clone())
            .collect();

        let mut evicted = Vec::with_capacity(expired.len());
        for worker_id in expired {
            if let Some(slot) = slots.remove(&worker_id) {
                self.breakers.remove(&worker_id);
                info!(worker_id, "worker evicted after missed heartbeats");
                evicted.push(slot.entry);
            }
        }
        evicted
    }

    pub fn len(&self) -> usize {
        self.slots.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hybridgrid_types::Arch;

    fn config() -> BreakerConfig {
        BreakerConfig { fail_threshold: 2, ..BreakerConfig::default() }
    }

    fn caps(worker_id: &str) -> WorkerCapabilities {
        WorkerCapabilities {
            worker_id: worker_id.to_string(),
            hostname: "host".into(),
            os: "linux".into(),
            arch: Arch::X86_64,
            cpu_cores: 8,
            memory_bytes: 16 * 1024 * 1024 * 1024,
            docker_available: false,
            docker_images: vec![],
            max_parallel_tasks: 2,
            version: "1.0.0".into(),
        }
    }

    #[test]
    fn register_then_snapshot_round_trips() {
        let registry = Registry::new(config());
        registry.register(caps("w1"), "10.0.0.1:9000".into(), DiscoverySource::Manual);
        let snapshot = registry.snapshot();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].capabilities.worker_id, "w1");
    }

    #[test]
    fn heartbeat_unknown_worker_is_rejected() {
        let registry = Registry::new(config());
        assert!(!registry.heartbeat("ghost"));
    }

    #[test]
    fn begin_task_respects_max_parallel() {
        let registry = Registry::new(config());
        registry.register(caps("w1"), "addr".into(), DiscoverySource::Manual);
        assert!(registry.begin_task("w1"));
        assert!(registry.begin_task("w1"));
        assert!(!registry.begin_task("w1"), "capacity is 2");
    }

    #[test]
    fn candidates_excludes_workers_with_open_breaker() {
        let registry = Registry::new(config());
        registry.register(caps("w1"), "addr".into(), DiscoverySource::Manual);
        assert_eq!(registry.candidates().len(), 1);

        let breaker = registry.breaker("w1");
        breaker.record_failure();
        breaker.record_failure();
        assert_eq!(registry.candidates().len(), 0);
    }

    #[test]
    fn complete_task_updates_counters_and_breaker() {
        let registry = Registry::new(config());
        registry.register(caps("w1"), "addr".into(), DiscoverySource::Manual);
        registry.begin_task("w1");
        registry.complete_task("w1", true, false, Some(120));

        let entry = registry.get("w1").unwrap();
        assert_eq!(entry.active_tasks, 0);
        assert_eq!(entry.tasks_failed, 1);
        assert_eq!(entry.tasks_succeeded, 0);
        assert_eq!(registry.median_latency_ms("w1"), Some(120));
    }

    #[test]
    fn reap_expired_evicts_and_drops_breaker() {
        let registry = Registry::new(config());
        registry.register(caps("w1"), "addr".into(), DiscoverySource::Manual);
        let evicted = registry.reap_expired(Duration::from_millis(0));
        assert_eq!(evicted.len(), 1);
        assert_eq!(registry.len(), 0);
    }

    #[test]
    fn empty_worker_id_gets_an_anonymous_one() {
        let registry = Registry::new(config());
        let mut c = caps("");
        c.worker_id.clear();
        let worker_id = registry.register(c, "addr".into(), DiscoverySource::Manual);
        assert!(worker_id.starts_with("anon-"));
    }

    proptest::proptest! {
        #[test]
        fn begin_task_never_exceeds_capacity(max_parallel in 1u32..8) {
            let registry = Registry::new(config());
            let mut c = caps("w1");
            c.max_parallel_tasks = max_parallel;
            registry.register(c, "addr".into(), DiscoverySource::Manual);

            let mut admitted = 0;
            for _ in 0..(max_parallel * 2) {
                if registry.begin_task("w1") {
                    admitted += 1;
                }
            }
            proptest::prop_assert_eq!(admitted, max_parallel);
        }
    }
}
