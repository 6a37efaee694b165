use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Native architecture advertised by a worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Arch {
    X86_64,
    Arm64,
    Armv7,
    Unspecified,
}

impl Arch {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::X86_64 => "x86_64",
            Self::Arm64 => "arm64",
            Self::Armv7 => "armv7",
            Self::Unspecified => "unspecified",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "x86_64" => Self::X86_64,
            "arm64" | "aarch64" => Self::Arm64,
            "armv7" => Self::Armv7,
            _ => Self::Unspecified,
        }
    }
}

/// How a worker entry came to exist in the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiscoverySource {
    Mdns,
    Manual,
    Env,
}

/// Capabilities a worker advertises at handshake time and over mDNS TXT records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerCapabilities {
    pub worker_id: String,
    pub hostname: String,
    pub os: String,
    pub arch: Arch,
    pub cpu_cores: u32,
    pub memory_bytes: u64,
    pub docker_available: bool,
    /// Full set; advertisement truncates this to the first 5 entries to
    /// respect the 255-byte mDNS TXT limit (see `hybridgrid-discovery`).
    pub docker_images: Vec<String>,
    pub max_parallel_tasks: u32,
    pub version: String,
}

impl WorkerCapabilities {
    /// `worker_id` must be non-empty, bounded, and `[A-Za-z0-9_-]+`.
    pub fn has_valid_worker_id(&self) -> bool {
        !self.worker_id.is_empty()
            && self.worker_id.len() <= 128
            && self
                .worker_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    }

    pub fn is_well_formed(&self) -> bool {
        self.has_valid_worker_id()
            && self.cpu_cores > 0
            && self.memory_bytes > 0
            && self.max_parallel_tasks > 0
    }

    /// The subset of `docker_images` advertised over the wire, capped at 5.
    pub fn advertised_images(&self) -> &[String] {
        let cap = self.docker_images.len().min(5);
        &self.docker_images[..cap]
    }
}

/// The registry's view of a handshaken worker. Mutation is owned by the
/// registry alone; other components read a snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerEntry {
    pub capabilities: WorkerCapabilities,
    pub address: String,
    /// Monotonic heartbeat epoch, in milliseconds since registry start.
    pub heartbeat_epoch_ms: u64,
    pub active_tasks: u32,
    pub tasks_issued: u64,
    pub tasks_succeeded: u64,
    pub tasks_failed: u64,
    pub circuit_state: CircuitState,
    pub discovery_source: DiscoverySource,
}

impl WorkerEntry {
    pub fn is_available(&self) -> bool {
        !matches!(self.circuit_state, CircuitState::Open { .. })
            && self.active_tasks < self.capabilities.max_parallel_tasks
    }
}

/// Per-worker circuit breaker state. See `hybridgrid-breaker` for the state
/// machine; this is the serializable snapshot the registry stores and the
/// status RPC returns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum CircuitState {
    Closed { consecutive_failures: u32 },
    HalfOpen { successes: u32 },
    Open { opened_at_ms: u64 },
}

impl Default for CircuitState {
    fn default() -> Self {
        Self::Closed { consecutive_failures: 0 }
    }
}

impl CircuitState {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Closed { .. } => "CLOSED",
            Self::HalfOpen { .. } => "HALF_OPEN",
            Self::Open { .. } => "OPEN",
        }
    }

    pub fn is_healthy(&self) -> bool {
        matches!(self, Self::Closed { .. })
    }
}

/// The browser-local view of a discovered worker advertisement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveredWorker {
    pub id: String,
    pub address: String,
    pub capabilities: WorkerCapabilities,
    pub discovered_at_ms: u64,
    pub source: DiscoverySource,
}

/// The browser-local view of a discovered coordinator advertisement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveredCoordinator {
    pub id: String,
    pub address: String,
    pub grpc_port: u16,
    pub http_port: u16,
    pub discovered_at_ms: u64,
    pub source: DiscoverySource,
}

/// Default discovery record liveness window (§4.8).
pub const DEFAULT_DISCOVERY_TTL: Duration = Duration::from_secs(60);

#[cfg(test)]
mod tests {
    use super::*;

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
            max_parallel_tasks: 4,
            version: "1.0.0".into(),
        }
    }

    #[test]
    fn worker_id_validation() {
        assert!(caps("worker-1_a").has_valid_worker_id());
        assert!(!caps("").has_valid_worker_id());
        assert!(!caps("bad id!").has_valid_worker_id());
        assert!(!caps(&"x".repeat(200)).has_valid_worker_id());
    }

    #[test]
    fn image_advertisement_caps_at_five() {
        let mut c = caps("w1");
        c.docker_images = (0..10).map(|i| format!("img{i}")).collect();
        assert_eq!(c.advertised_images().len(), 5);
    }

    #[test]
    fn circuit_state_health() {
        assert!(CircuitState::default().is_healthy());
        assert!(!CircuitState::Open { opened_at_ms: 0 }.is_healthy());
    }
}
