use serde::{Deserialize, Serialize};

/// Build-type discriminator for a [`CompileTask`]'s per-language sub-config.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildType {
    C,
    Cxx,
    Unspecified,
}

/// Per-language sub-config, whose discriminant must agree with `build_type`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LanguageConfig {
    C { std: Option<String> },
    Cxx { std: Option<String> },
}

impl LanguageConfig {
    pub fn matches_build_type(&self, build_type: &BuildType) -> bool {
        matches!(
            (self, build_type),
            (LanguageConfig::C { .. }, BuildType::C) | (LanguageConfig::Cxx { .. }, BuildType::Cxx)
        )
    }
}

/// The canonical compile task submitted to a coordinator.
///
/// The legacy `Compile` RPC and `BuildRequest` found in the distributed-build
/// systems this design descends from are structurally isomorphic for every
/// purpose the dispatcher cares about (task identity, payload, budget,
/// placement hint); this type is their unification. See `DESIGN.md` for the
/// rationale.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompileTask {
    /// `[A-Za-z0-9_-]+`, at most 128 characters.
    pub task_id: String,
    /// Even-length hex digest of the preprocessed source.
    pub source_hash: String,
    /// Compiler name or path from the original invocation; either an
    /// allow-listed name or a path made only of `[A-Za-z0-9/_.+-]`.
    pub compiler: String,
    pub build_type: BuildType,
    pub target_platform: String,
    /// At most 100 MiB.
    pub preprocessed_source: String,
    /// At most 256 entries.
    pub sanitized_args: Vec<String>,
    /// 0..=3600.
    pub timeout_seconds: u32,
    /// 0..=100.
    pub priority: u8,
    pub language_config: Option<LanguageConfig>,
}

/// The result of executing a [`CompileTask`] on a worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompileOutcome {
    pub success: bool,
    /// Base64 or raw bytes of the produced object file, when successful.
    pub artifact: Vec<u8>,
    pub stderr: String,
    pub exit_code: i32,
    pub duration_ms: u64,
}

/// A worker's registration call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandshakeRequest {
    pub capabilities: crate::worker::WorkerCapabilities,
    pub address: String,
    pub token: AuthToken,
}

/// The coordinator's reply to a [`HandshakeRequest`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandshakeResponse {
    pub accepted: bool,
    pub worker_id: String,
    pub heartbeat_interval_ms: u64,
    pub message: String,
}

/// An opaque bearer token. Must be at least 32 characters; verified by
/// constant-time comparison (see `hybridgrid-auth`).
#[derive(Clone, Serialize, Deserialize)]
pub struct AuthToken(String);

impl AuthToken {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn is_valid_length(&self) -> bool {
        self.0.len() >= 32
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for AuthToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("AuthToken").field(&"<redacted>").finish()
    }
}

/// Reserved mDNS TXT record keys (§3, §6).
pub const TXT_KEYS: &[&str] = &[
    "id",
    "host",
    "cpu",
    "ram",
    "arch",
    "docker",
    "images",
    "max_parallel",
    "version",
    "os",
    "grpc_port",
    "http_port",
    "instance_id",
];
