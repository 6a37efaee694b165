use thiserror::Error;

/// The taxonomy of errors the core produces, per the error handling design.
///
/// Validation, sanitization, auth, and discovery errors surface directly to
/// the caller. Per-worker transport errors are handled internally by the
/// dispatcher (circuit breaker bookkeeping plus a single reselect); only an
/// exhausted retry escalates to [`HybridGridError::NoWorkersAvailable`].
#[derive(Debug, Error)]
pub enum HybridGridError {
    #[error("validation failed: {0:?}")]
    ValidationFailed(Vec<String>),

    #[error("sanitization rejected {removed} argument(s): {removed_list:?}")]
    SanitizationRejected {
        removed: usize,
        removed_list: Vec<String>,
    },

    #[error("unauthenticated: {0}")]
    Unauthenticated(String),

    #[error("preprocessing failed: {0}")]
    PreprocessFailed(String),

    #[error("preprocessing timed out after {0:?}")]
    PreprocessTimeout(std::time::Duration),

    #[error("no workers available")]
    NoWorkersAvailable,

    #[error("worker transport error ({worker_id}): {message}")]
    WorkerTransportError { worker_id: String, message: String },

    #[error("worker task failed ({worker_id}, exit {exit_code}): {stderr}")]
    WorkerTaskFailed {
        worker_id: String,
        exit_code: i32,
        stderr: String,
    },

    #[error("discovery timed out after {0:?}")]
    DiscoveryTimeout(std::time::Duration),

    #[error("internal error: {0}")]
    Internal(String),
}

impl HybridGridError {
    /// The stable string code used in logs, metrics labels, and RPC bodies.
    pub fn code(&self) -> &'static str {
        match self {
            Self::ValidationFailed(_) => "VALIDATION_FAILED",
            Self::SanitizationRejected { .. } => "SANITIZATION_REJECTED",
            Self::Unauthenticated(_) => "UNAUTHENTICATED",
            Self::PreprocessFailed(_) => "PREPROCESS_FAILED",
            Self::PreprocessTimeout(_) => "PREPROCESS_TIMEOUT",
            Self::NoWorkersAvailable => "NO_WORKERS_AVAILABLE",
            Self::WorkerTransportError { .. } => "WORKER_TRANSPORT_ERROR",
            Self::WorkerTaskFailed { .. } => "WORKER_TASK_FAILED",
            Self::DiscoveryTimeout(_) => "DISCOVERY_TIMEOUT",
            Self::Internal(_) => "INTERNAL",
        }
    }

    /// Whether this error should count against a worker's circuit breaker.
    pub fn is_breaker_failure(&self) -> bool {
        matches!(self, Self::WorkerTransportError { .. })
    }
}
