//! Maps [`HybridGridError`] onto HTTP status codes and the stable JSON error
//! body every non-2xx response carries (§7).

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use hybridgrid_proto::ErrorBody;
use hybridgrid_types::HybridGridError;

/// A thin wrapper so `HybridGridError` (defined in a crate with no `axum`
/// dependency) can implement `IntoResponse` here instead.
pub struct ApiError(pub HybridGridError);

impl From<HybridGridError> for ApiError {
    fn from(error: HybridGridError) -> Self {
        Self(error)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            HybridGridError::ValidationFailed(_) | HybridGridError::SanitizationRejected { .. } => {
                StatusCode::BAD_REQUEST
            }
            HybridGridError::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            HybridGridError::NoWorkersAvailable => StatusCode::SERVICE_UNAVAILABLE,
            HybridGridError::WorkerTransportError { .. } => StatusCode::BAD_GATEWAY,
            HybridGridError::DiscoveryTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            // WorkerTaskFailed never reaches this boundary as an error: a
            // failed build is a successful RPC carrying a failed
            // CompileOutcome (see DispatchResponse), so the 200-mapping
            // from the error handling design applies to that response body,
            // not to this variant.
            HybridGridError::PreprocessFailed(_)
            | HybridGridError::PreprocessTimeout(_)
            | HybridGridError::WorkerTaskFailed { .. }
            | HybridGridError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(ErrorBody::from(&self.0))).into_response()
    }
}
