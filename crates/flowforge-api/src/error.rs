//! Maps `FlowError` onto HTTP status codes. One place to keep the mapping
//! so every route module logs and responds the same way.

use axum::http::StatusCode;

use flowforge_core::error::FlowError;

pub fn map_err(err: FlowError) -> StatusCode {
    tracing::error!(error = %err, "request failed");
    match err {
        FlowError::NotFound(_) => StatusCode::NOT_FOUND,
        FlowError::Validation(_) | FlowError::GraphCycle | FlowError::Template(_) => StatusCode::BAD_REQUEST,
        FlowError::AdmissionDenied { .. } => StatusCode::TOO_MANY_REQUESTS,
        FlowError::NotWaiting(_) | FlowError::Cancelled => StatusCode::CONFLICT,
        FlowError::Provider(_) | FlowError::Tool(_) => StatusCode::BAD_GATEWAY,
        FlowError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
        FlowError::NodeError { .. } | FlowError::Orphaned(_) | FlowError::Internal(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}
