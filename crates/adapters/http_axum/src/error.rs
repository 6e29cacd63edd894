//! HTTP error response mapping.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use irrigo_domain::error::IrrigoError;

/// JSON error envelope returned by every endpoint.
#[derive(Serialize)]
struct ErrorBody {
    success: bool,
    error: String,
}

/// Maps [`IrrigoError`] into the `{"success": false, "error": …}` envelope.
///
/// Rejections the caller can act on (validation, conflicts, unknown ids,
/// hardware faults) answer `200` so the panel shows the message; storage
/// failures answer `500` and hide the details.
#[derive(Debug)]
pub struct ApiError(IrrigoError);

impl From<IrrigoError> for ApiError {
    fn from(err: IrrigoError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self.0 {
            IrrigoError::Storage(err) => {
                tracing::error!(error = %err, "storage error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal server error".to_string(),
                )
            }
            IrrigoError::HardwareFault(err) => {
                tracing::warn!(error = %err, "request ended in hardware fault");
                (StatusCode::OK, self.0.to_string())
            }
            other => (StatusCode::OK, other.to_string()),
        };

        (
            status,
            Json(ErrorBody {
                success: false,
                error: message,
            }),
        )
            .into_response()
    }
}
