use axum::Json;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};

use crate::app_error::{AppError, ErrorCode};

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        // Log before the error is flattened into a status response.
        tracing::error!(error = ?self, "Request failed");

        let code = self.code();
        match self {
            AppError::Database(_) => error_resp(StatusCode::INTERNAL_SERVER_ERROR, code, None),
            AppError::RateLimited => error_resp(StatusCode::TOO_MANY_REQUESTS, code, None),
            AppError::InvalidInput(msg) => error_resp(StatusCode::BAD_REQUEST, code, Some(msg)),
            AppError::NotFound => error_resp(StatusCode::NOT_FOUND, code, None),
            AppError::SubscriptionNotActive(msg) => {
                error_resp(StatusCode::CONFLICT, code, Some(msg))
            }
            AppError::DuplicateSubscriptionId(msg) => {
                error_resp(StatusCode::CONFLICT, code, Some(msg))
            }
            AppError::GatewayTransport(msg) => {
                error_resp(StatusCode::BAD_GATEWAY, code, Some(msg))
            }
            AppError::Gateway {
                code: gateway_code,
                message,
            } => error_resp(
                StatusCode::BAD_GATEWAY,
                code,
                Some(format!("{gateway_code}: {message}")),
            ),
            AppError::WebhookUnauthorized | AppError::WebhookNotConfigured => {
                error_resp(StatusCode::UNAUTHORIZED, code, None)
            }
            AppError::Internal(_) => error_resp(StatusCode::INTERNAL_SERVER_ERROR, code, None),
        }
    }
}

fn error_resp(status: StatusCode, code: ErrorCode, message: Option<String>) -> Response {
    let body = match message {
        Some(msg) => serde_json::json!({ "code": code.as_str(), "message": msg }),
        None => serde_json::json!({ "code": code.as_str() }),
    };
    (status, Json(body)).into_response()
}
