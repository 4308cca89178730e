//! Gateway webhook ingestion endpoint.

use axum::{
    Json, Router,
    extract::State,
    http::{HeaderMap, header},
    response::IntoResponse,
    routing::post,
};
use serde_json::json;
use tracing::{debug, error};

use crate::{adapters::http::app_state::AppState, app_error::{AppError, AppResult}};

/// Whether a webhook processing error should make the gateway retry the
/// delivery (5xx) or accept-and-log (2xx / 4xx).
fn is_retryable_error(error: &AppError) -> bool {
    match error {
        // Transient: a retry may succeed.
        AppError::Database(_) => true,
        AppError::Internal(_) => true,
        AppError::GatewayTransport(_) => true,
        AppError::RateLimited => true,

        // Expected conditions: retrying changes nothing.
        AppError::NotFound => false,
        AppError::InvalidInput(_) => false,
        AppError::SubscriptionNotActive(_) => false,
        AppError::DuplicateSubscriptionId(_) => false,
        AppError::Gateway { .. } => false,
        AppError::WebhookUnauthorized => false,
        AppError::WebhookNotConfigured => false,
    }
}

/// POST /api/webhooks/gateway
async fn handle_gateway_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> AppResult<impl IntoResponse> {
    let authorization = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());
    state.webhooks.authenticate(authorization)?;

    let event = state.webhooks.parse(&body)?;

    match state.webhooks.apply(&event).await {
        Ok(Some(subscription)) => Ok(Json(json!({
            "success": true,
            "message": "event applied",
            "merchant_subscription_id": subscription.merchant_subscription_id,
            "status": subscription.status,
        }))),
        Ok(None) => Ok(Json(json!({
            "success": true,
            "message": "event ignored",
        }))),
        // Subscription not tracked locally; expected for stale deliveries,
        // retrying will not help.
        Err(AppError::NotFound) => {
            debug!(
                merchant_subscription_id = %event.merchant_subscription_id,
                event_type = %event.event_type,
                retryable = false,
                "Webhook for untracked subscription, skipping"
            );
            Ok(Json(json!({
                "success": true,
                "message": "subscription not tracked",
            })))
        }
        Err(e) if is_retryable_error(&e) => {
            error!(
                error = %e,
                event_type = %event.event_type,
                retryable = true,
                "Webhook processing failed, returning 500 for gateway retry"
            );
            Err(AppError::Internal(format!("webhook processing failed: {e}")))
        }
        Err(e) => Err(e),
    }
}

pub(crate) fn router() -> Router<AppState> {
    Router::new().route("/gateway", post(handle_gateway_webhook))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod webhook_error_tests {
    use super::*;

    #[test]
    fn transient_errors_are_retryable() {
        assert!(is_retryable_error(&AppError::Database(
            "connection lost".into()
        )));
        assert!(is_retryable_error(&AppError::Internal("unexpected".into())));
        assert!(is_retryable_error(&AppError::GatewayTransport(
            "timeout".into()
        )));
        assert!(is_retryable_error(&AppError::RateLimited));
    }

    #[test]
    fn expected_conditions_are_not_retryable() {
        assert!(!is_retryable_error(&AppError::NotFound));
        assert!(!is_retryable_error(&AppError::InvalidInput("bad".into())));
        assert!(!is_retryable_error(&AppError::SubscriptionNotActive(
            "S1".into()
        )));
        assert!(!is_retryable_error(&AppError::DuplicateSubscriptionId(
            "S1".into()
        )));
        assert!(!is_retryable_error(&AppError::Gateway {
            code: "X".into(),
            message: "y".into()
        }));
        assert!(!is_retryable_error(&AppError::WebhookUnauthorized));
        assert!(!is_retryable_error(&AppError::WebhookNotConfigured));
    }
}
