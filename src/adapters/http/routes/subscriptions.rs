use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::{
    adapters::http::app_state::AppState,
    app_error::AppResult,
    application::ports::gateway::PauseWindow,
    application::use_cases::subscription_lifecycle::SetupMandateInput,
};

#[derive(Debug, Deserialize)]
struct PauseRequest {
    pause_start: DateTime<Utc>,
    pause_end: DateTime<Utc>,
}

/// POST /api/subscriptions
async fn setup_mandate(
    State(state): State<AppState>,
    Json(input): Json<SetupMandateInput>,
) -> AppResult<impl IntoResponse> {
    let outcome = state.lifecycle.setup(input).await?;
    Ok((StatusCode::CREATED, Json(outcome)))
}

/// GET /api/subscriptions
async fn list_subscriptions(State(state): State<AppState>) -> AppResult<impl IntoResponse> {
    let buckets = state.lifecycle.list_classified().await?;
    Ok(Json(buckets))
}

/// GET /api/subscriptions/{id}
async fn get_subscription(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let subscription = state.lifecycle.get(&id).await?;
    Ok(Json(subscription))
}

/// POST /api/subscriptions/reconcile
async fn reconcile_all(State(state): State<AppState>) -> AppResult<impl IntoResponse> {
    let report = state.lifecycle.reconcile_all().await?;
    Ok(Json(report))
}

/// POST /api/subscriptions/{id}/reconcile
async fn reconcile_one(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let outcome = state.lifecycle.reconcile_one(&id).await?;
    Ok(Json(outcome))
}

/// POST /api/subscriptions/{id}/cancel
async fn cancel_subscription(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let subscription = state.lifecycle.cancel(&id).await?;
    Ok(Json(subscription))
}

/// POST /api/subscriptions/{id}/pause
async fn pause_subscription(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<PauseRequest>,
) -> AppResult<impl IntoResponse> {
    let subscription = state
        .lifecycle
        .pause(
            &id,
            PauseWindow {
                pause_start: body.pause_start,
                pause_end: body.pause_end,
            },
        )
        .await?;
    Ok(Json(subscription))
}

/// POST /api/subscriptions/{id}/unpause
async fn unpause_subscription(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let subscription = state.lifecycle.unpause(&id).await?;
    Ok(Json(subscription))
}

/// POST /api/subscriptions/{id}/revoke
async fn revoke_subscription(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let subscription = state.lifecycle.revoke(&id).await?;
    Ok(Json(subscription))
}

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(setup_mandate).get(list_subscriptions))
        .route("/reconcile", post(reconcile_all))
        .route("/{id}", get(get_subscription))
        .route("/{id}/reconcile", post(reconcile_one))
        .route("/{id}/cancel", post(cancel_subscription))
        .route("/{id}/pause", post(pause_subscription))
        .route("/{id}/unpause", post(unpause_subscription))
        .route("/{id}/revoke", post(revoke_subscription))
}

#[cfg(test)]
mod tests {
    use axum::Router;
    use axum_test::TestServer;
    use serde_json::json;

    use super::*;
    use crate::domain::entities::subscription::SubscriptionStatus;
    use crate::test_utils::{TestAppStateBuilder, create_test_subscription};

    fn server(app_state: AppState) -> TestServer {
        let app: Router = router().with_state(app_state);
        TestServer::new(app).unwrap()
    }

    #[tokio::test]
    async fn setup_creates_pending_subscription() {
        let builder = TestAppStateBuilder::new();
        let server = server(builder.build());

        let response = server
            .post("/")
            .json(&json!({
                "user_id": uuid::Uuid::new_v4(),
                "amount_minor": 3000,
                "max_amount_minor": 15000,
                "amount_type": "FIXED",
                "frequency": "MONTHLY",
                "auth_workflow_type": "TRANSACTION"
            }))
            .await;

        response.assert_status(StatusCode::CREATED);
        let body: serde_json::Value = response.json();
        assert_eq!(body["subscription"]["status"], "PENDING");
        assert!(body["intent_url"].is_string());
    }

    #[tokio::test]
    async fn list_returns_classified_buckets() {
        let builder = TestAppStateBuilder::new()
            .with_subscription(create_test_subscription(|s| {
                s.merchant_subscription_id = "S1".into();
                s.status = SubscriptionStatus::Active;
            }))
            .with_subscription(create_test_subscription(|s| {
                s.merchant_subscription_id = "S2".into();
                s.status = SubscriptionStatus::Cancelled;
            }));
        let server = server(builder.build());

        let response = server.get("/").await;
        response.assert_status_ok();
        let body: serde_json::Value = response.json();
        assert_eq!(body["active"].as_array().unwrap().len(), 1);
        assert_eq!(body["cancelled_or_terminal"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn get_unknown_subscription_is_404() {
        let server = server(TestAppStateBuilder::new().build());
        let response = server.get("/missing").await;
        response.assert_status(StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn cancel_returns_terminal_subscription() {
        let builder = TestAppStateBuilder::new().with_subscription(create_test_subscription(|s| {
            s.merchant_subscription_id = "S1".into();
            s.status = SubscriptionStatus::Active;
        }));
        let server = server(builder.build());

        let response = server.post("/S1/cancel").await;
        response.assert_status_ok();
        let body: serde_json::Value = response.json();
        assert_eq!(body["status"], "CANCELLED");
    }

    #[tokio::test]
    async fn pause_rejects_inverted_window() {
        let builder = TestAppStateBuilder::new().with_subscription(create_test_subscription(|s| {
            s.merchant_subscription_id = "S1".into();
            s.status = SubscriptionStatus::Active;
        }));
        let server = server(builder.build());

        let response = server
            .post("/S1/pause")
            .json(&json!({
                "pause_start": "2026-09-10T00:00:00Z",
                "pause_end": "2026-09-01T00:00:00Z"
            }))
            .await;
        response.assert_status(StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn second_batch_reconcile_within_window_is_429() {
        let builder = TestAppStateBuilder::new().with_subscription(create_test_subscription(|s| {
            s.merchant_subscription_id = "S1".into();
            s.status = SubscriptionStatus::Pending;
        }));
        builder.gateway().set_status("S1", SubscriptionStatus::Active);
        let server = server(builder.build());

        let first = server.post("/reconcile").await;
        first.assert_status_ok();

        let second = server.post("/reconcile").await;
        second.assert_status(StatusCode::TOO_MANY_REQUESTS);
    }
}
