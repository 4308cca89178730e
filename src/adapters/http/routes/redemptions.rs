use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};

use crate::{
    adapters::http::app_state::AppState, app_error::AppResult,
    application::use_cases::redemption::NotifyRedemptionInput,
};

/// POST /api/redemptions/notify
async fn notify_redemption(
    State(state): State<AppState>,
    Json(input): Json<NotifyRedemptionInput>,
) -> AppResult<impl IntoResponse> {
    let order = state.redemptions.notify(input).await?;
    Ok((StatusCode::CREATED, Json(order)))
}

/// POST /api/redemptions/{merchant_order_id}/execute
async fn execute_redemption(
    State(state): State<AppState>,
    Path(merchant_order_id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let order = state.redemptions.execute(&merchant_order_id).await?;
    Ok(Json(order))
}

/// GET /api/redemptions/{merchant_order_id}/status
async fn redemption_status(
    State(state): State<AppState>,
    Path(merchant_order_id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let order = state.redemptions.check_status(&merchant_order_id).await?;
    Ok(Json(order))
}

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/notify", post(notify_redemption))
        .route("/{merchant_order_id}/execute", post(execute_redemption))
        .route("/{merchant_order_id}/status", get(redemption_status))
}

#[cfg(test)]
mod tests {
    use axum::Router;
    use axum_test::TestServer;
    use serde_json::json;

    use super::*;
    use crate::application::ports::gateway::{
        ExecuteOutcome, PaymentDetail, RedemptionStatusInfo,
    };
    use crate::domain::entities::redemption::RedemptionState;
    use crate::domain::entities::subscription::SubscriptionStatus;
    use crate::test_utils::{TestAppStateBuilder, create_test_subscription};

    fn server(app_state: AppState) -> TestServer {
        let app: Router = router().with_state(app_state);
        TestServer::new(app).unwrap()
    }

    fn builder_with_active_subscription() -> TestAppStateBuilder {
        TestAppStateBuilder::new().with_subscription(create_test_subscription(|s| {
            s.merchant_subscription_id = "S1".into();
            s.status = SubscriptionStatus::Active;
        }))
    }

    fn notify_body() -> serde_json::Value {
        json!({
            "merchant_subscription_id": "S1",
            "amount_minor": 3000,
            "retry_strategy": "STANDARD",
            "auto_debit": true
        })
    }

    #[tokio::test]
    async fn notify_then_execute_completes() {
        let builder = builder_with_active_subscription();
        builder.gateway().set_execute_outcome(ExecuteOutcome::Completed {
            transaction_id: Some("T1".into()),
        });
        let server = server(builder.build());

        let response = server.post("/notify").json(&notify_body()).await;
        response.assert_status(StatusCode::CREATED);
        let order: serde_json::Value = response.json();
        let merchant_order_id = order["merchant_order_id"].as_str().unwrap().to_string();
        assert_eq!(order["state"], "NOTIFIED");

        let response = server
            .post(&format!("/{merchant_order_id}/execute"))
            .await;
        response.assert_status_ok();
        let executed: serde_json::Value = response.json();
        assert_eq!(executed["state"], "COMPLETED");
        assert_eq!(executed["transaction_id"], "T1");
    }

    #[tokio::test]
    async fn notify_against_paused_mandate_is_conflict() {
        let builder = TestAppStateBuilder::new().with_subscription(create_test_subscription(|s| {
            s.merchant_subscription_id = "S1".into();
            s.status = SubscriptionStatus::Paused;
        }));
        let server = server(builder.build());

        let response = server.post("/notify").json(&notify_body()).await;
        response.assert_status(StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn execute_after_cancel_is_conflict() {
        let builder = builder_with_active_subscription();
        let store = builder.store();
        let gateway = builder.gateway();
        let server = server(builder.build());

        let response = server.post("/notify").json(&notify_body()).await;
        response.assert_status(StatusCode::CREATED);
        let order: serde_json::Value = response.json();
        let merchant_order_id = order["merchant_order_id"].as_str().unwrap().to_string();

        store.set_status_sync("S1", SubscriptionStatus::Cancelled);

        let response = server
            .post(&format!("/{merchant_order_id}/execute"))
            .await;
        response.assert_status(StatusCode::CONFLICT);
        assert_eq!(gateway.execute_calls(), 0);
    }

    #[tokio::test]
    async fn status_endpoint_resolves_pending_order() {
        let builder = builder_with_active_subscription();
        let gateway = builder.gateway();
        gateway.set_execute_outcome(ExecuteOutcome::Pending);
        let server = server(builder.build());

        let response = server.post("/notify").json(&notify_body()).await;
        let order: serde_json::Value = response.json();
        let merchant_order_id = order["merchant_order_id"].as_str().unwrap().to_string();

        server
            .post(&format!("/{merchant_order_id}/execute"))
            .await
            .assert_status_ok();

        gateway.set_redemption_status(RedemptionStatusInfo {
            state: RedemptionState::Completed,
            amount_minor: Some(3000),
            payment_details: vec![PaymentDetail {
                transaction_id: "T7".into(),
                payment_mode: Some("UPI_AUTO_PAY".into()),
                state: RedemptionState::Completed,
            }],
        });

        let response = server.get(&format!("/{merchant_order_id}/status")).await;
        response.assert_status_ok();
        let resolved: serde_json::Value = response.json();
        assert_eq!(resolved["state"], "COMPLETED");
        assert_eq!(resolved["transaction_id"], "T7");
    }

    #[tokio::test]
    async fn unknown_order_is_404() {
        let server = server(TestAppStateBuilder::new().build());
        server
            .post("/MORD-unknown/execute")
            .await
            .assert_status(StatusCode::NOT_FOUND);
        server
            .get("/MORD-unknown/status")
            .await
            .assert_status(StatusCode::NOT_FOUND);
    }
}
