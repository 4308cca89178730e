pub mod redemptions;
pub mod subscriptions;
pub mod webhooks;

use axum::{Json, Router, response::IntoResponse, routing::get};
use serde_json::json;

use crate::adapters::http::app_state::AppState;

async fn health() -> impl IntoResponse {
    Json(json!({"status": "ok"}))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .nest("/subscriptions", subscriptions::router())
        .nest("/redemptions", redemptions::router())
        .nest("/webhooks", webhooks::router())
}
