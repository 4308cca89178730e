use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::{
    app_error::{AppError, AppResult},
    application::ports::gateway::{
        ExecuteOutcome, MandateGatewayPort, MandateSetupRequest, MandateSetupResult,
        PaymentDetail, PauseWindow, RedemptionNotifyRequest, RedemptionNotifyResult,
        RedemptionStatusInfo,
    },
    domain::entities::{redemption::RedemptionState, subscription::SubscriptionStatus},
    infra::token_provider::TokenProvider,
};

const SETUP_FLOW_TYPE: &str = "SUBSCRIPTION_SETUP";
const REDEMPTION_FLOW_TYPE: &str = "SUBSCRIPTION_REDEMPTION";

/// Gateway error codes that leave an execute call unresolved: the order
/// may exist on the gateway even though this response says otherwise.
const AMBIGUOUS_EXECUTE_CODES: &[&str] =
    &["ORDER_NOT_FOUND", "TRANSACTION_NOT_FOUND", "NOT_FOUND"];

/// Reqwest-backed implementation of the mandate gateway port.
///
/// Every operation is a single authenticated HTTP call; the bearer token
/// comes from the shared `TokenProvider`.
pub struct HttpMandateGateway {
    client: Client,
    base_url: String,
    tokens: Arc<TokenProvider>,
}

impl HttpMandateGateway {
    pub fn new(client: Client, base_url: String, tokens: Arc<TokenProvider>) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            tokens,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn bearer(&self) -> AppResult<String> {
        self.tokens.get_valid_token().await
    }

    async fn handle_response<T: for<'de> Deserialize<'de>>(
        &self,
        response: reqwest::Response,
    ) -> AppResult<T> {
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| AppError::GatewayTransport(format!("failed to read response: {e}")))?;

        if !status.is_success() {
            tracing::error!(status = %status, body = %body, "Gateway API error");
            return Err(gateway_error(status, &body));
        }

        serde_json::from_str(&body).map_err(|e| {
            tracing::error!(body = %body, error = %e, "Failed to parse gateway response");
            AppError::Internal(format!("failed to parse gateway response: {e}"))
        })
    }

    /// For endpoints that answer `204 No Content` on success.
    async fn handle_empty_response(&self, response: reqwest::Response) -> AppResult<()> {
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response
            .text()
            .await
            .map_err(|e| AppError::GatewayTransport(format!("failed to read response: {e}")))?;
        tracing::error!(status = %status, body = %body, "Gateway API error");
        Err(gateway_error(status, &body))
    }
}

fn gateway_error(status: reqwest::StatusCode, body: &str) -> AppError {
    if let Ok(parsed) = serde_json::from_str::<GatewayErrorResponse>(body) {
        return AppError::Gateway {
            code: parsed.code,
            message: parsed.message.unwrap_or_default(),
        };
    }
    AppError::Gateway {
        code: format!("HTTP_{}", status.as_u16()),
        message: body.chars().take(256).collect(),
    }
}

// ============================================================================
// Wire Types
// ============================================================================

#[derive(Debug, Deserialize)]
struct GatewayErrorResponse {
    code: String,
    message: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SetupRequestBody {
    merchant_order_id: String,
    amount: i64,
    expire_at: i64,
    payment_flow: SetupPaymentFlow,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SetupPaymentFlow {
    #[serde(rename = "type")]
    flow_type: &'static str,
    merchant_subscription_id: String,
    auth_workflow_type: String,
    amount_type: String,
    max_amount: i64,
    frequency: String,
    expire_at: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SetupResponse {
    order_id: String,
    state: String,
    intent_url: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubscriptionStatusResponse {
    state: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PauseRequestBody {
    pause_start: i64,
    pause_end: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct NotifyRequestBody {
    merchant_order_id: String,
    amount: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    expire_at: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    meta_info: Option<serde_json::Value>,
    payment_flow: NotifyPaymentFlow,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct NotifyPaymentFlow {
    #[serde(rename = "type")]
    flow_type: &'static str,
    merchant_subscription_id: String,
    redemption_retry_strategy: String,
    auto_debit: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NotifyResponse {
    order_id: String,
    state: String,
    expire_at: Option<i64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RedeemRequestBody {
    merchant_order_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RedeemResponse {
    state: Option<String>,
    transaction_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrderStatusResponse {
    state: String,
    amount: Option<i64>,
    #[serde(default)]
    payment_details: Vec<PaymentDetailWire>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PaymentDetailWire {
    transaction_id: String,
    payment_mode: Option<String>,
    state: String,
}

fn outcome_from_redeem_body(body: &str) -> ExecuteOutcome {
    if body.trim().is_empty() {
        return ExecuteOutcome::Ambiguous;
    }
    let Ok(parsed) = serde_json::from_str::<RedeemResponse>(body) else {
        return ExecuteOutcome::Ambiguous;
    };
    match parsed.state.as_deref() {
        Some("COMPLETED") => ExecuteOutcome::Completed {
            transaction_id: parsed.transaction_id,
        },
        Some("PENDING") | Some("EXECUTION_IN_PROGRESS") => ExecuteOutcome::Pending,
        Some("FAILED") => ExecuteOutcome::Failed {
            code: "EXECUTION_FAILED".into(),
            message: "gateway reported the debit as failed".into(),
        },
        _ => ExecuteOutcome::Ambiguous,
    }
}

// ============================================================================
// Port Implementation
// ============================================================================

#[async_trait]
impl MandateGatewayPort for HttpMandateGateway {
    async fn setup_mandate(&self, request: &MandateSetupRequest) -> AppResult<MandateSetupResult> {
        let expire_at = request.expire_at.timestamp_millis();
        let body = SetupRequestBody {
            merchant_order_id: request.merchant_order_id.clone(),
            amount: request.amount_minor,
            expire_at,
            payment_flow: SetupPaymentFlow {
                flow_type: SETUP_FLOW_TYPE,
                merchant_subscription_id: request.merchant_subscription_id.clone(),
                auth_workflow_type: request.auth_workflow_type.as_ref().to_string(),
                amount_type: request.amount_type.as_ref().to_string(),
                max_amount: request.max_amount_minor,
                frequency: request.frequency.as_ref().to_string(),
                expire_at,
            },
        };

        let response = self
            .client
            .post(self.url("/subscriptions/setup"))
            .bearer_auth(self.bearer().await?)
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::GatewayTransport(format!("setup request failed: {e}")))?;

        let parsed: SetupResponse = self.handle_response(response).await?;
        Ok(MandateSetupResult {
            gateway_order_id: parsed.order_id,
            state: SubscriptionStatus::from_gateway(&parsed.state),
            intent_url: parsed.intent_url,
        })
    }

    async fn subscription_status(
        &self,
        merchant_subscription_id: &str,
    ) -> AppResult<SubscriptionStatus> {
        let response = self
            .client
            .get(self.url(&format!(
                "/subscriptions/{merchant_subscription_id}/status"
            )))
            .query(&[("details", "true")])
            .bearer_auth(self.bearer().await?)
            .send()
            .await
            .map_err(|e| AppError::GatewayTransport(format!("status request failed: {e}")))?;

        let parsed: SubscriptionStatusResponse = self.handle_response(response).await?;
        Ok(SubscriptionStatus::from_gateway(&parsed.state))
    }

    async fn cancel_subscription(&self, merchant_subscription_id: &str) -> AppResult<()> {
        let response = self
            .client
            .post(self.url(&format!(
                "/subscriptions/{merchant_subscription_id}/cancel"
            )))
            .bearer_auth(self.bearer().await?)
            .send()
            .await
            .map_err(|e| AppError::GatewayTransport(format!("cancel request failed: {e}")))?;
        self.handle_empty_response(response).await
    }

    async fn pause_subscription(
        &self,
        merchant_subscription_id: &str,
        window: PauseWindow,
    ) -> AppResult<()> {
        let body = PauseRequestBody {
            pause_start: window.pause_start.timestamp_millis(),
            pause_end: window.pause_end.timestamp_millis(),
        };
        let response = self
            .client
            .post(self.url(&format!(
                "/subscriptions/{merchant_subscription_id}/pause"
            )))
            .bearer_auth(self.bearer().await?)
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::GatewayTransport(format!("pause request failed: {e}")))?;
        self.handle_empty_response(response).await
    }

    async fn unpause_subscription(&self, merchant_subscription_id: &str) -> AppResult<()> {
        let response = self
            .client
            .post(self.url(&format!(
                "/subscriptions/{merchant_subscription_id}/unpause"
            )))
            .bearer_auth(self.bearer().await?)
            .send()
            .await
            .map_err(|e| AppError::GatewayTransport(format!("unpause request failed: {e}")))?;
        self.handle_empty_response(response).await
    }

    async fn revoke_subscription(&self, merchant_subscription_id: &str) -> AppResult<()> {
        let response = self
            .client
            .post(self.url(&format!(
                "/subscriptions/{merchant_subscription_id}/revoke"
            )))
            .bearer_auth(self.bearer().await?)
            .send()
            .await
            .map_err(|e| AppError::GatewayTransport(format!("revoke request failed: {e}")))?;
        self.handle_empty_response(response).await
    }

    async fn notify_redemption(
        &self,
        request: &RedemptionNotifyRequest,
    ) -> AppResult<RedemptionNotifyResult> {
        let body = NotifyRequestBody {
            merchant_order_id: request.merchant_order_id.clone(),
            amount: request.amount_minor,
            expire_at: request.expire_at.map(|t| t.timestamp_millis()),
            meta_info: request.metadata.clone(),
            payment_flow: NotifyPaymentFlow {
                flow_type: REDEMPTION_FLOW_TYPE,
                merchant_subscription_id: request.merchant_subscription_id.clone(),
                redemption_retry_strategy: request.retry_strategy.as_ref().to_string(),
                auto_debit: request.auto_debit,
            },
        };

        let response = self
            .client
            .post(self.url("/subscriptions/notify"))
            .bearer_auth(self.bearer().await?)
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::GatewayTransport(format!("notify request failed: {e}")))?;

        let parsed: NotifyResponse = self.handle_response(response).await?;
        Ok(RedemptionNotifyResult {
            gateway_order_id: parsed.order_id,
            state: RedemptionState::from_gateway(&parsed.state),
            expire_at: parsed
                .expire_at
                .and_then(chrono::DateTime::from_timestamp_millis),
        })
    }

    async fn execute_redemption(&self, merchant_order_id: &str) -> AppResult<ExecuteOutcome> {
        let body = RedeemRequestBody {
            merchant_order_id: merchant_order_id.to_string(),
        };

        let response = self
            .client
            .post(self.url("/subscriptions/redeem"))
            .bearer_auth(self.bearer().await?)
            .json(&body)
            .send()
            .await;

        let response = match response {
            Ok(r) => r,
            // A timed-out execute may still have gone through gateway-side.
            Err(e) if e.is_timeout() => return Ok(ExecuteOutcome::Ambiguous),
            Err(e) => {
                return Err(AppError::GatewayTransport(format!(
                    "redeem request failed: {e}"
                )));
            }
        };

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| AppError::GatewayTransport(format!("failed to read response: {e}")))?;

        if !status.is_success() {
            if let Ok(parsed) = serde_json::from_str::<GatewayErrorResponse>(&text) {
                if AMBIGUOUS_EXECUTE_CODES.contains(&parsed.code.as_str()) {
                    return Ok(ExecuteOutcome::Ambiguous);
                }
                return Ok(ExecuteOutcome::Failed {
                    code: parsed.code,
                    message: parsed.message.unwrap_or_default(),
                });
            }
            tracing::error!(status = %status, body = %text, "Gateway redeem error");
            return Err(gateway_error(status, &text));
        }

        Ok(outcome_from_redeem_body(&text))
    }

    async fn redemption_status(&self, merchant_order_id: &str) -> AppResult<RedemptionStatusInfo> {
        let response = self
            .client
            .get(self.url(&format!(
                "/subscriptions/order/{merchant_order_id}/status"
            )))
            .query(&[("details", "true")])
            .bearer_auth(self.bearer().await?)
            .send()
            .await
            .map_err(|e| AppError::GatewayTransport(format!("order status request failed: {e}")))?;

        let parsed: OrderStatusResponse = self.handle_response(response).await?;
        Ok(RedemptionStatusInfo {
            state: RedemptionState::from_gateway(&parsed.state),
            amount_minor: parsed.amount,
            payment_details: parsed
                .payment_details
                .into_iter()
                .map(|d| PaymentDetail {
                    transaction_id: d.transaction_id,
                    payment_mode: d.payment_mode,
                    state: RedemptionState::from_gateway(&d.state),
                })
                .collect(),
        })
    }
}
