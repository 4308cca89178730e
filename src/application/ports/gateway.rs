use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::{
    app_error::AppResult,
    domain::entities::{
        redemption::{RedemptionRetryStrategy, RedemptionState},
        subscription::{AmountType, AuthWorkflowType, Frequency, SubscriptionStatus},
    },
};

// ============================================================================
// Port Types
// ============================================================================

/// Request to set up a new recurring mandate with the gateway.
#[derive(Debug, Clone)]
pub struct MandateSetupRequest {
    pub merchant_order_id: String,
    pub merchant_subscription_id: String,
    pub amount_minor: i64,
    pub max_amount_minor: i64,
    pub amount_type: AmountType,
    pub frequency: Frequency,
    pub auth_workflow_type: AuthWorkflowType,
    pub expire_at: DateTime<Utc>,
}

/// Result of a mandate setup call.
#[derive(Debug, Clone)]
pub struct MandateSetupResult {
    /// Gateway-assigned order identifier.
    pub gateway_order_id: String,
    pub state: SubscriptionStatus,
    /// Redirect/intent handle for the payer's UPI app, passed through
    /// opaquely to the caller.
    pub intent_url: Option<String>,
}

/// Request declaring intent to charge a mandate.
#[derive(Debug, Clone)]
pub struct RedemptionNotifyRequest {
    pub merchant_order_id: String,
    pub merchant_subscription_id: String,
    pub amount_minor: i64,
    pub expire_at: Option<DateTime<Utc>>,
    pub metadata: Option<serde_json::Value>,
    pub retry_strategy: RedemptionRetryStrategy,
    pub auto_debit: bool,
}

/// Result of a redemption notify call.
#[derive(Debug, Clone)]
pub struct RedemptionNotifyResult {
    pub gateway_order_id: String,
    pub state: RedemptionState,
    pub expire_at: Option<DateTime<Utc>>,
}

/// Outcome of the execute call on a notified redemption.
///
/// Execute legitimately races gateway-side settlement, so the low-level
/// call reports ambiguity explicitly instead of hiding it in error codes;
/// the orchestrator pattern-matches and only falls back to a status check
/// on `Ambiguous`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecuteOutcome {
    Completed { transaction_id: Option<String> },
    /// Accepted by the gateway, settlement still in flight. Resolved by
    /// polling the order status endpoint.
    Pending,
    Failed { code: String, message: String },
    /// Timeout, order-not-found, or an empty response: the gateway may or
    /// may not have processed the charge.
    Ambiguous,
}

/// A single settled (or attempted) payment rail entry on an order.
#[derive(Debug, Clone, Serialize)]
pub struct PaymentDetail {
    pub transaction_id: String,
    pub payment_mode: Option<String>,
    pub state: RedemptionState,
}

/// Gateway-side view of a redemption order.
#[derive(Debug, Clone)]
pub struct RedemptionStatusInfo {
    pub state: RedemptionState,
    pub amount_minor: Option<i64>,
    pub payment_details: Vec<PaymentDetail>,
}

impl RedemptionStatusInfo {
    /// Transaction id of the first settled payment rail, if any.
    pub fn settled_transaction_id(&self) -> Option<String> {
        self.payment_details
            .iter()
            .find(|d| d.state.is_settled())
            .map(|d| d.transaction_id.clone())
    }
}

/// Window during which a paused mandate stays dormant.
#[derive(Debug, Clone, Copy)]
pub struct PauseWindow {
    pub pause_start: DateTime<Utc>,
    pub pause_end: DateTime<Utc>,
}

// ============================================================================
// Gateway Port
// ============================================================================

/// Payment-gateway port for recurring mandates.
///
/// Defines the domain-level operations the orchestrators need; the HTTP
/// client in `infra` maps them onto the gateway's wire API. Every call is
/// a single-shot request: transport failures surface to the caller and are
/// never retried inside the core.
#[async_trait]
pub trait MandateGatewayPort: Send + Sync {
    /// Create a new mandate subscription.
    async fn setup_mandate(&self, request: &MandateSetupRequest) -> AppResult<MandateSetupResult>;

    /// Authoritative gateway-side status of a subscription.
    async fn subscription_status(
        &self,
        merchant_subscription_id: &str,
    ) -> AppResult<SubscriptionStatus>;

    async fn cancel_subscription(&self, merchant_subscription_id: &str) -> AppResult<()>;

    async fn pause_subscription(
        &self,
        merchant_subscription_id: &str,
        window: PauseWindow,
    ) -> AppResult<()>;

    async fn unpause_subscription(&self, merchant_subscription_id: &str) -> AppResult<()>;

    async fn revoke_subscription(&self, merchant_subscription_id: &str) -> AppResult<()>;

    /// Declare intent to charge a mandate (phase one of redemption).
    async fn notify_redemption(
        &self,
        request: &RedemptionNotifyRequest,
    ) -> AppResult<RedemptionNotifyResult>;

    /// Trigger the charge for a previously notified order (phase two).
    async fn execute_redemption(&self, merchant_order_id: &str) -> AppResult<ExecuteOutcome>;

    /// Side-effect-free read of a redemption order's state; always safe to
    /// call repeatedly.
    async fn redemption_status(&self, merchant_order_id: &str) -> AppResult<RedemptionStatusInfo>;
}
