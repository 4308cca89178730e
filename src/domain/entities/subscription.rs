use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};
use uuid::Uuid;

/// Subscription (mandate) status as tracked locally and reported by the
/// payment gateway.
///
/// The gateway's status vocabulary evolves independently of this consumer,
/// so unrecognized strings are preserved in `Unknown` instead of being
/// silently coerced; callers decide how to bucket them.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SubscriptionStatus {
    Pending,
    ActivationInProgress,
    Active,
    PauseInProgress,
    Paused,
    UnpauseInProgress,
    CancelInProgress,
    Cancelled,
    RevokeInProgress,
    Revoked,
    Failed,
    Expired,
    Unknown(String),
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &str {
        match self {
            SubscriptionStatus::Pending => "PENDING",
            SubscriptionStatus::ActivationInProgress => "ACTIVATION_IN_PROGRESS",
            SubscriptionStatus::Active => "ACTIVE",
            SubscriptionStatus::PauseInProgress => "PAUSE_IN_PROGRESS",
            SubscriptionStatus::Paused => "PAUSED",
            SubscriptionStatus::UnpauseInProgress => "UNPAUSE_IN_PROGRESS",
            SubscriptionStatus::CancelInProgress => "CANCEL_IN_PROGRESS",
            SubscriptionStatus::Cancelled => "CANCELLED",
            SubscriptionStatus::RevokeInProgress => "REVOKE_IN_PROGRESS",
            SubscriptionStatus::Revoked => "REVOKED",
            SubscriptionStatus::Failed => "FAILED",
            SubscriptionStatus::Expired => "EXPIRED",
            SubscriptionStatus::Unknown(raw) => raw,
        }
    }

    /// Convert from a gateway status string. Unrecognized values become
    /// `Unknown(raw)` rather than an error.
    pub fn from_gateway(s: &str) -> Self {
        match s {
            "PENDING" => SubscriptionStatus::Pending,
            "ACTIVATION_IN_PROGRESS" => SubscriptionStatus::ActivationInProgress,
            "ACTIVE" => SubscriptionStatus::Active,
            "PAUSE_IN_PROGRESS" => SubscriptionStatus::PauseInProgress,
            "PAUSED" => SubscriptionStatus::Paused,
            "UNPAUSE_IN_PROGRESS" => SubscriptionStatus::UnpauseInProgress,
            "CANCEL_IN_PROGRESS" => SubscriptionStatus::CancelInProgress,
            "CANCELLED" | "CANCELED" => SubscriptionStatus::Cancelled,
            "REVOKE_IN_PROGRESS" => SubscriptionStatus::RevokeInProgress,
            "REVOKED" => SubscriptionStatus::Revoked,
            "FAILED" => SubscriptionStatus::Failed,
            "EXPIRED" => SubscriptionStatus::Expired,
            other => SubscriptionStatus::Unknown(other.to_string()),
        }
    }

    /// Whether redemptions may be executed against this subscription.
    pub fn is_active(&self) -> bool {
        matches!(self, SubscriptionStatus::Active)
    }

    /// Terminal statuses never transition back to a live status.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SubscriptionStatus::Cancelled
                | SubscriptionStatus::Revoked
                | SubscriptionStatus::Failed
                | SubscriptionStatus::Expired
        )
    }

    /// Whether a gateway-side operation is still settling.
    pub fn is_in_progress(&self) -> bool {
        matches!(
            self,
            SubscriptionStatus::ActivationInProgress
                | SubscriptionStatus::PauseInProgress
                | SubscriptionStatus::UnpauseInProgress
                | SubscriptionStatus::CancelInProgress
                | SubscriptionStatus::RevokeInProgress
        )
    }

    /// Transition guard: terminal statuses are frozen (same-status writes
    /// are allowed so repeated reconciliation stays a no-op).
    pub fn can_transition_to(&self, next: &SubscriptionStatus) -> bool {
        if self == next {
            return true;
        }
        !self.is_terminal()
    }

    /// Classification bucket used by the lifecycle orchestrator. Unknown
    /// statuses land in `Pending` so nothing is ever dropped.
    pub fn bucket(&self) -> StatusBucket {
        match self {
            SubscriptionStatus::Active => StatusBucket::Active,
            s if s.is_terminal() => StatusBucket::Terminal,
            SubscriptionStatus::Unknown(_) => StatusBucket::Pending,
            _ => StatusBucket::Pending,
        }
    }
}

impl Serialize for SubscriptionStatus {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for SubscriptionStatus {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(SubscriptionStatus::from_gateway(&raw))
    }
}

impl std::fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Classification bucket for a subscription status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusBucket {
    Active,
    Pending,
    Terminal,
}

/// Debit frequency of a mandate.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, AsRefStr, Display, EnumString,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE", ascii_case_insensitive)]
pub enum Frequency {
    Daily,
    Weekly,
    Fortnightly,
    Monthly,
    Quarterly,
    HalfYearly,
    Yearly,
    OnDemand,
}

/// Whether every debit is for the fixed mandate amount or a variable
/// amount up to the mandate ceiling.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, AsRefStr, Display, EnumString,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE", ascii_case_insensitive)]
pub enum AmountType {
    Fixed,
    Variable,
}

/// How the payer authorizes the mandate at setup time.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, AsRefStr, Display, EnumString,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE", ascii_case_insensitive)]
pub enum AuthWorkflowType {
    Transaction,
    PennyDrop,
}

/// Locally cached mandate subscription. Keyed by
/// `merchant_subscription_id`; rows are never deleted, terminal
/// subscriptions are retained for history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subscription {
    pub merchant_subscription_id: String,
    /// Gateway-assigned order identifier for the setup transaction.
    pub gateway_order_id: String,
    pub user_id: Uuid,
    pub status: SubscriptionStatus,
    pub amount_minor: i64,
    pub max_amount_minor: i64,
    pub amount_type: AmountType,
    pub frequency: Frequency,
    pub auth_workflow_type: AuthWorkflowType,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
