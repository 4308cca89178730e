use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

/// State of a single charge attempt against a mandate.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RedemptionState {
    NotificationInProgress,
    Notified,
    ExecutionInProgress,
    Pending,
    Completed,
    Failed,
    Expired,
    Unknown(String),
}

impl RedemptionState {
    pub fn as_str(&self) -> &str {
        match self {
            RedemptionState::NotificationInProgress => "NOTIFICATION_IN_PROGRESS",
            RedemptionState::Notified => "NOTIFIED",
            RedemptionState::ExecutionInProgress => "EXECUTION_IN_PROGRESS",
            RedemptionState::Pending => "PENDING",
            RedemptionState::Completed => "COMPLETED",
            RedemptionState::Failed => "FAILED",
            RedemptionState::Expired => "EXPIRED",
            RedemptionState::Unknown(raw) => raw,
        }
    }

    /// Convert from a gateway order state string; unrecognized values are
    /// preserved as `Unknown(raw)`.
    pub fn from_gateway(s: &str) -> Self {
        match s {
            "NOTIFICATION_IN_PROGRESS" => RedemptionState::NotificationInProgress,
            "NOTIFIED" => RedemptionState::Notified,
            "EXECUTION_IN_PROGRESS" => RedemptionState::ExecutionInProgress,
            "PENDING" => RedemptionState::Pending,
            "COMPLETED" => RedemptionState::Completed,
            "FAILED" => RedemptionState::Failed,
            "EXPIRED" => RedemptionState::Expired,
            other => RedemptionState::Unknown(other.to_string()),
        }
    }

    /// Terminal states cannot change further; anything else is resolved by
    /// polling the order status endpoint.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RedemptionState::Completed | RedemptionState::Failed | RedemptionState::Expired
        )
    }

    pub fn is_settled(&self) -> bool {
        matches!(self, RedemptionState::Completed)
    }
}

impl Serialize for RedemptionState {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for RedemptionState {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(RedemptionState::from_gateway(&raw))
    }
}

impl std::fmt::Display for RedemptionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Retry policy the gateway applies when a redemption debit bounces.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, AsRefStr, Display, EnumString,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE", ascii_case_insensitive)]
pub enum RedemptionRetryStrategy {
    Standard,
    Custom,
}

/// A single redemption attempt against an active mandate.
///
/// `merchant_order_id` is minted fresh for every attempt and never reused,
/// even after failures; the gateway keys its idempotency on it. Orders are
/// tracked in an in-process session ledger only.
#[derive(Debug, Clone, Serialize)]
pub struct RedemptionOrder {
    pub merchant_order_id: String,
    /// Gateway-assigned order identifier, returned by the notify call.
    pub gateway_order_id: String,
    pub merchant_subscription_id: String,
    pub amount_minor: i64,
    pub state: RedemptionState,
    /// Assigned only once a payment rail settles.
    pub transaction_id: Option<String>,
    pub created_at: DateTime<Utc>,
}
