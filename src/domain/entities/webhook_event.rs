use serde::Serialize;

use super::subscription::SubscriptionStatus;

/// Asynchronous event kinds the gateway delivers over webhooks.
///
/// The gateway's event schema evolves on its own cadence; anything not
/// recognized here is carried as `Unknown(raw)` and ignored downstream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookEventType {
    SetupOrderCompleted,
    SetupOrderFailed,
    NotificationCompleted,
    NotificationFailed,
    RedemptionOrderCompleted,
    RedemptionOrderFailed,
    Paused,
    Unpaused,
    Cancelled,
    Revoked,
    Expired,
    SubscriptionFailed,
    Unknown(String),
}

impl WebhookEventType {
    pub fn from_gateway(s: &str) -> Self {
        match s {
            "SUBSCRIPTION_SETUP_ORDER_COMPLETED" => WebhookEventType::SetupOrderCompleted,
            "SUBSCRIPTION_SETUP_ORDER_FAILED" => WebhookEventType::SetupOrderFailed,
            "SUBSCRIPTION_NOTIFICATION_COMPLETED" => WebhookEventType::NotificationCompleted,
            "SUBSCRIPTION_NOTIFICATION_FAILED" => WebhookEventType::NotificationFailed,
            "SUBSCRIPTION_REDEMPTION_ORDER_COMPLETED" => WebhookEventType::RedemptionOrderCompleted,
            "SUBSCRIPTION_REDEMPTION_ORDER_FAILED" => WebhookEventType::RedemptionOrderFailed,
            "SUBSCRIPTION_PAUSED" => WebhookEventType::Paused,
            "SUBSCRIPTION_UNPAUSED" => WebhookEventType::Unpaused,
            "SUBSCRIPTION_CANCELLED" => WebhookEventType::Cancelled,
            "SUBSCRIPTION_REVOKED" => WebhookEventType::Revoked,
            "SUBSCRIPTION_EXPIRED" => WebhookEventType::Expired,
            "SUBSCRIPTION_FAILED" => WebhookEventType::SubscriptionFailed,
            other => WebhookEventType::Unknown(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            WebhookEventType::SetupOrderCompleted => "SUBSCRIPTION_SETUP_ORDER_COMPLETED",
            WebhookEventType::SetupOrderFailed => "SUBSCRIPTION_SETUP_ORDER_FAILED",
            WebhookEventType::NotificationCompleted => "SUBSCRIPTION_NOTIFICATION_COMPLETED",
            WebhookEventType::NotificationFailed => "SUBSCRIPTION_NOTIFICATION_FAILED",
            WebhookEventType::RedemptionOrderCompleted => {
                "SUBSCRIPTION_REDEMPTION_ORDER_COMPLETED"
            }
            WebhookEventType::RedemptionOrderFailed => "SUBSCRIPTION_REDEMPTION_ORDER_FAILED",
            WebhookEventType::Paused => "SUBSCRIPTION_PAUSED",
            WebhookEventType::Unpaused => "SUBSCRIPTION_UNPAUSED",
            WebhookEventType::Cancelled => "SUBSCRIPTION_CANCELLED",
            WebhookEventType::Revoked => "SUBSCRIPTION_REVOKED",
            WebhookEventType::Expired => "SUBSCRIPTION_EXPIRED",
            WebhookEventType::SubscriptionFailed => "SUBSCRIPTION_FAILED",
            WebhookEventType::Unknown(raw) => raw,
        }
    }

    /// The subscription status this event maps onto, if any.
    ///
    /// Notification and redemption events report on charge attempts; the
    /// mandate itself stays as it was, so they map to `None`.
    pub fn subscription_status(&self) -> Option<SubscriptionStatus> {
        match self {
            WebhookEventType::SetupOrderCompleted => Some(SubscriptionStatus::Active),
            WebhookEventType::SetupOrderFailed => Some(SubscriptionStatus::Failed),
            WebhookEventType::Paused => Some(SubscriptionStatus::Paused),
            WebhookEventType::Unpaused => Some(SubscriptionStatus::Active),
            WebhookEventType::Cancelled => Some(SubscriptionStatus::Cancelled),
            WebhookEventType::Revoked => Some(SubscriptionStatus::Revoked),
            WebhookEventType::Expired => Some(SubscriptionStatus::Expired),
            WebhookEventType::SubscriptionFailed => Some(SubscriptionStatus::Failed),
            WebhookEventType::NotificationCompleted
            | WebhookEventType::NotificationFailed
            | WebhookEventType::RedemptionOrderCompleted
            | WebhookEventType::RedemptionOrderFailed
            | WebhookEventType::Unknown(_) => None,
        }
    }
}

impl std::fmt::Display for WebhookEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A parsed inbound webhook delivery. Consumed once, never stored.
#[derive(Debug, Clone, Serialize)]
pub struct WebhookEvent {
    #[serde(skip)]
    pub event_type: WebhookEventType,
    pub merchant_subscription_id: String,
    /// Raw gateway state string from the payload, when present.
    pub state: Option<String>,
    pub payload: serde_json::Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_event_types_round_trip() {
        for raw in [
            "SUBSCRIPTION_SETUP_ORDER_COMPLETED",
            "SUBSCRIPTION_SETUP_ORDER_FAILED",
            "SUBSCRIPTION_NOTIFICATION_COMPLETED",
            "SUBSCRIPTION_NOTIFICATION_FAILED",
            "SUBSCRIPTION_REDEMPTION_ORDER_COMPLETED",
            "SUBSCRIPTION_REDEMPTION_ORDER_FAILED",
            "SUBSCRIPTION_PAUSED",
            "SUBSCRIPTION_UNPAUSED",
            "SUBSCRIPTION_CANCELLED",
            "SUBSCRIPTION_REVOKED",
            "SUBSCRIPTION_EXPIRED",
            "SUBSCRIPTION_FAILED",
        ] {
            let parsed = WebhookEventType::from_gateway(raw);
            assert!(!matches!(parsed, WebhookEventType::Unknown(_)), "{raw}");
            assert_eq!(parsed.as_str(), raw);
        }
    }

    #[test]
    fn redemption_events_do_not_touch_subscription_status() {
        assert_eq!(
            WebhookEventType::RedemptionOrderCompleted.subscription_status(),
            None
        );
        assert_eq!(
            WebhookEventType::RedemptionOrderFailed.subscription_status(),
            None
        );
        assert_eq!(
            WebhookEventType::NotificationCompleted.subscription_status(),
            None
        );
    }

    #[test]
    fn lifecycle_events_map_to_statuses() {
        assert_eq!(
            WebhookEventType::Paused.subscription_status(),
            Some(SubscriptionStatus::Paused)
        );
        assert_eq!(
            WebhookEventType::Unpaused.subscription_status(),
            Some(SubscriptionStatus::Active)
        );
        assert_eq!(
            WebhookEventType::Cancelled.subscription_status(),
            Some(SubscriptionStatus::Cancelled)
        );
        assert_eq!(
            WebhookEventType::SetupOrderCompleted.subscription_status(),
            Some(SubscriptionStatus::Active)
        );
    }

    #[test]
    fn unknown_event_type_is_preserved_and_inert() {
        let parsed = WebhookEventType::from_gateway("SUBSCRIPTION_GLITTER");
        assert_eq!(
            parsed,
            WebhookEventType::Unknown("SUBSCRIPTION_GLITTER".to_string())
        );
        assert_eq!(parsed.subscription_status(), None);
    }
}
