use std::sync::Arc;

use secrecy::{ExposeSecret, SecretString};
use sha2::{Digest, Sha256};
use tracing::{debug, instrument, warn};

use crate::{
    app_error::{AppError, AppResult},
    application::use_cases::subscription_lifecycle::SubscriptionStore,
    domain::entities::{
        subscription::Subscription,
        webhook_event::{WebhookEvent, WebhookEventType},
    },
};

/// Credentials the gateway was configured to send with webhook deliveries.
/// The `Authorization` header carries `hex(sha256("username:password"))`.
pub struct WebhookCredentials {
    pub username: String,
    pub password: SecretString,
}

impl WebhookCredentials {
    fn expected_digest(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.username.as_bytes());
        hasher.update(b":");
        hasher.update(self.password.expose_secret().as_bytes());
        hex::encode(hasher.finalize())
    }
}

/// Ingests asynchronous gateway events and feeds state transitions into
/// the subscription store, independent of polling.
pub struct WebhookUseCases {
    store: Arc<dyn SubscriptionStore>,
    credentials: Option<WebhookCredentials>,
    /// Explicit escape hatch for environments where gateway webhook
    /// credentials are not provisioned yet. Default is fail-closed.
    allow_unauthenticated: bool,
}

impl WebhookUseCases {
    pub fn new(
        store: Arc<dyn SubscriptionStore>,
        credentials: Option<WebhookCredentials>,
        allow_unauthenticated: bool,
    ) -> Self {
        Self {
            store,
            credentials,
            allow_unauthenticated,
        }
    }

    // ========================================================================
    // Authenticate
    // ========================================================================

    /// Validate the inbound `Authorization` header. With no credentials
    /// configured this rejects every delivery unless the
    /// `allow_unauthenticated` escape hatch was set explicitly, in which
    /// case every admitted request is loudly flagged.
    pub fn authenticate(&self, authorization: Option<&str>) -> AppResult<()> {
        match &self.credentials {
            Some(credentials) => {
                let header = authorization.ok_or(AppError::WebhookUnauthorized)?;
                let expected = credentials.expected_digest();
                if constant_time_compare(header.trim(), &expected) {
                    Ok(())
                } else {
                    Err(AppError::WebhookUnauthorized)
                }
            }
            None if self.allow_unauthenticated => {
                warn!(
                    "Webhook credentials not configured and WEBHOOK_ALLOW_UNAUTHENTICATED is set; \
                     accepting UNAUTHENTICATED gateway event"
                );
                Ok(())
            }
            None => Err(AppError::WebhookNotConfigured),
        }
    }

    // ========================================================================
    // Parse
    // ========================================================================

    /// Structural validation of a delivery body: `type` and
    /// `payload.merchantSubscriptionId` are required.
    pub fn parse(&self, body: &str) -> AppResult<WebhookEvent> {
        let value: serde_json::Value = serde_json::from_str(body)
            .map_err(|e| AppError::InvalidInput(format!("invalid webhook payload: {e}")))?;

        let event_type = value["type"]
            .as_str()
            .ok_or_else(|| AppError::InvalidInput("missing event type".into()))?;

        let payload = value["payload"].clone();
        let merchant_subscription_id = payload["merchantSubscriptionId"]
            .as_str()
            .ok_or_else(|| AppError::InvalidInput("missing merchantSubscriptionId".into()))?
            .to_string();
        let state = payload["state"].as_str().map(str::to_string);

        Ok(WebhookEvent {
            event_type: WebhookEventType::from_gateway(event_type),
            merchant_subscription_id,
            state,
            payload,
        })
    }

    // ========================================================================
    // Apply
    // ========================================================================

    /// Map the event onto the subscription status enum and update the
    /// store. Charge-level events leave the mandate untouched; unknown
    /// event types are logged and ignored. Returns the updated
    /// subscription when a transition was applied.
    #[instrument(skip(self, event), fields(event_type = %event.event_type, merchant_subscription_id = %event.merchant_subscription_id))]
    pub async fn apply(&self, event: &WebhookEvent) -> AppResult<Option<Subscription>> {
        let Some(new_status) = event.event_type.subscription_status() else {
            match &event.event_type {
                WebhookEventType::Unknown(raw) => {
                    debug!(raw = %raw, "Unhandled webhook event type, ignoring")
                }
                _ => debug!("Charge-level event, mandate status unchanged"),
            }
            return Ok(None);
        };

        let current = self
            .store
            .get(&event.merchant_subscription_id)
            .await?
            .ok_or(AppError::NotFound)?;

        if current.status == new_status {
            return Ok(Some(current));
        }

        if !current.status.can_transition_to(&new_status) {
            warn!(
                cached = %current.status,
                incoming = %new_status,
                "Webhook transition out of a terminal status ignored"
            );
            return Ok(None);
        }

        let updated = self
            .store
            .update_status(&event.merchant_subscription_id, new_status)
            .await?;
        Ok(Some(updated))
    }
}

fn constant_time_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut result = 0u8;
    for (x, y) in a.bytes().zip(b.bytes()) {
        result |= x ^ y;
    }
    result == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::subscription::SubscriptionStatus;
    use crate::test_utils::{InMemorySubscriptionStore, create_test_subscription};

    fn credentials() -> WebhookCredentials {
        WebhookCredentials {
            username: "merchant".into(),
            password: SecretString::new("hunter2".into()),
        }
    }

    fn digest_for(username: &str, password: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(format!("{username}:{password}").as_bytes());
        hex::encode(hasher.finalize())
    }

    fn use_cases_with(
        store: Arc<InMemorySubscriptionStore>,
        credentials: Option<WebhookCredentials>,
        allow_unauthenticated: bool,
    ) -> WebhookUseCases {
        WebhookUseCases::new(store, credentials, allow_unauthenticated)
    }

    fn event_body(event_type: &str, merchant_subscription_id: &str) -> String {
        serde_json::json!({
            "type": event_type,
            "payload": {
                "merchantSubscriptionId": merchant_subscription_id,
                "state": "ACTIVE"
            }
        })
        .to_string()
    }

    // ========================================================================
    // Authenticate
    // ========================================================================

    #[test]
    fn authenticate_accepts_matching_digest() {
        let store = Arc::new(InMemorySubscriptionStore::new());
        let uc = use_cases_with(store, Some(credentials()), false);

        let digest = digest_for("merchant", "hunter2");
        assert!(uc.authenticate(Some(&digest)).is_ok());
    }

    #[test]
    fn authenticate_rejects_bad_digest() {
        let store = Arc::new(InMemorySubscriptionStore::new());
        let uc = use_cases_with(store, Some(credentials()), false);

        let digest = digest_for("merchant", "wrong-password");
        assert!(matches!(
            uc.authenticate(Some(&digest)),
            Err(AppError::WebhookUnauthorized)
        ));
        assert!(matches!(
            uc.authenticate(None),
            Err(AppError::WebhookUnauthorized)
        ));
    }

    #[test]
    fn authenticate_fails_closed_when_unconfigured() {
        let store = Arc::new(InMemorySubscriptionStore::new());
        let uc = use_cases_with(store, None, false);

        assert!(matches!(
            uc.authenticate(Some("anything")),
            Err(AppError::WebhookNotConfigured)
        ));
    }

    #[test]
    fn authenticate_escape_hatch_admits_with_warning() {
        let store = Arc::new(InMemorySubscriptionStore::new());
        let uc = use_cases_with(store, None, true);

        assert!(uc.authenticate(None).is_ok());
    }

    // ========================================================================
    // Parse
    // ========================================================================

    #[test]
    fn parse_extracts_event_fields() {
        let store = Arc::new(InMemorySubscriptionStore::new());
        let uc = use_cases_with(store, None, true);

        let event = uc
            .parse(&event_body("SUBSCRIPTION_PAUSED", "S1"))
            .unwrap();
        assert_eq!(event.event_type, WebhookEventType::Paused);
        assert_eq!(event.merchant_subscription_id, "S1");
        assert_eq!(event.state, Some("ACTIVE".to_string()));
    }

    #[test]
    fn parse_rejects_structural_problems() {
        let store = Arc::new(InMemorySubscriptionStore::new());
        let uc = use_cases_with(store, None, true);

        assert!(matches!(
            uc.parse("not json"),
            Err(AppError::InvalidInput(_))
        ));
        assert!(matches!(
            uc.parse(r#"{"payload": {"merchantSubscriptionId": "S1"}}"#),
            Err(AppError::InvalidInput(_))
        ));
        assert!(matches!(
            uc.parse(r#"{"type": "SUBSCRIPTION_PAUSED", "payload": {}}"#),
            Err(AppError::InvalidInput(_))
        ));
    }

    // ========================================================================
    // Apply
    // ========================================================================

    #[tokio::test]
    async fn apply_pause_event_updates_store() {
        let store = Arc::new(InMemorySubscriptionStore::new());
        store
            .upsert(&create_test_subscription(|s| {
                s.merchant_subscription_id = "S1".into();
                s.status = SubscriptionStatus::PauseInProgress;
            }))
            .await
            .unwrap();
        let uc = use_cases_with(store.clone(), None, true);

        let event = uc.parse(&event_body("SUBSCRIPTION_PAUSED", "S1")).unwrap();
        let updated = uc.apply(&event).await.unwrap().unwrap();
        assert_eq!(updated.status, SubscriptionStatus::Paused);
        assert_eq!(
            store.get("S1").await.unwrap().unwrap().status,
            SubscriptionStatus::Paused
        );
    }

    #[tokio::test]
    async fn redemption_completed_leaves_mandate_active() {
        let store = Arc::new(InMemorySubscriptionStore::new());
        store
            .upsert(&create_test_subscription(|s| {
                s.merchant_subscription_id = "S1".into();
                s.status = SubscriptionStatus::Active;
            }))
            .await
            .unwrap();
        let uc = use_cases_with(store.clone(), None, true);

        let event = uc
            .parse(&event_body("SUBSCRIPTION_REDEMPTION_ORDER_COMPLETED", "S1"))
            .unwrap();
        let result = uc.apply(&event).await.unwrap();
        assert!(result.is_none());
        assert_eq!(store.update_status_calls(), 0);
        assert_eq!(
            store.get("S1").await.unwrap().unwrap().status,
            SubscriptionStatus::Active
        );
    }

    #[tokio::test]
    async fn unknown_event_types_are_ignored_not_errors() {
        let store = Arc::new(InMemorySubscriptionStore::new());
        let uc = use_cases_with(store.clone(), None, true);

        let event = uc
            .parse(&event_body("SUBSCRIPTION_SOMETHING_NEW", "S1"))
            .unwrap();
        let result = uc.apply(&event).await.unwrap();
        assert!(result.is_none());
        assert_eq!(store.update_status_calls(), 0);
    }

    #[tokio::test]
    async fn apply_ignores_transitions_out_of_terminal() {
        let store = Arc::new(InMemorySubscriptionStore::new());
        store
            .upsert(&create_test_subscription(|s| {
                s.merchant_subscription_id = "S1".into();
                s.status = SubscriptionStatus::Cancelled;
            }))
            .await
            .unwrap();
        let uc = use_cases_with(store.clone(), None, true);

        let event = uc
            .parse(&event_body("SUBSCRIPTION_UNPAUSED", "S1"))
            .unwrap();
        let result = uc.apply(&event).await.unwrap();
        assert!(result.is_none());
        assert_eq!(
            store.get("S1").await.unwrap().unwrap().status,
            SubscriptionStatus::Cancelled
        );
    }

    #[tokio::test]
    async fn apply_same_status_is_a_no_op_write() {
        let store = Arc::new(InMemorySubscriptionStore::new());
        store
            .upsert(&create_test_subscription(|s| {
                s.merchant_subscription_id = "S1".into();
                s.status = SubscriptionStatus::Paused;
            }))
            .await
            .unwrap();
        let uc = use_cases_with(store.clone(), None, true);

        let event = uc.parse(&event_body("SUBSCRIPTION_PAUSED", "S1")).unwrap();
        let result = uc.apply(&event).await.unwrap();
        assert!(result.is_some());
        assert_eq!(store.update_status_calls(), 0);
    }

    #[tokio::test]
    async fn apply_unknown_subscription_is_not_found() {
        let store = Arc::new(InMemorySubscriptionStore::new());
        let uc = use_cases_with(store, None, true);

        let event = uc
            .parse(&event_body("SUBSCRIPTION_PAUSED", "missing"))
            .unwrap();
        assert!(matches!(uc.apply(&event).await, Err(AppError::NotFound)));
    }
}
