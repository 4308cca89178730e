//! Builder for wiring route tests against in-memory mocks.

use std::sync::Arc;
use std::time::Duration;

use axum::http::HeaderValue;
use secrecy::SecretString;
use url::Url;

use crate::{
    adapters::http::app_state::AppState,
    application::{
        ids::MerchantIdGenerator,
        use_cases::{
            redemption::RedemptionUseCases,
            subscription_lifecycle::{SubscriptionLifecycleUseCases, SubscriptionStore},
            webhook::{WebhookCredentials, WebhookUseCases},
        },
    },
    domain::entities::subscription::Subscription,
    infra::{clock::SystemClock, config::AppConfig, debounce::DebounceGate},
    test_utils::{MockMandateGateway, InMemorySubscriptionStore},
};

pub struct TestAppStateBuilder {
    store: Arc<InMemorySubscriptionStore>,
    gateway: Arc<MockMandateGateway>,
    webhook_credentials: Option<WebhookCredentials>,
    allow_unauthenticated: bool,
}

impl TestAppStateBuilder {
    pub fn new() -> Self {
        Self {
            store: Arc::new(InMemorySubscriptionStore::new()),
            gateway: Arc::new(MockMandateGateway::new()),
            webhook_credentials: None,
            allow_unauthenticated: false,
        }
    }

    pub fn with_subscription(self, subscription: Subscription) -> Self {
        self.store.insert_sync(subscription);
        self
    }

    pub fn with_webhook_credentials(mut self, username: &str, password: &str) -> Self {
        self.webhook_credentials = Some(WebhookCredentials {
            username: username.to_string(),
            password: SecretString::new(password.into()),
        });
        self
    }

    pub fn allow_unauthenticated_webhooks(mut self) -> Self {
        self.allow_unauthenticated = true;
        self
    }

    /// Handle to the store for assertions after requests.
    pub fn store(&self) -> Arc<InMemorySubscriptionStore> {
        self.store.clone()
    }

    /// Handle to the gateway mock for programming and assertions.
    pub fn gateway(&self) -> Arc<MockMandateGateway> {
        self.gateway.clone()
    }

    pub fn build(self) -> AppState {
        let store = self.store as Arc<dyn SubscriptionStore>;
        let ids = Arc::new(MerchantIdGenerator::new());

        let lifecycle = SubscriptionLifecycleUseCases::new(
            store.clone(),
            self.gateway.clone(),
            ids.clone(),
            DebounceGate::new(Duration::from_secs(5), Arc::new(SystemClock)),
            2,
        );

        let redemptions = RedemptionUseCases::new(store.clone(), self.gateway, ids);

        let webhooks = WebhookUseCases::new(
            store,
            self.webhook_credentials,
            self.allow_unauthenticated,
        );

        AppState {
            config: Arc::new(test_config()),
            lifecycle: Arc::new(lifecycle),
            redemptions: Arc::new(redemptions),
            webhooks: Arc::new(webhooks),
        }
    }
}

impl Default for TestAppStateBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn test_config() -> AppConfig {
    AppConfig {
        bind_addr: "127.0.0.1:0".parse().unwrap(),
        database_url: "postgres://localhost/auric_test".into(),
        cors_origin: HeaderValue::from_static("http://localhost:3000"),
        gateway_base_url: Url::parse("https://gateway.test/v2").unwrap(),
        gateway_token_url: "https://gateway.test/v2/oauth/token".into(),
        gateway_client_id: "test-client".into(),
        gateway_client_secret: SecretString::new("test-secret".into()),
        gateway_timeout_secs: 5,
        webhook_username: None,
        webhook_password: None,
        webhook_allow_unauthenticated: false,
        reconcile_concurrency: 2,
        reconcile_debounce_secs: 5,
    }
}
