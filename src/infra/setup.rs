use std::sync::Arc;
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::{
    adapters::{http::app_state::AppState, persistence::postgres_persistence},
    application::{
        ids::MerchantIdGenerator,
        use_cases::{
            redemption::RedemptionUseCases,
            subscription_lifecycle::{SubscriptionLifecycleUseCases, SubscriptionStore},
            webhook::WebhookUseCases,
        },
    },
    infra::{
        clock::SystemClock,
        config::AppConfig,
        debounce::DebounceGate,
        gateway_client::HttpMandateGateway,
        token_provider::{HttpTokenFetcher, TokenProvider},
    },
};

pub async fn init_app_state() -> anyhow::Result<AppState> {
    let config = AppConfig::from_env();

    let postgres_arc = Arc::new(postgres_persistence(&config.database_url).await?);
    let store_arc = postgres_arc as Arc<dyn SubscriptionStore>;

    let http_client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.gateway_timeout_secs))
        .build()?;

    let token_provider = Arc::new(TokenProvider::new(Arc::new(HttpTokenFetcher::new(
        http_client.clone(),
        config.gateway_token_url.clone(),
        config.gateway_client_id.clone(),
        SecretString::new(config.gateway_client_secret.expose_secret().into()),
    ))));

    let gateway = Arc::new(HttpMandateGateway::new(
        http_client,
        config.gateway_base_url.as_str().to_string(),
        token_provider,
    ));

    let ids = Arc::new(MerchantIdGenerator::new());

    let reconcile_gate = DebounceGate::new(
        Duration::from_secs(config.reconcile_debounce_secs),
        Arc::new(SystemClock),
    );

    let lifecycle = SubscriptionLifecycleUseCases::new(
        store_arc.clone(),
        gateway.clone(),
        ids.clone(),
        reconcile_gate,
        config.reconcile_concurrency,
    );

    let redemptions = RedemptionUseCases::new(store_arc.clone(), gateway, ids);

    let webhooks = WebhookUseCases::new(
        store_arc,
        config.webhook_credentials(),
        config.webhook_allow_unauthenticated,
    );

    Ok(AppState {
        config: Arc::new(config),
        lifecycle: Arc::new(lifecycle),
        redemptions: Arc::new(redemptions),
        webhooks: Arc::new(webhooks),
    })
}

pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "auric_api=debug,tower_http=debug".into());

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .try_init()
        .ok();
}
