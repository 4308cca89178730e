use std::sync::Arc;

use crate::{
    application::use_cases::{
        redemption::RedemptionUseCases, subscription_lifecycle::SubscriptionLifecycleUseCases,
        webhook::WebhookUseCases,
    },
    infra::config::AppConfig,
};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub lifecycle: Arc<SubscriptionLifecycleUseCases>,
    pub redemptions: Arc<RedemptionUseCases>,
    pub webhooks: Arc<WebhookUseCases>,
}
