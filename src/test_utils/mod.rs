//! Shared fixtures and in-memory mocks for tests.

pub mod app_state_builder;
pub mod gateway_mocks;
pub mod store_mocks;

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::Utc;
use uuid::Uuid;

pub use app_state_builder::TestAppStateBuilder;
pub use gateway_mocks::MockMandateGateway;
pub use store_mocks::InMemorySubscriptionStore;

use crate::{
    application::ids::MerchantIdGenerator,
    application::use_cases::redemption::NotifyRedemptionInput,
    application::use_cases::subscription_lifecycle::{
        SetupMandateInput, SubscriptionLifecycleUseCases, SubscriptionStore,
    },
    domain::entities::redemption::RedemptionRetryStrategy,
    domain::entities::subscription::{
        AmountType, AuthWorkflowType, Frequency, Subscription, SubscriptionStatus,
    },
    infra::{clock::Clock, debounce::DebounceGate},
};

// ============================================================================
// Manual clock
// ============================================================================

/// Deterministic clock for debounce tests; time only moves on `advance`.
pub struct ManualClock {
    base: Instant,
    offset: Mutex<Duration>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            base: Instant::now(),
            offset: Mutex::new(Duration::ZERO),
        }
    }

    pub fn advance(&self, by: Duration) {
        *self.offset.lock().unwrap() += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.base + *self.offset.lock().unwrap()
    }
}

// ============================================================================
// Factories
// ============================================================================

pub fn create_test_subscription(customize: impl FnOnce(&mut Subscription)) -> Subscription {
    let now = Utc::now();
    let mut subscription = Subscription {
        merchant_subscription_id: "MSUB-test".into(),
        gateway_order_id: "GWO-test".into(),
        user_id: Uuid::new_v4(),
        status: SubscriptionStatus::Pending,
        amount_minor: 3000,
        max_amount_minor: 15000,
        amount_type: AmountType::Fixed,
        frequency: Frequency::Monthly,
        auth_workflow_type: AuthWorkflowType::Transaction,
        start_date: now,
        end_date: now + chrono::Duration::days(3650),
        created_at: now,
        updated_at: now,
    };
    customize(&mut subscription);
    subscription
}

pub fn test_setup_input() -> SetupMandateInput {
    SetupMandateInput {
        user_id: Uuid::new_v4(),
        amount_minor: 3000,
        max_amount_minor: 15000,
        amount_type: AmountType::Fixed,
        frequency: Frequency::Monthly,
        auth_workflow_type: AuthWorkflowType::Transaction,
        end_date: None,
    }
}

pub fn test_notify_input(merchant_subscription_id: &str) -> NotifyRedemptionInput {
    NotifyRedemptionInput {
        merchant_subscription_id: merchant_subscription_id.to_string(),
        amount_minor: 3000,
        expire_after_secs: None,
        metadata: None,
        retry_strategy: RedemptionRetryStrategy::Standard,
        auto_debit: true,
    }
}

pub fn test_lifecycle(
    store: Arc<InMemorySubscriptionStore>,
    gateway: Arc<MockMandateGateway>,
    reconcile_gate: DebounceGate,
) -> SubscriptionLifecycleUseCases {
    SubscriptionLifecycleUseCases::new(
        store as Arc<dyn SubscriptionStore>,
        gateway,
        Arc::new(MerchantIdGenerator::new()),
        reconcile_gate,
        2,
    )
}
