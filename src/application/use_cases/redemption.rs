use std::collections::HashMap;
use std::sync::Arc;

use chrono::{Duration, Utc};
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{info, instrument, warn};

use crate::{
    app_error::{AppError, AppResult},
    application::ids::MerchantIdGenerator,
    application::ports::gateway::{
        ExecuteOutcome, MandateGatewayPort, RedemptionNotifyRequest, RedemptionStatusInfo,
    },
    application::use_cases::subscription_lifecycle::SubscriptionStore,
    domain::entities::redemption::{RedemptionOrder, RedemptionRetryStrategy, RedemptionState},
};

/// Default expiry for a notified charge when the caller does not pass one.
const DEFAULT_NOTIFY_EXPIRY_SECS: i64 = 172_800;

#[derive(Debug, Clone, Deserialize)]
pub struct NotifyRedemptionInput {
    pub merchant_subscription_id: String,
    pub amount_minor: i64,
    pub expire_after_secs: Option<i64>,
    pub metadata: Option<serde_json::Value>,
    pub retry_strategy: RedemptionRetryStrategy,
    pub auto_debit: bool,
}

/// Drives the three-phase charge protocol (notify → execute →
/// status-check) against active mandates.
///
/// Orders live in an in-process session ledger; each notify mints a fresh
/// `merchant_order_id` that is never reused, so the gateway's idempotency
/// keying stays correct across retries.
pub struct RedemptionUseCases {
    store: Arc<dyn SubscriptionStore>,
    gateway: Arc<dyn MandateGatewayPort>,
    ids: Arc<MerchantIdGenerator>,
    orders: Mutex<HashMap<String, RedemptionOrder>>,
}

impl RedemptionUseCases {
    pub fn new(
        store: Arc<dyn SubscriptionStore>,
        gateway: Arc<dyn MandateGatewayPort>,
        ids: Arc<MerchantIdGenerator>,
    ) -> Self {
        Self {
            store,
            gateway,
            ids,
            orders: Mutex::new(HashMap::new()),
        }
    }

    // ========================================================================
    // Notify
    // ========================================================================

    /// Declare intent to charge a mandate. Fails fast on gateway errors:
    /// nothing is recorded and the caller retries with a fresh order id.
    #[instrument(skip(self, input), fields(merchant_subscription_id = %input.merchant_subscription_id))]
    pub async fn notify(&self, input: NotifyRedemptionInput) -> AppResult<RedemptionOrder> {
        if input.amount_minor <= 0 {
            return Err(AppError::InvalidInput("amount must be positive".into()));
        }

        let subscription = self
            .store
            .get(&input.merchant_subscription_id)
            .await?
            .ok_or(AppError::NotFound)?;
        if !subscription.status.is_active() {
            return Err(AppError::SubscriptionNotActive(format!(
                "{} is {}",
                subscription.merchant_subscription_id, subscription.status
            )));
        }
        if input.amount_minor > subscription.max_amount_minor {
            return Err(AppError::InvalidInput(format!(
                "amount {} exceeds mandate ceiling {}",
                input.amount_minor, subscription.max_amount_minor
            )));
        }

        let merchant_order_id = self.ids.next_order_id();
        let now = Utc::now();
        let expire_at = now
            + Duration::seconds(
                input
                    .expire_after_secs
                    .unwrap_or(DEFAULT_NOTIFY_EXPIRY_SECS),
            );

        let request = RedemptionNotifyRequest {
            merchant_order_id: merchant_order_id.clone(),
            merchant_subscription_id: input.merchant_subscription_id.clone(),
            amount_minor: input.amount_minor,
            expire_at: Some(expire_at),
            metadata: input.metadata,
            retry_strategy: input.retry_strategy,
            auto_debit: input.auto_debit,
        };

        let result = self.gateway.notify_redemption(&request).await?;

        let order = RedemptionOrder {
            merchant_order_id: merchant_order_id.clone(),
            gateway_order_id: result.gateway_order_id,
            merchant_subscription_id: input.merchant_subscription_id,
            amount_minor: input.amount_minor,
            state: result.state,
            transaction_id: None,
            created_at: now,
        };

        self.orders
            .lock()
            .await
            .insert(merchant_order_id.clone(), order.clone());
        info!(merchant_order_id = %merchant_order_id, state = %order.state, "Redemption notified");
        Ok(order)
    }

    // ========================================================================
    // Execute
    // ========================================================================

    /// Trigger the charge for a notified order.
    ///
    /// Preconditioned on the subscription's cached status being ACTIVE;
    /// rejected before any gateway traffic otherwise. An ambiguous execute
    /// answer (timeout, order-not-found, empty body) falls back to exactly
    /// one status check rather than a second execute.
    #[instrument(skip(self))]
    pub async fn execute(&self, merchant_order_id: &str) -> AppResult<RedemptionOrder> {
        let order = self
            .orders
            .lock()
            .await
            .get(merchant_order_id)
            .cloned()
            .ok_or(AppError::NotFound)?;

        if order.state == RedemptionState::Completed {
            return Ok(order);
        }
        if order.state.is_terminal() {
            return Err(AppError::InvalidInput(format!(
                "order {merchant_order_id} already resolved as {}",
                order.state
            )));
        }

        let subscription = self
            .store
            .get(&order.merchant_subscription_id)
            .await?
            .ok_or(AppError::NotFound)?;
        if !subscription.status.is_active() {
            return Err(AppError::SubscriptionNotActive(format!(
                "{} is {}",
                subscription.merchant_subscription_id, subscription.status
            )));
        }

        self.set_state(merchant_order_id, RedemptionState::ExecutionInProgress)
            .await;

        let outcome = self.gateway.execute_redemption(merchant_order_id).await?;

        let mut updated = order;
        match outcome {
            ExecuteOutcome::Completed { transaction_id } => {
                updated.state = RedemptionState::Completed;
                updated.transaction_id = transaction_id;
            }
            ExecuteOutcome::Pending => {
                updated.state = RedemptionState::Pending;
            }
            ExecuteOutcome::Failed { code, message } => {
                info!(merchant_order_id, code = %code, message = %message, "Redemption execute failed");
                updated.state = RedemptionState::Failed;
            }
            ExecuteOutcome::Ambiguous => {
                warn!(
                    merchant_order_id,
                    "Ambiguous execute answer, reconciling via status check"
                );
                let info = self.gateway.redemption_status(merchant_order_id).await?;
                apply_status_info(&mut updated, &info);
            }
        }

        self.orders
            .lock()
            .await
            .insert(merchant_order_id.to_string(), updated.clone());
        Ok(updated)
    }

    // ========================================================================
    // Status
    // ========================================================================

    /// Idempotent, side-effect-free read of the gateway-side order state;
    /// the canonical way to resolve `PENDING` and ambiguous outcomes.
    #[instrument(skip(self))]
    pub async fn check_status(&self, merchant_order_id: &str) -> AppResult<RedemptionOrder> {
        let mut order = self
            .orders
            .lock()
            .await
            .get(merchant_order_id)
            .cloned()
            .ok_or(AppError::NotFound)?;

        let info = self.gateway.redemption_status(merchant_order_id).await?;
        apply_status_info(&mut order, &info);

        self.orders
            .lock()
            .await
            .insert(merchant_order_id.to_string(), order.clone());
        Ok(order)
    }

    async fn set_state(&self, merchant_order_id: &str, state: RedemptionState) {
        if let Some(order) = self.orders.lock().await.get_mut(merchant_order_id) {
            order.state = state;
        }
    }
}

fn apply_status_info(order: &mut RedemptionOrder, info: &RedemptionStatusInfo) {
    order.state = info.state.clone();
    if let Some(transaction_id) = info.settled_transaction_id() {
        order.transaction_id = Some(transaction_id);
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;
    use crate::application::ports::gateway::PaymentDetail;
    use crate::domain::entities::subscription::SubscriptionStatus;
    use crate::test_utils::{
        MockMandateGateway, InMemorySubscriptionStore, create_test_subscription,
        test_notify_input,
    };

    async fn active_subscription(store: &InMemorySubscriptionStore, id: &str) {
        store
            .upsert(&create_test_subscription(|s| {
                s.merchant_subscription_id = id.into();
                s.status = SubscriptionStatus::Active;
            }))
            .await
            .unwrap();
    }

    fn redemptions(
        store: Arc<InMemorySubscriptionStore>,
        gateway: Arc<MockMandateGateway>,
    ) -> RedemptionUseCases {
        RedemptionUseCases::new(store, gateway, Arc::new(MerchantIdGenerator::new()))
    }

    // ========================================================================
    // Notify
    // ========================================================================

    #[tokio::test]
    async fn notify_records_order_with_gateway_ids() {
        let store = Arc::new(InMemorySubscriptionStore::new());
        active_subscription(&store, "S1").await;
        let gateway = Arc::new(MockMandateGateway::new());
        let uc = redemptions(store, gateway.clone());

        let order = uc.notify(test_notify_input("S1")).await.unwrap();
        assert!(order.merchant_order_id.starts_with("MORD"));
        assert!(!order.gateway_order_id.is_empty());
        assert_eq!(order.state, RedemptionState::Notified);
        assert_eq!(order.transaction_id, None);
        assert_eq!(gateway.notify_calls(), 1);
    }

    #[tokio::test]
    async fn notify_requires_active_subscription() {
        let store = Arc::new(InMemorySubscriptionStore::new());
        store
            .upsert(&create_test_subscription(|s| {
                s.merchant_subscription_id = "S1".into();
                s.status = SubscriptionStatus::Paused;
            }))
            .await
            .unwrap();
        let gateway = Arc::new(MockMandateGateway::new());
        let uc = redemptions(store, gateway.clone());

        let result = uc.notify(test_notify_input("S1")).await;
        assert!(matches!(result, Err(AppError::SubscriptionNotActive(_))));
        assert_eq!(gateway.notify_calls(), 0);
    }

    #[tokio::test]
    async fn notify_rejects_amount_over_mandate_ceiling() {
        let store = Arc::new(InMemorySubscriptionStore::new());
        store
            .upsert(&create_test_subscription(|s| {
                s.merchant_subscription_id = "S1".into();
                s.status = SubscriptionStatus::Active;
                s.max_amount_minor = 5000;
            }))
            .await
            .unwrap();
        let gateway = Arc::new(MockMandateGateway::new());
        let uc = redemptions(store, gateway.clone());

        let mut input = test_notify_input("S1");
        input.amount_minor = 5001;
        assert!(matches!(
            uc.notify(input).await,
            Err(AppError::InvalidInput(_))
        ));
        assert_eq!(gateway.notify_calls(), 0);
    }

    #[tokio::test]
    async fn notify_failure_records_nothing() {
        let store = Arc::new(InMemorySubscriptionStore::new());
        active_subscription(&store, "S1").await;
        let gateway = Arc::new(MockMandateGateway::new());
        gateway.fail_notify();
        let uc = redemptions(store, gateway.clone());

        let result = uc.notify(test_notify_input("S1")).await;
        assert!(matches!(result, Err(AppError::Gateway { .. })));

        // Nothing to execute or poll: the order id was burned.
        assert!(matches!(
            uc.check_status("anything").await,
            Err(AppError::NotFound)
        ));
    }

    #[tokio::test]
    async fn notify_never_reuses_order_ids() {
        let store = Arc::new(InMemorySubscriptionStore::new());
        active_subscription(&store, "S1").await;
        let gateway = Arc::new(MockMandateGateway::new());
        let uc = Arc::new(redemptions(store, gateway));

        let mut handles = Vec::new();
        for _ in 0..20 {
            let uc = uc.clone();
            handles.push(tokio::spawn(async move {
                uc.notify(test_notify_input("S1")).await.unwrap()
            }));
        }

        let mut ids = HashSet::new();
        for handle in handles {
            let order = handle.await.unwrap();
            assert!(
                ids.insert(order.merchant_order_id.clone()),
                "merchant order id reused"
            );
        }
        assert_eq!(ids.len(), 20);
    }

    // ========================================================================
    // Execute
    // ========================================================================

    #[tokio::test]
    async fn execute_completes_on_settled_outcome() {
        let store = Arc::new(InMemorySubscriptionStore::new());
        active_subscription(&store, "S1").await;
        let gateway = Arc::new(MockMandateGateway::new());
        gateway.set_execute_outcome(ExecuteOutcome::Completed {
            transaction_id: Some("T1".into()),
        });
        let uc = redemptions(store, gateway.clone());

        let order = uc.notify(test_notify_input("S1")).await.unwrap();
        let executed = uc.execute(&order.merchant_order_id).await.unwrap();

        assert_eq!(executed.state, RedemptionState::Completed);
        assert_eq!(executed.transaction_id, Some("T1".to_string()));
        assert_eq!(gateway.execute_calls(), 1);
        assert_eq!(gateway.redemption_status_calls(), 0);
    }

    #[tokio::test]
    async fn execute_rejects_non_active_subscription_without_gateway_calls() {
        let store = Arc::new(InMemorySubscriptionStore::new());
        active_subscription(&store, "S1").await;
        let gateway = Arc::new(MockMandateGateway::new());
        let uc = redemptions(store.clone(), gateway.clone());

        let order = uc.notify(test_notify_input("S1")).await.unwrap();

        // The mandate dies between notify and execute.
        store
            .update_status("S1", SubscriptionStatus::Cancelled)
            .await
            .unwrap();

        let result = uc.execute(&order.merchant_order_id).await;
        assert!(matches!(result, Err(AppError::SubscriptionNotActive(_))));
        assert_eq!(gateway.execute_calls(), 0);
        assert_eq!(gateway.redemption_status_calls(), 0);
    }

    #[tokio::test]
    async fn execute_falls_back_to_status_check_on_ambiguity() {
        let store = Arc::new(InMemorySubscriptionStore::new());
        active_subscription(&store, "S1").await;
        let gateway = Arc::new(MockMandateGateway::new());
        gateway.set_execute_outcome(ExecuteOutcome::Ambiguous);
        gateway.set_redemption_status(RedemptionStatusInfo {
            state: RedemptionState::Completed,
            amount_minor: Some(3000),
            payment_details: vec![PaymentDetail {
                transaction_id: "T1".into(),
                payment_mode: Some("UPI_AUTO_PAY".into()),
                state: RedemptionState::Completed,
            }],
        });
        let uc = redemptions(store, gateway.clone());

        let order = uc.notify(test_notify_input("S1")).await.unwrap();
        let executed = uc.execute(&order.merchant_order_id).await.unwrap();

        assert_eq!(executed.state, RedemptionState::Completed);
        assert_eq!(executed.transaction_id, Some("T1".to_string()));
        // One execute, one reconciling status read, never a second execute.
        assert_eq!(gateway.execute_calls(), 1);
        assert_eq!(gateway.redemption_status_calls(), 1);
    }

    #[tokio::test]
    async fn execute_failed_outcome_is_a_normal_result() {
        let store = Arc::new(InMemorySubscriptionStore::new());
        active_subscription(&store, "S1").await;
        let gateway = Arc::new(MockMandateGateway::new());
        gateway.set_execute_outcome(ExecuteOutcome::Failed {
            code: "INSUFFICIENT_FUNDS".into(),
            message: "debit bounced".into(),
        });
        let uc = redemptions(store, gateway.clone());

        let order = uc.notify(test_notify_input("S1")).await.unwrap();
        let executed = uc.execute(&order.merchant_order_id).await.unwrap();

        assert_eq!(executed.state, RedemptionState::Failed);
        assert_eq!(executed.transaction_id, None);
        assert_eq!(gateway.redemption_status_calls(), 0);

        // A resolved failure cannot be executed again; the caller must
        // notify afresh with a new order id.
        assert!(matches!(
            uc.execute(&order.merchant_order_id).await,
            Err(AppError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn pending_execute_resolves_via_check_status() {
        let store = Arc::new(InMemorySubscriptionStore::new());
        active_subscription(&store, "S1").await;
        let gateway = Arc::new(MockMandateGateway::new());
        gateway.set_execute_outcome(ExecuteOutcome::Pending);
        let uc = redemptions(store, gateway.clone());

        let order = uc.notify(test_notify_input("S1")).await.unwrap();
        let executed = uc.execute(&order.merchant_order_id).await.unwrap();
        assert_eq!(executed.state, RedemptionState::Pending);

        gateway.set_redemption_status(RedemptionStatusInfo {
            state: RedemptionState::Completed,
            amount_minor: Some(3000),
            payment_details: vec![PaymentDetail {
                transaction_id: "T9".into(),
                payment_mode: None,
                state: RedemptionState::Completed,
            }],
        });

        let resolved = uc.check_status(&order.merchant_order_id).await.unwrap();
        assert_eq!(resolved.state, RedemptionState::Completed);
        assert_eq!(resolved.transaction_id, Some("T9".to_string()));
    }

    #[tokio::test]
    async fn check_status_unknown_order_is_not_found() {
        let store = Arc::new(InMemorySubscriptionStore::new());
        let gateway = Arc::new(MockMandateGateway::new());
        let uc = redemptions(store, gateway);

        assert!(matches!(
            uc.check_status("MORD000").await,
            Err(AppError::NotFound)
        ));
    }
}
