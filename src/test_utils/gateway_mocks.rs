//! Programmable in-memory mock of the mandate gateway port.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use crate::{
    app_error::{AppError, AppResult},
    application::ports::gateway::{
        ExecuteOutcome, MandateGatewayPort, MandateSetupRequest, MandateSetupResult, PauseWindow,
        RedemptionNotifyRequest, RedemptionNotifyResult, RedemptionStatusInfo,
    },
    domain::entities::{redemption::RedemptionState, subscription::SubscriptionStatus},
};

/// Records every call and tracks how many subscription-status calls are in
/// flight at once, so tests can assert the reconciliation concurrency
/// bound.
pub struct MockMandateGateway {
    statuses: Mutex<HashMap<String, SubscriptionStatus>>,
    failing_status_ids: Mutex<HashSet<String>>,
    status_delay: Mutex<Option<Duration>>,
    status_calls: AtomicUsize,
    in_flight_status: AtomicUsize,
    max_in_flight_status: AtomicUsize,

    setup_should_fail: AtomicBool,
    setup_calls: AtomicUsize,

    notify_should_fail: AtomicBool,
    notify_calls: AtomicUsize,

    execute_outcome: Mutex<ExecuteOutcome>,
    execute_calls: AtomicUsize,

    redemption_status_response: Mutex<RedemptionStatusInfo>,
    redemption_status_calls: AtomicUsize,

    cancel_count: AtomicUsize,
    pause_count: AtomicUsize,
    unpause_count: AtomicUsize,
    revoke_count: AtomicUsize,

    order_seq: AtomicUsize,
}

impl MockMandateGateway {
    pub fn new() -> Self {
        Self {
            statuses: Mutex::new(HashMap::new()),
            failing_status_ids: Mutex::new(HashSet::new()),
            status_delay: Mutex::new(None),
            status_calls: AtomicUsize::new(0),
            in_flight_status: AtomicUsize::new(0),
            max_in_flight_status: AtomicUsize::new(0),
            setup_should_fail: AtomicBool::new(false),
            setup_calls: AtomicUsize::new(0),
            notify_should_fail: AtomicBool::new(false),
            notify_calls: AtomicUsize::new(0),
            execute_outcome: Mutex::new(ExecuteOutcome::Completed {
                transaction_id: None,
            }),
            execute_calls: AtomicUsize::new(0),
            redemption_status_response: Mutex::new(RedemptionStatusInfo {
                state: RedemptionState::Pending,
                amount_minor: None,
                payment_details: Vec::new(),
            }),
            redemption_status_calls: AtomicUsize::new(0),
            cancel_count: AtomicUsize::new(0),
            pause_count: AtomicUsize::new(0),
            unpause_count: AtomicUsize::new(0),
            revoke_count: AtomicUsize::new(0),
            order_seq: AtomicUsize::new(0),
        }
    }

    // ========================================================================
    // Programming
    // ========================================================================

    pub fn set_status(&self, merchant_subscription_id: &str, status: SubscriptionStatus) {
        self.statuses
            .lock()
            .unwrap()
            .insert(merchant_subscription_id.to_string(), status);
    }

    pub fn fail_status_for(&self, merchant_subscription_id: &str) {
        self.failing_status_ids
            .lock()
            .unwrap()
            .insert(merchant_subscription_id.to_string());
    }

    pub fn set_status_delay(&self, delay: Duration) {
        *self.status_delay.lock().unwrap() = Some(delay);
    }

    pub fn fail_setup(&self) {
        self.setup_should_fail.store(true, Ordering::SeqCst);
    }

    pub fn fail_notify(&self) {
        self.notify_should_fail.store(true, Ordering::SeqCst);
    }

    pub fn set_execute_outcome(&self, outcome: ExecuteOutcome) {
        *self.execute_outcome.lock().unwrap() = outcome;
    }

    pub fn set_redemption_status(&self, info: RedemptionStatusInfo) {
        *self.redemption_status_response.lock().unwrap() = info;
    }

    // ========================================================================
    // Observations
    // ========================================================================

    pub fn status_calls(&self) -> usize {
        self.status_calls.load(Ordering::SeqCst)
    }

    pub fn max_in_flight_status_calls(&self) -> usize {
        self.max_in_flight_status.load(Ordering::SeqCst)
    }

    pub fn setup_calls(&self) -> usize {
        self.setup_calls.load(Ordering::SeqCst)
    }

    pub fn notify_calls(&self) -> usize {
        self.notify_calls.load(Ordering::SeqCst)
    }

    pub fn execute_calls(&self) -> usize {
        self.execute_calls.load(Ordering::SeqCst)
    }

    pub fn redemption_status_calls(&self) -> usize {
        self.redemption_status_calls.load(Ordering::SeqCst)
    }

    pub fn cancel_calls(&self) -> usize {
        self.cancel_count.load(Ordering::SeqCst)
    }

    pub fn pause_calls(&self) -> usize {
        self.pause_count.load(Ordering::SeqCst)
    }

    pub fn unpause_calls(&self) -> usize {
        self.unpause_count.load(Ordering::SeqCst)
    }

    pub fn revoke_calls(&self) -> usize {
        self.revoke_count.load(Ordering::SeqCst)
    }

    fn next_gateway_order_id(&self, prefix: &str) -> String {
        let n = self.order_seq.fetch_add(1, Ordering::SeqCst);
        format!("{prefix}{n}")
    }
}

impl Default for MockMandateGateway {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MandateGatewayPort for MockMandateGateway {
    async fn setup_mandate(&self, _request: &MandateSetupRequest) -> AppResult<MandateSetupResult> {
        self.setup_calls.fetch_add(1, Ordering::SeqCst);
        if self.setup_should_fail.load(Ordering::SeqCst) {
            return Err(AppError::Gateway {
                code: "SETUP_REJECTED".into(),
                message: "injected setup failure".into(),
            });
        }
        Ok(MandateSetupResult {
            gateway_order_id: self.next_gateway_order_id("GWO"),
            state: SubscriptionStatus::Pending,
            intent_url: Some("upi://mandate?payload=mock".into()),
        })
    }

    async fn subscription_status(
        &self,
        merchant_subscription_id: &str,
    ) -> AppResult<SubscriptionStatus> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        let in_flight = self.in_flight_status.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight_status
            .fetch_max(in_flight, Ordering::SeqCst);

        let delay = *self.status_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let result = if self
            .failing_status_ids
            .lock()
            .unwrap()
            .contains(merchant_subscription_id)
        {
            Err(AppError::GatewayTransport("injected status failure".into()))
        } else {
            self.statuses
                .lock()
                .unwrap()
                .get(merchant_subscription_id)
                .cloned()
                .ok_or(AppError::NotFound)
        };

        self.in_flight_status.fetch_sub(1, Ordering::SeqCst);
        result
    }

    async fn cancel_subscription(&self, _merchant_subscription_id: &str) -> AppResult<()> {
        self.cancel_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn pause_subscription(
        &self,
        _merchant_subscription_id: &str,
        _window: PauseWindow,
    ) -> AppResult<()> {
        self.pause_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn unpause_subscription(&self, _merchant_subscription_id: &str) -> AppResult<()> {
        self.unpause_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn revoke_subscription(&self, _merchant_subscription_id: &str) -> AppResult<()> {
        self.revoke_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn notify_redemption(
        &self,
        request: &RedemptionNotifyRequest,
    ) -> AppResult<RedemptionNotifyResult> {
        self.notify_calls.fetch_add(1, Ordering::SeqCst);
        if self.notify_should_fail.load(Ordering::SeqCst) {
            return Err(AppError::Gateway {
                code: "NOTIFY_REJECTED".into(),
                message: "injected notify failure".into(),
            });
        }
        Ok(RedemptionNotifyResult {
            gateway_order_id: self.next_gateway_order_id("GWR"),
            state: RedemptionState::Notified,
            expire_at: request.expire_at,
        })
    }

    async fn execute_redemption(&self, _merchant_order_id: &str) -> AppResult<ExecuteOutcome> {
        self.execute_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.execute_outcome.lock().unwrap().clone())
    }

    async fn redemption_status(&self, _merchant_order_id: &str) -> AppResult<RedemptionStatusInfo> {
        self.redemption_status_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.redemption_status_response.lock().unwrap().clone())
    }
}
