use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tokio::task::JoinSet;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::{
    app_error::{AppError, AppResult},
    application::ids::MerchantIdGenerator,
    application::ports::gateway::{
        MandateGatewayPort, MandateSetupRequest, PauseWindow,
    },
    domain::entities::subscription::{
        AmountType, AuthWorkflowType, Frequency, StatusBucket, Subscription, SubscriptionStatus,
    },
    infra::debounce::DebounceGate,
};

/// Setup orders expire if the payer does not authorize within this window.
const SETUP_ORDER_EXPIRY_SECS: i64 = 900;

/// Default mandate validity when the caller does not supply an end date.
const DEFAULT_MANDATE_VALIDITY_DAYS: i64 = 3650;

// ============================================================================
// Local Subscription Store
// ============================================================================

/// Durable key-value cache of subscriptions, keyed by
/// `merchant_subscription_id`. It caches an externally-authoritative
/// system, so all mutation is last-write-wins; rows are never deleted.
#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    async fn get(&self, merchant_subscription_id: &str) -> AppResult<Option<Subscription>>;

    /// Full scan, used for classification and batch reconciliation.
    async fn get_all(&self) -> AppResult<Vec<Subscription>>;

    async fn get_active_only(&self) -> AppResult<Vec<Subscription>>;

    /// Insert if absent, field-level replace if present.
    async fn upsert(&self, subscription: &Subscription) -> AppResult<Subscription>;

    async fn update_status(
        &self,
        merchant_subscription_id: &str,
        status: SubscriptionStatus,
    ) -> AppResult<Subscription>;
}

// ============================================================================
// Input / Output Types
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct SetupMandateInput {
    pub user_id: Uuid,
    pub amount_minor: i64,
    pub max_amount_minor: i64,
    pub amount_type: AmountType,
    pub frequency: Frequency,
    pub auth_workflow_type: AuthWorkflowType,
    /// Mandate validity end; defaults to ten years out.
    pub end_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MandateSetupOutcome {
    pub subscription: Subscription,
    /// Redirect/intent handle for the payer's UPI app, when the gateway
    /// issued one.
    pub intent_url: Option<String>,
}

/// Deterministic partition of subscriptions by status bucket.
#[derive(Debug, Default, Serialize)]
pub struct SubscriptionBuckets {
    pub active: Vec<Subscription>,
    pub pending: Vec<Subscription>,
    pub cancelled_or_terminal: Vec<Subscription>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconcileOutcome {
    Updated(SubscriptionStatus),
    Unchanged(SubscriptionStatus),
}

impl ReconcileOutcome {
    pub fn status(&self) -> &SubscriptionStatus {
        match self {
            ReconcileOutcome::Updated(s) | ReconcileOutcome::Unchanged(s) => s,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ReconcileEntry {
    pub merchant_subscription_id: String,
    pub status: Option<SubscriptionStatus>,
    pub error: Option<String>,
}

#[derive(Debug, Default, Serialize)]
pub struct ReconcileReport {
    pub updated: usize,
    pub unchanged: usize,
    pub failed: usize,
    pub entries: Vec<ReconcileEntry>,
}

// ============================================================================
// Use Cases
// ============================================================================

pub struct SubscriptionLifecycleUseCases {
    store: Arc<dyn SubscriptionStore>,
    gateway: Arc<dyn MandateGatewayPort>,
    ids: Arc<MerchantIdGenerator>,
    /// Best-effort guard against reconciliation storms from UI refocus
    /// events; acceptable as a soft guard because reconciliation is
    /// idempotent.
    reconcile_gate: DebounceGate,
    reconcile_concurrency: usize,
}

impl SubscriptionLifecycleUseCases {
    pub fn new(
        store: Arc<dyn SubscriptionStore>,
        gateway: Arc<dyn MandateGatewayPort>,
        ids: Arc<MerchantIdGenerator>,
        reconcile_gate: DebounceGate,
        reconcile_concurrency: usize,
    ) -> Self {
        Self {
            store,
            gateway,
            ids,
            reconcile_gate,
            reconcile_concurrency: reconcile_concurrency.max(1),
        }
    }

    // ========================================================================
    // Setup
    // ========================================================================

    /// Create a new mandate with the gateway and persist it locally as
    /// `PENDING`. On gateway failure nothing is persisted.
    #[instrument(skip(self, input), fields(user_id = %input.user_id))]
    pub async fn setup(&self, input: SetupMandateInput) -> AppResult<MandateSetupOutcome> {
        if input.amount_minor <= 0 {
            return Err(AppError::InvalidInput("amount must be positive".into()));
        }
        if input.max_amount_minor < input.amount_minor {
            return Err(AppError::InvalidInput(
                "max_amount must be at least the recurring amount".into(),
            ));
        }

        let merchant_order_id = self.ids.next_order_id();
        let merchant_subscription_id = self.ids.next_subscription_id();

        // The generator makes collisions impossible within a process; this
        // guards the store-wide uniqueness invariant across restarts.
        if self.store.get(&merchant_subscription_id).await?.is_some() {
            return Err(AppError::DuplicateSubscriptionId(merchant_subscription_id));
        }

        let now = Utc::now();
        let end_date = input
            .end_date
            .unwrap_or(now + Duration::days(DEFAULT_MANDATE_VALIDITY_DAYS));
        if end_date <= now {
            return Err(AppError::InvalidInput("end_date must be in the future".into()));
        }

        let request = MandateSetupRequest {
            merchant_order_id,
            merchant_subscription_id: merchant_subscription_id.clone(),
            amount_minor: input.amount_minor,
            max_amount_minor: input.max_amount_minor,
            amount_type: input.amount_type,
            frequency: input.frequency,
            auth_workflow_type: input.auth_workflow_type,
            expire_at: now + Duration::seconds(SETUP_ORDER_EXPIRY_SECS),
        };

        let result = self.gateway.setup_mandate(&request).await?;

        let subscription = Subscription {
            merchant_subscription_id: merchant_subscription_id.clone(),
            gateway_order_id: result.gateway_order_id,
            user_id: input.user_id,
            status: SubscriptionStatus::Pending,
            amount_minor: input.amount_minor,
            max_amount_minor: input.max_amount_minor,
            amount_type: input.amount_type,
            frequency: input.frequency,
            auth_workflow_type: input.auth_workflow_type,
            start_date: now,
            end_date,
            created_at: now,
            updated_at: now,
        };

        let stored = self.store.upsert(&subscription).await?;
        info!(
            merchant_subscription_id = %merchant_subscription_id,
            gateway_state = %result.state,
            "Mandate setup created"
        );

        Ok(MandateSetupOutcome {
            subscription: stored,
            intent_url: result.intent_url,
        })
    }

    // ========================================================================
    // Queries
    // ========================================================================

    pub async fn get(&self, merchant_subscription_id: &str) -> AppResult<Subscription> {
        self.store
            .get(merchant_subscription_id)
            .await?
            .ok_or(AppError::NotFound)
    }

    /// Partition subscriptions into active / pending / terminal buckets.
    /// Unknown statuses land in `pending`; nothing is ever dropped.
    pub fn classify(subscriptions: Vec<Subscription>) -> SubscriptionBuckets {
        let mut buckets = SubscriptionBuckets::default();
        for sub in subscriptions {
            match sub.status.bucket() {
                StatusBucket::Active => buckets.active.push(sub),
                StatusBucket::Pending => buckets.pending.push(sub),
                StatusBucket::Terminal => buckets.cancelled_or_terminal.push(sub),
            }
        }
        buckets
    }

    pub async fn list_classified(&self) -> AppResult<SubscriptionBuckets> {
        let subscriptions = self.store.get_all().await?;
        Ok(Self::classify(subscriptions))
    }

    // ========================================================================
    // Reconciliation
    // ========================================================================

    /// Poll the gateway for one subscription and update the store when the
    /// status changed. Idempotent: with no gateway-side change the store
    /// is untouched.
    #[instrument(skip(self))]
    pub async fn reconcile_one(&self, merchant_subscription_id: &str) -> AppResult<ReconcileOutcome> {
        reconcile_subscription(
            self.store.clone(),
            self.gateway.clone(),
            merchant_subscription_id,
        )
        .await
    }

    /// Reconcile every non-terminal subscription in the store.
    pub async fn reconcile_all(&self) -> AppResult<ReconcileReport> {
        let ids: Vec<String> = self
            .store
            .get_all()
            .await?
            .into_iter()
            .filter(|s| !s.status.is_terminal())
            .map(|s| s.merchant_subscription_id)
            .collect();
        self.reconcile_batch(ids).await
    }

    /// Reconcile a batch with bounded concurrency: sequential chunks of at
    /// most K subscriptions, fanned out concurrently within a chunk and
    /// fully joined before the next chunk starts. Debounced: re-entrant
    /// calls within the guard window are rejected without any gateway
    /// traffic.
    #[instrument(skip(self, ids), fields(batch = ids.len()))]
    pub async fn reconcile_batch(&self, ids: Vec<String>) -> AppResult<ReconcileReport> {
        if !self.reconcile_gate.try_acquire() {
            debug!("Batch reconciliation debounced");
            return Err(AppError::RateLimited);
        }

        let mut report = ReconcileReport::default();
        for chunk in ids.chunks(self.reconcile_concurrency) {
            let mut tasks = JoinSet::new();
            for id in chunk {
                let store = self.store.clone();
                let gateway = self.gateway.clone();
                let id = id.clone();
                tasks.spawn(async move {
                    let outcome = reconcile_subscription(store, gateway, &id).await;
                    (id, outcome)
                });
            }

            let mut results: HashMap<String, AppResult<ReconcileOutcome>> = HashMap::new();
            while let Some(joined) = tasks.join_next().await {
                match joined {
                    Ok((id, outcome)) => {
                        results.insert(id, outcome);
                    }
                    Err(e) => error!(error = %e, "Reconcile task panicked"),
                }
            }

            // Report entries keep the caller's input order.
            for id in chunk {
                let entry = match results.remove(id) {
                    Some(Ok(ReconcileOutcome::Updated(status))) => {
                        report.updated += 1;
                        ReconcileEntry {
                            merchant_subscription_id: id.clone(),
                            status: Some(status),
                            error: None,
                        }
                    }
                    Some(Ok(ReconcileOutcome::Unchanged(status))) => {
                        report.unchanged += 1;
                        ReconcileEntry {
                            merchant_subscription_id: id.clone(),
                            status: Some(status),
                            error: None,
                        }
                    }
                    Some(Err(e)) => {
                        report.failed += 1;
                        ReconcileEntry {
                            merchant_subscription_id: id.clone(),
                            status: None,
                            error: Some(e.to_string()),
                        }
                    }
                    None => {
                        report.failed += 1;
                        ReconcileEntry {
                            merchant_subscription_id: id.clone(),
                            status: None,
                            error: Some("reconcile task aborted".into()),
                        }
                    }
                };
                report.entries.push(entry);
            }
        }

        info!(
            updated = report.updated,
            unchanged = report.unchanged,
            failed = report.failed,
            "Batch reconciliation complete"
        );
        Ok(report)
    }

    // ========================================================================
    // User-initiated lifecycle transitions
    // ========================================================================

    /// Cancel a mandate. The gateway answers synchronously, so the store
    /// moves straight to the terminal `CANCELLED`. Repeated cancels are
    /// no-ops.
    #[instrument(skip(self))]
    pub async fn cancel(&self, merchant_subscription_id: &str) -> AppResult<Subscription> {
        let sub = self.get(merchant_subscription_id).await?;
        match sub.status {
            SubscriptionStatus::Cancelled | SubscriptionStatus::CancelInProgress => Ok(sub),
            s if s.is_terminal() => Err(AppError::InvalidInput(format!(
                "cannot cancel subscription in terminal status {s}"
            ))),
            _ => {
                self.gateway
                    .cancel_subscription(merchant_subscription_id)
                    .await?;
                self.store
                    .update_status(merchant_subscription_id, SubscriptionStatus::Cancelled)
                    .await
            }
        }
    }

    /// Revoke the payer's standing authorization. Terminal, like cancel.
    #[instrument(skip(self))]
    pub async fn revoke(&self, merchant_subscription_id: &str) -> AppResult<Subscription> {
        let sub = self.get(merchant_subscription_id).await?;
        match sub.status {
            SubscriptionStatus::Revoked | SubscriptionStatus::RevokeInProgress => Ok(sub),
            s if s.is_terminal() => Err(AppError::InvalidInput(format!(
                "cannot revoke subscription in terminal status {s}"
            ))),
            _ => {
                self.gateway
                    .revoke_subscription(merchant_subscription_id)
                    .await?;
                self.store
                    .update_status(merchant_subscription_id, SubscriptionStatus::Revoked)
                    .await
            }
        }
    }

    /// Pause an active mandate for the given window. The gateway settles
    /// the pause asynchronously, so the store holds `PAUSE_IN_PROGRESS`
    /// until a webhook or poll confirms. Pausing an already-paused
    /// subscription is an idempotent no-op with no gateway traffic.
    #[instrument(skip(self, window))]
    pub async fn pause(
        &self,
        merchant_subscription_id: &str,
        window: PauseWindow,
    ) -> AppResult<Subscription> {
        if window.pause_start >= window.pause_end {
            return Err(AppError::InvalidInput(
                "pause_start must precede pause_end".into(),
            ));
        }

        let sub = self.get(merchant_subscription_id).await?;
        match sub.status {
            SubscriptionStatus::Paused | SubscriptionStatus::PauseInProgress => Ok(sub),
            SubscriptionStatus::Active => {
                self.gateway
                    .pause_subscription(merchant_subscription_id, window)
                    .await?;
                self.store
                    .update_status(merchant_subscription_id, SubscriptionStatus::PauseInProgress)
                    .await
            }
            s => Err(AppError::SubscriptionNotActive(format!(
                "{merchant_subscription_id} is {s}"
            ))),
        }
    }

    /// Resume a paused mandate; `UNPAUSE_IN_PROGRESS` until confirmed.
    #[instrument(skip(self))]
    pub async fn unpause(&self, merchant_subscription_id: &str) -> AppResult<Subscription> {
        let sub = self.get(merchant_subscription_id).await?;
        match sub.status {
            SubscriptionStatus::Active | SubscriptionStatus::UnpauseInProgress => Ok(sub),
            SubscriptionStatus::Paused => {
                self.gateway
                    .unpause_subscription(merchant_subscription_id)
                    .await?;
                self.store
                    .update_status(
                        merchant_subscription_id,
                        SubscriptionStatus::UnpauseInProgress,
                    )
                    .await
            }
            s => Err(AppError::InvalidInput(format!(
                "cannot unpause subscription in status {s}"
            ))),
        }
    }
}

/// Shared by `reconcile_one` and the batch fan-out tasks.
async fn reconcile_subscription(
    store: Arc<dyn SubscriptionStore>,
    gateway: Arc<dyn MandateGatewayPort>,
    merchant_subscription_id: &str,
) -> AppResult<ReconcileOutcome> {
    let current = store
        .get(merchant_subscription_id)
        .await?
        .ok_or(AppError::NotFound)?;

    let remote = gateway
        .subscription_status(merchant_subscription_id)
        .await?;

    if remote == current.status {
        return Ok(ReconcileOutcome::Unchanged(remote));
    }

    if !current.status.can_transition_to(&remote) {
        warn!(
            merchant_subscription_id,
            cached = %current.status,
            remote = %remote,
            "Ignoring gateway transition out of a terminal status"
        );
        return Ok(ReconcileOutcome::Unchanged(current.status));
    }

    if let SubscriptionStatus::Unknown(raw) = &remote {
        warn!(
            merchant_subscription_id,
            raw = %raw,
            "Gateway returned an unrecognized subscription status"
        );
    }

    store
        .update_status(merchant_subscription_id, remote.clone())
        .await?;
    Ok(ReconcileOutcome::Updated(remote))
}
