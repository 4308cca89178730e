//! In-memory mock of the subscription store.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::Utc;

use crate::{
    app_error::{AppError, AppResult},
    application::use_cases::subscription_lifecycle::SubscriptionStore,
    domain::entities::subscription::{Subscription, SubscriptionStatus},
};

/// Mirrors the Postgres store semantics: keyed by
/// `merchant_subscription_id`, field-level replace on upsert, last-write-
/// wins status updates. Counts writes so tests can assert idempotency.
#[derive(Default)]
pub struct InMemorySubscriptionStore {
    pub subscriptions: Mutex<HashMap<String, Subscription>>,
    update_status_calls: AtomicUsize,
}

impl InMemorySubscriptionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_subscriptions(subscriptions: Vec<Subscription>) -> Self {
        let map: HashMap<String, Subscription> = subscriptions
            .into_iter()
            .map(|s| (s.merchant_subscription_id.clone(), s))
            .collect();
        Self {
            subscriptions: Mutex::new(map),
            update_status_calls: AtomicUsize::new(0),
        }
    }

    /// Number of `update_status` calls observed (for idempotency asserts).
    pub fn update_status_calls(&self) -> usize {
        self.update_status_calls.load(Ordering::SeqCst)
    }

    pub fn insert_sync(&self, subscription: Subscription) {
        self.subscriptions
            .lock()
            .unwrap()
            .insert(subscription.merchant_subscription_id.clone(), subscription);
    }

    pub fn get_sync(&self, merchant_subscription_id: &str) -> Option<Subscription> {
        self.subscriptions
            .lock()
            .unwrap()
            .get(merchant_subscription_id)
            .cloned()
    }

    /// Flip a status without going through the counted write path.
    pub fn set_status_sync(&self, merchant_subscription_id: &str, status: SubscriptionStatus) {
        if let Some(sub) = self
            .subscriptions
            .lock()
            .unwrap()
            .get_mut(merchant_subscription_id)
        {
            sub.status = status;
        }
    }
}

#[async_trait]
impl SubscriptionStore for InMemorySubscriptionStore {
    async fn get(&self, merchant_subscription_id: &str) -> AppResult<Option<Subscription>> {
        Ok(self
            .subscriptions
            .lock()
            .unwrap()
            .get(merchant_subscription_id)
            .cloned())
    }

    async fn get_all(&self) -> AppResult<Vec<Subscription>> {
        let mut all: Vec<_> = self
            .subscriptions
            .lock()
            .unwrap()
            .values()
            .cloned()
            .collect();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(all)
    }

    async fn get_active_only(&self) -> AppResult<Vec<Subscription>> {
        Ok(self
            .subscriptions
            .lock()
            .unwrap()
            .values()
            .filter(|s| s.status.is_active())
            .cloned()
            .collect())
    }

    async fn upsert(&self, subscription: &Subscription) -> AppResult<Subscription> {
        let mut subs = self.subscriptions.lock().unwrap();
        let now = Utc::now();

        let mut stored = subscription.clone();
        if let Some(existing) = subs.get(&subscription.merchant_subscription_id) {
            stored.created_at = existing.created_at;
        }
        stored.updated_at = now;

        subs.insert(stored.merchant_subscription_id.clone(), stored.clone());
        Ok(stored)
    }

    async fn update_status(
        &self,
        merchant_subscription_id: &str,
        status: SubscriptionStatus,
    ) -> AppResult<Subscription> {
        self.update_status_calls.fetch_add(1, Ordering::SeqCst);

        let mut subs = self.subscriptions.lock().unwrap();
        let sub = subs
            .get_mut(merchant_subscription_id)
            .ok_or(AppError::NotFound)?;
        sub.status = status;
        sub.updated_at = Utc::now();
        Ok(sub.clone())
    }
}
