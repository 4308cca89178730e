use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use rand::Rng;
use rand::distributions::Alphanumeric;

/// Mints merchant-side identifiers for subscriptions and orders.
///
/// Identifiers are time-prefixed and carry a process-wide atomic sequence,
/// so concurrent calls within one process can never collide; a short
/// random suffix guards against collisions across restarts. Order ids are
/// single-use: every redemption attempt gets a fresh one.
pub struct MerchantIdGenerator {
    sequence: AtomicU64,
}

impl MerchantIdGenerator {
    pub fn new() -> Self {
        Self {
            sequence: AtomicU64::new(0),
        }
    }

    pub fn next_subscription_id(&self) -> String {
        self.mint("MSUB")
    }

    pub fn next_order_id(&self) -> String {
        self.mint("MORD")
    }

    fn mint(&self, prefix: &str) -> String {
        let millis = Utc::now().timestamp_millis();
        let seq = self.sequence.fetch_add(1, Ordering::Relaxed);
        let suffix: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(6)
            .map(char::from)
            .collect();
        format!("{prefix}{millis}{seq:06}{suffix}")
    }
}

impl Default for MerchantIdGenerator {
    fn default() -> Self {
        Self::new()
    }
}
