use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use super::clock::Clock;

/// Token bucket of size one with a fixed refill window.
///
/// Suppresses storms of identical work triggered by UI refocus events: the
/// first acquire in a window wins, everything else inside the window is
/// rejected. Best-effort and process-local only, which is acceptable
/// because the guarded work is idempotent.
pub struct DebounceGate {
    window: Duration,
    clock: Arc<dyn Clock>,
    last_acquired: Mutex<Option<Instant>>,
}

impl DebounceGate {
    pub fn new(window: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            window,
            clock,
            last_acquired: Mutex::new(None),
        }
    }

    /// Take the token if the window has refilled. Returns `false` for
    /// re-entrant calls inside the window.
    pub fn try_acquire(&self) -> bool {
        let now = self.clock.now();
        let mut last = self
            .last_acquired
            .lock()
            .expect("debounce gate mutex poisoned");
        match *last {
            Some(previous) if now.duration_since(previous) < self.window => false,
            _ => {
                *last = Some(now);
                true
            }
        }
    }
}
