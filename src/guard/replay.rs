//! Replay protection: a TTL-bounded "seen" set keyed by signature hash.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing::debug;

use super::clock::Clock;

/// Key-value store with per-key expiry, used to detect duplicate requests.
///
/// Implementations must make [`check_and_mark`](Self::check_and_mark) an
/// atomic test-and-set: two concurrent calls with the same key must never
/// both observe "not seen". Entries are never removed explicitly; they age
/// out after their TTL.
pub trait ReplayStore: Send + Sync {
    /// Returns `true` if `key` is already present and unexpired. Otherwise
    /// records it for `ttl` and returns `false`.
    fn check_and_mark(&self, key: &str, ttl: Duration) -> bool;
}

/// Thread-safe in-memory replay store.
pub struct MemoryReplayStore {
    /// Map of key -> expiry (unix seconds).
    entries: Mutex<HashMap<String, u64>>,
    clock: Arc<dyn Clock>,
}

impl MemoryReplayStore {
    /// Create a store that reads time from `clock`.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            clock,
        }
    }

    /// Get the current number of stored keys (for monitoring).
    pub fn len(&self) -> usize {
        match self.entries.lock() {
            Ok(guard) => guard.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    /// Check if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop expired keys.
    pub fn cleanup(&self) {
        let mut entries = match self.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let now = self.clock.now_secs();
        let before = entries.len();
        entries.retain(|_, expiry| *expiry > now);

        let removed = before - entries.len();
        if removed > 0 {
            debug!(removed, remaining = entries.len(), "Expired replay keys removed");
        }
    }

    /// Start a background cleanup task.
    ///
    /// This spawns a tokio task that periodically drops expired keys.
    pub fn start_cleanup_task(self: &Arc<Self>, interval: Duration) {
        let store = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval_timer = tokio::time::interval(interval);
            loop {
                interval_timer.tick().await;
                store.cleanup();
            }
        });
    }
}

impl ReplayStore for MemoryReplayStore {
    fn check_and_mark(&self, key: &str, ttl: Duration) -> bool {
        let mut entries = match self.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let now = self.clock.now_secs();

        if let Some(expiry) = entries.get(key) {
            if *expiry > now {
                return true;
            }
        }

        entries.insert(key.to_string(), now.saturating_add(ttl.as_secs()));
        false
    }
}
