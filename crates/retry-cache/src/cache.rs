//! In-memory retry counter cache with TTL expiration.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, info, instrument};

/// Sweep interval upper bound for expired counters.
const MAX_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

struct RetryEntry {
    count: u32,
    expires_at: Instant,
}

/// Retry counters keyed by message id.
///
/// Cloning is cheap and every clone shares the same counters.
#[derive(Clone)]
pub struct RetryCache {
    entries: Arc<RwLock<HashMap<String, RetryEntry>>>,
    ttl: Duration,
}

impl RetryCache {
    /// Create a cache whose counters expire `ttl` after their last increment.
    ///
    /// Spawns a background task that sweeps expired counters, so this must be
    /// called from within a tokio runtime.
    pub fn new(ttl: Duration) -> Self {
        let cache = Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            ttl,
        };

        let sweeper = cache.clone();
        tokio::spawn(async move {
            sweeper.sweep_loop().await;
        });

        info!("Retry cache initialized (ttl={:?})", ttl);

        cache
    }

    async fn sweep_loop(&self) {
        let interval = self.ttl.min(MAX_SWEEP_INTERVAL).max(Duration::from_millis(10));

        loop {
            tokio::time::sleep(interval).await;

            let now = Instant::now();
            let mut entries = self.entries.write().await;
            let before = entries.len();

            entries.retain(|_, entry| entry.expires_at > now);

            let removed = before - entries.len();
            if removed > 0 {
                debug!("Swept {} expired retry counters", removed);
            }
        }
    }

    /// Current retry count for a message, if one is live.
    pub async fn get(&self, key: &str) -> Option<u32> {
        let entries = self.entries.read().await;
        let now = Instant::now();

        entries
            .get(key)
            .filter(|entry| entry.expires_at > now)
            .map(|entry| entry.count)
    }

    /// Bump the counter for a message and return the new count.
    ///
    /// An expired counter restarts at 1.
    #[instrument(skip(self))]
    pub async fn increment(&self, key: &str) -> u32 {
        let mut entries = self.entries.write().await;
        let now = Instant::now();
        let expires_at = now + self.ttl;

        let entry = entries.entry(key.to_string()).or_insert(RetryEntry {
            count: 0,
            expires_at,
        });

        if entry.expires_at <= now {
            entry.count = 0;
        }
        entry.count += 1;
        entry.expires_at = expires_at;

        debug!(count = entry.count, "Retry counter bumped");
        entry.count
    }

    /// Drop the counter for a message. Returns whether a live one existed.
    pub async fn remove(&self, key: &str) -> bool {
        let mut entries = self.entries.write().await;
        let now = Instant::now();

        entries
            .remove(key)
            .map(|entry| entry.expires_at > now)
            .unwrap_or(false)
    }

    /// Number of live counters.
    pub async fn len(&self) -> usize {
        let entries = self.entries.read().await;
        let now = Instant::now();
        entries.values().filter(|entry| entry.expires_at > now).count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Configured time-to-live.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }
}
