//! Login throttling against password guessing
//!
//! Failed sign-ins are counted per normalized email. Too many failures
//! inside the window lock the account out of password sign-in for the ban
//! duration; a successful sign-in clears the count.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{info, warn};

/// Rate limiter configuration
#[derive(Debug, Clone)]
pub struct RateLimiterConfig {
    /// Failures allowed inside one window
    pub max_attempts: u32,
    /// Time window in seconds
    pub window_seconds: u64,
    /// Ban duration in seconds
    pub ban_duration_seconds: u64,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            window_seconds: 300,
            ban_duration_seconds: 3600,
        }
    }
}

#[derive(Debug)]
struct FailureEntry {
    failures: u32,
    window_start: Instant,
    ban_expires: Option<Instant>,
}

impl FailureEntry {
    /// Still banned, or still inside its counting window
    fn is_live(&self, now: Instant, window: Duration) -> bool {
        match self.ban_expires {
            Some(ban_expires) => now < ban_expires,
            None => now.duration_since(self.window_start) < window,
        }
    }
}

/// Per-key failure counter
#[derive(Debug, Clone)]
pub struct RateLimiter {
    config: RateLimiterConfig,
    entries: Arc<Mutex<HashMap<String, FailureEntry>>>,
}

impl RateLimiter {
    pub fn new(config: RateLimiterConfig) -> Self {
        Self {
            config,
            entries: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Whether `key` may attempt to sign in right now
    pub async fn is_allowed(&self, key: &str) -> bool {
        let mut entries = self.entries.lock().await;
        let now = Instant::now();

        let Some(ban_expires) = entries.get(&normalize(key)).map(|e| e.ban_expires) else {
            return true;
        };

        match ban_expires {
            Some(ban_expires) if now < ban_expires => false,
            Some(_) => {
                entries.remove(&normalize(key));
                true
            }
            None => true,
        }
    }

    /// Count a failed attempt, banning `key` once the limit is reached
    pub async fn record_failure(&self, key: &str) {
        let mut entries = self.entries.lock().await;
        let now = Instant::now();
        let window = Duration::from_secs(self.config.window_seconds);

        // Keys are caller-chosen, so drop entries that no longer count
        // towards anything before adding another one.
        entries.retain(|_, entry| entry.is_live(now, window));

        let entry = entries.entry(normalize(key)).or_insert(FailureEntry {
            failures: 0,
            window_start: now,
            ban_expires: None,
        });

        if now.duration_since(entry.window_start) >= window {
            entry.failures = 0;
            entry.window_start = now;
        }

        entry.failures += 1;
        if entry.failures >= self.config.max_attempts && entry.ban_expires.is_none() {
            entry.ban_expires = Some(now + Duration::from_secs(self.config.ban_duration_seconds));
            warn!(
                "Banned {} from signing in for {} seconds after {} failures",
                key, self.config.ban_duration_seconds, entry.failures
            );
        }
    }

    /// Forget the failures of `key` after a successful sign-in
    pub async fn reset(&self, key: &str) {
        if self.entries.lock().await.remove(&normalize(key)).is_some() {
            info!("Cleared failed sign-in count for {}", key);
        }
    }
}

fn normalize(key: &str) -> String {
    key.trim().to_lowercase()
}
