//! Rate Limiting for `/ask`
//!
//! Sliding window per user. Every call is recorded in the window before the
//! check, so rejected calls keep the window full. Stale users are pruned to an
//! empty window on their next call; nothing sweeps the map proactively.

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::types::UserId;

/// Rate limiter configuration
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Maximum requests per window
    pub max_requests: usize,
    /// Window length
    pub window: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 5,                  // 5 requests
            window: Duration::from_secs(60), // per minute
        }
    }
}

/// Per-user sliding window limiter
pub struct RateLimiter {
    config: RateLimitConfig,
    /// user -> request instants inside the window, oldest first
    windows: RwLock<HashMap<UserId, VecDeque<Instant>>>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            windows: RwLock::new(HashMap::new()),
        }
    }

    /// Record a request at `now` and decide whether it is admitted
    pub async fn admit(&self, user_id: UserId, now: Instant) -> bool {
        let mut windows = self.windows.write().await;
        let window = windows.entry(user_id).or_default();

        window.push_back(now);
        prune(window, now, self.config.window);

        if window.len() > self.config.max_requests {
            warn!(
                "User {} rate limited on /ask ({} requests in {}s)",
                user_id,
                window.len(),
                self.config.window.as_secs()
            );
            return false;
        }

        debug!(
            "User {} admitted on /ask ({} remaining)",
            user_id,
            self.config.max_requests - window.len()
        );
        true
    }

    /// Requests the user could still make at `now`
    pub async fn remaining(&self, user_id: UserId, now: Instant) -> usize {
        let windows = self.windows.read().await;
        let used = windows
            .get(&user_id)
            .map(|w| w.iter().filter(|&&t| in_window(t, now, self.config.window)).count())
            .unwrap_or(0);
        self.config.max_requests.saturating_sub(used)
    }

    /// Number of users with a window entry (including emptied ones)
    pub async fn tracked_users(&self) -> usize {
        self.windows.read().await.len()
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }
}

fn in_window(t: Instant, now: Instant, window: Duration) -> bool {
    now.saturating_duration_since(t) <= window
}

/// Drop entries older than the window
fn prune(entries: &mut VecDeque<Instant>, now: Instant, window: Duration) {
    while let Some(&oldest) = entries.front() {
        if in_window(oldest, now, window) {
            break;
        }
        entries.pop_front();
    }
}
