use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

/// Fixed-window request limiter keyed by caller identity.
///
/// One window per minute per key; counts reset when the minute rolls
/// over. Coarse, but the point is to stop a runaway agent from hammering
/// the API, not to shape traffic precisely.
pub struct RateLimiter {
    rpm: u32,
    windows: Mutex<HashMap<String, (u64, u32)>>,
}

impl RateLimiter {
    pub fn new(rpm: u32) -> Self {
        Self {
            rpm,
            windows: Mutex::new(HashMap::new()),
        }
    }

    /// Record one request for `key`; false means over the limit.
    pub fn check(&self, key: &str) -> bool {
        let minute = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() / 60)
            .unwrap_or(0);

        let mut windows = self
            .windows
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        // Stale windows pile up one per caller; sweep when it gets silly.
        if windows.len() > 10_000 {
            windows.retain(|_, (window, _)| *window == minute);
        }

        let entry = windows.entry(key.to_string()).or_insert((minute, 0));
        if entry.0 != minute {
            *entry = (minute, 0);
        }
        if entry.1 >= self.rpm {
            return false;
        }
        entry.1 += 1;
        true
    }
}
