use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::common::error::{FaceAuthError, Result};

const PRUNE_THRESHOLD: usize = 1024;

/// Allows one login attempt per client per window.
pub struct LoginThrottle {
    window: Duration,
    last_attempt: Mutex<HashMap<String, Instant>>,
}

impl LoginThrottle {
    pub fn new(window: Duration) -> Self {
        Self { window, last_attempt: Mutex::new(HashMap::new()) }
    }

    pub fn check(&self, client: &str) -> Result<()> {
        self.check_at(client, Instant::now())
    }

    /// Records the attempt when it is allowed; a refused attempt does not
    /// extend the window.
    pub fn check_at(&self, client: &str, now: Instant) -> Result<()> {
        let mut attempts = self
            .last_attempt
            .lock()
            .map_err(|_| FaceAuthError::Other(anyhow::anyhow!("throttle lock poisoned")))?;

        if let Some(last) = attempts.get(client) {
            let elapsed = now.saturating_duration_since(*last);
            if elapsed < self.window {
                let retry_after_ms = (self.window - elapsed).as_millis() as u64;
                tracing::warn!("Login attempt from {} throttled ({} ms left)", client, retry_after_ms);
                return Err(FaceAuthError::RateLimited { retry_after_ms });
            }
        }

        if attempts.len() >= PRUNE_THRESHOLD {
            let window = self.window;
            attempts.retain(|_, last| now.saturating_duration_since(*last) < window);
        }
        attempts.insert(client.to_string(), now);
        Ok(())
    }
}
