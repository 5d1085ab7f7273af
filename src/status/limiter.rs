//! Per-credential poll rate limiting.
//!
//! The remote's status-fetch budget is issued against the access token, not
//! the publish id, so one limiter instance is shared by every job polling
//! under the same credential.

use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

pub struct CredentialLimiter {
    min_interval: Duration,
    last_call: Mutex<HashMap<String, Instant>>,
}

impl CredentialLimiter {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_call: Mutex::new(HashMap::new()),
        }
    }

    /// Wait until the credential is allowed another call, then claim the slot
    pub async fn acquire(&self, credential: &str) {
        loop {
            let wait = {
                let mut last_call = self.last_call.lock().await;
                let now = Instant::now();
                match last_call.get(credential) {
                    Some(last) if now.duration_since(*last) < self.min_interval => {
                        Some(self.min_interval - now.duration_since(*last))
                    }
                    _ => {
                        last_call.insert(credential.to_string(), now);
                        None
                    }
                }
            };

            match wait {
                Some(delay) => tokio::time::sleep(delay).await,
                None => return,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_spaces_calls_per_credential() {
        let limiter = CredentialLimiter::new(Duration::from_millis(50));

        let start = Instant::now();
        limiter.acquire("token_a").await;
        limiter.acquire("token_a").await;
        limiter.acquire("token_a").await;
        assert!(start.elapsed() >= Duration::from_millis(100));
    }

    #[tokio::test]
    async fn test_distinct_credentials_independent() {
        let limiter = CredentialLimiter::new(Duration::from_millis(200));

        let start = Instant::now();
        limiter.acquire("token_a").await;
        limiter.acquire("token_b").await;
        // Second credential does not wait on the first one's slot
        assert!(start.elapsed() < Duration::from_millis(150));
    }
}
