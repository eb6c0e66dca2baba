//! Login attempt limiter
//!
//! Throttles brute-force login attempts on two keys:
//! - failed attempts per identifier (an email, or `pin@<client ip>`), over
//!   the configured lockout window
//! - login requests per client IP, over one minute
//!
//! State is in memory only; [`LoginRateLimiter::cleanup`] prunes it and is
//! run periodically from `main`.

use crate::config::AuthConfig;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::net::IpAddr;
use tokio::sync::RwLock;

pub struct LoginRateLimiter {
    max_failed_attempts: usize,
    lockout: Duration,
    max_requests_per_minute: usize,
    failures: RwLock<HashMap<String, Vec<DateTime<Utc>>>>,
    requests: RwLock<HashMap<IpAddr, Vec<DateTime<Utc>>>>,
}

impl LoginRateLimiter {
    pub fn new(config: &AuthConfig) -> Self {
        Self {
            max_failed_attempts: config.max_failed_attempts,
            lockout: Duration::minutes(config.lockout_minutes),
            max_requests_per_minute: config.max_requests_per_minute,
            failures: RwLock::new(HashMap::new()),
            requests: RwLock::new(HashMap::new()),
        }
    }

    /// Whether the identifier has used up its failed attempts
    pub async fn is_locked(&self, identifier: &str, now: DateTime<Utc>) -> bool {
        let cutoff = now - self.lockout;
        let mut failures = self.failures.write().await;
        let entry = failures.entry(identifier.to_lowercase()).or_default();
        entry.retain(|t| *t > cutoff);
        entry.len() >= self.max_failed_attempts
    }

    pub async fn record_failure(&self, identifier: &str, now: DateTime<Utc>) {
        self.failures
            .write()
            .await
            .entry(identifier.to_lowercase())
            .or_default()
            .push(now);
    }

    /// Forget failures after a successful login
    pub async fn clear(&self, identifier: &str) {
        self.failures.write().await.remove(&identifier.to_lowercase());
    }

    /// Count a request from `ip`; returns false when the IP is over its limit
    pub async fn allow_request(&self, ip: IpAddr, now: DateTime<Utc>) -> bool {
        let cutoff = now - Duration::minutes(1);
        let mut requests = self.requests.write().await;
        let entry = requests.entry(ip).or_default();
        entry.retain(|t| *t > cutoff);
        if entry.len() >= self.max_requests_per_minute {
            return false;
        }
        entry.push(now);
        true
    }

    /// Drop expired entries
    pub async fn cleanup(&self, now: DateTime<Utc>) {
        let failure_cutoff = now - self.lockout;
        self.failures.write().await.retain(|_, times| {
            times.retain(|t| *t > failure_cutoff);
            !times.is_empty()
        });

        let request_cutoff = now - Duration::minutes(1);
        self.requests.write().await.retain(|_, times| {
            times.retain(|t| *t > request_cutoff);
            !times.is_empty()
        });
    }

    #[cfg(test)]
    async fn tracked_keys(&self) -> (usize, usize) {
        (self.failures.read().await.len(), self.requests.read().await.len())
    }
}
