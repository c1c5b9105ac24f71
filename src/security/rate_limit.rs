//! Per-client token bucket rate limiting.
//!
//! Every client gets a bucket holding `requests` tokens that refills
//! continuously at `requests / window` tokens per second. A single mutex guards
//! the whole visitor table; a background sweep drops visitors idle for longer
//! than three windows.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use axum::http::HeaderMap;
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time;

use crate::config::RateLimitConfig;
use crate::observability::metrics;

/// Result of an admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Allowed,
    /// `retry_after` is the wait until one token is available, `None` if never.
    Denied { retry_after: Option<Duration> },
}

impl Admission {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Admission::Allowed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RateLimitError {
    #[error("rate limit exceeded")]
    Exceeded { retry_after: Option<Duration> },
}

/// Bucket state for one client.
#[derive(Debug, Clone)]
struct VisitorRecord {
    tokens_available: f64,
    last_refill: Instant,
    last_seen_at: Instant,
}

impl VisitorRecord {
    fn new(capacity: f64, now: Instant) -> Self {
        Self {
            tokens_available: capacity,
            last_refill: now,
            last_seen_at: now,
        }
    }

    fn try_acquire(&mut self, capacity: f64, refill_rate: f64, now: Instant) -> Admission {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();

        // Refill tokens
        self.tokens_available = (self.tokens_available + elapsed * refill_rate).min(capacity);
        self.last_refill = now;
        self.last_seen_at = now;

        if self.tokens_available >= 1.0 {
            self.tokens_available -= 1.0;
            Admission::Allowed
        } else {
            let missing = 1.0 - self.tokens_available;
            Admission::Denied {
                retry_after: Some(Duration::from_secs_f64(missing / refill_rate)),
            }
        }
    }
}

/// Owned visitor table. Share it through an `Arc`.
#[derive(Debug)]
pub struct VisitorThrottle {
    visitors: Mutex<HashMap<String, VisitorRecord>>,
    /// Bucket capacity (`R`).
    token_budget: f64,
    /// Tokens per second (`R / W`). Zero means every request is denied.
    refill_rate_per_second: f64,
    inactivity_threshold: Duration,
}

impl VisitorThrottle {
    /// `requests` per `window`. A zero quota or zero window fails closed.
    pub fn new(requests: u32, window: Duration) -> Self {
        let refill_rate_per_second = if requests == 0 || window.is_zero() {
            0.0
        } else {
            f64::from(requests) / window.as_secs_f64()
        };

        Self {
            visitors: Mutex::new(HashMap::new()),
            token_budget: f64::from(requests),
            refill_rate_per_second,
            inactivity_threshold: window.saturating_mul(3),
        }
    }

    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self::new(config.requests, Duration::from_secs(config.window_secs))
    }

    fn table(&self) -> MutexGuard<'_, HashMap<String, VisitorRecord>> {
        self.visitors.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn admit(&self, client_id: &str) -> Admission {
        self.admit_at(client_id, Instant::now())
    }

    /// Consume one token for `client_id` as of `now`.
    pub fn admit_at(&self, client_id: &str, now: Instant) -> Admission {
        if self.refill_rate_per_second <= 0.0 {
            return Admission::Denied { retry_after: None };
        }

        let mut visitors = self.table();
        let record = visitors
            .entry(client_id.to_string())
            .or_insert_with(|| VisitorRecord::new(self.token_budget, now));

        record.try_acquire(self.token_budget, self.refill_rate_per_second, now)
    }

    /// Check a client, mapping a denial to [`RateLimitError`].
    pub fn check(&self, client_id: &str) -> Result<(), RateLimitError> {
        match self.admit(client_id) {
            Admission::Allowed => Ok(()),
            Admission::Denied { retry_after } => Err(RateLimitError::Exceeded { retry_after }),
        }
    }

    /// Remove visitors idle for longer than the inactivity threshold. Returns how many were removed.
    pub fn sweep_at(&self, now: Instant) -> usize {
        let mut visitors = self.table();
        let before = visitors.len();
        visitors.retain(|_, v| now.saturating_duration_since(v.last_seen_at) <= self.inactivity_threshold);
        let removed = before - visitors.len();
        metrics::record_visitors(visitors.len());
        removed
    }

    pub fn sweep(&self) -> usize {
        self.sweep_at(Instant::now())
    }

    pub fn visitor_count(&self) -> usize {
        self.table().len()
    }

    pub fn inactivity_threshold(&self) -> Duration {
        self.inactivity_threshold
    }

    /// Run the sweep every `interval` until the shutdown signal fires.
    pub fn spawn_sweeper(
        self: Arc<Self>,
        interval: Duration,
        mut shutdown: broadcast::Receiver<()>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = time::interval_at(time::Instant::now() + interval, interval);
            tracing::debug!(interval = ?interval, threshold = ?self.inactivity_threshold, "Visitor sweep starting");

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let removed = self.sweep();
                        if removed > 0 {
                            tracing::debug!(removed, remaining = self.visitor_count(), "Swept idle visitors");
                        }
                    }
                    _ = shutdown.recv() => {
                        tracing::debug!("Visitor sweep received shutdown signal, exiting loop");
                        break;
                    }
                }
            }
        })
    }
}

/// Derive the rate-limit key for a request.
///
/// With `trust_forwarded_for`, the first `X-Forwarded-For` entry is used when present.
pub fn client_id(headers: &HeaderMap, peer: SocketAddr, trust_forwarded_for: bool) -> String {
    if trust_forwarded_for {
        let forwarded = headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty());
        if let Some(ip) = forwarded {
            return ip.to_string();
        }
    }
    peer.ip().to_string()
}
