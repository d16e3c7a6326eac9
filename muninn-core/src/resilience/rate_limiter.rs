//! Token-bucket rate limiter for exchange API pacing.
//!
//! Each endpoint owns an independent bucket of `burst` tokens refilled at
//! `capacity_per_s`. Refill is recomputed from the monotonic clock on every
//! acquire attempt, never incremented by a background task, so tokens are
//! neither lost nor duplicated and the count stays within `[0, burst]`.
//!
//! `acquire` blocks on a condvar with timed waits until tokens are present;
//! `try_acquire` fails fast. Waiters are woken after any refill progress.

use crate::monitoring::MetricsRegistry;
use dashmap::DashMap;
use parking_lot::{Condvar, Mutex};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// Per-endpoint bucket override.
#[derive(Debug, Clone, Copy)]
pub struct EndpointLimit {
    pub capacity_per_s: f64,
    pub burst: u32,
}

/// Rate limiter configuration
#[derive(Debug, Clone)]
pub struct RateLimiterConfig {
    /// Tokens added per second (sustained rate)
    pub capacity_per_s: f64,
    /// Maximum tokens in the bucket (burst allowance)
    pub burst: u32,
    /// Per-endpoint overrides; endpoints not listed use the global values
    pub endpoint_overrides: HashMap<String, EndpointLimit>,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            capacity_per_s: 8.0,
            burst: 16,
            endpoint_overrides: HashMap::new(),
        }
    }
}

struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

/// Token bucket for a single endpoint.
pub struct TokenBucket {
    endpoint: String,
    capacity_per_s: f64,
    burst: u32,
    state: Mutex<BucketState>,
    available: Condvar,
    metrics: Option<MetricsRegistry>,
}

impl TokenBucket {
    fn new(endpoint: String, limit: EndpointLimit, metrics: Option<MetricsRegistry>) -> Self {
        Self {
            endpoint,
            capacity_per_s: limit.capacity_per_s,
            burst: limit.burst,
            state: Mutex::new(BucketState {
                tokens: limit.burst as f64,
                last_refill: Instant::now(),
            }),
            available: Condvar::new(),
            metrics,
        }
    }

    fn refill(&self, state: &mut BucketState, now: Instant) {
        let elapsed = now.duration_since(state.last_refill).as_secs_f64();
        state.tokens = (state.tokens + elapsed * self.capacity_per_s).min(self.burst as f64);
        state.last_refill = now;
    }

    /// Acquire `tokens`, blocking until available. Returns total wait in ms.
    pub fn acquire(&self, tokens: u32) -> f64 {
        let start = Instant::now();
        let needed = tokens as f64;
        let mut first_wait = true;

        {
            let mut state = self.state.lock();
            loop {
                let now = Instant::now();
                self.refill(&mut state, now);

                if state.tokens >= needed {
                    state.tokens -= needed;
                    break;
                }

                if first_wait {
                    first_wait = false;
                    if let Some(metrics) = &self.metrics {
                        metrics
                            .resilience()
                            .rate_limit_hits
                            .with_label_values(&[self.endpoint.as_str()])
                            .inc();
                    }
                }

                let deficit = needed - state.tokens;
                let wait = Duration::from_secs_f64(deficit / self.capacity_per_s);
                // Timed wait: timeout just means it is time to recompute the
                // refill, so both wakeup paths loop back around.
                self.available.wait_for(&mut state, wait);
            }
        }

        // Refill progress may have freed enough for other waiters too.
        self.available.notify_all();

        let wait_ms = start.elapsed().as_secs_f64() * 1000.0;
        if wait_ms > 0.0 {
            if let Some(metrics) = &self.metrics {
                metrics
                    .resilience()
                    .rate_limit_wait_ms
                    .with_label_values(&[self.endpoint.as_str()])
                    .observe(wait_ms);
            }
            debug!(endpoint = %self.endpoint, wait_ms, "rate limiter wait");
        }
        wait_ms
    }

    /// Acquire without blocking. Returns false when starved.
    pub fn try_acquire(&self, tokens: u32) -> bool {
        let mut state = self.state.lock();
        let now = Instant::now();
        self.refill(&mut state, now);

        if state.tokens >= tokens as f64 {
            state.tokens -= tokens as f64;
            true
        } else {
            if let Some(metrics) = &self.metrics {
                metrics
                    .resilience()
                    .rate_limit_hits
                    .with_label_values(&[self.endpoint.as_str()])
                    .inc();
            }
            false
        }
    }

    /// Current token count (for monitoring).
    pub fn available_tokens(&self) -> f64 {
        let mut state = self.state.lock();
        let now = Instant::now();
        self.refill(&mut state, now);
        state.tokens
    }
}

/// Per-endpoint token-bucket rate limiter.
pub struct RateLimiter {
    config: RateLimiterConfig,
    buckets: DashMap<String, Arc<TokenBucket>>,
    metrics: Option<MetricsRegistry>,
}

impl RateLimiter {
    pub fn new(config: RateLimiterConfig) -> Self {
        Self::with_metrics(config, None)
    }

    pub fn with_metrics(config: RateLimiterConfig, metrics: Option<MetricsRegistry>) -> Self {
        Self {
            config,
            buckets: DashMap::new(),
            metrics,
        }
    }

    fn endpoint_limit(&self, endpoint: &str) -> EndpointLimit {
        self.config
            .endpoint_overrides
            .get(endpoint)
            .copied()
            .unwrap_or(EndpointLimit {
                capacity_per_s: self.config.capacity_per_s,
                burst: self.config.burst,
            })
    }

    fn bucket(&self, endpoint: &str) -> Arc<TokenBucket> {
        self.buckets
            .entry(endpoint.to_string())
            .or_insert_with(|| {
                Arc::new(TokenBucket::new(
                    endpoint.to_string(),
                    self.endpoint_limit(endpoint),
                    self.metrics.clone(),
                ))
            })
            .clone()
    }

    /// Blocking acquire. Returns total wait in ms.
    pub fn acquire(&self, endpoint: &str, tokens: u32) -> f64 {
        self.bucket(endpoint).acquire(tokens)
    }

    /// Non-blocking acquire.
    pub fn try_acquire(&self, endpoint: &str, tokens: u32) -> bool {
        self.bucket(endpoint).try_acquire(tokens)
    }

    /// Current tokens for an endpoint (for monitoring).
    pub fn available_tokens(&self, endpoint: &str) -> f64 {
        self.bucket(endpoint).available_tokens()
    }
}
