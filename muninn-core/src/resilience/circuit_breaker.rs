//! Circuit breaker guarding exchange endpoints.
//!
//! ## State Machine
//!
//! ```text
//!     CLOSED ──[>= fail_threshold failures in window_s]──→ OPEN
//!        ▲                                                   │
//!        │              probe_count successes      cooldown_s + min_dwell_s
//!        └───────────── HALFOPEN ◄──────────────────────────┘
//!                          │
//!                     any failure
//!                          ▼
//!                        OPEN
//! ```
//!
//! Failure counting uses a sliding window of monotonic timestamps; entries
//! older than `window_s` are evicted. CLOSED→OPEN, HALF_OPEN→CLOSED and
//! HALF_OPEN→OPEN are forced (bypass the dwell gate); OPEN→HALF_OPEN is
//! dwell-gated to prevent flapping. The failure window is cleared only on
//! entering CLOSED, so a failed probe re-opens with its history intact.

use crate::core::errors::ErrorCode;
use crate::monitoring::MetricsRegistry;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Circuit breaker states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CircuitState {
    Closed = 0,
    Open = 1,
    HalfOpen = 2,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        }
    }
}

/// Configuration for circuit breaker
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Sliding window for failure counting
    pub window: Duration,
    /// Failures in window before opening
    pub fail_threshold: usize,
    /// Time in OPEN before a probe is admitted
    pub cooldown: Duration,
    /// Minimum time in a state before non-forced transitions
    pub min_dwell: Duration,
    /// Consecutive probe successes required to close
    pub probe_count: usize,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            window: Duration::from_secs(60),
            fail_threshold: 10,
            cooldown: Duration::from_secs(30),
            min_dwell: Duration::from_secs(30),
            probe_count: 1,
        }
    }
}

struct BreakerInner {
    state: CircuitState,
    state_changed_at: Instant,
    failures: VecDeque<Instant>,
    probe_successes: usize,
}

/// Thread-safe circuit breaker for one logical endpoint.
pub struct CircuitBreaker {
    endpoint: String,
    config: CircuitBreakerConfig,
    inner: Mutex<BreakerInner>,
    metrics: Option<MetricsRegistry>,
}

impl CircuitBreaker {
    pub fn new(endpoint: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self::with_metrics(endpoint, config, None)
    }

    pub fn with_metrics(
        endpoint: impl Into<String>,
        config: CircuitBreakerConfig,
        metrics: Option<MetricsRegistry>,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            config,
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                state_changed_at: Instant::now(),
                failures: VecDeque::new(),
                probe_successes: 0,
            }),
            metrics,
        }
    }

    /// Whether a call may proceed.
    ///
    /// Allowlisted calls always pass. Otherwise CLOSED allows, OPEN blocks,
    /// and HALF_OPEN allows: the caller is the probe. Checking also advances
    /// OPEN→HALF_OPEN once cooldown and dwell have both elapsed.
    pub fn allow_request(&self, is_allowlist: bool) -> bool {
        if is_allowlist {
            return true;
        }

        let mut inner = self.inner.lock();
        let now = Instant::now();

        if inner.state == CircuitState::Open {
            let in_state = now.duration_since(inner.state_changed_at);
            if in_state >= self.config.cooldown && in_state >= self.config.min_dwell {
                self.transition(&mut inner, CircuitState::HalfOpen, now);
            }
        }

        match inner.state {
            CircuitState::Closed | CircuitState::HalfOpen => true,
            CircuitState::Open => false,
        }
    }

    /// Record a successful call.
    pub fn record_success(&self) {
        let mut inner = self.inner.lock();
        if inner.state == CircuitState::HalfOpen {
            inner.probe_successes += 1;
            if inner.probe_successes >= self.config.probe_count {
                let now = Instant::now();
                self.transition(&mut inner, CircuitState::Closed, now);
            }
        }
    }

    /// Record a failed call, classified by [`ErrorCode`].
    pub fn record_failure(&self, code: ErrorCode) {
        let mut inner = self.inner.lock();
        let now = Instant::now();

        inner.failures.push_back(now);
        self.evict_expired(&mut inner, now);

        if let Some(metrics) = &self.metrics {
            metrics
                .resilience()
                .api_failures
                .with_label_values(&[self.endpoint.as_str(), code.as_str()])
                .inc();
        }

        match inner.state {
            CircuitState::Closed => {
                if inner.failures.len() >= self.config.fail_threshold {
                    warn!(
                        endpoint = %self.endpoint,
                        failures = inner.failures.len(),
                        "circuit breaker tripped: CLOSED -> OPEN"
                    );
                    self.transition(&mut inner, CircuitState::Open, now);
                }
            }
            CircuitState::HalfOpen => {
                warn!(endpoint = %self.endpoint, "probe failed: HALFOPEN -> OPEN");
                self.transition(&mut inner, CircuitState::Open, now);
            }
            CircuitState::Open => {}
        }
    }

    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }

    /// Failures currently inside the sliding window.
    pub fn failure_count(&self) -> usize {
        let mut inner = self.inner.lock();
        let now = Instant::now();
        self.evict_expired(&mut inner, now);
        inner.failures.len()
    }

    fn evict_expired(&self, inner: &mut BreakerInner, now: Instant) {
        while let Some(oldest) = inner.failures.front() {
            if now.duration_since(*oldest) >= self.config.window {
                inner.failures.pop_front();
            } else {
                break;
            }
        }
    }

    fn transition(&self, inner: &mut BreakerInner, new_state: CircuitState, now: Instant) {
        let old_state = inner.state;
        inner.state = new_state;
        inner.state_changed_at = now;

        if new_state == CircuitState::HalfOpen {
            inner.probe_successes = 0;
        }
        // Window clears only on entering CLOSED; reopening from a failed
        // probe keeps its history.
        if new_state == CircuitState::Closed {
            inner.failures.clear();
            inner.probe_successes = 0;
        }

        debug!(
            endpoint = %self.endpoint,
            from = old_state.as_str(),
            to = new_state.as_str(),
            "circuit breaker transition"
        );

        if let Some(metrics) = &self.metrics {
            metrics
                .resilience()
                .circuit_state
                .with_label_values(&[self.endpoint.as_str()])
                .set(new_state as i64);
        }
    }
}

/// Per-endpoint breaker registry.
///
/// Each logical exchange endpoint gets an independent breaker created on
/// first use; all share one configuration.
pub struct CircuitBreakerRegistry {
    config: CircuitBreakerConfig,
    breakers: DashMap<String, Arc<CircuitBreaker>>,
    metrics: Option<MetricsRegistry>,
}

impl CircuitBreakerRegistry {
    pub fn new(config: CircuitBreakerConfig, metrics: Option<MetricsRegistry>) -> Self {
        Self {
            config,
            breakers: DashMap::new(),
            metrics,
        }
    }

    pub fn breaker(&self, endpoint: &str) -> Arc<CircuitBreaker> {
        self.breakers
            .entry(endpoint.to_string())
            .or_insert_with(|| {
                Arc::new(CircuitBreaker::with_metrics(
                    endpoint,
                    self.config.clone(),
                    self.metrics.clone(),
                ))
            })
            .clone()
    }
}
