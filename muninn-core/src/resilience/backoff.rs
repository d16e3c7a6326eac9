//! Exponential backoff for transient-transport retries.
//!
//! Used by the order router to pace re-attempts after timeouts, resets and
//! HTTP 429/5xx. Jitter spreads concurrent retries apart; the router's
//! default disables it so shadow runs stay deterministic.

use rand::Rng;
use std::time::Duration;

/// Configuration for exponential backoff
#[derive(Debug, Clone)]
pub struct BackoffConfig {
    /// Delay before the first retry
    pub initial_delay: Duration,
    /// Ceiling for any single delay
    pub max_delay: Duration,
    /// Multiplier applied per retry
    pub multiplier: f64,
    /// Maximum retry attempts
    pub max_retries: usize,
    /// Randomization factor in [0.0, 1.0]; 0.0 disables jitter
    pub jitter_factor: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
            max_retries: 10,
            jitter_factor: 0.1,
        }
    }
}

impl BackoffConfig {
    /// Router policy: 100ms, 200ms, 400ms, three attempts, no jitter.
    pub fn router() -> Self {
        Self {
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
            multiplier: 2.0,
            max_retries: 3,
            jitter_factor: 0.0,
        }
    }
}

/// Exponential backoff state machine
pub struct ExponentialBackoff {
    config: BackoffConfig,
    current_attempt: usize,
    current_delay: Duration,
}

impl ExponentialBackoff {
    pub fn new(config: BackoffConfig) -> Self {
        Self {
            current_delay: config.initial_delay,
            current_attempt: 0,
            config,
        }
    }

    /// Next delay, or `None` once retries are exhausted.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.current_attempt >= self.config.max_retries {
            return None;
        }

        let delay = self.jittered(self.current_delay);

        self.current_attempt += 1;
        self.current_delay = std::cmp::min(
            Duration::from_secs_f64(self.current_delay.as_secs_f64() * self.config.multiplier),
            self.config.max_delay,
        );

        Some(delay)
    }

    fn jittered(&self, delay: Duration) -> Duration {
        if self.config.jitter_factor == 0.0 {
            return delay;
        }
        let mut rng = rand::thread_rng();
        let jitter = rng.gen::<f64>() * self.config.jitter_factor;
        let multiplier = 1.0 + (jitter - self.config.jitter_factor / 2.0);
        Duration::from_secs_f64(delay.as_secs_f64() * multiplier)
    }

    pub fn attempt_number(&self) -> usize {
        self.current_attempt
    }

    pub fn reset(&mut self) {
        self.current_attempt = 0;
        self.current_delay = self.config.initial_delay;
    }
}
