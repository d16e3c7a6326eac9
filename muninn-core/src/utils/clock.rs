//! Injectable wall-clock for deterministic tests and frozen-time runs.
//!
//! All timestamping in the core goes through [`Clock`] so that tests and the
//! shadow demo can pin time. The system clock honors the `MM_FREEZE_UTC_ISO`
//! environment variable: when set to an ISO-8601 instant, every reading
//! returns that instant, which makes report output byte-reproducible.
//!
//! Monotonic timing (circuit breaker windows, rate limiter refill) does NOT
//! use this type; those components read `std::time::Instant` directly.

use chrono::{DateTime, SecondsFormat, TimeZone, Utc};
use std::sync::Arc;

/// Environment variable that freezes the wall clock when set.
pub const FREEZE_ENV: &str = "MM_FREEZE_UTC_ISO";

/// Cloneable wall-clock handle returning epoch milliseconds.
#[derive(Clone)]
pub struct Clock {
    inner: Arc<dyn Fn() -> i64 + Send + Sync>,
}

impl Clock {
    /// System clock, frozen by `MM_FREEZE_UTC_ISO` when present.
    pub fn system() -> Self {
        Self {
            inner: Arc::new(|| match frozen_utc() {
                Some(dt) => dt.timestamp_millis(),
                None => Utc::now().timestamp_millis(),
            }),
        }
    }

    /// Clock pinned to a fixed epoch-millisecond value.
    pub fn fixed(ms: i64) -> Self {
        Self {
            inner: Arc::new(move || ms),
        }
    }

    /// Clock driven by an arbitrary closure (tests advance it manually).
    pub fn from_fn<F>(f: F) -> Self
    where
        F: Fn() -> i64 + Send + Sync + 'static,
    {
        Self { inner: Arc::new(f) }
    }

    /// Current time in epoch milliseconds.
    pub fn now_ms(&self) -> i64 {
        (self.inner)()
    }

    /// Current UTC time as an RFC 3339 string with second precision.
    pub fn utc_iso(&self) -> String {
        let ms = self.now_ms();
        match Utc.timestamp_millis_opt(ms).single() {
            Some(dt) => dt.to_rfc3339_opts(SecondsFormat::Secs, true),
            None => String::from("1970-01-01T00:00:00Z"),
        }
    }

    /// Compact UTC stamp used in freeze idempotency keys (`YYYYmmdd_HHMMSS`).
    pub fn utc_compact(&self) -> String {
        let ms = self.now_ms();
        match Utc.timestamp_millis_opt(ms).single() {
            Some(dt) => dt.format("%Y%m%d_%H%M%S").to_string(),
            None => String::from("19700101_000000"),
        }
    }
}

impl Default for Clock {
    fn default() -> Self {
        Self::system()
    }
}

impl std::fmt::Debug for Clock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Clock").field("now_ms", &self.now_ms()).finish()
    }
}

/// Parse `MM_FREEZE_UTC_ISO` if present and well-formed.
fn frozen_utc() -> Option<DateTime<Utc>> {
    let raw = std::env::var(FREEZE_ENV).ok()?;
    DateTime::parse_from_rfc3339(&raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}
