//! Redlock-style lease lock for cross-process coordination.
//!
//! In-memory implementation with precise TTL semantics and an injectable
//! clock. Expired locks are treated as absent and can never be released or
//! refreshed by their original token. Within a single process local mutexes
//! are the source of truth; this exists for durable deployments where
//! multiple instances share state.

use crate::utils::Clock;
use parking_lot::Mutex;
use rand::Rng;
use std::collections::HashMap;

struct Lease {
    token: String,
    expires_at_ms: i64,
}

/// Redlock-compatible lease lock.
pub struct Redlock {
    clock: Clock,
    locks: Mutex<HashMap<String, Lease>>,
}

impl Redlock {
    pub fn new(clock: Clock) -> Self {
        Self {
            clock,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Acquire `resource` for `ttl_ms`. Returns the lease token, or `None`
    /// when another unexpired lease holds the resource.
    pub fn acquire(&self, resource: &str, ttl_ms: i64) -> Option<String> {
        let now = self.clock.now_ms();
        let mut locks = self.locks.lock();

        if let Some(lease) = locks.get(resource) {
            if lease.expires_at_ms > now {
                return None;
            }
        }

        // 16 random bytes, hex-encoded
        let token = format!("{:032x}", rand::thread_rng().gen::<u128>());
        locks.insert(
            resource.to_string(),
            Lease {
                token: token.clone(),
                expires_at_ms: now + ttl_ms,
            },
        );
        Some(token)
    }

    /// Release only succeeds while the lease is unexpired and the token
    /// matches.
    pub fn release(&self, resource: &str, token: &str) -> bool {
        let now = self.clock.now_ms();
        let mut locks = self.locks.lock();

        let Some(lease) = locks.get(resource) else {
            return false;
        };
        if lease.expires_at_ms <= now {
            locks.remove(resource);
            return false;
        }
        if lease.token != token {
            return false;
        }
        locks.remove(resource);
        true
    }

    /// Extend an unexpired lease with a matching token.
    pub fn refresh(&self, resource: &str, token: &str, ttl_ms: i64) -> bool {
        let now = self.clock.now_ms();
        let mut locks = self.locks.lock();

        let Some(lease) = locks.get_mut(resource) else {
            return false;
        };
        if lease.expires_at_ms <= now {
            locks.remove(resource);
            return false;
        }
        if lease.token != token {
            return false;
        }
        lease.expires_at_ms = now + ttl_ms;
        true
    }

    pub fn is_locked(&self, resource: &str) -> bool {
        let now = self.clock.now_ms();
        let mut locks = self.locks.lock();
        match locks.get(resource) {
            Some(lease) if lease.expires_at_ms > now => true,
            Some(_) => {
                locks.remove(resource);
                false
            }
            None => false,
        }
    }

    /// Remaining lease time in ms, or -1 when absent or expired.
    pub fn ttl_ms(&self, resource: &str) -> i64 {
        let now = self.clock.now_ms();
        let mut locks = self.locks.lock();
        match locks.get(resource) {
            Some(lease) if lease.expires_at_ms > now => lease.expires_at_ms - now,
            Some(_) => {
                locks.remove(resource);
                -1
            }
            None => -1,
        }
    }
}
