//! In-memory key-value store with Redis-shaped semantics.
//!
//! Backs the durable order store in tests and shadow runs. Sets, hashes and
//! lists are native structures; values canonicalize to JSON only at the
//! storage boundary. TTLs are lazily reaped on access against an injectable
//! clock so expiry is deterministic under test.

use crate::utils::canonical::to_canonical_string;
use crate::utils::Clock;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::{BTreeSet, HashMap, VecDeque};

#[derive(Default)]
struct KvInner {
    strings: HashMap<String, String>,
    hashes: HashMap<String, HashMap<String, String>>,
    lists: HashMap<String, VecDeque<String>>,
    sets: HashMap<String, BTreeSet<String>>,
    /// key -> expiry epoch-ms; applies to keys of every kind
    expiry: HashMap<String, i64>,
}

impl KvInner {
    fn reap_expired(&mut self, now_ms: i64) {
        let expired: Vec<String> = self
            .expiry
            .iter()
            .filter(|(_, exp)| **exp <= now_ms)
            .map(|(k, _)| k.clone())
            .collect();
        for key in expired {
            self.strings.remove(&key);
            self.hashes.remove(&key);
            self.lists.remove(&key);
            self.sets.remove(&key);
            self.expiry.remove(&key);
        }
    }

    fn all_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .strings
            .keys()
            .chain(self.hashes.keys())
            .chain(self.lists.keys())
            .chain(self.sets.keys())
            .cloned()
            .collect();
        keys.sort();
        keys.dedup();
        keys
    }
}

/// Redis-shaped in-memory KV store.
pub struct MemoryKv {
    clock: Clock,
    inner: Mutex<KvInner>,
}

impl MemoryKv {
    pub fn new(clock: Clock) -> Self {
        Self {
            clock,
            inner: Mutex::new(KvInner::default()),
        }
    }

    // ------------------------------------------------------------------
    // String operations
    // ------------------------------------------------------------------

    /// Set `key` to the canonical JSON of `value`, with optional TTL.
    pub fn set<T: Serialize>(&self, key: &str, value: &T, ttl_s: Option<i64>) {
        let serialized = to_canonical_string(value).expect("serializable value");
        let now = self.clock.now_ms();
        let mut inner = self.inner.lock();
        inner.reap_expired(now);
        inner.strings.insert(key.to_string(), serialized);
        match ttl_s {
            Some(ttl) => {
                inner.expiry.insert(key.to_string(), now + ttl * 1000);
            }
            None => {
                inner.expiry.remove(key);
            }
        }
    }

    /// Raw canonical JSON for `key`.
    pub fn get(&self, key: &str) -> Option<String> {
        let now = self.clock.now_ms();
        let mut inner = self.inner.lock();
        inner.reap_expired(now);
        inner.strings.get(key).cloned()
    }

    /// Deserialized value for `key`.
    pub fn get_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.get(key)
            .and_then(|raw| serde_json::from_str(&raw).ok())
    }

    pub fn delete(&self, key: &str) -> bool {
        let now = self.clock.now_ms();
        let mut inner = self.inner.lock();
        inner.reap_expired(now);
        let existed = inner.strings.remove(key).is_some()
            | inner.hashes.remove(key).is_some()
            | inner.lists.remove(key).is_some()
            | inner.sets.remove(key).is_some();
        inner.expiry.remove(key);
        existed
    }

    pub fn exists(&self, key: &str) -> bool {
        let now = self.clock.now_ms();
        let mut inner = self.inner.lock();
        inner.reap_expired(now);
        inner.strings.contains_key(key)
            || inner.hashes.contains_key(key)
            || inner.lists.contains_key(key)
            || inner.sets.contains_key(key)
    }

    /// TTL in seconds: -1 when no expiry, -2 when the key is absent.
    pub fn ttl(&self, key: &str) -> i64 {
        let now = self.clock.now_ms();
        let mut inner = self.inner.lock();
        inner.reap_expired(now);
        let present = inner.strings.contains_key(key)
            || inner.hashes.contains_key(key)
            || inner.lists.contains_key(key)
            || inner.sets.contains_key(key);
        if !present {
            return -2;
        }
        match inner.expiry.get(key) {
            Some(exp) => ((exp - now) / 1000).max(0),
            None => -1,
        }
    }

    // ------------------------------------------------------------------
    // Hash operations
    // ------------------------------------------------------------------

    pub fn hset<T: Serialize>(&self, key: &str, field: &str, value: &T) {
        let serialized = to_canonical_string(value).expect("serializable value");
        let now = self.clock.now_ms();
        let mut inner = self.inner.lock();
        inner.reap_expired(now);
        inner
            .hashes
            .entry(key.to_string())
            .or_default()
            .insert(field.to_string(), serialized);
    }

    pub fn hget(&self, key: &str, field: &str) -> Option<String> {
        let now = self.clock.now_ms();
        let mut inner = self.inner.lock();
        inner.reap_expired(now);
        inner.hashes.get(key).and_then(|h| h.get(field)).cloned()
    }

    pub fn hgetall(&self, key: &str) -> HashMap<String, String> {
        let now = self.clock.now_ms();
        let mut inner = self.inner.lock();
        inner.reap_expired(now);
        inner.hashes.get(key).cloned().unwrap_or_default()
    }

    pub fn hdel(&self, key: &str, field: &str) -> bool {
        let now = self.clock.now_ms();
        let mut inner = self.inner.lock();
        inner.reap_expired(now);
        let Some(hash) = inner.hashes.get_mut(key) else {
            return false;
        };
        let existed = hash.remove(field).is_some();
        if hash.is_empty() {
            inner.hashes.remove(key);
        }
        existed
    }

    // ------------------------------------------------------------------
    // List operations
    // ------------------------------------------------------------------

    pub fn rpush<T: Serialize>(&self, key: &str, value: &T) -> usize {
        let serialized = to_canonical_string(value).expect("serializable value");
        let now = self.clock.now_ms();
        let mut inner = self.inner.lock();
        inner.reap_expired(now);
        let list = inner.lists.entry(key.to_string()).or_default();
        list.push_back(serialized);
        list.len()
    }

    pub fn lpush<T: Serialize>(&self, key: &str, value: &T) -> usize {
        let serialized = to_canonical_string(value).expect("serializable value");
        let now = self.clock.now_ms();
        let mut inner = self.inner.lock();
        inner.reap_expired(now);
        let list = inner.lists.entry(key.to_string()).or_default();
        list.push_front(serialized);
        list.len()
    }

    pub fn lpop(&self, key: &str) -> Option<String> {
        let now = self.clock.now_ms();
        let mut inner = self.inner.lock();
        inner.reap_expired(now);
        let value = inner.lists.get_mut(key)?.pop_front();
        if inner.lists.get(key).is_some_and(|l| l.is_empty()) {
            inner.lists.remove(key);
        }
        value
    }

    pub fn llen(&self, key: &str) -> usize {
        let now = self.clock.now_ms();
        let mut inner = self.inner.lock();
        inner.reap_expired(now);
        inner.lists.get(key).map_or(0, |l| l.len())
    }

    pub fn lrange(&self, key: &str, start: usize, stop: usize) -> Vec<String> {
        let now = self.clock.now_ms();
        let mut inner = self.inner.lock();
        inner.reap_expired(now);
        inner
            .lists
            .get(key)
            .map(|l| {
                l.iter()
                    .skip(start)
                    .take(stop.saturating_sub(start) + 1)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    // ------------------------------------------------------------------
    // Set operations
    // ------------------------------------------------------------------

    pub fn sadd(&self, key: &str, member: &str) -> bool {
        let now = self.clock.now_ms();
        let mut inner = self.inner.lock();
        inner.reap_expired(now);
        inner
            .sets
            .entry(key.to_string())
            .or_default()
            .insert(member.to_string())
    }

    pub fn srem(&self, key: &str, member: &str) -> bool {
        let now = self.clock.now_ms();
        let mut inner = self.inner.lock();
        inner.reap_expired(now);
        let Some(set) = inner.sets.get_mut(key) else {
            return false;
        };
        let existed = set.remove(member);
        if set.is_empty() {
            inner.sets.remove(key);
        }
        existed
    }

    pub fn smembers(&self, key: &str) -> BTreeSet<String> {
        let now = self.clock.now_ms();
        let mut inner = self.inner.lock();
        inner.reap_expired(now);
        inner.sets.get(key).cloned().unwrap_or_default()
    }

    // ------------------------------------------------------------------
    // Scan
    // ------------------------------------------------------------------

    /// Cursor scan over sorted keys with glob matching: `prefix*`,
    /// `*suffix`, `*contains*`, or exact. Cursor 0 on completion.
    pub fn scan(&self, cursor: usize, pattern: Option<&str>, count: usize) -> (usize, Vec<String>) {
        let now = self.clock.now_ms();
        let mut inner = self.inner.lock();
        inner.reap_expired(now);

        let keys: Vec<String> = inner
            .all_keys()
            .into_iter()
            .filter(|key| match pattern {
                Some(p) => glob_match(p, key),
                None => true,
            })
            .collect();

        let start = cursor.min(keys.len());
        let end = cursor.saturating_add(count).min(keys.len());
        let page = keys[start..end].to_vec();
        let next_cursor = if end < keys.len() { end } else { 0 };
        (next_cursor, page)
    }

    pub fn keys(&self, pattern: &str) -> Vec<String> {
        let (_, keys) = self.scan(0, Some(pattern), usize::MAX);
        keys
    }

    pub fn flush_all(&self) {
        let mut inner = self.inner.lock();
        *inner = KvInner::default();
    }
}

fn glob_match(pattern: &str, key: &str) -> bool {
    if pattern == "*" {
        return true;
    }
    let starts = pattern.starts_with('*');
    let ends = pattern.ends_with('*');
    match (starts, ends) {
        (true, true) => key.contains(&pattern[1..pattern.len() - 1]),
        (true, false) => key.ends_with(&pattern[1..]),
        (false, true) => key.starts_with(&pattern[..pattern.len() - 1]),
        (false, false) => key == pattern,
    }
}
