//! The unit of storage shared by both cache tiers

use serde::{Deserialize, Serialize};

/// A cached value with the time it was produced and how long it stays fresh
///
/// Persisted as `{"value": ..., "storedAt": <ms>, "ttlMs": <ms>}`. All three
/// fields are required; a document missing any of them does not deserialize
/// and is treated as absent by the entry store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry<T> {
    /// The cached payload
    pub value: T,
    /// Epoch milliseconds when the value was produced
    pub stored_at: i64,
    /// Validity window in milliseconds
    pub ttl_ms: u64,
}

impl<T> CacheEntry<T> {
    /// Creates an entry produced at `now_ms`
    pub fn new(value: T, now_ms: i64, ttl_ms: u64) -> Self {
        Self {
            value,
            stored_at: now_ms,
            ttl_ms,
        }
    }

    /// Milliseconds elapsed since the entry was stored
    ///
    /// Negative if the clock went backwards after the entry was written.
    pub fn age_ms(&self, now_ms: i64) -> i64 {
        now_ms.saturating_sub(self.stored_at)
    }

    /// Whether the entry is fresh under its own embedded TTL
    pub fn is_fresh(&self, now_ms: i64) -> bool {
        self.is_fresh_within(now_ms, self.ttl_ms)
    }

    /// Whether the entry is fresh under a caller-supplied TTL
    pub fn is_fresh_within(&self, now_ms: i64, ttl_ms: u64) -> bool {
        i128::from(self.age_ms(now_ms)) < i128::from(ttl_ms)
    }

    /// Converts the payload while keeping the timestamps
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> CacheEntry<U> {
        CacheEntry {
            value: f(self.value),
            stored_at: self.stored_at,
            ttl_ms: self.ttl_ms,
        }
    }
}
