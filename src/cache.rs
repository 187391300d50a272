//! Time-bounded memoization of processed image attributes.
//!
//! Variant generation is the expensive part of a pass: every source image
//! is decoded and re-encoded into every output variant. This module lets the
//! orchestrator skip that work when the same source has already been
//! processed with the same options within the cache lifetime.
//!
//! # Design
//!
//! [`TimedCache`] is a thin layer over a pluggable [`CacheStore`]. Every
//! entry records the instant it was written; an entry older than the TTL is
//! treated as absent. Expiry is **lazy**: it is checked on read (`get`,
//! `has`) and the stale entry is evicted at that moment. There is no
//! background sweeper, so expired entries may linger in the store until
//! they are next looked up. That is acceptable for a single-process cache
//! whose lifetime is bounded by the orchestrator that owns it.
//!
//! The TTL is fixed at construction and applies to every entry.
//!
//! ## Cache keys
//!
//! A [`CacheKey`] combines the canonical source path with a fingerprint of
//! every option that changes the generated output. Paths are written
//! verbatim when they are valid UTF-8 and as hex-encoded bytes otherwise,
//! each form tagged so the two can never produce the same key. The
//! fingerprint covers:
//!
//! - **formats**, in configured order
//! - **quality**
//! - **sizes** (width + suffix, in configured order)
//! - **public path** (it is baked into every `srcset` URL)
//!
//! Two differently-configured orchestrators sharing a store therefore never
//! serve each other's results.
//!
//! ## Time
//!
//! The cache reads time through the [`Clock`] trait so expiry boundaries can
//! be tested deterministically. Production code uses [`SystemClock`].

use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::path::Path;
use std::time::{Duration, Instant};
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum CacheError {
    #[error("cache key must not be empty")]
    InvalidKey,
}

/// Source of "now" for expiry checks.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

/// Wall-clock time via [`Instant::now`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// A stored value and the instant it was written.
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    pub value: V,
    pub created_at: Instant,
}

impl<V> CacheEntry<V> {
    fn is_expired(&self, now: Instant, ttl: Duration) -> bool {
        now.saturating_duration_since(self.created_at) > ttl
    }
}

/// Backing storage for a [`TimedCache`].
///
/// Implementations only store and retrieve; expiry and the live-entry count
/// are the cache's responsibility.
pub trait CacheStore<V>: Send {
    fn get(&self, key: &str) -> Option<&CacheEntry<V>>;

    /// Insert an entry, returning the one it replaced.
    fn insert(&mut self, key: String, entry: CacheEntry<V>) -> Option<CacheEntry<V>>;

    fn remove(&mut self, key: &str) -> Option<CacheEntry<V>>;

    fn clear(&mut self);
}

/// In-memory store backed by a `HashMap`.
#[derive(Debug)]
pub struct MemoryStore<V> {
    entries: HashMap<String, CacheEntry<V>>,
}

impl<V> Default for MemoryStore<V> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }
}

impl<V: Send> CacheStore<V> for MemoryStore<V> {
    fn get(&self, key: &str) -> Option<&CacheEntry<V>> {
        self.entries.get(key)
    }

    fn insert(&mut self, key: String, entry: CacheEntry<V>) -> Option<CacheEntry<V>> {
        self.entries.insert(key, entry)
    }

    fn remove(&mut self, key: &str) -> Option<CacheEntry<V>> {
        self.entries.remove(key)
    }

    fn clear(&mut self) {
        self.entries.clear();
    }
}

/// Key/value cache with a uniform time-to-live and lazy expiry.
///
/// `size()` is a live counter maintained by the mutating operations rather
/// than a recount of the store. Entries that have expired but were not read
/// since are still counted until a read evicts them.
pub struct TimedCache<V, S = MemoryStore<V>> {
    store: S,
    ttl: Duration,
    live: usize,
    clock: Box<dyn Clock>,
    _value: PhantomData<fn() -> V>,
}

impl<V: Clone + Send> TimedCache<V> {
    /// Create an in-memory cache using the system clock.
    pub fn new(ttl: Duration) -> Self {
        Self::with_store(MemoryStore::default(), ttl, Box::new(SystemClock))
    }
}

impl<V: Clone, S: CacheStore<V>> TimedCache<V, S> {
    pub fn with_store(store: S, ttl: Duration, clock: Box<dyn Clock>) -> Self {
        Self {
            store,
            ttl,
            live: 0,
            clock,
            _value: PhantomData,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Store `value` under `key`, stamped with the current time.
    pub fn set(&mut self, key: &str, value: V) -> Result<(), CacheError> {
        if key.is_empty() {
            return Err(CacheError::InvalidKey);
        }
        let entry = CacheEntry {
            value,
            created_at: self.clock.now(),
        };
        if self.store.insert(key.to_string(), entry).is_none() {
            self.live += 1;
        }
        Ok(())
    }

    /// Look up `key`, evicting it if it has outlived the TTL.
    pub fn get(&mut self, key: &str) -> Option<V> {
        self.live_entry(key).map(|entry| entry.value.clone())
    }

    /// Whether `key` holds an unexpired entry. Evicts like [`get`](Self::get).
    pub fn has(&mut self, key: &str) -> bool {
        self.live_entry(key).is_some()
    }

    /// Remove `key`. Returns `true` if an entry was actually removed.
    pub fn delete(&mut self, key: &str) -> bool {
        let removed = self.store.remove(key).is_some();
        if removed {
            self.live -= 1;
        }
        removed
    }

    pub fn clear(&mut self) {
        self.store.clear();
        self.live = 0;
    }

    pub fn size(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Shared expiry path for `get` and `has`.
    fn live_entry(&mut self, key: &str) -> Option<&CacheEntry<V>> {
        let now = self.clock.now();
        let expired = self.store.get(key)?.is_expired(now, self.ttl);
        if expired {
            self.delete(key);
            return None;
        }
        self.store.get(key)
    }
}

// =============================================================================
// Cache keys
// =============================================================================

/// Cache key for one source image under one option set.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn new(source: &Path, options_fingerprint: &str) -> Self {
        match source.to_str() {
            Some(path) => Self(format!("p:{path}#{options_fingerprint}")),
            None => {
                let hex: String = source
                    .as_os_str()
                    .as_encoded_bytes()
                    .iter()
                    .map(|b| format!("{b:02x}"))
                    .collect();
                Self(format!("x:{hex}#{options_fingerprint}"))
            }
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// SHA-256 fingerprint of the options that determine generated output.
///
/// Each field is written with a separator so that adjacent values cannot
/// run together (`["ab", "c"]` and `["a", "bc"]` hash differently).
pub fn hash_options(
    formats: &[&str],
    quality: u32,
    sizes: &[(u32, &str)],
    public_path: &str,
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(b"respix-options\0");
    for format in formats {
        hasher.update(b"f");
        hasher.update(format.as_bytes());
        hasher.update(b"\0");
    }
    hasher.update(quality.to_le_bytes());
    for (width, suffix) in sizes {
        hasher.update(b"s");
        hasher.update(width.to_le_bytes());
        hasher.update(suffix.as_bytes());
        hasher.update(b"\0");
    }
    hasher.update(b"p");
    hasher.update(public_path.as_bytes());
    format!("{:x}", hasher.finalize())
}

// =============================================================================
// Pass statistics
// =============================================================================

/// Cumulative outcome counts across processing passes.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ProcessStats {
    /// Nodes served from the cache.
    pub cached: u32,
    /// Generation jobs that completed successfully.
    pub generated: u32,
    /// Nodes that piggybacked on another node's in-flight job.
    pub deduplicated: u32,
    /// Remote sources left untouched.
    pub skipped: u32,
    /// Nodes left unchanged because of an error.
    pub failed: u32,
}

impl ProcessStats {
    pub fn total(&self) -> u32 {
        self.cached + self.generated + self.deduplicated + self.skipped + self.failed
    }

    pub fn absorb(&mut self, other: &ProcessStats) {
        self.cached += other.cached;
        self.generated += other.generated;
        self.deduplicated += other.deduplicated;
        self.skipped += other.skipped;
        self.failed += other.failed;
    }
}

impl fmt::Display for ProcessStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} cached, {} generated", self.cached, self.generated)?;
        if self.deduplicated > 0 {
            write!(f, ", {} shared", self.deduplicated)?;
        }
        if self.skipped > 0 {
            write!(f, ", {} skipped", self.skipped)?;
        }
        if self.failed > 0 {
            write!(f, ", {} failed", self.failed)?;
        }
        write!(f, " ({} total)", self.total())
    }
}
