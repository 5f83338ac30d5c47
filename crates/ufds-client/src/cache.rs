//! Bounded, age-limited cache for directory search results.
//!
//! One instance caches results keyed by a canonical search signature. The
//! owning client never clears an instance in place; invalidation discards
//! the whole cache and creates a fresh one, so readers holding a reference
//! keep seeing a consistent snapshot.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::transport::{Entry, SearchScope};

/// Default maximum number of cached search results.
pub const DEFAULT_CACHE_MAX_ENTRIES: usize = 1000;
/// Default maximum age of a cached result (seconds).
pub const DEFAULT_CACHE_MAX_AGE_SECS: u64 = 60;

/// Bounds applied uniformly to every cached result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheOptions {
    /// Maximum number of cached search results.
    pub max_entries: usize,
    /// Results older than this read as absent.
    pub max_age: Duration,
}

impl CacheOptions {
    /// Creates options with the default bounds.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            max_entries: DEFAULT_CACHE_MAX_ENTRIES,
            max_age: Duration::from_secs(DEFAULT_CACHE_MAX_AGE_SECS),
        }
    }

    /// Overrides the entry bound.
    #[must_use]
    pub const fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = max_entries;
        self
    }

    /// Overrides the age bound.
    #[must_use]
    pub const fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age = max_age;
        self
    }
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self::new()
    }
}

/// Hit/miss counters for observability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheStats {
    /// Number of lookups answered from the cache.
    pub hits: u64,
    /// Number of lookups that fell through to the transport.
    pub misses: u64,
}

struct CachedResult {
    entries: Vec<Entry>,
    inserted_at: Instant,
}

/// In-memory store of search results.
pub struct SearchCache {
    options: CacheOptions,
    inner: Mutex<HashMap<String, CachedResult>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl SearchCache {
    /// Creates an empty cache with the given bounds.
    #[must_use]
    pub fn new(options: CacheOptions) -> Self {
        Self {
            options,
            inner: Mutex::new(HashMap::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Returns a deep copy of the cached result, or `None` when absent or
    /// older than the age bound. Stale results are not evicted here; the
    /// wholesale-invalidation policy retires them.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<Vec<Entry>> {
        let found = match self.inner.lock() {
            Ok(guard) => guard
                .get(key)
                .filter(|cached| cached.inserted_at.elapsed() <= self.options.max_age)
                .map(|cached| cached.entries.clone()),
            Err(_) => None,
        };
        if found.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
        found
    }

    /// Stores a search result, evicting the oldest result when at capacity.
    pub fn put(&self, key: String, entries: Vec<Entry>) {
        if let Ok(mut guard) = self.inner.lock() {
            if !guard.contains_key(&key) && guard.len() >= self.options.max_entries {
                let oldest = guard
                    .iter()
                    .min_by_key(|(_, cached)| cached.inserted_at)
                    .map(|(existing, _)| existing.clone());
                if let Some(oldest) = oldest {
                    guard.remove(&oldest);
                }
            }
            guard.insert(
                key,
                CachedResult {
                    entries,
                    inserted_at: Instant::now(),
                },
            );
        }
    }

    /// Number of stored results (stale ones included until invalidation).
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().map(|guard| guard.len()).unwrap_or(0)
    }

    /// Returns true if nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Hit/miss counters accumulated by this instance.
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

/// Builds the canonical cache key for a search.
///
/// Two logically identical queries must collide regardless of call-site
/// ordering of parameters: attribute lists are sorted, and the base DN and
/// the attribute names inside the filter are lowercased. Filter *values*
/// keep their case, so searches on case-sensitive material (base64 key
/// fingerprints) never share a slot.
#[must_use]
pub(crate) fn search_key(
    base: &str,
    scope: SearchScope,
    filter: &str,
    attributes: &[String],
) -> String {
    let mut attrs: Vec<String> = attributes
        .iter()
        .map(|attribute| attribute.to_ascii_lowercase())
        .collect();
    attrs.sort_unstable();
    format!(
        "{}|{}|{}|{}",
        base.to_ascii_lowercase(),
        scope.tag(),
        canonical_filter(filter),
        attrs.join(",")
    )
}

/// Lowercases the structural parts of a filter (operators, attribute
/// names) while leaving everything after each `=` untouched.
fn canonical_filter(filter: &str) -> String {
    let mut canonical = String::with_capacity(filter.len());
    let mut in_value = false;
    for ch in filter.chars() {
        match ch {
            '(' | ')' => {
                in_value = false;
                canonical.push(ch);
            }
            '=' => {
                in_value = true;
                canonical.push(ch);
            }
            _ if in_value => canonical.push(ch),
            _ => canonical.push(ch.to_ascii_lowercase()),
        }
    }
    canonical
}
