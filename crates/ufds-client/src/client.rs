//! Caching directory client.
//!
//! Wraps a [`DirectoryTransport`] with the read-through search cache and the
//! invalidation-on-write policy, translating every transport failure into
//! the domain taxonomy on the way out.

use std::sync::{Arc, RwLock};
use tracing::debug;
use ufds_core::Result;

use crate::cache::{search_key, CacheOptions, CacheStats, SearchCache};
use crate::translate::translate;
use crate::transport::{AttributeMap, DirectoryTransport, Entry, Modification, SearchScope};

/// Directory client with a read-through search cache.
///
/// Any successful mutation discards the entire cache and installs a fresh,
/// empty instance. Invalidation is deliberately coarse: the write path has
/// no knowledge of which cached queries a change affects, and replacing the
/// store wholesale avoids partial-invalidation bugs. Readers that grabbed
/// the previous instance finish against that consistent snapshot.
///
/// The cache is shared by every caller in the process. Entries fetched on
/// behalf of one caller are visible to all callers issuing the same query,
/// so an outer layer must key by caller identity before this client is used
/// across trust boundaries.
pub struct DirectoryClient {
    transport: Arc<dyn DirectoryTransport>,
    cache_options: Option<CacheOptions>,
    cache: RwLock<Option<Arc<SearchCache>>>,
}

impl DirectoryClient {
    /// Creates a client over the given transport.
    ///
    /// With `cache_options` of `None` no cache instance exists and every
    /// read goes to the transport.
    #[must_use]
    pub fn new(transport: Arc<dyn DirectoryTransport>, cache_options: Option<CacheOptions>) -> Self {
        Self {
            transport,
            cache_options,
            cache: RwLock::new(cache_options.map(|options| Arc::new(SearchCache::new(options)))),
        }
    }

    /// Authenticates against the backend as the given principal.
    ///
    /// # Errors
    ///
    /// Returns [`ufds_core::Error::InvalidCredentials`] when the backend
    /// rejects the secret.
    pub async fn bind(&self, dn: &str, password: &str) -> Result<()> {
        self.transport.bind(dn, password).await.map_err(translate)
    }

    /// Searches below `base`, consulting the cache first.
    ///
    /// A hit returns a deep copy so callers cannot corrupt future hits. On
    /// a miss the transport result is cached only when at least one entry
    /// came back; empty result sets always fall through to the transport on
    /// the next call, so an entry created moments after a failed lookup is
    /// discoverable without waiting out a cache window.
    pub async fn search(
        &self,
        base: &str,
        scope: SearchScope,
        filter: &str,
        attributes: &[String],
    ) -> Result<Vec<Entry>> {
        let key = search_key(base, scope, filter, attributes);
        let snapshot = self.cache_snapshot();
        if let Some(cache) = &snapshot {
            if let Some(entries) = cache.get(&key) {
                debug!(base, filter, "search answered from cache");
                return Ok(entries);
            }
        }

        let entries = self
            .transport
            .search(base, scope, filter, attributes)
            .await
            .map_err(translate)?;
        debug!(base, filter, count = entries.len(), "search went to transport");

        if !entries.is_empty() {
            // A concurrent write may have swapped the live cache; this
            // snapshot then dies with its last holder.
            if let Some(cache) = snapshot {
                cache.put(key, entries.clone());
            }
        }
        Ok(entries)
    }

    /// Creates an entry and invalidates the cache on success.
    pub async fn add(&self, dn: &str, attributes: &AttributeMap) -> Result<()> {
        self.transport.add(dn, attributes).await.map_err(translate)?;
        self.replace_cache();
        Ok(())
    }

    /// Applies a change list and invalidates the cache on success.
    pub async fn modify(&self, dn: &str, modifications: &[Modification]) -> Result<()> {
        self.transport
            .modify(dn, modifications)
            .await
            .map_err(translate)?;
        self.replace_cache();
        Ok(())
    }

    /// Removes an entry and invalidates the cache on success.
    pub async fn delete(&self, dn: &str) -> Result<()> {
        self.transport.delete(dn).await.map_err(translate)?;
        self.replace_cache();
        Ok(())
    }

    /// Server-side attribute comparison; never cached.
    pub async fn compare(&self, dn: &str, attribute: &str, value: &str) -> Result<bool> {
        self.transport
            .compare(dn, attribute, value)
            .await
            .map_err(translate)
    }

    /// Hit/miss counters of the current cache instance, when caching is
    /// enabled. Counters restart from zero after each invalidation.
    #[must_use]
    pub fn cache_stats(&self) -> Option<CacheStats> {
        self.cache_snapshot().map(|cache| cache.stats())
    }

    fn cache_snapshot(&self) -> Option<Arc<SearchCache>> {
        self.cache.read().ok().and_then(|guard| guard.clone())
    }

    fn replace_cache(&self) {
        if let Ok(mut guard) = self.cache.write() {
            *guard = self
                .cache_options
                .map(|options| Arc::new(SearchCache::new(options)));
            debug!("search cache invalidated");
        }
    }
}
