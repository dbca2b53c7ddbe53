// gatehouse-core/src/runtime/cache.rs
// ============================================================================
// Module: Site Cache
// Description: Per-process cache of site snapshots with counter invalidation.
// Purpose: Amortize store access into O(1) per authorization decision.
// Dependencies: crate::core, crate::interfaces, crate::runtime::store
// ============================================================================

//! ## Overview
//! The authorization endpoint runs on the hot path of every request to every
//! protected site, while mutations are rare administrative actions. The cache
//! keeps one immutable snapshot per site and validates it on each access with
//! a single lightweight counter query. A mismatching (or missing) counter
//! evicts and reloads the snapshot. Readers share snapshots through `Arc`;
//! a reload swaps the reference, so in-flight readers keep the consistent
//! view they started with.
//!
//! The cache is an explicit object with an injected store, owned by the
//! server's composition root and passed to every handler; it is never a
//! process-global mutated from unrelated call sites.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::RwLock;

use crate::core::identifiers::SiteId;
use crate::core::snapshot::SiteSnapshot;
use crate::interfaces::DirectoryError;
use crate::interfaces::DirectoryStore;
use crate::runtime::store::SharedDirectoryStore;

// ============================================================================
// SECTION: Site Cache
// ============================================================================

/// Per-process cache of site snapshots.
pub struct SiteCache {
    /// Injected source-of-truth store.
    store: SharedDirectoryStore,
    /// Cached snapshots keyed by site id.
    snapshots: RwLock<HashMap<SiteId, Arc<SiteSnapshot>>>,
    /// Resolved alias URL to site id mapping.
    ///
    /// Entries are hints: a hit is re-verified against the (validated)
    /// snapshot's alias list, so moved or deleted aliases self-correct.
    alias_index: RwLock<HashMap<String, SiteId>>,
}

impl SiteCache {
    /// Creates a cache over the given store.
    #[must_use]
    pub fn new(store: SharedDirectoryStore) -> Self {
        Self {
            store,
            snapshots: RwLock::new(HashMap::new()),
            alias_index: RwLock::new(HashMap::new()),
        }
    }

    /// Returns the injected store.
    #[must_use]
    pub const fn store(&self) -> &SharedDirectoryStore {
        &self.store
    }

    /// Returns a validated snapshot of a site, or `None` when the site does
    /// not exist.
    ///
    /// # Errors
    ///
    /// Returns [`DirectoryError`] when the underlying store fails.
    pub fn get(&self, site_id: &SiteId) -> Result<Option<Arc<SiteSnapshot>>, DirectoryError> {
        let cached = {
            let snapshots = self
                .snapshots
                .read()
                .map_err(|_| DirectoryError::Store("site cache lock poisoned".to_string()))?;
            snapshots.get(site_id).cloned()
        };
        if let Some(snapshot) = cached
            && self.store.site_version(site_id)? == Some(snapshot.version)
        {
            return Ok(Some(snapshot));
        }
        self.reload(site_id)
    }

    /// Returns a validated snapshot of the site owning an alias URL.
    ///
    /// # Errors
    ///
    /// Returns [`DirectoryError`] when the underlying store fails.
    pub fn get_by_url(&self, url: &str) -> Result<Option<Arc<SiteSnapshot>>, DirectoryError> {
        let hinted = {
            let index = self
                .alias_index
                .read()
                .map_err(|_| DirectoryError::Store("site cache lock poisoned".to_string()))?;
            index.get(url).cloned()
        };
        if let Some(site_id) = hinted {
            if let Some(snapshot) = self.get(&site_id)?
                && snapshot.has_alias(url)
            {
                return Ok(Some(snapshot));
            }
            let mut index = self
                .alias_index
                .write()
                .map_err(|_| DirectoryError::Store("site cache lock poisoned".to_string()))?;
            index.remove(url);
        }
        let Some(site_id) = self.store.find_site_by_alias(url)? else {
            return Ok(None);
        };
        let Some(snapshot) = self.get(&site_id)? else {
            return Ok(None);
        };
        if !snapshot.has_alias(url) {
            return Ok(None);
        }
        let mut index = self
            .alias_index
            .write()
            .map_err(|_| DirectoryError::Store("site cache lock poisoned".to_string()))?;
        index.insert(url.to_string(), site_id);
        Ok(Some(snapshot))
    }

    /// Evicts a site's snapshot, forcing a reload on next access.
    ///
    /// # Errors
    ///
    /// Returns [`DirectoryError`] when the cache lock is poisoned.
    pub fn evict(&self, site_id: &SiteId) -> Result<(), DirectoryError> {
        let mut snapshots = self
            .snapshots
            .write()
            .map_err(|_| DirectoryError::Store("site cache lock poisoned".to_string()))?;
        snapshots.remove(site_id);
        Ok(())
    }

    /// Reloads a site snapshot from the store and swaps it into the cache.
    fn reload(&self, site_id: &SiteId) -> Result<Option<Arc<SiteSnapshot>>, DirectoryError> {
        let loaded = self.store.load_snapshot(site_id)?.map(Arc::new);
        let mut snapshots = self
            .snapshots
            .write()
            .map_err(|_| DirectoryError::Store("site cache lock poisoned".to_string()))?;
        match &loaded {
            Some(snapshot) => {
                snapshots.insert(site_id.clone(), Arc::clone(snapshot));
            }
            None => {
                snapshots.remove(site_id);
            }
        }
        Ok(loaded)
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(
        clippy::panic,
        clippy::unwrap_used,
        clippy::expect_used,
        reason = "Test-only assertions."
    )]

    use super::SiteCache;
    use crate::core::identifiers::SiteId;
    use crate::interfaces::DirectoryStore;
    use crate::runtime::store::InMemoryDirectoryStore;
    use crate::runtime::store::SharedDirectoryStore;

    fn cache_with_site(site: &str) -> (SiteCache, SiteId) {
        let store = InMemoryDirectoryStore::new();
        let site_id = SiteId::new(site);
        store.create_site(&site_id).unwrap();
        (SiteCache::new(SharedDirectoryStore::from_store(store)), site_id)
    }

    #[test]
    fn missing_site_yields_none() {
        let (cache, _) = cache_with_site("site");
        assert!(cache.get(&SiteId::new("other")).unwrap().is_none());
    }

    #[test]
    fn unchanged_site_returns_the_same_snapshot() {
        let (cache, site_id) = cache_with_site("site");
        let first = cache.get(&site_id).unwrap().unwrap();
        let second = cache.get(&site_id).unwrap().unwrap();
        assert!(std::sync::Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn mutation_invalidates_the_snapshot() {
        let (cache, site_id) = cache_with_site("site");
        let before = cache.get(&site_id).unwrap().unwrap();
        assert!(before.locations.is_empty());
        cache.store().create_location(&site_id, "/foo").unwrap();
        let after = cache.get(&site_id).unwrap().unwrap();
        assert_eq!(after.locations.len(), 1);
        assert!(before.locations.is_empty());
    }

    #[test]
    fn deleted_site_is_evicted() {
        let (cache, site_id) = cache_with_site("site");
        cache.get(&site_id).unwrap().unwrap();
        cache.store().delete_site(&site_id).unwrap();
        assert!(cache.get(&site_id).unwrap().is_none());
    }

    #[test]
    fn alias_resolution_follows_alias_changes() {
        let (cache, site_id) = cache_with_site("site");
        cache.store().create_alias(&site_id, "https://a.example").unwrap();
        let snapshot = cache.get_by_url("https://a.example").unwrap().unwrap();
        assert_eq!(snapshot.site.site_id, site_id);
        let alias = cache.store().list_aliases(&site_id).unwrap().remove(0);
        cache.store().delete_alias(&site_id, &alias.uuid).unwrap();
        assert!(cache.get_by_url("https://a.example").unwrap().is_none());
    }

    #[test]
    fn unknown_alias_yields_none() {
        let (cache, _) = cache_with_site("site");
        assert!(cache.get_by_url("https://nowhere.example").unwrap().is_none());
    }
}
