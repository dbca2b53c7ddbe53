// gatehouse-core/src/runtime/store.rs
// ============================================================================
// Module: Gatehouse In-Memory Store
// Description: In-memory directory store and shared store wrapper.
// Purpose: Provide a deterministic store implementation without external deps.
// Dependencies: crate::core, crate::interfaces
// ============================================================================

//! ## Overview
//! This module provides an in-memory implementation of [`DirectoryStore`]
//! for tests, demos, and single-process deployments, plus a clonable
//! [`SharedDirectoryStore`] wrapper around an `Arc` trait object. The
//! in-memory store enforces the same uniqueness and counter-bump rules as
//! the durable store.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;

use crate::core::identifiers::AliasId;
use crate::core::identifiers::LocationId;
use crate::core::identifiers::SiteId;
use crate::core::identifiers::UserId;
use crate::core::models::Alias;
use crate::core::models::Location;
use crate::core::models::OpenAccessMode;
use crate::core::models::Permission;
use crate::core::models::Site;
use crate::core::models::SiteSkin;
use crate::core::models::User;
use crate::core::models::normalize_email;
use crate::core::models::normalize_site_url;
use crate::core::path::validate_location_path;
use crate::core::snapshot::LocationEntry;
use crate::core::snapshot::SiteSnapshot;
use crate::interfaces::DirectoryError;
use crate::interfaces::DirectoryStore;

// ============================================================================
// SECTION: In-Memory Store
// ============================================================================

/// All state stored for one site.
#[derive(Debug, Clone)]
struct SiteRecord {
    /// The site record.
    site: Site,
    /// Modification counter; bumped by every mutation below the site.
    version: i64,
    /// Aliases keyed by alias id.
    aliases: BTreeMap<AliasId, Alias>,
    /// Locations keyed by location id.
    locations: BTreeMap<LocationId, Location>,
    /// Users keyed by user id.
    users: BTreeMap<UserId, User>,
    /// Permission edges as (location id, user id) pairs.
    permissions: BTreeSet<(LocationId, UserId)>,
}

impl SiteRecord {
    /// Creates an empty record for a site.
    fn new(site_id: &SiteId) -> Self {
        Self {
            site: Site {
                site_id: site_id.clone(),
                skin: SiteSkin::default(),
            },
            version: 0,
            aliases: BTreeMap::new(),
            locations: BTreeMap::new(),
            users: BTreeMap::new(),
            permissions: BTreeSet::new(),
        }
    }

    /// Bumps the modification counter.
    fn touch(&mut self) {
        self.version = self.version.wrapping_add(1);
    }
}

/// In-memory directory store.
#[derive(Debug, Default, Clone)]
pub struct InMemoryDirectoryStore {
    /// Site records protected by a mutex.
    sites: Arc<Mutex<BTreeMap<SiteId, SiteRecord>>>,
}

impl InMemoryDirectoryStore {
    /// Creates a new in-memory directory store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            sites: Arc::new(Mutex::new(BTreeMap::new())),
        }
    }

    /// Locks the site map.
    fn lock(&self) -> Result<MutexGuard<'_, BTreeMap<SiteId, SiteRecord>>, DirectoryError> {
        self.sites
            .lock()
            .map_err(|_| DirectoryError::Store("directory store mutex poisoned".to_string()))
    }
}

/// Returns the record for a site or a not-found error.
fn site_record<'a>(
    sites: &'a mut BTreeMap<SiteId, SiteRecord>,
    site_id: &SiteId,
) -> Result<&'a mut SiteRecord, DirectoryError> {
    sites.get_mut(site_id).ok_or_else(|| DirectoryError::NotFound("site".to_string()))
}

impl DirectoryStore for InMemoryDirectoryStore {
    fn create_site(&self, site_id: &SiteId) -> Result<Site, DirectoryError> {
        let mut sites = self.lock()?;
        if sites.contains_key(site_id) {
            return Err(DirectoryError::AlreadyExists("site".to_string()));
        }
        let record = SiteRecord::new(site_id);
        let site = record.site.clone();
        sites.insert(site_id.clone(), record);
        Ok(site)
    }

    fn find_site(&self, site_id: &SiteId) -> Result<Option<Site>, DirectoryError> {
        let sites = self.lock()?;
        Ok(sites.get(site_id).map(|record| record.site.clone()))
    }

    fn delete_site(&self, site_id: &SiteId) -> Result<bool, DirectoryError> {
        let mut sites = self.lock()?;
        Ok(sites.remove(site_id).is_some())
    }

    fn list_sites(&self) -> Result<Vec<SiteId>, DirectoryError> {
        let sites = self.lock()?;
        Ok(sites.keys().cloned().collect())
    }

    fn site_version(&self, site_id: &SiteId) -> Result<Option<i64>, DirectoryError> {
        let sites = self.lock()?;
        Ok(sites.get(site_id).map(|record| record.version))
    }

    fn find_site_by_alias(&self, url: &str) -> Result<Option<SiteId>, DirectoryError> {
        let sites = self.lock()?;
        Ok(sites
            .values()
            .find(|record| record.aliases.values().any(|alias| alias.url == url))
            .map(|record| record.site.site_id.clone()))
    }

    fn load_snapshot(&self, site_id: &SiteId) -> Result<Option<SiteSnapshot>, DirectoryError> {
        let sites = self.lock()?;
        let Some(record) = sites.get(site_id) else {
            return Ok(None);
        };
        let locations = record
            .locations
            .values()
            .map(|location| LocationEntry {
                location: location.clone(),
                allowed: record
                    .permissions
                    .iter()
                    .filter(|(location_id, _)| *location_id == location.uuid)
                    .map(|(_, user_id)| user_id.clone())
                    .collect(),
            })
            .collect();
        Ok(Some(SiteSnapshot {
            site: record.site.clone(),
            version: record.version,
            aliases: record.aliases.values().cloned().collect(),
            locations,
            users: record.users.values().cloned().collect(),
        }))
    }

    fn create_alias(&self, site_id: &SiteId, url: &str) -> Result<Alias, DirectoryError> {
        let normalized =
            normalize_site_url(url).map_err(|err| DirectoryError::Invalid(err.to_string()))?;
        let mut sites = self.lock()?;
        let taken = sites
            .values()
            .any(|record| record.aliases.values().any(|alias| alias.url == normalized));
        if taken {
            return Err(DirectoryError::AlreadyExists("alias".to_string()));
        }
        let record = site_record(&mut sites, site_id)?;
        let alias = Alias {
            uuid: AliasId::random(),
            site_id: site_id.clone(),
            url: normalized,
        };
        record.aliases.insert(alias.uuid.clone(), alias.clone());
        record.touch();
        Ok(alias)
    }

    fn find_alias(
        &self,
        site_id: &SiteId,
        alias_id: &AliasId,
    ) -> Result<Option<Alias>, DirectoryError> {
        let sites = self.lock()?;
        Ok(sites.get(site_id).and_then(|record| record.aliases.get(alias_id).cloned()))
    }

    fn delete_alias(&self, site_id: &SiteId, alias_id: &AliasId) -> Result<bool, DirectoryError> {
        let mut sites = self.lock()?;
        let record = site_record(&mut sites, site_id)?;
        let removed = record.aliases.remove(alias_id).is_some();
        if removed {
            record.touch();
        }
        Ok(removed)
    }

    fn list_aliases(&self, site_id: &SiteId) -> Result<Vec<Alias>, DirectoryError> {
        let sites = self.lock()?;
        Ok(sites
            .get(site_id)
            .map(|record| record.aliases.values().cloned().collect())
            .unwrap_or_default())
    }

    fn create_location(&self, site_id: &SiteId, path: &str) -> Result<Location, DirectoryError> {
        validate_location_path(path).map_err(|err| DirectoryError::Invalid(err.to_string()))?;
        let mut sites = self.lock()?;
        let record = site_record(&mut sites, site_id)?;
        if record.locations.values().any(|location| location.path == path) {
            return Err(DirectoryError::AlreadyExists("location".to_string()));
        }
        let location = Location {
            uuid: LocationId::random(),
            site_id: site_id.clone(),
            path: path.to_string(),
            open_access: OpenAccessMode::Disabled,
        };
        record.locations.insert(location.uuid.clone(), location.clone());
        record.touch();
        Ok(location)
    }

    fn find_location(
        &self,
        site_id: &SiteId,
        location_id: &LocationId,
    ) -> Result<Option<Location>, DirectoryError> {
        let sites = self.lock()?;
        Ok(sites.get(site_id).and_then(|record| record.locations.get(location_id).cloned()))
    }

    fn delete_location(
        &self,
        site_id: &SiteId,
        location_id: &LocationId,
    ) -> Result<bool, DirectoryError> {
        let mut sites = self.lock()?;
        let record = site_record(&mut sites, site_id)?;
        let removed = record.locations.remove(location_id).is_some();
        if removed {
            record.permissions.retain(|(existing, _)| existing != location_id);
            record.touch();
        }
        Ok(removed)
    }

    fn list_locations(&self, site_id: &SiteId) -> Result<Vec<Location>, DirectoryError> {
        let sites = self.lock()?;
        Ok(sites
            .get(site_id)
            .map(|record| record.locations.values().cloned().collect())
            .unwrap_or_default())
    }

    fn set_open_access(
        &self,
        site_id: &SiteId,
        location_id: &LocationId,
        mode: OpenAccessMode,
    ) -> Result<Location, DirectoryError> {
        let mut sites = self.lock()?;
        let record = site_record(&mut sites, site_id)?;
        let location = record
            .locations
            .get_mut(location_id)
            .ok_or_else(|| DirectoryError::NotFound("location".to_string()))?;
        if location.open_access != mode {
            location.open_access = mode;
            let location = location.clone();
            record.touch();
            return Ok(location);
        }
        Ok(location.clone())
    }

    fn create_user(&self, site_id: &SiteId, email: &str) -> Result<User, DirectoryError> {
        let normalized = normalize_email(email)
            .ok_or_else(|| DirectoryError::Invalid("invalid email format".to_string()))?;
        let mut sites = self.lock()?;
        let record = site_record(&mut sites, site_id)?;
        if record.users.values().any(|user| user.email == normalized) {
            return Err(DirectoryError::AlreadyExists("user".to_string()));
        }
        let user = User {
            uuid: UserId::random(),
            site_id: site_id.clone(),
            email: normalized,
        };
        record.users.insert(user.uuid.clone(), user.clone());
        record.touch();
        Ok(user)
    }

    fn find_user(
        &self,
        site_id: &SiteId,
        user_id: &UserId,
    ) -> Result<Option<User>, DirectoryError> {
        let sites = self.lock()?;
        Ok(sites.get(site_id).and_then(|record| record.users.get(user_id).cloned()))
    }

    fn find_user_by_email(
        &self,
        site_id: &SiteId,
        email: &str,
    ) -> Result<Option<User>, DirectoryError> {
        let Some(normalized) = normalize_email(email) else {
            return Ok(None);
        };
        let sites = self.lock()?;
        Ok(sites
            .get(site_id)
            .and_then(|record| record.users.values().find(|user| user.email == normalized))
            .cloned())
    }

    fn delete_user(&self, site_id: &SiteId, user_id: &UserId) -> Result<bool, DirectoryError> {
        let mut sites = self.lock()?;
        let record = site_record(&mut sites, site_id)?;
        let removed = record.users.remove(user_id).is_some();
        if removed {
            record.permissions.retain(|(_, existing)| existing != user_id);
            record.touch();
        }
        Ok(removed)
    }

    fn list_users(&self, site_id: &SiteId) -> Result<Vec<User>, DirectoryError> {
        let sites = self.lock()?;
        Ok(sites
            .get(site_id)
            .map(|record| record.users.values().cloned().collect())
            .unwrap_or_default())
    }

    fn grant_access(
        &self,
        site_id: &SiteId,
        location_id: &LocationId,
        user_id: &UserId,
    ) -> Result<(Permission, bool), DirectoryError> {
        let mut sites = self.lock()?;
        let record = site_record(&mut sites, site_id)?;
        if !record.locations.contains_key(location_id) {
            return Err(DirectoryError::NotFound("location".to_string()));
        }
        if !record.users.contains_key(user_id) {
            return Err(DirectoryError::NotFound("user".to_string()));
        }
        let permission = Permission {
            location_id: location_id.clone(),
            user_id: user_id.clone(),
        };
        let created = record.permissions.insert((location_id.clone(), user_id.clone()));
        if created {
            record.touch();
        }
        Ok((permission, created))
    }

    fn revoke_access(
        &self,
        site_id: &SiteId,
        location_id: &LocationId,
        user_id: &UserId,
    ) -> Result<(), DirectoryError> {
        let mut sites = self.lock()?;
        let record = site_record(&mut sites, site_id)?;
        if !record.locations.contains_key(location_id) {
            return Err(DirectoryError::NotFound("location".to_string()));
        }
        if !record.users.contains_key(user_id) {
            return Err(DirectoryError::NotFound("user".to_string()));
        }
        if !record.permissions.remove(&(location_id.clone(), user_id.clone())) {
            return Err(DirectoryError::NotFound("permission".to_string()));
        }
        record.touch();
        Ok(())
    }

    fn find_permission(
        &self,
        site_id: &SiteId,
        location_id: &LocationId,
        user_id: &UserId,
    ) -> Result<Option<Permission>, DirectoryError> {
        let mut sites = self.lock()?;
        let record = site_record(&mut sites, site_id)?;
        if !record.locations.contains_key(location_id) {
            return Err(DirectoryError::NotFound("location".to_string()));
        }
        if !record.users.contains_key(user_id) {
            return Err(DirectoryError::NotFound("user".to_string()));
        }
        if record.permissions.contains(&(location_id.clone(), user_id.clone())) {
            Ok(Some(Permission {
                location_id: location_id.clone(),
                user_id: user_id.clone(),
            }))
        } else {
            Ok(None)
        }
    }
}

// ============================================================================
// SECTION: Shared Store Wrapper
// ============================================================================

/// Shared directory store backed by an `Arc` trait object.
#[derive(Clone)]
pub struct SharedDirectoryStore {
    /// Inner store implementation.
    inner: Arc<dyn DirectoryStore + Send + Sync>,
}

impl SharedDirectoryStore {
    /// Wraps a directory store in a shared, clonable wrapper.
    #[must_use]
    pub fn from_store(store: impl DirectoryStore + Send + Sync + 'static) -> Self {
        Self {
            inner: Arc::new(store),
        }
    }

    /// Wraps an existing shared store.
    #[must_use]
    pub const fn new(store: Arc<dyn DirectoryStore + Send + Sync>) -> Self {
        Self {
            inner: store,
        }
    }
}

impl DirectoryStore for SharedDirectoryStore {
    fn create_site(&self, site_id: &SiteId) -> Result<Site, DirectoryError> {
        self.inner.create_site(site_id)
    }

    fn find_site(&self, site_id: &SiteId) -> Result<Option<Site>, DirectoryError> {
        self.inner.find_site(site_id)
    }

    fn delete_site(&self, site_id: &SiteId) -> Result<bool, DirectoryError> {
        self.inner.delete_site(site_id)
    }

    fn list_sites(&self) -> Result<Vec<SiteId>, DirectoryError> {
        self.inner.list_sites()
    }

    fn site_version(&self, site_id: &SiteId) -> Result<Option<i64>, DirectoryError> {
        self.inner.site_version(site_id)
    }

    fn find_site_by_alias(&self, url: &str) -> Result<Option<SiteId>, DirectoryError> {
        self.inner.find_site_by_alias(url)
    }

    fn load_snapshot(&self, site_id: &SiteId) -> Result<Option<SiteSnapshot>, DirectoryError> {
        self.inner.load_snapshot(site_id)
    }

    fn create_alias(&self, site_id: &SiteId, url: &str) -> Result<Alias, DirectoryError> {
        self.inner.create_alias(site_id, url)
    }

    fn find_alias(
        &self,
        site_id: &SiteId,
        alias_id: &AliasId,
    ) -> Result<Option<Alias>, DirectoryError> {
        self.inner.find_alias(site_id, alias_id)
    }

    fn delete_alias(&self, site_id: &SiteId, alias_id: &AliasId) -> Result<bool, DirectoryError> {
        self.inner.delete_alias(site_id, alias_id)
    }

    fn list_aliases(&self, site_id: &SiteId) -> Result<Vec<Alias>, DirectoryError> {
        self.inner.list_aliases(site_id)
    }

    fn create_location(&self, site_id: &SiteId, path: &str) -> Result<Location, DirectoryError> {
        self.inner.create_location(site_id, path)
    }

    fn find_location(
        &self,
        site_id: &SiteId,
        location_id: &LocationId,
    ) -> Result<Option<Location>, DirectoryError> {
        self.inner.find_location(site_id, location_id)
    }

    fn delete_location(
        &self,
        site_id: &SiteId,
        location_id: &LocationId,
    ) -> Result<bool, DirectoryError> {
        self.inner.delete_location(site_id, location_id)
    }

    fn list_locations(&self, site_id: &SiteId) -> Result<Vec<Location>, DirectoryError> {
        self.inner.list_locations(site_id)
    }

    fn set_open_access(
        &self,
        site_id: &SiteId,
        location_id: &LocationId,
        mode: OpenAccessMode,
    ) -> Result<Location, DirectoryError> {
        self.inner.set_open_access(site_id, location_id, mode)
    }

    fn create_user(&self, site_id: &SiteId, email: &str) -> Result<User, DirectoryError> {
        self.inner.create_user(site_id, email)
    }

    fn find_user(
        &self,
        site_id: &SiteId,
        user_id: &UserId,
    ) -> Result<Option<User>, DirectoryError> {
        self.inner.find_user(site_id, user_id)
    }

    fn find_user_by_email(
        &self,
        site_id: &SiteId,
        email: &str,
    ) -> Result<Option<User>, DirectoryError> {
        self.inner.find_user_by_email(site_id, email)
    }

    fn delete_user(&self, site_id: &SiteId, user_id: &UserId) -> Result<bool, DirectoryError> {
        self.inner.delete_user(site_id, user_id)
    }

    fn list_users(&self, site_id: &SiteId) -> Result<Vec<User>, DirectoryError> {
        self.inner.list_users(site_id)
    }

    fn grant_access(
        &self,
        site_id: &SiteId,
        location_id: &LocationId,
        user_id: &UserId,
    ) -> Result<(Permission, bool), DirectoryError> {
        self.inner.grant_access(site_id, location_id, user_id)
    }

    fn revoke_access(
        &self,
        site_id: &SiteId,
        location_id: &LocationId,
        user_id: &UserId,
    ) -> Result<(), DirectoryError> {
        self.inner.revoke_access(site_id, location_id, user_id)
    }

    fn find_permission(
        &self,
        site_id: &SiteId,
        location_id: &LocationId,
        user_id: &UserId,
    ) -> Result<Option<Permission>, DirectoryError> {
        self.inner.find_permission(site_id, location_id, user_id)
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
