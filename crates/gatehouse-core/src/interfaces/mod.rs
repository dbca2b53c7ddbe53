// gatehouse-core/src/interfaces/mod.rs
// ============================================================================
// Module: Gatehouse Interfaces
// Description: Backend-agnostic persistence contract for access-control data.
// Purpose: Define the store surface the runtime and servers depend on.
// Dependencies: crate::core, thiserror
// ============================================================================

//! ## Overview
//! The directory store is the source of truth for sites, aliases, locations,
//! users, and permissions. Implementations must keep sites isolated, enforce
//! the per-site uniqueness rules, and increment the site's modification
//! counter within the same logical update as every mutation, so no reader can
//! observe new data under a stale counter. All validation happens before any
//! side effect; no partial mutation is ever left visible.

// ============================================================================
// SECTION: Imports
// ============================================================================

use thiserror::Error;

use crate::core::identifiers::AliasId;
use crate::core::identifiers::LocationId;
use crate::core::identifiers::SiteId;
use crate::core::identifiers::UserId;
use crate::core::models::Alias;
use crate::core::models::Location;
use crate::core::models::OpenAccessMode;
use crate::core::models::Permission;
use crate::core::models::Site;
use crate::core::models::User;
use crate::core::snapshot::SiteSnapshot;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Directory store errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DirectoryError {
    /// Referenced site, location, user, or permission does not exist.
    #[error("{0} not found")]
    NotFound(String),
    /// A resource with the same identity already exists.
    #[error("{0} already exists")]
    AlreadyExists(String),
    /// A tenant-configured resource ceiling was reached.
    #[error("limit exceeded: {0}")]
    LimitExceeded(String),
    /// Supplied data failed validation.
    #[error("invalid data: {0}")]
    Invalid(String),
    /// The underlying store failed.
    #[error("store error: {0}")]
    Store(String),
}

// ============================================================================
// SECTION: Directory Store
// ============================================================================

/// Queryable collection store for sites and their scoped resources.
///
/// All methods that mutate a site's data bump the site's modification
/// counter atomically with the mutation, before the call returns.
pub trait DirectoryStore {
    /// Creates a site.
    ///
    /// # Errors
    ///
    /// Returns [`DirectoryError::AlreadyExists`] when the site id is taken.
    fn create_site(&self, site_id: &SiteId) -> Result<Site, DirectoryError>;

    /// Finds a site by identifier.
    ///
    /// # Errors
    ///
    /// Returns [`DirectoryError`] when the store fails.
    fn find_site(&self, site_id: &SiteId) -> Result<Option<Site>, DirectoryError>;

    /// Deletes a site, cascading to its aliases, locations, users, and
    /// permissions. Returns false when the site did not exist.
    ///
    /// # Errors
    ///
    /// Returns [`DirectoryError`] when the store fails.
    fn delete_site(&self, site_id: &SiteId) -> Result<bool, DirectoryError>;

    /// Lists all site identifiers.
    ///
    /// # Errors
    ///
    /// Returns [`DirectoryError`] when the store fails.
    fn list_sites(&self) -> Result<Vec<SiteId>, DirectoryError>;

    /// Returns the live modification counter of a site, or `None` when the
    /// site does not exist. This is the lightweight query the cache uses to
    /// validate snapshots on every hit.
    ///
    /// # Errors
    ///
    /// Returns [`DirectoryError`] when the store fails.
    fn site_version(&self, site_id: &SiteId) -> Result<Option<i64>, DirectoryError>;

    /// Resolves a normalized site URL to the owning site.
    ///
    /// # Errors
    ///
    /// Returns [`DirectoryError`] when the store fails.
    fn find_site_by_alias(&self, url: &str) -> Result<Option<SiteId>, DirectoryError>;

    /// Loads a full snapshot of a site's access-control state, captured
    /// together with the modification counter in one consistent view.
    ///
    /// # Errors
    ///
    /// Returns [`DirectoryError`] when the store fails.
    fn load_snapshot(&self, site_id: &SiteId) -> Result<Option<SiteSnapshot>, DirectoryError>;

    /// Adds an alias URL to a site. The URL must be normalized; it must not
    /// be in use by any site.
    ///
    /// # Errors
    ///
    /// Returns [`DirectoryError::Invalid`] for malformed URLs and
    /// [`DirectoryError::AlreadyExists`] for duplicates.
    fn create_alias(&self, site_id: &SiteId, url: &str) -> Result<Alias, DirectoryError>;

    /// Finds an alias of a site by identifier.
    ///
    /// # Errors
    ///
    /// Returns [`DirectoryError`] when the store fails.
    fn find_alias(
        &self,
        site_id: &SiteId,
        alias_id: &AliasId,
    ) -> Result<Option<Alias>, DirectoryError>;

    /// Deletes an alias of a site. Returns false when not found.
    ///
    /// # Errors
    ///
    /// Returns [`DirectoryError`] when the store fails.
    fn delete_alias(&self, site_id: &SiteId, alias_id: &AliasId) -> Result<bool, DirectoryError>;

    /// Lists the aliases of a site.
    ///
    /// # Errors
    ///
    /// Returns [`DirectoryError`] when the store fails.
    fn list_aliases(&self, site_id: &SiteId) -> Result<Vec<Alias>, DirectoryError>;

    /// Creates a location with a canonical path.
    ///
    /// # Errors
    ///
    /// Returns [`DirectoryError::Invalid`] for non-canonical paths and
    /// [`DirectoryError::AlreadyExists`] when the site already has the path.
    fn create_location(&self, site_id: &SiteId, path: &str) -> Result<Location, DirectoryError>;

    /// Finds a location of a site by identifier.
    ///
    /// # Errors
    ///
    /// Returns [`DirectoryError`] when the store fails.
    fn find_location(
        &self,
        site_id: &SiteId,
        location_id: &LocationId,
    ) -> Result<Option<Location>, DirectoryError>;

    /// Deletes a location of a site together with its permission edges.
    /// Returns false when not found.
    ///
    /// # Errors
    ///
    /// Returns [`DirectoryError`] when the store fails.
    fn delete_location(
        &self,
        site_id: &SiteId,
        location_id: &LocationId,
    ) -> Result<bool, DirectoryError>;

    /// Lists the locations of a site.
    ///
    /// # Errors
    ///
    /// Returns [`DirectoryError`] when the store fails.
    fn list_locations(&self, site_id: &SiteId) -> Result<Vec<Location>, DirectoryError>;

    /// Sets the open-access mode of a location, independent of its grants.
    ///
    /// # Errors
    ///
    /// Returns [`DirectoryError::NotFound`] when the location is missing.
    fn set_open_access(
        &self,
        site_id: &SiteId,
        location_id: &LocationId,
        mode: OpenAccessMode,
    ) -> Result<Location, DirectoryError>;

    /// Creates a user with a normalized email.
    ///
    /// # Errors
    ///
    /// Returns [`DirectoryError::Invalid`] for malformed emails and
    /// [`DirectoryError::AlreadyExists`] when the site already has the email.
    fn create_user(&self, site_id: &SiteId, email: &str) -> Result<User, DirectoryError>;

    /// Finds a user of a site by identifier.
    ///
    /// # Errors
    ///
    /// Returns [`DirectoryError`] when the store fails.
    fn find_user(
        &self,
        site_id: &SiteId,
        user_id: &UserId,
    ) -> Result<Option<User>, DirectoryError>;

    /// Finds a user of a site by email (normalized before lookup).
    ///
    /// # Errors
    ///
    /// Returns [`DirectoryError`] when the store fails.
    fn find_user_by_email(
        &self,
        site_id: &SiteId,
        email: &str,
    ) -> Result<Option<User>, DirectoryError>;

    /// Deletes a user of a site together with their permission edges.
    /// Returns false when not found.
    ///
    /// # Errors
    ///
    /// Returns [`DirectoryError`] when the store fails.
    fn delete_user(&self, site_id: &SiteId, user_id: &UserId) -> Result<bool, DirectoryError>;

    /// Lists the users of a site.
    ///
    /// # Errors
    ///
    /// Returns [`DirectoryError`] when the store fails.
    fn list_users(&self, site_id: &SiteId) -> Result<Vec<User>, DirectoryError>;

    /// Grants a user access to a location. Idempotent: granting an existing
    /// edge returns it with `created == false` and changes nothing.
    ///
    /// # Errors
    ///
    /// Returns [`DirectoryError::NotFound`] when the location or user is
    /// missing from the site.
    fn grant_access(
        &self,
        site_id: &SiteId,
        location_id: &LocationId,
        user_id: &UserId,
    ) -> Result<(Permission, bool), DirectoryError>;

    /// Revokes a user's access to a location.
    ///
    /// # Errors
    ///
    /// Returns [`DirectoryError::NotFound`] when the location or user is
    /// missing, or when no permission edge exists.
    fn revoke_access(
        &self,
        site_id: &SiteId,
        location_id: &LocationId,
        user_id: &UserId,
    ) -> Result<(), DirectoryError>;

    /// Finds a permission edge between a location and a user.
    ///
    /// # Errors
    ///
    /// Returns [`DirectoryError::NotFound`] when the location or user is
    /// missing from the site.
    fn find_permission(
        &self,
        site_id: &SiteId,
        location_id: &LocationId,
        user_id: &UserId,
    ) -> Result<Option<Permission>, DirectoryError>;
}
