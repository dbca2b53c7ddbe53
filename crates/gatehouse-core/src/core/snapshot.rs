// gatehouse-core/src/core/snapshot.rs
// ============================================================================
// Module: Site Snapshot
// Description: Immutable per-site view of locations, grants, and users.
// Purpose: Provide the read-only state authorization decisions run against.
// Dependencies: crate::core::{identifiers, matcher, models, path}
// ============================================================================

//! ## Overview
//! A snapshot materializes one site's locations (each with its granted user
//! set), users, and aliases at a specific modification counter value. The
//! snapshot is immutable after construction; the cache swaps whole snapshots
//! instead of mutating them in place, so concurrent readers always observe a
//! consistent pre- or post-mutation view, never a partial mix.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;

use crate::core::identifiers::UserId;
use crate::core::matcher;
use crate::core::models::Alias;
use crate::core::models::Location;
use crate::core::models::Site;
use crate::core::models::User;
use crate::core::path::CanonicalPath;

// ============================================================================
// SECTION: Location Entry
// ============================================================================

/// A location together with the set of users granted access to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocationEntry {
    /// The location record.
    pub location: Location,
    /// Identifiers of users holding a permission edge to the location.
    pub allowed: BTreeSet<UserId>,
}

impl LocationEntry {
    /// Returns true when the given user holds a permission edge.
    #[must_use]
    pub fn allows(&self, user_id: &UserId) -> bool {
        self.allowed.contains(user_id)
    }
}

// ============================================================================
// SECTION: Site Snapshot
// ============================================================================

/// Read-mostly snapshot of one site's access-control state.
///
/// # Invariants
/// - The snapshot is valid exactly as long as the live modification counter
///   equals [`SiteSnapshot::version`]; any mutation increments the counter
///   before the mutation is considered complete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiteSnapshot {
    /// The site record, including skin.
    pub site: Site,
    /// Modification counter value at capture time.
    pub version: i64,
    /// Aliases under which the site accepts requests.
    pub aliases: Vec<Alias>,
    /// Locations with their granted user sets.
    pub locations: Vec<LocationEntry>,
    /// Users of the site.
    pub users: Vec<User>,
}

impl SiteSnapshot {
    /// Finds the most specific location covering a canonical path.
    #[must_use]
    pub fn find_location(&self, path: &CanonicalPath) -> Option<&LocationEntry> {
        matcher::find_location(&self.locations, path.as_str())
    }

    /// Looks up a user of this site by identifier.
    #[must_use]
    pub fn user_by_id(&self, user_id: &UserId) -> Option<&User> {
        self.users.iter().find(|user| user.uuid == *user_id)
    }

    /// Looks up a user of this site by normalized email.
    #[must_use]
    pub fn user_by_email(&self, email: &str) -> Option<&User> {
        self.users.iter().find(|user| user.email == email)
    }

    /// Returns true when the site accepts requests under the given URL.
    #[must_use]
    pub fn has_alias(&self, url: &str) -> bool {
        self.aliases.iter().any(|alias| alias.url == url)
    }

    /// Returns true when any location is open with login required.
    ///
    /// Sites with such a location admit unknown users at login-token
    /// redemption time by creating a user record on the fly.
    #[must_use]
    pub fn has_open_location_with_login(&self) -> bool {
        self.locations.iter().any(|entry| {
            entry.location.open_access.grants_open_access()
                && entry.location.open_access.requires_login()
        })
    }
}
