// gatehouse-core/src/core/evaluator.rs
// ============================================================================
// Module: Permission Evaluator
// Description: Grant/deny decision for a resolved location and identity.
// Purpose: Decide access deterministically over an immutable snapshot.
// Dependencies: crate::core::{models, snapshot}
// ============================================================================

//! ## Overview
//! Given a resolved location and an already-resolved identity (or none), the
//! evaluator decides grant or deny. It is deterministic and free of I/O; the
//! caller resolves both inputs against the same site snapshot, so an identity
//! can never belong to a different site than the location.

// ============================================================================
// SECTION: Imports
// ============================================================================

use crate::core::models::OpenAccessMode;
use crate::core::models::User;
use crate::core::snapshot::LocationEntry;

// ============================================================================
// SECTION: Evaluation
// ============================================================================

/// Decides whether an identity can access a location.
///
/// Open-no-login locations admit everyone. Open-with-login locations admit
/// any identity of the site. Otherwise access requires a permission edge
/// between the location and the identity; an absent identity is always
/// denied.
#[must_use]
pub fn can_access(entry: &LocationEntry, identity: Option<&User>) -> bool {
    match entry.location.open_access {
        OpenAccessMode::OpenNoLogin => true,
        OpenAccessMode::OpenWithLogin => identity.is_some(),
        OpenAccessMode::Disabled => {
            identity.is_some_and(|user| entry.allowed.contains(&user.uuid))
        }
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

    use std::collections::BTreeSet;

    use super::can_access;
    use crate::core::identifiers::LocationId;
    use crate::core::identifiers::SiteId;
    use crate::core::identifiers::UserId;
    use crate::core::models::Location;
    use crate::core::models::OpenAccessMode;
    use crate::core::models::User;
    use crate::core::snapshot::LocationEntry;

    fn user(site: &str, email: &str) -> User {
        User {
            uuid: UserId::random(),
            site_id: SiteId::new(site),
            email: email.to_string(),
        }
    }

    fn entry(mode: OpenAccessMode, allowed: &[&UserId]) -> LocationEntry {
        LocationEntry {
            location: Location {
                uuid: LocationId::random(),
                site_id: SiteId::new("site"),
                path: "/foo".to_string(),
                open_access: mode,
            },
            allowed: allowed.iter().map(|id| (*id).clone()).collect::<BTreeSet<_>>(),
        }
    }

    #[test]
    fn granted_user_can_access_closed_location() {
        let user = user("site", "u@example.com");
        let entry = entry(OpenAccessMode::Disabled, &[&user.uuid]);
        assert!(can_access(&entry, Some(&user)));
    }

    #[test]
    fn ungranted_user_cannot_access_closed_location() {
        let granted = user("site", "u@example.com");
        let other = user("site", "v@example.com");
        let entry = entry(OpenAccessMode::Disabled, &[&granted.uuid]);
        assert!(!can_access(&entry, Some(&other)));
    }

    #[test]
    fn anonymous_cannot_access_closed_location() {
        let granted = user("site", "u@example.com");
        let entry = entry(OpenAccessMode::Disabled, &[&granted.uuid]);
        assert!(!can_access(&entry, None));
    }

    #[test]
    fn open_no_login_admits_everyone() {
        let user = user("site", "u@example.com");
        let entry = entry(OpenAccessMode::OpenNoLogin, &[]);
        assert!(can_access(&entry, Some(&user)));
        assert!(can_access(&entry, None));
    }

    #[test]
    fn open_with_login_requires_an_identity() {
        let user = user("site", "u@example.com");
        let entry = entry(OpenAccessMode::OpenWithLogin, &[]);
        assert!(can_access(&entry, Some(&user)));
        assert!(!can_access(&entry, None));
    }

    #[test]
    fn parent_grant_does_not_leak_into_nested_location() {
        let user = user("site", "u@example.com");
        let nested = entry(OpenAccessMode::Disabled, &[]);
        assert!(!can_access(&nested, Some(&user)));
    }
}
