// gatehouse-core/src/core/mod.rs
// ============================================================================
// Module: Gatehouse Core Domain
// Description: Pure domain types and algorithms for access control.
// Purpose: Group identifier, path, model, matching, and token modules.
// Dependencies: crate::core submodules
// ============================================================================

//! ## Overview
//! The core module groups the side-effect-free building blocks of Gatehouse:
//! identifiers, path canonicalization, the site/location/user/permission
//! model, the location matcher, the permission evaluator, site snapshots,
//! and the login-token codec. Nothing in this module performs I/O.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod evaluator;
pub mod identifiers;
pub mod matcher;
pub mod models;
pub mod path;
pub mod snapshot;
pub mod token;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use evaluator::can_access;
pub use identifiers::AliasId;
pub use identifiers::LocationId;
pub use identifiers::SiteId;
pub use identifiers::UserId;
pub use matcher::find_location;
pub use models::Alias;
pub use models::Location;
pub use models::OpenAccessMode;
pub use models::Permission;
pub use models::Site;
pub use models::SiteSkin;
pub use models::User;
pub use models::UrlError;
pub use models::normalize_email;
pub use models::normalize_site_url;
pub use path::CanonicalPath;
pub use path::PathError;
pub use path::canonicalize;
pub use path::is_canonical;
pub use path::validate_location_path;
pub use snapshot::LocationEntry;
pub use snapshot::SiteSnapshot;
pub use token::LoginTokenCodec;
pub use token::TokenError;
