// gatehouse-core/src/core/models.rs
// ============================================================================
// Module: Access Control Model
// Description: Sites, aliases, locations, users, and permission edges.
// Purpose: Provide the owned value types of the multi-tenant data model.
// Dependencies: serde, regex, thiserror
// ============================================================================

//! ## Overview
//! The data model stores information about sites, locations, users, and
//! permissions. A site has users, locations (paths), and permissions - rules
//! that define which user can access which locations. Sites are isolated:
//! users and locations belong to a single site and are used only for that
//! site. Entered emails, paths, and alias URLs are validated here before they
//! reach any store.
//!
//! ## Invariants
//! - Emails are stored lower-cased and are unique within a site.
//! - Location paths are canonical and unique within a site.
//! - A permission edge connects a location and a user of the same site; at
//!   most one edge exists per pair.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::OnceLock;

use regex::Regex;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

use crate::core::identifiers::AliasId;
use crate::core::identifiers::LocationId;
use crate::core::identifiers::SiteId;
use crate::core::identifiers::UserId;

// ============================================================================
// SECTION: Open Access Mode
// ============================================================================

/// Open-access mode of a location.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OpenAccessMode {
    /// Only explicitly allowed users can access the location.
    #[default]
    Disabled,
    /// Everyone can access the location, no login required.
    OpenNoLogin,
    /// Everyone can access the location, but login is required.
    OpenWithLogin,
}

impl OpenAccessMode {
    /// Returns true when the location is reachable without a per-user grant.
    #[must_use]
    pub const fn grants_open_access(self) -> bool {
        matches!(self, Self::OpenNoLogin | Self::OpenWithLogin)
    }

    /// Returns true when open access still requires authentication.
    #[must_use]
    pub const fn requires_login(self) -> bool {
        matches!(self, Self::OpenWithLogin)
    }

    /// Returns the canonical storage label for the mode.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Disabled => "disabled",
            Self::OpenNoLogin => "open",
            Self::OpenWithLogin => "open_login",
        }
    }

    /// Parses a canonical storage label.
    #[must_use]
    pub fn parse_label(label: &str) -> Option<Self> {
        match label {
            "disabled" => Some(Self::Disabled),
            "open" => Some(Self::OpenNoLogin),
            "open_login" => Some(Self::OpenWithLogin),
            _ => None,
        }
    }
}

// ============================================================================
// SECTION: Site
// ============================================================================

/// Branding text used when rendering HTML error pages for a site.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteSkin {
    /// Page title.
    pub title: String,
    /// Page header line.
    pub header: String,
    /// Explanatory message below the header.
    pub message: String,
}

impl Default for SiteSkin {
    fn default() -> Self {
        Self {
            title: "Protected site".to_string(),
            header: "Authorization required".to_string(),
            message: "Access to this site is restricted.".to_string(),
        }
    }
}

/// A site to which access is protected.
///
/// # Invariants
/// - All locations, users, permissions, and aliases below a site belong to
///   exactly that site; there is no cross-site visibility.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Site {
    /// Site identifier; a domain or any other string.
    pub site_id: SiteId,
    /// Branding for rendered error pages.
    pub skin: SiteSkin,
}

/// A URL under which a site accepts requests.
///
/// # Invariants
/// - The URL is normalized (`scheme://host[:port]`, lower-cased, default
///   ports removed) and resolves to exactly one site.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alias {
    /// Externally visible alias identifier.
    pub uuid: AliasId,
    /// Site to which the alias belongs.
    pub site_id: SiteId,
    /// Normalized `scheme://host[:port]` form.
    pub url: String,
}

// ============================================================================
// SECTION: Location
// ============================================================================

/// A location for which access-control rules are defined.
///
/// A location is uniquely identified within its site by its canonical path.
/// All rules defined for a location apply also to sub-paths, unless a more
/// specific location exists; the more specific location then takes precedence
/// over the more generic one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    /// Externally visible location identifier.
    pub uuid: LocationId,
    /// Site to which the location belongs.
    pub site_id: SiteId,
    /// Canonical path of the location.
    pub path: String,
    /// Open-access mode of the location.
    pub open_access: OpenAccessMode,
}

// ============================================================================
// SECTION: User
// ============================================================================

/// An identity scoped to a site.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Externally visible user identifier, unique across all sites.
    pub uuid: UserId,
    /// Site to which the user belongs.
    pub site_id: SiteId,
    /// Normalized (lower-cased) email of the user.
    pub email: String,
}

// ============================================================================
// SECTION: Permission
// ============================================================================

/// A grant edge connecting a location with a user that can access it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permission {
    /// Location to which the edge grants access.
    pub location_id: LocationId,
    /// User that is given access.
    pub user_id: UserId,
}

// ============================================================================
// SECTION: Email Validation
// ============================================================================

/// Compiled email grammar.
static EMAIL_PATTERN: OnceLock<Regex> = OnceLock::new();

/// Returns the compiled email validation pattern.
#[allow(clippy::expect_used, reason = "The pattern is a compile-time constant.")]
fn email_pattern() -> &'static Regex {
    EMAIL_PATTERN.get_or_init(|| {
        Regex::new(r"^[\w.!#$%&'*+\-/=?\^`{|}~]+@[a-z0-9-]+(\.[a-z0-9-]+)+$")
            .expect("email pattern compiles")
    })
}

/// Normalizes and validates an email address.
///
/// The email is converted to lower case so addresses do not need to be added
/// to the access-control list with the same capitalization the user signs in
/// with. Returns `None` when the lower-cased form does not match the accepted
/// grammar.
#[must_use]
pub fn normalize_email(email: &str) -> Option<String> {
    let normalized = email.trim().to_lowercase();
    if email_pattern().is_match(&normalized) {
        Some(normalized)
    } else {
        None
    }
}

// ============================================================================
// SECTION: Site URL Validation
// ============================================================================

/// Site URL validation errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UrlError {
    /// URL carries no scheme.
    #[error("site URL is missing scheme (http:// or https://)")]
    MissingScheme,
    /// URL scheme is not http or https.
    #[error("site URL has incorrect scheme (should be http:// or https://)")]
    BadScheme,
    /// URL carries no host.
    #[error("site URL is missing domain")]
    MissingHost,
    /// URL carries a path, query, fragment, or credentials.
    #[error("site URL should contain only scheme and domain")]
    TrailingParts,
}

/// Normalizes a site URL to the canonical `scheme://host[:port]` form.
///
/// Scheme and host are lower-cased and default ports (80 for http, 443 for
/// https) are removed, so all equivalent spellings of one origin compare
/// equal.
///
/// # Errors
///
/// Returns [`UrlError`] when the URL is not a bare http(s) origin.
pub fn normalize_site_url(url: &str) -> Result<String, UrlError> {
    let trimmed = url.trim();
    let (scheme, rest) = trimmed.split_once("://").ok_or(UrlError::MissingScheme)?;
    let scheme = scheme.to_lowercase();
    if scheme != "http" && scheme != "https" {
        return Err(UrlError::BadScheme);
    }
    if rest.is_empty() {
        return Err(UrlError::MissingHost);
    }
    if rest.contains('/') || rest.contains('?') || rest.contains('#') || rest.contains('@') {
        return Err(UrlError::TrailingParts);
    }
    let host_port = rest.to_lowercase();
    let normalized = match host_port.split_once(':') {
        Some((host, port)) => {
            if host.is_empty() {
                return Err(UrlError::MissingHost);
            }
            if port.is_empty() || !port.bytes().all(|byte| byte.is_ascii_digit()) {
                return Err(UrlError::TrailingParts);
            }
            if (scheme == "http" && port == "80") || (scheme == "https" && port == "443") {
                host.to_string()
            } else {
                format!("{host}:{port}")
            }
        }
        None => host_port,
    };
    Ok(format!("{scheme}://{normalized}"))
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

    use super::OpenAccessMode;
    use super::UrlError;
    use super::normalize_email;
    use super::normalize_site_url;

    #[test]
    fn normalize_email_lowercases() {
        assert_eq!(normalize_email("Foo@Example.COM"), Some("foo@example.com".to_string()));
    }

    #[test]
    fn normalize_email_accepts_plus_addressing() {
        assert_eq!(normalize_email("foo+bar@example.com"), Some("foo+bar@example.com".to_string()));
    }

    #[test]
    fn normalize_email_rejects_invalid_forms() {
        assert_eq!(normalize_email("foo"), None);
        assert_eq!(normalize_email("foo@"), None);
        assert_eq!(normalize_email("@example.com"), None);
        assert_eq!(normalize_email("foo@nodot"), None);
        assert_eq!(normalize_email("foo bar@example.com"), None);
        assert_eq!(normalize_email(""), None);
    }

    #[test]
    fn normalize_site_url_strips_default_ports() {
        assert_eq!(normalize_site_url("https://example.com:443"), Ok("https://example.com".to_string()));
        assert_eq!(normalize_site_url("http://example.com:80"), Ok("http://example.com".to_string()));
        assert_eq!(
            normalize_site_url("https://example.com:8443"),
            Ok("https://example.com:8443".to_string())
        );
    }

    #[test]
    fn normalize_site_url_lowercases_scheme_and_host() {
        assert_eq!(normalize_site_url("HTTPS://Example.COM"), Ok("https://example.com".to_string()));
    }

    #[test]
    fn normalize_site_url_rejects_other_parts() {
        assert_eq!(normalize_site_url("example.com"), Err(UrlError::MissingScheme));
        assert_eq!(normalize_site_url("ftp://example.com"), Err(UrlError::BadScheme));
        assert_eq!(normalize_site_url("https://"), Err(UrlError::MissingHost));
        assert_eq!(normalize_site_url("https://example.com/path"), Err(UrlError::TrailingParts));
        assert_eq!(normalize_site_url("https://user@example.com"), Err(UrlError::TrailingParts));
        assert_eq!(normalize_site_url("https://example.com?x=1"), Err(UrlError::TrailingParts));
        assert_eq!(normalize_site_url("https://example.com:abc"), Err(UrlError::TrailingParts));
    }

    #[test]
    fn open_access_labels_round_trip() {
        for mode in [
            OpenAccessMode::Disabled,
            OpenAccessMode::OpenNoLogin,
            OpenAccessMode::OpenWithLogin,
        ] {
            assert_eq!(OpenAccessMode::parse_label(mode.label()), Some(mode));
        }
        assert_eq!(OpenAccessMode::parse_label("bogus"), None);
    }

    #[test]
    fn open_access_mode_flags() {
        assert!(!OpenAccessMode::Disabled.grants_open_access());
        assert!(OpenAccessMode::OpenNoLogin.grants_open_access());
        assert!(!OpenAccessMode::OpenNoLogin.requires_login());
        assert!(OpenAccessMode::OpenWithLogin.requires_login());
    }
}
