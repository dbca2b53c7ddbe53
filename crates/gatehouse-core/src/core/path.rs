// gatehouse-core/src/core/path.rs
// ============================================================================
// Module: Path Canonicalizer
// Description: Normalization and validation of request paths.
// Purpose: Produce the canonical matching key used for all authorization.
// Dependencies: thiserror
// ============================================================================

//! ## Overview
//! Every authorization decision is keyed by a canonical path. The front-end
//! server passes the raw, still percent-encoded path of the original request
//! and this module reduces it to a canonical form: query stripped, percent
//! escapes decoded, repeated separators collapsed, and the result required to
//! be absolute and normalized. Paths with `/../` or `/./` segments are not
//! normally sent by browsers and are rejected rather than resolved, so the
//! access-control view of a path can never diverge from the front-end
//! server's own routing.
//!
//! ## Invariants
//! - Canonicalization is pure; identical inputs yield identical outputs.
//! - A canonical path starts with exactly one `/` and may or may not end
//!   with `/` (the two forms address different resources).

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Maximum accepted byte length of a stored location path.
pub const MAX_LOCATION_PATH_BYTES: usize = 300;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Path validation errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathError {
    /// Path contains a fragment marker.
    #[error("path should not contain fragment ('#' part)")]
    Fragment,
    /// Path contains a query part.
    #[error("path should not contain query ('?' part)")]
    Query,
    /// Path contains parameters.
    #[error("path should not contain parameters (';' part)")]
    Params,
    /// Path contains non-ASCII characters.
    #[error("path should contain only ascii characters")]
    NotAscii,
    /// Path is not absolute and normalized.
    #[error("path should be absolute and normalized (starting with / without /../ or /./ or //)")]
    NotCanonical,
    /// Path exceeds the accepted length bound.
    #[error("path should not be longer than {MAX_LOCATION_PATH_BYTES} bytes")]
    TooLong,
}

// ============================================================================
// SECTION: Canonical Path
// ============================================================================

/// A validated, canonical request path.
///
/// # Invariants
/// - The wrapped string is absolute and normalized; it is the only key ever
///   used for matching, caching, or authorization.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CanonicalPath(String);

impl CanonicalPath {
    /// Returns the path as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CanonicalPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

// ============================================================================
// SECTION: Canonicalization
// ============================================================================

/// Canonicalizes a raw, percent-encoded request path.
///
/// The query part is discarded, percent escapes are decoded, and runs of `/`
/// are collapsed. A literal `#` anywhere in the raw input is rejected before
/// any decoding, so an encoded `%23` never triggers the fragment check.
///
/// # Errors
///
/// Returns [`PathError`] when the input carries a fragment or does not reduce
/// to an absolute, normalized path.
pub fn canonicalize(raw: &str) -> Result<CanonicalPath, PathError> {
    if raw.contains('#') {
        return Err(PathError::Fragment);
    }
    let stripped = strip_query(raw);
    let decoded = percent_decode(stripped);
    let collapsed = collapse_slashes(&decoded);
    if !is_canonical(&collapsed) {
        return Err(PathError::NotCanonical);
    }
    Ok(CanonicalPath(collapsed))
}

/// Returns true when a path is absolute and normalized.
///
/// `//` is recognized by POSIX as a normalized path but is not canonical
/// here (it addresses the same resource as `/`), so any repeated separator
/// disqualifies the path. A trailing single `/` is allowed.
#[must_use]
pub fn is_canonical(path: &str) -> bool {
    if path.is_empty() || !path.starts_with('/') || path.contains("//") {
        return false;
    }
    path.split('/').all(|segment| segment != "." && segment != "..")
}

/// Validates a location path supplied through the admin interface.
///
/// Stored paths carry stricter rules than request paths: they must already be
/// canonical and must not contain the parts that play no role in access
/// control (query, fragment, parameters), nor non-ASCII characters.
///
/// # Errors
///
/// Returns [`PathError`] naming the first violated rule.
pub fn validate_location_path(path: &str) -> Result<(), PathError> {
    if path.contains('#') {
        return Err(PathError::Fragment);
    }
    if path.contains('?') {
        return Err(PathError::Query);
    }
    if path.contains(';') {
        return Err(PathError::Params);
    }
    if !path.is_ascii() {
        return Err(PathError::NotAscii);
    }
    if !is_canonical(path) {
        return Err(PathError::NotCanonical);
    }
    if path.len() > MAX_LOCATION_PATH_BYTES {
        return Err(PathError::TooLong);
    }
    Ok(())
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Strips the query part (everything from the first `?`) from a path.
fn strip_query(path: &str) -> &str {
    path.find('?').map_or(path, |index| &path[..index])
}

/// Decodes percent escapes, mapping `+` to a space.
///
/// Malformed escapes are kept literally rather than rejected; browsers do not
/// emit them, and keeping them guarantees the decoded form never matches a
/// stored canonical path by accident.
fn percent_decode(path: &str) -> String {
    let bytes = path.as_bytes();
    let mut decoded = Vec::with_capacity(bytes.len());
    let mut index = 0;
    while index < bytes.len() {
        match bytes[index] {
            b'%' => {
                let high = bytes.get(index + 1).copied().and_then(hex_value);
                let low = bytes.get(index + 2).copied().and_then(hex_value);
                if let (Some(high), Some(low)) = (high, low) {
                    decoded.push(high << 4 | low);
                    index += 3;
                } else {
                    decoded.push(b'%');
                    index += 1;
                }
            }
            b'+' => {
                decoded.push(b' ');
                index += 1;
            }
            byte => {
                decoded.push(byte);
                index += 1;
            }
        }
    }
    String::from_utf8_lossy(&decoded).into_owned()
}

/// Returns the value of an ASCII hex digit.
const fn hex_value(byte: u8) -> Option<u8> {
    match byte {
        b'0'..=b'9' => Some(byte - b'0'),
        b'a'..=b'f' => Some(byte - b'a' + 10),
        b'A'..=b'F' => Some(byte - b'A' + 10),
        _ => None,
    }
}

/// Replaces runs of `/` with a single separator.
fn collapse_slashes(path: &str) -> String {
    let mut collapsed = String::with_capacity(path.len());
    let mut previous_slash = false;
    for character in path.chars() {
        if character == '/' {
            if !previous_slash {
                collapsed.push('/');
            }
            previous_slash = true;
        } else {
            collapsed.push(character);
            previous_slash = false;
        }
    }
    collapsed
}

// ============================================================================
// SECTION: Tests
// ============================================================================
