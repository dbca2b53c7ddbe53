// gatehouse-core/src/core/matcher.rs
// ============================================================================
// Module: Location Matcher
// Description: Longest-prefix resolution of canonical paths to locations.
// Purpose: Find the most specific location covering a request path.
// Dependencies: crate::core::snapshot
// ============================================================================

//! ## Overview
//! A location covers a path when the path starts with the location's path and
//! the shared prefix ends on a segment boundary. Among covering locations the
//! one with the longest path wins; ties cannot occur because paths are unique
//! within a site. The matcher is a linear scan over the site's cached
//! location list, which is small; a prefix trie would not change observable
//! behavior.

// ============================================================================
// SECTION: Imports
// ============================================================================

use crate::core::snapshot::LocationEntry;

// ============================================================================
// SECTION: Matching
// ============================================================================

/// Finds the most specific location covering a canonical path.
///
/// A location with path `L` covers a canonical path `P` when `P` starts with
/// `L` and either the two are equal, or `L` ends with `/`, or the character
/// of `P` immediately following the shared prefix is `/`. The root location
/// `/` covers every path. Returns `None` when no location covers the path,
/// which is distinct from "location exists but access denied".
#[must_use]
pub fn find_location<'a>(
    entries: &'a [LocationEntry],
    canonical_path: &str,
) -> Option<&'a LocationEntry> {
    let mut matched: Option<&LocationEntry> = None;
    for entry in entries {
        let probed = entry.location.path.as_str();
        if !canonical_path.starts_with(probed) {
            continue;
        }
        let covers = probed.len() == canonical_path.len()
            || probed.ends_with('/')
            || canonical_path.as_bytes().get(probed.len()) == Some(&b'/');
        if covers && matched.is_none_or(|best| probed.len() > best.location.path.len()) {
            matched = Some(entry);
        }
    }
    matched
}

// ============================================================================
// SECTION: Tests
// ============================================================================
