// gatehouse-server/src/csrf.rs
// ============================================================================
// Module: CSRF / Origin Guard
// Description: Cross-origin rejection and double-submit CSRF token checks.
// Purpose: Protect mutating endpoints against cross-site requests.
// Dependencies: axum, rand, subtle, thiserror
// ============================================================================

//! ## Overview
//! Two independent checks guard every state-mutating endpoint, and both must
//! pass. First, a request carrying an `Origin` header different from the
//! site's own URL is dropped; cross-origin GET is rejected too, because JSON
//! responses leaking to foreign origins is a known risk even for read
//! endpoints. Second, a double-submit token: the value set in an HttpOnly
//! cookie at token issue time must match, in constant time, the value the
//! client supplies in the `X-CSRFToken` header. Browsers disallow custom
//! headers on cross-origin requests, and the token covers clients where that
//! guarantee has historically been broken by plugins.

// ============================================================================
// SECTION: Imports
// ============================================================================

use axum::http::HeaderMap;
use axum::http::HeaderName;
use rand::Rng;
use rand::distributions::Alphanumeric;
use subtle::ConstantTimeEq;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Exact length of a CSRF token.
pub const CSRF_TOKEN_LENGTH: usize = 32;

/// Header carrying the double-submit CSRF token.
pub const CSRF_HEADER: HeaderName = HeaderName::from_static("x-csrftoken");

/// Header identifying the origin the end-user is visiting.
pub const SITE_URL_HEADER: HeaderName = HeaderName::from_static("site-url");

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Guard rejection reasons.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GuardError {
    /// The request carried a foreign `Origin` header.
    #[error("cross origin requests not allowed")]
    CrossOrigin,
    /// The CSRF token was missing or did not match the cookie.
    #[error("CSRF token missing or incorrect")]
    CsrfMismatch,
}

// ============================================================================
// SECTION: Checks
// ============================================================================

/// Rejects requests whose `Origin` header names a foreign origin.
///
/// An absent `Origin` header passes; server-to-server calls and same-origin
/// navigations do not always carry one.
///
/// # Errors
///
/// Returns [`GuardError::CrossOrigin`] on a mismatch.
pub fn check_origin(headers: &HeaderMap, site_url: &str) -> Result<(), GuardError> {
    match headers.get(axum::http::header::ORIGIN) {
        None => Ok(()),
        Some(origin) => {
            if origin.to_str().is_ok_and(|origin| origin == site_url) {
                Ok(())
            } else {
                Err(GuardError::CrossOrigin)
            }
        }
    }
}

/// Validates the double-submit CSRF token.
///
/// The header token must have the exact expected length and match the cookie
/// token in constant time.
///
/// # Errors
///
/// Returns [`GuardError::CsrfMismatch`] when either value is missing or the
/// comparison fails.
pub fn check_csrf_token(headers: &HeaderMap, cookie_token: Option<&str>) -> Result<(), GuardError> {
    let header_token =
        headers.get(CSRF_HEADER).and_then(|value| value.to_str().ok()).unwrap_or_default();
    let cookie_token = cookie_token.unwrap_or_default();
    if header_token.len() != CSRF_TOKEN_LENGTH
        || !constant_time_eq(header_token.as_bytes(), cookie_token.as_bytes())
    {
        return Err(GuardError::CsrfMismatch);
    }
    Ok(())
}

/// Runs both guard checks for a mutating endpoint.
///
/// # Errors
///
/// Returns [`GuardError`] naming the first failed check.
pub fn guard_mutation(
    headers: &HeaderMap,
    site_url: &str,
    cookie_token: Option<&str>,
) -> Result<(), GuardError> {
    check_origin(headers, site_url)?;
    check_csrf_token(headers, cookie_token)
}

// ============================================================================
// SECTION: Token Generation
// ============================================================================

/// Generates a random alphanumeric token.
#[must_use]
pub fn random_token(length: usize) -> String {
    rand::thread_rng().sample_iter(&Alphanumeric).take(length).map(char::from).collect()
}

/// Compares two byte slices in constant time.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.ct_eq(b).into()
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

    use axum::http::HeaderMap;
    use axum::http::HeaderValue;
    use axum::http::header;

    use super::CSRF_HEADER;
    use super::CSRF_TOKEN_LENGTH;
    use super::GuardError;
    use super::check_csrf_token;
    use super::check_origin;
    use super::guard_mutation;
    use super::random_token;

    const SITE_URL: &str = "https://site.example";

    #[test]
    fn absent_origin_passes() {
        assert_eq!(check_origin(&HeaderMap::new(), SITE_URL), Ok(()));
    }

    #[test]
    fn matching_origin_passes_and_foreign_origin_fails() {
        let mut headers = HeaderMap::new();
        headers.insert(header::ORIGIN, HeaderValue::from_static(SITE_URL));
        assert_eq!(check_origin(&headers, SITE_URL), Ok(()));
        headers.insert(header::ORIGIN, HeaderValue::from_static("https://evil.example"));
        assert_eq!(check_origin(&headers, SITE_URL), Err(GuardError::CrossOrigin));
    }

    #[test]
    fn null_origin_fails() {
        let mut headers = HeaderMap::new();
        headers.insert(header::ORIGIN, HeaderValue::from_static("null"));
        assert_eq!(check_origin(&headers, SITE_URL), Err(GuardError::CrossOrigin));
    }

    #[test]
    fn matching_tokens_pass() {
        let token = random_token(CSRF_TOKEN_LENGTH);
        let mut headers = HeaderMap::new();
        headers.insert(CSRF_HEADER, HeaderValue::from_str(&token).unwrap());
        assert_eq!(check_csrf_token(&headers, Some(&token)), Ok(()));
    }

    #[test]
    fn missing_or_mismatched_tokens_fail() {
        let token = random_token(CSRF_TOKEN_LENGTH);
        assert_eq!(check_csrf_token(&HeaderMap::new(), Some(&token)), Err(GuardError::CsrfMismatch));
        let mut headers = HeaderMap::new();
        headers.insert(CSRF_HEADER, HeaderValue::from_str(&token).unwrap());
        assert_eq!(check_csrf_token(&headers, None), Err(GuardError::CsrfMismatch));
        let other = random_token(CSRF_TOKEN_LENGTH);
        assert_eq!(check_csrf_token(&headers, Some(&other)), Err(GuardError::CsrfMismatch));
    }

    #[test]
    fn short_header_tokens_fail_even_when_equal() {
        let mut headers = HeaderMap::new();
        headers.insert(CSRF_HEADER, HeaderValue::from_static("short"));
        assert_eq!(check_csrf_token(&headers, Some("short")), Err(GuardError::CsrfMismatch));
    }

    #[test]
    fn guard_requires_both_checks() {
        let token = random_token(CSRF_TOKEN_LENGTH);
        let mut headers = HeaderMap::new();
        headers.insert(CSRF_HEADER, HeaderValue::from_str(&token).unwrap());
        assert_eq!(guard_mutation(&headers, SITE_URL, Some(&token)), Ok(()));
        headers.insert(header::ORIGIN, HeaderValue::from_static("https://evil.example"));
        assert_eq!(guard_mutation(&headers, SITE_URL, Some(&token)), Err(GuardError::CrossOrigin));
    }

    #[test]
    fn random_tokens_have_the_requested_length() {
        let token = random_token(CSRF_TOKEN_LENGTH);
        assert_eq!(token.len(), CSRF_TOKEN_LENGTH);
        assert!(token.bytes().all(|byte| byte.is_ascii_alphanumeric()));
        assert_ne!(token, random_token(CSRF_TOKEN_LENGTH));
    }
}
