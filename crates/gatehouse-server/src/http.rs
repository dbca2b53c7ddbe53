// gatehouse-server/src/http.rs
// ============================================================================
// Module: HTTP Response Helpers
// Description: Canned responses, hardening headers, and HTML error pages.
// Purpose: Keep status, header, and content-type handling in one place.
// Dependencies: axum, gatehouse-core, regex, serde
// ============================================================================

//! ## Overview
//! REST-style helpers for the responses the auth and admin APIs return.
//! Every response leaves the service with cache disabling and
//! clickjacking/content-sniffing hardening headers. 401 responses carry
//! `WWW-Authenticate: VerifiedEmail`; 401 and 403 render the site's skinned
//! HTML page when the caller's `Accept` header prefers HTML.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::OnceLock;

use axum::http::HeaderMap;
use axum::http::HeaderName;
use axum::http::HeaderValue;
use axum::http::StatusCode;
use axum::http::header;
use axum::response::IntoResponse;
use axum::response::Response;
use gatehouse_core::DirectoryError;
use gatehouse_core::SiteSkin;
use regex::Regex;
use serde::Serialize;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Plain text content type.
const TEXT_MIME_TYPE: &str = "text/plain; charset=utf-8";

/// HTML content type.
const HTML_MIME_TYPE: &str = "text/html; charset=utf-8";

/// Header carrying the resolved identity back to the front-end server.
pub const USER_HEADER: HeaderName = HeaderName::from_static("user");

/// Cache disabling directives; `max-age=0` alone is not enough for browsers
/// that return cached GET results after a restart.
const NO_STORE: &str = "no-cache, no-store, must-revalidate, max-age=0";

// ============================================================================
// SECTION: Basic Responses
// ============================================================================

/// Builds a plain text response.
fn text(status: StatusCode, message: &str) -> Response {
    (
        status,
        [(header::CONTENT_TYPE, HeaderValue::from_static(TEXT_MIME_TYPE))],
        message.to_string(),
    )
        .into_response()
}

/// 200 with a plain text body.
#[must_use]
pub fn ok_text(message: &str) -> Response {
    text(StatusCode::OK, message)
}

/// 200 with a JSON body.
#[must_use]
pub fn ok_json(value: &impl Serialize) -> Response {
    (StatusCode::OK, axum::Json(value)).into_response()
}

/// 201 with a JSON body and `Location`/`Content-Location` headers.
#[must_use]
pub fn created_json(value: &impl Serialize, location: &str) -> Response {
    let mut response = (StatusCode::CREATED, axum::Json(value)).into_response();
    if let Ok(location) = HeaderValue::from_str(location) {
        response.headers_mut().insert(header::LOCATION, location.clone());
        response.headers_mut().insert(header::CONTENT_LOCATION, location);
    }
    response
}

/// 204 with an empty body.
#[must_use]
pub fn no_content() -> Response {
    StatusCode::NO_CONTENT.into_response()
}

/// 400 for malformed requests.
#[must_use]
pub fn bad_request(message: &str) -> Response {
    text(StatusCode::BAD_REQUEST, message)
}

/// 400 for reached resource ceilings.
#[must_use]
pub fn limit_exceeded(message: &str) -> Response {
    text(StatusCode::BAD_REQUEST, message)
}

/// 404 for absent resources on admin paths.
#[must_use]
pub fn not_found(message: &str) -> Response {
    text(StatusCode::NOT_FOUND, message)
}

/// 500 for store or dispatch failures; the front-end is expected to retry or
/// fail the original request.
#[must_use]
pub fn internal_error(message: &str) -> Response {
    text(StatusCode::INTERNAL_SERVER_ERROR, message)
}

/// Maps a directory store error to its response.
#[must_use]
pub fn directory_error(error: &DirectoryError) -> Response {
    match error {
        DirectoryError::NotFound(_) => not_found(&error.to_string()),
        DirectoryError::AlreadyExists(_) | DirectoryError::Invalid(_) => {
            bad_request(&error.to_string())
        }
        DirectoryError::LimitExceeded(_) => limit_exceeded(&error.to_string()),
        DirectoryError::Store(_) => internal_error("site store unavailable"),
    }
}

// ============================================================================
// SECTION: Authorization Outcomes
// ============================================================================

/// 401: the caller is not authenticated and may retry after authenticating.
#[must_use]
pub fn not_authenticated(wants_html: bool, skin: &SiteSkin) -> Response {
    let mut response = if wants_html {
        html(StatusCode::UNAUTHORIZED, &error_page(skin, "Authentication required."))
    } else {
        text(StatusCode::UNAUTHORIZED, "Authentication required.")
    };
    response
        .headers_mut()
        .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("VerifiedEmail"));
    response
}

/// 403: the caller is authenticated but not authorized.
///
/// The caller's email, when known, is surfaced in the `User` header so the
/// front-end can display who is signed in.
#[must_use]
pub fn not_authorized(email: Option<&str>, wants_html: bool, skin: &SiteSkin) -> Response {
    let mut response = if wants_html {
        html(StatusCode::FORBIDDEN, &error_page(skin, "User not authorized."))
    } else {
        text(StatusCode::FORBIDDEN, "User not authorized.")
    };
    if let Some(email) = email
        && let Ok(value) = HeaderValue::from_str(email)
    {
        response.headers_mut().insert(USER_HEADER, value);
    }
    response
}

/// Builds an HTML response.
fn html(status: StatusCode, body: &str) -> Response {
    (
        status,
        [(header::CONTENT_TYPE, HeaderValue::from_static(HTML_MIME_TYPE))],
        body.to_string(),
    )
        .into_response()
}

// ============================================================================
// SECTION: Content Negotiation
// ============================================================================

/// Compiled `Accept` header pattern.
static ACCEPTS_HTML_PATTERN: OnceLock<Regex> = OnceLock::new();

/// Returns true when the `Accept` header accepts an HTML response.
#[allow(clippy::expect_used, reason = "The pattern is a compile-time constant.")]
#[must_use]
pub fn accepts_html(headers: &HeaderMap) -> bool {
    let pattern = ACCEPTS_HTML_PATTERN
        .get_or_init(|| Regex::new(r"text/(html|\*)|(\*/\*)").expect("accept pattern compiles"));
    headers
        .get(header::ACCEPT)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|accept| pattern.is_match(accept))
}

// ============================================================================
// SECTION: Error Pages
// ============================================================================

/// Renders the skinned HTML error page for a site.
fn error_page(skin: &SiteSkin, status_line: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html>\n<head><meta charset=\"utf-8\"><title>{}</title></head>\n\
         <body>\n<h1>{}</h1>\n<p>{}</p>\n<p>{}</p>\n</body>\n</html>\n",
        escape_html(&skin.title),
        escape_html(&skin.header),
        escape_html(&skin.message),
        escape_html(status_line),
    )
}

/// Escapes text for embedding into HTML.
fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for character in text.chars() {
        match character {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            other => escaped.push(other),
        }
    }
    escaped
}

// ============================================================================
// SECTION: Response Hardening
// ============================================================================

/// Adds cache disabling and anti-clickjacking/sniffing headers.
///
/// Applied to every response the service produces, including extractor
/// rejections.
pub async fn harden_response(mut response: Response) -> Response {
    let headers = response.headers_mut();
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static(NO_STORE));
    headers.insert(header::X_FRAME_OPTIONS, HeaderValue::from_static("SAMEORIGIN"));
    headers.insert(header::X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff"));
    response
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
    use axum::http::StatusCode;
    use axum::http::header;
    use gatehouse_core::SiteSkin;

    use super::accepts_html;
    use super::escape_html;
    use super::not_authenticated;
    use super::not_authorized;

    fn headers_with_accept(accept: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::ACCEPT, HeaderValue::from_str(accept).unwrap());
        headers
    }

    #[test]
    fn accepts_html_matches_browser_accept_headers() {
        assert!(accepts_html(&headers_with_accept("text/html,application/xhtml+xml")));
        assert!(accepts_html(&headers_with_accept("audio/*, text/plain, text/*")));
        assert!(accepts_html(&headers_with_accept("*/*")));
        assert!(!accepts_html(&headers_with_accept("application/json")));
        assert!(!accepts_html(&HeaderMap::new()));
    }

    #[test]
    fn not_authenticated_carries_the_challenge_header() {
        let response = not_authenticated(false, &SiteSkin::default());
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            response.headers().get(header::WWW_AUTHENTICATE).unwrap(),
            "VerifiedEmail"
        );
    }

    #[test]
    fn not_authorized_surfaces_the_email() {
        let response = not_authorized(Some("u@example.com"), false, &SiteSkin::default());
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(response.headers().get(super::USER_HEADER).unwrap(), "u@example.com");
        let response = not_authorized(None, false, &SiteSkin::default());
        assert!(response.headers().get(super::USER_HEADER).is_none());
    }

    #[test]
    fn escape_html_neutralizes_markup() {
        assert_eq!(escape_html("<b>&\"'"), "&lt;b&gt;&amp;&quot;&#39;");
    }
}
