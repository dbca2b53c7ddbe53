// gatehouse-server/src/auth.rs
// ============================================================================
// Module: Authorization API
// Description: Auth-request, login, logout, send-token, whoami, csrftoken.
// Purpose: Answer the front-end server's authorization subrequests.
// Dependencies: axum, gatehouse-core, serde
// ============================================================================

//! ## Overview
//! The auth request is sent by the front-end HTTP server for every request to
//! a protected location, carrying the original raw path and the caller's
//! session cookie. The result decides the action the front-end takes: 200
//! allows the original request, 401 asks for a login page, 403 reports a
//! signed-in-but-denied caller (with the email in the `User` header), and 400
//! flags a malformed request. Path-format validation happens strictly before
//! any identity or location lookup, so malformed requests never learn whether
//! a location exists. The path argument is read verbatim from the raw query
//! string; decoding it up front would make it impossible to recognize the
//! query part and fragment correctly.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use axum::extract::Query;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::http::HeaderValue;
use axum::http::StatusCode;
use axum::http::Uri;
use axum::http::header;
use axum::response::IntoResponse;
use axum::response::Response;
use gatehouse_core::CanonicalPath;
use gatehouse_core::DirectoryStore;
use gatehouse_core::SiteSnapshot;
use gatehouse_core::User;
use gatehouse_core::can_access;
use gatehouse_core::canonicalize;
use gatehouse_core::normalize_email;
use serde::Deserialize;
use serde::Serialize;

use crate::audit::AuditEvent;
use crate::audit::AuthAuditEvent;
use crate::audit::LoginAuditEvent;
use crate::csrf::CSRF_TOKEN_LENGTH;
use crate::csrf::check_origin;
use crate::csrf::guard_mutation;
use crate::csrf::random_token;
use crate::http;
use crate::server::AppState;
use crate::server::ResolvedSite;
use crate::server::resolve_identity;
use crate::server::resolve_site;
use crate::server::unix_now;
use crate::session::SessionData;

// ============================================================================
// SECTION: Decision
// ============================================================================

/// Outcome of one authorization check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthDecision {
    /// Access granted; the identity, when present, is surfaced downstream.
    Granted {
        /// Email of the resolved identity, absent for anonymous open access.
        email: Option<String>,
    },
    /// No identity, and the path needs one (or no location covers it).
    NotAuthenticated,
    /// Identity present but not allowed for the resolved location.
    NotAuthorized {
        /// Email of the denied identity.
        email: String,
    },
}

/// Decides access for a canonical path and a resolved identity.
///
/// A path no location covers is denied: anonymous callers see 401,
/// authenticated callers 403. The "no location exists" case stays observable
/// to embedders through [`SiteSnapshot::find_location`].
#[must_use]
pub fn decide(
    snapshot: &SiteSnapshot,
    path: &CanonicalPath,
    identity: Option<&User>,
) -> AuthDecision {
    let entry = snapshot.find_location(path);
    match identity {
        Some(user) => {
            if entry.is_some_and(|entry| can_access(entry, Some(user))) {
                AuthDecision::Granted {
                    email: Some(user.email.clone()),
                }
            } else {
                AuthDecision::NotAuthorized {
                    email: user.email.clone(),
                }
            }
        }
        None => {
            if entry.is_some_and(|entry| can_access(entry, None)) {
                AuthDecision::Granted {
                    email: None,
                }
            } else {
                AuthDecision::NotAuthenticated
            }
        }
    }
}

// ============================================================================
// SECTION: Auth Request
// ============================================================================

/// Handles `GET /auth/api/is-authorized/?path=<raw>`.
pub async fn is_authorized(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    uri: Uri,
) -> Response {
    let Some(raw_path) = extract_raw_path(&uri) else {
        return http::bad_request("auth request should have 'path' argument");
    };
    // The 'User' header is set by this service on success and passed on to
    // protected backends; a client supplying it is forging an identity.
    if headers.contains_key(http::USER_HEADER) {
        return http::bad_request("client can not set the 'User' header");
    }
    let path = match canonicalize(raw_path) {
        Ok(path) => path,
        Err(error) => return http::bad_request(&error.to_string()),
    };
    let site = match resolve_site(&state, &headers) {
        Ok(site) => site,
        Err(response) => return response,
    };
    let identity = match resolve_identity(&state, &site, &headers) {
        Ok(identity) => identity,
        Err(response) => return response,
    };
    let wants_html = http::accepts_html(&headers);
    let site_label = site.snapshot.site.site_id.as_str();
    match decide(&site.snapshot, &path, identity.as_ref()) {
        AuthDecision::Granted {
            email,
        } => {
            state.audit.record(&AuditEvent::Auth(AuthAuditEvent::allowed(
                site_label,
                path.as_str(),
                email.as_deref(),
            )));
            let mut response = http::ok_text("Access granted.");
            if let Some(email) = email
                && let Ok(value) = HeaderValue::from_str(&email)
            {
                response.headers_mut().insert(http::USER_HEADER, value);
            }
            response
        }
        AuthDecision::NotAuthenticated => {
            state.audit.record(&AuditEvent::Auth(AuthAuditEvent::denied(
                site_label,
                path.as_str(),
                401,
                None,
            )));
            http::not_authenticated(wants_html, &site.snapshot.site.skin)
        }
        AuthDecision::NotAuthorized {
            email,
        } => {
            state.audit.record(&AuditEvent::Auth(AuthAuditEvent::denied(
                site_label,
                path.as_str(),
                403,
                Some(&email),
            )));
            http::not_authorized(Some(&email), wants_html, &site.snapshot.site.skin)
        }
    }
}

/// Extracts the raw, still-encoded `path` argument from the query string.
///
/// The query must start with `path=`; everything after it, including any
/// further `&`, is the path argument, passed by the front-end verbatim.
fn extract_raw_path(uri: &Uri) -> Option<&str> {
    uri.query().and_then(|query| query.strip_prefix("path="))
}

// ============================================================================
// SECTION: Login
// ============================================================================

/// Query arguments of the login endpoint.
#[derive(Debug, Deserialize)]
pub struct LoginQuery {
    /// Signed login token from the emailed link.
    token: Option<String>,
    /// Path to redirect to after the session is established.
    next: Option<String>,
}

/// Handles `GET /auth/api/login/?token=..&next=..`.
///
/// Verifies the token for the resolved site, establishes the session, and
/// redirects to the sanitized `next` path. An unknown email is admitted, and
/// a user record created for it, only when the site has an open location
/// that requires login.
pub async fn login(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<LoginQuery>,
) -> Response {
    let site = match resolve_site(&state, &headers) {
        Ok(site) => site,
        Err(response) => return response,
    };
    let site_label = site.snapshot.site.site_id.as_str().to_string();
    let Some(token) = query.token else {
        return http::bad_request("login token not set");
    };
    let email = match state.codec.verify(
        &site.snapshot.site.site_id,
        &site.url,
        &token,
        state.config.server.token_valid_secs,
        unix_now(),
    ) {
        Ok(email) => email,
        Err(error) => {
            state.audit.record(&AuditEvent::Login(LoginAuditEvent::new(
                &site_label,
                None,
                "denied_bad_token",
            )));
            return http::bad_request(&error.to_string());
        }
    };
    let site_id = site.snapshot.site.site_id.clone();
    let existing = match state.store().find_user_by_email(&site_id, &email) {
        Ok(existing) => existing,
        Err(error) => return http::directory_error(&error),
    };
    let user = match existing {
        Some(user) => user,
        None => {
            if !site.snapshot.has_open_location_with_login() {
                state.audit.record(&AuditEvent::Login(LoginAuditEvent::new(
                    &site_label,
                    Some(&email),
                    "denied_unknown_user",
                )));
                return http::not_authorized(
                    None,
                    http::accepts_html(&headers),
                    &site.snapshot.site.skin,
                );
            }
            match admit_new_user(&state, &site, &email) {
                Ok(user) => user,
                Err(response) => return response,
            }
        }
    };
    let set_cookie = match state.sessions.establish(
        SessionData {
            user_id: user.uuid.clone(),
            site_id,
        },
        site.https,
    ) {
        Ok(set_cookie) => set_cookie,
        Err(error) => return http::internal_error(&error.to_string()),
    };
    state.audit.record(&AuditEvent::Login(LoginAuditEvent::new(
        &site_label,
        Some(&user.email),
        "allow",
    )));
    redirect(&sanitize_next(query.next.as_deref()), &set_cookie)
}

/// Creates a user record at login-token redemption time.
fn admit_new_user(state: &AppState, site: &ResolvedSite, email: &str) -> Result<User, Response> {
    let site_id = &site.snapshot.site.site_id;
    let users = state.store().list_users(site_id).map_err(|err| http::directory_error(&err))?;
    if users.len() >= state.config.limits.users_per_site {
        return Err(http::limit_exceeded("users limit exceeded"));
    }
    state.store().create_user(site_id, email).map_err(|err| http::directory_error(&err))
}

/// Collapses a redirection target to a safe, canonical local path.
///
/// Absolute URLs, scheme-relative `//host` forms, and anything else that does
/// not canonicalize collapse to `/`.
fn sanitize_next(next: Option<&str>) -> String {
    next.and_then(|next| canonicalize(next).ok())
        .map_or_else(|| "/".to_string(), |path| path.as_str().to_string())
}

/// Builds a 302 redirect carrying a `Set-Cookie` header.
fn redirect(location: &str, set_cookie: &str) -> Response {
    let mut response = StatusCode::FOUND.into_response();
    if let Ok(value) = HeaderValue::from_str(location) {
        response.headers_mut().insert(header::LOCATION, value);
    }
    if let Ok(value) = HeaderValue::from_str(set_cookie) {
        response.headers_mut().append(header::SET_COOKIE, value);
    }
    response
}

// ============================================================================
// SECTION: Logout
// ============================================================================

/// Handles `POST /auth/api/logout/`.
pub async fn logout(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    let site = match resolve_site(&state, &headers) {
        Ok(site) => site,
        Err(response) => return response,
    };
    if let Err(error) = guard_mutation(
        &headers,
        &site.url,
        state.sessions.csrf_cookie_value(&headers).as_deref(),
    ) {
        return http::bad_request(&error.to_string());
    }
    let expired = match state.sessions.clear(&headers) {
        Ok(expired) => expired,
        Err(error) => return http::internal_error(&error.to_string()),
    };
    let mut response = http::no_content();
    if let Ok(value) = HeaderValue::from_str(&expired) {
        response.headers_mut().append(header::SET_COOKIE, value);
    }
    response
}

// ============================================================================
// SECTION: Send Token
// ============================================================================

/// Body of the send-token endpoint.
#[derive(Debug, Deserialize)]
pub struct SendTokenRequest {
    /// Address to send the login link to.
    email: String,
    /// Path the login link should return the user to.
    #[serde(default)]
    path: Option<String>,
}

/// Handles `POST /auth/api/send-token/`.
///
/// Answers 204 for any syntactically valid email, whether or not a matching
/// user exists; existence is decided only at redemption time, so the
/// endpoint cannot be used to probe for accounts.
pub async fn send_token(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    axum::Json(request): axum::Json<SendTokenRequest>,
) -> Response {
    let site = match resolve_site(&state, &headers) {
        Ok(site) => site,
        Err(response) => return response,
    };
    if let Err(error) = guard_mutation(
        &headers,
        &site.url,
        state.sessions.csrf_cookie_value(&headers).as_deref(),
    ) {
        return http::bad_request(&error.to_string());
    }
    let Some(email) = normalize_email(&request.email) else {
        return http::bad_request("invalid email format");
    };
    let token = match state.codec.issue(
        &site.snapshot.site.site_id,
        &site.url,
        &email,
        unix_now(),
    ) {
        Ok(token) => token,
        Err(error) => return http::internal_error(&error.to_string()),
    };
    let next = sanitize_next(request.path.as_deref());
    let login_url = format!(
        "{}/auth/api/login/?token={}&next={}",
        site.url,
        token,
        percent_encode_query(&next)
    );
    if let Err(error) =
        state.mailer.send_login_link(&site.snapshot.site.site_id, &email, &login_url)
    {
        return http::internal_error(&error.to_string());
    }
    http::no_content()
}

/// Percent-encodes a query argument value, keeping path separators readable.
fn percent_encode_query(value: &str) -> String {
    let mut encoded = String::with_capacity(value.len());
    for byte in value.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' | b'/' => {
                encoded.push(char::from(byte));
            }
            other => {
                encoded.push('%');
                encoded.push_str(&format!("{other:02X}"));
            }
        }
    }
    encoded
}

// ============================================================================
// SECTION: WhoAmI
// ============================================================================

/// Body of the whoami response.
#[derive(Debug, Serialize)]
struct WhoAmIResponse {
    /// Email of the signed-in user.
    email: String,
}

/// Handles `GET /auth/api/whoami/`.
pub async fn whoami(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    let site = match resolve_site(&state, &headers) {
        Ok(site) => site,
        Err(response) => return response,
    };
    if let Err(error) = guard_mutation(
        &headers,
        &site.url,
        state.sessions.csrf_cookie_value(&headers).as_deref(),
    ) {
        return http::bad_request(&error.to_string());
    }
    match resolve_identity(&state, &site, &headers) {
        Ok(Some(user)) => http::ok_json(&WhoAmIResponse {
            email: user.email,
        }),
        Ok(None) => {
            http::not_authenticated(http::accepts_html(&headers), &site.snapshot.site.skin)
        }
        Err(response) => response,
    }
}

// ============================================================================
// SECTION: CSRF Token
// ============================================================================

/// Body of the csrftoken response.
#[derive(Debug, Serialize)]
struct CsrfTokenResponse {
    /// Token to supply in the `X-CSRFToken` header.
    #[serde(rename = "csrfToken")]
    csrf_token: String,
}

/// Handles `POST /auth/api/csrftoken/`.
///
/// Establishes the double-submit cookie and returns the token in the body.
/// The cookie is HttpOnly; clients obtain the token from the body, never by
/// reading the cookie. POST is used instead of GET as an extra precaution
/// against the token leaking to foreign origins through content sniffing.
pub async fn csrf_token(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    let site = match resolve_site(&state, &headers) {
        Ok(site) => site,
        Err(response) => return response,
    };
    if let Err(error) = check_origin(&headers, &site.url) {
        return http::bad_request(&error.to_string());
    }
    let token = state
        .sessions
        .csrf_cookie_value(&headers)
        .filter(|token| token.len() == CSRF_TOKEN_LENGTH)
        .unwrap_or_else(|| random_token(CSRF_TOKEN_LENGTH));
    let set_cookie = state.sessions.csrf_set_cookie(&token, site.https);
    let mut response = http::ok_json(&CsrfTokenResponse {
        csrf_token: token,
    });
    if let Ok(value) = HeaderValue::from_str(&set_cookie) {
        response.headers_mut().append(header::SET_COOKIE, value);
    }
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

    use std::collections::BTreeSet;

    use gatehouse_core::CanonicalPath;
    use gatehouse_core::Location;
    use gatehouse_core::LocationEntry;
    use gatehouse_core::LocationId;
    use gatehouse_core::OpenAccessMode;
    use gatehouse_core::Site;
    use gatehouse_core::SiteId;
    use gatehouse_core::SiteSkin;
    use gatehouse_core::SiteSnapshot;
    use gatehouse_core::User;
    use gatehouse_core::UserId;
    use gatehouse_core::canonicalize;

    use super::AuthDecision;
    use super::decide;
    use super::percent_encode_query;
    use super::sanitize_next;

    fn snapshot(entries: Vec<LocationEntry>, users: Vec<User>) -> SiteSnapshot {
        SiteSnapshot {
            site: Site {
                site_id: SiteId::new("site"),
                skin: SiteSkin::default(),
            },
            version: 0,
            aliases: Vec::new(),
            locations: entries,
            users,
        }
    }

    fn user(email: &str) -> User {
        User {
            uuid: UserId::random(),
            site_id: SiteId::new("site"),
            email: email.to_string(),
        }
    }

    fn entry(path: &str, mode: OpenAccessMode, allowed: &[&User]) -> LocationEntry {
        LocationEntry {
            location: Location {
                uuid: LocationId::random(),
                site_id: SiteId::new("site"),
                path: path.to_string(),
                open_access: mode,
            },
            allowed: allowed.iter().map(|user| user.uuid.clone()).collect::<BTreeSet<_>>(),
        }
    }

    fn path(raw: &str) -> CanonicalPath {
        canonicalize(raw).unwrap()
    }

    #[test]
    fn granted_user_gets_access_with_email_surfaced() {
        let user = user("u@example.com");
        let snapshot =
            snapshot(vec![entry("/foo/bar", OpenAccessMode::Disabled, &[&user])], vec![
                user.clone(),
            ]);
        assert_eq!(
            decide(&snapshot, &path("/foo/bar/baz"), Some(&user)),
            AuthDecision::Granted {
                email: Some("u@example.com".to_string())
            }
        );
    }

    #[test]
    fn anonymous_caller_is_asked_to_authenticate() {
        let snapshot = snapshot(vec![entry("/foo", OpenAccessMode::Disabled, &[])], Vec::new());
        assert_eq!(decide(&snapshot, &path("/foo"), None), AuthDecision::NotAuthenticated);
    }

    #[test]
    fn open_no_login_admits_anonymous_callers() {
        let snapshot = snapshot(vec![entry("/", OpenAccessMode::OpenNoLogin, &[])], Vec::new());
        assert_eq!(
            decide(&snapshot, &path("/anything"), None),
            AuthDecision::Granted {
                email: None
            }
        );
    }

    #[test]
    fn known_user_without_grant_is_denied_with_email() {
        let user = user("u@example.com");
        let snapshot =
            snapshot(vec![entry("/foo", OpenAccessMode::Disabled, &[])], vec![user.clone()]);
        assert_eq!(
            decide(&snapshot, &path("/foo"), Some(&user)),
            AuthDecision::NotAuthorized {
                email: "u@example.com".to_string()
            }
        );
    }

    #[test]
    fn unmatched_path_is_denied_for_everyone() {
        let user = user("u@example.com");
        let snapshot = snapshot(Vec::new(), vec![user.clone()]);
        assert_eq!(decide(&snapshot, &path("/anywhere"), None), AuthDecision::NotAuthenticated);
        assert_eq!(
            decide(&snapshot, &path("/anywhere"), Some(&user)),
            AuthDecision::NotAuthorized {
                email: "u@example.com".to_string()
            }
        );
    }

    #[test]
    fn nested_location_shadows_parent_grant() {
        let user = user("u@example.com");
        let snapshot = snapshot(
            vec![
                entry("/foo/bar", OpenAccessMode::Disabled, &[&user]),
                entry("/foo/bar/baz", OpenAccessMode::Disabled, &[]),
            ],
            vec![user.clone()],
        );
        assert_eq!(
            decide(&snapshot, &path("/foo/bar/baz/x"), Some(&user)),
            AuthDecision::NotAuthorized {
                email: "u@example.com".to_string()
            }
        );
        assert_eq!(
            decide(&snapshot, &path("/foo/bar/x"), Some(&user)),
            AuthDecision::Granted {
                email: Some("u@example.com".to_string())
            }
        );
    }

    #[test]
    fn sanitize_next_collapses_hostile_targets() {
        assert_eq!(sanitize_next(None), "/");
        assert_eq!(sanitize_next(Some("/foo/bar")), "/foo/bar");
        assert_eq!(sanitize_next(Some("https://evil.example/")), "/");
        assert_eq!(sanitize_next(Some("//evil.example/x")), "/evil.example/x");
        assert_eq!(sanitize_next(Some("/foo/../secret")), "/");
        assert_eq!(sanitize_next(Some("relative")), "/");
    }

    #[test]
    fn percent_encode_query_keeps_paths_readable() {
        assert_eq!(percent_encode_query("/foo/bar"), "/foo/bar");
        assert_eq!(percent_encode_query("/foo bar&x=1"), "/foo%20bar%26x%3D1");
    }
}
