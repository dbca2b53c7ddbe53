// gatehouse-server/src/admin.rs
// ============================================================================
// Module: Admin API
// Description: REST management of locations, users, permissions, and aliases.
// Purpose: Expose the access-control list behind origin/CSRF guards.
// Dependencies: axum, gatehouse-core, serde
// ============================================================================

//! ## Overview
//! Thin create/find/delete wrappers over the directory store, one resource
//! collection per route family. Every method, reads included, passes the
//! origin and CSRF checks; the deployment contract is that the front-end
//! additionally protects `/admin/` paths through the authorization oracle
//! itself. Created resources answer 201 with a JSON representation carrying
//! a `self` link and an `urn:uuid:` id; granting an existing permission
//! answers 200 with the unchanged edge. Mutations bump the site's
//! modification counter inside the store, which invalidates cached snapshots
//! on the next authorization check.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use axum::extract::Path;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::Response;
use gatehouse_core::AliasId;
use gatehouse_core::DirectoryStore;
use gatehouse_core::LocationEntry;
use gatehouse_core::LocationId;
use gatehouse_core::OpenAccessMode;
use gatehouse_core::SiteSnapshot;
use gatehouse_core::User;
use gatehouse_core::UserId;
use serde::Deserialize;
use serde::Serialize;

use crate::audit::AdminAuditEvent;
use crate::audit::AuditEvent;
use crate::csrf::guard_mutation;
use crate::http;
use crate::server::AppState;
use crate::server::ResolvedSite;
use crate::server::resolve_site;

// ============================================================================
// SECTION: Guard
// ============================================================================

/// Resolves the site and runs the origin/CSRF guard for an admin request.
fn admin_prologue(state: &AppState, headers: &HeaderMap) -> Result<ResolvedSite, Response> {
    let site = resolve_site(state, headers)?;
    guard_mutation(headers, &site.url, state.sessions.csrf_cookie_value(headers).as_deref())
        .map_err(|error| http::bad_request(&error.to_string()))?;
    Ok(site)
}

/// Records an admin mutation on the audit stream.
fn record(state: &AppState, site: &ResolvedSite, action: &'static str, detail: &str) {
    state.audit.record(&AuditEvent::Admin(AdminAuditEvent::new(
        site.snapshot.site.site_id.as_str(),
        action,
        detail,
    )));
}

// ============================================================================
// SECTION: Representations
// ============================================================================

/// Returns the URN form of an externally visible id.
fn urn(uuid: &str) -> String {
    format!("urn:uuid:{uuid}")
}

/// User resource representation.
#[derive(Debug, Serialize)]
struct UserRepr {
    /// Resource URL.
    #[serde(rename = "self")]
    self_url: String,
    /// URN-form identifier.
    id: String,
    /// Normalized email.
    email: String,
}

/// Builds a user representation.
fn user_repr(site_url: &str, user: &User) -> UserRepr {
    UserRepr {
        self_url: format!("{site_url}/admin/api/users/{}/", user.uuid),
        id: urn(user.uuid.as_str()),
        email: user.email.clone(),
    }
}

/// Open-access attribute of a location representation.
#[derive(Debug, Serialize)]
struct OpenAccessInfo {
    /// Whether open access still requires a login.
    #[serde(rename = "requireLogin")]
    require_login: bool,
}

/// Location resource representation.
#[derive(Debug, Serialize)]
struct LocationRepr {
    /// Resource URL.
    #[serde(rename = "self")]
    self_url: String,
    /// URN-form identifier.
    id: String,
    /// Canonical path.
    path: String,
    /// Open-access state, present only when granted.
    #[serde(rename = "openAccess", skip_serializing_if = "Option::is_none")]
    open_access: Option<OpenAccessInfo>,
    /// Users granted access to the location.
    #[serde(rename = "allowedUsers")]
    allowed_users: Vec<UserRepr>,
}

/// Builds a location representation from a snapshot entry.
fn location_repr(site_url: &str, snapshot: &SiteSnapshot, entry: &LocationEntry) -> LocationRepr {
    let allowed_users = entry
        .allowed
        .iter()
        .filter_map(|user_id| snapshot.user_by_id(user_id))
        .map(|user| user_repr(site_url, user))
        .collect();
    LocationRepr {
        self_url: location_url(site_url, entry.location.uuid.as_str()),
        id: urn(entry.location.uuid.as_str()),
        path: entry.location.path.clone(),
        open_access: if entry.location.open_access.grants_open_access() {
            Some(OpenAccessInfo {
                require_login: entry.location.open_access.requires_login(),
            })
        } else {
            None
        },
        allowed_users,
    }
}

/// Alias resource representation.
#[derive(Debug, Serialize)]
struct AliasRepr {
    /// Resource URL.
    #[serde(rename = "self")]
    self_url: String,
    /// URN-form identifier.
    id: String,
    /// Normalized alias URL.
    url: String,
}

/// Builds an alias representation.
fn alias_repr(site_url: &str, uuid: &str, url: &str) -> AliasRepr {
    AliasRepr {
        self_url: format!("{site_url}/admin/api/aliases/{uuid}/"),
        id: urn(uuid),
        url: url.to_string(),
    }
}

/// Permission resource representation.
#[derive(Debug, Serialize)]
struct PermissionRepr {
    /// Resource URL.
    #[serde(rename = "self")]
    self_url: String,
    /// The user the edge grants access to.
    user: UserRepr,
}

/// Returns a location resource URL.
fn location_url(site_url: &str, uuid: &str) -> String {
    format!("{site_url}/admin/api/locations/{uuid}/")
}

/// Returns a permission resource URL.
fn permission_url(site_url: &str, location_uuid: &str, user_uuid: &str) -> String {
    format!("{site_url}/admin/api/locations/{location_uuid}/allowed-users/{user_uuid}/")
}

/// Locations collection representation.
#[derive(Debug, Serialize)]
struct LocationsRepr {
    /// Collection URL.
    #[serde(rename = "self")]
    self_url: String,
    /// Location resources.
    locations: Vec<LocationRepr>,
}

/// Users collection representation.
#[derive(Debug, Serialize)]
struct UsersRepr {
    /// Collection URL.
    #[serde(rename = "self")]
    self_url: String,
    /// User resources.
    users: Vec<UserRepr>,
}

/// Aliases collection representation.
#[derive(Debug, Serialize)]
struct AliasesRepr {
    /// Collection URL.
    #[serde(rename = "self")]
    self_url: String,
    /// Alias resources.
    aliases: Vec<AliasRepr>,
}

// ============================================================================
// SECTION: Locations
// ============================================================================

/// Body of a location creation request.
#[derive(Debug, Deserialize)]
pub struct CreateLocationRequest {
    /// Canonical path of the new location.
    path: String,
}

/// Handles `GET /admin/api/locations/`.
pub async fn list_locations(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    let site = match admin_prologue(&state, &headers) {
        Ok(site) => site,
        Err(response) => return response,
    };
    let locations = site
        .snapshot
        .locations
        .iter()
        .map(|entry| location_repr(&site.url, &site.snapshot, entry))
        .collect();
    http::ok_json(&LocationsRepr {
        self_url: format!("{}/admin/api/locations/", site.url),
        locations,
    })
}

/// Handles `POST /admin/api/locations/`.
pub async fn create_location(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    axum::Json(request): axum::Json<CreateLocationRequest>,
) -> Response {
    let site = match admin_prologue(&state, &headers) {
        Ok(site) => site,
        Err(response) => return response,
    };
    if site.snapshot.locations.len() >= state.config.limits.locations_per_site {
        return http::limit_exceeded("locations limit exceeded");
    }
    let location =
        match state.store().create_location(&site.snapshot.site.site_id, &request.path) {
            Ok(location) => location,
            Err(error) => return http::directory_error(&error),
        };
    record(&state, &site, "location_create", &location.path);
    let repr = LocationRepr {
        self_url: location_url(&site.url, location.uuid.as_str()),
        id: urn(location.uuid.as_str()),
        path: location.path.clone(),
        open_access: None,
        allowed_users: Vec::new(),
    };
    let self_url = repr.self_url.clone();
    http::created_json(&repr, &self_url)
}

/// Handles `GET /admin/api/locations/{location}/`.
pub async fn get_location(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(location): Path<String>,
) -> Response {
    let site = match admin_prologue(&state, &headers) {
        Ok(site) => site,
        Err(response) => return response,
    };
    let location_id = LocationId::new(location);
    site.snapshot
        .locations
        .iter()
        .find(|entry| entry.location.uuid == location_id)
        .map_or_else(
            || http::not_found("location not found"),
            |entry| http::ok_json(&location_repr(&site.url, &site.snapshot, entry)),
        )
}

/// Handles `DELETE /admin/api/locations/{location}/`.
pub async fn delete_location(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(location): Path<String>,
) -> Response {
    let site = match admin_prologue(&state, &headers) {
        Ok(site) => site,
        Err(response) => return response,
    };
    let location_id = LocationId::new(location);
    match state.store().delete_location(&site.snapshot.site.site_id, &location_id) {
        Ok(true) => {
            record(&state, &site, "location_delete", location_id.as_str());
            http::no_content()
        }
        Ok(false) => http::not_found("location not found"),
        Err(error) => http::directory_error(&error),
    }
}

// ============================================================================
// SECTION: Open Access
// ============================================================================

/// Body of an open-access grant request.
#[derive(Debug, Deserialize)]
pub struct OpenAccessRequest {
    /// Whether everyone must still log in.
    #[serde(rename = "requireLogin")]
    require_login: bool,
}

/// Open-access resource representation.
#[derive(Debug, Serialize)]
struct OpenAccessRepr {
    /// Resource URL.
    #[serde(rename = "self")]
    self_url: String,
    /// Whether open access still requires a login.
    #[serde(rename = "requireLogin")]
    require_login: bool,
}

/// Returns an open-access resource URL.
fn open_access_url(site_url: &str, location_uuid: &str) -> String {
    format!("{site_url}/admin/api/locations/{location_uuid}/open-access/")
}

/// Handles `PUT /admin/api/locations/{location}/open-access/`.
pub async fn put_open_access(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(location): Path<String>,
    axum::Json(request): axum::Json<OpenAccessRequest>,
) -> Response {
    let site = match admin_prologue(&state, &headers) {
        Ok(site) => site,
        Err(response) => return response,
    };
    let location_id = LocationId::new(location);
    let site_id = &site.snapshot.site.site_id;
    let current = match state.store().find_location(site_id, &location_id) {
        Ok(Some(current)) => current,
        Ok(None) => return http::not_found("location not found"),
        Err(error) => return http::directory_error(&error),
    };
    let was_open = current.open_access.grants_open_access();
    let mode = if request.require_login {
        OpenAccessMode::OpenWithLogin
    } else {
        OpenAccessMode::OpenNoLogin
    };
    if let Err(error) = state.store().set_open_access(site_id, &location_id, mode) {
        return http::directory_error(&error);
    }
    record(&state, &site, "open_access_grant", location_id.as_str());
    let repr = OpenAccessRepr {
        self_url: open_access_url(&site.url, location_id.as_str()),
        require_login: request.require_login,
    };
    if was_open {
        http::ok_json(&repr)
    } else {
        let self_url = repr.self_url.clone();
        http::created_json(&repr, &self_url)
    }
}

/// Handles `GET /admin/api/locations/{location}/open-access/`.
pub async fn get_open_access(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(location): Path<String>,
) -> Response {
    let site = match admin_prologue(&state, &headers) {
        Ok(site) => site,
        Err(response) => return response,
    };
    let location_id = LocationId::new(location);
    let Some(entry) =
        site.snapshot.locations.iter().find(|entry| entry.location.uuid == location_id)
    else {
        return http::not_found("location not found");
    };
    if !entry.location.open_access.grants_open_access() {
        return http::not_found("open access to location disallowed");
    }
    http::ok_json(&OpenAccessRepr {
        self_url: open_access_url(&site.url, location_id.as_str()),
        require_login: entry.location.open_access.requires_login(),
    })
}

/// Handles `DELETE /admin/api/locations/{location}/open-access/`.
pub async fn delete_open_access(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(location): Path<String>,
) -> Response {
    let site = match admin_prologue(&state, &headers) {
        Ok(site) => site,
        Err(response) => return response,
    };
    let location_id = LocationId::new(location);
    let site_id = &site.snapshot.site.site_id;
    let current = match state.store().find_location(site_id, &location_id) {
        Ok(Some(current)) => current,
        Ok(None) => return http::not_found("location not found"),
        Err(error) => return http::directory_error(&error),
    };
    if !current.open_access.grants_open_access() {
        return http::not_found("open access to location already disallowed");
    }
    if let Err(error) =
        state.store().set_open_access(site_id, &location_id, OpenAccessMode::Disabled)
    {
        return http::directory_error(&error);
    }
    record(&state, &site, "open_access_revoke", location_id.as_str());
    http::no_content()
}

// ============================================================================
// SECTION: Permissions
// ============================================================================

/// Handles `PUT /admin/api/locations/{location}/allowed-users/{user}/`.
pub async fn grant_access(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path((location, user)): Path<(String, String)>,
) -> Response {
    let site = match admin_prologue(&state, &headers) {
        Ok(site) => site,
        Err(response) => return response,
    };
    let location_id = LocationId::new(location);
    let user_id = UserId::new(user);
    let site_id = &site.snapshot.site.site_id;
    let (_, created) = match state.store().grant_access(site_id, &location_id, &user_id) {
        Ok(result) => result,
        Err(error) => return http::directory_error(&error),
    };
    let Ok(Some(user)) = state.store().find_user(site_id, &user_id) else {
        return http::internal_error("granted user unavailable");
    };
    let repr = PermissionRepr {
        self_url: permission_url(&site.url, location_id.as_str(), user_id.as_str()),
        user: user_repr(&site.url, &user),
    };
    if created {
        record(&state, &site, "permission_grant", &format!("{location_id} {user_id}"));
        let self_url = repr.self_url.clone();
        http::created_json(&repr, &self_url)
    } else {
        http::ok_json(&repr)
    }
}

/// Handles `GET /admin/api/locations/{location}/allowed-users/{user}/`.
///
/// This checks for an explicit grant edge, which is not the same as the
/// user being able to access the location: an open location without the
/// edge still answers 404 here.
pub async fn get_permission(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path((location, user)): Path<(String, String)>,
) -> Response {
    let site = match admin_prologue(&state, &headers) {
        Ok(site) => site,
        Err(response) => return response,
    };
    let location_id = LocationId::new(location);
    let user_id = UserId::new(user);
    let site_id = &site.snapshot.site.site_id;
    match state.store().find_permission(site_id, &location_id, &user_id) {
        Ok(Some(_)) => {}
        Ok(None) => return http::not_found("user can not access location"),
        Err(error) => return http::directory_error(&error),
    }
    let Ok(Some(user)) = state.store().find_user(site_id, &user_id) else {
        return http::internal_error("granted user unavailable");
    };
    http::ok_json(&PermissionRepr {
        self_url: permission_url(&site.url, location_id.as_str(), user_id.as_str()),
        user: user_repr(&site.url, &user),
    })
}

/// Handles `DELETE /admin/api/locations/{location}/allowed-users/{user}/`.
///
/// Revokes the explicit grant; an open location stays reachable afterwards.
pub async fn revoke_access(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path((location, user)): Path<(String, String)>,
) -> Response {
    let site = match admin_prologue(&state, &headers) {
        Ok(site) => site,
        Err(response) => return response,
    };
    let location_id = LocationId::new(location);
    let user_id = UserId::new(user);
    match state.store().revoke_access(&site.snapshot.site.site_id, &location_id, &user_id) {
        Ok(()) => {
            record(&state, &site, "permission_revoke", &format!("{location_id} {user_id}"));
            http::no_content()
        }
        Err(error) => http::directory_error(&error),
    }
}

// ============================================================================
// SECTION: Users
// ============================================================================

/// Body of a user creation request.
#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    /// Email of the new user.
    email: String,
}

/// Handles `GET /admin/api/users/`.
pub async fn list_users(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    let site = match admin_prologue(&state, &headers) {
        Ok(site) => site,
        Err(response) => return response,
    };
    let users = site.snapshot.users.iter().map(|user| user_repr(&site.url, user)).collect();
    http::ok_json(&UsersRepr {
        self_url: format!("{}/admin/api/users/", site.url),
        users,
    })
}

/// Handles `POST /admin/api/users/`.
pub async fn create_user(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    axum::Json(request): axum::Json<CreateUserRequest>,
) -> Response {
    let site = match admin_prologue(&state, &headers) {
        Ok(site) => site,
        Err(response) => return response,
    };
    if site.snapshot.users.len() >= state.config.limits.users_per_site {
        return http::limit_exceeded("users limit exceeded");
    }
    let user = match state.store().create_user(&site.snapshot.site.site_id, &request.email) {
        Ok(user) => user,
        Err(error) => return http::directory_error(&error),
    };
    record(&state, &site, "user_create", &user.email);
    let repr = user_repr(&site.url, &user);
    let self_url = repr.self_url.clone();
    http::created_json(&repr, &self_url)
}

/// Handles `GET /admin/api/users/{user}/`.
pub async fn get_user(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(user): Path<String>,
) -> Response {
    let site = match admin_prologue(&state, &headers) {
        Ok(site) => site,
        Err(response) => return response,
    };
    let user_id = UserId::new(user);
    site.snapshot.user_by_id(&user_id).map_or_else(
        || http::not_found("user not found"),
        |user| http::ok_json(&user_repr(&site.url, user)),
    )
}

/// Handles `DELETE /admin/api/users/{user}/`.
pub async fn delete_user(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(user): Path<String>,
) -> Response {
    let site = match admin_prologue(&state, &headers) {
        Ok(site) => site,
        Err(response) => return response,
    };
    let user_id = UserId::new(user);
    match state.store().delete_user(&site.snapshot.site.site_id, &user_id) {
        Ok(true) => {
            record(&state, &site, "user_delete", user_id.as_str());
            http::no_content()
        }
        Ok(false) => http::not_found("user not found"),
        Err(error) => http::directory_error(&error),
    }
}

// ============================================================================
// SECTION: Aliases
// ============================================================================

/// Body of an alias creation request.
#[derive(Debug, Deserialize)]
pub struct CreateAliasRequest {
    /// URL under which the site should accept requests.
    url: String,
}

/// Handles `GET /admin/api/aliases/`.
pub async fn list_aliases(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    let site = match admin_prologue(&state, &headers) {
        Ok(site) => site,
        Err(response) => return response,
    };
    let aliases = site
        .snapshot
        .aliases
        .iter()
        .map(|alias| alias_repr(&site.url, alias.uuid.as_str(), &alias.url))
        .collect();
    http::ok_json(&AliasesRepr {
        self_url: format!("{}/admin/api/aliases/", site.url),
        aliases,
    })
}

/// Handles `POST /admin/api/aliases/`.
pub async fn create_alias(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    axum::Json(request): axum::Json<CreateAliasRequest>,
) -> Response {
    let site = match admin_prologue(&state, &headers) {
        Ok(site) => site,
        Err(response) => return response,
    };
    let alias = match state.store().create_alias(&site.snapshot.site.site_id, &request.url) {
        Ok(alias) => alias,
        Err(error) => return http::directory_error(&error),
    };
    record(&state, &site, "alias_create", &alias.url);
    let repr = alias_repr(&site.url, alias.uuid.as_str(), &alias.url);
    let self_url = repr.self_url.clone();
    http::created_json(&repr, &self_url)
}

/// Handles `GET /admin/api/aliases/{alias}/`.
pub async fn get_alias(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(alias): Path<String>,
) -> Response {
    let site = match admin_prologue(&state, &headers) {
        Ok(site) => site,
        Err(response) => return response,
    };
    let alias_id = AliasId::new(alias);
    match state.store().find_alias(&site.snapshot.site.site_id, &alias_id) {
        Ok(Some(alias)) => {
            http::ok_json(&alias_repr(&site.url, alias.uuid.as_str(), &alias.url))
        }
        Ok(None) => http::not_found("alias not found"),
        Err(error) => http::directory_error(&error),
    }
}

/// Handles `DELETE /admin/api/aliases/{alias}/`.
pub async fn delete_alias(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(alias): Path<String>,
) -> Response {
    let site = match admin_prologue(&state, &headers) {
        Ok(site) => site,
        Err(response) => return response,
    };
    let alias_id = AliasId::new(alias);
    match state.store().delete_alias(&site.snapshot.site.site_id, &alias_id) {
        Ok(true) => {
            record(&state, &site, "alias_delete", alias_id.as_str());
            http::no_content()
        }
        Ok(false) => http::not_found("alias not found"),
        Err(error) => http::directory_error(&error),
    }
}
