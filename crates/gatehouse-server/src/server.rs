// gatehouse-server/src/server.rs
// ============================================================================
// Module: Gatehouse Server
// Description: Application state, routing, and the serve loop.
// Purpose: Compose store, cache, sessions, codec, and handlers into one app.
// Dependencies: axum, gatehouse-core, gatehouse-store-sqlite, tokio
// ============================================================================

//! ## Overview
//! The composition root owns every shared collaborator: the directory store,
//! the site cache over it, the session manager, the login-token codec, the
//! mailer, and the audit sink. Handlers receive them through axum state; no
//! module-level singletons exist. Requests resolve their target site from the
//! `Site-Url` header against the cached alias set before any other work.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use axum::Router;
use axum::http::HeaderMap;
use axum::middleware;
use axum::response::Response;
use axum::routing::get;
use axum::routing::post;
use axum::routing::put;
use gatehouse_core::LoginTokenCodec;
use gatehouse_core::SharedDirectoryStore;
use gatehouse_core::SiteCache;
use gatehouse_core::SiteSnapshot;
use gatehouse_core::User;
use gatehouse_core::models::normalize_site_url;
use gatehouse_core::runtime::InMemoryDirectoryStore;
use gatehouse_store_sqlite::SqliteDirectoryStore;
use gatehouse_store_sqlite::SqliteStoreConfig;
use thiserror::Error;

use crate::admin;
use crate::audit::AuditSink;
use crate::audit::StderrAuditSink;
use crate::auth;
use crate::config::GatehouseConfig;
use crate::config::StoreType;
use crate::csrf::SITE_URL_HEADER;
use crate::http;
use crate::mailer::AuditLoginMailer;
use crate::mailer::LoginMailer;
use crate::session::InMemorySessionStore;
use crate::session::SessionManager;
use crate::session::SessionStore;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Server lifecycle errors.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Configuration errors.
    #[error("config error: {0}")]
    Config(String),
    /// Initialization errors.
    #[error("init error: {0}")]
    Init(String),
    /// Transport errors.
    #[error("transport error: {0}")]
    Transport(String),
}

// ============================================================================
// SECTION: Application State
// ============================================================================

/// Shared application state owned by the composition root.
pub struct AppState {
    /// Validated configuration.
    pub config: GatehouseConfig,
    /// Site cache over the injected directory store.
    pub cache: SiteCache,
    /// Session manager.
    pub sessions: SessionManager,
    /// Login link delivery.
    pub mailer: Arc<dyn LoginMailer>,
    /// Audit event sink.
    pub audit: Arc<dyn AuditSink>,
    /// Login token codec.
    pub codec: LoginTokenCodec,
}

impl AppState {
    /// Builds application state from explicit collaborators.
    #[must_use]
    pub fn new(
        config: GatehouseConfig,
        store: SharedDirectoryStore,
        session_store: Arc<dyn SessionStore>,
        mailer: Arc<dyn LoginMailer>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        let sessions = SessionManager::new(
            session_store,
            config.server.session_cookie.clone(),
            config.server.csrf_cookie.clone(),
        );
        let codec = LoginTokenCodec::new(config.server.secret.as_bytes().to_vec());
        Self {
            cache: SiteCache::new(store),
            sessions,
            mailer,
            audit,
            codec,
            config,
        }
    }

    /// Returns the injected directory store.
    #[must_use]
    pub const fn store(&self) -> &SharedDirectoryStore {
        self.cache.store()
    }
}

/// A request's resolved target site.
pub struct ResolvedSite {
    /// Normalized site URL the request presented.
    pub url: String,
    /// True when the site URL uses https.
    pub https: bool,
    /// Validated snapshot of the site.
    pub snapshot: Arc<SiteSnapshot>,
}

/// Resolves the request's site from the `Site-Url` header.
///
/// # Errors
///
/// Returns the ready error response: 400 for a missing, malformed, or
/// unknown site URL, 500 when the store fails.
pub fn resolve_site(state: &AppState, headers: &HeaderMap) -> Result<ResolvedSite, Response> {
    let Some(raw) = headers.get(SITE_URL_HEADER).and_then(|value| value.to_str().ok()) else {
        return Err(http::bad_request("missing Site-Url header"));
    };
    let url = normalize_site_url(raw).map_err(|err| http::bad_request(&err.to_string()))?;
    let snapshot = state.cache.get_by_url(&url).map_err(|err| http::directory_error(&err))?;
    let Some(snapshot) = snapshot else {
        return Err(http::bad_request("site not configured for this URL"));
    };
    Ok(ResolvedSite {
        https: url.starts_with("https://"),
        url,
        snapshot,
    })
}

/// Resolves the request's identity against the resolved site.
///
/// A session bound to a different site resolves to anonymous, never to a
/// same-id user of another site.
///
/// # Errors
///
/// Returns the ready 500 response when the session store fails.
pub fn resolve_identity(
    state: &AppState,
    site: &ResolvedSite,
    headers: &HeaderMap,
) -> Result<Option<User>, Response> {
    let session = state
        .sessions
        .resolve(headers)
        .map_err(|err| http::internal_error(&err.to_string()))?;
    Ok(session.and_then(|data| {
        if data.site_id == site.snapshot.site.site_id {
            site.snapshot.user_by_id(&data.user_id).cloned()
        } else {
            None
        }
    }))
}

/// Returns the current unix time in seconds.
#[must_use]
pub fn unix_now() -> i64 {
    let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
    i64::try_from(now.as_secs()).unwrap_or(i64::MAX)
}

// ============================================================================
// SECTION: Composition
// ============================================================================

/// Builds application state from configuration with default collaborators.
///
/// # Errors
///
/// Returns [`ServerError`] when validation or store initialization fails.
pub fn build_state(config: GatehouseConfig) -> Result<Arc<AppState>, ServerError> {
    config.validate().map_err(|err| ServerError::Config(err.to_string()))?;
    let store = build_store(&config)?;
    let audit: Arc<dyn AuditSink> = Arc::new(StderrAuditSink);
    let mailer: Arc<dyn LoginMailer> = Arc::new(AuditLoginMailer::new(Arc::clone(&audit)));
    let sessions: Arc<dyn SessionStore> = Arc::new(InMemorySessionStore::new());
    Ok(Arc::new(AppState::new(config, store, sessions, mailer, audit)))
}

/// Builds the directory store selected by configuration.
fn build_store(config: &GatehouseConfig) -> Result<SharedDirectoryStore, ServerError> {
    let store = match config.store.store_type {
        StoreType::Memory => SharedDirectoryStore::from_store(InMemoryDirectoryStore::new()),
        StoreType::Sqlite => {
            let path = config
                .store
                .path
                .clone()
                .ok_or_else(|| ServerError::Config("sqlite store requires path".to_string()))?;
            let sqlite_config = SqliteStoreConfig {
                path,
                busy_timeout_ms: config.store.busy_timeout_ms.unwrap_or(5_000),
                journal_mode: config.store.journal_mode,
                sync_mode: config.store.sync_mode,
            };
            let store = SqliteDirectoryStore::new(&sqlite_config)
                .map_err(|err| ServerError::Init(err.to_string()))?;
            SharedDirectoryStore::from_store(store)
        }
    };
    Ok(store)
}

/// Builds the axum router over shared state.
#[must_use]
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/auth/api/is-authorized/", get(auth::is_authorized))
        .route("/auth/api/login/", get(auth::login))
        .route("/auth/api/logout/", post(auth::logout))
        .route("/auth/api/send-token/", post(auth::send_token))
        .route("/auth/api/whoami/", get(auth::whoami))
        .route("/auth/api/csrftoken/", post(auth::csrf_token))
        .route(
            "/admin/api/locations/",
            get(admin::list_locations).post(admin::create_location),
        )
        .route(
            "/admin/api/locations/{location}/",
            get(admin::get_location).delete(admin::delete_location),
        )
        .route(
            "/admin/api/locations/{location}/open-access/",
            put(admin::put_open_access)
                .get(admin::get_open_access)
                .delete(admin::delete_open_access),
        )
        .route(
            "/admin/api/locations/{location}/allowed-users/{user}/",
            put(admin::grant_access).get(admin::get_permission).delete(admin::revoke_access),
        )
        .route("/admin/api/users/", get(admin::list_users).post(admin::create_user))
        .route(
            "/admin/api/users/{user}/",
            get(admin::get_user).delete(admin::delete_user),
        )
        .route("/admin/api/aliases/", get(admin::list_aliases).post(admin::create_alias))
        .route(
            "/admin/api/aliases/{alias}/",
            get(admin::get_alias).delete(admin::delete_alias),
        )
        .layer(middleware::map_response(http::harden_response))
        .with_state(state)
}

/// Serves the application until the listener fails.
///
/// # Errors
///
/// Returns [`ServerError`] when configuration, binding, or serving fails.
pub async fn serve(config: GatehouseConfig) -> Result<(), ServerError> {
    let bind = config.server.bind.clone();
    let state = build_state(config)?;
    emit_memory_store_warning(&state.config);
    let addr: SocketAddr =
        bind.parse().map_err(|_| ServerError::Config("invalid bind address".to_string()))?;
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|_| ServerError::Transport("bind failed".to_string()))?;
    axum::serve(listener, app)
        .await
        .map_err(|_| ServerError::Transport("server failed".to_string()))
}

/// Warns when the volatile store backs a running server.
#[allow(clippy::print_stderr, reason = "Startup warnings go to stderr.")]
fn emit_memory_store_warning(config: &GatehouseConfig) {
    if config.store.store_type == StoreType::Memory {
        eprintln!(
            "gatehouse: WARNING: running with the in-memory store; sites, users, and \
             permissions will not survive a restart"
        );
    }
}
