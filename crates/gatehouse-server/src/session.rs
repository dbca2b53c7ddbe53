// gatehouse-server/src/session.rs
// ============================================================================
// Module: Session / Identity Resolution
// Description: Session store seam, cookie handling, and identity binding.
// Purpose: Map an inbound session credential to a site-scoped identity.
// Dependencies: axum, gatehouse-core, thiserror
// ============================================================================

//! ## Overview
//! Sessions bind a user id together with the site id the login happened on,
//! so identity resolution can re-derive the correct site scoping without a
//! store round trip. A session whose site differs from the site a request
//! targets fails open to anonymous; it must never accidentally match a
//! same-id user of another site. The session store itself is an external
//! capability behind [`SessionStore`]; the shipped implementation keeps
//! sessions in process memory.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;

use axum::http::HeaderMap;
use axum::http::header;
use gatehouse_core::SiteId;
use gatehouse_core::UserId;
use thiserror::Error;

use crate::csrf::random_token;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Length of generated session identifiers.
const SESSION_ID_LENGTH: usize = 32;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Session store errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// The session store failed.
    #[error("session store error: {0}")]
    Store(String),
}

// ============================================================================
// SECTION: Session Store
// ============================================================================

/// Identity bound to a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionData {
    /// User the session authenticates.
    pub user_id: UserId,
    /// Site the login happened on.
    pub site_id: SiteId,
}

/// Key-value session abstraction readable and writable per request.
pub trait SessionStore: Send + Sync {
    /// Creates a session and returns its opaque identifier.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError`] when the store fails.
    fn create(&self, data: SessionData) -> Result<String, SessionError>;

    /// Looks up a session by identifier.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError`] when the store fails.
    fn get(&self, session_id: &str) -> Result<Option<SessionData>, SessionError>;

    /// Removes a session; removing an unknown session is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError`] when the store fails.
    fn remove(&self, session_id: &str) -> Result<(), SessionError>;
}

/// In-memory session store.
#[derive(Debug, Default)]
pub struct InMemorySessionStore {
    /// Sessions keyed by identifier, protected by a mutex.
    sessions: Mutex<HashMap<String, SessionData>>,
}

impl InMemorySessionStore {
    /// Creates a new in-memory session store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for InMemorySessionStore {
    fn create(&self, data: SessionData) -> Result<String, SessionError> {
        let mut sessions = self
            .sessions
            .lock()
            .map_err(|_| SessionError::Store("session store mutex poisoned".to_string()))?;
        let session_id = loop {
            let candidate = random_token(SESSION_ID_LENGTH);
            if !sessions.contains_key(&candidate) {
                break candidate;
            }
        };
        sessions.insert(session_id.clone(), data);
        Ok(session_id)
    }

    fn get(&self, session_id: &str) -> Result<Option<SessionData>, SessionError> {
        let sessions = self
            .sessions
            .lock()
            .map_err(|_| SessionError::Store("session store mutex poisoned".to_string()))?;
        Ok(sessions.get(session_id).cloned())
    }

    fn remove(&self, session_id: &str) -> Result<(), SessionError> {
        let mut sessions = self
            .sessions
            .lock()
            .map_err(|_| SessionError::Store("session store mutex poisoned".to_string()))?;
        sessions.remove(session_id);
        Ok(())
    }
}

// ============================================================================
// SECTION: Session Manager
// ============================================================================

/// Cookie-level session handling over a [`SessionStore`].
pub struct SessionManager {
    /// Underlying session store.
    store: Arc<dyn SessionStore>,
    /// Session cookie name.
    session_cookie: String,
    /// CSRF cookie name.
    csrf_cookie: String,
}

impl SessionManager {
    /// Creates a manager over a store and cookie names.
    #[must_use]
    pub fn new(
        store: Arc<dyn SessionStore>,
        session_cookie: impl Into<String>,
        csrf_cookie: impl Into<String>,
    ) -> Self {
        Self {
            store,
            session_cookie: session_cookie.into(),
            csrf_cookie: csrf_cookie.into(),
        }
    }

    /// Resolves the request's session, if any.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError`] when the store fails.
    pub fn resolve(&self, headers: &HeaderMap) -> Result<Option<SessionData>, SessionError> {
        match cookie_value(headers, &self.session_cookie) {
            Some(session_id) => self.store.get(&session_id),
            None => Ok(None),
        }
    }

    /// Establishes a session and returns the `Set-Cookie` value binding it.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError`] when the store fails.
    pub fn establish(&self, data: SessionData, secure: bool) -> Result<String, SessionError> {
        let session_id = self.store.create(data)?;
        Ok(build_cookie(&self.session_cookie, &session_id, secure))
    }

    /// Clears the request's session and returns the expiring `Set-Cookie`
    /// value.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError`] when the store fails.
    pub fn clear(&self, headers: &HeaderMap) -> Result<String, SessionError> {
        if let Some(session_id) = cookie_value(headers, &self.session_cookie) {
            self.store.remove(&session_id)?;
        }
        Ok(expire_cookie(&self.session_cookie))
    }

    /// Returns the request's CSRF cookie value, if any.
    #[must_use]
    pub fn csrf_cookie_value(&self, headers: &HeaderMap) -> Option<String> {
        cookie_value(headers, &self.csrf_cookie)
    }

    /// Returns the `Set-Cookie` value for a CSRF token.
    #[must_use]
    pub fn csrf_set_cookie(&self, token: &str, secure: bool) -> String {
        build_cookie(&self.csrf_cookie, token, secure)
    }
}

// ============================================================================
// SECTION: Cookie Helpers
// ============================================================================

/// Extracts a cookie value from the request headers.
#[must_use]
pub fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    for header in headers.get_all(header::COOKIE) {
        let Ok(cookies) = header.to_str() else {
            continue;
        };
        for pair in cookies.split(';') {
            if let Some((cookie_name, value)) = pair.trim().split_once('=')
                && cookie_name == name
            {
                return Some(value.to_string());
            }
        }
    }
    None
}

/// Builds a `Set-Cookie` value.
///
/// Cookies are HttpOnly (no script access) and carry the `Secure` flag
/// whenever the resolved site URL uses https, so they are never sent over
/// plain HTTP for such sites.
fn build_cookie(name: &str, value: &str, secure: bool) -> String {
    if secure {
        format!("{name}={value}; Path=/; HttpOnly; SameSite=Lax; Secure")
    } else {
        format!("{name}={value}; Path=/; HttpOnly; SameSite=Lax")
    }
}

/// Builds a `Set-Cookie` value that expires a cookie.
fn expire_cookie(name: &str) -> String {
    format!("{name}=; Path=/; Max-Age=0; HttpOnly; SameSite=Lax")
}

// ============================================================================
// SECTION: Tests
// ============================================================================
