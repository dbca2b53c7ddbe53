// gatehouse-server/src/audit.rs
// ============================================================================
// Module: Audit Logging
// Description: Structured audit events for authorization and admin actions.
// Purpose: Emit JSON-line audit logs without a hard logging dependency.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! Audit events are plain serde payloads routed through a pluggable sink, so
//! deployments can forward them to their preferred logging pipeline without
//! redesign. Authorization allow/deny outcomes are recorded here as expected
//! results of the state machine; they are never raised or logged as errors.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Serialize;

// ============================================================================
// SECTION: Events
// ============================================================================

/// Authorization decision event.
#[derive(Debug, Clone, Serialize)]
pub struct AuthAuditEvent {
    /// Event identifier.
    pub event: &'static str,
    /// Site the decision was made for.
    pub site: String,
    /// Canonical path the decision covered.
    pub path: String,
    /// Decision outcome label.
    pub decision: &'static str,
    /// HTTP status returned to the front-end.
    pub status: u16,
    /// Resolved identity, when present.
    pub email: Option<String>,
}

impl AuthAuditEvent {
    /// Builds an allow event.
    #[must_use]
    pub fn allowed(site: &str, path: &str, email: Option<&str>) -> Self {
        Self {
            event: "auth_decision",
            site: site.to_string(),
            path: path.to_string(),
            decision: "allow",
            status: 200,
            email: email.map(str::to_string),
        }
    }

    /// Builds a deny event.
    #[must_use]
    pub fn denied(site: &str, path: &str, status: u16, email: Option<&str>) -> Self {
        Self {
            event: "auth_decision",
            site: site.to_string(),
            path: path.to_string(),
            decision: "deny",
            status,
            email: email.map(str::to_string),
        }
    }
}

/// Login attempt event.
#[derive(Debug, Clone, Serialize)]
pub struct LoginAuditEvent {
    /// Event identifier.
    pub event: &'static str,
    /// Site the login targeted.
    pub site: String,
    /// Email the login token proved, when it verified.
    pub email: Option<String>,
    /// Outcome label.
    pub outcome: &'static str,
}

impl LoginAuditEvent {
    /// Builds a login event.
    #[must_use]
    pub fn new(site: &str, email: Option<&str>, outcome: &'static str) -> Self {
        Self {
            event: "login",
            site: site.to_string(),
            email: email.map(str::to_string),
            outcome,
        }
    }
}

/// Administrative mutation event.
#[derive(Debug, Clone, Serialize)]
pub struct AdminAuditEvent {
    /// Event identifier.
    pub event: &'static str,
    /// Site the mutation applied to.
    pub site: String,
    /// Action label, e.g. `location_create`.
    pub action: &'static str,
    /// Affected resource detail (path, email, or uuid).
    pub detail: String,
}

impl AdminAuditEvent {
    /// Builds an admin mutation event.
    #[must_use]
    pub fn new(site: &str, action: &'static str, detail: impl Into<String>) -> Self {
        Self {
            event: "admin_mutation",
            site: site.to_string(),
            action,
            detail: detail.into(),
        }
    }
}

/// Outbound login-mail event.
#[derive(Debug, Clone, Serialize)]
pub struct MailAuditEvent {
    /// Event identifier.
    pub event: &'static str,
    /// Site the mail belongs to.
    pub site: String,
    /// Recipient address.
    pub email: String,
    /// Login URL carried by the message.
    pub login_url: String,
}

/// Audit event envelope.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum AuditEvent {
    /// Authorization decision.
    Auth(AuthAuditEvent),
    /// Login attempt.
    Login(LoginAuditEvent),
    /// Administrative mutation.
    Admin(AdminAuditEvent),
    /// Outbound login mail.
    Mail(MailAuditEvent),
}

// ============================================================================
// SECTION: Sinks
// ============================================================================

/// Audit sink for structured events.
pub trait AuditSink: Send + Sync {
    /// Records an audit event.
    fn record(&self, event: &AuditEvent);
}

/// Audit sink that logs JSON lines to stderr.
pub struct StderrAuditSink;

impl AuditSink for StderrAuditSink {
    #[allow(clippy::print_stderr, reason = "Stderr is this sink's output channel.")]
    fn record(&self, event: &AuditEvent) {
        if let Ok(payload) = serde_json::to_string(event) {
            eprintln!("{payload}");
        }
    }
}

/// No-op audit sink for tests.
pub struct NoopAuditSink;

impl AuditSink for NoopAuditSink {
    fn record(&self, _event: &AuditEvent) {}
}

// ============================================================================
// SECTION: Tests
// ============================================================================
