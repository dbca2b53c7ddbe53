// gatehouse-server/src/mailer.rs
// ============================================================================
// Module: Login Mailer
// Description: Outbound delivery seam for login links.
// Purpose: Decouple token dispatch from any concrete mail transport.
// Dependencies: crate::audit, gatehouse-core, thiserror
// ============================================================================

//! ## Overview
//! Sending the signed login link to an address is a fire-and-forget external
//! capability. The shipped implementation writes the would-be message to the
//! audit stream; deployments plug in a real transport behind the same trait.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use gatehouse_core::SiteId;
use thiserror::Error;

use crate::audit::AuditEvent;
use crate::audit::AuditSink;
use crate::audit::MailAuditEvent;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Mail dispatch errors.
#[derive(Debug, Error)]
pub enum MailError {
    /// The transport failed to accept the message.
    #[error("mail dispatch failed: {0}")]
    Dispatch(String),
}

// ============================================================================
// SECTION: Mailer
// ============================================================================

/// Fire-and-forget login link delivery.
pub trait LoginMailer: Send + Sync {
    /// Sends a login link to an address.
    ///
    /// # Errors
    ///
    /// Returns [`MailError`] when the transport rejects the message.
    fn send_login_link(
        &self,
        site_id: &SiteId,
        email: &str,
        login_url: &str,
    ) -> Result<(), MailError>;
}

/// Mailer that records the message on the audit stream instead of sending.
pub struct AuditLoginMailer {
    /// Destination audit sink.
    sink: Arc<dyn AuditSink>,
}

impl AuditLoginMailer {
    /// Creates a mailer over an audit sink.
    #[must_use]
    pub fn new(sink: Arc<dyn AuditSink>) -> Self {
        Self {
            sink,
        }
    }
}

impl LoginMailer for AuditLoginMailer {
    fn send_login_link(
        &self,
        site_id: &SiteId,
        email: &str,
        login_url: &str,
    ) -> Result<(), MailError> {
        self.sink.record(&AuditEvent::Mail(MailAuditEvent {
            event: "login_mail",
            site: site_id.as_str().to_string(),
            email: email.to_string(),
            login_url: login_url.to_string(),
        }));
        Ok(())
    }
}
