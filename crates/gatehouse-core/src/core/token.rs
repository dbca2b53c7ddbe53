// gatehouse-core/src/core/token.rs
// ============================================================================
// Module: Login Token Codec
// Description: Signed, site-scoped, time-limited login tokens.
// Purpose: Prove email ownership without storing credentials.
// Dependencies: base64, ed25519-dalek, serde, serde_json, sha2
// ============================================================================

//! ## Overview
//! A login token is a signed bundle of site id, site URL, email, and issuance
//! time, emailed to a user to verify that the user indeed owns the address.
//! The signing key is derived from a process-global secret salted by the site
//! URL, so a token is valid only for the site it was generated for and is
//! discarded when submitted to a different site protected by the same
//! instance. Validity is recomputed purely from the token's signed content
//! plus the current time; nothing is persisted.
//!
//! The codec never reads the clock; callers supply timestamps. There is no
//! server-side single-use tracking: a captured token remains redeemable until
//! its expiry window closes, a deliberate trade-off for statelessness.

// ============================================================================
// SECTION: Imports
// ============================================================================

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use ed25519_dalek::Signature;
use ed25519_dalek::Signer;
use ed25519_dalek::SigningKey;
use serde::Deserialize;
use serde::Serialize;
use sha2::Digest;
use sha2::Sha256;
use thiserror::Error;

use crate::core::identifiers::SiteId;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Login token verification errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenError {
    /// Token is not in the expected wire form.
    #[error("login token is malformed")]
    Malformed,
    /// Token signature does not verify for this site URL.
    #[error("login token signature is invalid")]
    Signature,
    /// Token was issued for a different site or site URL.
    #[error("login token was issued for a different site")]
    Scope,
    /// Token issuance time lies in the future.
    #[error("login token issuance time is in the future")]
    FromFuture,
    /// Token age exceeds the allowed maximum.
    #[error("login token has expired")]
    Expired,
}

// ============================================================================
// SECTION: Claims
// ============================================================================

/// Signed token payload.
#[derive(Debug, Serialize, Deserialize)]
struct TokenClaims {
    /// Site identifier the token belongs to.
    site: String,
    /// Site URL the token was generated for.
    url: String,
    /// Email the token proves ownership of.
    email: String,
    /// Issuance time, unix seconds.
    iat: i64,
}

// ============================================================================
// SECTION: Codec
// ============================================================================

/// Issues and verifies signed login tokens.
pub struct LoginTokenCodec {
    /// Process-global signing secret.
    secret: Vec<u8>,
}

impl LoginTokenCodec {
    /// Creates a codec from a signing secret.
    #[must_use]
    pub fn new(secret: impl Into<Vec<u8>>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    /// Issues a signed login token for an email on a site.
    ///
    /// # Errors
    ///
    /// Returns [`TokenError::Malformed`] when the claims cannot be
    /// serialized.
    pub fn issue(
        &self,
        site_id: &SiteId,
        site_url: &str,
        email: &str,
        issued_at: i64,
    ) -> Result<String, TokenError> {
        let claims = TokenClaims {
            site: site_id.as_str().to_string(),
            url: site_url.to_string(),
            email: email.to_string(),
            iat: issued_at,
        };
        let payload = serde_json::to_vec(&claims).map_err(|_| TokenError::Malformed)?;
        let signature = self.signing_key(site_url).sign(&payload);
        let mut token = URL_SAFE_NO_PAD.encode(&payload);
        token.push('.');
        token.push_str(&URL_SAFE_NO_PAD.encode(signature.to_bytes()));
        Ok(token)
    }

    /// Verifies a login token against a site and returns the embedded email.
    ///
    /// The signature is checked with the key derived for `site_url`, so a
    /// token generated for another site URL fails even under the same
    /// process-global secret. The embedded site URL and site id are compared
    /// as well; the redundancy costs nothing and keeps the scope check
    /// independent of the key derivation.
    ///
    /// # Errors
    ///
    /// Returns [`TokenError`] when the token is malformed, carries an invalid
    /// signature, targets a different site, or lies outside its validity
    /// window.
    pub fn verify(
        &self,
        site_id: &SiteId,
        site_url: &str,
        token: &str,
        max_age_secs: i64,
        now: i64,
    ) -> Result<String, TokenError> {
        let (payload_part, signature_part) =
            token.split_once('.').ok_or(TokenError::Malformed)?;
        let payload =
            URL_SAFE_NO_PAD.decode(payload_part).map_err(|_| TokenError::Malformed)?;
        let signature_bytes =
            URL_SAFE_NO_PAD.decode(signature_part).map_err(|_| TokenError::Malformed)?;
        let signature =
            Signature::try_from(signature_bytes.as_slice()).map_err(|_| TokenError::Malformed)?;
        let verifying_key = self.signing_key(site_url).verifying_key();
        verifying_key.verify_strict(&payload, &signature).map_err(|_| TokenError::Signature)?;
        let claims: TokenClaims =
            serde_json::from_slice(&payload).map_err(|_| TokenError::Malformed)?;
        if claims.url != site_url || claims.site != site_id.as_str() {
            return Err(TokenError::Scope);
        }
        if claims.iat > now {
            return Err(TokenError::FromFuture);
        }
        if now - claims.iat > max_age_secs {
            return Err(TokenError::Expired);
        }
        Ok(claims.email)
    }

    /// Derives the site-URL-salted signing key.
    fn signing_key(&self, site_url: &str) -> SigningKey {
        let mut hasher = Sha256::new();
        hasher.update(&self.secret);
        hasher.update([0u8]);
        hasher.update(site_url.as_bytes());
        let seed: [u8; 32] = hasher.finalize().into();
        SigningKey::from_bytes(&seed)
    }
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

    use super::LoginTokenCodec;
    use super::TokenError;
    use crate::core::identifiers::SiteId;

    const MAX_AGE: i64 = 1800;
    const NOW: i64 = 1_700_000_000;

    fn codec() -> LoginTokenCodec {
        LoginTokenCodec::new(*b"0123456789abcdef0123456789abcdef")
    }

    #[test]
    fn round_trip_returns_the_email() {
        let site = SiteId::new("site-a");
        let token = codec().issue(&site, "https://a.example", "u@example.com", NOW).unwrap();
        let email = codec().verify(&site, "https://a.example", &token, MAX_AGE, NOW + 60).unwrap();
        assert_eq!(email, "u@example.com");
    }

    #[test]
    fn token_fails_for_a_different_site_url() {
        let site = SiteId::new("site-a");
        let token = codec().issue(&site, "https://a.example", "u@example.com", NOW).unwrap();
        let result = codec().verify(&site, "https://b.example", &token, MAX_AGE, NOW + 60);
        assert_eq!(result, Err(TokenError::Signature));
    }

    #[test]
    fn token_fails_for_a_different_site_id() {
        let token = codec()
            .issue(&SiteId::new("site-a"), "https://a.example", "u@example.com", NOW)
            .unwrap();
        let result =
            codec().verify(&SiteId::new("site-b"), "https://a.example", &token, MAX_AGE, NOW + 60);
        assert_eq!(result, Err(TokenError::Scope));
    }

    #[test]
    fn token_fails_with_a_different_secret() {
        let site = SiteId::new("site-a");
        let token = codec().issue(&site, "https://a.example", "u@example.com", NOW).unwrap();
        let other = LoginTokenCodec::new(*b"fedcba9876543210fedcba9876543210");
        let result = other.verify(&site, "https://a.example", &token, MAX_AGE, NOW + 60);
        assert_eq!(result, Err(TokenError::Signature));
    }

    #[test]
    fn token_expires_after_max_age() {
        let site = SiteId::new("site-a");
        let token = codec().issue(&site, "https://a.example", "u@example.com", NOW).unwrap();
        let result = codec().verify(&site, "https://a.example", &token, MAX_AGE, NOW + MAX_AGE + 1);
        assert_eq!(result, Err(TokenError::Expired));
        let result = codec().verify(&site, "https://a.example", &token, MAX_AGE, NOW + MAX_AGE);
        assert!(result.is_ok());
    }

    #[test]
    fn token_from_the_future_is_rejected() {
        let site = SiteId::new("site-a");
        let token = codec().issue(&site, "https://a.example", "u@example.com", NOW + 120).unwrap();
        let result = codec().verify(&site, "https://a.example", &token, MAX_AGE, NOW);
        assert_eq!(result, Err(TokenError::FromFuture));
    }

    #[test]
    fn tampered_payload_is_rejected() {
        let site = SiteId::new("site-a");
        let token = codec().issue(&site, "https://a.example", "u@example.com", NOW).unwrap();
        let mut tampered = token.clone();
        tampered.replace_range(0..1, if token.starts_with('A') { "B" } else { "A" });
        let result = codec().verify(&site, "https://a.example", &tampered, MAX_AGE, NOW + 60);
        assert!(matches!(result, Err(TokenError::Signature | TokenError::Malformed)));
    }

    #[test]
    fn garbage_is_malformed() {
        let site = SiteId::new("site-a");
        assert_eq!(
            codec().verify(&site, "https://a.example", "not-a-token", MAX_AGE, NOW),
            Err(TokenError::Malformed)
        );
        assert_eq!(
            codec().verify(&site, "https://a.example", "a.b", MAX_AGE, NOW),
            Err(TokenError::Malformed)
        );
    }
}
