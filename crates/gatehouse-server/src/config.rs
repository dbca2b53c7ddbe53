// gatehouse-server/src/config.rs
// ============================================================================
// Module: Server Configuration
// Description: Configuration model for the Gatehouse server.
// Purpose: Validate bind address, secret, store, and limit settings.
// Dependencies: gatehouse-store-sqlite, serde, thiserror
// ============================================================================

//! ## Overview
//! Configuration is deserialized from TOML by the CLI and validated before
//! the server starts. Validation is strict: a bind address that does not
//! parse, a signing secret shorter than the minimum, or a `SQLite` store
//! without a path all fail fast instead of degrading at request time.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::net::SocketAddr;
use std::path::PathBuf;

use gatehouse_store_sqlite::SqliteJournalMode;
use gatehouse_store_sqlite::SqliteSyncMode;
use serde::Deserialize;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Minimum accepted signing secret length in bytes.
pub const MIN_SECRET_BYTES: usize = 32;

/// Default login-token validity window in seconds.
const DEFAULT_TOKEN_VALID_SECS: i64 = 30 * 60;

/// Default session cookie name.
const DEFAULT_SESSION_COOKIE: &str = "gatehouse_session";

/// Default CSRF cookie name.
const DEFAULT_CSRF_COOKIE: &str = "gatehouse_csrftoken";

/// Default per-site location ceiling.
const DEFAULT_LOCATIONS_PER_SITE: usize = 100;

/// Default per-site user ceiling.
const DEFAULT_USERS_PER_SITE: usize = 500;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Configuration validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A configuration value failed validation.
    #[error("config error: {0}")]
    Invalid(String),
}

// ============================================================================
// SECTION: Config Model
// ============================================================================

/// Top-level Gatehouse configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct GatehouseConfig {
    /// HTTP server settings.
    pub server: ServerConfig,
    /// Directory store settings.
    #[serde(default)]
    pub store: StoreConfig,
    /// Per-site resource ceilings.
    #[serde(default)]
    pub limits: LimitsConfig,
}

impl GatehouseConfig {
    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] naming the first invalid setting.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.server
            .bind
            .parse::<SocketAddr>()
            .map_err(|_| ConfigError::Invalid("invalid bind address".to_string()))?;
        if self.server.secret.len() < MIN_SECRET_BYTES {
            return Err(ConfigError::Invalid(format!(
                "secret must be at least {MIN_SECRET_BYTES} bytes"
            )));
        }
        if self.server.token_valid_secs <= 0 {
            return Err(ConfigError::Invalid(
                "token_valid_secs must be greater than zero".to_string(),
            ));
        }
        if self.store.store_type == StoreType::Sqlite && self.store.path.is_none() {
            return Err(ConfigError::Invalid("sqlite store requires path".to_string()));
        }
        if self.limits.locations_per_site == 0 || self.limits.users_per_site == 0 {
            return Err(ConfigError::Invalid("limits must be greater than zero".to_string()));
        }
        Ok(())
    }
}

/// HTTP server settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Bind address, `host:port`.
    pub bind: String,
    /// Process-global login-token signing secret.
    pub secret: String,
    /// Login-token validity window in seconds.
    #[serde(default = "default_token_valid_secs")]
    pub token_valid_secs: i64,
    /// Session cookie name.
    #[serde(default = "default_session_cookie")]
    pub session_cookie: String,
    /// CSRF cookie name.
    #[serde(default = "default_csrf_cookie")]
    pub csrf_cookie: String,
}

/// Directory store backend selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StoreType {
    /// In-memory store; data does not survive a restart.
    #[default]
    Memory,
    /// Durable `SQLite` store.
    Sqlite,
}

/// Directory store settings.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct StoreConfig {
    /// Store backend.
    #[serde(default, rename = "type")]
    pub store_type: StoreType,
    /// Database file path (required for `SQLite`).
    #[serde(default)]
    pub path: Option<PathBuf>,
    /// `SQLite` busy timeout in milliseconds.
    #[serde(default)]
    pub busy_timeout_ms: Option<u64>,
    /// `SQLite` journal mode.
    #[serde(default)]
    pub journal_mode: SqliteJournalMode,
    /// `SQLite` sync mode.
    #[serde(default)]
    pub sync_mode: SqliteSyncMode,
}

/// Per-site resource ceilings.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct LimitsConfig {
    /// Maximum locations a site may define.
    #[serde(default = "default_locations_per_site")]
    pub locations_per_site: usize,
    /// Maximum users a site may hold.
    #[serde(default = "default_users_per_site")]
    pub users_per_site: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            locations_per_site: DEFAULT_LOCATIONS_PER_SITE,
            users_per_site: DEFAULT_USERS_PER_SITE,
        }
    }
}

// ============================================================================
// SECTION: Defaults
// ============================================================================

/// Returns the default token validity window.
const fn default_token_valid_secs() -> i64 {
    DEFAULT_TOKEN_VALID_SECS
}

/// Returns the default session cookie name.
fn default_session_cookie() -> String {
    DEFAULT_SESSION_COOKIE.to_string()
}

/// Returns the default CSRF cookie name.
fn default_csrf_cookie() -> String {
    DEFAULT_CSRF_COOKIE.to_string()
}

/// Returns the default per-site location ceiling.
const fn default_locations_per_site() -> usize {
    DEFAULT_LOCATIONS_PER_SITE
}

/// Returns the default per-site user ceiling.
const fn default_users_per_site() -> usize {
    DEFAULT_USERS_PER_SITE
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

    use super::GatehouseConfig;
    use super::StoreType;

    fn minimal(secret: &str, bind: &str) -> GatehouseConfig {
        let toml = format!(
            "[server]\nbind = \"{bind}\"\nsecret = \"{secret}\"\n",
        );
        toml::from_str(&toml).expect("config parses")
    }

    #[test]
    fn minimal_config_parses_with_defaults() {
        let config = minimal("0123456789abcdef0123456789abcdef", "127.0.0.1:9009");
        config.validate().unwrap();
        assert_eq!(config.server.token_valid_secs, 30 * 60);
        assert_eq!(config.server.session_cookie, "gatehouse_session");
        assert_eq!(config.store.store_type, StoreType::Memory);
        assert_eq!(config.limits.locations_per_site, 100);
    }

    #[test]
    fn short_secret_is_rejected() {
        let config = minimal("short", "127.0.0.1:9009");
        assert!(config.validate().is_err());
    }

    #[test]
    fn bad_bind_address_is_rejected() {
        let config = minimal("0123456789abcdef0123456789abcdef", "not-an-address");
        assert!(config.validate().is_err());
    }

    #[test]
    fn sqlite_store_requires_a_path() {
        let toml = "\
[server]
bind = \"127.0.0.1:9009\"
secret = \"0123456789abcdef0123456789abcdef\"

[store]
type = \"sqlite\"
";
        let config: GatehouseConfig = toml::from_str(toml).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn full_config_parses() {
        let toml = "\
[server]
bind = \"127.0.0.1:9009\"
secret = \"0123456789abcdef0123456789abcdef\"
token_valid_secs = 600
session_cookie = \"sid\"
csrf_cookie = \"csrf\"

[store]
type = \"sqlite\"
path = \"/tmp/gatehouse.db\"
busy_timeout_ms = 2500
journal_mode = \"wal\"
sync_mode = \"normal\"

[limits]
locations_per_site = 10
users_per_site = 20
";
        let config: GatehouseConfig = toml::from_str(toml).unwrap();
        config.validate().unwrap();
        assert_eq!(config.server.token_valid_secs, 600);
        assert_eq!(config.store.store_type, StoreType::Sqlite);
        assert_eq!(config.limits.users_per_site, 20);
    }
}
