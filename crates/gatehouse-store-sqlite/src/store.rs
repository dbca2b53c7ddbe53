// gatehouse-store-sqlite/src/store.rs
// ============================================================================
// Module: SQLite Directory Store
// Description: Durable DirectoryStore backed by SQLite WAL.
// Purpose: Persist sites, locations, users, permissions, and aliases.
// Dependencies: gatehouse-core, rusqlite, serde, thiserror
// ============================================================================

//! ## Overview
//! This module implements a durable [`DirectoryStore`] using `SQLite`. Every
//! mutation runs in one transaction that also bumps the owning site's
//! modification counter, so a reader can never observe new data under a
//! stale counter. Deleting a site, location, or user cascades to dependent
//! rows through foreign keys. Validation of emails, paths, and alias URLs
//! happens before the transaction starts; no partial mutation is ever left
//! visible.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;

use gatehouse_core::AliasId;
use gatehouse_core::DirectoryError;
use gatehouse_core::DirectoryStore;
use gatehouse_core::Location;
use gatehouse_core::LocationEntry;
use gatehouse_core::LocationId;
use gatehouse_core::OpenAccessMode;
use gatehouse_core::Permission;
use gatehouse_core::Site;
use gatehouse_core::SiteId;
use gatehouse_core::SiteSkin;
use gatehouse_core::SiteSnapshot;
use gatehouse_core::User;
use gatehouse_core::UserId;
use gatehouse_core::models::Alias;
use gatehouse_core::normalize_email;
use gatehouse_core::normalize_site_url;
use gatehouse_core::validate_location_path;
use rusqlite::Connection;
use rusqlite::OpenFlags;
use rusqlite::OptionalExtension;
use rusqlite::Transaction;
use rusqlite::params;
use serde::Deserialize;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// `SQLite` schema version for the store.
const SCHEMA_VERSION: i64 = 1;
/// Default busy timeout (ms).
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

// ============================================================================
// SECTION: Config
// ============================================================================

/// `SQLite` journal mode configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SqliteJournalMode {
    /// WAL journal mode (recommended).
    #[default]
    Wal,
    /// Delete journal mode (legacy).
    Delete,
}

impl SqliteJournalMode {
    /// Returns the `SQLite` pragma value.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Wal => "wal",
            Self::Delete => "delete",
        }
    }
}

/// `SQLite` sync mode configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SqliteSyncMode {
    /// Full synchronous mode (safest).
    #[default]
    Full,
    /// Normal synchronous mode (balanced).
    Normal,
}

impl SqliteSyncMode {
    /// Returns the `SQLite` pragma value.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Normal => "normal",
        }
    }
}

/// Configuration for the `SQLite` directory store.
#[derive(Debug, Clone, Deserialize)]
pub struct SqliteStoreConfig {
    /// Path to the `SQLite` database file.
    pub path: PathBuf,
    /// Busy timeout in milliseconds; bounds how long one tenant's query can
    /// stall another's.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    /// `SQLite` journal mode.
    #[serde(default)]
    pub journal_mode: SqliteJournalMode,
    /// `SQLite` sync mode.
    #[serde(default)]
    pub sync_mode: SqliteSyncMode,
}

/// Returns the default busy timeout for `SQLite` connections.
const fn default_busy_timeout_ms() -> u64 {
    DEFAULT_BUSY_TIMEOUT_MS
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// `SQLite` store initialization errors.
#[derive(Debug, Error)]
pub enum SqliteDirectoryError {
    /// Store I/O error.
    #[error("sqlite store io error: {0}")]
    Io(String),
    /// `SQLite` engine error.
    #[error("sqlite store db error: {0}")]
    Db(String),
    /// Store schema version mismatch.
    #[error("sqlite store version mismatch: {0}")]
    VersionMismatch(String),
    /// Invalid store configuration.
    #[error("sqlite store invalid config: {0}")]
    Invalid(String),
}

/// Maps an engine error to a directory store error.
fn db_err(error: &rusqlite::Error) -> DirectoryError {
    DirectoryError::Store(error.to_string())
}

// ============================================================================
// SECTION: Store
// ============================================================================

/// `SQLite`-backed directory store with WAL support.
#[derive(Clone)]
pub struct SqliteDirectoryStore {
    /// Shared `SQLite` connection guarded by a mutex.
    connection: Arc<Mutex<Connection>>,
}

impl SqliteDirectoryStore {
    /// Opens an `SQLite`-backed directory store.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteDirectoryError`] when the database cannot be opened or
    /// initialized.
    pub fn new(config: &SqliteStoreConfig) -> Result<Self, SqliteDirectoryError> {
        ensure_parent_dir(&config.path)?;
        let mut connection = open_connection(config)?;
        initialize_schema(&mut connection)?;
        Ok(Self {
            connection: Arc::new(Mutex::new(connection)),
        })
    }

    /// Runs a closure inside one committed transaction.
    fn with_transaction<T>(
        &self,
        operation: impl FnOnce(&Transaction<'_>) -> Result<T, DirectoryError>,
    ) -> Result<T, DirectoryError> {
        let mut guard = self
            .connection
            .lock()
            .map_err(|_| DirectoryError::Store("sqlite store mutex poisoned".to_string()))?;
        let tx = guard.transaction().map_err(|err| db_err(&err))?;
        let value = operation(&tx)?;
        tx.commit().map_err(|err| db_err(&err))?;
        drop(guard);
        Ok(value)
    }
}

impl DirectoryStore for SqliteDirectoryStore {
    fn create_site(&self, site_id: &SiteId) -> Result<Site, DirectoryError> {
        self.with_transaction(|tx| {
            if site_counter(tx, site_id)?.is_some() {
                return Err(DirectoryError::AlreadyExists("site".to_string()));
            }
            let skin = SiteSkin::default();
            tx.execute(
                "INSERT INTO sites (site_id, mod_counter, skin_title, skin_header, skin_message) \
                 VALUES (?1, 0, ?2, ?3, ?4)",
                params![site_id.as_str(), skin.title, skin.header, skin.message],
            )
            .map_err(|err| db_err(&err))?;
            Ok(Site {
                site_id: site_id.clone(),
                skin,
            })
        })
    }

    fn find_site(&self, site_id: &SiteId) -> Result<Option<Site>, DirectoryError> {
        self.with_transaction(|tx| load_site(tx, site_id))
    }

    fn delete_site(&self, site_id: &SiteId) -> Result<bool, DirectoryError> {
        self.with_transaction(|tx| {
            let deleted = tx
                .execute("DELETE FROM sites WHERE site_id = ?1", params![site_id.as_str()])
                .map_err(|err| db_err(&err))?;
            Ok(deleted > 0)
        })
    }

    fn list_sites(&self) -> Result<Vec<SiteId>, DirectoryError> {
        self.with_transaction(|tx| {
            let mut statement = tx
                .prepare("SELECT site_id FROM sites ORDER BY site_id")
                .map_err(|err| db_err(&err))?;
            let rows = statement
                .query_map(params![], |row| row.get::<_, String>(0))
                .map_err(|err| db_err(&err))?;
            let mut sites = Vec::new();
            for row in rows {
                sites.push(SiteId::new(row.map_err(|err| db_err(&err))?));
            }
            Ok(sites)
        })
    }

    fn site_version(&self, site_id: &SiteId) -> Result<Option<i64>, DirectoryError> {
        self.with_transaction(|tx| site_counter(tx, site_id))
    }

    fn find_site_by_alias(&self, url: &str) -> Result<Option<SiteId>, DirectoryError> {
        self.with_transaction(|tx| {
            tx.query_row("SELECT site_id FROM aliases WHERE url = ?1", params![url], |row| {
                row.get::<_, String>(0)
            })
            .optional()
            .map_err(|err| db_err(&err))
            .map(|site_id| site_id.map(SiteId::new))
        })
    }

    fn load_snapshot(&self, site_id: &SiteId) -> Result<Option<SiteSnapshot>, DirectoryError> {
        self.with_transaction(|tx| {
            let Some(site) = load_site(tx, site_id)? else {
                return Ok(None);
            };
            let Some(version) = site_counter(tx, site_id)? else {
                return Ok(None);
            };
            let aliases = load_aliases(tx, site_id)?;
            let users = load_users(tx, site_id)?;
            let locations = load_location_entries(tx, site_id)?;
            Ok(Some(SiteSnapshot {
                site,
                version,
                aliases,
                locations,
                users,
            }))
        })
    }

    fn create_alias(&self, site_id: &SiteId, url: &str) -> Result<Alias, DirectoryError> {
        let normalized =
            normalize_site_url(url).map_err(|err| DirectoryError::Invalid(err.to_string()))?;
        self.with_transaction(|tx| {
            require_site(tx, site_id)?;
            let taken = tx
                .query_row("SELECT 1 FROM aliases WHERE url = ?1", params![normalized], |_| Ok(()))
                .optional()
                .map_err(|err| db_err(&err))?;
            if taken.is_some() {
                return Err(DirectoryError::AlreadyExists("alias".to_string()));
            }
            let alias = Alias {
                uuid: AliasId::random(),
                site_id: site_id.clone(),
                url: normalized.clone(),
            };
            tx.execute(
                "INSERT INTO aliases (uuid, site_id, url) VALUES (?1, ?2, ?3)",
                params![alias.uuid.as_str(), site_id.as_str(), normalized],
            )
            .map_err(|err| db_err(&err))?;
            bump_site(tx, site_id)?;
            Ok(alias)
        })
    }

    fn find_alias(
        &self,
        site_id: &SiteId,
        alias_id: &AliasId,
    ) -> Result<Option<Alias>, DirectoryError> {
        self.with_transaction(|tx| {
            tx.query_row(
                "SELECT url FROM aliases WHERE uuid = ?1 AND site_id = ?2",
                params![alias_id.as_str(), site_id.as_str()],
                |row| row.get::<_, String>(0),
            )
            .optional()
            .map_err(|err| db_err(&err))
            .map(|url| {
                url.map(|url| Alias {
                    uuid: alias_id.clone(),
                    site_id: site_id.clone(),
                    url,
                })
            })
        })
    }

    fn delete_alias(&self, site_id: &SiteId, alias_id: &AliasId) -> Result<bool, DirectoryError> {
        self.with_transaction(|tx| {
            require_site(tx, site_id)?;
            let deleted = tx
                .execute(
                    "DELETE FROM aliases WHERE uuid = ?1 AND site_id = ?2",
                    params![alias_id.as_str(), site_id.as_str()],
                )
                .map_err(|err| db_err(&err))?;
            if deleted > 0 {
                bump_site(tx, site_id)?;
            }
            Ok(deleted > 0)
        })
    }

    fn list_aliases(&self, site_id: &SiteId) -> Result<Vec<Alias>, DirectoryError> {
        self.with_transaction(|tx| load_aliases(tx, site_id))
    }

    fn create_location(&self, site_id: &SiteId, path: &str) -> Result<Location, DirectoryError> {
        validate_location_path(path).map_err(|err| DirectoryError::Invalid(err.to_string()))?;
        self.with_transaction(|tx| {
            require_site(tx, site_id)?;
            let taken = tx
                .query_row(
                    "SELECT 1 FROM locations WHERE site_id = ?1 AND path = ?2",
                    params![site_id.as_str(), path],
                    |_| Ok(()),
                )
                .optional()
                .map_err(|err| db_err(&err))?;
            if taken.is_some() {
                return Err(DirectoryError::AlreadyExists("location".to_string()));
            }
            let location = Location {
                uuid: LocationId::random(),
                site_id: site_id.clone(),
                path: path.to_string(),
                open_access: OpenAccessMode::Disabled,
            };
            tx.execute(
                "INSERT INTO locations (uuid, site_id, path, open_access) VALUES (?1, ?2, ?3, ?4)",
                params![
                    location.uuid.as_str(),
                    site_id.as_str(),
                    path,
                    location.open_access.label()
                ],
            )
            .map_err(|err| db_err(&err))?;
            bump_site(tx, site_id)?;
            Ok(location)
        })
    }

    fn find_location(
        &self,
        site_id: &SiteId,
        location_id: &LocationId,
    ) -> Result<Option<Location>, DirectoryError> {
        self.with_transaction(|tx| load_location(tx, site_id, location_id))
    }

    fn delete_location(
        &self,
        site_id: &SiteId,
        location_id: &LocationId,
    ) -> Result<bool, DirectoryError> {
        self.with_transaction(|tx| {
            require_site(tx, site_id)?;
            let deleted = tx
                .execute(
                    "DELETE FROM locations WHERE uuid = ?1 AND site_id = ?2",
                    params![location_id.as_str(), site_id.as_str()],
                )
                .map_err(|err| db_err(&err))?;
            if deleted > 0 {
                bump_site(tx, site_id)?;
            }
            Ok(deleted > 0)
        })
    }

    fn list_locations(&self, site_id: &SiteId) -> Result<Vec<Location>, DirectoryError> {
        self.with_transaction(|tx| {
            let entries = load_location_entries(tx, site_id)?;
            Ok(entries.into_iter().map(|entry| entry.location).collect())
        })
    }

    fn set_open_access(
        &self,
        site_id: &SiteId,
        location_id: &LocationId,
        mode: OpenAccessMode,
    ) -> Result<Location, DirectoryError> {
        self.with_transaction(|tx| {
            let location = load_location(tx, site_id, location_id)?
                .ok_or_else(|| DirectoryError::NotFound("location".to_string()))?;
            if location.open_access == mode {
                return Ok(location);
            }
            tx.execute(
                "UPDATE locations SET open_access = ?1 WHERE uuid = ?2 AND site_id = ?3",
                params![mode.label(), location_id.as_str(), site_id.as_str()],
            )
            .map_err(|err| db_err(&err))?;
            bump_site(tx, site_id)?;
            Ok(Location {
                open_access: mode,
                ..location
            })
        })
    }

    fn create_user(&self, site_id: &SiteId, email: &str) -> Result<User, DirectoryError> {
        let normalized = normalize_email(email)
            .ok_or_else(|| DirectoryError::Invalid("invalid email format".to_string()))?;
        self.with_transaction(|tx| {
            require_site(tx, site_id)?;
            let taken = tx
                .query_row(
                    "SELECT 1 FROM users WHERE site_id = ?1 AND email = ?2",
                    params![site_id.as_str(), normalized],
                    |_| Ok(()),
                )
                .optional()
                .map_err(|err| db_err(&err))?;
            if taken.is_some() {
                return Err(DirectoryError::AlreadyExists("user".to_string()));
            }
            let user = User {
                uuid: UserId::random(),
                site_id: site_id.clone(),
                email: normalized.clone(),
            };
            tx.execute(
                "INSERT INTO users (uuid, site_id, email) VALUES (?1, ?2, ?3)",
                params![user.uuid.as_str(), site_id.as_str(), normalized],
            )
            .map_err(|err| db_err(&err))?;
            bump_site(tx, site_id)?;
            Ok(user)
        })
    }

    fn find_user(
        &self,
        site_id: &SiteId,
        user_id: &UserId,
    ) -> Result<Option<User>, DirectoryError> {
        self.with_transaction(|tx| load_user(tx, site_id, user_id))
    }

    fn find_user_by_email(
        &self,
        site_id: &SiteId,
        email: &str,
    ) -> Result<Option<User>, DirectoryError> {
        let Some(normalized) = normalize_email(email) else {
            return Ok(None);
        };
        self.with_transaction(|tx| {
            tx.query_row(
                "SELECT uuid FROM users WHERE site_id = ?1 AND email = ?2",
                params![site_id.as_str(), normalized],
                |row| row.get::<_, String>(0),
            )
            .optional()
            .map_err(|err| db_err(&err))
            .map(|uuid| {
                uuid.map(|uuid| User {
                    uuid: UserId::new(uuid),
                    site_id: site_id.clone(),
                    email: normalized.clone(),
                })
            })
        })
    }

    fn delete_user(&self, site_id: &SiteId, user_id: &UserId) -> Result<bool, DirectoryError> {
        self.with_transaction(|tx| {
            require_site(tx, site_id)?;
            let deleted = tx
                .execute(
                    "DELETE FROM users WHERE uuid = ?1 AND site_id = ?2",
                    params![user_id.as_str(), site_id.as_str()],
                )
                .map_err(|err| db_err(&err))?;
            if deleted > 0 {
                bump_site(tx, site_id)?;
            }
            Ok(deleted > 0)
        })
    }

    fn list_users(&self, site_id: &SiteId) -> Result<Vec<User>, DirectoryError> {
        self.with_transaction(|tx| load_users(tx, site_id))
    }

    fn grant_access(
        &self,
        site_id: &SiteId,
        location_id: &LocationId,
        user_id: &UserId,
    ) -> Result<(Permission, bool), DirectoryError> {
        self.with_transaction(|tx| {
            require_pair(tx, site_id, location_id, user_id)?;
            let permission = Permission {
                location_id: location_id.clone(),
                user_id: user_id.clone(),
            };
            if permission_exists(tx, location_id, user_id)? {
                return Ok((permission, false));
            }
            tx.execute(
                "INSERT INTO permissions (location_uuid, user_uuid) VALUES (?1, ?2)",
                params![location_id.as_str(), user_id.as_str()],
            )
            .map_err(|err| db_err(&err))?;
            bump_site(tx, site_id)?;
            Ok((permission, true))
        })
    }

    fn revoke_access(
        &self,
        site_id: &SiteId,
        location_id: &LocationId,
        user_id: &UserId,
    ) -> Result<(), DirectoryError> {
        self.with_transaction(|tx| {
            require_pair(tx, site_id, location_id, user_id)?;
            let deleted = tx
                .execute(
                    "DELETE FROM permissions WHERE location_uuid = ?1 AND user_uuid = ?2",
                    params![location_id.as_str(), user_id.as_str()],
                )
                .map_err(|err| db_err(&err))?;
            if deleted == 0 {
                return Err(DirectoryError::NotFound("permission".to_string()));
            }
            bump_site(tx, site_id)?;
            Ok(())
        })
    }

    fn find_permission(
        &self,
        site_id: &SiteId,
        location_id: &LocationId,
        user_id: &UserId,
    ) -> Result<Option<Permission>, DirectoryError> {
        self.with_transaction(|tx| {
            require_pair(tx, site_id, location_id, user_id)?;
            if permission_exists(tx, location_id, user_id)? {
                Ok(Some(Permission {
                    location_id: location_id.clone(),
                    user_id: user_id.clone(),
                }))
            } else {
                Ok(None)
            }
        })
    }
}

// ============================================================================
// SECTION: Row Helpers
// ============================================================================

/// Reads a site's modification counter.
fn site_counter(tx: &Transaction<'_>, site_id: &SiteId) -> Result<Option<i64>, DirectoryError> {
    tx.query_row(
        "SELECT mod_counter FROM sites WHERE site_id = ?1",
        params![site_id.as_str()],
        |row| row.get(0),
    )
    .optional()
    .map_err(|err| db_err(&err))
}

/// Fails when a site does not exist.
fn require_site(tx: &Transaction<'_>, site_id: &SiteId) -> Result<(), DirectoryError> {
    site_counter(tx, site_id)?
        .map(|_| ())
        .ok_or_else(|| DirectoryError::NotFound("site".to_string()))
}

/// Fails when a location or user is missing from a site.
fn require_pair(
    tx: &Transaction<'_>,
    site_id: &SiteId,
    location_id: &LocationId,
    user_id: &UserId,
) -> Result<(), DirectoryError> {
    if load_location(tx, site_id, location_id)?.is_none() {
        return Err(DirectoryError::NotFound("location".to_string()));
    }
    if load_user(tx, site_id, user_id)?.is_none() {
        return Err(DirectoryError::NotFound("user".to_string()));
    }
    Ok(())
}

/// Bumps a site's modification counter with wraparound.
fn bump_site(tx: &Transaction<'_>, site_id: &SiteId) -> Result<(), DirectoryError> {
    let current = site_counter(tx, site_id)?
        .ok_or_else(|| DirectoryError::NotFound("site".to_string()))?;
    tx.execute(
        "UPDATE sites SET mod_counter = ?2 WHERE site_id = ?1",
        params![site_id.as_str(), current.wrapping_add(1)],
    )
    .map_err(|err| db_err(&err))?;
    Ok(())
}

/// Loads a site record.
fn load_site(tx: &Transaction<'_>, site_id: &SiteId) -> Result<Option<Site>, DirectoryError> {
    tx.query_row(
        "SELECT skin_title, skin_header, skin_message FROM sites WHERE site_id = ?1",
        params![site_id.as_str()],
        |row| {
            Ok(SiteSkin {
                title: row.get(0)?,
                header: row.get(1)?,
                message: row.get(2)?,
            })
        },
    )
    .optional()
    .map_err(|err| db_err(&err))
    .map(|skin| {
        skin.map(|skin| Site {
            site_id: site_id.clone(),
            skin,
        })
    })
}

/// Loads a location scoped to a site.
fn load_location(
    tx: &Transaction<'_>,
    site_id: &SiteId,
    location_id: &LocationId,
) -> Result<Option<Location>, DirectoryError> {
    let row = tx
        .query_row(
            "SELECT path, open_access FROM locations WHERE uuid = ?1 AND site_id = ?2",
            params![location_id.as_str(), site_id.as_str()],
            |row| {
                let path: String = row.get(0)?;
                let label: String = row.get(1)?;
                Ok((path, label))
            },
        )
        .optional()
        .map_err(|err| db_err(&err))?;
    row.map(|(path, label)| {
        let open_access = parse_open_access(&label)?;
        Ok(Location {
            uuid: location_id.clone(),
            site_id: site_id.clone(),
            path,
            open_access,
        })
    })
    .transpose()
}

/// Loads a user scoped to a site.
fn load_user(
    tx: &Transaction<'_>,
    site_id: &SiteId,
    user_id: &UserId,
) -> Result<Option<User>, DirectoryError> {
    tx.query_row(
        "SELECT email FROM users WHERE uuid = ?1 AND site_id = ?2",
        params![user_id.as_str(), site_id.as_str()],
        |row| row.get::<_, String>(0),
    )
    .optional()
    .map_err(|err| db_err(&err))
    .map(|email| {
        email.map(|email| User {
            uuid: user_id.clone(),
            site_id: site_id.clone(),
            email,
        })
    })
}

/// Loads the aliases of a site.
fn load_aliases(tx: &Transaction<'_>, site_id: &SiteId) -> Result<Vec<Alias>, DirectoryError> {
    let mut statement = tx
        .prepare("SELECT uuid, url FROM aliases WHERE site_id = ?1 ORDER BY url")
        .map_err(|err| db_err(&err))?;
    let rows = statement
        .query_map(params![site_id.as_str()], |row| {
            let uuid: String = row.get(0)?;
            let url: String = row.get(1)?;
            Ok((uuid, url))
        })
        .map_err(|err| db_err(&err))?;
    let mut aliases = Vec::new();
    for row in rows {
        let (uuid, url) = row.map_err(|err| db_err(&err))?;
        aliases.push(Alias {
            uuid: AliasId::new(uuid),
            site_id: site_id.clone(),
            url,
        });
    }
    Ok(aliases)
}

/// Loads the users of a site.
fn load_users(tx: &Transaction<'_>, site_id: &SiteId) -> Result<Vec<User>, DirectoryError> {
    let mut statement = tx
        .prepare("SELECT uuid, email FROM users WHERE site_id = ?1 ORDER BY email")
        .map_err(|err| db_err(&err))?;
    let rows = statement
        .query_map(params![site_id.as_str()], |row| {
            let uuid: String = row.get(0)?;
            let email: String = row.get(1)?;
            Ok((uuid, email))
        })
        .map_err(|err| db_err(&err))?;
    let mut users = Vec::new();
    for row in rows {
        let (uuid, email) = row.map_err(|err| db_err(&err))?;
        users.push(User {
            uuid: UserId::new(uuid),
            site_id: site_id.clone(),
            email,
        });
    }
    Ok(users)
}

/// Loads the locations of a site with their granted user sets.
fn load_location_entries(
    tx: &Transaction<'_>,
    site_id: &SiteId,
) -> Result<Vec<LocationEntry>, DirectoryError> {
    let mut grants: BTreeMap<String, BTreeSet<UserId>> = BTreeMap::new();
    {
        let mut statement = tx
            .prepare(
                "SELECT p.location_uuid, p.user_uuid FROM permissions p \
                 JOIN locations l ON l.uuid = p.location_uuid WHERE l.site_id = ?1",
            )
            .map_err(|err| db_err(&err))?;
        let rows = statement
            .query_map(params![site_id.as_str()], |row| {
                let location_uuid: String = row.get(0)?;
                let user_uuid: String = row.get(1)?;
                Ok((location_uuid, user_uuid))
            })
            .map_err(|err| db_err(&err))?;
        for row in rows {
            let (location_uuid, user_uuid) = row.map_err(|err| db_err(&err))?;
            grants.entry(location_uuid).or_default().insert(UserId::new(user_uuid));
        }
    }
    let mut statement = tx
        .prepare("SELECT uuid, path, open_access FROM locations WHERE site_id = ?1 ORDER BY path")
        .map_err(|err| db_err(&err))?;
    let rows = statement
        .query_map(params![site_id.as_str()], |row| {
            let uuid: String = row.get(0)?;
            let path: String = row.get(1)?;
            let label: String = row.get(2)?;
            Ok((uuid, path, label))
        })
        .map_err(|err| db_err(&err))?;
    let mut entries = Vec::new();
    for row in rows {
        let (uuid, path, label) = row.map_err(|err| db_err(&err))?;
        let open_access = parse_open_access(&label)?;
        let allowed = grants.remove(&uuid).unwrap_or_default();
        entries.push(LocationEntry {
            location: Location {
                uuid: LocationId::new(uuid),
                site_id: site_id.clone(),
                path,
                open_access,
            },
            allowed,
        });
    }
    Ok(entries)
}

/// Returns true when a permission edge exists.
fn permission_exists(
    tx: &Transaction<'_>,
    location_id: &LocationId,
    user_id: &UserId,
) -> Result<bool, DirectoryError> {
    tx.query_row(
        "SELECT 1 FROM permissions WHERE location_uuid = ?1 AND user_uuid = ?2",
        params![location_id.as_str(), user_id.as_str()],
        |_| Ok(()),
    )
    .optional()
    .map_err(|err| db_err(&err))
    .map(|found| found.is_some())
}

/// Parses a stored open-access label, failing closed on corruption.
fn parse_open_access(label: &str) -> Result<OpenAccessMode, DirectoryError> {
    OpenAccessMode::parse_label(label)
        .ok_or_else(|| DirectoryError::Store(format!("corrupt open_access label: {label}")))
}

// ============================================================================
// SECTION: Connection Helpers
// ============================================================================

/// Ensures the parent directory for the store exists.
fn ensure_parent_dir(path: &Path) -> Result<(), SqliteDirectoryError> {
    let Some(parent) = path.parent() else {
        return Err(SqliteDirectoryError::Io(
            "store path missing parent directory".to_string(),
        ));
    };
    if parent.as_os_str().is_empty() {
        return Ok(());
    }
    std::fs::create_dir_all(parent).map_err(|err| SqliteDirectoryError::Io(err.to_string()))
}

/// Opens an `SQLite` connection with the configured pragmas.
fn open_connection(config: &SqliteStoreConfig) -> Result<Connection, SqliteDirectoryError> {
    if config.path.exists() && config.path.is_dir() {
        return Err(SqliteDirectoryError::Invalid(
            "store path must be a file, not a directory".to_string(),
        ));
    }
    let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
        | OpenFlags::SQLITE_OPEN_CREATE
        | OpenFlags::SQLITE_OPEN_FULL_MUTEX;
    let connection = Connection::open_with_flags(&config.path, flags)
        .map_err(|err| SqliteDirectoryError::Db(err.to_string()))?;
    connection
        .execute_batch("PRAGMA foreign_keys = ON;")
        .map_err(|err| SqliteDirectoryError::Db(err.to_string()))?;
    connection
        .execute_batch(&format!("PRAGMA journal_mode = {};", config.journal_mode.pragma_value()))
        .map_err(|err| SqliteDirectoryError::Db(err.to_string()))?;
    connection
        .execute_batch(&format!("PRAGMA synchronous = {};", config.sync_mode.pragma_value()))
        .map_err(|err| SqliteDirectoryError::Db(err.to_string()))?;
    connection
        .busy_timeout(std::time::Duration::from_millis(config.busy_timeout_ms))
        .map_err(|err| SqliteDirectoryError::Db(err.to_string()))?;
    Ok(connection)
}

/// Initializes the `SQLite` schema or validates the existing version.
fn initialize_schema(connection: &mut Connection) -> Result<(), SqliteDirectoryError> {
    let tx =
        connection.transaction().map_err(|err| SqliteDirectoryError::Db(err.to_string()))?;
    tx.execute_batch("CREATE TABLE IF NOT EXISTS store_meta (version INTEGER NOT NULL);")
        .map_err(|err| SqliteDirectoryError::Db(err.to_string()))?;
    let version: Option<i64> = tx
        .query_row("SELECT version FROM store_meta LIMIT 1", params![], |row| row.get(0))
        .optional()
        .map_err(|err| SqliteDirectoryError::Db(err.to_string()))?;
    match version {
        None => {
            tx.execute("INSERT INTO store_meta (version) VALUES (?1)", params![SCHEMA_VERSION])
                .map_err(|err| SqliteDirectoryError::Db(err.to_string()))?;
            tx.execute_batch(
                "CREATE TABLE IF NOT EXISTS sites (
                    site_id TEXT PRIMARY KEY,
                    mod_counter INTEGER NOT NULL DEFAULT 0,
                    skin_title TEXT NOT NULL,
                    skin_header TEXT NOT NULL,
                    skin_message TEXT NOT NULL
                );
                CREATE TABLE IF NOT EXISTS aliases (
                    uuid TEXT PRIMARY KEY,
                    site_id TEXT NOT NULL
                        REFERENCES sites(site_id) ON DELETE CASCADE,
                    url TEXT NOT NULL UNIQUE
                );
                CREATE INDEX IF NOT EXISTS idx_aliases_site_id ON aliases (site_id);
                CREATE TABLE IF NOT EXISTS locations (
                    uuid TEXT PRIMARY KEY,
                    site_id TEXT NOT NULL
                        REFERENCES sites(site_id) ON DELETE CASCADE,
                    path TEXT NOT NULL,
                    open_access TEXT NOT NULL DEFAULT 'disabled',
                    UNIQUE (site_id, path)
                );
                CREATE INDEX IF NOT EXISTS idx_locations_site_id ON locations (site_id);
                CREATE TABLE IF NOT EXISTS users (
                    uuid TEXT PRIMARY KEY,
                    site_id TEXT NOT NULL
                        REFERENCES sites(site_id) ON DELETE CASCADE,
                    email TEXT NOT NULL,
                    UNIQUE (site_id, email)
                );
                CREATE INDEX IF NOT EXISTS idx_users_site_id ON users (site_id);
                CREATE TABLE IF NOT EXISTS permissions (
                    location_uuid TEXT NOT NULL
                        REFERENCES locations(uuid) ON DELETE CASCADE,
                    user_uuid TEXT NOT NULL
                        REFERENCES users(uuid) ON DELETE CASCADE,
                    PRIMARY KEY (location_uuid, user_uuid)
                );",
            )
            .map_err(|err| SqliteDirectoryError::Db(err.to_string()))?;
        }
        Some(value) if value == SCHEMA_VERSION => {}
        Some(value) => {
            return Err(SqliteDirectoryError::VersionMismatch(format!(
                "unsupported schema version: {value}"
            )));
        }
    }
    tx.commit().map_err(|err| SqliteDirectoryError::Db(err.to_string()))?;
    Ok(())
}
