// gatehouse-cli/src/main.rs
// ============================================================================
// Module: Gatehouse CLI Entry Point
// Description: Command dispatcher for serving and site provisioning.
// Purpose: Load configuration, compose the server, and manage sites.
// Dependencies: clap, gatehouse-core, gatehouse-server, tokio, toml
// ============================================================================

//! ## Overview
//! The CLI is the composition root of a Gatehouse deployment: it loads the
//! TOML configuration, builds the directory store and server state, and
//! either serves requests or provisions sites. Provisioning a site creates
//! its aliases and, when admin emails are given, an `/admin/` location with
//! those users granted access, so the admin interface can itself be put
//! behind the authorization oracle.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use clap::Subcommand;
use gatehouse_core::DirectoryStore;
use gatehouse_core::SharedDirectoryStore;
use gatehouse_core::SiteId;
use gatehouse_server::GatehouseConfig;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Location protecting the admin interface.
const ADMIN_LOCATION_PATH: &str = "/admin/";

// ============================================================================
// SECTION: Arguments
// ============================================================================

/// Gatehouse: per-site web access control for a front-end HTTP server.
#[derive(Debug, Parser)]
#[command(name = "gatehouse", version)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, default_value = "gatehouse.toml")]
    config: PathBuf,
    /// Command to run.
    #[command(subcommand)]
    command: Command,
}

/// Top-level commands.
#[derive(Debug, Subcommand)]
enum Command {
    /// Run the authorization server.
    Serve,
    /// Manage protected sites.
    Site {
        /// Site subcommand.
        #[command(subcommand)]
        command: SiteCommand,
    },
}

/// Site management commands.
#[derive(Debug, Subcommand)]
enum SiteCommand {
    /// Create a site with its aliases and optional admin users.
    Add {
        /// Identifier of the new site.
        site_id: String,
        /// URL under which the site accepts requests; repeatable.
        #[arg(long = "alias", required = true)]
        aliases: Vec<String>,
        /// Email allowed to access the admin interface; repeatable.
        #[arg(long = "admin")]
        admins: Vec<String>,
    },
    /// List configured sites and their aliases.
    List,
    /// Delete a site and everything below it.
    Remove {
        /// Identifier of the site to delete.
        site_id: String,
    },
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// CLI errors.
#[derive(Debug, Error)]
enum CliError {
    /// Configuration could not be read or parsed.
    #[error("config error: {0}")]
    Config(String),
    /// Server failed to start or run.
    #[error("server error: {0}")]
    Server(String),
    /// Directory store operation failed.
    #[error("store error: {0}")]
    Store(String),
}

// ============================================================================
// SECTION: Entry Point
// ============================================================================

/// Process entry point.
#[allow(clippy::print_stderr, reason = "CLI errors go to stderr.")]
fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("gatehouse: {error}");
            ExitCode::FAILURE
        }
    }
}

/// Dispatches the parsed command.
fn run(cli: Cli) -> Result<(), CliError> {
    let config = load_config(&cli.config)?;
    match cli.command {
        Command::Serve => serve(config),
        Command::Site {
            command,
        } => {
            let state = gatehouse_server::build_state(config)
                .map_err(|err| CliError::Server(err.to_string()))?;
            match command {
                SiteCommand::Add {
                    site_id,
                    aliases,
                    admins,
                } => provision_site(state.store(), &SiteId::new(site_id), &aliases, &admins),
                SiteCommand::List => list_sites(state.store()),
                SiteCommand::Remove {
                    site_id,
                } => remove_site(state.store(), &SiteId::new(site_id)),
            }
        }
    }
}

/// Loads and parses the configuration file.
fn load_config(path: &PathBuf) -> Result<GatehouseConfig, CliError> {
    let raw = std::fs::read_to_string(path)
        .map_err(|err| CliError::Config(format!("{}: {err}", path.display())))?;
    let config: GatehouseConfig =
        toml::from_str(&raw).map_err(|err| CliError::Config(err.to_string()))?;
    config.validate().map_err(|err| CliError::Config(err.to_string()))?;
    Ok(config)
}

/// Runs the server on a multi-threaded runtime.
fn serve(config: GatehouseConfig) -> Result<(), CliError> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| CliError::Server(err.to_string()))?;
    runtime
        .block_on(gatehouse_server::serve(config))
        .map_err(|err| CliError::Server(err.to_string()))
}

// ============================================================================
// SECTION: Site Commands
// ============================================================================

/// Creates a site with aliases and optional admin users.
fn provision_site(
    store: &SharedDirectoryStore,
    site_id: &SiteId,
    aliases: &[String],
    admins: &[String],
) -> Result<(), CliError> {
    store.create_site(site_id).map_err(|err| CliError::Store(err.to_string()))?;
    for alias in aliases {
        store.create_alias(site_id, alias).map_err(|err| CliError::Store(err.to_string()))?;
    }
    if !admins.is_empty() {
        let location = store
            .create_location(site_id, ADMIN_LOCATION_PATH)
            .map_err(|err| CliError::Store(err.to_string()))?;
        for admin in admins {
            let user = store
                .create_user(site_id, admin)
                .map_err(|err| CliError::Store(err.to_string()))?;
            store
                .grant_access(site_id, &location.uuid, &user.uuid)
                .map_err(|err| CliError::Store(err.to_string()))?;
        }
    }
    emit(&format!(
        "site '{site_id}' created with {} alias(es) and {} admin(s)",
        aliases.len(),
        admins.len()
    ));
    Ok(())
}

/// Lists sites and their aliases.
fn list_sites(store: &SharedDirectoryStore) -> Result<(), CliError> {
    let sites = store.list_sites().map_err(|err| CliError::Store(err.to_string()))?;
    for site_id in sites {
        let aliases =
            store.list_aliases(&site_id).map_err(|err| CliError::Store(err.to_string()))?;
        let urls: Vec<&str> = aliases.iter().map(|alias| alias.url.as_str()).collect();
        emit(&format!("{site_id}: {}", urls.join(", ")));
    }
    Ok(())
}

/// Deletes a site.
fn remove_site(store: &SharedDirectoryStore, site_id: &SiteId) -> Result<(), CliError> {
    let deleted = store.delete_site(site_id).map_err(|err| CliError::Store(err.to_string()))?;
    if !deleted {
        return Err(CliError::Store(format!("site '{site_id}' not found")));
    }
    emit(&format!("site '{site_id}' deleted"));
    Ok(())
}

/// Writes one line of command output.
#[allow(clippy::print_stdout, reason = "CLI output goes to stdout.")]
fn emit(line: &str) {
    println!("{line}");
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

    use clap::CommandFactory;
    use gatehouse_core::DirectoryStore;
    use gatehouse_core::SharedDirectoryStore;
    use gatehouse_core::SiteId;
    use gatehouse_core::runtime::InMemoryDirectoryStore;

    use super::Cli;
    use super::provision_site;
    use super::remove_site;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn provision_creates_site_aliases_and_admin_acl() {
        let store = SharedDirectoryStore::from_store(InMemoryDirectoryStore::new());
        let site_id = SiteId::new("site");
        provision_site(
            &store,
            &site_id,
            &["https://site.example".to_string()],
            &["admin@example.com".to_string()],
        )
        .unwrap();
        let snapshot = store.load_snapshot(&site_id).unwrap().unwrap();
        assert!(snapshot.has_alias("https://site.example"));
        assert_eq!(snapshot.locations.len(), 1);
        assert_eq!(snapshot.locations[0].location.path, "/admin/");
        let admin = snapshot.user_by_email("admin@example.com").unwrap();
        assert!(snapshot.locations[0].allows(&admin.uuid));
    }

    #[test]
    fn provision_fails_on_duplicate_sites() {
        let store = SharedDirectoryStore::from_store(InMemoryDirectoryStore::new());
        let site_id = SiteId::new("site");
        provision_site(&store, &site_id, &["https://a.example".to_string()], &[]).unwrap();
        assert!(provision_site(&store, &site_id, &["https://b.example".to_string()], &[]).is_err());
    }

    #[test]
    fn remove_reports_missing_sites() {
        let store = SharedDirectoryStore::from_store(InMemoryDirectoryStore::new());
        assert!(remove_site(&store, &SiteId::new("ghost")).is_err());
    }
}
