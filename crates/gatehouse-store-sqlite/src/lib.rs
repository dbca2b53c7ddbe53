// gatehouse-store-sqlite/src/lib.rs
// ============================================================================
// Module: Gatehouse SQLite Store Library
// Description: Durable directory store backed by SQLite.
// Purpose: Expose the SQLite store implementation and its configuration.
// Dependencies: crate::store
// ============================================================================

//! ## Overview
//! Durable [`gatehouse_core::DirectoryStore`] implementation backed by
//! `SQLite` with WAL support. See [`store`] for details.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod store;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use store::SqliteDirectoryError;
pub use store::SqliteDirectoryStore;
pub use store::SqliteJournalMode;
pub use store::SqliteStoreConfig;
pub use store::SqliteSyncMode;
