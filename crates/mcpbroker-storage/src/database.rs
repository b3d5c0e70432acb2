//! Database manager for SQLite storage.
//!
//! Secret fields are encrypted at the application level by the
//! `encryption` module before they reach SQLite.
//!
//! ## Migration System
//!
//! Migrations are numbered sequentially (001, 002, ...) and stored in the
//! `migrations/` directory. Each migration runs exactly once, tracked via
//! the `schema_migrations` table.

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::Connection;
use std::path::Path;
use tracing::{debug, info};

/// A database migration with version number and SQL content.
struct Migration {
    version: i64,
    name: &'static str,
    sql: &'static str,
}

/// All migrations in order. Add new migrations here.
const MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    name: "initial",
    sql: include_str!("migrations/001_initial.sql"),
}];

/// SQLite database wrapper.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open a database at the given path, creating it if needed.
    ///
    /// All pending migrations are applied.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create database directory: {:?}", parent))?;
        }

        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database at {:?}", path))?;

        conn.pragma_update(None, "foreign_keys", "ON")?;
        // WAL lets readers proceed while a writer holds the lock
        conn.pragma_update(None, "journal_mode", "WAL")?;

        debug!("Opened database at {:?}", path);

        let db = Self { conn };
        db.run_migrations()?;

        Ok(db)
    }

    /// Open an in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.pragma_update(None, "foreign_keys", "ON")?;

        debug!("Opened in-memory database");

        let db = Self { conn };
        db.run_migrations()?;

        Ok(db)
    }

    fn run_migrations(&self) -> Result<()> {
        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS schema_migrations (
                version INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                applied_at TEXT NOT NULL
            )",
            [],
        )?;

        let current_version = self.schema_version()?;

        info!(
            "Current database schema version: {}, latest available: {}",
            current_version,
            MIGRATIONS.last().map(|m| m.version).unwrap_or(0)
        );

        for migration in MIGRATIONS {
            if migration.version <= current_version {
                continue;
            }

            info!(
                "Running migration {} ({})...",
                migration.version, migration.name
            );

            let tx = self.conn.unchecked_transaction()?;

            self.conn.execute_batch(migration.sql).with_context(|| {
                format!(
                    "Failed to run migration {} ({})",
                    migration.version, migration.name
                )
            })?;

            self.conn.execute(
                "INSERT OR REPLACE INTO schema_migrations (version, name, applied_at) VALUES (?1, ?2, ?3)",
                rusqlite::params![migration.version, migration.name, timestamp(&Utc::now())],
            )?;

            tx.commit()?;

            info!(
                "Migration {} ({}) completed successfully",
                migration.version, migration.name
            );
        }

        Ok(())
    }

    /// Current schema version (highest applied migration).
    pub fn schema_version(&self) -> Result<i64> {
        Ok(self.conn.query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
            [],
            |row| row.get(0),
        )?)
    }

    /// Get a reference to the underlying connection.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Execute a closure within a transaction.
    pub fn transaction<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let tx = self.conn.unchecked_transaction()?;
        let result = f(&self.conn)?;
        tx.commit()?;
        Ok(result)
    }
}

/// Storage format for timestamps.
///
/// Fixed microsecond precision with a `Z` suffix keeps string order equal
/// to time order, which the TTL queries rely on.
pub fn timestamp(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse a stored timestamp.
pub fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(s)
        .with_context(|| format!("Invalid timestamp in database: {}", s))?
        .with_timezone(&Utc))
}
