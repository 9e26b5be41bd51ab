//! Schema migration for tenant databases.
//!
//! Every tenant database carries the same schema, so migration is a
//! collaborator the manager applies per tenant: once at creation, and as a
//! fail-fast pending check whenever a pool is built for an existing tenant.

use std::collections::HashSet;

use rusqlite::Connection;

use crate::error::{StorageError, StorageResult};

/// Applies and inspects schema state on one tenant's database.
pub trait Migrator: Send + Sync {
    /// Bring the connected database fully up to date.
    fn migrate(&self, conn: &mut Connection) -> StorageResult<()>;

    /// Whether the connected database has unapplied schema changes.
    fn has_pending(&self, conn: &mut Connection) -> StorageResult<bool>;
}

/// A migrator for databases that carry no schema at all.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoMigrations;

impl Migrator for NoMigrations {
    fn migrate(&self, _conn: &mut Connection) -> StorageResult<()> {
        Ok(())
    }

    fn has_pending(&self, _conn: &mut Connection) -> StorageResult<bool> {
        Ok(false)
    }
}

/// One versioned schema change.
#[derive(Debug, Clone)]
pub struct Migration {
    /// Ordering key, recorded once applied.
    pub version: String,
    /// The SQL to run.
    pub sql: String,
}

/// Ordered, versioned SQL migrations recorded in a `schema_migrations`
/// table.
///
/// Versions already present in the table are skipped; each pending
/// migration runs in its own transaction together with the version insert,
/// so a failed migration leaves no partial record.
#[derive(Debug, Clone, Default)]
pub struct SchemaMigrator {
    migrations: Vec<Migration>,
}

impl SchemaMigrator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a migration. Versions must be unique.
    pub fn with_migration(mut self, version: impl Into<String>, sql: impl Into<String>) -> Self {
        self.migrations.push(Migration {
            version: version.into(),
            sql: sql.into(),
        });
        self
    }

    fn ensure_history_table(conn: &Connection) -> StorageResult<()> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS schema_migrations (version TEXT PRIMARY KEY)",
        )?;
        Ok(())
    }

    fn history_table_exists(conn: &Connection) -> StorageResult<bool> {
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'schema_migrations'",
            [],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    fn applied_versions(conn: &Connection) -> StorageResult<HashSet<String>> {
        let mut stmt = conn.prepare("SELECT version FROM schema_migrations")?;
        let versions = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<HashSet<_>, _>>()?;
        Ok(versions)
    }
}

impl Migrator for SchemaMigrator {
    fn migrate(&self, conn: &mut Connection) -> StorageResult<()> {
        Self::ensure_history_table(conn)?;
        let applied = Self::applied_versions(conn)?;

        for migration in &self.migrations {
            if applied.contains(&migration.version) {
                continue;
            }

            let tx = conn.transaction()?;
            tx.execute_batch(&migration.sql).map_err(|error| {
                StorageError::migration(format!(
                    "migration {} failed: {error}",
                    migration.version
                ))
            })?;
            tx.execute(
                "INSERT INTO schema_migrations (version) VALUES (?1)",
                [&migration.version],
            )?;
            tx.commit()?;

            tracing::info!(version = %migration.version, "applied migration");
        }

        Ok(())
    }

    fn has_pending(&self, conn: &mut Connection) -> StorageResult<bool> {
        // read-only probe: never creates the history table
        if !Self::history_table_exists(conn)? {
            return Ok(!self.migrations.is_empty());
        }

        let applied = Self::applied_versions(conn)?;
        Ok(self
            .migrations
            .iter()
            .any(|migration| !applied.contains(&migration.version)))
    }
}
