//! Error types for the SQLite tenant adapter.

use tenanted_core::TenantError;
use thiserror::Error;

/// Result type alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors raised by tenant database management.
#[derive(Debug, Error)]
pub enum StorageError {
    /// A tenant protocol violation from the core layer.
    #[error(transparent)]
    Tenant(#[from] TenantError),

    /// Filesystem failure touching a tenant database or its lock file.
    #[error("tenant database I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// SQLite driver failure.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Connection pool failure (closed pool, checkout on a destroyed tenant).
    #[error("connection pool error: {0}")]
    Pool(String),

    /// The tenant database exists but has migrations that have not been run.
    #[error("tenant {tenant:?} has pending migrations")]
    PendingMigrations {
        /// The tenant whose database is out of date.
        tenant: String,
    },

    /// A migration failed to apply.
    #[error("migration error: {0}")]
    Migration(String),
}

impl StorageError {
    /// Create a pool error.
    pub fn pool(msg: impl Into<String>) -> Self {
        Self::Pool(msg.into())
    }

    /// Create a pending-migrations error for a tenant.
    pub fn pending_migrations(tenant: impl Into<String>) -> Self {
        Self::PendingMigrations {
            tenant: tenant.into(),
        }
    }

    /// Create a migration error.
    pub fn migration(msg: impl Into<String>) -> Self {
        Self::Migration(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tenant_error_conversion() {
        let err: StorageError = TenantError::NoTenant.into();
        assert!(matches!(err, StorageError::Tenant(TenantError::NoTenant)));
    }

    #[test]
    fn test_pending_migrations_display() {
        let err = StorageError::pending_migrations("acme");
        assert!(err.to_string().contains("acme"));
        assert!(err.to_string().contains("pending"));
    }
}
