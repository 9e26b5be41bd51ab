//! Tenanted database configuration.

use serde::{Deserialize, Serialize};
use tenanted_core::TenantName;

/// The placeholder that marks where a tenant name lands in the database
/// template.
pub const TENANT_PLACEHOLDER: &str = "%{tenant}";

/// Root configuration for a family of per-tenant databases.
///
/// One `TenantedConfig` describes one tenanted "database" in the logical
/// sense: a filename template plus the pooling and pragma settings shared by
/// every tenant's physical database. It is an explicit value handed to
/// [`TenantManager::new`](crate::TenantManager::new), never process-global
/// state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenantedConfig {
    /// Database filename template. Must contain `%{tenant}`.
    pub database: String,
    /// Upper bound on concurrently cached connection pools.
    pub max_connection_pools: usize,
    /// Tenant to select automatically in interactive/local contexts.
    ///
    /// Never consulted on a data path; callers opt in explicitly.
    pub default_tenant: Option<TenantName>,
    /// Tag log output with the current tenant.
    pub log_tenant_tag: bool,
    /// Parallel-test worker identifier, suffixed onto database filenames so
    /// concurrent test processes never share a file.
    pub test_worker_id: Option<String>,
    /// Per-pool connection settings.
    pub pool: PoolOptions,
}

impl Default for TenantedConfig {
    fn default() -> Self {
        Self {
            database: String::new(),
            max_connection_pools: 50,
            default_tenant: None,
            log_tenant_tag: true,
            test_worker_id: None,
            pool: PoolOptions::default(),
        }
    }
}

impl TenantedConfig {
    /// Create a configuration for the given database template.
    pub fn new(database: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            ..Default::default()
        }
    }

    /// Check whether the template carries the tenant placeholder.
    pub fn has_tenant_placeholder(&self) -> bool {
        self.database.contains(TENANT_PLACEHOLDER)
    }

    /// Set the pool cache bound.
    pub fn with_max_connection_pools(mut self, max: usize) -> Self {
        self.max_connection_pools = max;
        self
    }

    /// Set the default tenant for interactive contexts.
    pub fn with_default_tenant(mut self, tenant: TenantName) -> Self {
        self.default_tenant = Some(tenant);
        self
    }

    /// Enable or disable tenant tags in log output.
    pub fn with_log_tenant_tag(mut self, enabled: bool) -> Self {
        self.log_tenant_tag = enabled;
        self
    }

    /// Set the parallel-test worker identifier.
    pub fn with_test_worker_id(mut self, id: impl Into<String>) -> Self {
        self.test_worker_id = Some(id.into());
        self
    }

    /// Set the per-pool connection options.
    pub fn with_pool(mut self, pool: PoolOptions) -> Self {
        self.pool = pool;
        self
    }
}

/// Connection settings applied to every tenant's pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolOptions {
    /// Maximum open connections per pool.
    pub max_connections: usize,
    /// Busy timeout in milliseconds.
    pub busy_timeout_ms: Option<u32>,
    /// Enable foreign keys.
    pub foreign_keys: bool,
    /// Journal mode.
    pub journal_mode: JournalMode,
}

impl Default for PoolOptions {
    fn default() -> Self {
        Self {
            max_connections: 5,
            busy_timeout_ms: Some(5000),
            foreign_keys: true,
            journal_mode: JournalMode::Wal,
        }
    }
}

impl PoolOptions {
    /// Set the per-pool connection bound.
    pub fn max_connections(mut self, max: usize) -> Self {
        self.max_connections = max.max(1);
        self
    }

    /// Set the busy timeout in milliseconds.
    pub fn busy_timeout(mut self, ms: u32) -> Self {
        self.busy_timeout_ms = Some(ms);
        self
    }

    /// Enable or disable foreign keys.
    pub fn foreign_keys(mut self, enabled: bool) -> Self {
        self.foreign_keys = enabled;
        self
    }

    /// Set the journal mode.
    pub fn journal_mode(mut self, mode: JournalMode) -> Self {
        self.journal_mode = mode;
        self
    }

    /// Generate the initialization SQL run on every new connection.
    pub fn init_sql(&self) -> String {
        let mut sql = String::new();

        if self.foreign_keys {
            sql.push_str("PRAGMA foreign_keys = ON;\n");
        }

        sql.push_str(&format!(
            "PRAGMA journal_mode = {};\n",
            self.journal_mode.as_pragma()
        ));

        if let Some(timeout) = self.busy_timeout_ms {
            sql.push_str(&format!("PRAGMA busy_timeout = {timeout};\n"));
        }

        sql
    }
}

/// SQLite journal mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JournalMode {
    /// DELETE - deletes journal after transaction.
    Delete,
    /// TRUNCATE - truncates journal instead of deleting.
    Truncate,
    /// PERSIST - keep journal file, zero out on commit.
    Persist,
    /// MEMORY - keep journal in memory.
    Memory,
    /// WAL - Write-Ahead Logging (best for concurrent access).
    #[default]
    Wal,
}

impl JournalMode {
    /// Get the SQLite pragma value.
    pub fn as_pragma(&self) -> &'static str {
        match self {
            Self::Delete => "DELETE",
            Self::Truncate => "TRUNCATE",
            Self::Persist => "PERSIST",
            Self::Memory => "MEMORY",
            Self::Wal => "WAL",
        }
    }
}
