//! # tenanted-sqlite
//!
//! SQLite database-per-tenant storage: one database file per tenant, with
//! lifecycle, pooling, and migration managed per tenant.
//!
//! Built on the primitives in `tenanted-core`, this crate owns everything
//! SQLite-specific:
//! - Location of tenant databases from a `%{tenant}` filename template
//!   ([`DatabaseLocator`])
//! - The ready-lock protocol making tenant creation at-most-once across
//!   threads and processes ([`ReadyLock`])
//! - Tenant discovery from the filesystem ([`TenantRegistry`])
//! - Bounded per-tenant connection pools ([`TenantPool`]) cached under an
//!   LRU bound
//! - Per-tenant schema migration ([`Migrator`], [`SchemaMigrator`])
//! - The [`TenantManager`] front door tying it all together
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tenanted_core::{TenantContext, TenantName};
//! use tenanted_sqlite::{SchemaMigrator, TenantManager, TenantedConfig};
//!
//! let migrator = Arc::new(
//!     SchemaMigrator::new()
//!         .with_migration("0001_widgets", "CREATE TABLE widgets (id INTEGER PRIMARY KEY)"),
//! );
//! let config = TenantedConfig::new("db/production/%{tenant}.sqlite3");
//! let manager = TenantManager::new(config, migrator)?;
//!
//! let acme = TenantName::new("acme")?;
//! let mut ctx = TenantContext::new();
//! manager.create_tenant(&mut ctx, &acme)?;
//!
//! ctx.with(acme, |ctx| {
//!     let pool = manager.connection_pool(ctx)?;
//!     pool.with_connection(|conn| {
//!         conn.execute("INSERT INTO widgets (id) VALUES (1)", [])?;
//!         Ok(())
//!     })
//! })??;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod config;
pub mod error;
pub mod lock;
pub mod locator;
pub mod manager;
pub mod migrate;
pub mod pool;
pub mod registry;

pub use config::{JournalMode, PoolOptions, TENANT_PLACEHOLDER, TenantedConfig};
pub use error::{StorageError, StorageResult};
pub use lock::ReadyLock;
pub use locator::DatabaseLocator;
pub use manager::{PoolKey, TenantManager};
pub use migrate::{Migration, Migrator, NoMigrations, SchemaMigrator};
pub use pool::{ConnectionPool, PoolStats, Role, TenantPool};
pub use registry::TenantRegistry;
