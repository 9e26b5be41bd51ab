//! Tenant lifecycle and pool management.
//!
//! A [`TenantManager`] is built once per root configuration and owns the
//! moving parts: the locator that maps names to files, the registry that
//! enumerates tenants from disk, the bounded LRU cache of live pools, and
//! the migrator applied to every tenant database. All collaborators are
//! injected; nothing here is process-global.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use tenanted_core::{PoolCache, TenantContext, TenantError, TenantName};

use crate::config::TenantedConfig;
use crate::error::{StorageError, StorageResult};
use crate::lock::ReadyLock;
use crate::locator::DatabaseLocator;
use crate::migrate::Migrator;
use crate::pool::{ConnectionPool, Role, TenantPool};
use crate::registry::TenantRegistry;

/// Cache key for one tenant's pool in one role.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PoolKey {
    pub tenant: TenantName,
    pub role: Role,
}

/// Manages the databases, pools, and lifecycle of every tenant under one
/// configuration.
pub struct TenantManager {
    config: TenantedConfig,
    locator: DatabaseLocator,
    registry: TenantRegistry,
    pools: PoolCache<PoolKey, Arc<TenantPool>>,
    migrator: Arc<dyn Migrator>,
}

impl TenantManager {
    /// Build a manager from a configuration and a migrator.
    ///
    /// Fails with a configuration error when the database template lacks
    /// the tenant placeholder.
    pub fn new(config: TenantedConfig, migrator: Arc<dyn Migrator>) -> StorageResult<Self> {
        if !config.has_tenant_placeholder() {
            return Err(TenantError::configuration(format!(
                "database template {:?} must contain the %{{tenant}} placeholder",
                config.database
            ))
            .into());
        }

        // the only URI scheme this adapter serves is file:
        if let Some((scheme, _)) = config.database.split_once("://") {
            if scheme != "file" {
                return Err(TenantError::UnsupportedDatabase(scheme.to_string()).into());
            }
        }

        let locator = DatabaseLocator::new(&config);
        let registry = TenantRegistry::new(locator.clone())?;
        let pools = PoolCache::new(config.max_connection_pools);

        Ok(Self {
            config,
            locator,
            registry,
            pools,
            migrator,
        })
    }

    /// The manager's configuration.
    pub fn config(&self) -> &TenantedConfig {
        &self.config
    }

    /// The number of currently cached pools.
    pub fn pool_count(&self) -> usize {
        self.pools.len()
    }

    /// Build a context configured for this manager.
    pub fn new_context(&self) -> TenantContext {
        let mut ctx = TenantContext::new();
        ctx.set_log_tenant_tag(self.config.log_tenant_tag);
        ctx
    }

    /// The pool serving the context's current tenant.
    ///
    /// An untenanted context gets the untenanted pool, on which every data
    /// operation fails; pool construction is deferred to first tenanted
    /// access.
    pub fn connection_pool(&self, ctx: &TenantContext) -> StorageResult<ConnectionPool> {
        self.connection_pool_with_role(ctx, Role::Writing)
    }

    /// The pool for the context's current tenant in the given role.
    pub fn connection_pool_with_role(
        &self,
        ctx: &TenantContext,
        role: Role,
    ) -> StorageResult<ConnectionPool> {
        match ctx.current() {
            None => Ok(ConnectionPool::Untenanted),
            Some(tenant) => Ok(ConnectionPool::Tenanted(self.pool_for(
                tenant,
                role,
                true,
            )?)),
        }
    }

    /// Select the configured default tenant on a context.
    ///
    /// For interactive and local tooling only; returns whether a default
    /// was configured and selected.
    pub fn select_default_tenant(&self, ctx: &mut TenantContext) -> StorageResult<bool> {
        match &self.config.default_tenant {
            None => Ok(false),
            Some(tenant) => {
                ctx.set_current(tenant.clone()).map_err(StorageError::from)?;
                Ok(true)
            }
        }
    }

    /// Create a tenant's database and migrate it.
    ///
    /// Fails with [`TenantError::TenantExists`] when the tenant already
    /// exists.
    pub fn create_tenant(&self, ctx: &mut TenantContext, name: &TenantName) -> StorageResult<()> {
        self.create_tenant_with(ctx, name, false, |_| Ok(()))
            .map(|_| ())
    }

    /// Create a tenant's database unless it already exists.
    ///
    /// Returns whether this call created the tenant.
    pub fn create_tenant_if_not_exists(
        &self,
        ctx: &mut TenantContext,
        name: &TenantName,
    ) -> StorageResult<bool> {
        self.create_tenant_with(ctx, name, true, |_| Ok(()))
            .map(|(created, ())| created)
    }

    /// Create a tenant, then run `f` with the tenant selected.
    ///
    /// Creation is guarded by the database's ready-lock, making it
    /// at-most-once across threads and processes: the winner touches the
    /// file, builds the pool, and migrates; losers block on the lock and
    /// find the database already present. A failure inside the locked
    /// region removes the data file and its sidecars before propagating,
    /// so no half-created tenant is left behind.
    ///
    /// Returns whether this call created the tenant, along with `f`'s
    /// result. `f` runs even when the tenant already existed (under
    /// `if_not_exists`).
    pub fn create_tenant_with<R>(
        &self,
        ctx: &mut TenantContext,
        name: &TenantName,
        if_not_exists: bool,
        f: impl FnOnce(&mut TenantContext) -> StorageResult<R>,
    ) -> StorageResult<(bool, R)> {
        let path = self.locator.database_path_for(name);
        let mut created = false;

        if !path.exists() {
            let lock = ReadyLock::for_database(&path);
            lock.lock(|| {
                // a concurrent creator may have won the race
                if path.exists() {
                    return Ok(());
                }

                tracing::info!(tenant = %name, database = %path.display(), "creating tenant database");

                match self.setup_new_tenant(name, &path) {
                    Ok(()) => {
                        created = true;
                        Ok(())
                    }
                    Err(error) => {
                        self.discard_partial_tenant(name, &path);
                        Err(error)
                    }
                }
            })?;
        }

        if !created && !if_not_exists {
            return Err(TenantError::exists(name.as_str()).into());
        }

        let result = ctx
            .with(name.clone(), f)
            .map_err(StorageError::from)??;
        Ok((created, result))
    }

    /// Destroy a tenant's database, closing its pools first.
    ///
    /// A tenant that is not ready (absent, or mid-creation) is a no-op.
    pub fn destroy_tenant(
        &self,
        ctx: &mut TenantContext,
        name: &TenantName,
    ) -> StorageResult<()> {
        let path = self.locator.database_path_for(name);
        if !ReadyLock::for_database(&path).database_ready() {
            return Ok(());
        }

        ctx.with_swap_allowed(name.clone(), |_ctx| {
            tracing::info!(tenant = %name, database = %path.display(), "destroying tenant database");

            for role in [Role::Writing, Role::Reading] {
                let key = PoolKey {
                    tenant: name.clone(),
                    role,
                };
                if let Some(pool) = self.pools.remove(&key) {
                    // leave a marker in the tenant's own statement stream
                    let _ = pool.with_connection(|conn| {
                        conn.execute_batch("/* destroying tenant database */")?;
                        Ok(())
                    });
                    pool.close();
                }
            }

            remove_database_files(&path)
        })
        .map_err(StorageError::from)?
    }

    /// Whether a tenant's database exists and is fully created.
    pub fn tenant_ready(&self, name: &TenantName) -> bool {
        ReadyLock::for_database(self.locator.database_path_for(name)).database_ready()
    }

    /// All ready tenants, sorted by name.
    pub fn tenants(&self) -> StorageResult<Vec<TenantName>> {
        self.registry.ready_tenants()
    }

    /// Run `f` once per ready tenant, with that tenant selected.
    pub fn with_each_tenant(
        &self,
        ctx: &mut TenantContext,
        allow_swap: bool,
        mut f: impl FnMut(&mut TenantContext, &TenantName) -> StorageResult<()>,
    ) -> StorageResult<()> {
        for tenant in self.tenants()? {
            let scope = if allow_swap {
                ctx.with_swap_allowed(tenant.clone(), |ctx| f(ctx, &tenant))
            } else {
                ctx.with(tenant.clone(), |ctx| f(ctx, &tenant))
            };
            scope.map_err(StorageError::from)??;
        }
        Ok(())
    }

    /// The connection string for a tenant's database.
    pub fn database_for(&self, name: &TenantName) -> String {
        self.locator.database_for(name)
    }

    fn pool_for(
        &self,
        tenant: &TenantName,
        role: Role,
        check_pending: bool,
    ) -> StorageResult<Arc<TenantPool>> {
        let key = PoolKey {
            tenant: tenant.clone(),
            role,
        };

        let (pool, evicted) = self.pools.acquire(key, || {
            let path = self.locator.database_path_for(tenant);
            if !path.exists() {
                return Err(StorageError::from(TenantError::does_not_exist(
                    tenant.as_str(),
                )));
            }

            let pool = TenantPool::open(
                tenant.clone(),
                self.locator.database_for(tenant),
                role,
                self.config.pool.clone(),
            )?;

            if check_pending {
                let pending =
                    pool.with_connection(|conn| self.migrator.has_pending(conn))?;
                if pending {
                    pool.close();
                    return Err(StorageError::pending_migrations(tenant.as_str()));
                }
            }

            Ok(pool)
        })?;

        if let Some((key, evicted)) = evicted {
            tracing::debug!(tenant = %key.tenant, "evicting least recently used pool");
            evicted.close();
        }

        Ok(pool)
    }

    fn setup_new_tenant(&self, name: &TenantName, path: &Path) -> StorageResult<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(path)?;

        // pending checks are skipped: this pool exists to run the
        // migrations that would otherwise report as pending
        let pool = self.pool_for(name, Role::Writing, false)?;
        pool.with_connection(|conn| self.migrator.migrate(conn))
    }

    fn discard_partial_tenant(&self, name: &TenantName, path: &Path) {
        for role in [Role::Writing, Role::Reading] {
            let key = PoolKey {
                tenant: name.clone(),
                role,
            };
            if let Some(pool) = self.pools.remove(&key) {
                pool.close();
            }
        }
        if let Err(error) = remove_database_files(path) {
            tracing::warn!(
                tenant = %name,
                database = %path.display(),
                %error,
                "failed to remove partially created tenant database"
            );
        }
    }
}

impl std::fmt::Debug for TenantManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TenantManager")
            .field("config", &self.config)
            .field("pool_count", &self.pools.len())
            .finish_non_exhaustive()
    }
}

/// Remove a tenant database file along with its WAL and shared-memory
/// sidecars.
fn remove_database_files(path: &Path) -> StorageResult<()> {
    remove_if_present(path)?;
    for suffix in ["-wal", "-shm"] {
        let mut sidecar = path.as_os_str().to_owned();
        sidecar.push(suffix);
        remove_if_present(Path::new(&sidecar))?;
    }
    Ok(())
}

fn remove_if_present(path: &Path) -> StorageResult<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(error) => Err(error.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PoolOptions;
    use crate::migrate::{NoMigrations, SchemaMigrator};
    use pretty_assertions::assert_eq;

    fn name(s: &str) -> TenantName {
        TenantName::new(s).unwrap()
    }

    fn manager_in(dir: &tempfile::TempDir, migrator: Arc<dyn Migrator>) -> TenantManager {
        let template = format!("{}/db/%{{tenant}}.sqlite3", dir.path().display());
        let config = TenantedConfig::new(template)
            .with_pool(PoolOptions::default().max_connections(2));
        TenantManager::new(config, migrator).unwrap()
    }

    #[test]
    fn test_template_requires_placeholder() {
        let config = TenantedConfig::new("db/fixed.sqlite3");
        let err = TenantManager::new(config, Arc::new(NoMigrations)).unwrap_err();
        assert!(matches!(
            err,
            StorageError::Tenant(TenantError::TenantConfiguration(_))
        ));
    }

    #[test]
    fn test_non_file_scheme_is_unsupported() {
        let config = TenantedConfig::new("postgres://localhost/%{tenant}");
        let err = TenantManager::new(config, Arc::new(NoMigrations)).unwrap_err();
        assert!(matches!(
            err,
            StorageError::Tenant(TenantError::UnsupportedDatabase(_))
        ));
    }

    #[test]
    fn test_new_context_honors_log_tag() {
        let dir = tempfile::tempdir().unwrap();
        let template = format!("{}/db/%{{tenant}}.sqlite3", dir.path().display());
        let config = TenantedConfig::new(template).with_log_tenant_tag(false);
        let manager = TenantManager::new(config, Arc::new(NoMigrations)).unwrap();

        assert!(!manager.new_context().log_tenant_tag());
    }

    #[test]
    fn test_untenanted_context_gets_untenanted_pool() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager_in(&dir, Arc::new(NoMigrations));
        let ctx = TenantContext::new();

        let pool = manager.connection_pool(&ctx).unwrap();
        assert!(matches!(pool, ConnectionPool::Untenanted));
        assert_eq!(manager.pool_count(), 0);
    }

    #[test]
    fn test_pool_for_missing_tenant_fails() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager_in(&dir, Arc::new(NoMigrations));
        let mut ctx = TenantContext::new();
        ctx.set_current(name("ghost")).unwrap();

        let err = manager.connection_pool(&ctx).unwrap_err();
        assert!(matches!(
            err,
            StorageError::Tenant(TenantError::TenantDoesNotExist(_))
        ));
    }

    #[test]
    fn test_create_then_connect() {
        let dir = tempfile::tempdir().unwrap();
        let migrator = Arc::new(
            SchemaMigrator::new()
                .with_migration("0001", "CREATE TABLE widgets (id INTEGER PRIMARY KEY)"),
        );
        let manager = manager_in(&dir, migrator);
        let mut ctx = TenantContext::new();

        manager.create_tenant(&mut ctx, &name("acme")).unwrap();
        assert!(manager.tenant_ready(&name("acme")));

        ctx.set_current(name("acme")).unwrap();
        let pool = manager.connection_pool(&ctx).unwrap();
        pool.with_connection(|conn| {
            conn.execute("INSERT INTO widgets (id) VALUES (1)", [])?;
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_create_existing_tenant_fails() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager_in(&dir, Arc::new(NoMigrations));
        let mut ctx = TenantContext::new();

        manager.create_tenant(&mut ctx, &name("acme")).unwrap();
        let err = manager.create_tenant(&mut ctx, &name("acme")).unwrap_err();
        assert!(matches!(
            err,
            StorageError::Tenant(TenantError::TenantExists(_))
        ));

        // idempotent form reports "not created" instead
        let created = manager
            .create_tenant_if_not_exists(&mut ctx, &name("acme"))
            .unwrap();
        assert!(!created);
    }

    #[test]
    fn test_create_failure_leaves_no_database() {
        let dir = tempfile::tempdir().unwrap();
        let broken = Arc::new(SchemaMigrator::new().with_migration("0001", "NOT SQL"));
        let manager = manager_in(&dir, broken);
        let mut ctx = TenantContext::new();

        let err = manager.create_tenant(&mut ctx, &name("acme")).unwrap_err();
        assert!(matches!(err, StorageError::Migration(_)));
        assert!(!manager.tenant_ready(&name("acme")));
        assert!(manager.tenants().unwrap().is_empty());
        assert_eq!(manager.pool_count(), 0);
    }

    #[test]
    fn test_create_with_runs_in_tenant_scope() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager_in(&dir, Arc::new(NoMigrations));
        let mut ctx = TenantContext::new();

        let (created, seen) = manager
            .create_tenant_with(&mut ctx, &name("acme"), false, |ctx| {
                Ok(ctx.current().map(|t| t.as_str().to_owned()))
            })
            .unwrap();
        assert!(created);
        assert_eq!(seen.as_deref(), Some("acme"));
        assert!(ctx.current().is_none());
    }

    #[test]
    fn test_destroy_tenant() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager_in(&dir, Arc::new(NoMigrations));
        let mut ctx = TenantContext::new();

        manager.create_tenant(&mut ctx, &name("acme")).unwrap();
        ctx.set_current(name("acme")).unwrap();
        let pool = match manager.connection_pool(&ctx).unwrap() {
            ConnectionPool::Tenanted(pool) => pool,
            ConnectionPool::Untenanted => unreachable!(),
        };
        assert_eq!(manager.pool_count(), 1);

        ctx.set_current(tenanted_core::Tenancy::Untenanted).unwrap();
        manager.destroy_tenant(&mut ctx, &name("acme")).unwrap();
        assert!(!manager.tenant_ready(&name("acme")));
        assert_eq!(manager.pool_count(), 0);
        assert!(pool.is_closed());

        // destroying an absent tenant is a no-op
        manager.destroy_tenant(&mut ctx, &name("acme")).unwrap();
    }

    #[test]
    fn test_pending_migrations_fail_fast() {
        let dir = tempfile::tempdir().unwrap();
        let v1 = Arc::new(
            SchemaMigrator::new()
                .with_migration("0001", "CREATE TABLE widgets (id INTEGER PRIMARY KEY)"),
        );
        let manager = manager_in(&dir, v1);
        let mut ctx = TenantContext::new();
        manager.create_tenant(&mut ctx, &name("acme")).unwrap();

        // a new deployment ships an extra migration
        let v2 = Arc::new(
            SchemaMigrator::new()
                .with_migration("0001", "CREATE TABLE widgets (id INTEGER PRIMARY KEY)")
                .with_migration("0002", "CREATE TABLE gadgets (id INTEGER PRIMARY KEY)"),
        );
        let template = format!("{}/db/%{{tenant}}.sqlite3", dir.path().display());
        let manager = TenantManager::new(TenantedConfig::new(template), v2).unwrap();

        ctx.set_current(name("acme")).unwrap();
        let err = manager.connection_pool(&ctx).unwrap_err();
        assert!(matches!(err, StorageError::PendingMigrations { .. }));
    }

    #[test]
    fn test_select_default_tenant() {
        let dir = tempfile::tempdir().unwrap();
        let template = format!("{}/db/%{{tenant}}.sqlite3", dir.path().display());
        let config = TenantedConfig::new(template).with_default_tenant(name("local"));
        let manager = TenantManager::new(config, Arc::new(NoMigrations)).unwrap();

        let mut ctx = TenantContext::new();
        assert!(manager.select_default_tenant(&mut ctx).unwrap());
        assert_eq!(ctx.current().unwrap().as_str(), "local");
    }
}
