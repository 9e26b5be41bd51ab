//! Per-tenant connection pools.
//!
//! Each pool owns every live connection to exactly one tenant's database
//! and is stamped with that tenant's name; a connection can never serve a
//! query for any other tenant. Checkout is bounded: once `max_connections`
//! are out, further callers block on a condvar until a connection returns.
//!
//! Closing a pool (eviction from the cache, tenant destruction) is
//! cooperative: idle connections are dropped immediately, while checked-out
//! connections finish their closure and are dropped when returned instead
//! of rejoining the idle set.

use std::sync::Arc;

use parking_lot::{Condvar, Mutex};
use rusqlite::{Connection, OpenFlags};

use tenanted_core::{TenantError, TenantName};

use crate::config::PoolOptions;
use crate::error::{StorageError, StorageResult};

/// Whether a pool's connections may write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Role {
    /// Read-write connections.
    #[default]
    Writing,
    /// Read-only connections.
    Reading,
}

/// Counters for one pool's lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Connections opened.
    pub opens: u64,
    /// Checkouts satisfied from the idle set.
    pub reuses: u64,
    /// Connections currently checked out.
    pub in_use: usize,
}

struct PoolState {
    idle: Vec<Connection>,
    open_count: usize,
    in_use: usize,
    closed: bool,
    opens: u64,
    reuses: u64,
}

/// A bounded pool of connections to one tenant's database.
pub struct TenantPool {
    tenant: TenantName,
    database: String,
    role: Role,
    options: PoolOptions,
    state: Mutex<PoolState>,
    returned: Condvar,
}

impl TenantPool {
    /// Open a pool for a tenant's database, verifying one connection.
    ///
    /// The database file must already exist; pools never create tenants.
    pub fn open(
        tenant: TenantName,
        database: impl Into<String>,
        role: Role,
        options: PoolOptions,
    ) -> StorageResult<Arc<Self>> {
        let pool = Arc::new(Self {
            tenant,
            database: database.into(),
            role,
            options,
            state: Mutex::new(PoolState {
                idle: Vec::new(),
                open_count: 0,
                in_use: 0,
                closed: false,
                opens: 0,
                reuses: 0,
            }),
            returned: Condvar::new(),
        });

        // verify the database is openable before the pool is handed out
        let conn = pool.open_connection()?;
        {
            let mut state = pool.state.lock();
            state.idle.push(conn);
            state.open_count = 1;
            state.opens = 1;
        }

        tracing::debug!(tenant = %pool.tenant, database = %pool.database, "opened tenant pool");
        Ok(pool)
    }

    /// The tenant this pool is stamped with.
    pub fn tenant(&self) -> &TenantName {
        &self.tenant
    }

    /// The pool's role.
    pub fn role(&self) -> Role {
        self.role
    }

    /// Run `f` with a checked-out connection.
    ///
    /// Blocks while every connection is in use. The connection returns to
    /// the idle set afterwards whether `f` succeeds or fails.
    pub fn with_connection<R>(
        &self,
        f: impl FnOnce(&mut Connection) -> StorageResult<R>,
    ) -> StorageResult<R> {
        let mut conn = self.checkout()?;
        let result = f(&mut conn);
        self.checkin(conn);
        result
    }

    /// Snapshot of the pool's counters.
    pub fn stats(&self) -> PoolStats {
        let state = self.state.lock();
        PoolStats {
            opens: state.opens,
            reuses: state.reuses,
            in_use: state.in_use,
        }
    }

    /// Whether the pool has been closed.
    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Close the pool.
    ///
    /// Idle connections are dropped now; checked-out connections are
    /// dropped as they come back. Subsequent checkouts fail.
    pub fn close(&self) {
        let idle = {
            let mut state = self.state.lock();
            if state.closed {
                return;
            }
            state.closed = true;
            state.open_count -= state.idle.len();
            std::mem::take(&mut state.idle)
        };
        drop(idle);
        self.returned.notify_all();
        tracing::debug!(tenant = %self.tenant, "closed tenant pool");
    }

    fn checkout(&self) -> StorageResult<Connection> {
        let mut state = self.state.lock();
        loop {
            if state.closed {
                return Err(StorageError::pool(format!(
                    "connection pool for tenant {:?} is closed",
                    self.tenant.as_str()
                )));
            }

            if let Some(conn) = state.idle.pop() {
                state.reuses += 1;
                state.in_use += 1;
                return Ok(conn);
            }

            if state.open_count < self.options.max_connections {
                state.open_count += 1;
                state.opens += 1;
                state.in_use += 1;
                // open outside the lock so waiters are not serialized
                // behind SQLite file I/O
                drop(state);
                match self.open_connection() {
                    Ok(conn) => return Ok(conn),
                    Err(error) => {
                        let mut state = self.state.lock();
                        state.open_count -= 1;
                        state.in_use -= 1;
                        drop(state);
                        self.returned.notify_one();
                        return Err(error);
                    }
                }
            }

            self.returned.wait(&mut state);
        }
    }

    fn checkin(&self, conn: Connection) {
        let mut state = self.state.lock();
        state.in_use -= 1;
        if state.closed {
            state.open_count -= 1;
            drop(state);
            drop(conn);
        } else {
            state.idle.push(conn);
            drop(state);
        }
        self.returned.notify_one();
    }

    fn open_connection(&self) -> StorageResult<Connection> {
        let mut flags = OpenFlags::SQLITE_OPEN_URI | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        flags |= match self.role {
            Role::Writing => OpenFlags::SQLITE_OPEN_READ_WRITE,
            Role::Reading => OpenFlags::SQLITE_OPEN_READ_ONLY,
        };

        let conn = Connection::open_with_flags(&self.database, flags)?;
        match self.role {
            Role::Writing => conn.execute_batch(&self.options.init_sql())?,
            // journal mode cannot be changed on a read-only connection
            Role::Reading => {
                if self.options.foreign_keys {
                    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
                }
                if let Some(timeout) = self.options.busy_timeout_ms {
                    conn.execute_batch(&format!("PRAGMA busy_timeout = {timeout};"))?;
                }
            }
        }
        tracing::trace!(tenant = %self.tenant, "opened connection");
        Ok(conn)
    }
}

impl std::fmt::Debug for TenantPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TenantPool")
            .field("tenant", &self.tenant)
            .field("database", &self.database)
            .field("role", &self.role)
            .finish_non_exhaustive()
    }
}

/// The pool handed to callers: either a real tenant pool or the explicit
/// untenanted pool.
///
/// The untenanted variant exists so that "no tenant selected" is a value
/// with defined behavior rather than an absence: every data operation on it
/// fails with [`TenantError::NoTenant`].
#[derive(Debug, Clone)]
pub enum ConnectionPool {
    /// A live pool for a selected tenant.
    Tenanted(Arc<TenantPool>),
    /// No tenant selected; all connection access fails.
    Untenanted,
}

impl ConnectionPool {
    /// The pool's tenant, if any.
    pub fn tenant(&self) -> Option<&TenantName> {
        match self {
            Self::Tenanted(pool) => Some(pool.tenant()),
            Self::Untenanted => None,
        }
    }

    /// Run `f` with a checked-out connection.
    pub fn with_connection<R>(
        &self,
        f: impl FnOnce(&mut Connection) -> StorageResult<R>,
    ) -> StorageResult<R> {
        match self {
            Self::Tenanted(pool) => pool.with_connection(f),
            Self::Untenanted => Err(TenantError::NoTenant.into()),
        }
    }
}
