//! Error types for tenant operations.

use thiserror::Error;

/// Result type alias for tenant operations.
pub type TenantResult<T> = Result<T, TenantError>;

/// Errors that can occur while managing tenants.
///
/// All of these are terminal, caller-surfaced failures; none are retried
/// internally.
#[derive(Debug, Error)]
pub enum TenantError {
    /// Tenant name contains a disallowed character.
    #[error("tenant name contains an invalid character: {0:?}")]
    BadTenantName(String),

    /// Database access was attempted without a current tenant having been set.
    #[error("cannot connect to a tenanted database while untenanted")]
    NoTenant,

    /// A record's tenant does not match the current tenant.
    #[error("record belongs to tenant {record:?}, but current tenant is {current:?}")]
    WrongTenant {
        /// The tenant stamped on the record, if any.
        record: Option<String>,
        /// The ambient current tenant, if any.
        current: Option<String>,
    },

    /// A cross-context reference lacks a tenant marker where one is required.
    #[error("tenant not present in reference {0:?}")]
    MissingTenant(String),

    /// Attempted to create a tenant that already exists.
    #[error("tenant {0:?} already exists")]
    TenantExists(String),

    /// A tenant was referenced that does not exist.
    #[error("the referenced tenant {0:?} does not exist")]
    TenantDoesNotExist(String),

    /// Attempted to swap tenants inside a swap-prohibited scope.
    #[error("cannot swap tenant to {requested:?} inside a tenanted block for {current:?}")]
    TenantSwapProhibited {
        /// The tenant selected by the enclosing scope, if any.
        current: Option<String>,
        /// The tenant the caller attempted to select.
        requested: String,
    },

    /// The tenant configuration is invalid.
    #[error("tenant configuration error: {0}")]
    TenantConfiguration(String),

    /// The configured database adapter has no registered implementation.
    #[error("unsupported database adapter for tenanting: {0:?}")]
    UnsupportedDatabase(String),
}

impl TenantError {
    /// Create a bad-tenant-name error.
    pub fn bad_name(name: impl Into<String>) -> Self {
        Self::BadTenantName(name.into())
    }

    /// Create a wrong-tenant error from the record's and ambient tenants.
    pub fn wrong_tenant(record: Option<&str>, current: Option<&str>) -> Self {
        Self::WrongTenant {
            record: record.map(str::to_owned),
            current: current.map(str::to_owned),
        }
    }

    /// Create a tenant-exists error.
    pub fn exists(name: impl Into<String>) -> Self {
        Self::TenantExists(name.into())
    }

    /// Create a tenant-does-not-exist error.
    pub fn does_not_exist(name: impl Into<String>) -> Self {
        Self::TenantDoesNotExist(name.into())
    }

    /// Create a configuration error.
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::TenantConfiguration(msg.into())
    }
}
