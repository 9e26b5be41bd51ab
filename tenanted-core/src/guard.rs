//! Cross-tenant safety enforcement.
//!
//! Every domain record carries a [`TenantStamp`]: the tenant that was current
//! when the record was constructed or loaded. The stamp is captured once and
//! never changes. Before a record is persisted, and before any association
//! whose target is tenant-scoped is traversed, the stamp is compared against
//! the ambient current tenant; a mismatch is a protocol violation surfaced
//! immediately, never silently repaired.
//!
//! Associations into shared, non-tenanted tables bypass the guard: they are
//! rewritten to filter by an explicit tenant column instead, so shared rows
//! remain reachable from any tenant while still being attributable.

use crate::context::TenantContext;
use crate::error::{TenantError, TenantResult};
use crate::name::{Tenancy, TenantName};

/// The tenant affinity stamped on a record at construction time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TenantStamp(Tenancy);

impl TenantStamp {
    /// Capture the ambient tenant from a context.
    pub fn capture(ctx: &TenantContext) -> Self {
        Self(ctx.current_tenancy().clone())
    }

    /// A stamp for a record constructed while untenanted.
    pub fn untenanted() -> Self {
        Self(Tenancy::Untenanted)
    }

    /// The stamped tenant, if any.
    pub fn tenant(&self) -> Option<&TenantName> {
        self.0.as_tenant()
    }
}

impl From<TenantName> for TenantStamp {
    fn from(name: TenantName) -> Self {
        Self(Tenancy::Tenant(name))
    }
}

/// Implemented by domain records that carry a tenant stamp.
pub trait TenantStamped {
    /// The tenant affinity captured when this record was built or loaded.
    fn tenant_stamp(&self) -> &TenantStamp;
}

/// How an association's target table relates to tenanting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssociationTarget {
    /// The target model lives in the per-tenant database; traversal is
    /// guarded.
    Tenanted,
    /// The target model lives in a shared, non-tenanted table; traversal
    /// filters by the named tenant column instead of being guarded.
    Shared {
        /// The foreign-key column holding the owning tenant.
        tenant_column: String,
    },
}

impl AssociationTarget {
    /// A shared target filtering on the conventional `tenant_id` column.
    pub fn shared() -> Self {
        Self::Shared {
            tenant_column: "tenant_id".to_string(),
        }
    }
}

/// The access plan the guard produces for an association traversal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssociationAccess {
    /// Target is tenant-scoped and the stamp matched; proceed through the
    /// owning record's tenant database.
    Guarded,
    /// Target is shared; query it with an explicit tenant-column filter.
    FilterBy {
        /// Column to filter on.
        column: String,
        /// The owning record's tenant, if any.
        value: Option<String>,
    },
}

/// A serialized cross-context record reference (a job argument, a signed
/// identifier) that may carry a tenant marker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TenantedRef {
    /// Opaque identifier for the referenced record.
    pub id: String,
    /// The tenant marker serialized alongside the identifier, if any.
    pub tenant: Option<TenantName>,
    /// Whether the referenced model is tenant-scoped at all.
    pub tenanted_model: bool,
}

/// Validates tenant affinity before saves, association traversal, and
/// reference resolution.
#[derive(Debug, Clone, Copy, Default)]
pub struct TenantSafetyGuard;

impl TenantSafetyGuard {
    /// Verify that a record may be persisted under the ambient tenant.
    ///
    /// Fails with [`TenantError::NoTenant`] when no tenant is selected, and
    /// with [`TenantError::WrongTenant`] when the record's stamp differs
    /// from the ambient tenant. A matching stamp proceeds silently.
    pub fn check_save(stamp: &TenantStamp, ctx: &TenantContext) -> TenantResult<()> {
        let current = match ctx.current() {
            Some(current) => current,
            None => return Err(TenantError::NoTenant),
        };

        match stamp.tenant() {
            Some(stamped) if stamped == current => Ok(()),
            other => Err(TenantError::wrong_tenant(
                other.map(TenantName::as_str),
                Some(current.as_str()),
            )),
        }
    }

    /// Convenience form of [`check_save`](Self::check_save) for records
    /// implementing [`TenantStamped`].
    pub fn ensure_save_allowed<R: TenantStamped>(
        record: &R,
        ctx: &TenantContext,
    ) -> TenantResult<()> {
        Self::check_save(record.tenant_stamp(), ctx)
    }

    /// Plan an association traversal from a stamped record.
    ///
    /// Tenanted targets get the same validation as a save. Shared targets
    /// bypass the guard and are rewritten to an explicit tenant-column
    /// filter drawn from the owning record's stamp.
    pub fn association_access(
        stamp: &TenantStamp,
        ctx: &TenantContext,
        target: &AssociationTarget,
    ) -> TenantResult<AssociationAccess> {
        match target {
            AssociationTarget::Tenanted => {
                Self::check_save(stamp, ctx)?;
                Ok(AssociationAccess::Guarded)
            }
            AssociationTarget::Shared { tenant_column } => Ok(AssociationAccess::FilterBy {
                column: tenant_column.clone(),
                value: stamp.tenant().map(|t| t.as_str().to_owned()),
            }),
        }
    }

    /// Verify a serialized reference before resolving it.
    ///
    /// A tenanted model's reference must carry a tenant marker, an ambient
    /// tenant must be selected, and the two must agree.
    pub fn check_reference(reference: &TenantedRef, ctx: &TenantContext) -> TenantResult<()> {
        if !reference.tenanted_model {
            return Ok(());
        }

        let marker = reference
            .tenant
            .as_ref()
            .ok_or_else(|| TenantError::MissingTenant(reference.id.clone()))?;

        let current = ctx.current().ok_or(TenantError::NoTenant)?;

        if marker != current {
            return Err(TenantError::wrong_tenant(
                Some(marker.as_str()),
                Some(current.as_str()),
            ));
        }

        Ok(())
    }
}
