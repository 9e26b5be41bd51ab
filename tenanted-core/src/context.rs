//! Call-scoped tracking of the current tenant.
//!
//! A [`TenantContext`] is the ambient "which tenant am I operating on"
//! indicator for one logical unit of work (a request, a job, a console
//! session). It is an explicit value threaded through call parameters, not a
//! process-global: each concurrent unit of work owns its own context, so a
//! tenant selected in one unit can never leak into a sibling.
//!
//! Selection is strictly nested. Entering a scope with [`TenantContext::with`]
//! pushes a frame that is visible to everything running inside the closure and
//! is popped on the way out, success or error. By default a frame prohibits
//! swapping: while inside it, selecting a *different* tenant fails with
//! [`TenantError::TenantSwapProhibited`]. Scopes entered with
//! [`TenantContext::with_swap_allowed`] opt out of that prohibition for their
//! interior, and [`TenantContext::with_none`] intentionally drops tenant
//! context for administrative, cross-tenant code paths.
//!
//! # Example
//!
//! ```rust,ignore
//! let mut ctx = TenantContext::new();
//! ctx.with(acme.clone(), |ctx| {
//!     // every operation in here is pinned to "acme"
//!     manager.connection_pool(ctx)
//! })??;
//! ```

use crate::error::{TenantError, TenantResult};
use crate::name::{Tenancy, TenantName};

/// One nested tenant selection.
#[derive(Debug, Clone)]
struct Frame {
    tenancy: Tenancy,
    allow_swap: bool,
}

/// The tenant selection stack for one logical unit of work.
#[derive(Debug, Clone)]
pub struct TenantContext {
    /// Selection in effect outside of any nested scope.
    base: Tenancy,
    frames: Vec<Frame>,
    /// Tag scope log output with the tenant.
    log_tenant_tag: bool,
}

impl Default for TenantContext {
    fn default() -> Self {
        Self::new()
    }
}

impl TenantContext {
    /// Create a context with no tenant selected.
    pub fn new() -> Self {
        Self {
            base: Tenancy::Untenanted,
            frames: Vec::new(),
            log_tenant_tag: true,
        }
    }

    /// Create a context with an initial tenant selected.
    pub fn for_tenant(name: TenantName) -> Self {
        Self {
            base: Tenancy::Tenant(name),
            frames: Vec::new(),
            log_tenant_tag: true,
        }
    }

    /// Whether scopes tag log output with the tenant.
    pub fn log_tenant_tag(&self) -> bool {
        self.log_tenant_tag
    }

    /// Enable or disable tenant tags on scope log output.
    pub fn set_log_tenant_tag(&mut self, enabled: bool) {
        self.log_tenant_tag = enabled;
    }

    /// The currently selected tenant, or `None` when untenanted.
    pub fn current(&self) -> Option<&TenantName> {
        self.current_tenancy().as_tenant()
    }

    /// The current selection, including the explicit untenanted case.
    pub fn current_tenancy(&self) -> &Tenancy {
        match self.frames.last() {
            Some(frame) => &frame.tenancy,
            None => &self.base,
        }
    }

    /// Whether the caller is inside a nested scope.
    pub fn in_scope(&self) -> bool {
        !self.frames.is_empty()
    }

    /// Set the ambient tenant.
    ///
    /// Callable repeatedly outside of nested scopes. Inside a
    /// swap-prohibited scope this fails, even when re-setting the same
    /// tenant; inside a swap-allowed scope it replaces that scope's
    /// selection.
    pub fn set_current(&mut self, tenancy: impl Into<Tenancy>) -> TenantResult<()> {
        let tenancy = tenancy.into();
        match self.frames.last_mut() {
            Some(frame) if !frame.allow_swap => Err(self.swap_prohibited(&tenancy)),
            Some(frame) => {
                frame.tenancy = tenancy;
                Ok(())
            }
            None => {
                self.base = tenancy;
                Ok(())
            }
        }
    }

    /// Run `f` with the given tenant selected, prohibiting nested swaps.
    ///
    /// Selecting the tenant that is already current is a reentrant no-op:
    /// `f` runs directly without a new frame.
    pub fn with<R>(
        &mut self,
        tenancy: impl Into<Tenancy>,
        f: impl FnOnce(&mut Self) -> R,
    ) -> TenantResult<R> {
        self.scoped(tenancy.into(), false, f)
    }

    /// Run `f` with the given tenant selected, permitting nested swaps.
    pub fn with_swap_allowed<R>(
        &mut self,
        tenancy: impl Into<Tenancy>,
        f: impl FnOnce(&mut Self) -> R,
    ) -> TenantResult<R> {
        self.scoped(tenancy.into(), true, f)
    }

    /// Run `f` with no tenant selected.
    ///
    /// Always permitted, regardless of the enclosing scope; this is the
    /// escape hatch for administrative code that must operate across
    /// tenants.
    pub fn with_none<R>(&mut self, f: impl FnOnce(&mut Self) -> R) -> R {
        match self.scoped(Tenancy::Untenanted, true, f) {
            Ok(value) => value,
            // Entering the untenanted scope is exempt from swap prohibition.
            Err(_) => unreachable!("untenanted scope is always permitted"),
        }
    }

    fn scoped<R>(
        &mut self,
        tenancy: Tenancy,
        allow_swap: bool,
        f: impl FnOnce(&mut Self) -> R,
    ) -> TenantResult<R> {
        if tenancy == *self.current_tenancy() {
            return Ok(f(self));
        }

        // The innermost frame decides whether a swap is legal. Dropping to
        // the untenanted selection is always permitted.
        if tenancy.is_tenanted() {
            if let Some(frame) = self.frames.last() {
                if !frame.allow_swap {
                    return Err(self.swap_prohibited(&tenancy));
                }
            }
        }

        let span = self.tenant_span(&tenancy);
        let _entered = span.as_ref().map(|span| span.enter());

        self.frames.push(Frame { tenancy, allow_swap });
        let result = f(self);
        self.frames.pop();

        Ok(result)
    }

    fn tenant_span(&self, tenancy: &Tenancy) -> Option<tracing::Span> {
        if self.log_tenant_tag {
            Some(tracing::debug_span!("tenant", tenant = %tenancy))
        } else {
            None
        }
    }

    fn swap_prohibited(&self, requested: &Tenancy) -> TenantError {
        TenantError::TenantSwapProhibited {
            current: self.current().map(|t| t.as_str().to_owned()),
            requested: requested.to_string(),
        }
    }
}
