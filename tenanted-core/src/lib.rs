//! # tenanted-core
//!
//! Storage-agnostic multi-tenancy primitives: tenant identity, call-scoped
//! tenant selection, cross-tenant safety enforcement, pool caching, and
//! request-to-tenant resolution.
//!
//! The model is one isolated database per tenant. This crate owns the parts
//! that hold regardless of which database engine backs the tenants:
//! - Validated tenant names ([`TenantName`]) and the explicit untenanted
//!   selection ([`Tenancy`])
//! - The per-unit-of-work selection stack ([`TenantContext`]) with nested
//!   scopes and swap prohibition
//! - Construction-time tenant stamping and pre-save / pre-traversal checks
//!   ([`TenantSafetyGuard`])
//! - A bounded LRU cache for live connection pools ([`PoolCache`])
//! - Host-to-tenant resolution at the request edge ([`TenantResolver`])
//!
//! ## Example
//!
//! ```rust
//! use tenanted_core::{TenantContext, TenantName};
//!
//! let acme = TenantName::new("acme")?;
//! let mut ctx = TenantContext::new();
//! ctx.with(acme, |ctx| {
//!     assert_eq!(ctx.current().unwrap().as_str(), "acme");
//! })?;
//! assert!(ctx.current().is_none());
//! # Ok::<(), tenanted_core::TenantError>(())
//! ```

pub mod cache;
pub mod context;
pub mod error;
pub mod guard;
pub mod name;
pub mod resolver;

pub use cache::PoolCache;
pub use context::TenantContext;
pub use error::{TenantError, TenantResult};
pub use guard::{
    AssociationAccess, AssociationTarget, TenantSafetyGuard, TenantStamp, TenantStamped,
    TenantedRef,
};
pub use name::{Tenancy, TenantName};
pub use resolver::{DynamicResolver, StaticResolver, SubdomainResolver, TenantResolver};
