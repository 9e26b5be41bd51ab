//! Mapping inbound requests to tenants.
//!
//! A resolver inspects a request's host name and answers "which tenant is
//! this for?". Resolution is advisory: returning `None` means the request
//! proceeds untenanted (typically to be rejected or redirected further up the
//! stack), never that a fallback tenant is silently substituted.

use crate::name::TenantName;

/// Resolves a request host to a tenant.
pub trait TenantResolver: Send + Sync {
    /// Resolve `host` to a tenant, or `None` when the host does not map to
    /// one.
    fn resolve(&self, host: &str) -> Option<TenantName>;
}

/// Resolves every request to one fixed tenant.
///
/// Useful for single-tenant deployments and tests.
#[derive(Debug, Clone)]
pub struct StaticResolver {
    tenant: TenantName,
}

impl StaticResolver {
    pub fn new(tenant: TenantName) -> Self {
        Self { tenant }
    }
}

impl TenantResolver for StaticResolver {
    fn resolve(&self, _host: &str) -> Option<TenantName> {
        Some(self.tenant.clone())
    }
}

/// Resolves the tenant from the leftmost DNS label of the host.
///
/// `acme.example.com` resolves to tenant `acme`; a bare apex host (`example.com`
/// with base domain `example.com`) resolves to `None`. Labels that fail tenant
/// name validation are logged and treated as unresolved.
#[derive(Debug, Clone)]
pub struct SubdomainResolver {
    base_domain: String,
}

impl SubdomainResolver {
    pub fn new(base_domain: impl Into<String>) -> Self {
        Self {
            base_domain: base_domain.into(),
        }
    }
}

impl TenantResolver for SubdomainResolver {
    fn resolve(&self, host: &str) -> Option<TenantName> {
        let label = host
            .strip_suffix(&self.base_domain)?
            .strip_suffix('.')?;

        // only the immediate subdomain; deeper labels do not resolve
        if label.is_empty() || label.contains('.') {
            return None;
        }

        match TenantName::new(label) {
            Ok(name) => Some(name),
            Err(error) => {
                tracing::warn!(host, %error, "host does not resolve to a valid tenant");
                None
            }
        }
    }
}

/// Resolves via an arbitrary caller-supplied function.
pub struct DynamicResolver {
    resolve: Box<dyn Fn(&str) -> Option<TenantName> + Send + Sync>,
}

impl DynamicResolver {
    pub fn new(resolve: impl Fn(&str) -> Option<TenantName> + Send + Sync + 'static) -> Self {
        Self {
            resolve: Box::new(resolve),
        }
    }
}

impl TenantResolver for DynamicResolver {
    fn resolve(&self, host: &str) -> Option<TenantName> {
        (self.resolve)(host)
    }
}

impl std::fmt::Debug for DynamicResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DynamicResolver").finish_non_exhaustive()
    }
}
