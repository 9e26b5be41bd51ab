//! Mapping tenant names to database locations.
//!
//! The configured template (`db/production/%{tenant}.sqlite3`) is the single
//! source of truth for where a tenant's database lives. The locator renders
//! it into the connection string handed to SQLite, the filesystem path used
//! for existence checks and lifecycle operations, and the match pattern the
//! registry uses to enumerate tenants from disk.

use std::path::PathBuf;

use url::Url;

use tenanted_core::TenantName;

use crate::config::{TENANT_PLACEHOLDER, TenantedConfig};

/// Renders database locations from the configured template.
#[derive(Debug, Clone)]
pub struct DatabaseLocator {
    template: String,
    test_worker_id: Option<String>,
}

impl DatabaseLocator {
    pub fn new(config: &TenantedConfig) -> Self {
        Self {
            template: config.database.clone(),
            test_worker_id: config.test_worker_id.clone(),
        }
    }

    /// The connection string for a tenant's database.
    pub fn database_for(&self, tenant: &TenantName) -> String {
        self.render(tenant.as_str())
    }

    /// The filesystem path of a tenant's database file.
    pub fn database_path_for(&self, tenant: &TenantName) -> PathBuf {
        coerce_path(&self.database_for(tenant))
    }

    /// The template itself rendered as a filesystem path, tenant placeholder
    /// left intact. The registry turns this into a match pattern.
    pub fn template_path(&self) -> PathBuf {
        coerce_path(&self.render(TENANT_PLACEHOLDER))
    }

    /// Substitute a tenant string into the template.
    ///
    /// A parallel-test worker id is appended to the path component, before
    /// any `?query` so URI query parameters stay last.
    fn render(&self, tenant: &str) -> String {
        let rendered = self.template.replace(TENANT_PLACEHOLDER, tenant);
        match &self.test_worker_id {
            None => rendered,
            Some(id) => match rendered.split_once('?') {
                Some((path, query)) => format!("{path}_{id}?{query}"),
                None => format!("{rendered}_{id}"),
            },
        }
    }
}

/// Coerce a connection string to a filesystem path.
///
/// Fully-qualified `file://` URIs go through the `url` parser; opaque
/// `file:relative?query` forms drop the scheme and query; anything else is
/// taken verbatim as a path.
fn coerce_path(database: &str) -> PathBuf {
    match database.strip_prefix("file:") {
        None => PathBuf::from(database),
        Some(rest) => {
            if rest.starts_with("//") {
                if let Ok(url) = Url::parse(database) {
                    if let Ok(path) = url.to_file_path() {
                        return path;
                    }
                }
            }
            let path = rest.trim_start_matches('/');
            let path = path.split('?').next().unwrap_or(path);
            // an absolute URI path keeps exactly one leading slash
            if rest.starts_with('/') {
                PathBuf::from(format!("/{path}"))
            } else {
                PathBuf::from(path)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn name(s: &str) -> TenantName {
        TenantName::new(s).unwrap()
    }

    fn locator(template: &str) -> DatabaseLocator {
        DatabaseLocator::new(&TenantedConfig::new(template))
    }

    #[test]
    fn test_database_for_substitutes_tenant() {
        let locator = locator("db/%{tenant}.sqlite3");
        assert_eq!(locator.database_for(&name("acme")), "db/acme.sqlite3");
    }

    #[test]
    fn test_worker_suffix_plain_path() {
        let config = TenantedConfig::new("db/%{tenant}.sqlite3").with_test_worker_id("7");
        let locator = DatabaseLocator::new(&config);
        assert_eq!(locator.database_for(&name("acme")), "db/acme.sqlite3_7");
    }

    #[test]
    fn test_worker_suffix_precedes_query() {
        let config =
            TenantedConfig::new("file:db/%{tenant}.sqlite3?vfs=unix").with_test_worker_id("7");
        let locator = DatabaseLocator::new(&config);
        assert_eq!(
            locator.database_for(&name("acme")),
            "file:db/acme.sqlite3_7?vfs=unix"
        );
    }

    #[test]
    fn test_path_for_plain() {
        let locator = locator("db/%{tenant}.sqlite3");
        assert_eq!(
            locator.database_path_for(&name("acme")),
            PathBuf::from("db/acme.sqlite3")
        );
    }

    #[test]
    fn test_path_for_file_uri() {
        let locator = locator("file:///var/db/%{tenant}.sqlite3");
        assert_eq!(
            locator.database_path_for(&name("acme")),
            PathBuf::from("/var/db/acme.sqlite3")
        );
    }

    #[test]
    fn test_path_for_opaque_file_uri_strips_query() {
        let locator = locator("file:db/%{tenant}.sqlite3?mode=rwc");
        assert_eq!(
            locator.database_path_for(&name("acme")),
            PathBuf::from("db/acme.sqlite3")
        );
    }

    #[test]
    fn test_template_path_keeps_placeholder() {
        let locator = locator("db/%{tenant}.sqlite3");
        assert_eq!(
            locator.template_path(),
            PathBuf::from("db/%{tenant}.sqlite3")
        );
    }
}
