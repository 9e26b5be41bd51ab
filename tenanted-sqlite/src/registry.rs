//! Tenant discovery from the filesystem.
//!
//! There is no side catalog of tenants: the database files themselves are
//! the source of truth. The registry walks the directory tree under the
//! template's static prefix and matches each file against the template with
//! the tenant placeholder turned into a capture group. A file whose captured
//! name fails tenant validation indicates out-of-band tampering; it is
//! logged and skipped rather than aborting discovery.

use std::fs;
use std::path::{Path, PathBuf};

use regex_lite::Regex;

use tenanted_core::{TenantError, TenantName};

use crate::config::TENANT_PLACEHOLDER;
use crate::error::StorageResult;
use crate::lock::ReadyLock;
use crate::locator::DatabaseLocator;

/// Enumerates tenants by their database files.
#[derive(Debug, Clone)]
pub struct TenantRegistry {
    locator: DatabaseLocator,
    /// Directory below which every tenant database lives.
    prefix: PathBuf,
    /// Anchored pattern matching a full database path, capturing the tenant.
    pattern: Regex,
}

impl TenantRegistry {
    pub fn new(locator: DatabaseLocator) -> StorageResult<Self> {
        let template = locator.template_path();
        let template_str = template.to_string_lossy();

        let placeholder_at = template_str.find(TENANT_PLACEHOLDER).ok_or_else(|| {
            TenantError::configuration(format!(
                "database template {template_str:?} does not contain {TENANT_PLACEHOLDER:?}"
            ))
        })?;

        let prefix = match template_str[..placeholder_at].rfind('/') {
            Some(slash) => PathBuf::from(&template_str[..slash]),
            None => PathBuf::from("."),
        };

        // tenant names never contain '/', so the capture stays within one
        // path component
        let escaped = regex_escape(&template_str);
        let pattern = format!(
            "^{}$",
            escaped.replace(&regex_escape(TENANT_PLACEHOLDER), "([^/]+)")
        );
        let pattern = Regex::new(&pattern)
            .map_err(|error| TenantError::configuration(error.to_string()))?;

        Ok(Self {
            locator,
            prefix,
            pattern,
        })
    }

    /// All tenants whose database files exist on disk, sorted by name.
    ///
    /// Includes tenants whose databases are mid-creation; see
    /// [`ready_tenants`](Self::ready_tenants) for the usable subset.
    pub fn tenants(&self) -> StorageResult<Vec<TenantName>> {
        let mut found = Vec::new();
        if self.prefix.is_dir() {
            self.collect(&self.prefix, &mut found)?;
        }
        found.sort();
        Ok(found)
    }

    /// Tenants whose databases exist and have no creation in flight.
    pub fn ready_tenants(&self) -> StorageResult<Vec<TenantName>> {
        let mut tenants = self.tenants()?;
        tenants.retain(|tenant| {
            ReadyLock::for_database(self.locator.database_path_for(tenant)).database_ready()
        });
        Ok(tenants)
    }

    fn collect(&self, dir: &Path, found: &mut Vec<TenantName>) -> StorageResult<()> {
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if path.is_dir() {
                self.collect(&path, found)?;
                continue;
            }

            let path_str = path.to_string_lossy();
            let Some(captures) = self.pattern.captures(&path_str) else {
                continue;
            };
            let Some(raw) = captures.get(1) else {
                continue;
            };

            match TenantName::new(raw.as_str()) {
                Ok(name) => found.push(name),
                Err(error) => {
                    tracing::warn!(
                        path = %path.display(),
                        %error,
                        "skipping database file with invalid tenant name"
                    );
                }
            }
        }
        Ok(())
    }
}

fn regex_escape(s: &str) -> String {
    let mut escaped = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(
            c,
            '.' | '+' | '*' | '?' | '(' | ')' | '[' | ']' | '{' | '}' | '^' | '$' | '|' | '\\'
        ) {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}
