//! Tenant identity types.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{TenantError, TenantResult};

/// Characters that may never appear in a tenant name.
///
/// Tenant names become path components and are interpolated into log lines,
/// so path separators and quote characters are rejected outright.
const FORBIDDEN_CHARS: [char; 4] = ['/', '\'', '"', '`'];

/// A validated tenant identifier.
///
/// A `TenantName` is unique per logical tenant, validated on construction,
/// never mutated, and compared by equality.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TenantName(String);

impl TenantName {
    /// Create a new tenant name, validating it.
    pub fn new(name: impl Into<String>) -> TenantResult<Self> {
        let name = name.into();
        Self::validate(&name)?;
        Ok(Self(name))
    }

    /// Validate a candidate tenant name without constructing one.
    pub fn validate(name: &str) -> TenantResult<()> {
        if name.is_empty() {
            return Err(TenantError::bad_name(name));
        }
        if name.contains(FORBIDDEN_CHARS) {
            return Err(TenantError::bad_name(name));
        }
        Ok(())
    }

    /// Get the tenant name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Convert to the inner string.
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for TenantName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TenantName {
    type Err = TenantError;

    fn from_str(s: &str) -> TenantResult<Self> {
        Self::new(s)
    }
}

impl TryFrom<&str> for TenantName {
    type Error = TenantError;

    fn try_from(s: &str) -> TenantResult<Self> {
        Self::new(s)
    }
}

impl TryFrom<String> for TenantName {
    type Error = TenantError;

    fn try_from(s: String) -> TenantResult<Self> {
        Self::new(s)
    }
}

impl From<TenantName> for String {
    fn from(name: TenantName) -> Self {
        name.0
    }
}

impl PartialEq<str> for TenantName {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for TenantName {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

/// The tenant selection for a scope: either a concrete tenant, or explicitly
/// no tenant at all.
///
/// The untenanted case is a distinguished value rather than an absent one so
/// that "no tenant selected" can be represented without conflating it with
/// `None` in places that key on the selection (such as the pool cache).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Tenancy {
    /// A concrete tenant is selected.
    Tenant(TenantName),
    /// No tenant is selected; data operations must fail.
    Untenanted,
}

impl Tenancy {
    /// Get the selected tenant, if any.
    pub fn as_tenant(&self) -> Option<&TenantName> {
        match self {
            Self::Tenant(name) => Some(name),
            Self::Untenanted => None,
        }
    }

    /// Check whether a concrete tenant is selected.
    pub fn is_tenanted(&self) -> bool {
        matches!(self, Self::Tenant(_))
    }
}

impl fmt::Display for Tenancy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tenant(name) => write!(f, "{name}"),
            Self::Untenanted => write!(f, "<untenanted>"),
        }
    }
}

impl From<TenantName> for Tenancy {
    fn from(name: TenantName) -> Self {
        Self::Tenant(name)
    }
}

impl From<&TenantName> for Tenancy {
    fn from(name: &TenantName) -> Self {
        Self::Tenant(name.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_valid_names() {
        for name in ["a-b_1", "acme", "foo.example.com", "tenant 42"] {
            assert!(TenantName::validate(name).is_ok(), "{name:?} should be valid");
        }
    }

    #[test]
    fn test_invalid_names() {
        for name in ["a/b", "a'b", "a\"b", "a`b", ""] {
            let err = TenantName::new(name).unwrap_err();
            assert!(
                matches!(err, TenantError::BadTenantName(_)),
                "{name:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_display_and_eq() {
        let name = TenantName::new("acme").unwrap();
        assert_eq!(name.to_string(), "acme");
        assert_eq!(name, "acme");
        assert_eq!(name.as_str(), "acme");
    }

    #[test]
    fn test_tenancy() {
        let tenancy: Tenancy = TenantName::new("acme").unwrap().into();
        assert!(tenancy.is_tenanted());
        assert_eq!(tenancy.as_tenant().unwrap().as_str(), "acme");

        assert!(Tenancy::Untenanted.as_tenant().is_none());
        assert_eq!(Tenancy::Untenanted.to_string(), "<untenanted>");
    }

    #[test]
    fn test_serde_round_trip() {
        let name = TenantName::new("acme").unwrap();
        let json = serde_json_roundtrip(&name);
        assert_eq!(json, name);
    }

    #[test]
    fn test_serde_rejects_bad_name() {
        let result: Result<TenantName, _> = "a/b".to_string().try_into();
        assert!(result.is_err());
    }

    fn serde_json_roundtrip(name: &TenantName) -> TenantName {
        // serde_json is not a dependency; exercise the TryFrom/Into pair the
        // serde attributes are wired through.
        let s: String = name.clone().into();
        TenantName::try_from(s).unwrap()
    }
}
