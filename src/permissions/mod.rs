//! Endpoint capability requirements and installation permission grants.
//!
//! GitHub publishes which App permission each REST endpoint requires. This
//! module loads that manifest ([`CapabilitySchema`]), resolves the
//! requirement for a concrete request ([`EndpointRequirements`]), and checks
//! whether an installation's granted permissions cover it.

mod normalize;
mod schema;

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

pub use normalize::normalize_path;
pub use schema::{CapabilityMatch, CapabilitySchema};

/// HTTP methods that appear in the capability manifest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum HttpMethod {
    /// `GET`
    Get,
    /// `HEAD`
    Head,
    /// `POST`
    Post,
    /// `PUT`
    Put,
    /// `PATCH`
    Patch,
    /// `DELETE`
    Delete,
}

impl HttpMethod {
    /// The upper-case method name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Head => "HEAD",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
        }
    }
}

impl FromStr for HttpMethod {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_uppercase().as_str() {
            "GET" => Ok(Self::Get),
            "HEAD" => Ok(Self::Head),
            "POST" => Ok(Self::Post),
            "PUT" => Ok(Self::Put),
            "PATCH" => Ok(Self::Patch),
            "DELETE" => Ok(Self::Delete),
            _ => Err(ConfigError::InvalidValue {
                field: String::from("method"),
                reason: format!("unsupported HTTP method '{value}'"),
            }),
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Access level granted for, or required of, one App permission.
///
/// Levels are ordered: `Admin` implies `Write`, which implies `Read`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessLevel {
    /// Read-only access.
    Read,
    /// Read and write access.
    Write,
    /// Administrative access.
    Admin,
}

impl fmt::Display for AccessLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Read => "read",
            Self::Write => "write",
            Self::Admin => "admin",
        })
    }
}

/// One named App permission at a minimum access level.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Capability {
    /// The permission name, for example `contents` or `members`.
    pub permission: String,
    /// The minimum access level required.
    pub access: AccessLevel,
}

impl Capability {
    /// Creates a capability requirement.
    #[must_use]
    pub fn new(permission: impl Into<String>, access: AccessLevel) -> Self {
        Self {
            permission: permission.into(),
            access,
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.permission, self.access)
    }
}

/// The capabilities one request needs. Empty means any installation qualifies.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequiredCapabilities(Vec<Capability>);

impl RequiredCapabilities {
    /// Wraps a list of capabilities.
    #[must_use]
    pub const fn new(capabilities: Vec<Capability>) -> Self {
        Self(capabilities)
    }

    /// A requirement every installation satisfies.
    #[must_use]
    pub const fn none() -> Self {
        Self(Vec::new())
    }

    /// Returns whether nothing is required.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The individual capabilities.
    #[must_use]
    pub fn capabilities(&self) -> &[Capability] {
        &self.0
    }

    /// Returns whether `granted` covers every capability at or above the
    /// required level.
    #[must_use]
    pub fn satisfied_by(&self, granted: &InstallationPermissions) -> bool {
        self.0.iter().all(|capability| {
            granted
                .level(&capability.permission)
                .is_some_and(|level| level >= capability.access)
        })
    }
}

impl fmt::Display for RequiredCapabilities {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return f.write_str("(none)");
        }
        let rendered: Vec<String> = self.0.iter().map(ToString::to_string).collect();
        f.write_str(&rendered.join(", "))
    }
}

/// Permissions GitHub reports as granted to one installation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstallationPermissions(BTreeMap<String, AccessLevel>);

impl InstallationPermissions {
    /// Wraps a permission map.
    #[must_use]
    pub const fn new(permissions: BTreeMap<String, AccessLevel>) -> Self {
        Self(permissions)
    }

    /// The granted level for `permission`, if any.
    #[must_use]
    pub fn level(&self, permission: &str) -> Option<AccessLevel> {
        self.0.get(permission).copied()
    }

    /// Number of granted permissions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns whether nothing is granted.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<S: Into<String>> FromIterator<(S, AccessLevel)> for InstallationPermissions {
    fn from_iter<I: IntoIterator<Item = (S, AccessLevel)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(name, level)| (name.into(), level)).collect())
    }
}

/// What a caller is about to request, used for permission-aware selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointRequirements {
    method: HttpMethod,
    path: String,
    capability_override: Option<RequiredCapabilities>,
    strict: bool,
    allow_non_get: bool,
}

impl EndpointRequirements {
    /// Describes a request by method and path template.
    ///
    /// The path may use `{param}` or `:param` placeholders.
    #[must_use]
    pub fn new(method: HttpMethod, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            capability_override: None,
            strict: false,
            allow_non_get: false,
        }
    }

    /// Supplies the required capabilities directly, bypassing schema lookup.
    #[must_use]
    pub fn with_capabilities(mut self, capabilities: RequiredCapabilities) -> Self {
        self.capability_override = Some(capabilities);
        self
    }

    /// Fails resolution when the endpoint is missing from the schema.
    #[must_use]
    pub const fn strict(mut self) -> Self {
        self.strict = true;
        self
    }

    /// Permits permission-aware selection for non-`GET` requests.
    #[must_use]
    pub const fn allow_non_get(mut self) -> Self {
        self.allow_non_get = true;
        self
    }

    /// The HTTP method.
    #[must_use]
    pub const fn method(&self) -> HttpMethod {
        self.method
    }

    /// The raw path as supplied by the caller.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// The explicit capability override, if any.
    #[must_use]
    pub const fn capability_override(&self) -> Option<&RequiredCapabilities> {
        self.capability_override.as_ref()
    }

    /// Returns whether a schema miss is an error.
    #[must_use]
    pub const fn is_strict(&self) -> bool {
        self.strict
    }

    /// Returns whether these requirements qualify for permission-aware
    /// selection: `GET` always does, other methods only when allowed.
    #[must_use]
    pub const fn permits_optimal_selection(&self) -> bool {
        matches!(self.method, HttpMethod::Get) || self.allow_non_get
    }
}
