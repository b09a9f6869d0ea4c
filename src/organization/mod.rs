//! Organization settings and the legacy static-token fallback.
//!
//! The broker treats organization configuration as read-mostly input
//! supplied by the host application through [`OrganizationSettingsProvider`].

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::github::BoxFuture;

/// One App installation configured for an organization.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrganizationInstallation {
    /// The App the installation belongs to.
    pub app_id: u64,
    /// The installation id.
    pub installation_id: u64,
    /// Custom purpose identifier tagging this entry, if any.
    #[serde(default)]
    pub purpose: Option<String>,
}

impl OrganizationInstallation {
    /// An untagged installation entry.
    #[must_use]
    pub const fn new(app_id: u64, installation_id: u64) -> Self {
        Self {
            app_id,
            installation_id,
            purpose: None,
        }
    }

    /// Tags the entry with a purpose identifier.
    #[must_use]
    pub fn with_purpose(mut self, purpose: impl Into<String>) -> Self {
        self.purpose = Some(purpose.into());
        self
    }
}

/// Everything the broker needs to know about one organization.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrganizationSettings {
    /// The organization login.
    pub name: String,
    /// Configured App installations, in preference order.
    #[serde(default)]
    pub installations: Vec<OrganizationInstallation>,
    /// Whether the organization uses App-based credentials at all.
    #[serde(default = "default_dynamic")]
    pub dynamic: bool,
    /// Per-organization static token for legacy configurations.
    #[serde(default)]
    pub legacy_token: Option<String>,
}

const fn default_dynamic() -> bool {
    true
}

impl OrganizationSettings {
    /// App-based settings with the given installations.
    #[must_use]
    pub fn new(name: impl Into<String>, installations: Vec<OrganizationInstallation>) -> Self {
        Self {
            name: name.into(),
            installations,
            dynamic: true,
            legacy_token: None,
        }
    }

    /// Legacy settings: no App installations, only a static token.
    #[must_use]
    pub fn legacy(name: impl Into<String>, token: Option<String>) -> Self {
        Self {
            name: name.into(),
            installations: Vec::new(),
            dynamic: false,
            legacy_token: token,
        }
    }
}

impl fmt::Debug for OrganizationSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OrganizationSettings")
            .field("name", &self.name)
            .field("installations", &self.installations)
            .field("dynamic", &self.dynamic)
            .field(
                "legacy_token",
                &self.legacy_token.as_ref().map(|_| "<REDACTED>"),
            )
            .finish()
    }
}

/// Supplies organization settings to the broker.
pub trait OrganizationSettingsProvider: Send + Sync {
    /// Looks up one organization. `None` means the organization is unknown.
    fn organization(&self, name: &str) -> BoxFuture<'_, Option<OrganizationSettings>>;
}

/// Supplies legacy static bearer tokens.
pub trait LegacyTokenSource: Send + Sync {
    /// The static token for `organization`, if any.
    fn legacy_token(&self, organization: &str) -> Option<String>;
}

/// Organization settings held in memory, usually loaded from configuration.
#[derive(Debug, Clone, Default)]
pub struct StaticOrganizations {
    organizations: HashMap<String, OrganizationSettings>,
}

impl StaticOrganizations {
    /// Indexes settings by organization name (case-insensitive).
    #[must_use]
    pub fn new(organizations: impl IntoIterator<Item = OrganizationSettings>) -> Self {
        Self {
            organizations: organizations
                .into_iter()
                .map(|settings| (settings.name.to_ascii_lowercase(), settings))
                .collect(),
        }
    }

    /// Looks up settings synchronously.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&OrganizationSettings> {
        self.organizations.get(&name.to_ascii_lowercase())
    }
}

impl OrganizationSettingsProvider for StaticOrganizations {
    fn organization(&self, name: &str) -> BoxFuture<'_, Option<OrganizationSettings>> {
        let found = self.get(name).cloned();
        Box::pin(async move { found })
    }
}

/// Legacy tokens: the organization's own token first, then a central one.
#[derive(Clone, Default)]
pub struct StaticLegacyTokens {
    per_organization: HashMap<String, String>,
    central: Option<String>,
}

impl StaticLegacyTokens {
    /// Builds the token table from organization settings and a central token.
    #[must_use]
    pub fn new<'a>(
        organizations: impl IntoIterator<Item = &'a OrganizationSettings>,
        central: Option<String>,
    ) -> Self {
        Self {
            per_organization: organizations
                .into_iter()
                .filter_map(|settings| {
                    settings
                        .legacy_token
                        .clone()
                        .map(|token| (settings.name.to_ascii_lowercase(), token))
                })
                .collect(),
            central,
        }
    }

    /// Only a central token, shared by every organization.
    #[must_use]
    pub fn central_only(central: Option<String>) -> Self {
        Self {
            per_organization: HashMap::new(),
            central,
        }
    }
}

impl LegacyTokenSource for StaticLegacyTokens {
    fn legacy_token(&self, organization: &str) -> Option<String> {
        self.per_organization
            .get(&organization.to_ascii_lowercase())
            .cloned()
            .or_else(|| self.central.clone())
    }
}

impl fmt::Debug for StaticLegacyTokens {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StaticLegacyTokens")
            .field("organizations", &self.per_organization.len())
            .field("central", &self.central.is_some())
            .finish()
    }
}
