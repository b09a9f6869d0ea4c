//! Credential purposes and the registry of custom purposes.
//!
//! A purpose records why a credential is needed. Seven standard purposes are
//! built in; deployments may register additional custom purposes whose App
//! configuration can vary per organization. Both kinds share one identifier
//! space so they are interchangeable in fallback lists and log fields.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::app::ApplicationConfig;
use crate::error::ConfigError;

/// The built-in purposes, in fallback declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StandardPurpose {
    /// General data access.
    Data,
    /// Calls made while serving an interactive user.
    CustomerFacing,
    /// Operational tooling and administration.
    Operations,
    /// Batch and offline jobs.
    BackgroundJobs,
    /// Writes that update organization state.
    Updates,
    /// Security scanning.
    Security,
    /// Data consumed by Actions workflows.
    ActionsData,
}

impl StandardPurpose {
    /// Every standard purpose in declaration order.
    pub const ALL: [Self; 7] = [
        Self::Data,
        Self::CustomerFacing,
        Self::Operations,
        Self::BackgroundJobs,
        Self::Updates,
        Self::Security,
        Self::ActionsData,
    ];

    /// Returns the stable identifier for this purpose.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Data => "Data",
            Self::CustomerFacing => "CustomerFacing",
            Self::Operations => "Operations",
            Self::BackgroundJobs => "BackgroundJobs",
            Self::Updates => "Updates",
            Self::Security => "Security",
            Self::ActionsData => "ActionsData",
        }
    }
}

impl FromStr for StandardPurpose {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|purpose| purpose.as_str().eq_ignore_ascii_case(value))
            .ok_or_else(|| ConfigError::UnknownPurpose {
                id: value.to_owned(),
            })
    }
}

impl fmt::Display for StandardPurpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resolves the App configuration a custom purpose uses for one organization.
pub type ConfigurationResolver = Arc<dyn Fn(&str) -> Option<ApplicationConfig> + Send + Sync>;

/// A deployment-defined purpose.
///
/// When a resolver is attached, the App backing this purpose is chosen per
/// organization at first use instead of at construction time.
pub struct CustomPurpose {
    id: String,
    name: String,
    resolver: Option<ConfigurationResolver>,
}

impl CustomPurpose {
    /// Creates a custom purpose with a static App configuration.
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            resolver: None,
        }
    }

    /// Attaches a per-organization configuration resolver.
    #[must_use]
    pub fn with_resolver<F>(mut self, resolver: F) -> Self
    where
        F: Fn(&str) -> Option<ApplicationConfig> + Send + Sync + 'static,
    {
        self.resolver = Some(Arc::new(resolver));
        self
    }

    /// The unique identifier.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The human-readable name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns whether the App configuration varies per organization.
    #[must_use]
    pub const fn has_resolver(&self) -> bool {
        self.resolver.is_some()
    }

    /// Resolves the App configuration for `organization`, if a resolver is
    /// attached and it yields one.
    #[must_use]
    pub fn resolve(&self, organization: &str) -> Option<ApplicationConfig> {
        self.resolver
            .as_ref()
            .and_then(|resolver| resolver(organization))
    }
}

impl fmt::Debug for CustomPurpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CustomPurpose")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("resolver", &self.resolver.as_ref().map(|_| "<fn>"))
            .finish()
    }
}

/// Why a credential is needed: a standard or a registered custom purpose.
///
/// Equality and hashing use [`Purpose::display_id`], so a purpose compares
/// equal to any other value carrying the same identifier.
#[derive(Debug, Clone)]
pub enum Purpose {
    /// One of the built-in purposes.
    Standard(StandardPurpose),
    /// A purpose registered with [`PurposeRegistry::register_custom`].
    Custom(Arc<CustomPurpose>),
}

impl Purpose {
    /// The identifier used for matching, logging, and telemetry.
    #[must_use]
    pub fn display_id(&self) -> &str {
        match self {
            Self::Standard(purpose) => purpose.as_str(),
            Self::Custom(purpose) => purpose.id(),
        }
    }

    /// Returns the standard purpose, if this is one.
    #[must_use]
    pub const fn as_standard(&self) -> Option<StandardPurpose> {
        match self {
            Self::Standard(purpose) => Some(*purpose),
            Self::Custom(_) => None,
        }
    }

    /// Returns the custom purpose, if this is one.
    #[must_use]
    pub fn as_custom(&self) -> Option<&CustomPurpose> {
        match self {
            Self::Standard(_) => None,
            Self::Custom(purpose) => Some(purpose),
        }
    }
}

impl From<StandardPurpose> for Purpose {
    fn from(purpose: StandardPurpose) -> Self {
        Self::Standard(purpose)
    }
}

impl PartialEq for Purpose {
    fn eq(&self, other: &Self) -> bool {
        self.display_id() == other.display_id()
    }
}

impl Eq for Purpose {}

impl Hash for Purpose {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.display_id().hash(state);
    }
}

impl fmt::Display for Purpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_id())
    }
}

/// The set of purposes known to one broker instance.
///
/// Custom purposes are registered while the broker is being assembled and
/// never removed. Registration order is preserved.
#[derive(Debug, Clone, Default)]
pub struct PurposeRegistry {
    custom: Vec<Arc<CustomPurpose>>,
}

impl PurposeRegistry {
    /// Creates a registry holding only the standard purposes.
    #[must_use]
    pub const fn new() -> Self {
        Self { custom: Vec::new() }
    }

    /// Registers a custom purpose.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::EmptyPurposeId`] for an empty identifier and
    /// [`ConfigError::DuplicatePurpose`] when the identifier matches a
    /// standard or previously registered purpose.
    pub fn register_custom(&mut self, purpose: CustomPurpose) -> Result<Purpose, ConfigError> {
        if purpose.id().trim().is_empty() {
            return Err(ConfigError::EmptyPurposeId);
        }
        if self.find(purpose.id()).is_some() {
            return Err(ConfigError::DuplicatePurpose {
                id: purpose.id().to_owned(),
            });
        }
        let purpose = Arc::new(purpose);
        self.custom.push(Arc::clone(&purpose));
        Ok(Purpose::Custom(purpose))
    }

    /// Standard purposes in declaration order, then custom purposes in
    /// registration order.
    #[must_use]
    pub fn all_purposes(&self) -> Vec<Purpose> {
        StandardPurpose::ALL
            .into_iter()
            .map(Purpose::Standard)
            .chain(self.custom.iter().cloned().map(Purpose::Custom))
            .collect()
    }

    /// Finds a purpose by its identifier.
    #[must_use]
    pub fn find(&self, id: &str) -> Option<Purpose> {
        if let Some(standard) = StandardPurpose::ALL
            .into_iter()
            .find(|purpose| purpose.as_str() == id)
        {
            return Some(Purpose::Standard(standard));
        }
        self.custom
            .iter()
            .find(|purpose| purpose.id() == id)
            .cloned()
            .map(Purpose::Custom)
    }

    /// Finds a purpose by identifier, accepting standard names case-insensitively.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::UnknownPurpose`] when nothing matches.
    pub fn resolve(&self, id: &str) -> Result<Purpose, ConfigError> {
        self.find(id)
            .or_else(|| id.parse::<StandardPurpose>().ok().map(Purpose::Standard))
            .ok_or_else(|| ConfigError::UnknownPurpose { id: id.to_owned() })
    }
}
