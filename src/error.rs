//! Semantic error types for the octobroker library.
//!
//! Conditions a caller might inspect, retry, or map to a response are modelled
//! as `thiserror` enums grouped by concern. Opaque reporting (`eyre::Report`)
//! is reserved for the binary boundary.
//!
//! The grouping mirrors how callers react:
//!
//! - [`ConfigError`]: fatal to the requesting call and never retried.
//! - [`GitHubError`]: remote failures, classified by [`GitHubError::is_transient`].
//! - [`PermissionError`]: capability schema failures.
//! - [`SelectionError`]: no credential could be produced for an organization.

use std::sync::Arc;

use thiserror::Error;

/// Errors raised while loading or validating broker configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file was not found at the expected path.
    #[error("configuration file not found: {path}")]
    FileNotFound {
        /// The path where the configuration file was expected.
        path: String,
    },

    /// The configuration file could not be parsed.
    #[error("failed to parse configuration file: {message}")]
    ParseError {
        /// A description of the parse error.
        message: String,
    },

    /// A required configuration value is missing.
    #[error("missing required configuration: {field}")]
    MissingRequired {
        /// The name of the missing field.
        field: String,
    },

    /// A configuration value failed validation.
    #[error("invalid configuration value for '{field}': {reason}")]
    InvalidValue {
        /// The name of the invalid field.
        field: String,
        /// The reason the value is invalid.
        reason: String,
    },

    /// The `OrthoConfig` library returned an error during configuration loading.
    #[error("configuration loading failed: {0}")]
    OrthoConfig(Arc<ortho_config::OrthoError>),

    /// A custom purpose was registered with an identifier already in use.
    #[error("purpose '{id}' is already registered")]
    DuplicatePurpose {
        /// The conflicting purpose identifier.
        id: String,
    },

    /// A custom purpose was registered without an identifier.
    #[error("custom purpose identifier must not be empty")]
    EmptyPurposeId,

    /// A purpose identifier did not match any registered purpose.
    #[error("purpose '{id}' is not registered")]
    UnknownPurpose {
        /// The unrecognised purpose identifier.
        id: String,
    },

    /// No application is configured for the requested purpose.
    #[error("no GitHub App is configured for purpose '{purpose}'")]
    NoApplicationForPurpose {
        /// Display identifier of the purpose.
        purpose: String,
    },

    /// The organization has no installation entries at all.
    #[error("organization '{organization}' has no GitHub App installations configured")]
    NoInstallationMapping {
        /// The organization name.
        organization: String,
    },
}

/// Errors raised by the remote GitHub API or while preparing App credentials.
#[derive(Debug, Error)]
pub enum GitHubError {
    /// GitHub App authentication failed.
    #[error("GitHub App authentication failed: {message}")]
    AuthenticationFailed {
        /// A description of the authentication failure.
        message: String,
    },

    /// Failed to load the GitHub App private key.
    #[error("failed to load private key from '{origin}': {message}")]
    PrivateKeyLoadFailed {
        /// Where the key was read from (a path or `<inline>`).
        origin: String,
        /// A description of the failure.
        message: String,
    },

    /// Failed to acquire an installation token.
    #[error("failed to acquire installation token for installation {installation_id}: {message}")]
    TokenAcquisitionFailed {
        /// The installation the token was requested for.
        installation_id: u64,
        /// A description of the token acquisition failure.
        message: String,
    },

    /// The installation no longer exists on the remote side.
    #[error("installation {installation_id} was not found")]
    InstallationNotFound {
        /// The missing installation.
        installation_id: u64,
    },

    /// The installation exists but cannot be used (suspended or forbidden).
    #[error("installation {installation_id} is unusable (HTTP {status}): {message}")]
    InstallationUnusable {
        /// The unusable installation.
        installation_id: u64,
        /// The HTTP status GitHub answered with.
        status: u16,
        /// The message GitHub returned.
        message: String,
    },

    /// GitHub answered with a server-side error.
    #[error("GitHub API unavailable (HTTP {status}): {message}")]
    ApiUnavailable {
        /// The HTTP status GitHub answered with.
        status: u16,
        /// The message GitHub returned.
        message: String,
    },

    /// The request never produced a GitHub response (network, TLS, decoding).
    #[error("GitHub API request failed: {message}")]
    Transport {
        /// A description of the transport failure.
        message: String,
    },
}

impl GitHubError {
    /// Returns whether the failure may succeed on a later attempt.
    ///
    /// Server errors and transport failures are transient. Missing or
    /// unusable installations and credential problems are permanent.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::ApiUnavailable { .. } | Self::Transport { .. })
    }
}

/// Errors raised while resolving endpoint capability requirements.
#[derive(Debug, Error)]
pub enum PermissionError {
    /// Strict matching was requested and the endpoint is not in the schema.
    #[error("no permission schema entry for {method} {path}")]
    PermissionSchemaNotFound {
        /// The HTTP method looked up.
        method: String,
        /// The normalised path looked up.
        path: String,
    },

    /// The capability schema could not be read or parsed.
    #[error("failed to load capability schema from '{origin}': {message}")]
    SchemaLoadFailed {
        /// Where the schema was read from.
        origin: String,
        /// A description of the failure.
        message: String,
    },
}

/// Outcomes where no credential could be produced for an organization.
#[derive(Debug, Error)]
pub enum SelectionError {
    /// Every candidate was exhausted, invalid, or lacked permissions.
    #[error("no GitHub App authorization available for organization '{organization}' (purpose '{purpose}')")]
    NoAuthorizationAvailable {
        /// The organization name.
        organization: String,
        /// Display identifier of the preferred purpose.
        purpose: String,
    },

    /// The organization uses legacy static-token configuration only.
    #[error("organization '{organization}' has no app-based configuration")]
    NoAppConfigured {
        /// The organization name.
        organization: String,
    },

    /// Neither an app installation nor a legacy token is available.
    #[error("no credential of any kind is available for organization '{organization}'")]
    NoCredential {
        /// The organization name.
        organization: String,
    },
}

/// Top-level error type for the octobroker library.
#[derive(Debug, Error)]
pub enum BrokerError {
    /// An error occurred during configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// An error occurred talking to GitHub.
    #[error(transparent)]
    GitHub(#[from] GitHubError),

    /// An error occurred resolving endpoint permissions.
    #[error(transparent)]
    Permission(#[from] PermissionError),

    /// No credential could be selected.
    #[error(transparent)]
    Selection(#[from] SelectionError),
}

impl BrokerError {
    /// Returns whether the error is the "no app configured" signal that
    /// callers answer by falling back to a legacy static token.
    #[must_use]
    pub const fn is_no_app_configured(&self) -> bool {
        matches!(self, Self::Selection(SelectionError::NoAppConfigured { .. }))
    }
}

/// A specialised `Result` type for octobroker operations.
pub type Result<T> = std::result::Result<T, BrokerError>;
