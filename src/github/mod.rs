//! GitHub App credentials and the remote API seam.
//!
//! The broker never talks HTTP directly. Everything it needs from GitHub
//! goes through [`GitHubAppClient`]: probing an installation, sampling its
//! rate limit, minting an installation token, and checking the App's own
//! credentials. [`OctocrabAppClient`] is the production implementation;
//! tests substitute doubles.
//!
//! Private keys must be PEM-encoded RSA keys because GitHub App JWTs are
//! signed with RS256. Other key types are rejected at load time.

mod classify;
mod client;
mod pem_validation;

use std::future::Future;
use std::pin::Pin;

use camino::Utf8Path;
use cap_std::ambient_authority;
use cap_std::fs_utf8::Dir;
use chrono::{DateTime, Utc};
use jsonwebtoken::EncodingKey;
use octocrab::Octocrab;
use octocrab::models::AppId;

use crate::error::GitHubError;
use crate::permissions::InstallationPermissions;
use pem_validation::parse_rsa_pem;

pub use classify::classify_status;
pub use client::OctocrabAppClient;

/// A boxed future for async trait methods.
///
/// This type alias enables `mockall::automock` compatibility and trait object
/// usage for async methods in [`GitHubAppClient`].
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A point-in-time view of an installation's core API budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitObservation {
    /// Requests allowed per window.
    pub limit: u64,
    /// Requests left in the current window.
    pub remaining: u64,
    /// When the window resets, if reported.
    pub reset_at: Option<DateTime<Utc>>,
}

impl RateLimitObservation {
    /// Creates an observation without a reset time.
    #[must_use]
    pub const fn new(limit: u64, remaining: u64) -> Self {
        Self {
            limit,
            remaining,
            reset_at: None,
        }
    }

    /// Remaining budget as a whole percentage of the limit (0 when the
    /// limit is unknown).
    #[must_use]
    pub fn percent_remaining(&self) -> u64 {
        self.remaining
            .saturating_mul(100)
            .checked_div(self.limit)
            .unwrap_or(0)
    }
}

/// What a successful installation probe learned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallationProbe {
    /// Permissions granted to the installation.
    pub permissions: InstallationPermissions,
    /// Login of the account the App is installed on, if reported.
    pub account: Option<String>,
    /// Initial rate-limit observation, when it could be taken.
    pub rate_limit: Option<RateLimitObservation>,
}

/// A short-lived installation access token.
#[derive(Clone, PartialEq, Eq)]
pub struct InstallationToken {
    value: String,
    expires_at: DateTime<Utc>,
}

impl InstallationToken {
    /// Wraps a token value and its expiry.
    #[must_use]
    pub fn new(value: impl Into<String>, expires_at: DateTime<Utc>) -> Self {
        Self {
            value: value.into(),
            expires_at,
        }
    }

    /// The secret token value.
    #[must_use]
    pub fn value(&self) -> &str {
        &self.value
    }

    /// When GitHub will stop accepting the token.
    #[must_use]
    pub const fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    /// The `Authorization` header value for this token.
    #[must_use]
    pub fn authorization_header(&self) -> String {
        format!("token {}", self.value)
    }
}

impl std::fmt::Debug for InstallationToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstallationToken")
            .field("value", &"<REDACTED>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Trait for GitHub App client operations.
///
/// This trait abstracts the remote API to enable testing without network
/// calls. Production code uses [`OctocrabAppClient`], while tests inject
/// doubles.
#[cfg_attr(test, mockall::automock)]
pub trait GitHubAppClient: Send + Sync {
    /// Validates that the App credentials are accepted by GitHub (`GET /app`).
    ///
    /// # Errors
    ///
    /// Returns an error if the API call fails or returns an error response.
    fn validate_credentials(&self) -> BoxFuture<'_, Result<(), GitHubError>>;

    /// Fetches installation metadata, permissions, and an initial rate limit.
    ///
    /// # Errors
    ///
    /// Returns [`GitHubError::InstallationNotFound`] or
    /// [`GitHubError::InstallationUnusable`] for permanent failures and a
    /// transient variant for server or network failures.
    fn probe_installation(
        &self,
        installation_id: u64,
    ) -> BoxFuture<'_, Result<InstallationProbe, GitHubError>>;

    /// Samples the installation's remaining core API budget.
    ///
    /// # Errors
    ///
    /// Returns an error if the budget cannot be read.
    fn sample_rate_limit(
        &self,
        installation_id: u64,
    ) -> BoxFuture<'_, Result<RateLimitObservation, GitHubError>>;

    /// Mints an installation access token on behalf of `organization`.
    ///
    /// # Errors
    ///
    /// Returns [`GitHubError::TokenAcquisitionFailed`] or a classified
    /// installation error.
    fn mint_installation_token(
        &self,
        installation_id: u64,
        organization: &str,
    ) -> BoxFuture<'_, Result<InstallationToken, GitHubError>>;
}

/// Load a GitHub App RSA private key from a file.
///
/// Opens the parent directory of `key_path` using ambient authority,
/// reads the file contents, and parses them as a PEM-encoded RSA
/// private key suitable for JWT signing with RS256.
///
/// # Errors
///
/// Returns [`GitHubError::PrivateKeyLoadFailed`] if the directory or file
/// cannot be read, the file is empty, or it does not hold an unencrypted RSA
/// private key.
pub fn load_private_key(key_path: &Utf8Path) -> Result<EncodingKey, GitHubError> {
    let (dir, file_name) = open_key_directory(key_path)?;
    load_private_key_from_dir(&dir, file_name, key_path)
}

/// Parse inline PEM key material.
///
/// # Errors
///
/// Returns [`GitHubError::PrivateKeyLoadFailed`] if the material is not an
/// unencrypted RSA private key.
pub fn parse_private_key(pem_contents: &str) -> Result<EncodingKey, GitHubError> {
    parse_rsa_pem(pem_contents, "<inline>")
}

/// Build an authenticated Octocrab client for GitHub App operations.
///
/// The client is constructed synchronously and does not make network
/// calls. `base_url` points the client at a GitHub Enterprise Server.
///
/// # Tokio runtime
///
/// Octocrab's builder spawns a Tower `Buffer` task, so a Tokio runtime must
/// be active. Without one this returns an error instead of panicking.
///
/// # Errors
///
/// Returns [`GitHubError::AuthenticationFailed`] if no runtime is active,
/// the base URL is invalid, or the HTTP client cannot be constructed.
pub fn build_app_client(
    app_id: u64,
    private_key: EncodingKey,
    base_url: Option<&str>,
) -> Result<Octocrab, GitHubError> {
    let build_error = |message: String| GitHubError::AuthenticationFailed {
        message: format!("failed to build GitHub App client: {message}"),
    };

    tokio::runtime::Handle::try_current().map_err(|_| {
        build_error(String::from(
            "no Tokio runtime context is active (Octocrab requires one for its Tower buffer task)",
        ))
    })?;

    let mut builder = Octocrab::builder().app(AppId(app_id), private_key);
    if let Some(url) = base_url {
        builder = builder
            .base_uri(url)
            .map_err(|error| build_error(format!("invalid base URL '{url}': {error}")))?;
    }
    builder.build().map_err(|error| build_error(error.to_string()))
}

/// Load a private key from an already-opened directory capability.
///
/// Separated from [`load_private_key`] for testability: tests provide a
/// `cap_std::fs_utf8::Dir` backed by a temporary directory.
fn load_private_key_from_dir(
    dir: &Dir,
    file_name: &str,
    display_path: &Utf8Path,
) -> Result<EncodingKey, GitHubError> {
    let pem_contents =
        dir.read_to_string(file_name)
            .map_err(|error| GitHubError::PrivateKeyLoadFailed {
                origin: display_path.to_string(),
                message: format!("failed to read file: {error}"),
            })?;
    parse_rsa_pem(&pem_contents, display_path.as_str())
}

/// Open the parent directory of the key path as a capability handle.
fn open_key_directory(key_path: &Utf8Path) -> Result<(Dir, &str), GitHubError> {
    let parent = key_path
        .parent()
        .filter(|p| !p.as_str().is_empty())
        .unwrap_or_else(|| Utf8Path::new("."));
    let file_name = key_path
        .file_name()
        .ok_or_else(|| GitHubError::PrivateKeyLoadFailed {
            origin: key_path.to_string(),
            message: String::from("path does not contain a filename"),
        })?;

    let dir = Dir::open_ambient_dir(parent, ambient_authority()).map_err(|error| {
        GitHubError::PrivateKeyLoadFailed {
            origin: key_path.to_string(),
            message: format!("failed to open parent directory: {error}"),
        }
    })?;

    Ok((dir, file_name))
}
