//! Octocrab-backed implementation of [`GitHubAppClient`].

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use octocrab::Octocrab;
use octocrab::models::InstallationId;
use serde::Deserialize;

use super::classify::classify_octocrab_error;
use super::{
    BoxFuture, GitHubAppClient, InstallationProbe, InstallationToken, RateLimitObservation,
};
use crate::error::GitHubError;
use crate::permissions::{AccessLevel, InstallationPermissions};

/// `GET /app/installations/{id}` fields the broker reads.
#[derive(Debug, Deserialize)]
struct InstallationMetadata {
    #[serde(default)]
    permissions: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    suspended_at: Option<DateTime<Utc>>,
    #[serde(default)]
    account: Option<AccountMetadata>,
}

#[derive(Debug, Deserialize)]
struct AccountMetadata {
    login: String,
}

/// `POST /app/installations/{id}/access_tokens` response.
#[derive(Debug, Deserialize)]
struct AccessTokenResponse {
    token: String,
    expires_at: Option<DateTime<Utc>>,
}

/// `GET /rate_limit` response, reduced to the core bucket.
#[derive(Debug, Deserialize)]
struct RateLimitResponse {
    resources: RateLimitResources,
}

#[derive(Debug, Deserialize)]
struct RateLimitResources {
    core: RateLimitBucket,
}

#[derive(Debug, Deserialize)]
struct RateLimitBucket {
    limit: u64,
    remaining: u64,
    reset: i64,
}

/// Installation tokens live for an hour; used when GitHub omits `expires_at`.
const DEFAULT_TOKEN_LIFETIME_SECS: i64 = 3600;

/// Production implementation of [`GitHubAppClient`] using Octocrab.
pub struct OctocrabAppClient {
    client: Octocrab,
}

impl OctocrabAppClient {
    /// Creates a new `OctocrabAppClient` from an App-authenticated Octocrab
    /// instance.
    #[must_use]
    pub const fn new(client: Octocrab) -> Self {
        Self { client }
    }

    async fn fetch_rate_limit(
        &self,
        installation_id: u64,
    ) -> Result<RateLimitObservation, GitHubError> {
        let scoped = self
            .client
            .installation(InstallationId(installation_id))
            .map_err(|error| classify_octocrab_error(installation_id, error))?;
        let response: RateLimitResponse = scoped
            .get("/rate_limit", None::<&()>)
            .await
            .map_err(|error| classify_octocrab_error(installation_id, error))?;
        let core = response.resources.core;
        Ok(RateLimitObservation {
            limit: core.limit,
            remaining: core.remaining,
            reset_at: DateTime::from_timestamp(core.reset, 0),
        })
    }
}

impl GitHubAppClient for OctocrabAppClient {
    fn validate_credentials(&self) -> BoxFuture<'_, Result<(), GitHubError>> {
        Box::pin(async move {
            self.client
                .get::<serde_json::Value, _, ()>("/app", None)
                .await
                .map_err(|error| GitHubError::AuthenticationFailed {
                    message: format!("failed to validate GitHub App credentials: {error}"),
                })?;
            Ok(())
        })
    }

    fn probe_installation(
        &self,
        installation_id: u64,
    ) -> BoxFuture<'_, Result<InstallationProbe, GitHubError>> {
        Box::pin(async move {
            let route = format!("/app/installations/{installation_id}");
            let metadata: InstallationMetadata = self
                .client
                .get(route, None::<&()>)
                .await
                .map_err(|error| classify_octocrab_error(installation_id, error))?;

            if let Some(suspended_at) = metadata.suspended_at {
                return Err(GitHubError::InstallationUnusable {
                    installation_id,
                    status: 403,
                    message: format!("installation suspended at {suspended_at}"),
                });
            }

            let rate_limit = match self.fetch_rate_limit(installation_id).await {
                Ok(observation) => Some(observation),
                Err(error) => {
                    tracing::debug!(
                        installation_id,
                        %error,
                        "initial rate-limit sample failed; continuing without one"
                    );
                    None
                }
            };

            Ok(InstallationProbe {
                permissions: granted_permissions(metadata.permissions),
                account: metadata.account.map(|account| account.login),
                rate_limit,
            })
        })
    }

    fn sample_rate_limit(
        &self,
        installation_id: u64,
    ) -> BoxFuture<'_, Result<RateLimitObservation, GitHubError>> {
        Box::pin(self.fetch_rate_limit(installation_id))
    }

    fn mint_installation_token(
        &self,
        installation_id: u64,
        organization: &str,
    ) -> BoxFuture<'_, Result<InstallationToken, GitHubError>> {
        let organization_owned = String::from(organization);
        Box::pin(async move {
            let route = format!("/app/installations/{installation_id}/access_tokens");
            let response: AccessTokenResponse = self
                .client
                .post(route, None::<&()>)
                .await
                .map_err(|error| match classify_octocrab_error(installation_id, error) {
                    GitHubError::ApiUnavailable { status, message } => {
                        GitHubError::TokenAcquisitionFailed {
                            installation_id,
                            message: format!("HTTP {status}: {message}"),
                        }
                    }
                    GitHubError::Transport { message } => GitHubError::TokenAcquisitionFailed {
                        installation_id,
                        message,
                    },
                    classified => classified,
                })?;

            tracing::debug!(
                installation_id,
                organization = %organization_owned,
                "minted installation access token"
            );
            let expires_at = response.expires_at.unwrap_or_else(|| {
                Utc::now() + chrono::Duration::seconds(DEFAULT_TOKEN_LIFETIME_SECS)
            });
            Ok(InstallationToken::new(response.token, expires_at))
        })
    }
}

/// Keep the permissions whose level the crate models; GitHub occasionally
/// reports other shapes for preview permissions.
fn granted_permissions(raw: BTreeMap<String, serde_json::Value>) -> InstallationPermissions {
    raw.into_iter()
        .filter_map(|(name, value)| {
            serde_json::from_value::<AccessLevel>(value)
                .ok()
                .map(|level| (name, level))
        })
        .collect()
}
