//! A GitHub API double answering from scenario data.

use std::collections::HashMap;

use chrono::{Duration, Utc};
use octobroker::error::GitHubError;
use octobroker::github::{
    BoxFuture, GitHubAppClient, InstallationProbe, InstallationToken, RateLimitObservation,
};
use octobroker::permissions::{AccessLevel, InstallationPermissions};

/// Core API budget reported for every installation.
const RATE_LIMIT: u64 = 5000;

/// Answers probes, rate-limit samples and token mints from fixed tables.
#[derive(Debug, Default)]
pub struct ScriptedGitHub {
    pub(crate) read_permissions: HashMap<u64, Vec<String>>,
    pub(crate) remaining: HashMap<u64, u64>,
    pub(crate) missing: Vec<u64>,
}

impl ScriptedGitHub {
    fn observation(&self, installation_id: u64) -> RateLimitObservation {
        let remaining = self
            .remaining
            .get(&installation_id)
            .copied()
            .unwrap_or(RATE_LIMIT);
        RateLimitObservation::new(RATE_LIMIT, remaining)
    }

    fn permissions(&self, installation_id: u64) -> InstallationPermissions {
        self.read_permissions
            .get(&installation_id)
            .into_iter()
            .flatten()
            .map(|permission| (permission.as_str(), AccessLevel::Read))
            .collect()
    }
}

impl GitHubAppClient for ScriptedGitHub {
    fn validate_credentials(&self) -> BoxFuture<'_, Result<(), GitHubError>> {
        Box::pin(async { Ok(()) })
    }

    fn probe_installation(
        &self,
        installation_id: u64,
    ) -> BoxFuture<'_, Result<InstallationProbe, GitHubError>> {
        let outcome = if self.missing.contains(&installation_id) {
            Err(GitHubError::InstallationNotFound { installation_id })
        } else {
            Ok(InstallationProbe {
                permissions: self.permissions(installation_id),
                account: Some(String::from(super::state::ORGANIZATION)),
                rate_limit: Some(self.observation(installation_id)),
            })
        };
        Box::pin(async move { outcome })
    }

    fn sample_rate_limit(
        &self,
        installation_id: u64,
    ) -> BoxFuture<'_, Result<RateLimitObservation, GitHubError>> {
        let observation = self.observation(installation_id);
        Box::pin(async move { Ok(observation) })
    }

    fn mint_installation_token(
        &self,
        installation_id: u64,
        _organization: &str,
    ) -> BoxFuture<'_, Result<InstallationToken, GitHubError>> {
        Box::pin(async move {
            Ok(InstallationToken::new(
                format!("ghs_{installation_id}"),
                Utc::now() + Duration::hours(1),
            ))
        })
    }
}
