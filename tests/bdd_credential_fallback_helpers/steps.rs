//! Given and When step definitions for credential fallback BDD tests.

use std::sync::Arc;

use camino::Utf8PathBuf;
use chrono::{Duration, Utc};
use octobroker::app::{ApplicationConfig, ClientFactory};
use octobroker::broker::{BrokerBuilder, Credential};
use octobroker::config::{AppEntry, BrokerConfig};
use octobroker::error::GitHubError;
use octobroker::github::{
    BoxFuture, GitHubAppClient, InstallationProbe, InstallationToken, RateLimitObservation,
};
use octobroker::organization::{OrganizationInstallation, OrganizationSettings};
use octobroker::purpose::StandardPurpose;
use octobroker::selection::AuthMode;
use rstest_bdd_macros::{given, when};

use super::state::{CredentialFallbackState, CredentialOutcome, StepResult};

const DATA_APP: u64 = 12345;

// Define a mock client for testing since the automock is only available in
// the main crate's test configuration.
mockall::mock! {
    pub GitHubAppClient {}

    impl GitHubAppClient for GitHubAppClient {
        fn validate_credentials(&self) -> BoxFuture<'_, Result<(), GitHubError>>;
        fn probe_installation(
            &self,
            installation_id: u64,
        ) -> BoxFuture<'_, Result<InstallationProbe, GitHubError>>;
        fn sample_rate_limit(
            &self,
            installation_id: u64,
        ) -> BoxFuture<'_, Result<RateLimitObservation, GitHubError>>;
        fn mint_installation_token(
            &self,
            installation_id: u64,
            organization: &str,
        ) -> BoxFuture<'_, Result<InstallationToken, GitHubError>>;
    }
}

/// A factory handing every App a client that mints `ghs_<installation>`.
fn minting_factory() -> ClientFactory {
    Arc::new(|_config: &ApplicationConfig| {
        let mut mock = MockGitHubAppClient::new();
        mock.expect_mint_installation_token()
            .returning(|installation_id, _| {
                Box::pin(async move {
                    Ok(InstallationToken::new(
                        format!("ghs_{installation_id}"),
                        Utc::now() + Duration::hours(1),
                    ))
                })
            });
        let client: Arc<dyn GitHubAppClient> = Arc::new(mock);
        Ok(client)
    })
}

fn base_config() -> BrokerConfig {
    BrokerConfig {
        apps: vec![AppEntry {
            purpose: String::from("Data"),
            app_id: DATA_APP,
            private_key_path: Some(Utf8PathBuf::from("/etc/octobroker/data.pem")),
            ..AppEntry::default()
        }],
        ..BrokerConfig::default()
    }
}

fn update_config(
    credential_fallback_state: &CredentialFallbackState,
    change: impl FnOnce(&mut BrokerConfig),
) {
    let mut config = credential_fallback_state
        .config
        .get()
        .unwrap_or_else(base_config);
    change(&mut config);
    credential_fallback_state.config.set(config);
}

#[given("organization {organization} uses installation {installation_id} of the Data App")]
#[expect(
    clippy::unnecessary_wraps,
    reason = "rstest-bdd step functions must return StepResult"
)]
fn organization_uses_installation(
    credential_fallback_state: &CredentialFallbackState,
    organization: String,
    installation_id: u64,
) -> StepResult<()> {
    update_config(credential_fallback_state, |config| {
        config.organizations.push(OrganizationSettings::new(
            organization,
            vec![OrganizationInstallation::new(DATA_APP, installation_id)],
        ));
    });
    Ok(())
}

#[given("organization {organization} uses the legacy token {token}")]
#[expect(
    clippy::unnecessary_wraps,
    reason = "rstest-bdd step functions must return StepResult"
)]
fn organization_uses_legacy_token(
    credential_fallback_state: &CredentialFallbackState,
    organization: String,
    token: String,
) -> StepResult<()> {
    update_config(credential_fallback_state, |config| {
        config
            .organizations
            .push(OrganizationSettings::legacy(organization, Some(token)));
    });
    Ok(())
}

#[given("the central legacy token is {token}")]
#[expect(
    clippy::unnecessary_wraps,
    reason = "rstest-bdd step functions must return StepResult"
)]
fn central_legacy_token(
    credential_fallback_state: &CredentialFallbackState,
    token: String,
) -> StepResult<()> {
    update_config(credential_fallback_state, |config| {
        config.legacy_token = Some(token);
    });
    Ok(())
}

#[when("a credential is requested for {organization}")]
fn credential_requested(
    credential_fallback_state: &CredentialFallbackState,
    organization: String,
) -> StepResult<()> {
    let config = credential_fallback_state
        .config
        .get()
        .unwrap_or_else(base_config);
    config
        .validate()
        .map_err(|e| format!("configuration should be valid: {e}"))?;
    let broker = BrokerBuilder::from_config(&config)
        .map_err(|e| format!("configuration should translate: {e}"))?
        .client_factory(minting_factory())
        .build()
        .map_err(|e| format!("broker should build: {e}"))?;

    let rt = tokio::runtime::Runtime::new()
        .map_err(|e| format!("failed to create tokio runtime: {e}"))?;
    let result = rt.block_on(broker.authorize_with_fallback(
        &config.organization_provider(),
        &config.legacy_tokens(),
        &organization,
        &StandardPurpose::Data.into(),
        AuthMode::BestAvailable,
        None,
    ));

    credential_fallback_state.outcome.set(match result {
        Ok(credential @ Credential::Installation(_)) => CredentialOutcome::Installation {
            header: credential.authorization_header(),
        },
        Ok(credential @ Credential::Legacy(_)) => CredentialOutcome::Legacy {
            header: credential.authorization_header(),
        },
        Err(error) => CredentialOutcome::Failed {
            message: error.to_string(),
        },
    });
    Ok(())
}
