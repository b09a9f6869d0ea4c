//! Defaults and TOML deserialisation tests for octobroker configuration types.

use crate::config::tests::helpers::{
    broker_config_from_full_toml, broker_config_from_partial_toml,
};
use crate::config::{AppEntry, BrokerConfig, SelectionConfig};
use crate::organization::{LegacyTokenSource, OrganizationSettingsProvider};
use rstest::rstest;
use std::time::Duration;

#[rstest]
fn selection_config_defaults() {
    let selection = SelectionConfig::default();
    assert_eq!(selection.healthy_rate_limit_percent, 25);
    assert_eq!(selection.rate_limit_sample_max_age_secs, 120);
    assert_eq!(selection.probe_concurrency, 3);
    assert_eq!(selection.token_refresh_margin_secs, 300);
}

#[rstest]
fn selection_config_converts_to_policy() {
    let selection = SelectionConfig {
        healthy_rate_limit_percent: 40,
        rate_limit_sample_max_age_secs: 30,
        ..SelectionConfig::default()
    };
    let policy = selection.rate_limit_policy();
    assert_eq!(policy.healthy_percent, 40);
    assert_eq!(policy.max_age, Duration::from_secs(30));
    assert_eq!(selection.token_refresh_margin(), Duration::from_secs(300));
}

#[rstest]
fn broker_config_defaults_are_conservative() {
    let config = BrokerConfig::default();
    assert!(!config.background_job_mode);
    assert!(!config.permissive_fallback);
    assert!(config.capability_schema_path.is_none());
    assert!(config.apps.is_empty());
    assert!(config.organizations.is_empty());
}

#[rstest]
fn full_toml_sets_top_level_flags(broker_config_from_full_toml: BrokerConfig) {
    let config = broker_config_from_full_toml;
    assert!(config.background_job_mode);
    assert!(config.permissive_fallback);
    assert_eq!(
        config.capability_schema_path.as_ref().map(|path| path.as_str()),
        Some("/etc/octobroker/api.github.com.json")
    );
    assert_eq!(config.legacy_token.as_deref(), Some("ghp_central"));
}

#[rstest]
fn full_toml_sets_selection(broker_config_from_full_toml: BrokerConfig) {
    let selection = broker_config_from_full_toml.selection;
    assert_eq!(selection.healthy_rate_limit_percent, 40);
    assert_eq!(selection.rate_limit_sample_max_age_secs, 60);
    assert_eq!(selection.probe_concurrency, 5);
    assert_eq!(selection.token_refresh_margin_secs, 600);
}

#[rstest]
fn full_toml_sets_apps(broker_config_from_full_toml: BrokerConfig) {
    let apps = broker_config_from_full_toml.apps;
    assert_eq!(apps.len(), 2);
    let data = apps.first().expect("first app should exist");
    assert_eq!(data.purpose, "Data");
    assert_eq!(data.app_id, 12345);
    assert_eq!(data.slug_or_default(), "contoso-data");
    assert_eq!(data.name.as_deref(), Some("Contoso Data"));
    let jobs = apps.get(1).expect("second app should exist");
    assert_eq!(jobs.slug_or_default(), "app-67890");
    assert_eq!(
        jobs.base_url.as_deref(),
        Some("https://ghe.example.com/api/v3")
    );
}

#[rstest]
fn full_toml_sets_organizations(broker_config_from_full_toml: BrokerConfig) {
    let config = broker_config_from_full_toml;
    let provider = config.organization_provider();
    let runtime = tokio::runtime::Runtime::new().expect("should create tokio runtime");

    let contoso = runtime
        .block_on(provider.organization("contoso"))
        .expect("contoso should be configured");
    assert!(contoso.dynamic);
    assert_eq!(contoso.installations.len(), 2);
    assert_eq!(
        contoso
            .installations
            .get(1)
            .and_then(|entry| entry.purpose.as_deref()),
        Some("BackgroundJobs")
    );

    let fabrikam = runtime
        .block_on(provider.organization("fabrikam"))
        .expect("fabrikam should be configured");
    assert!(!fabrikam.dynamic);
}

#[rstest]
fn provider_canonicalises_standard_purpose_tags() {
    let config: BrokerConfig = toml::from_str(
        r#"
            [[organizations]]
            name = "contoso"

            [[organizations.installations]]
            app_id = 1
            installation_id = 100
            purpose = "data"

            [[organizations.installations]]
            app_id = 3
            installation_id = 300
            purpose = "compliance"
        "#,
    )
    .expect("TOML parsing should succeed");
    let provider = config.organization_provider();
    let runtime = tokio::runtime::Runtime::new().expect("should create tokio runtime");

    let contoso = runtime
        .block_on(provider.organization("contoso"))
        .expect("contoso should be configured");
    let tags: Vec<Option<&str>> = contoso
        .installations
        .iter()
        .map(|entry| entry.purpose.as_deref())
        .collect();
    assert_eq!(tags, vec![Some("Data"), Some("compliance")]);
}

#[rstest]
fn legacy_tokens_prefer_organization_over_central(broker_config_from_full_toml: BrokerConfig) {
    let tokens = broker_config_from_full_toml.legacy_tokens();
    assert_eq!(
        tokens.legacy_token("fabrikam").as_deref(),
        Some("ghp_fabrikam")
    );
    assert_eq!(
        tokens.legacy_token("northwind").as_deref(),
        Some("ghp_central")
    );
}

#[rstest]
fn selection_policy_carries_permissive_fallback(broker_config_from_full_toml: BrokerConfig) {
    let policy = broker_config_from_full_toml.selection_policy();
    assert!(policy.permissive_fallback);
    assert_eq!(policy.rate_limit.healthy_percent, 40);
}

#[rstest]
fn partial_toml_keeps_defaults(broker_config_from_partial_toml: BrokerConfig) {
    let config = broker_config_from_partial_toml;
    assert_eq!(config.legacy_token.as_deref(), Some("ghp_central"));
    assert_eq!(config.selection, SelectionConfig::default());
    assert!(config.apps.is_empty());
}

#[rstest]
fn app_entry_requires_purpose_and_id() {
    let result = toml::from_str::<AppEntry>(r#"private_key_path = "/k.pem""#);
    assert!(result.is_err(), "purpose and app_id are mandatory");
}
