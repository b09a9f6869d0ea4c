//! Shared fixtures and helper functions for config tests.

use crate::config::BrokerConfig;
use ortho_config::MergeComposer;
use rstest::fixture;
use std::sync::Arc;

/// Fixture providing a `BrokerConfig` parsed from a full TOML example.
#[fixture]
pub fn broker_config_from_full_toml() -> BrokerConfig {
    let toml = r#"
        capability_schema_path = "/etc/octobroker/api.github.com.json"
        background_job_mode = true
        permissive_fallback = true
        legacy_token = "ghp_central"

        [selection]
        healthy_rate_limit_percent = 40
        rate_limit_sample_max_age_secs = 60
        probe_concurrency = 5
        token_refresh_margin_secs = 600

        [[apps]]
        purpose = "Data"
        app_id = 12345
        private_key_path = "/etc/octobroker/data.pem"
        slug = "contoso-data"
        name = "Contoso Data"

        [[apps]]
        purpose = "BackgroundJobs"
        app_id = 67890
        private_key_path = "/etc/octobroker/jobs.pem"
        base_url = "https://ghe.example.com/api/v3"

        [[organizations]]
        name = "contoso"

        [[organizations.installations]]
        app_id = 12345
        installation_id = 100

        [[organizations.installations]]
        app_id = 67890
        installation_id = 200
        purpose = "BackgroundJobs"

        [[organizations]]
        name = "fabrikam"
        dynamic = false
        legacy_token = "ghp_fabrikam"
    "#;

    toml::from_str(toml).expect("TOML parsing should succeed")
}

/// Fixture providing a `BrokerConfig` parsed from a minimal TOML example.
#[fixture]
pub fn broker_config_from_partial_toml() -> BrokerConfig {
    let toml = r#"
        legacy_token = "ghp_central"
    "#;

    toml::from_str(toml).expect("TOML parsing should succeed")
}

/// Helper: Creates a `MergeComposer` with defaults layer already pushed.
pub fn create_composer_with_defaults() -> Result<MergeComposer, serde_json::Error> {
    let mut composer = MergeComposer::new();
    let defaults = ortho_config::serde_json::to_value(BrokerConfig::default())?;
    composer.push_defaults(defaults);
    Ok(composer)
}

/// Helper: Merges layers from a composer into `BrokerConfig`.
pub fn merge_config(
    composer: MergeComposer,
) -> Result<BrokerConfig, Arc<ortho_config::OrthoError>> {
    BrokerConfig::merge_from_layers(composer.layers())
}

/// Helper: Asserts that a config has all default values.
pub fn assert_config_has_defaults(config: &BrokerConfig) {
    assert!(
        config.capability_schema_path.is_none(),
        "capability_schema_path should be None"
    );
    assert!(
        !config.background_job_mode,
        "background_job_mode should be false"
    );
    assert!(
        !config.permissive_fallback,
        "permissive_fallback should be false"
    );
    assert!(config.legacy_token.is_none(), "legacy_token should be None");
    assert_eq!(config.selection.healthy_rate_limit_percent, 25);
    assert_eq!(config.selection.rate_limit_sample_max_age_secs, 120);
    assert_eq!(config.selection.probe_concurrency, 3);
    assert_eq!(config.selection.token_refresh_margin_secs, 300);
    assert!(config.apps.is_empty(), "apps should be empty");
    assert!(
        config.organizations.is_empty(),
        "organizations should be empty"
    );
}

/// Helper: Creates a `MergeComposer` with defaults, file, and env layers for testing layer precedence.
pub fn create_composer_with_file_and_env() -> Result<MergeComposer, serde_json::Error> {
    use ortho_config::serde_json::json;

    let mut composer = create_composer_with_defaults()?;

    composer.push_file(
        json!({
            "capability_schema_path": "/from/file.json",
            "legacy_token": "file-token",
            "selection": { "probe_concurrency": 4 }
        }),
        None,
    );

    composer.push_environment(json!({
        "capability_schema_path": "/from/env.json"
    }));

    Ok(composer)
}
