//! Configuration data types for octobroker.

use std::time::Duration;

use camino::Utf8PathBuf;
use ortho_config::{OrthoConfig, OrthoResult, PostMergeContext, PostMergeHook};
use serde::{Deserialize, Serialize};
use smart_default::SmartDefault;

use crate::error::ConfigError;
use crate::installation::RateLimitPolicy;
use crate::organization::{OrganizationSettings, StaticLegacyTokens, StaticOrganizations};
use crate::purpose::StandardPurpose;
use crate::selection::SelectionPolicy;

/// Selection tunables.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, SmartDefault)]
#[serde(default)]
pub struct SelectionConfig {
    /// A fresh sample above this remaining percentage counts as healthy.
    #[default = 25]
    pub healthy_rate_limit_percent: u64,

    /// Samples older than this many seconds are no longer fresh.
    #[default = 120]
    pub rate_limit_sample_max_age_secs: u64,

    /// How many unknown installations are probed at once.
    #[default = 3]
    pub probe_concurrency: usize,

    /// Cached tokens expiring within this many seconds are re-minted.
    #[default = 300]
    pub token_refresh_margin_secs: u64,
}

impl SelectionConfig {
    /// The rate-limit thresholds as a policy.
    #[must_use]
    pub const fn rate_limit_policy(&self) -> RateLimitPolicy {
        RateLimitPolicy {
            healthy_percent: self.healthy_rate_limit_percent,
            max_age: Duration::from_secs(self.rate_limit_sample_max_age_secs),
        }
    }

    /// The token refresh margin.
    #[must_use]
    pub const fn token_refresh_margin(&self) -> Duration {
        Duration::from_secs(self.token_refresh_margin_secs)
    }
}

/// One GitHub App bound to a purpose.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct AppEntry {
    /// Identifier of the purpose the App serves (`Data`, `BackgroundJobs`, ...).
    pub purpose: String,

    /// The GitHub App id.
    pub app_id: u64,

    /// Path to the App's PEM-encoded RSA private key.
    pub private_key_path: Option<Utf8PathBuf>,

    /// API root override for GitHub Enterprise Server.
    #[serde(default)]
    pub base_url: Option<String>,

    /// The App slug.
    #[serde(default)]
    pub slug: Option<String>,

    /// Human-readable App name.
    #[serde(default)]
    pub name: Option<String>,
}

impl AppEntry {
    /// The slug, falling back to `app-<id>`.
    #[must_use]
    pub fn slug_or_default(&self) -> String {
        self.slug
            .clone()
            .unwrap_or_else(|| format!("app-{}", self.app_id))
    }
}

/// Root broker configuration.
///
/// This structure is loaded from configuration files, environment variables,
/// and command-line arguments with layered precedence. The precedence order
/// (lowest to highest) is: defaults, configuration file, environment variables,
/// command-line arguments.
///
/// Configuration files are discovered in this order:
/// 1. Path specified via `OCTOBROKER_CONFIG_PATH` environment variable
/// 2. `.octobroker.toml` in the current working directory
/// 3. `.octobroker.toml` in the home directory
/// 4. `~/.config/octobroker/config.toml` (XDG default)
#[derive(Debug, Clone, Default, Deserialize, Serialize, OrthoConfig)]
#[ortho_config(
    prefix = "OCTOBROKER",
    post_merge_hook,
    discovery(
        app_name = "octobroker",
        env_var = "OCTOBROKER_CONFIG_PATH",
        config_file_name = "config.toml",
        dotfile_name = ".octobroker.toml",
        config_cli_long = "config",
        config_cli_visible = true,
    )
)]
pub struct BrokerConfig {
    /// Path to GitHub's published permission manifest (JSON).
    #[serde(default)]
    #[ortho_config(skip_cli)]
    pub capability_schema_path: Option<Utf8PathBuf>,

    /// Try the background-jobs purpose first in every selection.
    #[serde(default)]
    #[ortho_config(skip_cli)]
    pub background_job_mode: bool,

    /// Use the first configured installation when no purpose matches.
    #[serde(default)]
    #[ortho_config(skip_cli)]
    pub permissive_fallback: bool,

    /// Central static token for organizations without App configuration.
    pub legacy_token: Option<String>,

    /// Selection tunables.
    #[serde(default)]
    #[ortho_config(skip_cli)]
    pub selection: SelectionConfig,

    /// Apps bound to purposes.
    #[serde(default)]
    #[ortho_config(skip_cli)]
    pub apps: Vec<AppEntry>,

    /// Organizations and their installations.
    #[serde(default)]
    #[ortho_config(skip_cli)]
    pub organizations: Vec<OrganizationSettings>,
}

impl BrokerConfig {
    /// Checks the merged configuration for values GitHub never issues and
    /// tunables outside their range.
    ///
    /// Every problem is reported, one field per error; the first is returned.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingRequired`] for an App without a key path
    /// and [`ConfigError::InvalidValue`] for zero ids, zero probe concurrency,
    /// or a percentage above 100.
    pub fn validate(&self) -> crate::error::Result<()> {
        match self.problems().into_iter().next() {
            Some(problem) => Err(problem.into()),
            None => Ok(()),
        }
    }

    /// Every validation problem, in field order.
    #[must_use]
    pub fn problems(&self) -> Vec<ConfigError> {
        let mut problems = Vec::new();
        if self.selection.probe_concurrency == 0 {
            problems.push(invalid("selection.probe_concurrency", "must be at least 1"));
        }
        if self.selection.healthy_rate_limit_percent > 100 {
            problems.push(invalid(
                "selection.healthy_rate_limit_percent",
                "must be between 0 and 100",
            ));
        }
        for (index, app) in self.apps.iter().enumerate() {
            if app.purpose.is_empty() {
                problems.push(ConfigError::MissingRequired {
                    field: format!("apps[{index}].purpose"),
                });
            }
            if app.app_id == 0 {
                problems.push(invalid(&format!("apps[{index}].app_id"), "must be non-zero"));
            }
            if app.private_key_path.is_none() {
                problems.push(ConfigError::MissingRequired {
                    field: format!("apps[{index}].private_key_path"),
                });
            }
        }
        for (org_index, organization) in self.organizations.iter().enumerate() {
            for (index, entry) in organization.installations.iter().enumerate() {
                let prefix = format!("organizations[{org_index}].installations[{index}]");
                if entry.app_id == 0 {
                    problems.push(invalid(&format!("{prefix}.app_id"), "must be non-zero"));
                }
                if entry.installation_id == 0 {
                    problems.push(invalid(
                        &format!("{prefix}.installation_id"),
                        "must be non-zero",
                    ));
                }
            }
        }
        problems
    }

    /// The selection policy these settings describe.
    #[must_use]
    pub const fn selection_policy(&self) -> SelectionPolicy {
        SelectionPolicy {
            rate_limit: self.selection.rate_limit_policy(),
            permissive_fallback: self.permissive_fallback,
        }
    }

    /// The configured organizations as a settings provider.
    ///
    /// Tags naming a standard purpose in any letter case are rewritten to
    /// its canonical identifier; other tags are kept as written.
    #[must_use]
    pub fn organization_provider(&self) -> StaticOrganizations {
        StaticOrganizations::new(self.organizations.iter().cloned().map(|mut settings| {
            for entry in &mut settings.installations {
                if let Some(standard) = entry
                    .purpose
                    .as_deref()
                    .and_then(|tag| tag.parse::<StandardPurpose>().ok())
                {
                    entry.purpose = Some(String::from(standard.as_str()));
                }
            }
            settings
        }))
    }

    /// Legacy tokens: per-organization first, then the central token.
    #[must_use]
    pub fn legacy_tokens(&self) -> StaticLegacyTokens {
        StaticLegacyTokens::new(&self.organizations, self.legacy_token.clone())
    }
}

fn invalid(field: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        field: String::from(field),
        reason: String::from(reason),
    }
}

impl PostMergeHook for BrokerConfig {
    fn post_merge(&mut self, _ctx: &PostMergeContext) -> OrthoResult<()> {
        // Purpose ids and organization names are matched exactly.
        for app in &mut self.apps {
            app.purpose = app.purpose.trim().to_owned();
        }
        for organization in &mut self.organizations {
            organization.name = organization.name.trim().to_owned();
            for entry in &mut organization.installations {
                if let Some(tag) = entry.purpose.as_mut() {
                    *tag = tag.trim().to_owned();
                }
            }
        }
        Ok(())
    }
}
