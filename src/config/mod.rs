//! Configuration system for octobroker.
//!
//! This module provides the configuration structures and CLI definitions for the
//! octobroker binary. Configuration loading and precedence merging is handled by
//! the `ortho_config` crate. Precedence: CLI flags override environment
//! variables, which override configuration files, which override defaults.
//!
//! The configuration file is expected at `~/.config/octobroker/config.toml` by default.
//!
//! # Example Configuration
//!
//! ```toml
//! capability_schema_path = "/etc/octobroker/api.github.com.json"
//! background_job_mode = false
//! permissive_fallback = false
//!
//! [selection]
//! healthy_rate_limit_percent = 25
//! rate_limit_sample_max_age_secs = 120
//! probe_concurrency = 3
//! token_refresh_margin_secs = 300
//!
//! [[apps]]
//! purpose = "Data"
//! app_id = 12345
//! private_key_path = "/etc/octobroker/data-app.pem"
//! slug = "contoso-data"
//!
//! [[apps]]
//! purpose = "BackgroundJobs"
//! app_id = 67890
//! private_key_path = "/etc/octobroker/jobs-app.pem"
//!
//! [[organizations]]
//! name = "contoso"
//!
//! [[organizations.installations]]
//! app_id = 12345
//! installation_id = 100
//!
//! [[organizations.installations]]
//! app_id = 67890
//! installation_id = 200
//!
//! [[organizations]]
//! name = "fabrikam"
//! dynamic = false
//! legacy_token = "ghp_example"
//! ```

mod cli;
mod loader;
mod types;

#[cfg(test)]
mod tests;

pub use cli::{
    Cli, Commands, EndpointArgs, PermissionsArgs, SelectArgs, TokenArgs, ValidateAppArgs,
};
pub use loader::{env_var_names, load_config, load_config_with_env};
pub use types::{AppEntry, BrokerConfig, SelectionConfig};
