//! Configuration loading with layered precedence.
//!
//! This module provides functions to load configuration with the precedence order
//! (lowest to highest): application defaults, configuration file, environment
//! variables, command-line arguments.
//!
//! # Manual Layer Composition
//!
//! The `OrthoConfig` derive macro provides `load()` and `compose_layers()` methods
//! that handle discovery, environment variables, and CLI parsing automatically.
//! This loader uses `MergeComposer` directly instead:
//!
//! 1. **Subcommand separation**: The CLI (`Cli` struct) handles subcommand dispatch
//!    via clap's `#[command(subcommand)]`, while `BrokerConfig` holds configuration
//!    values. `OrthoConfig`'s `load()` expects to own the entire CLI parsing.
//!
//! 2. **Environment variable validation**: `OrthoConfig`'s environment layer uses
//!    Figment, which silently ignores unparseable values. This loader returns
//!    errors for invalid typed values.
//!
//! 3. **Injectable environment**: Variables are read through `mockable::Env`, so
//!    tests exercise the environment layer without touching process state.
//!
//! # Environment Variable Handling
//!
//! String fields (e.g., `OCTOBROKER_LEGACY_TOKEN`) are always accepted. Typed
//! fields like booleans (`OCTOBROKER_BACKGROUND_JOB_MODE`) or integers
//! (`OCTOBROKER_SELECTION_PROBE_CONCURRENCY`) must have valid values or loading
//! fails with a clear error.

use camino::Utf8PathBuf;
use cap_std::ambient_authority;
use cap_std::fs_utf8::Dir;
use mockable::{DefaultEnv, Env};
use ortho_config::discovery::ConfigDiscovery;
use ortho_config::serde_json::{self, Map, Value};
use ortho_config::{MergeComposer, toml};

use crate::config::{BrokerConfig, Cli};
use crate::error::{ConfigError, Result};

// ============================================================================
// Environment Variable Specification Table
// ============================================================================

/// The type of value expected from an environment variable.
#[derive(Clone, Copy)]
enum EnvVarType {
    /// String value (always accepted).
    String,
    /// Boolean value (`true`/`false`). Invalid values return an error.
    Bool,
    /// Unsigned 64-bit integer. Invalid values return an error.
    U64,
}

/// Specification for a single environment variable mapping.
struct EnvVarSpec {
    /// The environment variable name (e.g., `OCTOBROKER_LEGACY_TOKEN`).
    env_var: &'static str,
    /// The JSON path segments (e.g., `["selection", "probe_concurrency"]`).
    path: &'static [&'static str],
    /// The expected value type.
    var_type: EnvVarType,
}

/// Table of all environment variables and their JSON paths.
const ENV_VAR_SPECS: &[EnvVarSpec] = &[
    EnvVarSpec {
        env_var: "OCTOBROKER_CAPABILITY_SCHEMA_PATH",
        path: &["capability_schema_path"],
        var_type: EnvVarType::String,
    },
    EnvVarSpec {
        env_var: "OCTOBROKER_BACKGROUND_JOB_MODE",
        path: &["background_job_mode"],
        var_type: EnvVarType::Bool,
    },
    EnvVarSpec {
        env_var: "OCTOBROKER_PERMISSIVE_FALLBACK",
        path: &["permissive_fallback"],
        var_type: EnvVarType::Bool,
    },
    EnvVarSpec {
        env_var: "OCTOBROKER_LEGACY_TOKEN",
        path: &["legacy_token"],
        var_type: EnvVarType::String,
    },
    // Selection fields
    EnvVarSpec {
        env_var: "OCTOBROKER_SELECTION_HEALTHY_RATE_LIMIT_PERCENT",
        path: &["selection", "healthy_rate_limit_percent"],
        var_type: EnvVarType::U64,
    },
    EnvVarSpec {
        env_var: "OCTOBROKER_SELECTION_RATE_LIMIT_SAMPLE_MAX_AGE_SECS",
        path: &["selection", "rate_limit_sample_max_age_secs"],
        var_type: EnvVarType::U64,
    },
    EnvVarSpec {
        env_var: "OCTOBROKER_SELECTION_PROBE_CONCURRENCY",
        path: &["selection", "probe_concurrency"],
        var_type: EnvVarType::U64,
    },
    EnvVarSpec {
        env_var: "OCTOBROKER_SELECTION_TOKEN_REFRESH_MARGIN_SECS",
        path: &["selection", "token_refresh_margin_secs"],
        var_type: EnvVarType::U64,
    },
];

/// Returns the list of environment variable names recognised by the config loader.
#[must_use]
pub fn env_var_names() -> Vec<&'static str> {
    ENV_VAR_SPECS.iter().map(|spec| spec.env_var).collect()
}

/// Load a configuration file and push it to the composer.
///
/// The parent directory is opened with ambient authority and the file is read
/// through it.
fn load_config_file(path: &Utf8PathBuf, composer: &mut MergeComposer) -> Result<()> {
    let current_dir = Utf8PathBuf::from(".");
    let parent = path
        .parent()
        .filter(|dir| !dir.as_str().is_empty())
        .unwrap_or_else(|| current_dir.as_ref());
    let file_name = path.file_name().unwrap_or(path.as_str());

    let dir = Dir::open_ambient_dir(parent, ambient_authority()).map_err(|e| {
        ConfigError::ParseError {
            message: format!("failed to open directory {parent}: {e}"),
        }
    })?;

    let content = dir
        .read_to_string(file_name)
        .map_err(|e| ConfigError::ParseError {
            message: format!("failed to read {path}: {e}"),
        })?;

    let value =
        toml::from_str::<serde_json::Value>(&content).map_err(|e| ConfigError::ParseError {
            message: format!("failed to parse {path}: {e}"),
        })?;

    composer.push_file(value, Some(path.clone()));
    Ok(())
}

/// Locate the configuration file: an explicit `--config` path must exist,
/// otherwise discovery walks `OCTOBROKER_CONFIG_PATH` and the XDG locations.
fn locate_config_file(cli: &Cli) -> Result<Option<Utf8PathBuf>> {
    if let Some(explicit) = &cli.config {
        if !explicit.exists() {
            return Err(ConfigError::FileNotFound {
                path: explicit.to_string(),
            }
            .into());
        }
        return Ok(Some(explicit.clone()));
    }

    let discovery = ConfigDiscovery::builder("octobroker")
        .env_var("OCTOBROKER_CONFIG_PATH")
        .config_file_name("config.toml")
        .dotfile_name(".octobroker.toml")
        .build();
    Ok(discovery
        .candidates()
        .into_iter()
        .filter(|p| p.exists())
        .find_map(|p| Utf8PathBuf::try_from(p).ok()))
}

/// Load configuration with full layer precedence from the process environment.
///
/// # Errors
///
/// See [`load_config_with_env`].
pub fn load_config(cli: &Cli) -> Result<BrokerConfig> {
    load_config_with_env(cli, &DefaultEnv::new())
}

/// Load configuration with full layer precedence.
///
/// This function loads configuration from all available sources:
/// 1. Application defaults defined in the struct
/// 2. Configuration file (`--config`, `OCTOBROKER_CONFIG_PATH`, or XDG paths)
/// 3. Environment variables prefixed with `OCTOBROKER_`, read from `env`
/// 4. Command-line arguments (from the provided `Cli`)
///
/// Later sources override earlier ones. The merged result is validated.
///
/// # Errors
///
/// Returns `ConfigError` if configuration loading fails due to:
/// - A `--config` path that does not exist
/// - Malformed configuration files
/// - Invalid typed environment variable values
/// - Values rejected by [`BrokerConfig::validate`]
pub fn load_config_with_env<E: Env>(cli: &Cli, env: &E) -> Result<BrokerConfig> {
    let mut composer = MergeComposer::new();

    // Layer 1: Defaults (serialised from BrokerConfig::default()).
    let defaults =
        serde_json::to_value(BrokerConfig::default()).map_err(|e| ConfigError::ParseError {
            message: format!("failed to serialise defaults: {e}"),
        })?;
    composer.push_defaults(defaults);

    // Layer 2: Configuration file.
    if let Some(ref path) = locate_config_file(cli)? {
        tracing::debug!(%path, "loading configuration file");
        load_config_file(path, &mut composer)?;
    }

    // Layer 3: Environment variables.
    let env_values = collect_env_vars(env)?;
    if !env_values.is_null() {
        composer.push_environment(env_values);
    }

    // Layer 4: CLI overrides.
    let cli_overrides = build_cli_overrides(cli);
    if !cli_overrides.is_null() {
        composer.push_cli(cli_overrides);
    }

    let config =
        BrokerConfig::merge_from_layers(composer.layers()).map_err(ConfigError::OrthoConfig)?;
    config.validate()?;
    Ok(config)
}

/// Collect environment variables with the `OCTOBROKER_` prefix into a JSON value.
///
/// # Errors
///
/// Returns `ConfigError::InvalidValue` if a typed environment variable (bool, u64)
/// has an unparseable value.
fn collect_env_vars<E: Env>(env: &E) -> Result<Value> {
    let mut root = Map::new();

    for spec in ENV_VAR_SPECS {
        let Some(raw_value) = env.string(spec.env_var) else {
            continue;
        };

        let json_value = match spec.var_type {
            EnvVarType::String => Value::String(raw_value),
            EnvVarType::Bool => match raw_value.parse::<bool>() {
                Ok(b) => Value::Bool(b),
                Err(_) => {
                    return Err(ConfigError::InvalidValue {
                        field: spec.env_var.to_owned(),
                        reason: format!("expected bool (true/false), got '{raw_value}'"),
                    }
                    .into());
                }
            },
            EnvVarType::U64 => match raw_value.parse::<u64>() {
                Ok(n) => Value::Number(n.into()),
                Err(_) => {
                    return Err(ConfigError::InvalidValue {
                        field: spec.env_var.to_owned(),
                        reason: format!("expected unsigned integer, got '{raw_value}'"),
                    }
                    .into());
                }
            },
        };

        insert_at_path(&mut root, spec.path, json_value);
    }

    if root.is_empty() {
        Ok(Value::Null)
    } else {
        Ok(Value::Object(root))
    }
}

/// Insert a value at a nested path in a JSON map, creating intermediate
/// objects as needed.
fn insert_at_path(root: &mut Map<String, Value>, path: &[&str], value: Value) {
    let Some((&field, parents)) = path.split_last() else {
        return;
    };

    let mut current = root;
    for &segment in parents {
        let entry = current
            .entry(segment.to_owned())
            .or_insert_with(|| Value::Object(Map::new()));
        let Some(obj) = entry.as_object_mut() else {
            return;
        };
        current = obj;
    }

    current.insert(field.to_owned(), value);
}

/// Build a JSON value containing CLI overrides.
///
/// Flags only ever switch a setting on; leaving them off defers to lower layers.
fn build_cli_overrides(cli: &Cli) -> Value {
    let mut overrides = Map::new();

    if let Some(ref schema) = cli.schema {
        overrides.insert(
            "capability_schema_path".to_owned(),
            Value::String(schema.to_string()),
        );
    }

    if cli.background_jobs {
        overrides.insert("background_job_mode".to_owned(), Value::Bool(true));
    }

    if cli.permissive {
        overrides.insert("permissive_fallback".to_owned(), Value::Bool(true));
    }

    if overrides.is_empty() {
        Value::Null
    } else {
        Value::Object(overrides)
    }
}
