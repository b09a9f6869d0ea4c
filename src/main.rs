//! `octobroker` application entry point.
//!
//! This binary exposes the installation broker for operators: it explains
//! which App permissions an endpoint needs, previews installation selection,
//! mints tokens, and checks App credentials. It uses `eyre` for opaque error
//! handling at the application boundary, converting domain-specific errors
//! into human-readable reports.
//!
//! Configuration is loaded with layered precedence via `OrthoConfig`:
//! 1. Application defaults
//! 2. Configuration file (`~/.config/octobroker/config.toml` or path from `OCTOBROKER_CONFIG_PATH`)
//! 3. Environment variables (`OCTOBROKER_*`)
//! 4. Command-line arguments

use std::str::FromStr;

use clap::Parser;
use eyre::{Report, Result as EyreResult};
use octobroker::broker::{BrokerBuilder, Credential, InstallationBroker};
use octobroker::config::{
    BrokerConfig, Cli, Commands, EndpointArgs, PermissionsArgs, SelectArgs, TokenArgs,
    ValidateAppArgs, load_config,
};
use octobroker::error::{ConfigError, Result as BrokerResult, SelectionError};
use octobroker::organization::OrganizationSettingsProvider;
use octobroker::permissions::{EndpointRequirements, HttpMethod};
use octobroker::selection::AuthMode;
use tracing_subscriber::EnvFilter;

/// Application entry point.
///
/// Installs the tracing subscriber, loads configuration, then dispatches to
/// the subcommand handler on a Tokio runtime.
fn main() -> EyreResult<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("octobroker=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli).map_err(Report::from)?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime
        .block_on(run(&cli, &config))
        .map_err(Report::from)
}

/// Execute the CLI command, returning domain-specific errors.
///
/// Keeps semantic errors inside the run loop so the CLI boundary owns
/// conversion to `eyre::Report`.
async fn run(cli: &Cli, config: &BrokerConfig) -> BrokerResult<()> {
    let broker = BrokerBuilder::from_config(config)?.build()?;
    if let Some(problem) = config
        .organizations
        .iter()
        .flat_map(|settings| broker.purpose_tag_problems(settings))
        .next()
    {
        return Err(problem.into());
    }
    match &cli.command {
        Commands::Permissions(args) => show_permissions(&broker, args),
        Commands::Select(args) => preview_selection(&broker, config, args).await,
        Commands::Token(args) => mint_token(&broker, config, args).await,
        Commands::ValidateApp(args) => validate_app(&broker, args).await,
    }
}

fn endpoint_requirements(args: &EndpointArgs) -> BrokerResult<Option<EndpointRequirements>> {
    let Some(path) = &args.path else {
        return Ok(None);
    };
    let method = HttpMethod::from_str(&args.method)?;
    let requirements = EndpointRequirements::new(method, path.as_str());
    Ok(Some(if args.strict {
        requirements.strict()
    } else {
        requirements
    }))
}

/// Print the App permissions an endpoint requires.
#[expect(clippy::print_stdout, reason = "CLI output is the intended behaviour")]
fn show_permissions(broker: &InstallationBroker, args: &PermissionsArgs) -> BrokerResult<()> {
    let requirements =
        endpoint_requirements(&args.endpoint)?.ok_or_else(|| ConfigError::MissingRequired {
            field: String::from("path"),
        })?;
    match broker.required_capabilities(&requirements)? {
        Some(capabilities) if capabilities.is_empty() => {
            println!(
                "{} {} needs no permissions",
                requirements.method(),
                requirements.path()
            );
        }
        Some(capabilities) => println!("{capabilities}"),
        None => println!(
            "{} {} is not in the permission manifest",
            requirements.method(),
            requirements.path()
        ),
    }
    Ok(())
}

/// Print the installation that would serve a request.
#[expect(clippy::print_stdout, reason = "CLI output is the intended behaviour")]
async fn preview_selection(
    broker: &InstallationBroker,
    config: &BrokerConfig,
    args: &SelectArgs,
) -> BrokerResult<()> {
    let purpose = broker.purpose(&args.purpose)?;
    let requirements = endpoint_requirements(&args.endpoint)?;
    let settings = config
        .organization_provider()
        .organization(&args.org)
        .await
        .filter(|found| found.dynamic)
        .ok_or_else(|| SelectionError::NoAppConfigured {
            organization: args.org.clone(),
        })?;
    let mode = if args.specific {
        AuthMode::ForceSpecificInstallation
    } else {
        AuthMode::BestAvailable
    };

    let selection = broker
        .select_authorization(
            &args.org,
            &purpose,
            &settings.installations,
            mode,
            requirements.as_ref(),
        )
        .await?;
    match selection {
        Some(pair) => println!("{pair}"),
        None => println!("no usable installation for {}", args.org),
    }
    Ok(())
}

/// Mint a credential and report what was chosen.
///
/// The token itself is never printed.
#[expect(clippy::print_stdout, reason = "CLI output is the intended behaviour")]
async fn mint_token(
    broker: &InstallationBroker,
    config: &BrokerConfig,
    args: &TokenArgs,
) -> BrokerResult<()> {
    let purpose = broker.purpose(&args.purpose)?;
    let requirements = endpoint_requirements(&args.endpoint)?;
    let credential = broker
        .authorize_with_fallback(
            &config.organization_provider(),
            &config.legacy_tokens(),
            &args.org,
            &purpose,
            AuthMode::BestAvailable,
            requirements.as_ref(),
        )
        .await?;
    match credential {
        Credential::Installation(authorization) => println!(
            "minted token for {}, expires {}",
            authorization.selection,
            authorization.expires_at().to_rfc3339()
        ),
        Credential::Legacy(_) => println!("using legacy token for {}", args.org),
    }
    Ok(())
}

/// Check the credentials of the App serving a purpose.
#[expect(clippy::print_stdout, reason = "CLI output is the intended behaviour")]
async fn validate_app(broker: &InstallationBroker, args: &ValidateAppArgs) -> BrokerResult<()> {
    let purpose = broker.purpose(&args.purpose)?;
    let app_id = broker
        .validate_application(&purpose, args.org.as_deref())
        .await?;
    println!("app {app_id} credentials are valid for {purpose}");
    Ok(())
}
