//! Command-line argument definitions for octobroker.

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};

/// Command-line interface for octobroker.
#[derive(Debug, Parser)]
#[command(name = "octobroker")]
#[command(
    author,
    version,
    about = "Purpose-aware GitHub App installation selection and token brokering"
)]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Path to configuration file.
    #[arg(long, global = true)]
    pub config: Option<Utf8PathBuf>,

    /// Path to the GitHub permission manifest (JSON).
    #[arg(long, global = true)]
    pub schema: Option<Utf8PathBuf>,

    /// Prefer the background-jobs purpose in every selection.
    #[arg(long, global = true)]
    pub background_jobs: bool,

    /// Use the first configured installation when no purpose matches.
    #[arg(long, global = true)]
    pub permissive: bool,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Print the App permissions an endpoint requires.
    Permissions(PermissionsArgs),

    /// Choose an installation for an organization without minting a token.
    Select(SelectArgs),

    /// Select an installation and mint its token.
    Token(TokenArgs),

    /// Check an App's credentials against `GET /app`.
    ValidateApp(ValidateAppArgs),
}

/// An endpoint, identified by method and path template.
#[derive(Debug, Clone, Args)]
pub struct EndpointArgs {
    /// HTTP method of the request.
    #[arg(long, default_value = "GET")]
    pub method: String,

    /// Path template, with `{param}` or `:param` placeholders.
    #[arg(long)]
    pub path: Option<String>,

    /// Fail when the endpoint is missing from the permission manifest.
    #[arg(long)]
    pub strict: bool,
}

/// Arguments for the `permissions` subcommand.
#[derive(Debug, Parser)]
pub struct PermissionsArgs {
    /// The endpoint to look up.
    #[command(flatten)]
    pub endpoint: EndpointArgs,
}

/// Arguments for the `select` subcommand.
#[derive(Debug, Parser)]
pub struct SelectArgs {
    /// Organization login.
    #[arg(long, required = true)]
    pub org: String,

    /// Preferred purpose identifier.
    #[arg(long, default_value = "Data")]
    pub purpose: String,

    /// Only the preferred purpose's installation will do.
    #[arg(long)]
    pub specific: bool,

    /// Endpoint the credential is for, enabling permission-aware selection.
    #[command(flatten)]
    pub endpoint: EndpointArgs,
}

/// Arguments for the `token` subcommand.
#[derive(Debug, Parser)]
pub struct TokenArgs {
    /// Organization login.
    #[arg(long, required = true)]
    pub org: String,

    /// Preferred purpose identifier.
    #[arg(long, default_value = "Data")]
    pub purpose: String,

    /// Endpoint the credential is for, enabling permission-aware selection.
    #[command(flatten)]
    pub endpoint: EndpointArgs,
}

/// Arguments for the `validate-app` subcommand.
#[derive(Debug, Parser)]
pub struct ValidateAppArgs {
    /// Purpose whose App should be checked.
    #[arg(long, required = true)]
    pub purpose: String,

    /// Organization, for purposes whose App varies per organization.
    #[arg(long)]
    pub org: Option<String>,
}
