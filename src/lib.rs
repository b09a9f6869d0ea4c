//! Purpose-aware GitHub App installation selection.
//!
//! `octobroker` decides which GitHub App installation should serve an API
//! request for an organization and mints that installation's access token.
//! An organization may have several Apps installed, each registered for a
//! purpose such as `Data` or `BackgroundJobs`. The broker prefers the
//! installation whose purpose matches the caller, falls back across purposes
//! when that installation is missing or exhausted, and can pick by granted
//! permissions and remaining rate limit when the caller names an endpoint.
//!
//! # Modules
//!
//! - [`broker`]: The composition root and its authorization entry points
//! - [`purpose`]: Standard and custom purposes and their registry
//! - [`app`]: App configuration, clients and per-installation token caches
//! - [`installation`]: Lazily learned installation state and rate-limit samples
//! - [`selection`]: Purpose-priority and permission-aware selection
//! - [`permissions`]: Endpoint capability requirements and the manifest table
//! - [`organization`]: Organization settings and legacy tokens
//! - [`github`]: The GitHub API seam and its Octocrab implementation
//! - [`telemetry`]: Selection events
//! - [`config`]: Configuration system with layered precedence (CLI > env > file > defaults)
//! - [`error`]: Semantic error types for the application
//!
//! # Example
//!
//! ```no_run
//! use octobroker::broker::BrokerBuilder;
//! use octobroker::config::BrokerConfig;
//! use octobroker::purpose::StandardPurpose;
//! use octobroker::selection::AuthMode;
//!
//! # async fn example(config: BrokerConfig) -> octobroker::error::Result<()> {
//! let broker = BrokerBuilder::from_config(&config)?.build()?;
//! let provider = config.organization_provider();
//! let authorization = broker
//!     .authorize(
//!         &provider,
//!         "contoso",
//!         &StandardPurpose::Data.into(),
//!         AuthMode::BestAvailable,
//!         None,
//!     )
//!     .await?;
//! println!("{}", authorization.selection);
//! # Ok(())
//! # }
//! ```

pub mod app;
pub mod broker;
pub mod config;
pub mod error;
pub mod github;
pub mod installation;
pub mod organization;
pub mod permissions;
pub mod purpose;
pub mod selection;
pub mod telemetry;

pub use broker::{Authorization, BrokerBuilder, Credential, InstallationBroker, LegacyToken};
