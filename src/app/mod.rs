//! GitHub App configurations and the runtime applications minted from them.
//!
//! An [`ApplicationConfig`] is the immutable description of one App. The
//! [`ApplicationRegistry`] turns configurations into [`Application`]s on
//! first use and memoises them by App id; an application is never rebuilt
//! once present. Each application caches installation tokens until they
//! approach expiry.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use camino::Utf8PathBuf;
use chrono::Utc;
use dashmap::DashMap;
use tokio::sync::Mutex;

use crate::error::{ConfigError, GitHubError};
use crate::github::{
    GitHubAppClient, InstallationToken, OctocrabAppClient, build_app_client, load_private_key,
    parse_private_key,
};
use crate::purpose::Purpose;

/// Where an App's JWT signing capability comes from.
#[derive(Clone)]
pub enum SigningKey {
    /// A PEM-encoded RSA private key on disk.
    PrivateKeyPath(Utf8PathBuf),
    /// PEM-encoded RSA key material held in memory.
    Pem(String),
    /// A remote-signing delegate that already implements the App client.
    Delegate(Arc<dyn GitHubAppClient>),
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PrivateKeyPath(path) => f.debug_tuple("PrivateKeyPath").field(path).finish(),
            Self::Pem(_) => f.write_str("Pem(<REDACTED>)"),
            Self::Delegate(_) => f.write_str("Delegate(<client>)"),
        }
    }
}

/// Immutable description of one GitHub App.
#[derive(Debug, Clone)]
pub struct ApplicationConfig {
    app_id: u64,
    signing: SigningKey,
    base_url: Option<String>,
    slug: String,
    name: Option<String>,
}

impl ApplicationConfig {
    /// Describes an App by id, signing key, and slug.
    #[must_use]
    pub fn new(app_id: u64, signing: SigningKey, slug: impl Into<String>) -> Self {
        Self {
            app_id,
            signing,
            base_url: None,
            slug: slug.into(),
            name: None,
        }
    }

    /// Points the App at a GitHub Enterprise Server API root.
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Sets the display name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// The numeric App id.
    #[must_use]
    pub const fn app_id(&self) -> u64 {
        self.app_id
    }

    /// The signing key source.
    #[must_use]
    pub const fn signing(&self) -> &SigningKey {
        &self.signing
    }

    /// The API base URL override, if any.
    #[must_use]
    pub fn base_url(&self) -> Option<&str> {
        self.base_url.as_deref()
    }

    /// The App slug.
    #[must_use]
    pub fn slug(&self) -> &str {
        &self.slug
    }

    /// The display name, falling back to the slug.
    #[must_use]
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.slug)
    }
}

/// Builds the remote API client for an App configuration.
pub type ClientFactory =
    Arc<dyn Fn(&ApplicationConfig) -> Result<Arc<dyn GitHubAppClient>, GitHubError> + Send + Sync>;

/// The production factory: delegates pass through, keys are loaded and
/// wrapped in an Octocrab client.
#[must_use]
pub fn octocrab_client_factory() -> ClientFactory {
    Arc::new(|config: &ApplicationConfig| {
        let key = match config.signing() {
            SigningKey::Delegate(client) => return Ok(Arc::clone(client)),
            SigningKey::PrivateKeyPath(path) => load_private_key(path)?,
            SigningKey::Pem(pem) => parse_private_key(pem)?,
        };
        let octocrab = build_app_client(config.app_id(), key, config.base_url())?;
        let client: Arc<dyn GitHubAppClient> = Arc::new(OctocrabAppClient::new(octocrab));
        Ok(client)
    })
}

/// A minted App: its remote client plus a per-installation token cache.
pub struct Application {
    config: ApplicationConfig,
    client: Arc<dyn GitHubAppClient>,
    tokens: DashMap<u64, Arc<Mutex<Option<InstallationToken>>>>,
    refresh_margin: Duration,
}

impl Application {
    /// Wraps a configuration and the client built for it.
    #[must_use]
    pub fn new(
        config: ApplicationConfig,
        client: Arc<dyn GitHubAppClient>,
        refresh_margin: Duration,
    ) -> Self {
        Self {
            config,
            client,
            tokens: DashMap::new(),
            refresh_margin,
        }
    }

    /// The configuration this application was built from.
    #[must_use]
    pub const fn config(&self) -> &ApplicationConfig {
        &self.config
    }

    /// The App id.
    #[must_use]
    pub const fn app_id(&self) -> u64 {
        self.config.app_id
    }

    /// The remote API client for this App.
    #[must_use]
    pub fn client(&self) -> &Arc<dyn GitHubAppClient> {
        &self.client
    }

    /// Returns a usable installation token, minting one when nothing is
    /// cached or the cached token expires within the refresh margin.
    ///
    /// Concurrent callers for one installation are serialised so a burst
    /// mints once; other installations of the same App are not blocked.
    ///
    /// # Errors
    ///
    /// Propagates the mint failure from the remote client.
    pub async fn installation_token(
        &self,
        installation_id: u64,
        organization: &str,
    ) -> Result<InstallationToken, GitHubError> {
        let slot = Arc::clone(self.tokens.entry(installation_id).or_default().value());
        let mut cached = slot.lock().await;
        if let Some(token) = cached.as_ref().filter(|token| self.is_fresh(token)) {
            tracing::debug!(
                app_id = self.app_id(),
                installation_id,
                "reusing cached installation token"
            );
            return Ok(token.clone());
        }

        let minted = self
            .client
            .mint_installation_token(installation_id, organization)
            .await?;
        *cached = Some(minted.clone());
        Ok(minted)
    }

    /// Checks the App credentials against GitHub.
    ///
    /// # Errors
    ///
    /// Returns [`GitHubError::AuthenticationFailed`] when GitHub rejects them.
    pub async fn validate_credentials(&self) -> Result<(), GitHubError> {
        self.client.validate_credentials().await
    }

    fn is_fresh(&self, token: &InstallationToken) -> bool {
        (token.expires_at() - Utc::now())
            .to_std()
            .is_ok_and(|left| left > self.refresh_margin)
    }
}

impl fmt::Debug for Application {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Application")
            .field("config", &self.config)
            .field("refresh_margin", &self.refresh_margin)
            .finish_non_exhaustive()
    }
}

/// Every App the broker knows, keyed by purpose and by App id.
pub struct ApplicationRegistry {
    configured: Vec<(Purpose, ApplicationConfig)>,
    resolver_purposes: Vec<Purpose>,
    by_id: DashMap<u64, Arc<Application>>,
    factory: ClientFactory,
    refresh_margin: Duration,
}

impl ApplicationRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new(factory: ClientFactory, refresh_margin: Duration) -> Self {
        Self {
            configured: Vec::new(),
            resolver_purposes: Vec::new(),
            by_id: DashMap::new(),
            factory,
            refresh_margin,
        }
    }

    /// Binds an App configuration to a purpose.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] if the purpose already has an
    /// App or the App id is zero.
    pub fn register(
        &mut self,
        purpose: Purpose,
        config: ApplicationConfig,
    ) -> Result<(), ConfigError> {
        if config.app_id() == 0 {
            return Err(ConfigError::InvalidValue {
                field: format!("apps[{purpose}].app_id"),
                reason: String::from("must be non-zero"),
            });
        }
        if self.configured.iter().any(|(existing, _)| *existing == purpose) {
            return Err(ConfigError::InvalidValue {
                field: String::from("apps"),
                reason: format!("purpose '{purpose}' already has an application"),
            });
        }
        self.configured.push((purpose, config));
        Ok(())
    }

    /// Records a custom purpose whose App is resolved per organization.
    pub fn register_resolver_purpose(&mut self, purpose: Purpose) {
        if purpose.as_custom().is_some_and(|custom| custom.has_resolver())
            && !self.resolver_purposes.contains(&purpose)
        {
            self.resolver_purposes.push(purpose);
        }
    }

    /// Returns whether any purposes have an App at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.configured.is_empty() && self.resolver_purposes.is_empty()
    }

    /// The statically configured App for `purpose`.
    #[must_use]
    pub fn config_for(&self, purpose: &Purpose) -> Option<&ApplicationConfig> {
        self.configured
            .iter()
            .find(|(configured, _)| configured == purpose)
            .map(|(_, config)| config)
    }

    /// The App configuration `purpose` uses for `organization`.
    ///
    /// A custom purpose's resolver takes precedence over a static binding.
    #[must_use]
    pub fn resolve_config(&self, purpose: &Purpose, organization: &str) -> Option<ApplicationConfig> {
        purpose
            .as_custom()
            .and_then(|custom| custom.resolve(organization))
            .or_else(|| self.config_for(purpose).cloned())
    }

    /// Returns whether App `app_id` serves `organization` under any purpose.
    ///
    /// An App a resolver supplied for another organization does not count,
    /// even once it has been built.
    #[must_use]
    pub fn is_registered(&self, app_id: u64, organization: &str) -> bool {
        self.configured
            .iter()
            .any(|(_, config)| config.app_id() == app_id)
            || self
                .resolver_config_for_app(app_id, organization)
                .is_some()
    }

    /// Returns whether App `app_id` is the one `purpose` uses for
    /// `organization`.
    #[must_use]
    pub fn serves_purpose(&self, app_id: u64, purpose: &Purpose, organization: &str) -> bool {
        self.resolve_config(purpose, organization)
            .is_some_and(|config| config.app_id() == app_id)
    }

    /// Purposes App `app_id` serves for `organization`, in registration order.
    #[must_use]
    pub fn purposes_for_app(&self, app_id: u64, organization: &str) -> Vec<Purpose> {
        self.configured
            .iter()
            .map(|(purpose, _)| purpose)
            .chain(self.resolver_purposes.iter())
            .filter(|purpose| self.serves_purpose(app_id, purpose, organization))
            .cloned()
            .collect()
    }

    /// The application `purpose` uses for `organization`, built on first use.
    ///
    /// # Errors
    ///
    /// Returns the client factory's error when the App cannot be built.
    pub fn application_for(
        &self,
        purpose: &Purpose,
        organization: &str,
    ) -> Result<Option<Arc<Application>>, GitHubError> {
        self.resolve_config(purpose, organization)
            .map(|config| self.materialise(config))
            .transpose()
    }

    /// The application with id `app_id`, built on first use.
    ///
    /// `organization` is consulted only for Apps supplied by a custom
    /// purpose's resolver; such an App is `None` for organizations its
    /// resolver does not serve.
    ///
    /// # Errors
    ///
    /// Returns the client factory's error when the App cannot be built.
    pub fn application_by_id(
        &self,
        app_id: u64,
        organization: &str,
    ) -> Result<Option<Arc<Application>>, GitHubError> {
        let config = self
            .configured
            .iter()
            .find(|(_, config)| config.app_id() == app_id)
            .map(|(_, config)| config.clone())
            .or_else(|| self.resolver_config_for_app(app_id, organization));
        config.map(|found| self.materialise(found)).transpose()
    }

    fn resolver_config_for_app(&self, app_id: u64, organization: &str) -> Option<ApplicationConfig> {
        self.resolver_purposes.iter().find_map(|purpose| {
            purpose
                .as_custom()
                .and_then(|custom| custom.resolve(organization))
                .filter(|config| config.app_id() == app_id)
        })
    }

    /// Upsert-if-absent: the first application built for an id wins.
    fn materialise(&self, config: ApplicationConfig) -> Result<Arc<Application>, GitHubError> {
        let app_id = config.app_id();
        let entry = self.by_id.entry(app_id).or_try_insert_with(|| {
            let client = (self.factory)(&config)?;
            tracing::info!(app_id, slug = config.slug(), "initialised GitHub App");
            Ok::<_, GitHubError>(Arc::new(Application::new(
                config,
                client,
                self.refresh_margin,
            )))
        })?;
        Ok(Arc::clone(entry.value()))
    }
}

impl fmt::Debug for ApplicationRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApplicationRegistry")
            .field("configured", &self.configured)
            .field("resolver_purposes", &self.resolver_purposes)
            .field("initialised", &self.by_id.len())
            .finish_non_exhaustive()
    }
}
