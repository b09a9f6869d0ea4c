//! The composition root: one broker instance owning every shared cache.
//!
//! An [`InstallationBroker`] is assembled once with [`BrokerBuilder`] and
//! shared by the host application. It owns the purpose registry, the App
//! registry, the installation memo and the selection engine, so separate
//! broker instances never share state.
//!
//! Three entry points cover the common call shapes:
//!
//! - [`InstallationBroker::authorization`] when the caller already holds the
//!   organization's installation entries.
//! - [`InstallationBroker::authorize`] when the entries come from an
//!   [`OrganizationSettingsProvider`].
//! - [`InstallationBroker::authorize_with_fallback`], which additionally
//!   answers legacy organizations with a static token.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::app::{
    Application, ApplicationConfig, ApplicationRegistry, ClientFactory, SigningKey,
    octocrab_client_factory,
};
use crate::config::BrokerConfig;
use crate::error::{ConfigError, PermissionError, Result, SelectionError};
use crate::github::InstallationToken;
use crate::installation::{DEFAULT_PROBE_CONCURRENCY, InstallationLearner};
use crate::organization::{
    LegacyTokenSource, OrganizationInstallation, OrganizationSettings,
    OrganizationSettingsProvider,
};
use crate::permissions::{CapabilitySchema, EndpointRequirements, RequiredCapabilities};
use crate::purpose::{CustomPurpose, Purpose, PurposeRegistry};
use crate::selection::{
    AuthMode, InstallationPurposePair, SelectionEngine, SelectionParts, SelectionPolicy,
};
use crate::telemetry::{TelemetryEvent, TelemetrySink, TracingTelemetry};

/// Default margin before expiry at which a cached token is re-minted.
pub const DEFAULT_TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(300);

/// A selected installation together with a token minted for it.
#[derive(Debug, Clone)]
pub struct Authorization {
    /// The installation and purpose that were chosen.
    pub selection: InstallationPurposePair,
    /// The installation access token.
    pub token: InstallationToken,
}

impl Authorization {
    /// The `Authorization` header value (`token <value>`).
    #[must_use]
    pub fn authorization_header(&self) -> String {
        self.token.authorization_header()
    }

    /// When the token stops working.
    #[must_use]
    pub const fn expires_at(&self) -> DateTime<Utc> {
        self.token.expires_at()
    }
}

/// A static bearer token used by organizations without App configuration.
#[derive(Clone, PartialEq, Eq)]
pub struct LegacyToken(String);

impl LegacyToken {
    /// Wraps a raw token.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// The raw token.
    #[must_use]
    pub fn value(&self) -> &str {
        &self.0
    }

    /// The `Authorization` header value (`token <value>`).
    #[must_use]
    pub fn authorization_header(&self) -> String {
        format!("token {}", self.0)
    }
}

impl fmt::Debug for LegacyToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("LegacyToken(<REDACTED>)")
    }
}

/// Whatever credential the broker could produce for an organization.
#[derive(Debug, Clone)]
pub enum Credential {
    /// An App installation token.
    Installation(Authorization),
    /// A legacy static token.
    Legacy(LegacyToken),
}

impl Credential {
    /// The `Authorization` header value for either kind.
    #[must_use]
    pub fn authorization_header(&self) -> String {
        match self {
            Self::Installation(authorization) => authorization.authorization_header(),
            Self::Legacy(token) => token.authorization_header(),
        }
    }

    /// The selection behind an installation credential.
    #[must_use]
    pub const fn selection(&self) -> Option<&InstallationPurposePair> {
        match self {
            Self::Installation(authorization) => Some(&authorization.selection),
            Self::Legacy(_) => None,
        }
    }
}

/// Assembles an [`InstallationBroker`].
///
/// Purpose bindings are recorded by identifier and resolved in
/// [`BrokerBuilder::build`], after every custom purpose is registered, so the
/// call order of [`BrokerBuilder::custom_purpose`] and
/// [`BrokerBuilder::application`] does not matter.
pub struct BrokerBuilder {
    custom: Vec<CustomPurpose>,
    bindings: Vec<(String, ApplicationConfig)>,
    schema: Arc<CapabilitySchema>,
    factory: ClientFactory,
    telemetry: Arc<dyn TelemetrySink>,
    policy: SelectionPolicy,
    probe_concurrency: usize,
    refresh_margin: Duration,
    background_job_mode: bool,
    seed: Option<u64>,
}

impl Default for BrokerBuilder {
    fn default() -> Self {
        Self {
            custom: Vec::new(),
            bindings: Vec::new(),
            schema: Arc::new(CapabilitySchema::empty()),
            factory: octocrab_client_factory(),
            telemetry: Arc::new(TracingTelemetry),
            policy: SelectionPolicy::default(),
            probe_concurrency: DEFAULT_PROBE_CONCURRENCY,
            refresh_margin: DEFAULT_TOKEN_REFRESH_MARGIN,
            background_job_mode: false,
            seed: None,
        }
    }
}

impl BrokerBuilder {
    /// A builder with production defaults and no Apps.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A builder seeded from merged configuration.
    ///
    /// Loads the permission manifest when a path is configured and binds
    /// every configured App to its purpose by key path. Custom purposes,
    /// the client factory and telemetry can still be set afterwards.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingRequired`] for an App without a key
    /// path and [`PermissionError::SchemaLoadFailed`] when the manifest
    /// cannot be read.
    pub fn from_config(config: &BrokerConfig) -> Result<Self> {
        let mut builder = Self::new()
            .policy(config.selection_policy())
            .probe_concurrency(config.selection.probe_concurrency)
            .refresh_margin(config.selection.token_refresh_margin())
            .background_job_mode(config.background_job_mode);

        if let Some(path) = &config.capability_schema_path {
            builder = builder.schema(CapabilitySchema::load(path)?);
        }

        for (index, entry) in config.apps.iter().enumerate() {
            let key_path = entry
                .private_key_path
                .clone()
                .ok_or_else(|| ConfigError::MissingRequired {
                    field: format!("apps[{index}].private_key_path"),
                })?;
            let mut app_config = ApplicationConfig::new(
                entry.app_id,
                SigningKey::PrivateKeyPath(key_path),
                entry.slug_or_default(),
            );
            if let Some(base_url) = &entry.base_url {
                app_config = app_config.with_base_url(base_url.clone());
            }
            if let Some(name) = &entry.name {
                app_config = app_config.with_name(name.clone());
            }
            builder = builder.application(entry.purpose.clone(), app_config);
        }

        Ok(builder)
    }

    /// Registers a custom purpose.
    #[must_use]
    pub fn custom_purpose(mut self, purpose: CustomPurpose) -> Self {
        self.custom.push(purpose);
        self
    }

    /// Binds an App to the purpose identified by `purpose`.
    #[must_use]
    pub fn application(mut self, purpose: impl Into<String>, config: ApplicationConfig) -> Self {
        self.bindings.push((purpose.into(), config));
        self
    }

    /// Sets the endpoint capability table.
    #[must_use]
    pub fn schema(mut self, schema: CapabilitySchema) -> Self {
        self.schema = Arc::new(schema);
        self
    }

    /// Replaces the App client factory.
    #[must_use]
    pub fn client_factory(mut self, factory: ClientFactory) -> Self {
        self.factory = factory;
        self
    }

    /// Replaces the telemetry sink.
    #[must_use]
    pub fn telemetry(mut self, telemetry: Arc<dyn TelemetrySink>) -> Self {
        self.telemetry = telemetry;
        self
    }

    /// Sets the selection policy.
    #[must_use]
    pub const fn policy(mut self, policy: SelectionPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Sets how many installations are probed at once.
    #[must_use]
    pub const fn probe_concurrency(mut self, concurrency: usize) -> Self {
        self.probe_concurrency = concurrency;
        self
    }

    /// Sets the token refresh margin.
    #[must_use]
    pub const fn refresh_margin(mut self, margin: Duration) -> Self {
        self.refresh_margin = margin;
        self
    }

    /// Starts the broker in background-job mode.
    #[must_use]
    pub const fn background_job_mode(mut self, enabled: bool) -> Self {
        self.background_job_mode = enabled;
        self
    }

    /// Fixes the shuffle seed.
    #[must_use]
    pub const fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Registers every purpose and App and wires the shared caches.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] for duplicate or empty custom purpose ids,
    /// bindings naming an unknown purpose, two Apps bound to one purpose,
    /// or a zero App id.
    pub fn build(self) -> std::result::Result<InstallationBroker, ConfigError> {
        let mut purpose_registry = PurposeRegistry::new();
        let mut registered_custom = Vec::with_capacity(self.custom.len());
        for custom in self.custom {
            registered_custom.push(purpose_registry.register_custom(custom)?);
        }

        let mut application_registry = ApplicationRegistry::new(self.factory, self.refresh_margin);
        for (purpose_id, config) in self.bindings {
            let bound = purpose_registry.resolve(&purpose_id)?;
            application_registry.register(bound, config)?;
        }
        for custom in registered_custom {
            application_registry.register_resolver_purpose(custom);
        }

        let purposes = Arc::new(purpose_registry);
        let applications = Arc::new(application_registry);
        let learner = Arc::new(InstallationLearner::new(
            Arc::clone(&applications),
            self.probe_concurrency,
            Arc::clone(&self.telemetry),
        ));
        let engine = SelectionEngine::new(
            SelectionParts {
                purposes: Arc::clone(&purposes),
                applications: Arc::clone(&applications),
                learner: Arc::clone(&learner),
                schema: Arc::clone(&self.schema),
                telemetry: Arc::clone(&self.telemetry),
            },
            self.policy,
            self.seed,
        );
        engine.set_background_job_mode(self.background_job_mode);

        tracing::debug!(
            purposes = purposes.all_purposes().len(),
            schema_entries = self.schema.len(),
            background_job_mode = self.background_job_mode,
            "assembled installation broker"
        );

        Ok(InstallationBroker {
            purposes,
            applications,
            learner,
            schema: self.schema,
            engine,
            telemetry: self.telemetry,
        })
    }
}

impl fmt::Debug for BrokerBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BrokerBuilder")
            .field("custom", &self.custom)
            .field("bindings", &self.bindings)
            .field("policy", &self.policy)
            .field("probe_concurrency", &self.probe_concurrency)
            .field("refresh_margin", &self.refresh_margin)
            .field("background_job_mode", &self.background_job_mode)
            .finish_non_exhaustive()
    }
}

/// Selects installations and mints tokens for organizations.
pub struct InstallationBroker {
    purposes: Arc<PurposeRegistry>,
    applications: Arc<ApplicationRegistry>,
    learner: Arc<InstallationLearner>,
    schema: Arc<CapabilitySchema>,
    engine: SelectionEngine,
    telemetry: Arc<dyn TelemetrySink>,
}

impl InstallationBroker {
    /// Starts a [`BrokerBuilder`].
    #[must_use]
    pub fn builder() -> BrokerBuilder {
        BrokerBuilder::new()
    }

    /// Looks up a registered purpose by identifier.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::UnknownPurpose`] when nothing matches.
    pub fn purpose(&self, id: &str) -> std::result::Result<Purpose, ConfigError> {
        self.purposes.resolve(id)
    }

    /// Purpose tags in `settings` that name no registered purpose.
    ///
    /// Each problem names the offending entry as
    /// `<organization>.installations[<index>].purpose`.
    #[must_use]
    pub fn purpose_tag_problems(&self, settings: &OrganizationSettings) -> Vec<ConfigError> {
        settings
            .installations
            .iter()
            .enumerate()
            .filter_map(|(index, entry)| {
                let tag = entry.purpose.as_deref()?;
                self.purposes.resolve(tag).err().map(|_| ConfigError::InvalidValue {
                    field: format!("{}.installations[{index}].purpose", settings.name),
                    reason: format!("purpose '{tag}' is not registered"),
                })
            })
            .collect()
    }

    /// Every registered purpose in fallback order.
    #[must_use]
    pub fn purposes(&self) -> Vec<Purpose> {
        self.purposes.all_purposes()
    }

    /// The installation memo, for diagnostics.
    #[must_use]
    pub fn learner(&self) -> &InstallationLearner {
        &self.learner
    }

    /// The endpoint capability table.
    #[must_use]
    pub fn schema(&self) -> &CapabilitySchema {
        &self.schema
    }

    /// The capabilities a request needs, resolved against the schema.
    ///
    /// # Errors
    ///
    /// Returns [`PermissionError::PermissionSchemaNotFound`] for a strict miss.
    pub fn required_capabilities(
        &self,
        requirements: &EndpointRequirements,
    ) -> std::result::Result<Option<RequiredCapabilities>, PermissionError> {
        self.schema.resolve(requirements)
    }

    /// Toggles the process-wide background-job override.
    pub fn set_background_job_mode(&self, enabled: bool) {
        self.engine.set_background_job_mode(enabled);
    }

    /// Returns whether background-job mode is on.
    #[must_use]
    pub fn background_job_mode(&self) -> bool {
        self.engine.background_job_mode()
    }

    /// Chooses an installation without minting a token.
    ///
    /// # Errors
    ///
    /// Returns [`PermissionError::PermissionSchemaNotFound`] for a strict
    /// schema miss.
    pub async fn select_authorization(
        &self,
        organization: &str,
        preferred: &Purpose,
        entries: &[OrganizationInstallation],
        mode: AuthMode,
        requirements: Option<&EndpointRequirements>,
    ) -> std::result::Result<Option<InstallationPurposePair>, PermissionError> {
        self.engine
            .select_authorization(organization, preferred, entries, mode, requirements)
            .await
    }

    /// Mints (or reuses) a token for a selected installation.
    ///
    /// The App is resolved by the pair's App id, falling back to the App
    /// bound to the pair's purpose.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::NoApplicationForPurpose`] when no App can be
    /// resolved, or the [`GitHubError`] raised while building the App or
    /// minting the token.
    pub async fn installation_token(
        &self,
        selection: &InstallationPurposePair,
        organization: &str,
    ) -> Result<InstallationToken> {
        let application = self.resolve_application(selection, organization)?;
        let token = application
            .installation_token(selection.installation_id, organization)
            .await?;
        Ok(token)
    }

    /// Selects an installation for `organization` and mints its token.
    ///
    /// # Errors
    ///
    /// - [`ConfigError::NoInstallationMapping`] when `entries` is empty.
    /// - [`SelectionError::NoAuthorizationAvailable`] when nothing qualifies.
    /// - [`PermissionError::PermissionSchemaNotFound`] for a strict schema miss.
    /// - The [`GitHubError`] or [`ConfigError`] raised while minting.
    pub async fn authorization(
        &self,
        organization: &str,
        preferred: &Purpose,
        entries: &[OrganizationInstallation],
        mode: AuthMode,
        requirements: Option<&EndpointRequirements>,
    ) -> Result<Authorization> {
        if entries.is_empty() {
            return Err(ConfigError::NoInstallationMapping {
                organization: String::from(organization),
            }
            .into());
        }

        let Some(selection) = self
            .select_authorization(organization, preferred, entries, mode, requirements)
            .await?
        else {
            self.telemetry.emit(TelemetryEvent::AuthorizationExhausted {
                organization: String::from(organization),
                purpose: String::from(preferred.display_id()),
            });
            return Err(SelectionError::NoAuthorizationAvailable {
                organization: String::from(organization),
                purpose: String::from(preferred.display_id()),
            }
            .into());
        };

        let token = self.installation_token(&selection, organization).await?;
        tracing::info!(
            organization,
            installation_id = selection.installation_id,
            app_id = selection.app_id,
            purpose = %selection.purpose,
            expires_at = %token.expires_at(),
            "authorized organization"
        );
        Ok(Authorization { selection, token })
    }

    /// Like [`Self::authorization`], reading the organization's entries from
    /// `provider`.
    ///
    /// # Errors
    ///
    /// Returns [`SelectionError::NoAppConfigured`] when the organization is
    /// unknown to `provider` or uses legacy static-token configuration, and
    /// otherwise the errors of [`Self::authorization`].
    pub async fn authorize(
        &self,
        provider: &dyn OrganizationSettingsProvider,
        organization: &str,
        preferred: &Purpose,
        mode: AuthMode,
        requirements: Option<&EndpointRequirements>,
    ) -> Result<Authorization> {
        let settings = provider
            .organization(organization)
            .await
            .filter(|found| found.dynamic)
            .ok_or_else(|| SelectionError::NoAppConfigured {
                organization: String::from(organization),
            })?;
        self.authorization(
            organization,
            preferred,
            &settings.installations,
            mode,
            requirements,
        )
        .await
    }

    /// Like [`Self::authorize`], answering organizations without App
    /// configuration with a legacy token from `legacy`.
    ///
    /// # Errors
    ///
    /// Returns [`SelectionError::NoCredential`] when the organization has no
    /// App configuration and `legacy` has no token for it, and otherwise the
    /// errors of [`Self::authorize`].
    pub async fn authorize_with_fallback(
        &self,
        provider: &dyn OrganizationSettingsProvider,
        legacy: &dyn LegacyTokenSource,
        organization: &str,
        preferred: &Purpose,
        mode: AuthMode,
        requirements: Option<&EndpointRequirements>,
    ) -> Result<Credential> {
        match self
            .authorize(provider, organization, preferred, mode, requirements)
            .await
        {
            Ok(authorization) => Ok(Credential::Installation(authorization)),
            Err(error) if error.is_no_app_configured() => {
                tracing::debug!(organization, "no App configuration; using legacy token");
                legacy
                    .legacy_token(organization)
                    .map(|token| Credential::Legacy(LegacyToken::new(token)))
                    .ok_or_else(|| {
                        SelectionError::NoCredential {
                            organization: String::from(organization),
                        }
                        .into()
                    })
            }
            Err(error) => Err(error),
        }
    }

    /// Checks the credentials of the App bound to `purpose` against GitHub.
    ///
    /// `organization` is only consulted for custom purposes whose App is
    /// resolved per organization.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::NoApplicationForPurpose`] when the purpose has
    /// no App, or the [`GitHubError`] raised while building or validating it.
    pub async fn validate_application(
        &self,
        purpose: &Purpose,
        organization: Option<&str>,
    ) -> Result<u64> {
        let application = self
            .applications
            .application_for(purpose, organization.unwrap_or_default())?
            .ok_or_else(|| no_application(purpose))?;
        application.validate_credentials().await?;
        tracing::info!(
            app_id = application.app_id(),
            purpose = %purpose,
            "validated GitHub App credentials"
        );
        Ok(application.app_id())
    }

    fn resolve_application(
        &self,
        selection: &InstallationPurposePair,
        organization: &str,
    ) -> Result<Arc<Application>> {
        if let Some(found) = self
            .applications
            .application_by_id(selection.app_id, organization)?
        {
            return Ok(found);
        }
        let bound = self
            .applications
            .application_for(&selection.purpose, organization)?
            .ok_or_else(|| no_application(&selection.purpose))?;
        Ok(bound)
    }
}

fn no_application(purpose: &Purpose) -> ConfigError {
    ConfigError::NoApplicationForPurpose {
        purpose: String::from(purpose.display_id()),
    }
}

impl fmt::Debug for InstallationBroker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstallationBroker")
            .field("purposes", &self.purposes)
            .field("applications", &self.applications)
            .field("learner", &self.learner)
            .field("engine", &self.engine)
            .finish_non_exhaustive()
    }
}
