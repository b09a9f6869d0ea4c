//! Choosing an installation for a request.
//!
//! Two strategies run in order:
//!
//! 1. Permission-aware selection ([`SelectionEngine::select_optimal`]) when
//!    endpoint requirements are supplied, the mode permits fallback, and the
//!    method qualifies. It filters valid installations by permission, shuffles
//!    them, and picks by rate-limit health tier.
//! 2. Purpose-priority selection ([`SelectionEngine::select_by_priority`]),
//!    which scans configured entries purpose by purpose. It is the fallback
//!    of the first strategy and the only one used without requirements.

mod optimal;
mod priority;

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use rand::SeedableRng;
use rand::rngs::StdRng;

use crate::app::ApplicationRegistry;
use crate::error::PermissionError;
use crate::installation::{InstallationLearner, RateLimitPolicy};
use crate::organization::OrganizationInstallation;
use crate::permissions::{CapabilitySchema, EndpointRequirements};
use crate::purpose::{Purpose, PurposeRegistry};
use crate::telemetry::TelemetrySink;

pub use optimal::{RateLimitTier, pick_tiered};

/// How strictly the caller wants a specific installation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthMode {
    /// Fall back across purposes and installations as needed.
    #[default]
    BestAvailable,
    /// Only the preferred purpose's installation will do.
    ForceSpecificInstallation,
}

/// The outcome of a selection: an installation and the purpose it was
/// chosen under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallationPurposePair {
    /// The chosen installation.
    pub installation_id: u64,
    /// The App the installation belongs to.
    pub app_id: u64,
    /// The purpose the installation serves in this selection.
    pub purpose: Purpose,
}

impl fmt::Display for InstallationPurposePair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "installation {} (app {}) as {}",
            self.installation_id, self.app_id, self.purpose
        )
    }
}

/// Tunables for the selection engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SelectionPolicy {
    /// Rate-limit health thresholds.
    pub rate_limit: RateLimitPolicy,
    /// Use the first configured installation when no purpose matches.
    pub permissive_fallback: bool,
}

/// The shared state both strategies read.
pub struct SelectionEngine {
    purposes: Arc<PurposeRegistry>,
    applications: Arc<ApplicationRegistry>,
    learner: Arc<InstallationLearner>,
    schema: Arc<CapabilitySchema>,
    policy: SelectionPolicy,
    background_job_mode: AtomicBool,
    rng: Mutex<StdRng>,
    telemetry: Arc<dyn TelemetrySink>,
}

/// Collaborators a [`SelectionEngine`] is assembled from.
pub struct SelectionParts {
    /// Registered purposes.
    pub purposes: Arc<PurposeRegistry>,
    /// Registered Apps.
    pub applications: Arc<ApplicationRegistry>,
    /// The installation memo.
    pub learner: Arc<InstallationLearner>,
    /// Endpoint capability table.
    pub schema: Arc<CapabilitySchema>,
    /// Telemetry destination.
    pub telemetry: Arc<dyn TelemetrySink>,
}

impl SelectionEngine {
    /// Assembles an engine. `seed` fixes the shuffle order for tests; `None`
    /// seeds from the operating system.
    #[must_use]
    pub fn new(parts: SelectionParts, policy: SelectionPolicy, seed: Option<u64>) -> Self {
        let rng = seed.map_or_else(StdRng::from_entropy, StdRng::seed_from_u64);
        Self {
            purposes: parts.purposes,
            applications: parts.applications,
            learner: parts.learner,
            schema: parts.schema,
            policy,
            background_job_mode: AtomicBool::new(false),
            rng: Mutex::new(rng),
            telemetry: parts.telemetry,
        }
    }

    /// The active policy.
    #[must_use]
    pub const fn policy(&self) -> &SelectionPolicy {
        &self.policy
    }

    /// Forces purpose-priority selection to try the background-jobs purpose
    /// first, for batch and offline processes.
    pub fn set_background_job_mode(&self, enabled: bool) {
        self.background_job_mode.store(enabled, Ordering::Release);
    }

    /// Returns whether background-job mode is on.
    #[must_use]
    pub fn background_job_mode(&self) -> bool {
        self.background_job_mode.load(Ordering::Acquire)
    }

    /// Chooses an installation for one request.
    ///
    /// Returns `Ok(None)` when nothing qualifies.
    ///
    /// # Errors
    ///
    /// Returns [`PermissionError::PermissionSchemaNotFound`] when strict
    /// requirements name an endpoint missing from the schema.
    pub async fn select_authorization(
        &self,
        organization: &str,
        preferred: &Purpose,
        entries: &[OrganizationInstallation],
        mode: AuthMode,
        requirements: Option<&EndpointRequirements>,
    ) -> Result<Option<InstallationPurposePair>, PermissionError> {
        if let Some(qualifying) = requirements.filter(|candidate| {
            mode == AuthMode::BestAvailable && candidate.permits_optimal_selection()
        }) {
            if let Some(pair) = self
                .select_optimal(organization, preferred, entries, qualifying)
                .await?
            {
                return Ok(Some(pair));
            }
            tracing::debug!(
                organization,
                purpose = %preferred,
                "permission-aware selection found nothing; falling back to purpose priority"
            );
        }
        Ok(self.select_by_priority(organization, preferred, entries, mode))
    }

    /// The purpose a selected entry is reported under.
    ///
    /// An explicit purpose tag wins, then the preferred purpose when the App
    /// serves it, then the first purpose the App is registered for.
    fn purpose_for_entry(
        &self,
        organization: &str,
        entry: &OrganizationInstallation,
        preferred: &Purpose,
    ) -> Purpose {
        if let Some(tagged) = entry
            .purpose
            .as_deref()
            .and_then(|tag| self.purposes.resolve(tag).ok())
        {
            return tagged;
        }
        if self
            .applications
            .serves_purpose(entry.app_id, preferred, organization)
        {
            return preferred.clone();
        }
        self.applications
            .purposes_for_app(entry.app_id, organization)
            .into_iter()
            .next()
            .unwrap_or_else(|| preferred.clone())
    }
}

impl fmt::Debug for SelectionEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SelectionEngine")
            .field("policy", &self.policy)
            .field("background_job_mode", &self.background_job_mode())
            .finish_non_exhaustive()
    }
}
