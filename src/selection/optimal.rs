//! Permission-aware, rate-limit-tiered selection.

use std::sync::PoisonError;

use rand::seq::SliceRandom;

use super::{InstallationPurposePair, SelectionEngine};
use crate::error::PermissionError;
use crate::installation::{AvailableInstallation, RateLimitPolicy};
use crate::organization::OrganizationInstallation;
use crate::permissions::{EndpointRequirements, RequiredCapabilities};
use crate::purpose::Purpose;
use crate::telemetry::TelemetryEvent;

/// The tier a candidate was picked from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitTier {
    /// Fresh sample above the healthy threshold.
    Healthy,
    /// Some budget left; stale or thin.
    Remaining,
}

/// Scans `candidates` in order: first a healthy one, then any with budget
/// left. Exhausted and never-sampled candidates are never picked.
#[must_use]
pub fn pick_tiered<'a>(
    candidates: &'a [AvailableInstallation],
    policy: &RateLimitPolicy,
) -> Option<(&'a AvailableInstallation, RateLimitTier)> {
    candidates
        .iter()
        .find(|candidate| candidate.record.has_recent_good_rate_limit(policy))
        .map(|candidate| (candidate, RateLimitTier::Healthy))
        .or_else(|| {
            candidates
                .iter()
                .find(|candidate| candidate.record.has_any_rate_limit_remaining())
                .map(|candidate| (candidate, RateLimitTier::Remaining))
        })
}

impl SelectionEngine {
    /// Permission-aware selection on its own, without the purpose-priority
    /// fallback.
    ///
    /// # Errors
    ///
    /// Returns [`PermissionError::PermissionSchemaNotFound`] for a strict
    /// schema miss.
    pub async fn select_optimal(
        &self,
        organization: &str,
        preferred: &Purpose,
        entries: &[OrganizationInstallation],
        requirements: &EndpointRequirements,
    ) -> Result<Option<InstallationPurposePair>, PermissionError> {
        let required = self
            .schema
            .resolve(requirements)?
            .unwrap_or_else(RequiredCapabilities::none);

        let mut candidates: Vec<AvailableInstallation> = self
            .learner
            .available_installations(organization, entries)
            .await
            .into_iter()
            .filter(|candidate| candidate.record.supports_permission(&required) == Some(true))
            .collect();

        if candidates.is_empty() {
            tracing::debug!(
                organization,
                required = %required,
                "no valid installation satisfies the required permissions"
            );
            return Ok(None);
        }

        {
            let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
            candidates.shuffle(&mut *rng);
        }

        self.sample_due(organization, &candidates).await;

        let Some((chosen, tier)) = pick_tiered(&candidates, &self.policy.rate_limit) else {
            return Ok(None);
        };

        if tier == RateLimitTier::Remaining {
            let observation = chosen
                .record
                .rate_limit_sample()
                .map(|sample| sample.observation);
            self.telemetry.emit(TelemetryEvent::LowRateLimitSelected {
                organization: String::from(organization),
                installation_id: chosen.record.installation_id(),
                remaining: observation.map_or(0, |found| found.remaining),
                percent_remaining: observation.map_or(0, |found| found.percent_remaining()),
            });
        }

        let purpose = self.purpose_for_entry(organization, &chosen.entry, preferred);
        tracing::debug!(
            organization,
            installation_id = chosen.record.installation_id(),
            purpose = %purpose,
            ?tier,
            "permission-aware selection chose installation"
        );
        Ok(Some(chosen.record.as_pair_with_purpose(purpose)))
    }

    /// Samples candidates whose rate limit is unknown, stale or exhausted
    /// past its reset, one at a time and at most once each.
    async fn sample_due(&self, organization: &str, candidates: &[AvailableInstallation]) {
        let policy = self.policy.rate_limit;
        for candidate in candidates
            .iter()
            .filter(|candidate| candidate.record.needs_rate_limit_sample(&policy))
        {
            match self
                .applications
                .application_by_id(candidate.entry.app_id, organization)
            {
                Ok(Some(application)) => {
                    candidate
                        .record
                        .refresh_rate_limit(application.client().as_ref())
                        .await;
                }
                Ok(None) => {}
                Err(error) => tracing::warn!(
                    app_id = candidate.entry.app_id,
                    %error,
                    "cannot build App client for rate-limit sample"
                ),
            }
        }
    }
}
