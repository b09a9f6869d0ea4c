//! Purpose-priority selection.

use super::{AuthMode, InstallationPurposePair, SelectionEngine};
use crate::installation::Validity;
use crate::organization::OrganizationInstallation;
use crate::purpose::{Purpose, StandardPurpose};

impl SelectionEngine {
    /// The order purposes are tried in.
    ///
    /// Background-job mode puts [`StandardPurpose::BackgroundJobs`] first,
    /// otherwise `preferred` leads. The remaining purposes follow in
    /// declaration order. [`AuthMode::ForceSpecificInstallation`] keeps only
    /// `preferred`.
    #[must_use]
    pub fn purpose_priority(&self, preferred: &Purpose, mode: AuthMode) -> Vec<Purpose> {
        if mode == AuthMode::ForceSpecificInstallation {
            return vec![preferred.clone()];
        }
        let lead = if self.background_job_mode() {
            Purpose::Standard(StandardPurpose::BackgroundJobs)
        } else {
            preferred.clone()
        };
        let rest: Vec<Purpose> = self
            .purposes
            .all_purposes()
            .into_iter()
            .filter(|purpose| *purpose != lead)
            .collect();
        std::iter::once(lead).chain(rest).collect()
    }

    /// Purpose-priority selection on its own.
    ///
    /// Scans `entries` once per purpose in [`Self::purpose_priority`] order
    /// and returns the first entry mapped to that purpose. Installations
    /// already learned invalid are skipped.
    #[must_use]
    pub fn select_by_priority(
        &self,
        organization: &str,
        preferred: &Purpose,
        entries: &[OrganizationInstallation],
        mode: AuthMode,
    ) -> Option<InstallationPurposePair> {
        let usable: Vec<&OrganizationInstallation> = entries
            .iter()
            .filter(|entry| self.applications.is_registered(entry.app_id, organization))
            .filter(|entry| !self.is_known_invalid(entry))
            .collect();

        for purpose in self.purpose_priority(preferred, mode) {
            if let Some(entry) = usable
                .iter()
                .find(|entry| self.entry_serves(organization, entry, &purpose))
            {
                tracing::debug!(
                    organization,
                    installation_id = entry.installation_id,
                    purpose = %purpose,
                    "purpose-priority selection chose installation"
                );
                return Some(pair(entry, purpose));
            }
        }

        if self.policy.permissive_fallback {
            if let Some(first) = usable.first() {
                tracing::debug!(
                    organization,
                    installation_id = first.installation_id,
                    "no purpose matched; using first configured installation"
                );
                return Some(pair(first, preferred.clone()));
            }
        }
        None
    }

    /// Matches by explicit purpose tag, or for untagged entries by the App's
    /// own purpose registration.
    fn entry_serves(
        &self,
        organization: &str,
        entry: &OrganizationInstallation,
        purpose: &Purpose,
    ) -> bool {
        entry.purpose.as_deref().map_or_else(
            || {
                self.applications
                    .serves_purpose(entry.app_id, purpose, organization)
            },
            |tag| self.purposes.resolve(tag).is_ok_and(|tagged| &tagged == purpose),
        )
    }

    fn is_known_invalid(&self, entry: &OrganizationInstallation) -> bool {
        self.learner
            .record(entry.installation_id)
            .is_some_and(|record| record.validity() == Validity::Invalid)
    }
}

fn pair(entry: &OrganizationInstallation, purpose: Purpose) -> InstallationPurposePair {
    InstallationPurposePair {
        installation_id: entry.installation_id,
        app_id: entry.app_id,
        purpose,
    }
}
