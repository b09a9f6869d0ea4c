//! Bounded-concurrency learning of unknown installations.

use std::collections::HashSet;
use std::sync::Arc;

use dashmap::DashMap;
use futures_util::{StreamExt, stream};

use super::record::{InstallationRecord, Validity};
use crate::app::ApplicationRegistry;
use crate::organization::OrganizationInstallation;
use crate::telemetry::{TelemetryEvent, TelemetrySink};

/// Default number of probes in flight while warming an organization.
pub const DEFAULT_PROBE_CONCURRENCY: usize = 3;

/// A configured installation entry whose record is known valid.
#[derive(Debug, Clone)]
pub struct AvailableInstallation {
    /// The organization's configuration entry.
    pub entry: OrganizationInstallation,
    /// The shared learned record.
    pub record: Arc<InstallationRecord>,
}

/// Process-wide memo of installation records, keyed by installation id.
pub struct InstallationLearner {
    records: DashMap<u64, Arc<InstallationRecord>>,
    applications: Arc<ApplicationRegistry>,
    concurrency: usize,
    telemetry: Arc<dyn TelemetrySink>,
}

impl InstallationLearner {
    /// Creates an empty learner. A `concurrency` of zero is treated as one.
    #[must_use]
    pub fn new(
        applications: Arc<ApplicationRegistry>,
        concurrency: usize,
        telemetry: Arc<dyn TelemetrySink>,
    ) -> Self {
        Self {
            records: DashMap::new(),
            applications,
            concurrency: concurrency.max(1),
            telemetry,
        }
    }

    /// The memoised record for `installation_id`, if it has been referenced.
    #[must_use]
    pub fn record(&self, installation_id: u64) -> Option<Arc<InstallationRecord>> {
        self.records
            .get(&installation_id)
            .map(|entry| Arc::clone(entry.value()))
    }

    /// Number of installations referenced so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns whether no installation has been referenced.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// The record for an installation, created on first reference.
    pub fn record_for(&self, app_id: u64, installation_id: u64) -> Arc<InstallationRecord> {
        let entry = self
            .records
            .entry(installation_id)
            .or_insert_with(|| Arc::new(InstallationRecord::new(app_id, installation_id)));
        Arc::clone(entry.value())
    }

    /// The entries whose installations are currently valid, learning any
    /// unknown ones first.
    ///
    /// Entries for Apps the broker does not know are skipped. Unknown
    /// installations are probed with bounded concurrency; the result keeps
    /// input order.
    pub async fn available_installations(
        &self,
        organization: &str,
        entries: &[OrganizationInstallation],
    ) -> Vec<AvailableInstallation> {
        let candidates: Vec<AvailableInstallation> = entries
            .iter()
            .filter(|entry| {
                let known = self.applications.is_registered(entry.app_id, organization);
                if !known {
                    tracing::debug!(
                        organization,
                        app_id = entry.app_id,
                        installation_id = entry.installation_id,
                        "skipping installation for unregistered App"
                    );
                }
                known
            })
            .map(|entry| AvailableInstallation {
                entry: entry.clone(),
                record: self.record_for(entry.app_id, entry.installation_id),
            })
            .collect();

        let mut seen = HashSet::new();
        let unknown: Vec<&AvailableInstallation> = candidates
            .iter()
            .filter(|candidate| candidate.record.validity() == Validity::Unknown)
            .filter(|candidate| seen.insert(candidate.record.installation_id()))
            .collect();

        if !unknown.is_empty() {
            tracing::debug!(
                organization,
                unknown = unknown.len(),
                concurrency = self.concurrency,
                "probing unknown installations"
            );
            stream::iter(unknown)
                .map(|candidate| self.learn_one(organization, candidate))
                .buffer_unordered(self.concurrency)
                .collect::<Vec<()>>()
                .await;
        }

        candidates
            .into_iter()
            .filter(|candidate| candidate.record.validity() == Validity::Valid)
            .collect()
    }

    async fn learn_one(&self, organization: &str, candidate: &AvailableInstallation) {
        let app_id = candidate.entry.app_id;
        let installation_id = candidate.entry.installation_id;
        let application = match self.applications.application_by_id(app_id, organization) {
            Ok(Some(application)) => application,
            Ok(None) => return,
            Err(error) => {
                tracing::warn!(app_id, %error, "cannot build App client; installation stays unknown");
                return;
            }
        };

        match candidate.record.learn(application.client().as_ref()).await {
            Ok(Validity::Invalid) => {
                tracing::warn!(
                    organization,
                    app_id,
                    installation_id,
                    reason = ?candidate.record.learned(),
                    "installation is unusable and will be skipped"
                );
                if candidate.record.claim_missing_report() {
                    self.telemetry.emit(TelemetryEvent::InstallationMissing {
                        organization: String::from(organization),
                        app_id,
                        installation_id,
                    });
                }
            }
            Ok(_) => {}
            Err(error) if error.is_transient() => tracing::warn!(
                organization,
                installation_id,
                %error,
                "transient failure probing installation; will retry on a later call"
            ),
            Err(error) => tracing::warn!(
                organization,
                installation_id,
                %error,
                "probe failed without a definitive answer; installation stays unknown"
            ),
        }
    }
}

impl std::fmt::Debug for InstallationLearner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstallationLearner")
            .field("records", &self.records.len())
            .field("concurrency", &self.concurrency)
            .finish_non_exhaustive()
    }
}
