//! Cached, learned state for one App installation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::sync::OnceCell;

use crate::error::GitHubError;
use crate::github::{GitHubAppClient, InstallationProbe, RateLimitObservation};
use crate::permissions::{InstallationPermissions, RequiredCapabilities};
use crate::purpose::Purpose;
use crate::selection::InstallationPurposePair;

/// Thresholds that classify a rate-limit sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitPolicy {
    /// A sample is healthy when its remaining percentage exceeds this.
    pub healthy_percent: u64,
    /// A sample older than this is no longer fresh.
    pub max_age: Duration,
}

impl Default for RateLimitPolicy {
    fn default() -> Self {
        Self {
            healthy_percent: 25,
            max_age: Duration::from_secs(120),
        }
    }
}

/// One rate-limit observation and when it was taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitSample {
    /// What GitHub reported.
    pub observation: RateLimitObservation,
    /// When the broker took the sample.
    pub observed_at: Instant,
}

impl RateLimitSample {
    /// Returns whether the sample is no older than `max_age`.
    #[must_use]
    pub fn is_fresh(&self, max_age: Duration) -> bool {
        self.observed_at.elapsed() <= max_age
    }
}

/// Classification of an installation's last rate-limit sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitHealth {
    /// Fresh and above the healthy threshold.
    Good,
    /// Some budget left, but stale or below the threshold.
    Low,
    /// Nothing left.
    Exhausted,
    /// Never sampled.
    Unknown,
}

/// Whether an installation may be used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Validity {
    /// Not yet learned (never probed, or the last probe failed transiently).
    Unknown,
    /// Probed and usable.
    Valid,
    /// Probed and permanently unusable for the life of the process.
    Invalid,
}

/// Why an installation was learned invalid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvalidReason {
    /// GitHub reports no such installation.
    NotFound,
    /// The installation exists but cannot be used.
    Unusable {
        /// The HTTP status GitHub answered with.
        status: u16,
        /// GitHub's explanation.
        message: String,
    },
}

/// The definitive outcome of a probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LearnedState {
    /// The installation is usable with these permissions.
    Valid {
        /// Granted permissions.
        permissions: InstallationPermissions,
        /// Account the App is installed on, if reported.
        account: Option<String>,
    },
    /// The installation must never be selected.
    Invalid(InvalidReason),
}

/// Derived state for one (App, installation) pair.
///
/// The learned state is written at most once; racing probes of the same
/// record converge on the first definitive result. Rate-limit samples are
/// always overwritten with the latest observation.
#[derive(Debug)]
pub struct InstallationRecord {
    app_id: u64,
    installation_id: u64,
    learned: OnceCell<LearnedState>,
    sample: Mutex<Option<RateLimitSample>>,
    sample_attempted: AtomicBool,
    missing_reported: AtomicBool,
}

impl InstallationRecord {
    /// A record with nothing learned yet.
    #[must_use]
    pub fn new(app_id: u64, installation_id: u64) -> Self {
        Self {
            app_id,
            installation_id,
            learned: OnceCell::new(),
            sample: Mutex::new(None),
            sample_attempted: AtomicBool::new(false),
            missing_reported: AtomicBool::new(false),
        }
    }

    /// The App id.
    #[must_use]
    pub const fn app_id(&self) -> u64 {
        self.app_id
    }

    /// The installation id.
    #[must_use]
    pub const fn installation_id(&self) -> u64 {
        self.installation_id
    }

    /// The learned state, if the installation has been probed definitively.
    #[must_use]
    pub fn learned(&self) -> Option<&LearnedState> {
        self.learned.get()
    }

    /// Current validity.
    #[must_use]
    pub fn validity(&self) -> Validity {
        match self.learned.get() {
            None => Validity::Unknown,
            Some(LearnedState::Valid { .. }) => Validity::Valid,
            Some(LearnedState::Invalid(_)) => Validity::Invalid,
        }
    }

    /// Learned permissions, when the installation is known valid.
    #[must_use]
    pub fn permissions(&self) -> Option<&InstallationPermissions> {
        match self.learned.get() {
            Some(LearnedState::Valid { permissions, .. }) => Some(permissions),
            _ => None,
        }
    }

    /// Whether the learned permissions cover `required`.
    ///
    /// `None` means nothing is known yet; callers filtering candidates treat
    /// that as unsupported without marking the record invalid.
    #[must_use]
    pub fn supports_permission(&self, required: &RequiredCapabilities) -> Option<bool> {
        self.permissions()
            .map(|permissions| required.satisfied_by(permissions))
    }

    /// The most recent rate-limit sample.
    #[must_use]
    pub fn rate_limit_sample(&self) -> Option<RateLimitSample> {
        *self.sample.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Classifies the most recent sample against `policy`.
    #[must_use]
    pub fn rate_limit_health(&self, policy: &RateLimitPolicy) -> RateLimitHealth {
        let Some(sample) = self.rate_limit_sample() else {
            return RateLimitHealth::Unknown;
        };
        if sample.observation.remaining == 0 {
            return RateLimitHealth::Exhausted;
        }
        if sample.is_fresh(policy.max_age)
            && sample.observation.percent_remaining() > policy.healthy_percent
        {
            return RateLimitHealth::Good;
        }
        RateLimitHealth::Low
    }

    /// Fresh sample with remaining percentage above the healthy threshold.
    #[must_use]
    pub fn has_recent_good_rate_limit(&self, policy: &RateLimitPolicy) -> bool {
        self.rate_limit_health(policy) == RateLimitHealth::Good
    }

    /// Any remaining budget at all, regardless of age or threshold.
    #[must_use]
    pub fn has_any_rate_limit_remaining(&self) -> bool {
        self.rate_limit_sample()
            .is_some_and(|sample| sample.observation.remaining > 0)
    }

    /// Whether a rate-limit sample has been attempted, successful or not.
    #[must_use]
    pub fn has_attempted_rate_limit(&self) -> bool {
        self.sample_attempted.load(Ordering::Acquire)
    }

    /// Whether selection should take a new sample before ranking this
    /// installation.
    ///
    /// True when no sample was ever attempted, when the held sample is older
    /// than `policy.max_age`, or when it shows an exhausted budget whose
    /// reset time has passed or is unknown. A failed attempt with no sample
    /// held is not retried.
    #[must_use]
    pub fn needs_rate_limit_sample(&self, policy: &RateLimitPolicy) -> bool {
        if !self.has_attempted_rate_limit() {
            return true;
        }
        let Some(sample) = self.rate_limit_sample() else {
            return false;
        };
        if !sample.is_fresh(policy.max_age) {
            return true;
        }
        sample.observation.remaining == 0
            && sample
                .observation
                .reset_at
                .is_none_or(|reset_at| reset_at <= Utc::now())
    }

    /// Stores an observation taken now, replacing any earlier one.
    pub fn record_rate_limit(&self, observation: RateLimitObservation) {
        self.record_sample(RateLimitSample {
            observation,
            observed_at: Instant::now(),
        });
    }

    /// Stores a sample, replacing any earlier one.
    pub fn record_sample(&self, sample: RateLimitSample) {
        *self.sample.lock().unwrap_or_else(PoisonError::into_inner) = Some(sample);
        self.sample_attempted.store(true, Ordering::Release);
    }

    /// Samples the rate limit now. Failures are logged and leave the
    /// previous sample in place.
    pub async fn refresh_rate_limit(&self, client: &dyn GitHubAppClient) {
        self.sample_attempted.store(true, Ordering::Release);
        match client.sample_rate_limit(self.installation_id).await {
            Ok(observation) => self.record_rate_limit(observation),
            Err(error) => tracing::warn!(
                installation_id = self.installation_id,
                %error,
                "rate-limit sample failed"
            ),
        }
    }

    /// Probes the installation unless a definitive result is already held.
    ///
    /// Not-found and unusable answers are definitive and cached. Every other
    /// failure leaves the record unlearned so a later call retries it.
    ///
    /// # Errors
    ///
    /// Returns the non-definitive probe failure.
    pub async fn learn(&self, client: &dyn GitHubAppClient) -> Result<Validity, GitHubError> {
        self.learned
            .get_or_try_init(|| async {
                let outcome = client.probe_installation(self.installation_id).await;
                self.interpret_probe(outcome)
            })
            .await?;
        Ok(self.validity())
    }

    fn interpret_probe(
        &self,
        outcome: Result<InstallationProbe, GitHubError>,
    ) -> Result<LearnedState, GitHubError> {
        match outcome {
            Ok(probe) => {
                if let Some(observation) = probe.rate_limit {
                    self.record_rate_limit(observation);
                }
                tracing::info!(
                    app_id = self.app_id,
                    installation_id = self.installation_id,
                    permissions = probe.permissions.len(),
                    "learned installation"
                );
                Ok(LearnedState::Valid {
                    permissions: probe.permissions,
                    account: probe.account,
                })
            }
            Err(GitHubError::InstallationNotFound { .. }) => {
                Ok(LearnedState::Invalid(InvalidReason::NotFound))
            }
            Err(GitHubError::InstallationUnusable {
                status, message, ..
            }) => Ok(LearnedState::Invalid(InvalidReason::Unusable {
                status,
                message,
            })),
            Err(other) => Err(other),
        }
    }

    /// Returns `true` exactly once, the first time a caller sees this record
    /// learned as not found.
    pub(super) fn claim_missing_report(&self) -> bool {
        matches!(
            self.learned.get(),
            Some(LearnedState::Invalid(InvalidReason::NotFound))
        ) && !self.missing_reported.swap(true, Ordering::AcqRel)
    }

    /// The selection result for this installation under `purpose`.
    #[must_use]
    pub const fn as_pair_with_purpose(&self, purpose: Purpose) -> InstallationPurposePair {
        InstallationPurposePair {
            installation_id: self.installation_id,
            app_id: self.app_id,
            purpose,
        }
    }
}
