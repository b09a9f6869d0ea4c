//! Scenario state for installation selection BDD tests.

use std::collections::HashMap;
use std::sync::Arc;

use octobroker::organization::OrganizationInstallation;
use octobroker::telemetry::MemoryTelemetry;
use rstest_bdd::Slot;
use rstest_bdd_macros::ScenarioState;

/// Convenience alias for step outcomes.
pub type StepResult<T> = Result<T, String>;

/// The organization every scenario runs against.
pub const ORGANIZATION: &str = "contoso";

/// Outcome of an authorization attempt.
#[derive(Clone, Debug)]
pub enum SelectionOutcome {
    /// An installation was selected and its token minted.
    Authorized {
        /// The selected installation.
        installation_id: u64,
        /// Display identifier of the purpose it was selected under.
        purpose: String,
        /// The minted token value.
        token: String,
    },
    /// Authorization failed with the given error message.
    Failed {
        /// The `Display` representation of the error.
        message: String,
    },
}

/// State shared across installation selection scenarios.
#[derive(Default, ScenarioState)]
pub struct SelectionState {
    /// Installation entries configured for the organization.
    pub(crate) installations: Slot<Vec<OrganizationInstallation>>,
    /// Permissions each installation grants at read level.
    pub(crate) read_permissions: Slot<HashMap<u64, Vec<String>>>,
    /// Requests left per installation; unlisted installations have a full budget.
    pub(crate) remaining: Slot<HashMap<u64, u64>>,
    /// Installations GitHub reports as gone.
    pub(crate) missing: Slot<Vec<u64>>,
    /// Whether background-job mode is on.
    pub(crate) background_job_mode: Slot<bool>,
    /// Whether only the preferred purpose is accepted.
    pub(crate) specific: Slot<bool>,
    /// Path template the request targets, if permission-aware.
    pub(crate) target_path: Slot<String>,
    /// Whether the target must be listed in the manifest.
    pub(crate) strict: Slot<bool>,
    /// Telemetry captured while authorizing.
    pub(crate) telemetry: Slot<Arc<MemoryTelemetry>>,
    /// Outcome of the most recent authorization.
    pub(crate) outcome: Slot<SelectionOutcome>,
}

/// Fixture providing fresh state for each selection scenario.
#[rstest::fixture]
pub fn selection_state() -> SelectionState {
    SelectionState::default()
}
