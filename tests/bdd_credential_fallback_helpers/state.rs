//! Scenario state for credential fallback BDD tests.

use octobroker::config::BrokerConfig;
use rstest_bdd::Slot;
use rstest_bdd_macros::ScenarioState;

/// Convenience alias for step outcomes.
pub type StepResult<T> = Result<T, String>;

/// Outcome of a credential request.
#[derive(Clone, Debug)]
pub enum CredentialOutcome {
    /// An App installation token was minted.
    Installation {
        /// The `Authorization` header value.
        header: String,
    },
    /// A legacy static token was returned.
    Legacy {
        /// The `Authorization` header value.
        header: String,
    },
    /// The request failed with the given error message.
    Failed {
        /// The `Display` representation of the error.
        message: String,
    },
}

/// State shared across credential fallback scenarios.
#[derive(Default, ScenarioState)]
pub struct CredentialFallbackState {
    /// Configuration the broker is built from.
    pub(crate) config: Slot<BrokerConfig>,
    /// Outcome of the most recent request.
    pub(crate) outcome: Slot<CredentialOutcome>,
}

/// Fixture providing fresh state for each credential fallback scenario.
#[rstest::fixture]
pub fn credential_fallback_state() -> CredentialFallbackState {
    CredentialFallbackState::default()
}
