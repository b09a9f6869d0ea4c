//! Scenario state for App signing key BDD tests.

use std::sync::Arc;

use camino::Utf8PathBuf;
use rstest_bdd::Slot;
use rstest_bdd_macros::ScenarioState;
use tempfile::TempDir;

/// Convenience alias for step outcomes.
pub type StepResult<T> = Result<T, String>;

/// Outcome of loading or parsing a signing key.
#[derive(Clone, Debug)]
pub enum KeyOutcome {
    /// The key is usable for JWT signing.
    Accepted,
    /// The key was rejected with the given error message.
    Rejected {
        /// The `Display` representation of the error.
        message: String,
    },
}

/// State shared across App signing key scenarios.
#[derive(Default, ScenarioState)]
pub struct SigningKeyState {
    /// Temporary directory backing the key file.
    pub(crate) temp_dir: Slot<Arc<TempDir>>,
    /// Path to the key file under test.
    pub(crate) key_path: Slot<Utf8PathBuf>,
    /// Inline PEM material under test.
    pub(crate) inline_pem: Slot<String>,
    /// Outcome of the most recent attempt.
    pub(crate) outcome: Slot<KeyOutcome>,
}

/// Fixture providing fresh state for each signing key scenario.
#[rstest::fixture]
pub fn signing_key_state() -> SigningKeyState {
    SigningKeyState::default()
}
