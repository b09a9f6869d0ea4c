//! Given and When step definitions for installation selection BDD tests.

use std::sync::Arc;

use octobroker::app::{ApplicationConfig, SigningKey};
use octobroker::broker::InstallationBroker;
use octobroker::github::GitHubAppClient;
use octobroker::organization::OrganizationInstallation;
use octobroker::permissions::{CapabilitySchema, EndpointRequirements, HttpMethod};
use octobroker::selection::AuthMode;
use octobroker::telemetry::MemoryTelemetry;
use rstest_bdd_macros::{given, when};

use super::scripted_github::ScriptedGitHub;
use super::state::{ORGANIZATION, SelectionOutcome, SelectionState, StepResult};

const DATA_APP: u64 = 1;
const BACKGROUND_JOBS_APP: u64 = 2;

const MANIFEST: &str = r#"{
    "paths": {
        "/orgs/{org}/members": {
            "GET": { "permission": "members", "access": "read" }
        },
        "/repos/{owner}/{repo}/contents/{path}": {
            "GET": { "permission": "contents", "access": "read" }
        }
    }
}"#;

fn app_for_purpose(purpose: &str) -> StepResult<u64> {
    match purpose {
        "Data" => Ok(DATA_APP),
        "BackgroundJobs" => Ok(BACKGROUND_JOBS_APP),
        other => Err(format!("no App is bound to purpose {other} in these scenarios")),
    }
}

fn build_broker(
    selection_state: &SelectionState,
    telemetry: Arc<MemoryTelemetry>,
) -> StepResult<InstallationBroker> {
    let github = ScriptedGitHub {
        read_permissions: selection_state.read_permissions.get().unwrap_or_default(),
        remaining: selection_state.remaining.get().unwrap_or_default(),
        missing: selection_state.missing.get().unwrap_or_default(),
    };
    let client: Arc<dyn GitHubAppClient> = Arc::new(github);
    let schema = CapabilitySchema::from_json(MANIFEST, "scenario manifest")
        .map_err(|e| format!("manifest should parse: {e}"))?;

    InstallationBroker::builder()
        .application(
            "Data",
            ApplicationConfig::new(
                DATA_APP,
                SigningKey::Delegate(Arc::clone(&client)),
                "contoso-data",
            ),
        )
        .application(
            "BackgroundJobs",
            ApplicationConfig::new(
                BACKGROUND_JOBS_APP,
                SigningKey::Delegate(client),
                "contoso-jobs",
            ),
        )
        .schema(schema)
        .telemetry(telemetry)
        .background_job_mode(selection_state.background_job_mode.get().unwrap_or(false))
        .seed(11)
        .build()
        .map_err(|e| format!("broker should build: {e}"))
}

fn requirements(selection_state: &SelectionState) -> Option<EndpointRequirements> {
    let path = selection_state.target_path.get()?;
    let requirements = EndpointRequirements::new(HttpMethod::Get, path);
    Some(if selection_state.strict.get().unwrap_or(false) {
        requirements.strict()
    } else {
        requirements
    })
}

#[given("the {purpose} App is installed as installation {installation_id}")]
fn app_installed(
    selection_state: &SelectionState,
    purpose: String,
    installation_id: u64,
) -> StepResult<()> {
    let app_id = app_for_purpose(&purpose)?;
    let mut installations = selection_state.installations.get().unwrap_or_default();
    installations.push(OrganizationInstallation::new(app_id, installation_id));
    selection_state.installations.set(installations);
    Ok(())
}

#[given("installation {installation_id} grants {permission} read access")]
#[expect(
    clippy::unnecessary_wraps,
    reason = "rstest-bdd step functions must return StepResult"
)]
fn installation_grants(
    selection_state: &SelectionState,
    installation_id: u64,
    permission: String,
) -> StepResult<()> {
    let mut granted = selection_state.read_permissions.get().unwrap_or_default();
    granted.entry(installation_id).or_default().push(permission);
    selection_state.read_permissions.set(granted);
    Ok(())
}

#[given("installation {installation_id} has {remaining} requests remaining")]
#[expect(
    clippy::unnecessary_wraps,
    reason = "rstest-bdd step functions must return StepResult"
)]
fn installation_budget(
    selection_state: &SelectionState,
    installation_id: u64,
    remaining: u64,
) -> StepResult<()> {
    let mut budgets = selection_state.remaining.get().unwrap_or_default();
    budgets.insert(installation_id, remaining);
    selection_state.remaining.set(budgets);
    Ok(())
}

#[given("installation {installation_id} no longer exists")]
#[expect(
    clippy::unnecessary_wraps,
    reason = "rstest-bdd step functions must return StepResult"
)]
fn installation_gone(selection_state: &SelectionState, installation_id: u64) -> StepResult<()> {
    let mut missing = selection_state.missing.get().unwrap_or_default();
    missing.push(installation_id);
    selection_state.missing.set(missing);
    Ok(())
}

#[given("background-job mode is enabled")]
#[expect(
    clippy::unnecessary_wraps,
    reason = "rstest-bdd step functions must return StepResult"
)]
fn background_mode(selection_state: &SelectionState) -> StepResult<()> {
    selection_state.background_job_mode.set(true);
    Ok(())
}

#[given("only the preferred purpose is accepted")]
#[expect(
    clippy::unnecessary_wraps,
    reason = "rstest-bdd step functions must return StepResult"
)]
fn specific_mode(selection_state: &SelectionState) -> StepResult<()> {
    selection_state.specific.set(true);
    Ok(())
}

#[given("the request targets GET {path}")]
#[expect(
    clippy::unnecessary_wraps,
    reason = "rstest-bdd step functions must return StepResult"
)]
fn request_targets(selection_state: &SelectionState, path: String) -> StepResult<()> {
    selection_state.target_path.set(path);
    Ok(())
}

#[given("the request must be listed in the permission manifest")]
#[expect(
    clippy::unnecessary_wraps,
    reason = "rstest-bdd step functions must return StepResult"
)]
fn request_strict(selection_state: &SelectionState) -> StepResult<()> {
    selection_state.strict.set(true);
    Ok(())
}

#[when("a {purpose} token is requested")]
fn token_requested(selection_state: &SelectionState, purpose: String) -> StepResult<()> {
    let telemetry = Arc::new(MemoryTelemetry::new());
    let broker = build_broker(selection_state, Arc::clone(&telemetry))?;
    let preferred = broker
        .purpose(&purpose)
        .map_err(|e| format!("purpose should be registered: {e}"))?;
    let entries = selection_state.installations.get().unwrap_or_default();
    let mode = if selection_state.specific.get().unwrap_or(false) {
        AuthMode::ForceSpecificInstallation
    } else {
        AuthMode::BestAvailable
    };
    let request = requirements(selection_state);

    let rt = tokio::runtime::Runtime::new()
        .map_err(|e| format!("failed to create tokio runtime: {e}"))?;
    let result = rt.block_on(broker.authorization(
        ORGANIZATION,
        &preferred,
        &entries,
        mode,
        request.as_ref(),
    ));

    selection_state.outcome.set(match result {
        Ok(authorization) => SelectionOutcome::Authorized {
            installation_id: authorization.selection.installation_id,
            purpose: authorization.selection.purpose.display_id().to_owned(),
            token: authorization.token.value().to_owned(),
        },
        Err(error) => SelectionOutcome::Failed {
            message: error.to_string(),
        },
    });
    selection_state.telemetry.set(telemetry);
    Ok(())
}
