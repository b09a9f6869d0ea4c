//! Then step definitions for App signing key BDD tests.

use rstest_bdd_macros::then;

use super::state::{KeyOutcome, SigningKeyState, StepResult};

fn rejection(signing_key_state: &SigningKeyState) -> StepResult<String> {
    match signing_key_state
        .outcome
        .get()
        .ok_or_else(|| String::from("outcome should be set"))?
    {
        KeyOutcome::Rejected { message } => Ok(message),
        KeyOutcome::Accepted => Err(String::from("expected the key to be rejected")),
    }
}

#[then("the App key is accepted")]
fn key_accepted(signing_key_state: &SigningKeyState) -> StepResult<()> {
    match signing_key_state
        .outcome
        .get()
        .ok_or_else(|| String::from("outcome should be set"))?
    {
        KeyOutcome::Accepted => Ok(()),
        KeyOutcome::Rejected { message } => Err(format!("expected acceptance, got: {message}")),
    }
}

#[then("the App key is rejected")]
fn key_rejected(signing_key_state: &SigningKeyState) -> StepResult<()> {
    rejection(signing_key_state).map(|_| ())
}

#[then("the App key is rejected mentioning {fragment}")]
fn key_rejected_mentioning(
    signing_key_state: &SigningKeyState,
    fragment: String,
) -> StepResult<()> {
    let message = rejection(signing_key_state)?;
    if message.contains(&fragment) {
        Ok(())
    } else {
        Err(format!("expected '{fragment}' in: {message}"))
    }
}

#[then("the error names the key file")]
fn error_names_key_file(signing_key_state: &SigningKeyState) -> StepResult<()> {
    let message = rejection(signing_key_state)?;
    let key_path = signing_key_state
        .key_path
        .get()
        .ok_or_else(|| String::from("key path should be set"))?;
    if message.contains(key_path.as_str()) {
        Ok(())
    } else {
        Err(format!("expected '{key_path}' in: {message}"))
    }
}
