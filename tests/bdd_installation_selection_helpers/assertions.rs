//! Then step definitions for installation selection BDD tests.

use rstest_bdd_macros::then;

use super::state::{SelectionOutcome, SelectionState, StepResult};

fn outcome(selection_state: &SelectionState) -> StepResult<SelectionOutcome> {
    selection_state
        .outcome
        .get()
        .ok_or_else(|| String::from("outcome should be set"))
}

fn failure_message(selection_state: &SelectionState) -> StepResult<String> {
    match outcome(selection_state)? {
        SelectionOutcome::Failed { message } => Ok(message),
        SelectionOutcome::Authorized {
            installation_id, ..
        } => Err(format!(
            "expected authorization to fail, got installation {installation_id}"
        )),
    }
}

#[then("installation {installation_id} is selected for purpose {purpose}")]
fn installation_selected(
    selection_state: &SelectionState,
    installation_id: u64,
    purpose: String,
) -> StepResult<()> {
    match outcome(selection_state)? {
        SelectionOutcome::Authorized {
            installation_id: selected,
            purpose: selected_purpose,
            ..
        } if selected == installation_id && selected_purpose == purpose => Ok(()),
        SelectionOutcome::Authorized {
            installation_id: selected,
            purpose: selected_purpose,
            ..
        } => Err(format!(
            "expected installation {installation_id} as {purpose}, \
             got {selected} as {selected_purpose}"
        )),
        SelectionOutcome::Failed { message } => {
            Err(format!("expected a selection, got failure: {message}"))
        }
    }
}

#[then("the minted token is {token}")]
fn minted_token(selection_state: &SelectionState, token: String) -> StepResult<()> {
    match outcome(selection_state)? {
        SelectionOutcome::Authorized { token: minted, .. } if minted == token => Ok(()),
        SelectionOutcome::Authorized { token: minted, .. } => {
            Err(format!("expected token {token}, got {minted}"))
        }
        SelectionOutcome::Failed { message } => {
            Err(format!("expected a token, got failure: {message}"))
        }
    }
}

#[then("the authorization fails for purpose {purpose}")]
fn authorization_fails(selection_state: &SelectionState, purpose: String) -> StepResult<()> {
    let message = failure_message(selection_state)?;
    let expected = format!("(purpose '{purpose}')");
    if message.contains("no GitHub App authorization available") && message.contains(&expected) {
        Ok(())
    } else {
        Err(format!("expected exhaustion for {purpose}, got: {message}"))
    }
}

#[then("the request is rejected as missing from the permission manifest")]
fn rejected_as_unlisted(selection_state: &SelectionState) -> StepResult<()> {
    let message = failure_message(selection_state)?;
    if message.contains("no permission schema entry") {
        Ok(())
    } else {
        Err(format!("expected a schema miss, got: {message}"))
    }
}

#[then("telemetry records {event}")]
fn telemetry_records(selection_state: &SelectionState, event: String) -> StepResult<()> {
    let telemetry = selection_state
        .telemetry
        .get()
        .ok_or_else(|| String::from("telemetry should be captured"))?;
    if telemetry.count(&event) > 0 {
        Ok(())
    } else {
        Err(format!(
            "expected a {event} event, got: {:?}",
            telemetry.events()
        ))
    }
}
