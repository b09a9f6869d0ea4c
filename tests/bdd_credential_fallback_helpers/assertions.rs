//! Then step definitions for credential fallback BDD tests.

use rstest_bdd_macros::then;

use super::state::{CredentialFallbackState, CredentialOutcome, StepResult};

fn outcome(credential_fallback_state: &CredentialFallbackState) -> StepResult<CredentialOutcome> {
    credential_fallback_state
        .outcome
        .get()
        .ok_or_else(|| String::from("outcome should be set"))
}

#[then("an installation token is issued")]
fn installation_token_issued(
    credential_fallback_state: &CredentialFallbackState,
) -> StepResult<()> {
    match outcome(credential_fallback_state)? {
        CredentialOutcome::Installation { .. } => Ok(()),
        other => Err(format!("expected an installation token, got: {other:?}")),
    }
}

#[then("a legacy token is issued")]
fn legacy_token_issued(credential_fallback_state: &CredentialFallbackState) -> StepResult<()> {
    match outcome(credential_fallback_state)? {
        CredentialOutcome::Legacy { .. } => Ok(()),
        other => Err(format!("expected a legacy token, got: {other:?}")),
    }
}

#[then("the authorization header is token {value}")]
fn authorization_header(
    credential_fallback_state: &CredentialFallbackState,
    value: String,
) -> StepResult<()> {
    let expected = format!("token {value}");
    match outcome(credential_fallback_state)? {
        CredentialOutcome::Installation { header } | CredentialOutcome::Legacy { header }
            if header == expected =>
        {
            Ok(())
        }
        CredentialOutcome::Installation { header } | CredentialOutcome::Legacy { header } => {
            Err(format!("expected header '{expected}', got '{header}'"))
        }
        CredentialOutcome::Failed { message } => {
            Err(format!("expected a credential, got failure: {message}"))
        }
    }
}

#[then("no credential is available")]
fn no_credential(credential_fallback_state: &CredentialFallbackState) -> StepResult<()> {
    match outcome(credential_fallback_state)? {
        CredentialOutcome::Failed { message } if message.contains("no credential of any kind") => {
            Ok(())
        }
        other => Err(format!("expected no credential, got: {other:?}")),
    }
}
