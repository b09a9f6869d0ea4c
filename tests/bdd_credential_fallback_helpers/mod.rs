//! Behavioural step helpers for credential fallback scenarios.

mod assertions;
mod state;
mod steps;

pub use state::{CredentialFallbackState, credential_fallback_state};
