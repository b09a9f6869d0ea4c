//! Behavioural step helpers for App signing key scenarios.

mod assertions;
mod state;
mod steps;

pub use state::{SigningKeyState, signing_key_state};
