//! Behavioural step helpers for installation selection scenarios.

mod assertions;
mod scripted_github;
mod state;
mod steps;

pub use state::{SelectionState, selection_state};
