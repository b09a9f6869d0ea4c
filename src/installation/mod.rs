//! Installation records and the learner that populates them.
//!
//! An [`InstallationRecord`] holds what the broker has learned about one
//! installation: whether it is usable, which permissions it was granted, and
//! its latest rate-limit sample. The [`InstallationLearner`] memoises records
//! process-wide and probes unknown ones with bounded concurrency, so each
//! installation is probed definitively at most once.

mod learner;
mod record;

pub use learner::{AvailableInstallation, DEFAULT_PROBE_CONCURRENCY, InstallationLearner};
pub use record::{
    InstallationRecord, InvalidReason, LearnedState, RateLimitHealth, RateLimitPolicy,
    RateLimitSample, Validity,
};
