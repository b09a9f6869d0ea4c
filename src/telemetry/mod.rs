//! Fire-and-forget selection telemetry.
//!
//! Sinks are infallible: emitting an event never changes a selection outcome.

use std::fmt;
use std::sync::{Mutex, PoisonError};

/// A noteworthy selection outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TelemetryEvent {
    /// An installation was chosen even though its rate limit is not healthy.
    LowRateLimitSelected {
        /// The organization the selection was made for.
        organization: String,
        /// The chosen installation.
        installation_id: u64,
        /// Requests left in the current window.
        remaining: u64,
        /// Remaining budget as a percentage of the limit.
        percent_remaining: u64,
    },
    /// Probing found that a configured installation no longer exists.
    InstallationMissing {
        /// The organization the installation is configured for.
        organization: String,
        /// The App the installation belongs to.
        app_id: u64,
        /// The missing installation.
        installation_id: u64,
    },
    /// No installation could be selected for a request.
    AuthorizationExhausted {
        /// The organization the selection was made for.
        organization: String,
        /// Display identifier of the preferred purpose.
        purpose: String,
    },
}

impl TelemetryEvent {
    /// A stable event name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::LowRateLimitSelected { .. } => "low_rate_limit_selected",
            Self::InstallationMissing { .. } => "installation_missing",
            Self::AuthorizationExhausted { .. } => "authorization_exhausted",
        }
    }
}

/// Receives telemetry events.
pub trait TelemetrySink: Send + Sync {
    /// Records one event. Must not block or fail.
    fn emit(&self, event: TelemetryEvent);
}

/// Emits telemetry as `tracing` events under the `octobroker::telemetry` target.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingTelemetry;

impl TelemetrySink for TracingTelemetry {
    fn emit(&self, event: TelemetryEvent) {
        match event {
            TelemetryEvent::LowRateLimitSelected {
                organization,
                installation_id,
                remaining,
                percent_remaining,
            } => tracing::warn!(
                target: "octobroker::telemetry",
                event = "low_rate_limit_selected",
                organization = %organization,
                installation_id,
                remaining,
                percent_remaining,
                "selected installation with a low rate limit"
            ),
            TelemetryEvent::InstallationMissing {
                organization,
                app_id,
                installation_id,
            } => tracing::warn!(
                target: "octobroker::telemetry",
                event = "installation_missing",
                organization = %organization,
                app_id,
                installation_id,
                "configured installation no longer exists"
            ),
            TelemetryEvent::AuthorizationExhausted {
                organization,
                purpose,
            } => tracing::warn!(
                target: "octobroker::telemetry",
                event = "authorization_exhausted",
                organization = %organization,
                purpose = %purpose,
                "no installation available"
            ),
        }
    }
}

/// Keeps events in memory, for diagnostics endpoints and tests.
#[derive(Debug, Default)]
pub struct MemoryTelemetry {
    events: Mutex<Vec<TelemetryEvent>>,
}

impl MemoryTelemetry {
    /// An empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A snapshot of every event emitted so far, oldest first.
    #[must_use]
    pub fn events(&self) -> Vec<TelemetryEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of events named `name`.
    #[must_use]
    pub fn count(&self, name: &str) -> usize {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|event| event.name() == name)
            .count()
    }
}

impl TelemetrySink for MemoryTelemetry {
    fn emit(&self, event: TelemetryEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }
}

impl fmt::Display for TelemetryEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
