//! Mapping of GitHub HTTP failures onto [`GitHubError`] variants.

use crate::error::GitHubError;

/// Classify an error status GitHub returned for an installation request.
///
/// | Status            | Variant                  | Transient |
/// |-------------------|--------------------------|-----------|
/// | 404               | `InstallationNotFound`   | no        |
/// | 401               | `AuthenticationFailed`   | no        |
/// | 429, 5xx          | `ApiUnavailable`         | yes       |
/// | other 4xx         | `InstallationUnusable`   | no        |
/// | anything else     | `ApiUnavailable`         | yes       |
#[must_use]
pub fn classify_status(installation_id: u64, status: u16, message: &str) -> GitHubError {
    match status {
        404 => GitHubError::InstallationNotFound { installation_id },
        401 => GitHubError::AuthenticationFailed {
            message: format!("GitHub rejected the App JWT: {message}"),
        },
        429 => GitHubError::ApiUnavailable {
            status,
            message: message.to_owned(),
        },
        400..=499 => GitHubError::InstallationUnusable {
            installation_id,
            status,
            message: message.to_owned(),
        },
        _ => GitHubError::ApiUnavailable {
            status,
            message: message.to_owned(),
        },
    }
}

/// Classify an Octocrab error raised while talking about `installation_id`.
///
/// Responses GitHub produced go through [`classify_status`]; everything that
/// never reached GitHub (connection, TLS, JSON decoding) is a transport
/// failure.
pub(super) fn classify_octocrab_error(installation_id: u64, error: octocrab::Error) -> GitHubError {
    match error {
        octocrab::Error::GitHub { source, .. } => classify_status(
            installation_id,
            source.status_code.as_u16(),
            &source.message,
        ),
        other => GitHubError::Transport {
            message: other.to_string(),
        },
    }
}
