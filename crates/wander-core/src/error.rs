//! Typed error taxonomy for the request dispatcher.
//!
//! The HTTP status is decided once at the transport boundary so downstream
//! logic matches on a closed set of variants instead of probing an untyped
//! error for a `response.status` field.

use thiserror::Error;

/// Errors surfaced by the API client and its collaborators.
#[derive(Debug, Error)]
pub enum ApiError {
    /// A 401 with no usable refresh token, or a 401 repeated after the one
    /// allowed retry. The session has already been torn down by the time a
    /// caller sees this.
    #[error("authentication expired")]
    AuthenticationExpired,

    /// The token refresh call itself failed. Also triggers teardown.
    #[error("token refresh failed: {0}")]
    RefreshFailed(String),

    /// Any non-success HTTP status other than the 401 handled by the refresh
    /// protocol. No client state is mutated.
    #[error("request failed with status {status}")]
    Status { status: u16, body: String },

    /// Transport-level failure (connect, TLS, timeout). No client state is
    /// mutated.
    #[error("network error")]
    Network(#[from] reqwest::Error),

    /// The response body did not parse as the expected JSON shape.
    #[error("invalid response body")]
    Decode(#[from] serde_json::Error),
}

impl ApiError {
    /// HTTP status associated with this error, when one exists.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            ApiError::AuthenticationExpired => Some(401),
            ApiError::Status { status, .. } => Some(*status),
            ApiError::Network(err) => err.status().map(|s| s.as_u16()),
            ApiError::RefreshFailed(_) | ApiError::Decode(_) => None,
        }
    }
}

/// Refresh outcome delivered to queued waiters.
///
/// Kept separate from [`ApiError`] because one refresh failure has to be
/// fanned out to every queued continuation, so it must be `Clone`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum RefreshError {
    /// No refresh token was present; no network refresh was attempted.
    MissingToken,
    /// The refresh call errored.
    Failed(String),
}

impl From<RefreshError> for ApiError {
    fn from(err: RefreshError) -> Self {
        match err {
            RefreshError::MissingToken => ApiError::AuthenticationExpired,
            RefreshError::Failed(msg) => ApiError::RefreshFailed(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_code_closed_set() {
        assert_eq!(ApiError::AuthenticationExpired.status_code(), Some(401));
        assert_eq!(
            ApiError::Status {
                status: 503,
                body: String::new()
            }
            .status_code(),
            Some(503)
        );
        assert_eq!(ApiError::RefreshFailed("boom".into()).status_code(), None);
    }

    #[test]
    fn test_refresh_error_mapping() {
        assert!(matches!(
            ApiError::from(RefreshError::MissingToken),
            ApiError::AuthenticationExpired
        ));
        assert!(matches!(
            ApiError::from(RefreshError::Failed("x".into())),
            ApiError::RefreshFailed(_)
        ));
    }
}
