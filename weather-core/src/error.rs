//! Closed error types for the request pipeline.
//!
//! Transport and parse failures are folded into [`UpstreamError`] at the provider
//! boundary; the gateway only ever hands [`GatewayError`] to its caller.

use std::time::Duration;

use thiserror::Error;

/// Failure talking to the upstream weather provider.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum UpstreamError {
    #[error("Upstream rejected the configured credential (status {status})")]
    Auth { status: u16 },

    #[error("Upstream request failed with status {status}")]
    Unavailable { status: u16 },

    #[error("Upstream request timed out")]
    Timeout,

    #[error("Failed to reach upstream: {0}")]
    Transport(String),

    #[error("Malformed upstream response: {0}")]
    Malformed(String),
}

/// Terminal outcome of [`crate::WeatherGateway::handle`] when no record is produced.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GatewayError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid API key")]
    Unauthorized,

    #[error("Rate limit exceeded, retry after {} seconds", .retry_after.as_secs())]
    TooManyRequests { retry_after: Duration },

    #[error("Upstream weather service rejected our credentials")]
    UpstreamAuth,

    #[error("Upstream weather service unavailable{}", status_suffix(.status))]
    UpstreamUnavailable { status: Option<u16> },

    #[error("Upstream weather service timed out")]
    UpstreamTimeout,

    #[error("Upstream weather service returned a malformed response: {0}")]
    UpstreamMalformedResponse(String),
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" (status {s})")).unwrap_or_default()
}

impl GatewayError {
    /// HTTP status the outer layer should answer with.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::InvalidInput(_) => 400,
            Self::Unauthorized | Self::UpstreamAuth => 401,
            Self::TooManyRequests { .. } => 429,
            Self::UpstreamUnavailable { .. } | Self::UpstreamMalformedResponse(_) => 502,
            Self::UpstreamTimeout => 504,
        }
    }

    /// Whether the same request may succeed later without the caller changing anything.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::TooManyRequests { .. }
                | Self::UpstreamUnavailable { .. }
                | Self::UpstreamTimeout
                | Self::UpstreamMalformedResponse(_)
        )
    }

    /// Message safe to return to an external caller.
    ///
    /// Parse details of a malformed upstream response may echo the upstream body, so they
    /// stay in the logs.
    pub fn client_message(&self) -> String {
        match self {
            Self::UpstreamMalformedResponse(_) => {
                "Upstream weather service returned a malformed response".to_string()
            }
            other => other.to_string(),
        }
    }
}

impl From<UpstreamError> for GatewayError {
    fn from(err: UpstreamError) -> Self {
        match err {
            UpstreamError::Auth { .. } => Self::UpstreamAuth,
            UpstreamError::Unavailable { status } => Self::UpstreamUnavailable {
                status: Some(status),
            },
            UpstreamError::Timeout => Self::UpstreamTimeout,
            UpstreamError::Transport(_) => Self::UpstreamUnavailable { status: None },
            UpstreamError::Malformed(detail) => Self::UpstreamMalformedResponse(detail),
        }
    }
}
