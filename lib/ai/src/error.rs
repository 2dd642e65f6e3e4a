//! Completion backend errors.
//!
//! `LlmError` is the context of every report a [`CompletionBackend`]
//! returns. The orchestrator never retries on it; it wraps the report in a
//! `RoundError::BackendUnavailable` and the round ends without a commit.
//!
//! [`CompletionBackend`]: crate::CompletionBackend

use std::fmt;

/// Why a completion call produced no candidates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LlmError {
    /// No connection could be established to the named provider.
    /// Produced by [`LlmError::from_transport`] for connect errors.
    Unreachable { provider: String, reason: String },
    /// The provider answered with a non-success status, or the exchange broke
    /// after the connection was up.
    RequestFailed { reason: String },
    /// The body was not a chat completions response.
    MalformedResponse { reason: String },
    /// The HTTP client gave up waiting.
    Timeout,
    /// HTTP 429, with the `Retry-After` hint when the provider sent one.
    RateLimited { retry_after_secs: Option<u64> },
    /// The backend cannot be built from the given settings.
    InvalidConfig { reason: String },
}

impl fmt::Display for LlmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unreachable { provider, reason } => {
                write!(f, "cannot reach completion provider '{provider}': {reason}")
            }
            Self::RequestFailed { reason } => {
                write!(f, "completion request failed: {reason}")
            }
            Self::MalformedResponse { reason } => {
                write!(f, "malformed completion response: {reason}")
            }
            Self::Timeout => write!(f, "completion request timed out"),
            Self::RateLimited {
                retry_after_secs: Some(secs),
            } => write!(f, "rate limited, retry after {secs}s"),
            Self::RateLimited {
                retry_after_secs: None,
            } => write!(f, "rate limited"),
            Self::InvalidConfig { reason } => {
                write!(f, "invalid backend configuration: {reason}")
            }
        }
    }
}

impl std::error::Error for LlmError {}

impl LlmError {
    /// Maps a `reqwest` send/read failure onto the variant the relay logs.
    ///
    /// Timeouts and connect errors get their own variants; anything else
    /// (a reset mid-body, a redirect loop) counts as a failed request.
    #[must_use]
    pub fn from_transport(provider: &str, err: &reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if err.is_connect() {
            Self::Unreachable {
                provider: provider.to_string(),
                reason: err.to_string(),
            }
        } else {
            Self::RequestFailed {
                reason: err.to_string(),
            }
        }
    }
}
