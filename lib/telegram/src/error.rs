//! Error types for the Telegram transport.

use std::fmt;

/// Errors from Bot API operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TelegramError {
    /// Connection to the Bot API failed.
    ConnectionFailed { reason: String },
    /// The Bot API answered `ok: false` or a non-success status.
    ApiError { method: String, description: String },
    /// The response did not match the expected shape.
    ProtocolError { method: String, reason: String },
    /// The file cannot be downloaded (no path, or too large for the Bot API).
    FileUnavailable { file_id: String },
    /// Timeout waiting for response.
    Timeout,
    /// Invalid configuration.
    InvalidConfig { reason: String },
}

impl fmt::Display for TelegramError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConnectionFailed { reason } => {
                write!(f, "connection failed: {reason}")
            }
            Self::ApiError {
                method,
                description,
            } => {
                write!(f, "Bot API method '{method}' failed: {description}")
            }
            Self::ProtocolError { method, reason } => {
                write!(f, "unexpected response from '{method}': {reason}")
            }
            Self::FileUnavailable { file_id } => {
                write!(f, "file '{file_id}' cannot be downloaded")
            }
            Self::Timeout => write!(f, "operation timed out"),
            Self::InvalidConfig { reason } => {
                write!(f, "invalid Telegram configuration: {reason}")
            }
        }
    }
}

impl std::error::Error for TelegramError {}

impl TelegramError {
    /// Classifies a transport-level `reqwest` error.
    #[must_use]
    pub fn from_transport(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else {
            // Strip the URL: it contains the bot token.
            Self::ConnectionFailed {
                reason: err.without_url().to_string(),
            }
        }
    }
}
