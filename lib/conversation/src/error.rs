//! Error types for the conversation crate.
//!
//! Every variant aborts only the current round for the current
//! conversation. Stored history is left untouched and the dispatch loop
//! keeps running.

use std::fmt;

/// Errors that abort a single round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoundError {
    /// The update carried neither an image nor non-empty text.
    EmptyContent,
    /// The attachment is not an image type we can forward.
    UnsupportedMediaKind { mime: String },
    /// The backend could not be reached, failed, or timed out.
    BackendUnavailable { reason: String },
    /// The backend answered with no candidate replies.
    EmptyCandidateSet,
    /// The round was cancelled before the backend answered.
    Cancelled,
}

impl fmt::Display for RoundError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyContent => write!(f, "update has no usable content"),
            Self::UnsupportedMediaKind { mime } => {
                write!(f, "unsupported media kind: {mime}")
            }
            Self::BackendUnavailable { reason } => {
                write!(f, "completion backend unavailable: {reason}")
            }
            Self::EmptyCandidateSet => write!(f, "completion backend returned no candidates"),
            Self::Cancelled => write!(f, "round cancelled"),
        }
    }
}

impl std::error::Error for RoundError {}

impl RoundError {
    /// Short, stable label for structured logs.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::EmptyContent => "empty_content",
            Self::UnsupportedMediaKind { .. } => "unsupported_media_kind",
            Self::BackendUnavailable { .. } => "backend_unavailable",
            Self::EmptyCandidateSet => "empty_candidate_set",
            Self::Cancelled => "cancelled",
        }
    }
}
