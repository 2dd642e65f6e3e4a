//! Strongly-typed identifiers.
//!
//! `ConversationId` wraps the chat identifier assigned by the messaging
//! platform. `RoundId` is generated locally (ULID) and tags a single
//! request/response round for log correlation.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use ulid::Ulid;

/// Error returned when parsing an ID from a string fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseIdError {
    /// The type of ID that failed to parse.
    pub id_type: &'static str,
    /// The reason for the parse failure.
    pub reason: String,
}

impl fmt::Display for ParseIdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "failed to parse {}: {}", self.id_type, self.reason)
    }
}

impl std::error::Error for ParseIdError {}

/// Identifier of one conversation (one chat on the messaging platform).
///
/// Telegram chat ids are signed: groups and channels are negative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationId(i64);

impl ConversationId {
    /// Creates a conversation ID from the platform's chat id.
    #[must_use]
    pub const fn new(chat_id: i64) -> Self {
        Self(chat_id)
    }

    /// Returns the platform's chat id.
    #[must_use]
    pub const fn chat_id(&self) -> i64 {
        self.0
    }

    /// Returns the prefix used for display formatting.
    #[must_use]
    pub const fn prefix() -> &'static str {
        "chat"
    }
}

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", Self::prefix(), self.0)
    }
}

impl FromStr for ConversationId {
    type Err = ParseIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.strip_prefix("chat_").unwrap_or(s);
        raw.parse::<i64>().map(Self).map_err(|e| ParseIdError {
            id_type: "ConversationId",
            reason: e.to_string(),
        })
    }
}

impl From<i64> for ConversationId {
    fn from(chat_id: i64) -> Self {
        Self(chat_id)
    }
}

impl From<ConversationId> for i64 {
    fn from(id: ConversationId) -> Self {
        id.0
    }
}

/// Identifier of a single request/response round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoundId(Ulid);

impl RoundId {
    /// Creates a new round ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Ulid::new())
    }

    /// Returns the underlying ULID.
    #[must_use]
    pub const fn as_ulid(&self) -> Ulid {
        self.0
    }
}

impl Default for RoundId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RoundId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rnd_{}", self.0)
    }
}

impl FromStr for RoundId {
    type Err = ParseIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.strip_prefix("rnd_").unwrap_or(s);
        Ulid::from_str(raw).map(Self).map_err(|e| ParseIdError {
            id_type: "RoundId",
            reason: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conversation_id_display_format() {
        assert_eq!(ConversationId::new(42).to_string(), "chat_42");
        assert_eq!(ConversationId::new(-100123).to_string(), "chat_-100123");
    }

    #[test]
    fn conversation_id_parse_with_and_without_prefix() {
        let with_prefix: ConversationId = "chat_-7".parse().expect("should parse");
        let raw: ConversationId = "-7".parse().expect("should parse");
        assert_eq!(with_prefix, raw);
        assert_eq!(raw.chat_id(), -7);
    }

    #[test]
    fn conversation_id_parse_invalid() {
        let err = "chat_abc".parse::<ConversationId>().unwrap_err();
        assert_eq!(err.id_type, "ConversationId");
    }

    #[test]
    fn conversation_id_serializes_as_bare_integer() {
        let json = serde_json::to_string(&ConversationId::new(99)).expect("serialize");
        assert_eq!(json, "99");
    }

    #[test]
    fn round_id_display_and_parse() {
        let id = RoundId::new();
        let display = id.to_string();
        assert!(display.starts_with("rnd_"));
        let parsed: RoundId = display.parse().expect("should parse");
        assert_eq!(id, parsed);
    }

    #[test]
    fn round_ids_are_unique() {
        assert_ne!(RoundId::new(), RoundId::new());
    }
}
