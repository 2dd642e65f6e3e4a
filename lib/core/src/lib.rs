//! Core types shared by every crate of the chat relay.
//!
//! Provides the conversation and round identifiers and the rootcause-based
//! `Result` alias.

pub mod error;
pub mod id;

pub use error::Result;
pub use id::{ConversationId, ParseIdError, RoundId};
