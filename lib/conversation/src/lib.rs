//! Conversation session manager for the chat relay.
//!
//! This crate provides:
//!
//! - **Content normalizer**: text or image payload into message content
//! - **Session store**: per-conversation history seeded with the system prompt
//! - **Conversation locks**: one round at a time per conversation
//! - **Orchestrator**: the request/response round against the completion backend

pub mod content;
pub mod error;
pub mod locks;
pub mod message;
pub mod orchestrator;
pub mod session;

pub use content::{InboundContent, MediaKind, normalize, sniff_mime};
pub use error::RoundError;
pub use locks::{ConversationGuard, ConversationLocks};
pub use message::{Message, MessageRole};
pub use orchestrator::{Orchestrator, OrchestratorConfig, RoundOutcome};
pub use session::{InMemorySessionStore, Session, SessionStore};
