//! Telegram chat relay.
//!
//! Wires the Bot API transport, the conversation orchestrator and an
//! OpenAI-compatible completion backend together.

pub mod config;
pub mod dispatch;
