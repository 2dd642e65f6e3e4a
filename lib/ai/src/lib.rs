//! Completion backend for the chat relay.
//!
//! - **Backend trait**: submit a role-tagged history, receive candidate replies
//! - **OpenAI-compatible client**: the production transport over HTTP

pub mod backend;
pub mod error;
pub mod openai;

pub use backend::{
    Candidate, ChatMessage, CompletionBackend, CompletionRequest, CompletionResponse, MessageRole,
    TokenUsage,
};
pub use error::LlmError;
pub use openai::{OpenAiCompatibleBackend, OpenAiCompatibleConfig};
