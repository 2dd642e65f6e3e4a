//! Completion backend abstraction.
//!
//! A backend takes an ordered list of role-tagged messages and returns a
//! list of candidate replies. Concrete transports (the OpenAI-compatible
//! HTTP client, in-test fakes) implement [`CompletionBackend`].

use crate::error::LlmError;
use async_trait::async_trait;
use rootcause::Report;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// The role of a message sender.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// System message.
    System,
    /// User/human message.
    User,
    /// Assistant/AI message.
    Assistant,
}

/// A message sent to the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// The role of the message sender.
    pub role: MessageRole,
    /// Literal text or an image data URI.
    pub content: String,
}

impl ChatMessage {
    /// Creates a message with the given role.
    #[must_use]
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    /// Creates a system message.
    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(MessageRole::System, content)
    }

    /// Creates a user message.
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(MessageRole::User, content)
    }

    /// Creates an assistant message.
    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(MessageRole::Assistant, content)
    }

    /// Returns true if the content is an inline image data URI.
    #[must_use]
    pub fn is_image(&self) -> bool {
        self.content.starts_with("data:image/")
    }
}

/// A completion request: a model and the full history, oldest first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionRequest {
    /// Model identifier understood by the backend.
    pub model: String,
    /// Messages, oldest first.
    pub messages: Vec<ChatMessage>,
}

impl CompletionRequest {
    /// Creates a request for the given model.
    #[must_use]
    pub fn new(model: impl Into<String>, messages: Vec<ChatMessage>) -> Self {
        Self {
            model: model.into(),
            messages,
        }
    }
}

/// One candidate reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    /// Role reported by the backend (assistant in practice).
    pub role: MessageRole,
    /// Reply text.
    pub content: String,
}

/// Token usage statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Number of input tokens.
    pub input_tokens: u32,
    /// Number of output tokens.
    pub output_tokens: u32,
}

impl TokenUsage {
    /// Returns the total number of tokens.
    #[must_use]
    pub fn total(&self) -> u32 {
        self.input_tokens + self.output_tokens
    }
}

/// A response from the backend.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionResponse {
    /// Candidate replies, in backend order. May be empty.
    pub candidates: Vec<Candidate>,
    /// Model that generated the response, if reported.
    pub model: Option<String>,
    /// Token usage, if reported.
    pub usage: Option<TokenUsage>,
}

impl CompletionResponse {
    /// Creates a response with a single assistant candidate.
    #[must_use]
    pub fn single(content: impl Into<String>) -> Self {
        Self {
            candidates: vec![Candidate {
                role: MessageRole::Assistant,
                content: content.into(),
            }],
            model: None,
            usage: None,
        }
    }

    /// Returns the first candidate, if any.
    #[must_use]
    pub fn first_candidate(&self) -> Option<&Candidate> {
        self.candidates.first()
    }
}

/// Trait for completion backends.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    /// Submits the request and returns the candidate replies.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be reached, rejects the request,
    /// or returns a body that cannot be parsed.
    async fn complete(&self, request: &CompletionRequest)
    -> Result<CompletionResponse, Report<LlmError>>;

    /// Returns a short name for the provider, used in logs.
    fn provider(&self) -> &str;
}

#[async_trait]
impl<T: CompletionBackend + ?Sized> CompletionBackend for Arc<T> {
    async fn complete(
        &self,
        request: &CompletionRequest,
    ) -> Result<CompletionResponse, Report<LlmError>> {
        (**self).complete(request).await
    }

    fn provider(&self) -> &str {
        (**self).provider()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_message_constructors() {
        assert_eq!(ChatMessage::system("s").role, MessageRole::System);
        assert_eq!(ChatMessage::user("u").role, MessageRole::User);
        assert_eq!(ChatMessage::assistant("a").role, MessageRole::Assistant);
    }

    #[test]
    fn image_detection_requires_image_data_uri() {
        assert!(ChatMessage::user("data:image/png;base64,AAAA").is_image());
        assert!(!ChatMessage::user("data:text/plain;base64,AAAA").is_image());
        assert!(!ChatMessage::user("look at data:image/png").is_image());
    }

    #[test]
    fn first_candidate_of_empty_response_is_none() {
        assert!(CompletionResponse::default().first_candidate().is_none());
        let response = CompletionResponse::single("hi there");
        assert_eq!(
            response.first_candidate().map(|c| c.content.as_str()),
            Some("hi there")
        );
    }

    #[test]
    fn role_serializes_lowercase() {
        let json = serde_json::to_string(&ChatMessage::assistant("x")).expect("serialize");
        assert!(json.contains("\"role\":\"assistant\""));
    }

    #[test]
    fn token_usage_total() {
        let usage = TokenUsage {
            input_tokens: 100,
            output_tokens: 50,
        };
        assert_eq!(usage.total(), 150);
    }
}
