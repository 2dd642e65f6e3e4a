//! Transport seam between the chat platform and the relay.

use crate::error::TelegramError;
use async_trait::async_trait;
use relay_core::ConversationId;
use rootcause::Report;

/// A file attached to an inbound message, not yet downloaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub file_id: String,
}

/// One inbound chat message, reduced to what the relay consumes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundUpdate {
    pub update_id: i64,
    pub conversation: ConversationId,
    pub text: Option<String>,
    pub attachment: Option<Attachment>,
}

/// A reply addressed to one conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundReply {
    pub conversation: ConversationId,
    pub text: String,
}

impl OutboundReply {
    #[must_use]
    pub fn new(conversation: ConversationId, text: impl Into<String>) -> Self {
        Self {
            conversation,
            text: text.into(),
        }
    }
}

/// A chat platform the relay receives messages from and replies to.
#[async_trait]
pub trait Messenger: Send + Sync {
    /// Waits for the next batch of inbound messages.
    ///
    /// Each call acknowledges the batch returned by the previous one. An
    /// empty batch means the wait elapsed without traffic.
    async fn poll(&self) -> Result<Vec<InboundUpdate>, Report<TelegramError>>;

    /// Downloads the bytes of an attachment.
    async fn fetch(&self, attachment: &Attachment) -> Result<Vec<u8>, Report<TelegramError>>;

    /// Delivers a reply.
    async fn send(&self, reply: &OutboundReply) -> Result<(), Report<TelegramError>>;
}
