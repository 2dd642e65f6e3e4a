//! Telegram Bot API transport for the chat relay.
//!
//! Long-polls `getUpdates`, downloads photo attachments and delivers
//! replies with `sendMessage`. The relay only sees the [`Messenger`] trait.

pub mod client;
pub mod error;
pub mod messenger;
pub mod types;

pub use client::{MAX_MESSAGE_CHARS, TelegramClient, TelegramClientConfig};
pub use error::TelegramError;
pub use messenger::{Attachment, InboundUpdate, Messenger, OutboundReply};
