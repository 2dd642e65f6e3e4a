//! HTTP client for the Telegram Bot API.

use crate::error::TelegramError;
use crate::messenger::{Attachment, InboundUpdate, Messenger, OutboundReply};
use crate::types::{
    ApiResponse, File, GetFileParams, GetUpdatesParams, SendMessageParams, TgMessage, Update,
};
use async_trait::async_trait;
use relay_core::ConversationId;
use reqwest::Client;
use rootcause::Report;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;
use tracing::{debug, instrument};

/// Longest text a single `sendMessage` call accepts, in characters.
pub const MAX_MESSAGE_CHARS: usize = 4096;

const ALLOWED_UPDATES: &[&str] = &["message"];

/// Configuration for [`TelegramClient`].
#[derive(Debug, Clone)]
pub struct TelegramClientConfig {
    pub bot_token: String,
    /// Bot API root, `https://api.telegram.org` unless a local server is used.
    pub api_base: String,
    /// How long one `getUpdates` call may wait for traffic.
    pub poll_timeout: Duration,
}

impl TelegramClientConfig {
    #[must_use]
    pub fn new(bot_token: impl Into<String>) -> Self {
        Self {
            bot_token: bot_token.into(),
            api_base: "https://api.telegram.org".to_string(),
            poll_timeout: Duration::from_secs(30),
        }
    }

    #[must_use]
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    #[must_use]
    pub fn with_poll_timeout(mut self, poll_timeout: Duration) -> Self {
        self.poll_timeout = poll_timeout;
        self
    }
}

/// Long-polling Bot API client.
///
/// Tracks the `getUpdates` offset itself, so each [`Messenger::poll`]
/// acknowledges everything returned by the previous call.
#[derive(Debug)]
pub struct TelegramClient {
    bot_token: String,
    api_base: String,
    poll_timeout: Duration,
    client: Client,
    offset: AtomicI64,
}

impl TelegramClient {
    /// Creates a new client.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if the bot token or API base is empty, or if
    /// the HTTP client cannot be built.
    pub fn new(config: TelegramClientConfig) -> Result<Self, Report<TelegramError>> {
        if config.bot_token.trim().is_empty() {
            return Err(TelegramError::InvalidConfig {
                reason: "bot token is empty".to_string(),
            }
            .into());
        }
        let api_base = config.api_base.trim().trim_end_matches('/').to_string();
        if api_base.is_empty() {
            return Err(TelegramError::InvalidConfig {
                reason: "API base URL is empty".to_string(),
            }
            .into());
        }

        // The HTTP timeout must outlast the server-side long poll.
        let client = Client::builder()
            .timeout(config.poll_timeout + Duration::from_secs(15))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| TelegramError::InvalidConfig {
                reason: format!("failed to create HTTP client: {e}"),
            })?;

        Ok(Self {
            bot_token: config.bot_token,
            api_base,
            poll_timeout: config.poll_timeout,
            client,
            offset: AtomicI64::new(0),
        })
    }

    /// Returns the offset the next `getUpdates` call will send.
    #[must_use]
    pub fn offset(&self) -> i64 {
        self.offset.load(Ordering::Relaxed)
    }

    fn api_url(&self, method: &str) -> String {
        format!("{}/bot{}/{method}", self.api_base, self.bot_token)
    }

    fn file_url(&self, file_path: &str) -> String {
        format!("{}/file/bot{}/{file_path}", self.api_base, self.bot_token)
    }

    async fn call<P, T>(&self, method: &str, params: &P) -> Result<T, Report<TelegramError>>
    where
        P: Serialize + Sync,
        T: DeserializeOwned,
    {
        let response = self
            .client
            .post(self.api_url(method))
            .json(params)
            .send()
            .await
            .map_err(TelegramError::from_transport)?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(TelegramError::from_transport)?;

        // Error replies still carry the JSON envelope; fall back to the
        // status line only when they don't.
        let envelope: ApiResponse<T> = match serde_json::from_str(&body) {
            Ok(envelope) => envelope,
            Err(_) if !status.is_success() => {
                return Err(TelegramError::ApiError {
                    method: method.to_string(),
                    description: format!("HTTP {status}"),
                }
                .into());
            }
            Err(e) => {
                return Err(TelegramError::ProtocolError {
                    method: method.to_string(),
                    reason: e.to_string(),
                }
                .into());
            }
        };

        if !envelope.ok {
            return Err(TelegramError::ApiError {
                method: method.to_string(),
                description: envelope
                    .description
                    .unwrap_or_else(|| format!("HTTP {status}")),
            }
            .into());
        }

        envelope.result.ok_or_else(|| {
            TelegramError::ProtocolError {
                method: method.to_string(),
                reason: "missing result".to_string(),
            }
            .into()
        })
    }
}

#[async_trait]
impl Messenger for TelegramClient {
    #[instrument(skip(self), fields(offset = self.offset()))]
    async fn poll(&self) -> Result<Vec<InboundUpdate>, Report<TelegramError>> {
        let params = GetUpdatesParams {
            offset: self.offset(),
            timeout: self.poll_timeout.as_secs(),
            allowed_updates: ALLOWED_UPDATES,
        };
        let updates: Vec<Update> = self.call("getUpdates", &params).await?;

        if let Some(last) = updates.iter().map(|u| u.update_id).max() {
            self.offset.fetch_max(last + 1, Ordering::Relaxed);
        }

        let inbound: Vec<InboundUpdate> = updates
            .into_iter()
            .filter_map(|update| {
                let update_id = update.update_id;
                update.message.map(|message| inbound_update(update_id, message))
            })
            .collect();

        if !inbound.is_empty() {
            debug!(count = inbound.len(), "received updates");
        }
        Ok(inbound)
    }

    #[instrument(skip(self, attachment), fields(file_id = %attachment.file_id))]
    async fn fetch(&self, attachment: &Attachment) -> Result<Vec<u8>, Report<TelegramError>> {
        let file: File = self
            .call(
                "getFile",
                &GetFileParams {
                    file_id: &attachment.file_id,
                },
            )
            .await?;

        let Some(file_path) = file.file_path else {
            return Err(TelegramError::FileUnavailable {
                file_id: file.file_id,
            }
            .into());
        };

        let response = self
            .client
            .get(self.file_url(&file_path))
            .send()
            .await
            .map_err(TelegramError::from_transport)?;

        let status = response.status();
        if !status.is_success() {
            return Err(TelegramError::ApiError {
                method: "download".to_string(),
                description: format!("HTTP {status}"),
            }
            .into());
        }

        let bytes = response
            .bytes()
            .await
            .map_err(TelegramError::from_transport)?;
        debug!(bytes = bytes.len(), "downloaded attachment");
        Ok(bytes.to_vec())
    }

    #[instrument(skip(self, reply), fields(conversation = %reply.conversation, chars = reply.text.chars().count()))]
    async fn send(&self, reply: &OutboundReply) -> Result<(), Report<TelegramError>> {
        if reply.text.is_empty() {
            debug!("skipping empty reply");
            return Ok(());
        }

        for chunk in split_message(&reply.text, MAX_MESSAGE_CHARS) {
            let params = SendMessageParams {
                chat_id: reply.conversation.chat_id(),
                text: chunk,
            };
            let _: serde_json::Value = self.call("sendMessage", &params).await?;
        }
        Ok(())
    }
}

fn inbound_update(update_id: i64, message: TgMessage) -> InboundUpdate {
    let attachment = message
        .photo
        .as_deref()
        .and_then(|sizes| sizes.iter().max_by_key(|size| size.area()))
        .map(|size| Attachment {
            file_id: size.file_id.clone(),
        });

    InboundUpdate {
        update_id,
        conversation: ConversationId::new(message.chat.id),
        text: message.text.or(message.caption),
        attachment,
    }
}

/// Splits `text` into pieces of at most `limit` characters.
fn split_message(text: &str, limit: usize) -> Vec<&str> {
    let mut chunks = Vec::new();
    let mut rest = text;
    while !rest.is_empty() {
        let end = rest
            .char_indices()
            .nth(limit)
            .map_or(rest.len(), |(idx, _)| idx);
        let (chunk, tail) = rest.split_at(end);
        chunks.push(chunk);
        rest = tail;
    }
    chunks
}
