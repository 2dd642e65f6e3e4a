//! Completion rounds.
//!
//! A round reads the conversation's history, appends the new user turn to a
//! working copy, asks the backend for a reply and, only if one arrives,
//! commits `[.., user, assistant]` back to the store. Any failure leaves the
//! stored history exactly as it was.
//!
//! The whole cycle runs under the conversation's lock, so two updates from
//! the same chat cannot both extend the same base history. The lock is per
//! conversation; a slow backend call never stalls other chats.

use crate::content::{InboundContent, normalize};
use crate::error::RoundError;
use crate::locks::ConversationLocks;
use crate::message::Message;
use crate::session::SessionStore;
use relay_ai::{CompletionBackend, CompletionRequest};
use relay_core::{ConversationId, RoundId};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Settings the orchestrator needs from bootstrap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrchestratorConfig {
    /// Model identifier sent with every request.
    pub model: String,
    /// Input text that clears the conversation instead of starting a round.
    pub reset_keyword: String,
    /// Upper bound on a single backend call.
    pub request_timeout: Duration,
}

impl OrchestratorConfig {
    /// Creates a configuration with the default reset keyword and timeout.
    #[must_use]
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            reset_keyword: "delete".to_string(),
            request_timeout: Duration::from_secs(60),
        }
    }

    /// Sets the reset keyword.
    #[must_use]
    pub fn with_reset_keyword(mut self, keyword: impl Into<String>) -> Self {
        self.reset_keyword = keyword.into();
        self
    }

    /// Sets the per-request timeout.
    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

/// What a processed update produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoundOutcome {
    /// The backend replied; the text should be sent back to the chat.
    Reply(String),
    /// The reset keyword cleared the conversation.
    Reset {
        /// Whether there was a stored session to clear.
        existed: bool,
    },
}

/// Drives completion rounds against a session store and a backend.
pub struct Orchestrator<S: SessionStore, B: CompletionBackend> {
    store: S,
    backend: B,
    locks: ConversationLocks,
    config: OrchestratorConfig,
}

impl<S: SessionStore, B: CompletionBackend> Orchestrator<S, B> {
    /// Creates a new orchestrator.
    pub fn new(store: S, backend: B, config: OrchestratorConfig) -> Self {
        Self {
            store,
            backend,
            locks: ConversationLocks::new(),
            config,
        }
    }

    /// Returns the session store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Returns the configuration.
    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Returns true if `inbound` is exactly the reset keyword.
    pub fn is_reset(&self, inbound: &InboundContent) -> bool {
        inbound.as_text() == Some(self.config.reset_keyword.as_str())
    }

    /// Processes one inbound update for `id`.
    ///
    /// The reset keyword evicts the conversation without contacting the
    /// backend. Anything else is normalized and run as a completion round.
    ///
    /// # Errors
    ///
    /// Returns the [`RoundError`] that aborted the round. Stored history is
    /// unchanged whenever an error is returned.
    pub async fn process(
        &self,
        id: ConversationId,
        inbound: &InboundContent,
        cancel: &CancellationToken,
    ) -> relay_core::Result<RoundOutcome, RoundError> {
        if self.is_reset(inbound) {
            let existed = self.reset(id).await;
            return Ok(RoundOutcome::Reset { existed });
        }

        let content = normalize(inbound)?;
        self.handle(id, content, cancel)
            .await
            .map(RoundOutcome::Reply)
    }

    /// Clears the stored history of `id`. Returns true if there was one.
    ///
    /// Waits for any in-flight round of the same conversation, so the round
    /// cannot commit into the freshly cleared session afterwards.
    pub async fn reset(&self, id: ConversationId) -> bool {
        let _guard = self.locks.acquire(id).await;
        let existed = self.store.evict(id);
        info!(conversation = %id, existed, "conversation reset");
        existed
    }

    /// Runs one completion round with already-normalized user content.
    ///
    /// # Errors
    ///
    /// - `BackendUnavailable` if the backend fails or exceeds the timeout.
    /// - `EmptyCandidateSet` if the backend returns no candidates.
    /// - `Cancelled` if `cancel` fires before the backend answers.
    #[instrument(
        skip(self, content, cancel),
        fields(conversation = %id, round = %RoundId::new(), provider = %self.backend.provider())
    )]
    pub async fn handle(
        &self,
        id: ConversationId,
        content: String,
        cancel: &CancellationToken,
    ) -> relay_core::Result<String, RoundError> {
        let _guard = self.locks.acquire(id).await;

        let session = self.store.get_or_init(id);
        let turn = session.round_count() + 1;
        let mut working = session.history;
        let base_len = working.len();
        working.push(Message::user(content));

        let request = CompletionRequest::new(
            self.config.model.clone(),
            working.iter().map(Message::to_chat_message).collect(),
        );

        debug!(history_len = base_len, "requesting completion");
        let started = Instant::now();

        let response = tokio::select! {
            biased;
            () = cancel.cancelled() => {
                warn!("round cancelled before the backend answered");
                return Err(RoundError::Cancelled.into());
            }
            result = tokio::time::timeout(self.config.request_timeout, self.backend.complete(&request)) => {
                match result {
                    Ok(Ok(response)) => response,
                    Ok(Err(report)) => {
                        let reason = report.current_context().to_string();
                        warn!(error = %reason, "completion backend failed");
                        return Err(report.context(RoundError::BackendUnavailable { reason }));
                    }
                    Err(_elapsed) => {
                        let reason = format!(
                            "no response within {}ms",
                            self.config.request_timeout.as_millis()
                        );
                        warn!(error = %reason, "completion backend timed out");
                        return Err(RoundError::BackendUnavailable { reason }.into());
                    }
                }
            }
        };

        let latency_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        let Some(candidate) = response.first_candidate() else {
            warn!(latency_ms, "completion backend returned no candidates");
            return Err(RoundError::EmptyCandidateSet.into());
        };
        let reply = candidate.content.clone();

        working.push(Message::assistant(reply.clone()));
        let history_len = working.len();
        self.store.commit(id, working);

        info!(
            latency_ms,
            turn,
            history_len,
            candidates = response.candidates.len(),
            "round completed"
        );
        Ok(reply)
    }
}
