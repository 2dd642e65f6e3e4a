//! Update dispatch loop.
//!
//! Polls the messenger and routes every update to a queue for its chat.
//! Each queue is drained by one task, so a chat's updates (download, round,
//! reply) run strictly in poll order while different chats run in parallel.
//! A failing update is logged and never stops the loop.

use relay_ai::CompletionBackend;
use relay_conversation::{InboundContent, Orchestrator, RoundError, RoundOutcome, SessionStore};
use relay_core::ConversationId;
use relay_telegram::{InboundUpdate, Messenger, OutboundReply};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Pause after a failed poll before trying again.
pub const POLL_BACKOFF: Duration = Duration::from_secs(5);

/// Fixed texts the relay sends besides model replies.
#[derive(Debug, Clone, Default)]
pub struct Replies {
    /// Sent after a reset. Empty means no reply.
    pub reset: String,
    /// Sent when a round fails.
    pub failure: Option<String>,
}

/// Sending side of one chat's queue.
struct ChatQueue {
    tx: mpsc::UnboundedSender<InboundUpdate>,
    /// Updates sent but not yet fully handled.
    pending: Arc<AtomicUsize>,
}

/// Routes inbound updates through the orchestrator and back to the chat.
pub struct Dispatcher<M, S, B>
where
    M: Messenger,
    S: SessionStore,
    B: CompletionBackend,
{
    messenger: Arc<M>,
    orchestrator: Arc<Orchestrator<S, B>>,
    replies: Replies,
    poll_backoff: Duration,
}

impl<M, S, B> Dispatcher<M, S, B>
where
    M: Messenger + 'static,
    S: SessionStore + 'static,
    B: CompletionBackend + 'static,
{
    pub fn new(
        messenger: Arc<M>,
        orchestrator: Arc<Orchestrator<S, B>>,
        replies: Replies,
    ) -> Self {
        Self {
            messenger,
            orchestrator,
            replies,
            poll_backoff: POLL_BACKOFF,
        }
    }

    #[must_use]
    pub fn with_poll_backoff(mut self, backoff: Duration) -> Self {
        self.poll_backoff = backoff;
        self
    }

    /// Runs until `cancel` fires, then waits for in-flight updates.
    ///
    /// Cancellation also reaches the rounds themselves, so pending backend
    /// calls end without committing anything. Updates still queued at that
    /// point are dropped.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        let mut tasks = JoinSet::new();
        let mut queues: HashMap<ConversationId, ChatQueue> = HashMap::new();
        info!("dispatcher started");

        loop {
            let polled = tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                polled = self.messenger.poll() => polled,
            };

            match polled {
                Ok(updates) => {
                    for update in updates {
                        self.enqueue(&mut queues, &mut tasks, update, &cancel);
                    }
                }
                Err(report) => {
                    warn!(
                        error = %report.current_context(),
                        backoff_secs = self.poll_backoff.as_secs(),
                        "polling for updates failed"
                    );
                    tokio::select! {
                        () = cancel.cancelled() => break,
                        () = tokio::time::sleep(self.poll_backoff) => {}
                    }
                }
            }

            // Idle queues are closed; their workers exit once the channel is empty.
            queues.retain(|_, queue| queue.pending.load(Ordering::Acquire) > 0);

            while let Some(joined) = tasks.try_join_next() {
                if let Err(e) = joined {
                    warn!(error = %e, "conversation worker failed");
                }
            }
        }

        drop(queues);
        info!(workers = tasks.len(), "dispatcher stopping");
        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                warn!(error = %e, "conversation worker failed");
            }
        }
        info!("dispatcher stopped");
    }

    /// Appends `update` to its chat's queue, starting a worker if the chat
    /// has none.
    fn enqueue(
        self: &Arc<Self>,
        queues: &mut HashMap<ConversationId, ChatQueue>,
        tasks: &mut JoinSet<()>,
        update: InboundUpdate,
        cancel: &CancellationToken,
    ) {
        let conversation = update.conversation;

        // A worker that panicked has dropped its receiver.
        if queues
            .get(&conversation)
            .is_some_and(|queue| queue.tx.is_closed())
        {
            queues.remove(&conversation);
        }

        let queue = queues.entry(conversation).or_insert_with(|| {
            let (tx, rx) = mpsc::unbounded_channel();
            let pending = Arc::new(AtomicUsize::new(0));
            debug!(conversation = %conversation, "starting conversation worker");
            tasks.spawn(Arc::clone(self).drain(rx, Arc::clone(&pending), cancel.clone()));
            ChatQueue { tx, pending }
        });

        queue.pending.fetch_add(1, Ordering::AcqRel);
        if queue.tx.send(update).is_err() {
            queue.pending.fetch_sub(1, Ordering::AcqRel);
            warn!(conversation = %conversation, "conversation worker gone, update dropped");
        }
    }

    async fn drain(
        self: Arc<Self>,
        mut rx: mpsc::UnboundedReceiver<InboundUpdate>,
        pending: Arc<AtomicUsize>,
        cancel: CancellationToken,
    ) {
        while let Some(update) = rx.recv().await {
            if cancel.is_cancelled() {
                debug!(
                    conversation = %update.conversation,
                    update_id = update.update_id,
                    "dropping update queued before shutdown"
                );
            } else {
                self.dispatch(update, &cancel).await;
            }
            pending.fetch_sub(1, Ordering::AcqRel);
        }
    }

    /// Handles one update end to end.
    pub async fn dispatch(&self, update: InboundUpdate, cancel: &CancellationToken) {
        let conversation = update.conversation;

        let content = match &update.attachment {
            Some(attachment) => match self.messenger.fetch(attachment).await {
                Ok(bytes) => InboundContent::Image(bytes),
                Err(report) => {
                    warn!(
                        conversation = %conversation,
                        update_id = update.update_id,
                        error = %report.current_context(),
                        "failed to download attachment"
                    );
                    self.notify_failure(conversation).await;
                    return;
                }
            },
            None => InboundContent::Text(update.text.unwrap_or_default()),
        };

        match self.orchestrator.process(conversation, &content, cancel).await {
            Ok(RoundOutcome::Reply(text)) => {
                self.deliver(OutboundReply::new(conversation, text)).await;
            }
            Ok(RoundOutcome::Reset { existed }) => {
                debug!(conversation = %conversation, existed, "reset handled");
                if !self.replies.reset.is_empty() {
                    self.deliver(OutboundReply::new(conversation, self.replies.reset.clone()))
                        .await;
                }
            }
            Err(report) => {
                let error = report.current_context();
                if *error == RoundError::Cancelled {
                    debug!(conversation = %conversation, "round cancelled by shutdown");
                    return;
                }
                warn!(
                    conversation = %conversation,
                    update_id = update.update_id,
                    kind = error.kind(),
                    error = %error,
                    "round failed"
                );
                self.notify_failure(conversation).await;
            }
        }
    }

    async fn notify_failure(&self, conversation: ConversationId) {
        if let Some(notice) = &self.replies.failure {
            self.deliver(OutboundReply::new(conversation, notice.clone()))
                .await;
        }
    }

    async fn deliver(&self, reply: OutboundReply) {
        if let Err(report) = self.messenger.send(&reply).await {
            warn!(
                conversation = %reply.conversation,
                error = %report.current_context(),
                "failed to send reply"
            );
        }
    }
}
