//! Per-conversation mutual exclusion.
//!
//! Rounds for the same conversation must not interleave their
//! read-extend-commit cycles, while rounds for different conversations run
//! freely. Each conversation gets its own async mutex, created on demand and
//! dropped from the registry once no round holds or awaits it.

use relay_core::ConversationId;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Registry of per-conversation locks.
#[derive(Debug, Default)]
pub struct ConversationLocks {
    locks: Mutex<HashMap<ConversationId, Arc<AsyncMutex<()>>>>,
}

impl ConversationLocks {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits for exclusive access to `id`.
    ///
    /// Access is granted in request order and released when the returned
    /// guard is dropped.
    pub async fn acquire(&self, id: ConversationId) -> ConversationGuard<'_> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(locks.entry(id).or_default())
        };
        let guard = lock.lock_owned().await;
        ConversationGuard {
            registry: self,
            id,
            guard: Some(guard),
        }
    }

    /// Returns the number of conversations with a held or awaited lock.
    #[must_use]
    pub fn active(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn release(&self, id: ConversationId) {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        // Only the registry's own handle left: nobody holds or awaits it.
        if locks
            .get(&id)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(&id);
        }
    }
}

/// Exclusive access to one conversation.
#[derive(Debug)]
pub struct ConversationGuard<'a> {
    registry: &'a ConversationLocks,
    id: ConversationId,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for ConversationGuard<'_> {
    fn drop(&mut self) {
        // Unlock and drop our handle before checking whether the entry is idle.
        drop(self.guard.take());
        self.registry.release(self.id);
    }
}
