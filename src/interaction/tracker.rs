//! Conversation tracking on top of the history store.
//!
//! The tracker resolves which conversation a message belongs to, assembles the
//! recent turns sent as context with the next question, and records the
//! finished exchange.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, PoisonError, Weak},
};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{debug, instrument, warn};

use crate::{
    base::{
        error::StoreResult,
        types::{ConversationKey, MessageOrigin, Turn},
    },
    service::{answer::Answer, history::HistoryStore},
};

/// Map size past which released per-key locks are pruned.
const LOCK_PRUNE_THRESHOLD: usize = 1024;

/// Per-key async locks, held only while someone is using them.
#[derive(Default)]
struct KeyedLocks {
    locks: Mutex<HashMap<ConversationKey, Weak<AsyncMutex<()>>>>,
}

impl KeyedLocks {
    async fn lock(&self, key: &ConversationKey) -> OwnedMutexGuard<()> {
        let mutex = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);

            if locks.len() >= LOCK_PRUNE_THRESHOLD {
                locks.retain(|_, lock| lock.strong_count() > 0);
            }

            match locks.get(key).and_then(Weak::upgrade) {
                Some(mutex) => mutex,
                None => {
                    let mutex = Arc::new(AsyncMutex::new(()));
                    locks.insert(key.clone(), Arc::downgrade(&mutex));
                    mutex
                }
            }
        };

        mutex.lock_owned().await
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.locks.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

/// Conversation tracker for the application.
///
/// This is trivially cloneable; clones share the store and the per-key locks.
#[derive(Clone)]
pub struct ConversationTracker {
    store: HistoryStore,
    window: usize,
    locks: Arc<KeyedLocks>,
}

impl ConversationTracker {
    /// Create a tracker that sends at most `window` recent turns as context.
    pub fn new(store: HistoryStore, window: usize) -> Self {
        Self {
            store,
            window,
            locks: Arc::new(KeyedLocks::default()),
        }
    }

    /// The number of recent turns sent as context.
    pub fn window(&self) -> usize {
        self.window
    }

    /// Resolve the conversation a message belongs to.
    pub fn resolve_key(&self, origin: &MessageOrigin) -> ConversationKey {
        ConversationKey::from(origin)
    }

    /// Hold exclusive use of a conversation.
    ///
    /// The fetch, ask, and record steps of one exchange run under this guard so
    /// two exchanges for the same key never interleave.
    pub async fn lock(&self, key: &ConversationKey) -> OwnedMutexGuard<()> {
        self.locks.lock(key).await
    }

    /// Fetch the recent turns for `key`, oldest first.
    ///
    /// A store failure yields an empty context: answering without memory beats not answering.
    #[instrument(skip(self))]
    pub async fn build_context(&self, key: &ConversationKey) -> Vec<Turn> {
        match self.store.fetch(key, self.window).await {
            Ok(turns) => {
                debug!("Loaded {} context turns.", turns.len());
                turns
            }
            Err(err) => {
                warn!("Failed to load history, continuing without context: {}", err);
                Vec::new()
            }
        }
    }

    /// Record a finished exchange, along with the API's conversation ID.
    #[instrument(skip(self, question, answer))]
    pub async fn record_exchange(&self, key: &ConversationKey, question: &str, answer: &Answer) -> StoreResult<()> {
        let turn = Turn::new(key.clone(), question, answer.text.as_str()).with_conversation_id(answer.conversation_id.clone());

        self.store.append(key, turn).await
    }

    /// Forget everything recorded for `key`.
    #[instrument(skip(self))]
    pub async fn reset(&self, key: &ConversationKey) -> StoreResult<()> {
        self.store.clear(key).await
    }
}

// Tests.

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;
    use mockall::mock;

    use super::*;
    use crate::base::error::StoreError;
    use crate::service::history::GenericHistoryStore;

    mock! {
        pub Store {}

        #[async_trait]
        impl GenericHistoryStore for Store {
            async fn append(&self, key: &ConversationKey, turn: Turn) -> StoreResult<()>;
            async fn fetch(&self, key: &ConversationKey, max_turns: usize) -> StoreResult<Vec<Turn>>;
            async fn clear(&self, key: &ConversationKey) -> StoreResult<()>;
        }
    }

    fn failing_store() -> MockStore {
        let mut mock = MockStore::new();

        mock.expect_fetch().returning(|_, _| Err(StoreError::Connection("connection refused".to_string())));
        mock.expect_append().returning(|_, _| Err(StoreError::Query("write failed".to_string())));
        mock.expect_clear().returning(|_| Err(StoreError::Query("delete failed".to_string())));

        mock
    }

    fn direct(channel_id: &str) -> MessageOrigin {
        MessageOrigin::Direct { channel_id: channel_id.to_string() }
    }

    #[tokio::test]
    async fn test_fetch_failure_degrades_to_empty_context() {
        let tracker = ConversationTracker::new(HistoryStore::new(Arc::new(failing_store())), 10);
        let key = tracker.resolve_key(&direct("D01"));

        assert!(tracker.build_context(&key).await.is_empty());
    }

    #[tokio::test]
    async fn test_record_failure_surfaces() {
        let tracker = ConversationTracker::new(HistoryStore::new(Arc::new(failing_store())), 10);
        let key = tracker.resolve_key(&direct("D01"));

        let result = tracker.record_exchange(&key, "What is X?", &Answer::new("X is Y.")).await;

        assert!(matches!(result, Err(StoreError::Query(_))));
        assert!(tracker.reset(&key).await.is_err());
    }

    #[tokio::test]
    async fn test_context_uses_configured_window() {
        let mut mock = MockStore::new();
        mock.expect_fetch().withf(|_, max_turns| *max_turns == 3).times(1).returning(|_, _| Ok(Vec::new()));

        let tracker = ConversationTracker::new(HistoryStore::new(Arc::new(mock)), 3);
        let key = tracker.resolve_key(&direct("D01"));

        tracker.build_context(&key).await;
    }

    #[tokio::test]
    async fn test_record_then_build_context() {
        let tracker = ConversationTracker::new(HistoryStore::memory(100, 100), 1);
        let key = tracker.resolve_key(&direct("D01"));

        tracker.record_exchange(&key, "What is X?", &Answer::new("X is Y.")).await.unwrap();
        tracker
            .record_exchange(&key, "And Z?", &Answer::new("Z is W.").with_conversation_id("conv-1"))
            .await
            .unwrap();

        let context = tracker.build_context(&key).await;
        assert_eq!(context.len(), 1);
        assert_eq!(context[0].question, "And Z?");
        assert_eq!(context[0].conversation_key, key);
        assert_eq!(context[0].conversation_id.as_deref(), Some("conv-1"));

        tracker.reset(&key).await.unwrap();
        assert!(tracker.build_context(&key).await.is_empty());
    }

    #[test]
    fn test_resolve_key_is_deterministic() {
        let tracker = ConversationTracker::new(HistoryStore::memory(100, 100), 10);

        assert_eq!(tracker.resolve_key(&direct("D01")), tracker.resolve_key(&direct("D01")));
        assert_ne!(tracker.resolve_key(&direct("D01")), tracker.resolve_key(&direct("D02")));
    }

    #[tokio::test]
    async fn test_lock_is_exclusive_per_key() {
        let tracker = ConversationTracker::new(HistoryStore::memory(100, 100), 10);
        let key = tracker.resolve_key(&direct("D01"));
        let other = tracker.resolve_key(&direct("D02"));

        let guard = tracker.lock(&key).await;

        // A different key is not blocked.
        let other_guard = tokio::time::timeout(Duration::from_millis(100), tracker.lock(&other)).await;
        assert!(other_guard.is_ok());

        // The same key is blocked until the guard drops.
        assert!(tokio::time::timeout(Duration::from_millis(50), tracker.lock(&key)).await.is_err());

        drop(guard);
        assert!(tokio::time::timeout(Duration::from_millis(100), tracker.lock(&key)).await.is_ok());
    }

    #[tokio::test]
    async fn test_released_locks_are_pruned() {
        let locks = KeyedLocks::default();

        for i in 0..(LOCK_PRUNE_THRESHOLD + 10) {
            let key = ConversationKey::from(&direct(&format!("D{i}")));
            drop(locks.lock(&key).await);
        }

        assert!(locks.len() < LOCK_PRUNE_THRESHOLD);
    }
}
