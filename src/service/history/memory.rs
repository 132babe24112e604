//! Process-local history store.
//!
//! History lives as long as the store instance and is lost on restart. Two caps
//! keep it bounded: a per-conversation turn cap, and a conversation cap that
//! evicts the least recently used conversation.

use std::{
    collections::{HashMap, VecDeque},
    sync::Arc,
};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, instrument};

use crate::base::{
    error::StoreResult,
    types::{ConversationKey, Turn},
};

use super::{GenericHistoryStore, HistoryStore};

// Extra methods on `HistoryStore` applied by the memory implementation.

impl HistoryStore {
    /// Creates a new in-memory history store.
    pub fn memory(max_conversations: usize, max_turns_per_conversation: usize) -> Self {
        Self::new(Arc::new(MemoryHistoryStore::new(max_conversations, max_turns_per_conversation)))
    }
}

// Structs.

/// A single conversation's history plus its bookkeeping.
#[derive(Debug, Default)]
struct Conversation {
    turns: VecDeque<Turn>,
    next_sequence: u64,
    last_used: u64,
}

#[derive(Debug, Default)]
struct MemoryState {
    conversations: HashMap<ConversationKey, Conversation>,
    clock: u64,
}

impl MemoryState {
    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    /// Evicts the least recently used conversation.
    fn evict_one(&mut self) {
        let oldest = self.conversations.iter().min_by_key(|(_, c)| c.last_used).map(|(k, _)| k.clone());

        if let Some(key) = oldest {
            debug!("Evicting conversation `{}`.", key);
            self.conversations.remove(&key);
        }
    }
}

/// In-memory history store implementation.
#[derive(Debug)]
pub struct MemoryHistoryStore {
    state: Mutex<MemoryState>,
    /// Zero means unbounded.
    max_conversations: usize,
    max_turns_per_conversation: usize,
}

impl MemoryHistoryStore {
    pub fn new(max_conversations: usize, max_turns_per_conversation: usize) -> Self {
        Self {
            state: Mutex::new(MemoryState::default()),
            max_conversations,
            max_turns_per_conversation: max_turns_per_conversation.max(1),
        }
    }

    /// Number of conversations currently held.
    pub async fn len(&self) -> usize {
        self.state.lock().await.conversations.len()
    }

    /// Whether no conversation is currently held.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl GenericHistoryStore for MemoryHistoryStore {
    #[instrument(name = "MemoryHistoryStore::append", skip(self, turn))]
    async fn append(&self, key: &ConversationKey, mut turn: Turn) -> StoreResult<()> {
        let mut state = self.state.lock().await;
        let now = state.tick();

        if !state.conversations.contains_key(key) && self.max_conversations > 0 && state.conversations.len() >= self.max_conversations {
            state.evict_one();
        }

        let conversation = state.conversations.entry(key.clone()).or_default();
        conversation.last_used = now;

        // Timestamps never go backwards within a conversation.
        if let Some(last) = conversation.turns.back()
            && turn.timestamp < last.timestamp
        {
            turn.timestamp = last.timestamp;
        }

        turn.sequence = Some(conversation.next_sequence);
        conversation.next_sequence += 1;
        conversation.turns.push_back(turn);

        while conversation.turns.len() > self.max_turns_per_conversation {
            conversation.turns.pop_front();
        }

        Ok(())
    }

    #[instrument(name = "MemoryHistoryStore::fetch", skip(self))]
    async fn fetch(&self, key: &ConversationKey, max_turns: usize) -> StoreResult<Vec<Turn>> {
        let mut state = self.state.lock().await;
        let now = state.tick();

        let Some(conversation) = state.conversations.get_mut(key) else {
            return Ok(Vec::new());
        };

        conversation.last_used = now;

        let skip = conversation.turns.len().saturating_sub(max_turns);

        Ok(conversation.turns.iter().skip(skip).cloned().collect())
    }

    #[instrument(name = "MemoryHistoryStore::clear", skip(self))]
    async fn clear(&self, key: &ConversationKey) -> StoreResult<()> {
        self.state.lock().await.conversations.remove(key);

        Ok(())
    }
}

// Tests.
