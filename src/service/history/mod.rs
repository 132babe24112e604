pub mod memory;
pub mod surreal;

use std::{ops::Deref, sync::Arc};

use async_trait::async_trait;
use tracing::info;

use crate::base::{
    config::{Config, StorageBackend},
    error::StoreResult,
    types::{ConversationKey, Res, Turn},
};

// Traits.

/// Generic history store trait that backends must implement.
///
/// A history is the ordered sequence of turns recorded for one conversation key.
/// Implementing this trait allows different storage backends to hold the
/// conversation memory of the relay-bot.
#[async_trait]
pub trait GenericHistoryStore: Send + Sync + 'static {
    /// Appends a turn to the end of the history stored under `key`.
    ///
    /// Must be safe to call concurrently for different keys.
    async fn append(&self, key: &ConversationKey, turn: Turn) -> StoreResult<()>;

    /// Fetches up to `max_turns` of the most recent turns for `key`, oldest first.
    ///
    /// A key with no history yields an empty vector, not an error.
    async fn fetch(&self, key: &ConversationKey, max_turns: usize) -> StoreResult<Vec<Turn>>;

    /// Removes every turn stored under `key`.
    async fn clear(&self, key: &ConversationKey) -> StoreResult<()>;
}

// Structs.

/// History store for the application.
///
/// This is trivially cloneable and can be passed around without the need for `Arc` or `Mutex`.
#[derive(Clone)]
pub struct HistoryStore {
    inner: Arc<dyn GenericHistoryStore>,
}

impl Deref for HistoryStore {
    type Target = dyn GenericHistoryStore;

    fn deref(&self) -> &Self::Target {
        &*self.inner
    }
}

impl HistoryStore {
    pub fn new(inner: Arc<dyn GenericHistoryStore>) -> Self {
        Self { inner }
    }

    /// Creates the backend selected by the configuration.
    ///
    /// Failing to reach a persistent backend is an error: the bot cannot serve
    /// any conversation without its configured store.
    pub async fn from_config(config: &Config) -> Res<Self> {
        match config.storage_backend {
            StorageBackend::Memory => {
                info!("Using in-memory storage for chat history (will be lost on restart).");
                Ok(Self::memory(config.memory_max_conversations, config.memory_max_turns_per_conversation))
            }
            StorageBackend::Surreal => Ok(Self::surreal(config).await?),
        }
    }
}

// Tests.
