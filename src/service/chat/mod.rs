pub mod slack;

use std::{ops::Deref, sync::Arc};

use async_trait::async_trait;

use crate::base::{
    text::{MAX_MESSAGE_LENGTH, chunk_message},
    types::{MessageOrigin, Void},
};

// Traits.

/// Generic "chat" trait that clients must implement.
///
/// This trait defines the core functionality for interacting with chat platforms
/// like Slack. Implementing this trait allows different chat services to be used
/// with the relay-bot.
#[async_trait]
pub trait GenericChatClient: Send + Sync + 'static {
    /// Start the chat client listener.
    ///
    /// This sets up event listeners for the chat platform and begins processing
    /// incoming messages and events.
    async fn start(&self) -> Void;

    /// Send a message to a channel, inside `thread_ts` unless it is empty.
    async fn send_message(&self, channel_id: &str, thread_ts: &str, text: &str) -> Void;
}

// Structs.

/// Chat client for the application.
///
/// It is designed to be trivially cloneable, allowing it to be passed around
/// without the need for `Arc` or `Mutex`.
#[derive(Clone)]
pub struct ChatClient {
    inner: Arc<dyn GenericChatClient>,
}

impl Deref for ChatClient {
    type Target = dyn GenericChatClient;

    fn deref(&self) -> &Self::Target {
        &*self.inner
    }
}

impl ChatClient {
    pub fn new(inner: Arc<dyn GenericChatClient>) -> Self {
        Self { inner }
    }

    /// Reply to the context a message came from, split into platform-sized chunks.
    ///
    /// Stops at the first chunk that fails to send.
    pub async fn reply(&self, origin: &MessageOrigin, text: &str) -> Void {
        let thread_ts = origin.thread_ts().unwrap_or_default();

        for chunk in chunk_message(text, MAX_MESSAGE_LENGTH) {
            self.send_message(origin.channel_id(), thread_ts, &chunk).await?;
        }

        Ok(())
    }
}
