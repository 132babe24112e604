//! Runtime services and shared state for the relay-bot.

use tracing::{info, instrument};

use crate::{
    base::{
        config::Config,
        types::{Res, Void},
    },
    interaction::tracker::ConversationTracker,
    service::{answer::AnswerClient, chat::ChatClient, history::HistoryStore},
};

/// Runtime service context that can be shared across the application.
///
/// This struct holds the history store, conversation tracker, answer client, chat client,
/// and configuration. It is designed to be trivially cloneable, allowing it to be passed
/// around without the need for `Arc` or `Mutex`.
#[derive(Clone)]
pub struct Runtime {
    /// The configuration for the application.
    pub config: Config,
    /// The history store instance.
    pub history: HistoryStore,
    /// The conversation tracker instance.
    pub tracker: ConversationTracker,
    /// The answer client instance.
    pub answer: AnswerClient,
    /// The chat client instance.
    pub chat: ChatClient,
}

impl Runtime {
    /// Create a new runtime instance.
    ///
    /// Fails if the configured history store cannot be reached.
    #[instrument(skip_all)]
    pub async fn new(config: Config) -> Res<Self> {
        // Initialize the history store.
        let history = HistoryStore::from_config(&config).await?;

        // Initialize the conversation tracker.
        let tracker = ConversationTracker::new(history.clone(), config.context_window);

        // Initialize the answer client.
        let answer = AnswerClient::http(&config)?;

        // Initialize the chat client.
        let chat = ChatClient::slack(&config, tracker.clone(), answer.clone()).await?;

        info!("Runtime initialized with a context window of {} turns.", tracker.window());

        Ok(Self {
            config,
            history,
            tracker,
            answer,
            chat,
        })
    }

    /// Start listening for chat events.
    pub async fn start(&self) -> Void {
        self.chat.start().await
    }
}
