pub mod http;

use std::{ops::Deref, sync::Arc};

use async_trait::async_trait;

use crate::base::{error::ApiResult, types::Turn};

// Traits.

/// Generic answer client trait that clients must implement.
///
/// This trait defines the call to the external question-answering service.
/// Implementing this trait allows different answer backends to be used with the relay-bot.
#[async_trait]
pub trait GenericAnswerClient: Send + Sync + 'static {
    /// Ask a question, supplying the prior turns (oldest first) as context.
    ///
    /// The newest context turn carries the conversation ID to continue, if any.
    async fn ask(&self, question: &str, context: &[Turn]) -> ApiResult<Answer>;
}

/// An answer from the API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Answer {
    pub text: String,
    /// The API's conversation ID, sent back with the next question.
    pub conversation_id: Option<String>,
}

impl Answer {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            conversation_id: None,
        }
    }

    pub fn with_conversation_id(mut self, conversation_id: impl Into<String>) -> Self {
        self.conversation_id = Some(conversation_id.into());
        self
    }
}

// Structs.

/// Answer client for the application.
///
/// This is trivially cloneable and can be passed around without the need for `Arc` or `Mutex`.
#[derive(Clone)]
pub struct AnswerClient {
    inner: Arc<dyn GenericAnswerClient>,
}

impl Deref for AnswerClient {
    type Target = dyn GenericAnswerClient;

    fn deref(&self) -> &Self::Target {
        &*self.inner
    }
}

impl AnswerClient {
    pub fn new(inner: Arc<dyn GenericAnswerClient>) -> Self {
        Self { inner }
    }
}
