use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type Err = anyhow::Error;
pub type Res<T> = Result<T, Err>;
pub type Void = Res<()>;

/// Identifies one continuing exchange (a DM channel, or a mention thread).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationKey(String);

impl ConversationKey {
    /// Get the key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConversationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&MessageOrigin> for ConversationKey {
    fn from(origin: &MessageOrigin) -> Self {
        match origin {
            MessageOrigin::Direct { channel_id } => Self(format!("dm:{channel_id}")),
            MessageOrigin::Mention { channel_id, thread_ts } => Self(format!("thread:{channel_id}:{thread_ts}")),
        }
    }
}

/// Where an inbound message came from.
///
/// The platform-assigned identifiers are enough to route the reply back, and
/// to derive the [`ConversationKey`] the exchange belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessageOrigin {
    /// A direct message channel between a user and the bot.
    Direct { channel_id: String },
    /// An @-mention in a channel; `thread_ts` is the thread the reply belongs in.
    Mention { channel_id: String, thread_ts: String },
}

impl MessageOrigin {
    /// The channel the reply should be posted to.
    pub fn channel_id(&self) -> &str {
        match self {
            Self::Direct { channel_id } | Self::Mention { channel_id, .. } => channel_id,
        }
    }

    /// The thread the reply should be posted to, if any.
    pub fn thread_ts(&self) -> Option<&str> {
        match self {
            Self::Direct { .. } => None,
            Self::Mention { thread_ts, .. } => Some(thread_ts),
        }
    }
}

/// One recorded question/answer exchange.
///
/// Turns are never mutated once written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub conversation_key: ConversationKey,
    pub question: String,
    pub answer: String,
    pub timestamp: DateTime<Utc>,
    /// Per-conversation sequence number, when the backend assigns one.
    #[serde(default)]
    pub sequence: Option<u64>,
    /// Conversation ID the answer API assigned to this exchange, if any.
    #[serde(default)]
    pub conversation_id: Option<String>,
}

impl Turn {
    /// Create a turn stamped with the current time.
    pub fn new(conversation_key: ConversationKey, question: impl Into<String>, answer: impl Into<String>) -> Self {
        Self::at(conversation_key, question, answer, Utc::now())
    }

    /// Create a turn with an explicit timestamp.
    pub fn at(conversation_key: ConversationKey, question: impl Into<String>, answer: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            conversation_key,
            question: question.into(),
            answer: answer.into(),
            timestamp,
            sequence: None,
            conversation_id: None,
        }
    }

    /// Attach the answer API's conversation ID.
    pub fn with_conversation_id(mut self, conversation_id: Option<String>) -> Self {
        self.conversation_id = conversation_id;
        self
    }
}

// Tests.
