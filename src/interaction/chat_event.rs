//! The question pipeline: context, answer, record, reply.

use tracing::{Instrument, error, info, instrument};

use crate::{
    base::types::{MessageOrigin, Void},
    interaction::tracker::ConversationTracker,
    service::{answer::AnswerClient, chat::ChatClient},
};

/// Reply sent when a mention carries no question.
pub const EMPTY_QUESTION_REPLY: &str = "Please provide a question after mentioning me.";
/// Prefix of the reply sent when the answer API fails.
pub const API_FAILURE_REPLY: &str = "Sorry, I couldn't get an answer from the backend service.";
/// Appended to an answer that could not be recorded.
pub const RECORD_FAILURE_NOTICE: &str = "(I couldn't save this exchange, so I won't remember it next time.)";

/// An inbound question and where it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatEvent {
    pub origin: MessageOrigin,
    pub question: String,
}

/// Handles a chat event.
///
/// Spawns a new task that answers the question and replies in the originating context.
#[instrument(skip_all)]
pub fn handle_chat_event(event: ChatEvent, tracker: ConversationTracker, answer: AnswerClient, chat: ChatClient) {
    tokio::spawn(async move {
        // Process the event.
        let result = handle_chat_event_internal(event, &tracker, &answer, &chat).in_current_span().await;

        // Log any errors.
        if let Err(err) = &result {
            error!("Error while handling: {}", err);
        }
    });
}

/// Answers the question and sends the reply.
#[instrument(skip_all)]
pub async fn handle_chat_event_internal(event: ChatEvent, tracker: &ConversationTracker, answer: &AnswerClient, chat: &ChatClient) -> Void {
    let reply = compose_reply(&event, tracker, answer).await;

    chat.reply(&event.origin, &reply).await
}

/// Produce the text to send back for a chat event.
///
/// Every outcome yields something for the user: the answer, the answer plus a
/// notice when it could not be recorded, or a failure message.
#[instrument(skip_all)]
pub async fn compose_reply(event: &ChatEvent, tracker: &ConversationTracker, answer: &AnswerClient) -> String {
    let question = event.question.trim();

    if question.is_empty() {
        return EMPTY_QUESTION_REPLY.to_string();
    }

    let key = tracker.resolve_key(&event.origin);

    // Hold the conversation for the whole exchange.
    let _guard = tracker.lock(&key).await;

    let context = tracker.build_context(&key).await;

    info!("Asking `{}` with {} context turns ...", key, context.len());

    let reply = match answer.ask(question, &context).await {
        Ok(reply) => reply,
        Err(err) => {
            error!("Answer API failed: {}", err);
            return format!("{API_FAILURE_REPLY} ({})", err.user_reason());
        }
    };

    match tracker.record_exchange(&key, question, &reply).await {
        Ok(()) => reply.text,
        Err(err) => {
            error!("Failed to record exchange: {}", err);
            format!("{}\n\n{RECORD_FAILURE_NOTICE}", reply.text)
        }
    }
}
