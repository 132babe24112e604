#![cfg(test)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use mockall::mock;
use relay_bot::{
    base::{
        error::{ApiError, ApiResult, StoreError, StoreResult},
        types::{ConversationKey, MessageOrigin, Turn, Void},
    },
    interaction::{
        chat_event::{API_FAILURE_REPLY, ChatEvent, EMPTY_QUESTION_REPLY, RECORD_FAILURE_NOTICE, compose_reply, handle_chat_event, handle_chat_event_internal},
        tracker::ConversationTracker,
    },
    service::{
        answer::{Answer, AnswerClient, GenericAnswerClient},
        chat::{ChatClient, GenericChatClient},
        history::{GenericHistoryStore, HistoryStore},
    },
};

// Mocks.

mock! {
    pub Chat {}

    #[async_trait]
    impl GenericChatClient for Chat {
        async fn start(&self) -> Void;
        async fn send_message(&self, channel_id: &str, thread_ts: &str, text: &str) -> Void;
    }
}

mock! {
    pub Answer {}

    #[async_trait]
    impl GenericAnswerClient for Answer {
        async fn ask(&self, question: &str, context: &[Turn]) -> ApiResult<Answer>;
    }
}

mock! {
    pub Store {}

    #[async_trait]
    impl GenericHistoryStore for Store {
        async fn append(&self, key: &ConversationKey, turn: Turn) -> StoreResult<()>;
        async fn fetch(&self, key: &ConversationKey, max_turns: usize) -> StoreResult<Vec<Turn>>;
        async fn clear(&self, key: &ConversationKey) -> StoreResult<()>;
    }
}

/// Sent messages, as `(channel_id, thread_ts, text)`.
type Sent = Arc<Mutex<Vec<(String, String, String)>>>;

/// A chat client that records every message it is asked to send.
fn get_recording_chat() -> (ChatClient, Sent) {
    let sent: Sent = Arc::new(Mutex::new(Vec::new()));
    let mut mock = MockChat::new();

    mock.expect_start().returning(|| Ok(()));

    let recorder = sent.clone();
    mock.expect_send_message().returning(move |channel_id, thread_ts, text| {
        recorder.lock().unwrap().push((channel_id.to_string(), thread_ts.to_string(), text.to_string()));
        Ok(())
    });

    (ChatClient::new(Arc::new(mock)), sent)
}

/// An answer client that echoes the question along with how much context it received.
fn get_echo_answer() -> AnswerClient {
    let mut mock = MockAnswer::new();

    mock.expect_ask().returning(|question, context| {
        let previous = context.iter().map(|t| t.question.as_str()).collect::<Vec<_>>().join("|");
        Ok(Answer::new(format!("answer to `{question}` after [{previous}]")))
    });

    AnswerClient::new(Arc::new(mock))
}

fn direct(channel_id: &str, question: &str) -> ChatEvent {
    ChatEvent {
        origin: MessageOrigin::Direct { channel_id: channel_id.to_string() },
        question: question.to_string(),
    }
}

fn mention(channel_id: &str, thread_ts: &str, question: &str) -> ChatEvent {
    ChatEvent {
        origin: MessageOrigin::Mention {
            channel_id: channel_id.to_string(),
            thread_ts: thread_ts.to_string(),
        },
        question: question.to_string(),
    }
}

// Tests.

#[tokio::test]
async fn test_direct_message_conversation_carries_context() {
    let tracker = ConversationTracker::new(HistoryStore::memory(100, 100), 10);
    let answer = get_echo_answer();
    let (chat, sent) = get_recording_chat();

    handle_chat_event_internal(direct("D01", "What is X?"), &tracker, &answer, &chat).await.unwrap();
    handle_chat_event_internal(direct("D01", "And Z?"), &tracker, &answer, &chat).await.unwrap();

    let sent = sent.lock().unwrap().clone();
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[0], ("D01".to_string(), String::new(), "answer to `What is X?` after []".to_string()));
    assert_eq!(sent[1].2, "answer to `And Z?` after [What is X?]");

    let key = tracker.resolve_key(&MessageOrigin::Direct { channel_id: "D01".to_string() });
    let history = tracker.build_context(&key).await;
    assert_eq!(history.iter().map(|t| t.question.as_str()).collect::<Vec<_>>(), vec!["What is X?", "And Z?"]);
}

#[tokio::test]
async fn test_mention_replies_in_thread_and_threads_are_isolated() {
    let tracker = ConversationTracker::new(HistoryStore::memory(100, 100), 10);
    let answer = get_echo_answer();
    let (chat, sent) = get_recording_chat();

    handle_chat_event_internal(mention("C01", "100.1", "first thread"), &tracker, &answer, &chat).await.unwrap();
    handle_chat_event_internal(mention("C01", "200.2", "second thread"), &tracker, &answer, &chat).await.unwrap();
    handle_chat_event_internal(mention("C01", "100.1", "follow up"), &tracker, &answer, &chat).await.unwrap();

    let sent = sent.lock().unwrap().clone();
    assert_eq!(sent[0].1, "100.1");
    assert_eq!(sent[1].1, "200.2");
    assert_eq!(sent[1].2, "answer to `second thread` after []");
    assert_eq!(sent[2].2, "answer to `follow up` after [first thread]");
}

#[tokio::test]
async fn test_context_window_limits_turns_sent() {
    let tracker = ConversationTracker::new(HistoryStore::memory(100, 100), 2);
    let answer = get_echo_answer();

    for question in ["one", "two", "three"] {
        compose_reply(&direct("D01", question), &tracker, &answer).await;
    }

    let reply = compose_reply(&direct("D01", "four"), &tracker, &answer).await;

    assert_eq!(reply, "answer to `four` after [two|three]");
}

#[tokio::test]
async fn test_empty_question_is_not_sent_to_api() {
    let tracker = ConversationTracker::new(HistoryStore::memory(100, 100), 10);

    let mut mock = MockAnswer::new();
    mock.expect_ask().never();
    let answer = AnswerClient::new(Arc::new(mock));

    let reply = compose_reply(&mention("C01", "100.1", "   "), &tracker, &answer).await;

    assert_eq!(reply, EMPTY_QUESTION_REPLY);
}

#[tokio::test]
async fn test_api_failure_is_visible_and_not_recorded() {
    let tracker = ConversationTracker::new(HistoryStore::memory(100, 100), 10);

    let mut mock = MockAnswer::new();
    mock.expect_ask().returning(|_, _| Err(ApiError::Status { status: 503, detail: "unavailable".to_string() }));
    let answer = AnswerClient::new(Arc::new(mock));

    let event = direct("D01", "What is X?");
    let reply = compose_reply(&event, &tracker, &answer).await;

    assert_eq!(reply, format!("{API_FAILURE_REPLY} (Error: 503)"));

    let key = tracker.resolve_key(&event.origin);
    assert!(tracker.build_context(&key).await.is_empty());
}

#[tokio::test]
async fn test_store_failures_degrade_and_surface() {
    let mut store = MockStore::new();
    store.expect_fetch().returning(|_, _| Err(StoreError::Connection("connection refused".to_string())));
    store.expect_append().returning(|_, _| Err(StoreError::Query("write failed".to_string())));

    let tracker = ConversationTracker::new(HistoryStore::new(Arc::new(store)), 10);
    let answer = get_echo_answer();

    let reply = compose_reply(&direct("D01", "What is X?"), &tracker, &answer).await;

    // The fetch failure still yields an answer (without context), and the record failure is reported.
    assert!(reply.starts_with("answer to `What is X?` after []"));
    assert!(reply.ends_with(RECORD_FAILURE_NOTICE));
}

#[tokio::test]
async fn test_long_answers_are_chunked() {
    let tracker = ConversationTracker::new(HistoryStore::memory(100, 100), 10);
    let (chat, sent) = get_recording_chat();

    let mut mock = MockAnswer::new();
    mock.expect_ask().returning(|_, _| Ok(Answer::new("word ".repeat(2000))));
    let answer = AnswerClient::new(Arc::new(mock));

    handle_chat_event_internal(direct("D01", "Tell me a lot."), &tracker, &answer, &chat).await.unwrap();

    let sent = sent.lock().unwrap().clone();
    assert!(sent.len() > 1);
    assert!(sent.iter().all(|(_, _, text)| text.chars().count() <= 4000));
}

#[tokio::test]
async fn test_concurrent_events_for_one_key_do_not_interleave() {
    let tracker = ConversationTracker::new(HistoryStore::memory(100, 100), 10);
    let answer = get_echo_answer();
    let (chat, sent) = get_recording_chat();

    for i in 0..5 {
        handle_chat_event(direct("D01", &format!("q{i}")), tracker.clone(), answer.clone(), chat.clone());
    }

    // Wait for the spawned handlers to finish.
    for _ in 0..100 {
        if sent.lock().unwrap().len() == 5 {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }

    assert_eq!(sent.lock().unwrap().len(), 5);

    // Each exchange saw every exchange recorded before it, so context sizes are 0..5.
    let key = tracker.resolve_key(&MessageOrigin::Direct { channel_id: "D01".to_string() });
    let history = tracker.build_context(&key).await;
    assert_eq!(history.len(), 5);

    let mut context_sizes = sent
        .lock()
        .unwrap()
        .iter()
        .map(|(_, _, text)| {
            let previous = text.rsplit_once('[').map(|(_, rest)| rest.trim_end_matches(']')).unwrap_or_default();
            if previous.is_empty() { 0 } else { previous.split('|').count() }
        })
        .collect::<Vec<_>>();
    context_sizes.sort();

    assert_eq!(context_sizes, vec![0, 1, 2, 3, 4]);
}

#[tokio::test]
async fn test_surreal_backed_conversation() {
    let tracker = ConversationTracker::new(HistoryStore::surreal_memory().await.expect("Failed to create store"), 10);
    let answer = get_echo_answer();

    compose_reply(&direct("D01", "What is X?"), &tracker, &answer).await;
    let reply = compose_reply(&direct("D01", "And Z?"), &tracker, &answer).await;

    assert_eq!(reply, "answer to `And Z?` after [What is X?]");
}

#[tokio::test]
async fn test_conversation_id_is_sent_back_on_next_question() {
    let tracker = ConversationTracker::new(HistoryStore::surreal_memory().await.expect("Failed to create store"), 10);

    let seen: Arc<Mutex<Vec<Option<String>>>> = Arc::new(Mutex::new(Vec::new()));
    let recorder = seen.clone();

    let mut mock = MockAnswer::new();
    mock.expect_ask().returning(move |question, context| {
        recorder.lock().unwrap().push(context.last().and_then(|t| t.conversation_id.clone()));
        Ok(Answer::new(format!("answer to `{question}`")).with_conversation_id("conv-1"))
    });
    let answer = AnswerClient::new(Arc::new(mock));

    compose_reply(&direct("D01", "What is X?"), &tracker, &answer).await;
    compose_reply(&direct("D01", "And Z?"), &tracker, &answer).await;
    compose_reply(&direct("D02", "Hello?"), &tracker, &answer).await;

    assert_eq!(*seen.lock().unwrap(), vec![None, Some("conv-1".to_string()), None]);
}
