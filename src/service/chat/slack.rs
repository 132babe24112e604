//! Chat service integration for relay-bot.
//!
//! This module provides the Slack implementation of [`GenericChatClient`]:
//! - Receiving direct messages, @-mentions, and slash commands over socket mode
//! - Sending replies into the originating channel or thread

use crate::{
    base::{
        config::Config,
        text::strip_leading_mention,
        types::{MessageOrigin, Res, Void},
    },
    interaction::{
        self,
        chat_event::ChatEvent,
        tracker::ConversationTracker,
    },
    service::answer::AnswerClient,
};
use async_trait::async_trait;
use hyper_rustls::HttpsConnector;
use hyper_util::client::legacy::connect::HttpConnector;
use slack_morphism::prelude::*;
use tracing::{debug, info, instrument, warn};

use std::{ops::Deref, sync::Arc};

use super::{ChatClient, GenericChatClient};

// Type aliases.

type FullClient = slack_morphism::SlackClient<SlackClientHyperConnector<HttpsConnector<HttpConnector>>>;

// Extra methods on `ChatClient` applied by the slack implementation.

impl ChatClient {
    /// Creates a new Slack chat client.
    pub async fn slack(config: &Config, tracker: ConversationTracker, answer: AnswerClient) -> Res<Self> {
        let client = SlackChatClient::new(config, tracker, answer).await?;
        Ok(Self { inner: Arc::new(client) })
    }
}

impl From<SlackChatClient> for ChatClient {
    fn from(client: SlackChatClient) -> Self {
        Self { inner: Arc::new(client) }
    }
}

// Structs.

/// User state for the slack socket client.
struct SlackUserState {
    tracker: ConversationTracker,
    answer: AnswerClient,
    chat: ChatClient,
    bot_user_id: String,
}

/// Slack client implementation.
#[derive(Clone)]
struct SlackChatClient {
    pub app_token: SlackApiToken,
    pub bot_token: SlackApiToken,
    pub bot_user_id: String,
    pub client: Arc<FullClient>,
    pub tracker: ConversationTracker,
    pub answer: AnswerClient,
}

impl Deref for SlackChatClient {
    type Target = FullClient;

    fn deref(&self) -> &Self::Target {
        &self.client
    }
}

impl SlackChatClient {
    /// Create a new Slack chat client.
    #[instrument(name = "SlackChatClient::new", skip_all)]
    pub async fn new(config: &Config, tracker: ConversationTracker, answer: AnswerClient) -> Res<Self> {
        // Initialize tokens.

        let app_token = SlackApiToken::new(SlackApiTokenValue(config.slack_app_token.clone()));
        let bot_token = SlackApiToken::new(SlackApiTokenValue(config.slack_bot_token.clone()));

        // Initialize the Slack client.

        let https_connector = HttpsConnector::<HttpConnector>::builder().with_native_roots()?.https_only().enable_all_versions().build();
        let connector = SlackClientHyperConnector::with_connector(https_connector);
        let client = Arc::new(slack_morphism::SlackClient::new(connector));

        // Get the bot's user ID.

        let session = client.open_session(&bot_token);
        let bot_user = session.auth_test().await?;
        let bot_user_id = bot_user.user_id.0;

        info!("Slack bot user ID: {}", bot_user_id);

        Ok(Self {
            app_token,
            bot_token,
            bot_user_id,
            client,
            tracker,
            answer,
        })
    }
}

#[async_trait]
impl GenericChatClient for SlackChatClient {
    async fn start(&self) -> Void {
        // Initialize the socket mode listener.

        let socket_mode_callbacks = SlackSocketModeListenerCallbacks::new()
            .with_command_events(handle_command_event)
            .with_push_events(handle_push_event);

        // Initialize the socket mode listener environment.

        let listener_environment = Arc::new(SlackClientEventsListenerEnvironment::new(self.client.clone()).with_user_state(SlackUserState {
            tracker: self.tracker.clone(),
            answer: self.answer.clone(),
            chat: ChatClient::from(self.clone()),
            bot_user_id: self.bot_user_id.clone(),
        }));

        let socket_mode_listener = Arc::new(SlackClientSocketModeListener::new(
            &SlackClientSocketModeConfig::new(),
            listener_environment.clone(),
            socket_mode_callbacks,
        ));

        // Register an app token to listen for events,
        socket_mode_listener.listen_for(&self.app_token).await?;

        // Start WS connections calling Slack API to get WS url for the token,
        // and wait for Ctrl-C to shutdown.
        socket_mode_listener.serve().await;

        Ok(())
    }

    #[instrument(skip(self, text))]
    async fn send_message(&self, channel_id: &str, thread_ts: &str, text: &str) -> Void {
        let message = SlackMessageContent::new().with_text(text.to_string());

        let mut request = SlackApiChatPostMessageRequest::new(SlackChannelId(channel_id.to_string()), message).with_link_names(true);

        if !thread_ts.is_empty() {
            request = request.with_thread_ts(SlackTs(thread_ts.to_string()));
        }

        let session = self.client.open_session(&self.bot_token);

        let _ = session.chat_post_message(&request).await.map_err(|e| anyhow::anyhow!("Failed to send message: {}", e))?;

        Ok(())
    }
}

// Event conversion.

/// Whether a message event is a direct message the bot should answer.
fn is_answerable_direct_message(event: &SlackMessageEvent, bot_user_id: &str) -> bool {
    let is_im = event.origin.channel_type.as_ref().is_some_and(|t| t.0 == "im");

    // Edits, joins, and bot posts all carry a subtype or a bot ID.
    let is_plain = event.subtype.is_none() && event.sender.bot_id.is_none();

    let from_bot_user = event.sender.user.as_ref().is_some_and(|u| u.0 == bot_user_id);

    is_im && is_plain && !from_bot_user
}

/// Build the chat event for a direct message.
///
/// A leading mention of the bot is tolerated and stripped.
fn direct_event(channel_id: &str, text: &str, bot_user_id: &str) -> ChatEvent {
    let question = strip_leading_mention(text, bot_user_id).unwrap_or(text.trim());

    ChatEvent {
        origin: MessageOrigin::Direct { channel_id: channel_id.to_string() },
        question: question.to_string(),
    }
}

/// Build the chat event for an @-mention.
///
/// Only messages that start with the mention are answered. The reply goes into
/// the existing thread, or starts one on the mentioning message.
fn mention_event(channel_id: &str, ts: &str, thread_ts: Option<&str>, text: &str, bot_user_id: &str) -> Option<ChatEvent> {
    let question = strip_leading_mention(text, bot_user_id)?;

    Some(ChatEvent {
        origin: MessageOrigin::Mention {
            channel_id: channel_id.to_string(),
            thread_ts: thread_ts.unwrap_or(ts).to_string(),
        },
        question: question.to_string(),
    })
}

// Socket mode listener callbacks for Slack.

/// Handles command events from Slack.
#[instrument(skip_all)]
async fn handle_command_event(
    event: SlackCommandEvent,
    _client: Arc<SlackHyperClient>,
    states: SlackClientEventsUserState,
) -> Result<SlackCommandEventResponse, Box<dyn std::error::Error + Send + Sync>> {
    info!("Received command `{}` ...", event.command.0);

    let tracker = {
        let states = states.read().await;
        let user_state = states.get_user_state::<SlackUserState>().ok_or(anyhow::anyhow!("Failed to get user state"))?;
        user_state.tracker.clone()
    };

    let reply = interaction::command::handle_command(&event.command.0, &event.channel_id.0, &event.user_id.0, &tracker).await;

    Ok(SlackCommandEventResponse::new(SlackMessageContent::new().with_text(reply)))
}

/// Handles push events from Slack.
#[instrument(skip_all)]
async fn handle_push_event(event_callback: SlackPushEventCallback, _client: Arc<SlackHyperClient>, states: SlackClientEventsUserState) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let event = event_callback.event;
    let states = states.read().await;
    let user_state = states.get_user_state::<SlackUserState>().ok_or(anyhow::anyhow!("Failed to get user state"))?;

    match event {
        SlackEventCallbackBody::Message(slack_message_event) => {
            if !is_answerable_direct_message(&slack_message_event, &user_state.bot_user_id) {
                debug!("Skipping message event that is not a direct message to the bot.");
                return Ok(());
            }

            info!("Received direct message event ...");

            let channel_id = slack_message_event.origin.channel.as_ref().ok_or(anyhow::anyhow!("Failed to get channel ID"))?.0.as_str();
            let text = slack_message_event.content.as_ref().and_then(|c| c.text.as_deref()).unwrap_or_default();

            interaction::chat_event::handle_chat_event(
                direct_event(channel_id, text, &user_state.bot_user_id),
                user_state.tracker.clone(),
                user_state.answer.clone(),
                user_state.chat.clone(),
            );
        }
        SlackEventCallbackBody::AppMention(slack_app_mention_event) => {
            info!("Received app mention event ...");

            let text = slack_app_mention_event.content.text.as_deref().unwrap_or_default();

            let Some(chat_event) = mention_event(
                &slack_app_mention_event.channel.0,
                &slack_app_mention_event.origin.ts.0,
                slack_app_mention_event.origin.thread_ts.as_ref().map(|ts| ts.0.as_str()),
                text,
                &user_state.bot_user_id,
            ) else {
                debug!("Skipping app mention that does not start with the bot mention.");
                return Ok(());
            };

            interaction::chat_event::handle_chat_event(chat_event, user_state.tracker.clone(), user_state.answer.clone(), user_state.chat.clone());
        }
        _ => {
            warn!("Received unhandled push event.")
        }
    }

    Ok(())
}

// Tests.
