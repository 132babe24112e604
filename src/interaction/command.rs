//! Slash commands.

use tracing::{error, info, instrument};

use crate::{base::types::MessageOrigin, interaction::tracker::ConversationTracker};

/// A recognized slash command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Greet the user.
    Start,
    /// Forget the conversation history of a direct message channel.
    Reset,
    Unknown(String),
}

impl Command {
    pub fn parse(command: &str) -> Self {
        match command.trim().trim_start_matches('/').to_ascii_lowercase().as_str() {
            "start" => Self::Start,
            "reset" => Self::Reset,
            other => Self::Unknown(other.to_string()),
        }
    }
}

/// Whether a channel ID names a direct message channel.
pub fn is_direct_channel(channel_id: &str) -> bool {
    channel_id.starts_with('D')
}

/// Run a slash command issued by `user_id` in `channel_id`, returning the reply text.
#[instrument(skip(tracker))]
pub async fn handle_command(command: &str, channel_id: &str, user_id: &str, tracker: &ConversationTracker) -> String {
    match Command::parse(command) {
        Command::Start => format!("Hi <@{user_id}>! How can I assist you today?"),
        Command::Reset if is_direct_channel(channel_id) => {
            let origin = MessageOrigin::Direct { channel_id: channel_id.to_string() };
            let key = tracker.resolve_key(&origin);

            // Wait for any exchange in flight before clearing.
            let _guard = tracker.lock(&key).await;

            match tracker.reset(&key).await {
                Ok(()) => {
                    info!("Reset conversation `{}`.", key);
                    "Done! I've forgotten our conversation so far.".to_string()
                }
                Err(err) => {
                    error!("Failed to reset conversation `{}`: {}", key, err);
                    "Sorry, I couldn't reset our conversation. Please try again later.".to_string()
                }
            }
        }
        Command::Reset => "Each thread is its own conversation here: mention me in a new thread to start fresh.".to_string(),
        Command::Unknown(_) => "Unknown command.".to_string(),
    }
}

// Tests.
