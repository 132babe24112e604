//! Text helpers for inbound questions and outbound replies.

/// Maximum length of a single chat message.
pub const MAX_MESSAGE_LENGTH: usize = 4000;

/// Strip a leading `<@BOT>` (or `<@BOT|name>`) mention, returning the trimmed remainder.
///
/// Returns `None` when the text does not start with a mention of `bot_user_id`.
pub fn strip_leading_mention<'a>(text: &'a str, bot_user_id: &str) -> Option<&'a str> {
    let rest = text.trim_start().strip_prefix("<@")?.strip_prefix(bot_user_id)?;
    let end = rest.find('>')?;

    // Only `>` or a `|label>` may follow the user id.
    let between = &rest[..end];
    if !between.is_empty() && !between.starts_with('|') {
        return None;
    }

    Some(rest[end + 1..].trim())
}

/// Split `text` into chunks no longer than `max_length` characters.
///
/// Breaks at the last newline or space inside the limit when there is one,
/// and left-trims the remainder before continuing. A `max_length` of zero is
/// treated as one.
pub fn chunk_message(text: &str, max_length: usize) -> Vec<String> {
    let max_length = max_length.max(1);
    let mut chunks = Vec::new();
    let mut rest = text;

    while rest.chars().count() > max_length {
        // Byte offset of the first character past the limit.
        let limit = rest.char_indices().nth(max_length).map(|(i, _)| i).unwrap_or(rest.len());
        let window = &rest[..limit];

        let split = match window.rfind(['\n', ' ']) {
            Some(0) | None => limit,
            Some(i) => i,
        };

        chunks.push(rest[..split].to_string());
        rest = rest[split..].trim_start();
    }

    if !rest.is_empty() {
        chunks.push(rest.to_string());
    }

    chunks
}

// Tests.
