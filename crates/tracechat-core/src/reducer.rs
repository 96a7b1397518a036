//! Stream reducer: pure transitions over a conversation snapshot
//!
//! Every transition takes the conversation by value and hands back the next
//! snapshot; callers own storing it. Only the trailing message is ever
//! touched, and only while it is a streaming assistant message, so events
//! arriving after a message settled are inert.

use tracechat_wire::StreamEvent;

use crate::conversation::{Conversation, Message};

/// Maximum length, in characters, of a title derived from the first message
pub const TITLE_MAX_CHARS: usize = 40;

/// Result of [`begin`]
#[derive(Debug, Clone)]
pub struct Begun {
    pub conversation: Conversation,
    /// Title to persist once the exchange completes (first message only)
    pub pending_title: Option<String>,
}

/// Derive a conversation title from the first user message
pub fn derive_title(user_text: &str) -> String {
    user_text.chars().take(TITLE_MAX_CHARS).collect()
}

/// Append the user message and a streaming assistant placeholder.
pub fn begin(mut conversation: Conversation, user_text: &str) -> Begun {
    let pending_title = conversation
        .messages
        .is_empty()
        .then(|| derive_title(user_text));

    if let Some(title) = &pending_title {
        conversation.title = title.clone();
    }

    conversation.messages.push(Message::user(user_text));
    conversation.messages.push(Message::assistant_placeholder());

    Begun {
        conversation,
        pending_title,
    }
}

/// Apply one stream event to the trailing assistant message.
pub fn apply(mut conversation: Conversation, event: &StreamEvent) -> Conversation {
    let Some(message) = live_trailing(&mut conversation) else {
        tracing::debug!("Dropping event for settled conversation {}", conversation.id);
        return conversation;
    };

    match event {
        StreamEvent::Thinking(text) => message.thinking.push_str(text),
        StreamEvent::Content(text) => {
            // First answer fragment closes the trace phase
            if !message.thinking.is_empty() && !message.thinking_done {
                message.thinking_done = true;
            }
            message.content.push_str(text);
        }
    }

    conversation
}

/// Settle the trailing assistant message after the stream ended normally.
pub fn finish(mut conversation: Conversation) -> Conversation {
    if let Some(message) = live_trailing(&mut conversation) {
        message.is_streaming = false;
        message.thinking_done = true;
    }
    conversation
}

/// Settle the trailing assistant message after a transport or decode failure.
///
/// The answer is replaced by the error description; the trace is kept.
pub fn fail(mut conversation: Conversation, description: &str) -> Conversation {
    if let Some(message) = live_trailing(&mut conversation) {
        message.content = format!("Error: {}", description);
        message.is_error = true;
        message.is_streaming = false;
        message.thinking_done = true;
    }
    conversation
}

fn live_trailing(conversation: &mut Conversation) -> Option<&mut Message> {
    conversation
        .messages
        .last_mut()
        .filter(|m| m.is_live_assistant())
}
