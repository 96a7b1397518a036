//! Conversation state: messages, streaming status, and request history.

use tracechat_wire::{HistoryEntry, StoredMessage};

/// Title given to conversations before their first message
pub const DEFAULT_TITLE: &str = "New Chat";

/// Who wrote a message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// Where an assistant message is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessagePhase {
    /// Placeholder appended, nothing received yet
    Pending,
    /// Receiving trace text, no answer yet
    Thinking,
    /// Receiving the answer
    Answering,
    /// No longer streaming; immutable from here on
    Settled,
}

/// A single message in a conversation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub role: Role,
    pub content: String,
    /// Raw trace text (assistant only)
    pub thinking: String,
    pub is_streaming: bool,
    /// Set once the answer has started, or the message settled
    pub thinking_done: bool,
    /// Content holds an error description instead of an answer
    pub is_error: bool,
}

impl Message {
    /// Create a settled user message
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            thinking: String::new(),
            is_streaming: false,
            thinking_done: false,
            is_error: false,
        }
    }

    /// Create an empty, streaming assistant placeholder
    pub fn assistant_placeholder() -> Self {
        Self {
            role: Role::Assistant,
            content: String::new(),
            thinking: String::new(),
            is_streaming: true,
            thinking_done: false,
            is_error: false,
        }
    }

    /// Create a settled assistant message
    pub fn assistant(content: impl Into<String>, thinking: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            thinking: thinking.into(),
            is_streaming: false,
            thinking_done: true,
            is_error: false,
        }
    }

    /// Current lifecycle phase
    pub fn phase(&self) -> MessagePhase {
        if !self.is_streaming {
            MessagePhase::Settled
        } else if !self.content.is_empty() || self.thinking_done {
            MessagePhase::Answering
        } else if !self.thinking.is_empty() {
            MessagePhase::Thinking
        } else {
            MessagePhase::Pending
        }
    }

    /// Whether this is an assistant message that is still receiving events
    pub fn is_live_assistant(&self) -> bool {
        self.role == Role::Assistant && self.is_streaming
    }
}

impl From<StoredMessage> for Message {
    fn from(stored: StoredMessage) -> Self {
        match stored.role.as_str() {
            "assistant" => Message::assistant(stored.content, stored.thinking.unwrap_or_default()),
            _ => Message::user(stored.content),
        }
    }
}

/// A conversation as held by the UI session
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Conversation {
    pub id: String,
    pub title: String,
    pub messages: Vec<Message>,
    /// Known to the conversation service; local-only conversations are never synced
    pub synced: bool,
}

impl Conversation {
    /// Create an empty conversation
    pub fn new(id: impl Into<String>, title: impl Into<String>, synced: bool) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            messages: Vec::new(),
            synced,
        }
    }

    /// The most recently appended message
    pub fn trailing(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// Whether the trailing message is still streaming
    pub fn is_streaming(&self) -> bool {
        self.trailing().is_some_and(|m| m.is_streaming)
    }

    /// Prior turns to send along with a new message.
    ///
    /// Messages that are still streaming, failed, or empty are left out.
    pub fn history(&self) -> Vec<HistoryEntry> {
        self.messages
            .iter()
            .filter(|m| !m.is_streaming && !m.is_error && !m.content.is_empty())
            .map(|m| HistoryEntry {
                role: m.role.as_str().to_string(),
                content: m.content.clone(),
            })
            .collect()
    }
}
