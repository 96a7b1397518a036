//! Request and response bodies of the conversation service

use serde::{Deserialize, Serialize};

/// Sidebar entry returned by the conversation list endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationSummary {
    pub id: String,
    pub title: String,
}

/// A conversation with its stored messages
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationDetail {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub messages: Vec<StoredMessage>,
}

/// A message as persisted by the backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredMessage {
    pub role: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thinking: Option<String>,
}

/// One prior turn sent along with a new message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub role: String,
    pub content: String,
}

/// Body of `POST /chat/stream`
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    pub message: String,
    pub history: Vec<HistoryEntry>,
}

/// Body of `POST /conversations/{user}/{id}/messages`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SaveExchangeRequest {
    pub user_message: String,
    pub assistant_content: String,
    pub assistant_thinking: Option<String>,
}

/// Body of title create/update requests
#[derive(Debug, Clone, Serialize)]
pub(crate) struct TitleBody<'a> {
    pub title: &'a str,
}
