use receipt_core::types::{ChatId, ChatKind, MessageId};
use serde::{Deserialize, Serialize};

/// Message reduced to the fields the capture layer and worker need, with
/// chat-platform document metadata attached the way TDLib's `formatted
/// message` dict does.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub chat_id: ChatId,
    pub id: MessageId,
    pub date: chrono::DateTime<chrono::Utc>,
    pub is_outgoing: bool,
    pub sender_id: Option<i64>,
    pub text: String,
    pub document: Option<ChatDocument>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatDocument {
    pub file_id: String,
    pub file_name: Option<String>,
    pub mime_type: Option<String>,
    pub size: Option<i64>,
    pub remote_id: Option<String>,
    /// Set once `download_file` has pulled it onto local disk.
    pub local_path: Option<String>,
}

/// One row of `listChats`, chat kind already collapsed to the five
/// external tags.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatSummary {
    pub chat_id: ChatId,
    pub title: String,
    pub username: Option<String>,
    pub kind: ChatKind,
    pub member_count: Option<i64>,
    pub last_message: Option<String>,
    pub is_hidden: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListChatsParams {
    pub search: Option<String>,
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default)]
    pub offset: usize,
    #[serde(default)]
    pub allowed_types: Option<Vec<ChatKind>>,
    #[serde(default)]
    pub include_hidden: bool,
}

fn default_limit() -> usize {
    50
}

#[derive(Debug, Clone, Serialize)]
pub struct ListChatsResult {
    pub total: usize,
    pub items: Vec<ChatSummary>,
}
