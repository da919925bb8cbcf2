//! Registered report chats from `chats.json`.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use teloxide::types::ChatId;

use crate::utils::UNNAMED;

fn default_active() -> bool {
    true
}

/// A group chat that receives broadcast reports.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatRecord {
    /// Stored as a string for compatibility with existing files.
    pub chat_id: String,

    #[serde(default)]
    pub title: String,

    #[serde(default)]
    pub added_by: Option<String>,

    #[serde(default)]
    pub added_at: Option<NaiveDateTime>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chat_type: Option<String>,

    #[serde(default = "default_active")]
    pub is_active: bool,
}

impl ChatRecord {
    pub fn new(chat_id: i64, title: &str, added_by: Option<u64>, chat_type: Option<&str>) -> Self {
        let title = title.trim();
        Self {
            chat_id: chat_id.to_string(),
            title: if title.is_empty() { UNNAMED } else { title }.to_string(),
            added_by: added_by.map(|id| id.to_string()),
            added_at: Some(chrono::Local::now().naive_local()),
            chat_type: chat_type.map(str::to_string),
            is_active: true,
        }
    }

    /// Parsed chat id, `None` for garbage entries.
    pub fn telegram_chat_id(&self) -> Option<ChatId> {
        self.chat_id.trim().parse::<i64>().ok().map(ChatId)
    }
}

/// On-disk layout of `chats.json`.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ChatsDocument {
    #[serde(default)]
    pub chats: Vec<ChatRecord>,
}
