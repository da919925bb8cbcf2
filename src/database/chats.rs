//! Report chat repository.

use std::path::PathBuf;

use tracing::info;

use super::json_file::{JsonFile, StoreError};
use super::models::{ChatRecord, ChatsDocument};

/// Registered group chats that receive broadcast reports.
pub struct ChatRepo {
    file: JsonFile<ChatsDocument>,
}

impl ChatRepo {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            file: JsonFile::new(path),
        }
    }

    /// Create `chats.json` with an empty list if missing.
    pub async fn ensure_exists(&self) -> Result<(), StoreError> {
        self.file.ensure_exists().await
    }

    /// Register a chat. Returns `false` if it was already registered.
    pub async fn add(
        &self,
        chat_id: i64,
        title: &str,
        added_by: Option<u64>,
        chat_type: Option<&str>,
    ) -> Result<bool, StoreError> {
        let key = chat_id.to_string();
        let added = self
            .file
            .update(|doc| {
                if doc.chats.iter().any(|c| c.chat_id.trim() == key) {
                    return false;
                }
                doc.chats
                    .push(ChatRecord::new(chat_id, title, added_by, chat_type));
                true
            })
            .await?;

        if added {
            info!("Chat {} ({}) added to chats.json", chat_id, title);
        } else {
            info!("Chat {} already in list", chat_id);
        }
        Ok(added)
    }

    /// Unregister a chat. Returns `true` if something was removed.
    pub async fn remove(&self, chat_id: i64) -> Result<bool, StoreError> {
        let key = chat_id.to_string();
        let removed = self
            .file
            .update(|doc| {
                let before = doc.chats.len();
                doc.chats.retain(|c| c.chat_id.trim() != key);
                before != doc.chats.len()
            })
            .await?;

        if removed {
            info!("Chat {} removed from chats.json", chat_id);
        }
        Ok(removed)
    }

    /// Chats that should receive broadcasts.
    pub async fn active(&self) -> Result<Vec<ChatRecord>, StoreError> {
        let doc = self.file.load_or_default().await?;
        Ok(doc.chats.into_iter().filter(|c| c.is_active).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_add_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let repo = ChatRepo::new(dir.path().join("chats.json"));

        assert!(repo.add(-1001, "Ops", Some(5), Some("supergroup")).await.unwrap());
        assert!(!repo.add(-1001, "Ops again", None, None).await.unwrap());

        let chats = repo.active().await.unwrap();
        assert_eq!(chats.len(), 1);
        assert_eq!(chats[0].title, "Ops");
        assert_eq!(chats[0].added_by.as_deref(), Some("5"));
    }

    #[tokio::test]
    async fn test_remove_and_inactive_filter() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chats.json");
        std::fs::write(
            &path,
            r#"{"chats": [
                {"chat_id": "-1", "title": "A"},
                {"chat_id": "-2", "title": "B", "is_active": false},
                {"chat_id": "-3", "title": "C", "is_active": true}
            ]}"#,
        )
        .unwrap();

        let repo = ChatRepo::new(path);
        let ids: Vec<_> = repo
            .active()
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.chat_id)
            .collect();
        assert_eq!(ids, vec!["-1", "-3"]);

        assert!(repo.remove(-1).await.unwrap());
        assert!(!repo.remove(-1).await.unwrap());
        assert_eq!(repo.active().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_blank_title_gets_placeholder() {
        let dir = tempfile::tempdir().unwrap();
        let repo = ChatRepo::new(dir.path().join("chats.json"));
        repo.add(-7, "  ", None, None).await.unwrap();

        let chats = repo.active().await.unwrap();
        assert_eq!(chats[0].title, "Без названия");
        assert!(chats[0].telegram_chat_id().is_some());
    }
}
