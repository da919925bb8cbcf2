//! Staff user repository.
//!
//! `users.json` is edited by hand, so lookups are cached only briefly.

use std::path::PathBuf;

use tracing::{debug, error};

use crate::cache::{CacheConfig, TypedCache};
use super::json_file::{JsonFile, StoreError};
use super::models::{StaffUser, UsersDocument};

/// Read-only access to the staff list.
pub struct UserRepo {
    file: JsonFile<UsersDocument>,
    cache: TypedCache<i64, Option<StaffUser>>,
}

impl UserRepo {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            file: JsonFile::new(path),
            cache: TypedCache::new("staff_users", CacheConfig::staff_lookup()),
        }
    }

    /// Create `users.json` with an empty list if missing.
    pub async fn ensure_exists(&self) -> Result<(), StoreError> {
        self.file.ensure_exists().await
    }

    /// Find a staff entry by Telegram user id.
    pub async fn get(&self, user_id: i64) -> Result<Option<StaffUser>, StoreError> {
        if let Some(cached) = self.cache.get(&user_id) {
            return Ok(cached);
        }

        let doc = self.file.load_or_default().await?;
        let user = doc
            .users
            .into_iter()
            .find(|u| u.telegram_id() == Some(user_id));

        self.cache.insert(user_id, user.clone());
        Ok(user)
    }

    /// True only for listed users with the `manager` status.
    ///
    /// Read failures deny access.
    pub async fn is_manager(&self, user_id: i64) -> bool {
        match self.get(user_id).await {
            Ok(Some(user)) if user.is_manager() => true,
            Ok(Some(user)) => {
                debug!("User {} is not a manager (status: {})", user_id, user.status);
                false
            }
            Ok(None) => {
                debug!("User {} not found in users list", user_id);
                false
            }
            Err(e) => {
                error!("Error checking user authorization: {}", e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_manager_lookup() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("users.json");
        std::fs::write(
            &path,
            r#"{"users": [
                {"telegram_id": "100", "status": "manager"},
                {"user_id": 200, "status": "operator"}
            ]}"#,
        )
        .unwrap();

        let repo = UserRepo::new(path);
        assert!(repo.is_manager(100).await);
        assert!(!repo.is_manager(200).await);
        assert!(!repo.is_manager(300).await);
    }

    #[tokio::test]
    async fn test_missing_file_denies() {
        let dir = tempfile::tempdir().unwrap();
        let repo = UserRepo::new(dir.path().join("users.json"));
        assert!(!repo.is_manager(1).await);
    }

    #[tokio::test]
    async fn test_corrupt_file_denies() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("users.json");
        std::fs::write(&path, "[").unwrap();

        let repo = UserRepo::new(path);
        assert!(!repo.is_manager(1).await);
    }
}
