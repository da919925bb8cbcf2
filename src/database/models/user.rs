//! Staff user entries from `users.json`.

use serde::{Deserialize, Serialize};

/// Telegram id as written by hand: number or quoted string.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawId {
    Number(i64),
    Text(String),
}

impl RawId {
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Number(n) => Some(*n),
            Self::Text(s) => s.trim().parse().ok(),
        }
    }
}

/// A staff member allowed (or not) to use the bot.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StaffUser {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub telegram_id: Option<RawId>,

    /// Older files use `user_id` instead of `telegram_id`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<RawId>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Role label. Only `manager` grants access.
    #[serde(default)]
    pub status: String,
}

impl StaffUser {
    /// Telegram id, preferring `telegram_id` over `user_id`.
    pub fn telegram_id(&self) -> Option<i64> {
        self.telegram_id
            .as_ref()
            .and_then(RawId::as_i64)
            .or_else(|| self.user_id.as_ref().and_then(RawId::as_i64))
    }

    pub fn is_manager(&self) -> bool {
        self.status.trim().eq_ignore_ascii_case("manager")
    }
}

/// On-disk layout of `users.json`.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct UsersDocument {
    #[serde(default)]
    pub users: Vec<StaffUser>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_formats() {
        let doc: UsersDocument = serde_json::from_str(
            r#"{"users": [
                {"telegram_id": 42, "status": "Manager"},
                {"user_id": "77", "status": "viewer"},
                {"telegram_id": "not-a-number", "user_id": 5}
            ]}"#,
        )
        .unwrap();

        assert_eq!(doc.users[0].telegram_id(), Some(42));
        assert!(doc.users[0].is_manager());
        assert_eq!(doc.users[1].telegram_id(), Some(77));
        assert!(!doc.users[1].is_manager());
        assert_eq!(doc.users[2].telegram_id(), Some(5));
    }
}
