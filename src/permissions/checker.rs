//! Staff authorization checks.

use std::sync::Arc;

use teloxide::types::{Chat, UserId};
use tracing::debug;

use crate::database::UserRepo;

/// Outcome of gating a command or button press.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Access {
    Granted,
    /// Commands are served in private chats only.
    NotPrivate,
    Denied,
}

/// Permission checker backed by the staff list.
///
/// Only users listed in `users.json` with the `manager` status may use the bot.
#[derive(Clone)]
pub struct Permissions {
    users: Arc<UserRepo>,
}

impl Permissions {
    pub fn new(users: Arc<UserRepo>) -> Self {
        Self { users }
    }

    /// Check if a user is allowed to use the bot.
    pub async fn is_authorized(&self, user_id: UserId) -> bool {
        let Ok(id) = i64::try_from(user_id.0) else {
            return false;
        };
        let authorized = self.users.is_manager(id).await;
        debug!("Authorization for user {}: {}", user_id, authorized);
        authorized
    }

    /// Gate a request from `user_id` in `chat`.
    pub async fn check(&self, chat: &Chat, user_id: Option<UserId>) -> Access {
        if !chat.is_private() {
            return Access::NotPrivate;
        }
        match user_id {
            Some(user_id) if self.is_authorized(user_id).await => Access::Granted,
            _ => Access::Denied,
        }
    }
}
