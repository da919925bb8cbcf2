//! Report chat registration.
//!
//! Adding the bot to a group subscribes the group to broadcast reports;
//! removing or kicking it unsubscribes.

use teloxide::dispatching::UpdateHandler;
use teloxide::prelude::*;
use teloxide::types::{Chat, ChatMemberUpdated};
use tracing::{debug, error, info};

use crate::bot::dispatcher::AppState;

/// What happened to the bot's own membership.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MembershipChange {
    Joined,
    Left,
    Unchanged,
}

impl MembershipChange {
    pub fn of(update: &ChatMemberUpdated) -> Self {
        Self::from_presence(
            update.old_chat_member.is_present(),
            update.new_chat_member.is_present(),
        )
    }

    fn from_presence(was_present: bool, is_present: bool) -> Self {
        match (was_present, is_present) {
            (false, true) => MembershipChange::Joined,
            (true, false) => MembershipChange::Left,
            _ => MembershipChange::Unchanged,
        }
    }
}

/// Chat type label stored in `chats.json`. Private chats are never registered.
pub fn chat_type(chat: &Chat) -> Option<&'static str> {
    if chat.is_group() {
        Some("group")
    } else if chat.is_supergroup() {
        Some("supergroup")
    } else if chat.is_channel() {
        Some("channel")
    } else {
        None
    }
}

/// Returns the handler for the bot's own membership updates.
pub fn handler() -> UpdateHandler<anyhow::Error> {
    Update::filter_my_chat_member().endpoint(membership_handler)
}

async fn membership_handler(update: ChatMemberUpdated, state: AppState) -> anyhow::Result<()> {
    let chat = &update.chat;
    let Some(kind) = chat_type(chat) else {
        return Ok(());
    };

    match MembershipChange::of(&update) {
        MembershipChange::Joined => {
            let title = chat.title().unwrap_or_default();
            info!("Bot added to {} {} ({}) by {}", kind, chat.id, title, update.from.id);
            if let Err(e) = state
                .chats
                .add(chat.id.0, title, Some(update.from.id.0), Some(kind))
                .await
            {
                error!("Failed to register chat {}: {}", chat.id, e);
            }
        }
        MembershipChange::Left => {
            info!("Bot removed from {} {}", kind, chat.id);
            if let Err(e) = state.chats.remove(chat.id.0).await {
                error!("Failed to unregister chat {}: {}", chat.id, e);
            }
        }
        MembershipChange::Unchanged => {
            debug!("Membership in {} changed without joining or leaving", chat.id);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_membership_change() {
        assert_eq!(MembershipChange::from_presence(false, true), MembershipChange::Joined);
        assert_eq!(MembershipChange::from_presence(true, false), MembershipChange::Left);
        assert_eq!(MembershipChange::from_presence(true, true), MembershipChange::Unchanged);
        assert_eq!(MembershipChange::from_presence(false, false), MembershipChange::Unchanged);
    }
}
