//! Access gate shared by commands and buttons.

use teloxide::prelude::*;
use teloxide::types::CallbackQuery;
use tracing::{debug, info};

use crate::bot::dispatcher::{AppState, ThrottledBot};
use crate::permissions::Access;

const NOT_PRIVATE: &str = "❌ Команды бота доступны только в личных сообщениях.\n\
                           В беседах бот только отправляет автоматические отчеты.";
pub const DENIED: &str = "❌ У вас нет доступа к этому боту.";

/// Refusal text for a denied request.
pub fn refusal_text(access: Access, user_id: Option<UserId>) -> Option<String> {
    match access {
        Access::Granted => None,
        Access::NotPrivate => Some(NOT_PRIVATE.to_string()),
        Access::Denied => Some(match user_id {
            Some(id) => format!(
                "{DENIED}\nВаш ID: {id}\nОбратитесь к администратору для получения доступа."
            ),
            None => DENIED.to_string(),
        }),
    }
}

/// Gate a command message.
///
/// Replies with the refusal and returns `false` when access is refused.
pub async fn allow_message(bot: &ThrottledBot, msg: &Message, state: &AppState) -> anyhow::Result<bool> {
    let user_id = msg.from.as_ref().map(|u| u.id);
    let access = state.permissions.check(&msg.chat, user_id).await;

    let Some(refusal) = refusal_text(access, user_id) else {
        return Ok(true);
    };

    info!("Refused {:?} request from {:?} in chat {}", access, user_id, msg.chat.id);
    bot.send_message(msg.chat.id, refusal).await?;
    if access == Access::Denied {
        delete_command(bot, msg).await;
    }
    Ok(false)
}

/// Gate a button press. Refusals replace the message the button belongs to.
///
/// The query must already be answered.
pub async fn allow_callback(bot: &ThrottledBot, q: &CallbackQuery, state: &AppState) -> anyhow::Result<bool> {
    let Some(message) = &q.message else {
        return Ok(false);
    };

    let access = state.permissions.check(message.chat(), Some(q.from.id)).await;
    if access == Access::Granted {
        return Ok(true);
    }

    info!("Refused button press from {} in chat {}", q.from.id, message.chat().id);
    let text = match access {
        Access::NotPrivate => NOT_PRIVATE,
        _ => DENIED,
    };
    bot.edit_message_text(message.chat().id, message.id(), text).await?;
    Ok(false)
}

/// Remove the user's command message. Failures are not worth reporting.
pub async fn delete_command(bot: &ThrottledBot, msg: &Message) {
    if let Err(e) = bot.delete_message(msg.chat.id, msg.id).await {
        debug!("Could not delete message {} in {}: {}", msg.id, msg.chat.id, e);
    }
}
