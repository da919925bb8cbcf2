//! /start and /help.

use teloxide::prelude::*;

use super::access::{allow_message, delete_command};
use crate::bot::dispatcher::{AppState, ThrottledBot};

const WELCOME: &str = "👋 Добро пожаловать в бот отчетов по коллекциям!\n\n\
Доступные команды:\n\
/collections - Показать все коллекции\n\
/collections_tsum - Показать коллекции со статусом 'tsum cs'\n\
/status <collection_id> - Показать статус коллекции";

const HELP: &str = "📖 Справка по командам:\n\n\
/collections - Показать все коллекции компании tsum_cs\n\
/collections_tsum - Показать только коллекции со статусом 'tsum cs'\n\
/status <collection_id> - Показать детальную информацию о статусе коллекции\n\
/help - Показать эту справку\n\n\
Можно также просто отправить ID коллекции.";

/// Handle the /start command.
pub async fn start_handler(bot: ThrottledBot, msg: Message, state: AppState) -> anyhow::Result<()> {
    send_text(&bot, &msg, &state, WELCOME).await
}

/// Handle the /help command.
pub async fn help_handler(bot: ThrottledBot, msg: Message, state: AppState) -> anyhow::Result<()> {
    send_text(&bot, &msg, &state, HELP).await
}

async fn send_text(bot: &ThrottledBot, msg: &Message, state: &AppState, text: &str) -> anyhow::Result<()> {
    if !allow_message(bot, msg, state).await? {
        return Ok(());
    }

    bot.send_message(msg.chat.id, text).await?;
    delete_command(bot, msg).await;
    Ok(())
}
