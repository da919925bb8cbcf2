//! Command and button handlers.
//!
//! Add new commands by:
//! 1. Adding a variant to `Command`
//! 2. Writing the endpoint in one of the submodules
//! 3. Adding the branch to `command_handler()`

mod access;
pub mod collections;
pub mod start;
pub mod status;

use teloxide::dispatching::UpdateHandler;
use teloxide::prelude::*;
use teloxide::utils::command::BotCommands;

use crate::bot::dispatcher::ThrottledBot;
use crate::utils::is_uuid;

/// Callback prefix of a collection button in the list.
pub const COLLECTION_PREFIX: &str = "coll_";
/// Callback prefix of a direct report button.
pub const REPORT_PREFIX: &str = "report_";

/// All bot commands.
#[derive(BotCommands, Clone)]
#[command(rename_rule = "snake_case", description = "Доступные команды:")]
pub enum Command {
    #[command(description = "Начать работу")]
    Start(String),

    #[command(description = "Справка по командам")]
    Help,

    #[command(description = "Показать все коллекции")]
    Collections,

    #[command(description = "Показать коллекции со статусом 'tsum cs'")]
    CollectionsTsum,

    #[command(description = "Показать статус коллекции")]
    Status(String),
}

/// Build the combined command handler.
pub fn command_handler() -> UpdateHandler<anyhow::Error> {
    use dptree::case;

    teloxide::filter_command::<Command, _>()
        .branch(case![Command::Start(args)].endpoint(start::start_handler))
        .branch(case![Command::Help].endpoint(start::help_handler))
        .branch(case![Command::Collections].endpoint(collections::collections_command))
        .branch(case![Command::CollectionsTsum].endpoint(collections::collections_tsum_command))
        .branch(case![Command::Status(args)].endpoint(status::status_command))
}

/// Build the handler for messages that are just a collection id.
pub fn collection_id_handler() -> UpdateHandler<anyhow::Error> {
    dptree::filter(|msg: Message| msg.chat.is_private() && msg.text().map(is_uuid).unwrap_or(false))
        .endpoint(status::uuid_message)
}

fn data_starts_with(q: &CallbackQuery, prefix: &str) -> bool {
    q.data.as_deref().is_some_and(|d| d.starts_with(prefix))
}

fn data_is(q: &CallbackQuery, expected: &str) -> bool {
    q.data.as_deref() == Some(expected)
}

/// Build the callback query handler.
pub fn callback_handler() -> UpdateHandler<anyhow::Error> {
    Update::filter_callback_query()
        .branch(
            dptree::filter(|q: CallbackQuery| {
                data_starts_with(&q, REPORT_PREFIX) || data_starts_with(&q, COLLECTION_PREFIX)
            })
            .endpoint(status::report_callback),
        )
        .branch(
            dptree::filter(|q: CallbackQuery| data_is(&q, collections::PAGE_INFO))
                .endpoint(collections::page_info_callback),
        )
        .branch(
            dptree::filter(|q: CallbackQuery| data_starts_with(&q, collections::PAGE_PREFIX))
                .endpoint(collections::page_callback),
        )
        .branch(
            dptree::filter(|q: CallbackQuery| data_is(&q, collections::BACK_TO_LIST))
                .endpoint(collections::back_to_list_callback),
        )
        .branch(
            dptree::filter(|q: CallbackQuery| data_is(&q, collections::REFRESH))
                .endpoint(collections::refresh_callback),
        )
        .branch(dptree::endpoint(unknown_callback))
}

/// Answer stale or foreign buttons so the client stops spinning.
async fn unknown_callback(bot: ThrottledBot, q: CallbackQuery) -> anyhow::Result<()> {
    bot.answer_callback_query(&q.id).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_parsing() {
        let parse = |text: &str| Command::parse(text, "showoff_bot");

        assert!(matches!(parse("/collections"), Ok(Command::Collections)));
        assert!(matches!(parse("/collections_tsum"), Ok(Command::CollectionsTsum)));
        assert!(matches!(parse("/help@showoff_bot"), Ok(Command::Help)));
        assert!(matches!(
            parse("/status f01b63d4-90e6-49e7-a17a-1c6575a18450"),
            Ok(Command::Status(id)) if id == "f01b63d4-90e6-49e7-a17a-1c6575a18450"
        ));
        assert!(matches!(parse("/status"), Ok(Command::Status(id)) if id.is_empty()));
        assert!(parse("/ban").is_err());
    }

    #[test]
    fn test_command_menu() {
        let menu = Command::bot_commands();
        let names: Vec<_> = menu.iter().map(|c| c.command.trim_start_matches('/')).collect();
        assert_eq!(names, ["start", "help", "collections", "collections_tsum", "status"]);
        assert!(menu.iter().all(|c| !c.description.is_empty()));
    }
}
