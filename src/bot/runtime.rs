//! Bot runtime - long polling runner.

use teloxide::prelude::*;
use teloxide::types::AllowedUpdate;
use teloxide::update_listeners::Polling;
use tracing::info;

use super::dispatcher::ThrottledBot;

/// Updates the bot reacts to.
const ALLOWED_UPDATES: [AllowedUpdate; 3] = [
    AllowedUpdate::Message,
    AllowedUpdate::CallbackQuery,
    AllowedUpdate::MyChatMember,
];

/// Run the dispatcher with long polling until Ctrl+C.
pub async fn run(
    bot: ThrottledBot,
    mut dispatcher: Dispatcher<ThrottledBot, anyhow::Error, teloxide::dispatching::DefaultKey>,
) {
    info!("Starting bot in polling mode...");

    let listener = Polling::builder(bot)
        .allowed_updates(ALLOWED_UPDATES.to_vec())
        .build();

    let error_handler = LoggingErrorHandler::with_custom_text("Error from update listener");

    dispatcher
        .dispatch_with_listener(listener, error_handler)
        .await;
}
