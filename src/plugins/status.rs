//! /status, bare collection ids and report buttons.
//!
//! Every path ends in `generate_report`, which edits a single progress message
//! through the stages: collection info, then the report or a failure.

use dashmap::DashMap;
use teloxide::prelude::*;
use teloxide::types::{CallbackQuery, MessageId, ParseMode};
use tracing::{error, info, warn};

use super::access::{allow_callback, allow_message, delete_command};
use super::collections::back_to_list_keyboard;
use super::{COLLECTION_PREFIX, REPORT_PREFIX};
use crate::bot::dispatcher::{AppState, ThrottledBot};
use crate::collector::CollectorError;
use crate::reports::on_demand_message;
use crate::utils::{UNNAMED, extract_uuid, shorten_collection_name};
use crate::warehouse::Collection;

const USAGE: &str = "❌ Укажите ID коллекции.\n\
Пример: /status f01b63d4-90e6-49e7-a17a-1c6575a18450\n\
Или просто отправьте ID коллекции.";
const MISSING_CREDENTIALS: &str = "❌ Не настроены учетные данные для входа в Мозаику. \
Проверьте ADMIN_EMAIL и ADMIN_PASSWORD в .env файле.";
const LOGIN_FAILED: &str = "❌ Не удалось войти в Мозаику. Проверьте учетные данные.";
const NOT_SET: &str = "Не указано";

/// Handle `/status <collection_id>`.
pub async fn status_command(bot: ThrottledBot, msg: Message, state: AppState, args: String) -> anyhow::Result<()> {
    if !allow_message(&bot, &msg, &state).await? {
        return Ok(());
    }

    let Some(collection_id) = args.split_whitespace().next() else {
        bot.send_message(msg.chat.id, USAGE).await?;
        delete_command(&bot, &msg).await;
        return Ok(());
    };

    start_report(bot, msg, state, collection_id.to_string()).await
}

/// Handle a message that is just a collection id.
pub async fn uuid_message(bot: ThrottledBot, msg: Message, state: AppState) -> anyhow::Result<()> {
    if !allow_message(&bot, &msg, &state).await? {
        return Ok(());
    }
    let Some(collection_id) = msg.text().and_then(extract_uuid).map(str::to_string) else {
        return Ok(());
    };

    start_report(bot, msg, state, collection_id).await
}

async fn start_report(bot: ThrottledBot, msg: Message, state: AppState, collection_id: String) -> anyhow::Result<()> {
    let progress = bot
        .send_message(
            msg.chat.id,
            format!("⏳ Загружаю информацию о коллекции {collection_id}..."),
        )
        .await?;
    delete_command(&bot, &msg).await;

    generate_report(&bot, &state, msg.chat.id, progress.id, &collection_id, false).await
}

/// Handle `coll_<id>` (from the list) and `report_<id>` buttons.
pub async fn report_callback(bot: ThrottledBot, q: CallbackQuery, state: AppState) -> anyhow::Result<()> {
    bot.answer_callback_query(&q.id).await?;

    if !allow_callback(&bot, &q, &state).await? {
        return Ok(());
    }
    let (Some(data), Some(message)) = (q.data.as_deref(), q.message.as_ref()) else {
        return Ok(());
    };

    let (collection_id, from_list) = match data.strip_prefix(COLLECTION_PREFIX) {
        Some(id) => (id, true),
        None => (data.strip_prefix(REPORT_PREFIX).unwrap_or(data), false),
    };

    generate_report(&bot, &state, message.chat().id, message.id(), collection_id, from_list).await
}

/// Marks a collection as being collected for the lifetime of the guard.
struct InFlight<'a> {
    reports: &'a DashMap<String, ChatId>,
    collection_id: String,
}

impl<'a> InFlight<'a> {
    fn claim(reports: &'a DashMap<String, ChatId>, collection_id: &str, chat_id: ChatId) -> Option<Self> {
        use dashmap::mapref::entry::Entry;

        match reports.entry(collection_id.to_string()) {
            Entry::Occupied(_) => None,
            Entry::Vacant(slot) => {
                slot.insert(chat_id);
                Some(Self {
                    reports,
                    collection_id: collection_id.to_string(),
                })
            }
        }
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.reports.remove(&self.collection_id);
    }
}

async fn generate_report(
    bot: &ThrottledBot,
    state: &AppState,
    chat_id: ChatId,
    message_id: MessageId,
    collection_id: &str,
    from_list: bool,
) -> anyhow::Result<()> {
    let collection_id = collection_id.trim();

    let Some(_guard) = InFlight::claim(&state.reports_in_flight, collection_id, chat_id) else {
        bot.edit_message_text(
            chat_id,
            message_id,
            format!("⏳ Отчет по коллекции {collection_id} уже собирается, дождитесь результата."),
        )
        .await?;
        return Ok(());
    };

    bot.edit_message_text(
        chat_id,
        message_id,
        format!("⏳ Собираю отчет по коллекции {collection_id}...\nЭто может занять некоторое время."),
    )
    .await?;

    let collection = match state.source.collection_by_id(collection_id).await {
        Ok(collection) => collection,
        Err(e) => {
            warn!("Could not load collection {} from the warehouse: {}", collection_id, e);
            None
        }
    };
    if let Some(collection) = &collection {
        bot.edit_message_text(chat_id, message_id, collection_info(collection))
            .await?;
    }

    info!("Collecting report for {} requested in chat {}", collection_id, chat_id);
    match state.collector.collect(collection_id).await {
        Ok(report) => {
            let name = collection.as_ref().map_or(UNNAMED, Collection::display_name);
            bot.edit_message_text(chat_id, message_id, on_demand_message(name, &report, &state.links))
                .parse_mode(ParseMode::Html)
                .await?;
        }
        Err(e) => {
            error!("Report for {} failed: {}", collection_id, e);
            let edit = bot.edit_message_text(chat_id, message_id, failure_text(collection_id, &e));
            if from_list {
                edit.reply_markup(back_to_list_keyboard()).await?;
            } else {
                edit.await?;
            }
        }
    }

    Ok(())
}

/// Intermediate message shown while the browser runs.
fn collection_info(collection: &Collection) -> String {
    let status = match collection.status.trim() {
        "" => "не указан",
        status => status,
    };
    let timestamp = |ts: Option<chrono::DateTime<chrono::Utc>>| {
        ts.map(|t| t.format("%d.%m.%Y %H:%M").to_string())
            .unwrap_or_else(|| NOT_SET.to_string())
    };

    format!(
        "📊 Коллекция: {}\n\n\
         ID: {}\n\
         Статус: {}\n\
         Создана: {}\n\
         Обновлена: {}\n\n\
         ⏳ Собираю отчет... Это может занять некоторое время.",
        shorten_collection_name(collection.display_name()),
        collection.collection_id,
        status,
        timestamp(collection.created_at),
        timestamp(collection.updated_at),
    )
}

fn failure_text(collection_id: &str, error: &CollectorError) -> String {
    match error {
        CollectorError::MissingCredentials => MISSING_CREDENTIALS.to_string(),
        CollectorError::Login(_) => LOGIN_FAILED.to_string(),
        CollectorError::NotFound(_) => {
            format!("❌ Не удалось собрать отчет по коллекции {collection_id}.")
        }
        other => format!("❌ Ошибка при генерации отчета: {other}"),
    }
}
