//! Paginated collection browser.
//!
//! The list a user is paging through is kept in the browse cache, so page flips
//! do not hit the warehouse. `/collections`, `/collections_tsum`, a filter change
//! and the refresh button reload it.

use std::sync::Arc;

use teloxide::prelude::*;
use teloxide::types::{CallbackQuery, InlineKeyboardButton, InlineKeyboardMarkup, MessageId};
use teloxide::{ApiError, RequestError};
use tracing::{error, info};

use super::access::{allow_callback, allow_message, delete_command};
use super::COLLECTION_PREFIX;
use crate::bot::dispatcher::{AppState, ThrottledBot};
use crate::utils::button_label;
use crate::warehouse::{Collection, WarehouseError};

/// Collections per page, two buttons per row.
pub const PAGE_SIZE: usize = 12;
const BUTTONS_PER_ROW: usize = 2;
/// How far the back/forward buttons jump.
const PAGE_JUMP: usize = 5;
const QUICK_PAGES: usize = 5;

pub const PAGE_PREFIX: &str = "page_";
pub const PAGE_INFO: &str = "page_info";
pub const BACK_TO_LIST: &str = "back_to_list";
pub const REFRESH: &str = "refresh_collections";

const LOADING: &str = "⏳ Загружаю коллекции...";
const REFRESHING: &str = "⏳ Обновляю список коллекций...";
const NOT_FOUND: &str = "❌ Коллекции не найдены.";
const PAGE_HINT: &str = "Используйте кнопки навигации для перехода между страницами";
const BAD_PAGE: &str = "Ошибка: неверный номер страницы";

/// Which collections a list shows.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ListFilter {
    All,
    Status(String),
}

impl ListFilter {
    /// Form used inside callback data.
    fn token(&self) -> &str {
        match self {
            ListFilter::All => "all",
            ListFilter::Status(status) => status,
        }
    }

    fn from_token(token: &str) -> Self {
        match token.trim() {
            "" | "all" => ListFilter::All,
            status => ListFilter::Status(status.to_string()),
        }
    }
}

/// A user's current list.
#[derive(Clone, Debug)]
pub struct BrowseSession {
    pub filter: ListFilter,
    pub collections: Arc<Vec<Collection>>,
    pub page: usize,
}

pub fn total_pages(count: usize) -> usize {
    count.div_ceil(PAGE_SIZE).max(1)
}

fn page_data(page: usize, filter: &ListFilter) -> String {
    format!("{PAGE_PREFIX}{page}_{}", filter.token())
}

/// Parse `page_<n>_<filter>`. The filter part may itself contain underscores.
pub fn parse_page_data(data: &str) -> Option<(usize, ListFilter)> {
    let rest = data.strip_prefix(PAGE_PREFIX)?;
    let (page, filter) = rest.split_once('_').unwrap_or((rest, "all"));
    Some((page.parse().ok()?, ListFilter::from_token(filter)))
}

/// Keyboard for one page of the list. `page` is clamped to the last page.
pub fn build_keyboard(collections: &[Collection], page: usize, filter: &ListFilter) -> InlineKeyboardMarkup {
    let total = total_pages(collections.len());
    let page = page.min(total - 1);

    let buttons: Vec<InlineKeyboardButton> = collections
        .iter()
        .skip(page * PAGE_SIZE)
        .take(PAGE_SIZE)
        .map(|c| {
            InlineKeyboardButton::callback(
                button_label(c.display_name()),
                format!("{COLLECTION_PREFIX}{}", c.collection_id),
            )
        })
        .collect();

    let mut rows: Vec<Vec<InlineKeyboardButton>> = buttons
        .chunks(BUTTONS_PER_ROW)
        .map(<[InlineKeyboardButton]>::to_vec)
        .collect();

    let mut nav = Vec::with_capacity(3);
    if page > 0 {
        nav.push(InlineKeyboardButton::callback(
            "◀️ Назад",
            page_data(page.saturating_sub(PAGE_JUMP), filter),
        ));
    }
    nav.push(InlineKeyboardButton::callback(
        format!("📄 {}/{}", page + 1, total),
        PAGE_INFO,
    ));
    if page + 1 < total {
        nav.push(InlineKeyboardButton::callback(
            "Вперед ▶️",
            page_data((page + PAGE_JUMP).min(total - 1), filter),
        ));
    }
    rows.push(nav);

    if total > 1 {
        let quick = (page..total)
            .take(QUICK_PAGES)
            .map(|p| InlineKeyboardButton::callback((p + 1).to_string(), page_data(p, filter)))
            .collect();
        rows.push(quick);
    }

    rows.push(vec![InlineKeyboardButton::callback("🔄 Обновить", REFRESH)]);
    InlineKeyboardMarkup::new(rows)
}

/// Single button leading back to the list.
pub fn back_to_list_keyboard() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![vec![InlineKeyboardButton::callback(
        "◀️ К списку",
        BACK_TO_LIST,
    )]])
}

fn page_text(page: usize, total: usize) -> String {
    format!("Страница {}/{}", page + 1, total)
}

// --- Commands ---

/// Handle /collections.
pub async fn collections_command(bot: ThrottledBot, msg: Message, state: AppState) -> anyhow::Result<()> {
    list_command(bot, msg, state, ListFilter::All).await
}

/// Handle /collections_tsum.
pub async fn collections_tsum_command(bot: ThrottledBot, msg: Message, state: AppState) -> anyhow::Result<()> {
    let filter = ListFilter::Status(state.target_status.clone());
    list_command(bot, msg, state, filter).await
}

async fn list_command(bot: ThrottledBot, msg: Message, state: AppState, filter: ListFilter) -> anyhow::Result<()> {
    if !allow_message(&bot, &msg, &state).await? {
        return Ok(());
    }
    let Some(user) = msg.from.as_ref() else {
        return Ok(());
    };

    let loading = bot.send_message(msg.chat.id, LOADING).await?;
    delete_command(&bot, &msg).await;

    show_page(&bot, &state, user.id, msg.chat.id, loading.id, filter, 0, true).await
}

// --- Callbacks ---

/// Handle `page_<n>_<filter>` buttons.
pub async fn page_callback(bot: ThrottledBot, q: CallbackQuery, state: AppState) -> anyhow::Result<()> {
    let Some((page, filter)) = q.data.as_deref().and_then(parse_page_data) else {
        bot.answer_callback_query(&q.id).text(BAD_PAGE).show_alert(true).await?;
        return Ok(());
    };
    bot.answer_callback_query(&q.id).await?;

    if !allow_callback(&bot, &q, &state).await? {
        return Ok(());
    }
    let Some(message) = &q.message else {
        return Ok(());
    };

    show_page(&bot, &state, q.from.id, message.chat().id, message.id(), filter, page, false).await
}

/// Handle the page indicator button.
pub async fn page_info_callback(bot: ThrottledBot, q: CallbackQuery) -> anyhow::Result<()> {
    bot.answer_callback_query(&q.id).text(PAGE_HINT).await?;
    Ok(())
}

/// Return to the page the user was on.
pub async fn back_to_list_callback(bot: ThrottledBot, q: CallbackQuery, state: AppState) -> anyhow::Result<()> {
    bot.answer_callback_query(&q.id).await?;

    if !allow_callback(&bot, &q, &state).await? {
        return Ok(());
    }
    let Some(message) = &q.message else {
        return Ok(());
    };

    let (filter, page) = state
        .browse
        .get(&q.from.id.0)
        .map(|session| (session.filter, session.page))
        .unwrap_or((ListFilter::All, 0));

    show_page(&bot, &state, q.from.id, message.chat().id, message.id(), filter, page, false).await
}

/// Reload the list from the warehouse and go to the first page.
pub async fn refresh_callback(bot: ThrottledBot, q: CallbackQuery, state: AppState) -> anyhow::Result<()> {
    bot.answer_callback_query(&q.id).await?;

    if !allow_callback(&bot, &q, &state).await? {
        return Ok(());
    }
    let Some(message) = &q.message else {
        return Ok(());
    };

    let filter = state
        .browse
        .get(&q.from.id.0)
        .map(|session| session.filter)
        .unwrap_or(ListFilter::All);
    state.browse.invalidate(&q.from.id.0);

    bot.edit_message_text(message.chat().id, message.id(), REFRESHING).await?;
    show_page(&bot, &state, q.from.id, message.chat().id, message.id(), filter, 0, true).await
}

// --- Rendering ---

async fn load(state: &AppState, filter: &ListFilter) -> Result<Vec<Collection>, WarehouseError> {
    match filter {
        ListFilter::All => state.source.all_collections().await,
        ListFilter::Status(status) => state.source.collections_with_status(status).await,
    }
}

/// Render `page` of the user's list into an existing message.
///
/// With `reload` the caller already shows a loading text and fresh data is
/// fetched. Otherwise the cached list is used when its filter matches.
#[allow(clippy::too_many_arguments)]
async fn show_page(
    bot: &ThrottledBot,
    state: &AppState,
    user_id: UserId,
    chat_id: ChatId,
    message_id: MessageId,
    filter: ListFilter,
    page: usize,
    reload: bool,
) -> anyhow::Result<()> {
    let cached = state
        .browse
        .get(&user_id.0)
        .filter(|session| !reload && session.filter == filter);

    let session = match cached {
        Some(session) => session,
        None => {
            if !reload {
                bot.edit_message_text(chat_id, message_id, LOADING).await?;
            }
            match load(state, &filter).await {
                Ok(collections) => {
                    info!("Loaded {} collections ({:?}) for user {}", collections.len(), filter, user_id);
                    BrowseSession {
                        filter,
                        collections: Arc::new(collections),
                        page: 0,
                    }
                }
                Err(e) => {
                    error!("Error loading collections for user {}: {}", user_id, e);
                    bot.edit_message_text(chat_id, message_id, format!("❌ Ошибка при загрузке коллекций: {e}"))
                        .await?;
                    return Ok(());
                }
            }
        }
    };

    if session.collections.is_empty() {
        state.browse.invalidate(&user_id.0);
        bot.edit_message_text(chat_id, message_id, NOT_FOUND).await?;
        return Ok(());
    }

    let total = total_pages(session.collections.len());
    let page = page.min(total - 1);
    let keyboard = build_keyboard(&session.collections, page, &session.filter);

    match bot
        .edit_message_text(chat_id, message_id, page_text(page, total))
        .reply_markup(keyboard)
        .await
    {
        Ok(_) | Err(RequestError::Api(ApiError::MessageNotModified)) => {}
        Err(e) => return Err(e.into()),
    }

    state.browse.insert(user_id.0, BrowseSession { page, ..session });
    Ok(())
}
