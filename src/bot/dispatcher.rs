//! Message dispatcher setup.
//!
//! Builds the dispatcher with all command, callback and event handlers.

use std::sync::Arc;

use dashmap::DashMap;
use teloxide::adaptors::Throttle;
use teloxide::dispatching::UpdateHandler;
use teloxide::prelude::*;

use crate::cache::{CacheConfig, TypedCache};
use crate::collector::ReportCollector;
use crate::config::ReportLinks;
use crate::database::{ChatRepo, UserRepo};
use crate::events;
use crate::permissions::Permissions;
use crate::plugins::{self, collections::BrowseSession};
use crate::warehouse::CollectionSource;

/// Bot type with Throttle adaptor for automatic rate limiting.
pub type ThrottledBot = Throttle<Bot>;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Staff authorization.
    pub permissions: Permissions,

    /// Chats receiving broadcast reports.
    pub chats: Arc<ChatRepo>,

    /// Warehouse access.
    pub source: Arc<dyn CollectionSource>,

    /// Admin panel report collection.
    pub collector: Arc<dyn ReportCollector>,

    pub links: ReportLinks,

    /// Status label used by /collections_tsum.
    pub target_status: String,

    /// Per-user collection lists, keyed by user id.
    pub browse: TypedCache<u64, BrowseSession>,

    /// Collections with a report being collected, and the chat that asked.
    pub reports_in_flight: Arc<DashMap<String, ChatId>>,
}

impl AppState {
    /// Create a new application state.
    pub fn new(
        users: Arc<UserRepo>,
        chats: Arc<ChatRepo>,
        source: Arc<dyn CollectionSource>,
        collector: Arc<dyn ReportCollector>,
        links: ReportLinks,
        target_status: String,
    ) -> Self {
        Self {
            permissions: Permissions::new(users),
            chats,
            source,
            collector,
            links,
            target_status,
            browse: TypedCache::new("browse_sessions", CacheConfig::browse_session()),
            reports_in_flight: Arc::new(DashMap::new()),
        }
    }
}

/// Build the dispatcher with all handlers.
pub fn build_dispatcher(
    bot: ThrottledBot,
    state: AppState,
) -> Dispatcher<ThrottledBot, anyhow::Error, teloxide::dispatching::DefaultKey> {
    Dispatcher::builder(bot, schema())
        .dependencies(dptree::deps![state])
        .enable_ctrlc_handler()
        .build()
}

/// Build the handler schema.
fn schema() -> UpdateHandler<anyhow::Error> {
    use teloxide::dispatching::UpdateFilterExt;

    // Message handlers: commands first, then bare collection ids
    let message_handler = Update::filter_message()
        .branch(plugins::command_handler())
        .branch(plugins::collection_id_handler());

    // The bot's own membership (report chat registration)
    let member_handler = events::event_handler();

    // Callback query handler
    let callback_handler = plugins::callback_handler();

    dptree::entry()
        .branch(message_handler)
        .branch(member_handler)
        .branch(callback_handler)
}
