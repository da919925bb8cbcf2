//! Broadcast of scheduled reports to registered chats.

use std::sync::Arc;

use async_trait::async_trait;
use teloxide::RequestError;
use teloxide::prelude::*;
use tracing::{error, info, warn};

use super::message::broadcast_message;
use crate::bot::ThrottledBot;
use crate::collector::ReportCollector;
use crate::config::ReportLinks;
use crate::database::ChatRepo;
use crate::tracker::ReportDispatcher;

/// Sends a plain text message to one chat.
#[async_trait]
pub trait ChatMessenger: Send + Sync {
    async fn send_text(&self, chat_id: ChatId, text: &str) -> Result<(), RequestError>;
}

#[async_trait]
impl ChatMessenger for ThrottledBot {
    async fn send_text(&self, chat_id: ChatId, text: &str) -> Result<(), RequestError> {
        self.send_message(chat_id, text.to_string()).await?;
        Ok(())
    }
}

/// Collects a report and sends it to every active chat.
pub struct ReportSender {
    bot: Arc<dyn ChatMessenger>,
    chats: Arc<ChatRepo>,
    collector: Arc<dyn ReportCollector>,
    links: ReportLinks,
}

impl ReportSender {
    pub fn new(
        bot: Arc<dyn ChatMessenger>,
        chats: Arc<ChatRepo>,
        collector: Arc<dyn ReportCollector>,
        links: ReportLinks,
    ) -> Self {
        Self {
            bot,
            chats,
            collector,
            links,
        }
    }
}

#[async_trait]
impl ReportDispatcher for ReportSender {
    async fn send_report(&self, collection_id: &str, collection_name: &str) {
        let report = match self.collector.collect(collection_id).await {
            Ok(report) => report,
            Err(e) => {
                error!("Failed to collect report for {}: {}", collection_id, e);
                return;
            }
        };

        let chats = match self.chats.active().await {
            Ok(chats) => chats,
            Err(e) => {
                error!("Failed to load report chats: {}", e);
                return;
            }
        };
        if chats.is_empty() {
            warn!("Report for {} collected but no chats are registered", collection_id);
            return;
        }

        let text = broadcast_message(collection_name, &report, &self.links);

        let mut delivered = 0;
        for chat in &chats {
            let Some(chat_id) = chat.telegram_chat_id() else {
                warn!("Skipping chat with invalid id '{}'", chat.chat_id);
                continue;
            };

            match self.bot.send_text(chat_id, &text).await {
                Ok(()) => {
                    delivered += 1;
                    info!("Report for {} sent to chat {}", collection_id, chat_id);
                }
                Err(e) => error!("Error sending report to chat {}: {}", chat_id, e),
            }
        }

        info!(
            "Report for {} delivered to {}/{} chats",
            collection_id,
            delivered,
            chats.len()
        );
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use parking_lot::Mutex;
    use teloxide::ApiError;

    use super::*;
    use crate::collector::{CollectionReport, CollectorError};

    /// Records deliveries; chats in `blocked` fail like a bot kicked from the group.
    #[derive(Default)]
    struct FakeMessenger {
        blocked: Vec<ChatId>,
        sent: Mutex<Vec<(ChatId, String)>>,
        attempts: Mutex<usize>,
    }

    #[async_trait]
    impl ChatMessenger for FakeMessenger {
        async fn send_text(&self, chat_id: ChatId, text: &str) -> Result<(), RequestError> {
            *self.attempts.lock() += 1;
            if self.blocked.contains(&chat_id) {
                return Err(RequestError::Api(ApiError::BotBlocked));
            }
            self.sent.lock().push((chat_id, text.to_string()));
            Ok(())
        }
    }

    struct FixedCollector {
        stats: Option<&'static str>,
    }

    #[async_trait]
    impl ReportCollector for FixedCollector {
        async fn collect(&self, collection_id: &str) -> Result<CollectionReport, CollectorError> {
            match self.stats {
                Some(raw) => Ok(CollectionReport::new(
                    collection_id,
                    format!("https://admin.example/collection/{collection_id}"),
                    raw,
                )),
                None => Err(CollectorError::NotFound(collection_id.to_string())),
            }
        }
    }

    fn links() -> ReportLinks {
        ReportLinks {
            admin_base: "https://admin.example/collection".into(),
            public_base: "https://catalog.example/collection".into(),
        }
    }

    async fn chats(dir: &Path, ids: &[i64]) -> Arc<ChatRepo> {
        let repo = ChatRepo::new(dir.join("chats.json"));
        for id in ids {
            repo.add(*id, "Ops", None, Some("group")).await.unwrap();
        }
        Arc::new(repo)
    }

    fn sender(
        messenger: Arc<FakeMessenger>,
        chats: Arc<ChatRepo>,
        stats: Option<&'static str>,
    ) -> ReportSender {
        ReportSender::new(messenger, chats, Arc::new(FixedCollector { stats }), links())
    }

    #[tokio::test]
    async fn test_failed_chat_does_not_stop_broadcast() {
        let dir = tempfile::tempdir().unwrap();
        let messenger = Arc::new(FakeMessenger {
            blocked: vec![ChatId(-2)],
            ..FakeMessenger::default()
        });
        let chats = chats(dir.path(), &[-1, -2, -3]).await;

        sender(messenger.clone(), chats, Some("8 total done items\n2 combinations done"))
            .send_report("c1", "Spring")
            .await;

        assert_eq!(*messenger.attempts.lock(), 3);
        let sent = messenger.sent.lock().clone();
        let recipients: Vec<_> = sent.iter().map(|(id, _)| *id).collect();
        assert_eq!(recipients, [ChatId(-1), ChatId(-3)]);

        let text = &sent[0].1;
        assert!(text.contains("Направляем пак Spring\nhttps://admin.example/collection/c1\n"));
        assert!(text.ends_with("Итого total done - 10 айтемов"));
    }

    #[tokio::test]
    async fn test_collection_failure_sends_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let messenger = Arc::new(FakeMessenger::default());
        let chats = chats(dir.path(), &[-1]).await;

        sender(messenger.clone(), chats, None).send_report("c1", "Spring").await;

        assert_eq!(*messenger.attempts.lock(), 0);
    }

    #[tokio::test]
    async fn test_no_registered_chats_sends_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let messenger = Arc::new(FakeMessenger::default());
        let chats = chats(dir.path(), &[]).await;

        sender(messenger.clone(), chats, Some("5 total done")).send_report("c1", "Spring").await;

        assert_eq!(*messenger.attempts.lock(), 0);
    }
}
