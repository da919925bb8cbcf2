//! Report collection from the admin panel.
//!
//! A browser session logs into the panel, opens the collection's edit form
//! and reads its statistics field.

mod admin_panel;
mod stats;
mod webdriver;

use async_trait::async_trait;
use thiserror::Error;

pub use admin_panel::AdminPanelCollector;
pub use stats::CollectionStats;
use stats::clean_stats_text;
pub use webdriver::WebDriverError;

/// Collection failures.
#[derive(Debug, Error)]
pub enum CollectorError {
    #[error("admin panel credentials are not configured")]
    MissingCredentials,

    #[error("browser error: {0}")]
    Browser(#[from] WebDriverError),

    #[error("login failed: {0}")]
    Login(String),

    #[error("collection {0} not found in the admin panel")]
    NotFound(String),

    #[error("admin panel page did not load: {0}")]
    Navigation(String),
}

/// Statistics gathered for one collection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollectionReport {
    pub collection_id: String,
    pub collection_url: String,
    pub stats: CollectionStats,
}

impl CollectionReport {
    pub fn new(collection_id: &str, collection_url: String, raw_stats: &str) -> Self {
        Self {
            collection_id: collection_id.to_string(),
            collection_url,
            stats: CollectionStats::parse(&clean_stats_text(raw_stats)),
        }
    }
}

/// Produces a report for a collection.
#[async_trait]
pub trait ReportCollector: Send + Sync {
    async fn collect(&self, collection_id: &str) -> Result<CollectionReport, CollectorError>;
}
