//! Warehouse access: the read-only collections table.
//!
//! `CollectionSource` is the seam the rest of the bot talks to;
//! `BigQueryClient` is the production implementation.

mod auth;
mod bigquery;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

pub use bigquery::BigQueryClient;

use crate::utils::UNNAMED;

/// Warehouse failures.
#[derive(Debug, Error)]
pub enum WarehouseError {
    #[error("invalid service account credentials: {0}")]
    Credentials(String),

    #[error("token exchange failed: {0}")]
    Auth(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("BigQuery returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("query job {0} did not complete in time")]
    JobIncomplete(String),

    #[error("unexpected response: {0}")]
    Malformed(String),
}

/// A collection row.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Collection {
    pub collection_id: String,
    pub collection_name: String,
    pub company_id: Option<String>,
    /// Free-text status label; compare through [`normalize_status`].
    pub status: String,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Collection {
    /// Name for display, with a placeholder for unnamed rows.
    pub fn display_name(&self) -> &str {
        let name = self.collection_name.trim();
        if name.is_empty() { UNNAMED } else { name }
    }
}

/// Trim and case-fold a status label.
pub fn normalize_status(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// Read access to collections.
#[async_trait]
pub trait CollectionSource: Send + Sync {
    /// Collections currently in `status`, most recently created first.
    async fn collections_with_status(&self, status: &str) -> Result<Vec<Collection>, WarehouseError>;

    /// Every collection, most recently created first.
    async fn all_collections(&self) -> Result<Vec<Collection>, WarehouseError>;

    /// A single collection, `None` if unknown.
    async fn collection_by_id(&self, collection_id: &str) -> Result<Option<Collection>, WarehouseError>;
}
