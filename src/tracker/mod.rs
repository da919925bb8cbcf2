//! Status change detection and scheduled report dispatch.
//!
//! `StatusTracker` diffs the collections currently in the target status
//! against a persisted snapshot; `StatusScheduler` polls it on a fixed
//! interval and dispatches one report per detected transition.

mod scheduler;
mod status_tracker;

use async_trait::async_trait;
use thiserror::Error;

use crate::database::StoreError;
use crate::warehouse::WarehouseError;

pub use scheduler::StatusScheduler;
pub use status_tracker::StatusTracker;

/// Why a status check produced no result.
#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("failed to fetch collections: {0}")]
    Fetch(#[from] WarehouseError),

    #[error("failed to persist snapshot: {0}")]
    Persist(#[from] StoreError),
}

/// Sends the report for a collection that entered the target status.
///
/// Implementations handle their own failures; nothing is returned.
#[async_trait]
pub trait ReportDispatcher: Send + Sync {
    async fn send_report(&self, collection_id: &str, collection_name: &str);
}
