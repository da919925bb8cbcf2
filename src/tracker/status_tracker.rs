//! Detection of collections entering the target status.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Local;
use tracing::{debug, error, info, warn};

use super::TrackerError;
use crate::database::{Snapshot, SnapshotRecord, SnapshotStore};
use crate::warehouse::{Collection, CollectionSource, normalize_status};

/// Whether the tracker has completed its first check.
///
/// The first successful check only records what is already in the target
/// status; it never reports transitions.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TrackerPhase {
    Uninitialized,
    Tracking,
}

/// Diffs current target-status membership against a persisted snapshot.
pub struct StatusTracker {
    source: Arc<dyn CollectionSource>,
    store: Arc<dyn SnapshotStore>,
    /// Normalized target status.
    target_status: String,
    snapshot: Snapshot,
    phase: TrackerPhase,
}

impl StatusTracker {
    /// Load the snapshot. An unreadable store counts as empty.
    pub async fn new(
        source: Arc<dyn CollectionSource>,
        store: Arc<dyn SnapshotStore>,
        target_status: &str,
    ) -> Self {
        let snapshot = match store.load().await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!("Could not load status snapshot, starting empty: {}", e);
                Snapshot::new()
            }
        };

        let phase = if snapshot.is_empty() {
            TrackerPhase::Uninitialized
        } else {
            TrackerPhase::Tracking
        };
        info!("Status tracker loaded {} cached collections ({:?})", snapshot.len(), phase);

        Self {
            source,
            store,
            target_status: normalize_status(target_status),
            snapshot,
            phase,
        }
    }

    pub fn phase(&self) -> TrackerPhase {
        self.phase
    }

    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }

    pub fn target_status(&self) -> &str {
        &self.target_status
    }

    /// Collections that entered the target status since the last check,
    /// in source order.
    ///
    /// Failures are logged and yield an empty list with the snapshot and
    /// phase left untouched.
    pub async fn check_status_changes(&mut self) -> Vec<Collection> {
        match self.try_check_status_changes().await {
            Ok(changed) => changed,
            Err(e) => {
                error!("Status check failed: {}", e);
                Vec::new()
            }
        }
    }

    async fn try_check_status_changes(&mut self) -> Result<Vec<Collection>, TrackerError> {
        let current = self
            .source
            .collections_with_status(&self.target_status)
            .await?;

        let first_run = self.phase == TrackerPhase::Uninitialized;
        let now = Local::now().naive_local();
        let mut next = self.snapshot.clone();
        let mut changed = Vec::new();

        for collection in &current {
            let cached_status = next
                .get(&collection.collection_id)
                .map(|r| normalize_status(&r.status))
                .unwrap_or_default();

            if !first_run
                && normalize_status(&collection.status) == self.target_status
                && cached_status != self.target_status
            {
                info!(
                    "Collection {} ({}) entered status '{}'",
                    collection.collection_id, collection.collection_name, self.target_status
                );
                changed.push(collection.clone());
            }

            next.insert(
                collection.collection_id.clone(),
                SnapshotRecord {
                    status: collection.status.clone(),
                    name: collection.collection_name.clone(),
                    last_checked: now,
                },
            );
        }

        let current_ids: HashSet<&str> = current.iter().map(|c| c.collection_id.as_str()).collect();
        next.retain(|id, _| {
            let keep = current_ids.contains(id.as_str());
            if !keep {
                debug!("Collection {} left status '{}'", id, self.target_status);
            }
            keep
        });

        self.store.save(&next).await?;

        if first_run {
            info!(
                "First status check: recorded {} collections without reporting",
                next.len()
            );
        }
        self.snapshot = next;
        self.phase = TrackerPhase::Tracking;

        Ok(changed)
    }

    /// Current status of one collection straight from the source.
    pub async fn get_collection_status(&self, collection_id: &str) -> Option<String> {
        match self.source.collection_by_id(collection_id).await {
            Ok(collection) => collection.map(|c| c.status),
            Err(e) => {
                warn!("Could not fetch status of {}: {}", collection_id, e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;
    use crate::tracker::testing::{MemoryStore, ScriptedSource, collection};

    const TARGET: &str = "tsum cs";

    fn record(status: &str) -> SnapshotRecord {
        SnapshotRecord {
            status: status.to_string(),
            name: "old".into(),
            last_checked: NaiveDate::from_ymd_opt(2025, 1, 1)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap(),
        }
    }

    fn snapshot(entries: &[(&str, &str)]) -> Snapshot {
        entries
            .iter()
            .map(|(id, status)| (id.to_string(), record(status)))
            .collect()
    }

    fn ids(collections: &[Collection]) -> Vec<&str> {
        collections.iter().map(|c| c.collection_id.as_str()).collect()
    }

    async fn tracker(source: ScriptedSource, store: Arc<MemoryStore>) -> StatusTracker {
        StatusTracker::new(Arc::new(source), store, TARGET).await
    }

    #[tokio::test]
    async fn test_first_run_records_without_reporting() {
        let store = Arc::new(MemoryStore::default());
        let source = ScriptedSource::new().then_ok(vec![
            collection("a", TARGET),
            collection("b", TARGET),
            collection("c", TARGET),
        ]);
        let mut tracker = tracker(source, store.clone()).await;
        assert_eq!(tracker.phase(), TrackerPhase::Uninitialized);

        assert!(tracker.check_status_changes().await.is_empty());

        assert_eq!(tracker.phase(), TrackerPhase::Tracking);
        let stored: Vec<String> = store.stored().into_keys().collect();
        assert_eq!(stored, ["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_detects_transition_once() {
        let store = Arc::new(MemoryStore::with(snapshot(&[("a", "draft"), ("z", TARGET)])));
        let source = ScriptedSource::new()
            .then_ok(vec![collection("a", TARGET), collection("n", TARGET), collection("z", TARGET)])
            .then_ok(vec![collection("a", TARGET), collection("n", TARGET), collection("z", TARGET)]);
        let mut tracker = tracker(source, store.clone()).await;
        assert_eq!(tracker.phase(), TrackerPhase::Tracking);

        let first = tracker.check_status_changes().await;
        assert_eq!(ids(&first), ["a", "n"]);

        let second = tracker.check_status_changes().await;
        assert!(second.is_empty());
        assert_eq!(store.stored()["a"].status, TARGET);
    }

    #[tokio::test]
    async fn test_evicts_collections_that_left() {
        let store = Arc::new(MemoryStore::with(snapshot(&[("a", TARGET), ("b", TARGET)])));
        let source = ScriptedSource::new().then_ok(vec![collection("a", TARGET)]);
        let mut tracker = tracker(source, store.clone()).await;

        assert!(tracker.check_status_changes().await.is_empty());

        assert!(!tracker.snapshot().contains_key("b"));
        assert!(!store.stored().contains_key("b"));
        assert!(store.stored().contains_key("a"));
    }

    #[tokio::test]
    async fn test_returning_collection_is_reported_again() {
        let store = Arc::new(MemoryStore::with(snapshot(&[("a", TARGET), ("b", TARGET)])));
        let source = ScriptedSource::new()
            .then_ok(vec![collection("a", TARGET)])
            .then_ok(vec![collection("a", TARGET), collection("b", TARGET)]);
        let mut tracker = tracker(source, store).await;

        assert!(tracker.check_status_changes().await.is_empty());
        assert_eq!(ids(&tracker.check_status_changes().await), ["b"]);
    }

    #[tokio::test]
    async fn test_status_comparison_is_normalized() {
        let store = Arc::new(MemoryStore::with(snapshot(&[("a", " TSUM CS "), ("b", "Tsum Cs")])));
        let source = ScriptedSource::new().then_ok(vec![
            collection("a", "tsum cs"),
            collection("b", "TSUM CS"),
            collection("c", "  tsum CS\t"),
        ]);
        let mut tracker = StatusTracker::new(Arc::new(source), store, " TSUM cs").await;

        let changed = tracker.check_status_changes().await;
        assert_eq!(ids(&changed), ["c"]);
        assert_eq!(tracker.target_status(), "tsum cs");
    }

    #[tokio::test]
    async fn test_fetch_failure_leaves_state_untouched() {
        let store = Arc::new(MemoryStore::default());
        let source = ScriptedSource::new()
            .then_err("warehouse down")
            .then_ok(vec![collection("a", TARGET)]);
        let mut tracker = tracker(source, store.clone()).await;

        assert!(tracker.check_status_changes().await.is_empty());
        assert_eq!(tracker.phase(), TrackerPhase::Uninitialized);
        assert_eq!(store.save_count(), 0);

        // Still the first successful run, so still suppressed.
        assert!(tracker.check_status_changes().await.is_empty());
        assert_eq!(tracker.phase(), TrackerPhase::Tracking);
    }

    #[tokio::test]
    async fn test_persist_failure_is_retried_from_previous_state() {
        let store = Arc::new(MemoryStore::with(snapshot(&[("z", TARGET)])));
        let source = ScriptedSource::new().then_ok(vec![collection("a", TARGET), collection("z", TARGET)]);
        let mut tracker = tracker(source, store.clone()).await;

        store.fail_saves(true);
        assert!(tracker.check_status_changes().await.is_empty());
        assert!(!tracker.snapshot().contains_key("a"));

        store.fail_saves(false);
        assert_eq!(ids(&tracker.check_status_changes().await), ["a"]);
        assert!(store.stored().contains_key("a"));
    }

    #[tokio::test]
    async fn test_duplicate_rows_reported_once() {
        let store = Arc::new(MemoryStore::with(snapshot(&[("z", TARGET)])));
        let source = ScriptedSource::new().then_ok(vec![collection("a", TARGET), collection("a", TARGET)]);
        let mut tracker = tracker(source, store).await;

        assert_eq!(ids(&tracker.check_status_changes().await), ["a"]);
    }

    #[tokio::test]
    async fn test_get_collection_status() {
        let store = Arc::new(MemoryStore::default());
        let source = ScriptedSource::new()
            .then_ok(vec![collection("a", TARGET)])
            .then_err("boom");
        let tracker = tracker(source, store).await;

        assert_eq!(tracker.get_collection_status("a").await.as_deref(), Some(TARGET));
        assert_eq!(tracker.get_collection_status("a").await, None);
    }
}
