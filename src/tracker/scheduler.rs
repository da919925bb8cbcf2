//! Fixed-interval driver for the status tracker.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures::FutureExt;
use tokio::sync::watch;
use tracing::{debug, error, info};

use super::{ReportDispatcher, StatusTracker};
use crate::warehouse::normalize_status;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SchedulerState {
    Stopped,
    Running,
}

/// Stops a scheduler from another task.
///
/// A stop request stays pending until a run observes it, so stopping before
/// `start` makes that run return without ticking.
#[derive(Clone)]
pub struct SchedulerHandle {
    running: Arc<AtomicBool>,
    stop: Arc<watch::Sender<bool>>,
}

impl Default for SchedulerHandle {
    fn default() -> Self {
        Self {
            running: Arc::new(AtomicBool::new(false)),
            stop: Arc::new(watch::channel(false).0),
        }
    }
}

impl SchedulerHandle {
    /// Request a stop after the current tick. Repeated calls are no-ops.
    pub fn stop(&self) {
        if self.stop.send_if_modified(|requested| !std::mem::replace(requested, true)) {
            info!("Status scheduler stop requested");
        }
    }

    pub fn state(&self) -> SchedulerState {
        if self.running.load(Ordering::SeqCst) {
            SchedulerState::Running
        } else {
            SchedulerState::Stopped
        }
    }

    fn stop_requested(&self) -> bool {
        *self.stop.borrow()
    }
}

/// Polls the tracker and dispatches one report per transition.
pub struct StatusScheduler {
    tracker: StatusTracker,
    dispatcher: Arc<dyn ReportDispatcher>,
    interval: Duration,
    handle: SchedulerHandle,
}

impl StatusScheduler {
    pub fn new(tracker: StatusTracker, dispatcher: Arc<dyn ReportDispatcher>, interval: Duration) -> Self {
        Self {
            tracker,
            dispatcher,
            interval,
            handle: SchedulerHandle::default(),
        }
    }

    pub fn handle(&self) -> SchedulerHandle {
        self.handle.clone()
    }

    /// Run until [`SchedulerHandle::stop`] is called.
    ///
    /// Ticks never overlap. Stopping takes effect between ticks; the sleep
    /// between them is cut short.
    pub async fn start(&mut self) {
        let mut stop = self.handle.stop.subscribe();
        self.handle.running.store(true, Ordering::SeqCst);
        info!(
            "Status scheduler started (every {}s, target '{}', {:?})",
            self.interval.as_secs(),
            self.tracker.target_status(),
            self.tracker.phase()
        );

        while !*stop.borrow_and_update() {
            if let Err(panic) = AssertUnwindSafe(self.tick()).catch_unwind().await {
                error!("Status check tick panicked: {}", panic_message(&*panic));
            }

            if *stop.borrow_and_update() {
                break;
            }
            // Only a stop request changes the value during a run
            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                _ = stop.changed() => {}
            }
        }

        // Consume the request so the scheduler can be started again
        self.handle.stop.send_replace(false);
        self.handle.running.store(false, Ordering::SeqCst);
        info!("Status scheduler stopped");
    }

    async fn tick(&mut self) {
        let changed = self.tracker.check_status_changes().await;
        let target = self.tracker.target_status().to_string();
        debug!(
            "{} changes, {} collections tracked",
            changed.len(),
            self.tracker.snapshot().len()
        );

        for collection in changed
            .iter()
            .filter(|c| normalize_status(&c.status) == target)
        {
            info!(
                "Dispatching report for {} ({})",
                collection.collection_id, collection.collection_name
            );
            self.dispatcher
                .send_report(&collection.collection_id, collection.display_name())
                .await;
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    panic
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}
