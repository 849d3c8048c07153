//! Today's attendance feed: a display-bounded cache and its background poller.

use presence_core::{recent_window, AttendanceRecord, AttendanceService, ServiceError};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

use crate::schedule::ScheduledTask;

/// Read-only cache of today's most recent records.
///
/// Replaced wholesale on every successful refresh; a failed refresh leaves
/// the previous contents untouched.
#[derive(Clone)]
pub struct AttendanceFeed {
    tx: Arc<watch::Sender<Vec<AttendanceRecord>>>,
    window: usize,
}

impl AttendanceFeed {
    pub fn new(window: usize) -> Self {
        let (tx, _) = watch::channel(Vec::new());
        Self {
            tx: Arc::new(tx),
            window,
        }
    }

    pub fn snapshot(&self) -> Vec<AttendanceRecord> {
        self.tx.borrow().clone()
    }

    pub fn len(&self) -> usize {
        self.tx.borrow().len()
    }

    /// Watch for wholesale replacements of the cache.
    pub fn subscribe(&self) -> watch::Receiver<Vec<AttendanceRecord>> {
        self.tx.subscribe()
    }

    /// Fetch today's records and replace the cache. Returns the number kept.
    pub async fn refresh(&self, service: &dyn AttendanceService) -> Result<usize, ServiceError> {
        let records = service.today().await?;
        let fetched = records.len();
        let display = recent_window(records, self.window);
        let kept = display.len();
        self.tx.send_replace(display);
        tracing::debug!(fetched, kept, "attendance feed refreshed");
        Ok(kept)
    }
}

/// Periodic refresh of an [`AttendanceFeed`], independent of the pipeline.
///
/// The first refresh runs immediately. Dropping the poller stops it.
pub struct FeedPoller {
    task: ScheduledTask,
}

impl FeedPoller {
    pub fn spawn(
        feed: AttendanceFeed,
        service: Arc<dyn AttendanceService>,
        period: Duration,
    ) -> Self {
        let task = ScheduledTask::spawn("feed-poll", async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if let Err(err) = feed.refresh(service.as_ref()).await {
                    tracing::warn!(error = %err, "attendance poll failed; keeping previous feed");
                }
            }
        });
        Self { task }
    }

    pub fn cancel(&self) {
        self.task.cancel();
    }
}
