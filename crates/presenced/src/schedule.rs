//! Cancellable background tasks owned by the controller that started them.

use std::future::Future;
use tokio::task::JoinHandle;

/// A named tokio task that is aborted when cancelled or dropped.
///
/// Controllers hold one of these per timer loop, so tearing down the
/// controller (or leaving the loop's stage) tears the loop down with it.
pub struct ScheduledTask {
    name: &'static str,
    handle: JoinHandle<()>,
}

impl ScheduledTask {
    pub fn spawn<F>(name: &'static str, future: F) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        tracing::debug!(task = name, "scheduled task started");
        Self {
            name,
            handle: tokio::spawn(future),
        }
    }

    /// Stop the task. Safe to call more than once.
    pub fn cancel(&self) {
        if !self.handle.is_finished() {
            tracing::debug!(task = self.name, "scheduled task cancelled");
            self.handle.abort();
        }
    }
}

impl Drop for ScheduledTask {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    fn ticking(counter: Arc<AtomicUsize>) -> impl Future<Output = ()> + Send + 'static {
        async move {
            let mut ticker = tokio::time::interval(Duration::from_millis(100));
            loop {
                ticker.tick().await;
                counter.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_stops_task() {
        let counter = Arc::new(AtomicUsize::new(0));
        let task = ScheduledTask::spawn("ticker", ticking(counter.clone()));
        tokio::time::sleep(Duration::from_millis(250)).await;
        let seen = counter.load(Ordering::SeqCst);
        assert_eq!(seen, 3);

        drop(task);
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(counter.load(Ordering::SeqCst), seen);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_is_idempotent() {
        let counter = Arc::new(AtomicUsize::new(0));
        let task = ScheduledTask::spawn("ticker", ticking(counter.clone()));
        task.cancel();
        task.cancel();
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(task.handle.is_finished());
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }
}
