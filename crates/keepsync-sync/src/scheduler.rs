//! Debounced sync scheduler - coalesces bursts of writes into one sync
//!
//! The [`DebouncedScheduler`] owns one cancelable timer per dataset.
//! [`trigger()`](DebouncedScheduler::trigger) replaces any pending timer for
//! the dataset, so N triggers inside the delay window run the job once,
//! `delay` after the last trigger. The job observes state as of when it
//! fires, not as of when it was armed.
//!
//! ## Flow
//!
//! ```text
//! trigger(ds) ──→ cancel previous ──→ spawn timer task ──→ sleep(delay)
//!                                          │                   │
//!                                      cancel(ds)         clear own entry
//!                                          │                   │
//!                                       dropped             run job once
//! ```
//!
//! Cancellation only prevents a timer that has not fired yet; a job that is
//! already running is never aborted.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use keepsync_core::domain::DatasetId;

/// A timer that has been armed but has not fired
#[derive(Debug)]
struct PendingTimer {
    generation: u64,
    token: CancellationToken,
}

/// Per-process registry of debounced, per-dataset timers
///
/// Must be used from within a Tokio runtime.
#[derive(Debug, Default)]
pub struct DebouncedScheduler {
    timers: DashMap<DatasetId, PendingTimer>,
    generation: AtomicU64,
}

impl DebouncedScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arms (or re-arms) the timer for `dataset`
    ///
    /// Any pending timer for the same dataset is cancelled first. When the
    /// new timer fires it removes itself from the registry and awaits `job`.
    pub fn trigger<F, Fut>(self: &Arc<Self>, dataset: DatasetId, delay: Duration, job: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        let token = CancellationToken::new();

        if let Some(previous) = self.timers.insert(
            dataset.clone(),
            PendingTimer {
                generation,
                token: token.clone(),
            },
        ) {
            previous.token.cancel();
            debug!(%dataset, "Re-armed debounced sync");
        } else {
            debug!(%dataset, delay_ms = delay.as_millis() as u64, "Armed debounced sync");
        }

        let deadline = tokio::time::Instant::now() + delay;
        let registry = Arc::downgrade(self);
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {
                    debug!(%dataset, "Debounced sync cancelled");
                }
                _ = tokio::time::sleep_until(deadline) => {
                    // Scheduler dropped: nothing left to sync for
                    let Some(registry) = registry.upgrade() else {
                        return;
                    };
                    registry
                        .timers
                        .remove_if(&dataset, |_, pending| pending.generation == generation);
                    drop(registry);
                    debug!(%dataset, "Debounced sync firing");
                    job().await;
                }
            }
        });
    }

    /// Cancels the pending timer for `dataset`; returns whether one existed
    pub fn cancel(&self, dataset: &DatasetId) -> bool {
        match self.timers.remove(dataset) {
            Some((_, pending)) => {
                pending.token.cancel();
                debug!(%dataset, "Cancelled pending sync");
                true
            }
            None => false,
        }
    }

    pub fn is_pending(&self, dataset: &DatasetId) -> bool {
        self.timers.contains_key(dataset)
    }

    pub fn pending_count(&self) -> usize {
        self.timers.len()
    }

    /// Cancels every pending timer
    pub fn shutdown(&self) {
        let count = self.timers.len();
        for entry in self.timers.iter() {
            entry.value().token.cancel();
        }
        self.timers.clear();
        info!(cancelled = count, "Sync scheduler stopped");
    }
}

// ============================================================================
// Unit tests
// ============================================================================

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;

    fn notes() -> DatasetId {
        DatasetId::new("notes").unwrap()
    }

    fn counting_job(
        counter: &Arc<AtomicUsize>,
    ) -> impl FnOnce() -> std::future::Ready<()> + Send + 'static {
        let counter = Arc::clone(counter);
        move || {
            counter.fetch_add(1, Ordering::SeqCst);
            std::future::ready(())
        }
    }

    /// Lets spawned timer tasks observe the advanced clock
    async fn settle() {
        for _ in 0..4 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_trigger_fires_after_delay() {
        let scheduler = Arc::new(DebouncedScheduler::new());
        let runs = Arc::new(AtomicUsize::new(0));

        scheduler.trigger(notes(), Duration::from_millis(500), counting_job(&runs));
        assert!(scheduler.is_pending(&notes()));

        tokio::time::advance(Duration::from_millis(499)).await;
        settle().await;
        assert_eq!(runs.load(Ordering::SeqCst), 0);

        tokio::time::advance(Duration::from_millis(2)).await;
        settle().await;
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert!(!scheduler.is_pending(&notes()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_coalesces_into_one_run() {
        let scheduler = Arc::new(DebouncedScheduler::new());
        let runs = Arc::new(AtomicUsize::new(0));

        for _ in 0..5 {
            scheduler.trigger(notes(), Duration::from_millis(1000), counting_job(&runs));
            tokio::time::advance(Duration::from_millis(300)).await;
            settle().await;
        }
        assert_eq!(runs.load(Ordering::SeqCst), 0);

        // The last trigger was 300ms ago; nothing may fire before 1000ms
        tokio::time::advance(Duration::from_millis(699)).await;
        settle().await;
        assert_eq!(runs.load(Ordering::SeqCst), 0);

        tokio::time::advance(Duration::from_millis(2)).await;
        settle().await;
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        tokio::time::advance(Duration::from_secs(10)).await;
        settle().await;
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_prevents_run() {
        let scheduler = Arc::new(DebouncedScheduler::new());
        let runs = Arc::new(AtomicUsize::new(0));

        scheduler.trigger(notes(), Duration::from_millis(100), counting_job(&runs));
        assert!(scheduler.cancel(&notes()));
        assert!(!scheduler.cancel(&notes()));

        tokio::time::advance(Duration::from_secs(1)).await;
        settle().await;
        assert_eq!(runs.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_datasets_are_independent() {
        let scheduler = Arc::new(DebouncedScheduler::new());
        let runs = Arc::new(AtomicUsize::new(0));
        let messages = DatasetId::new("messages").unwrap();

        scheduler.trigger(notes(), Duration::from_millis(100), counting_job(&runs));
        scheduler.trigger(messages.clone(), Duration::from_millis(100), counting_job(&runs));
        assert_eq!(scheduler.pending_count(), 2);

        scheduler.cancel(&messages);
        tokio::time::advance(Duration::from_millis(150)).await;
        settle().await;
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_cancels_everything() {
        let scheduler = Arc::new(DebouncedScheduler::new());
        let runs = Arc::new(AtomicUsize::new(0));

        scheduler.trigger(notes(), Duration::from_millis(100), counting_job(&runs));
        scheduler.trigger(
            DatasetId::new("messages").unwrap(),
            Duration::from_millis(100),
            counting_job(&runs),
        );
        scheduler.shutdown();
        assert_eq!(scheduler.pending_count(), 0);

        tokio::time::advance(Duration::from_secs(1)).await;
        settle().await;
        assert_eq!(runs.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retrigger_after_fire_arms_new_timer() {
        let scheduler = Arc::new(DebouncedScheduler::new());
        let runs = Arc::new(AtomicUsize::new(0));

        scheduler.trigger(notes(), Duration::from_millis(100), counting_job(&runs));
        tokio::time::advance(Duration::from_millis(150)).await;
        settle().await;

        scheduler.trigger(notes(), Duration::from_millis(100), counting_job(&runs));
        tokio::time::advance(Duration::from_millis(150)).await;
        settle().await;
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }
}
