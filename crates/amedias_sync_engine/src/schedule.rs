//! Cancellable timers on the tokio runtime.
//!
//! Both timers use `tokio::time`, so tests can drive them with a paused
//! clock instead of sleeping.

use parking_lot::Mutex;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};

#[derive(Debug, Default)]
struct Slot {
    generation: u64,
    handle: Option<JoinHandle<()>>,
}

/// A single-slot delayed task.
///
/// Scheduling replaces and aborts any run that has not fired yet. Once a run
/// fires it leaves the slot, so cancelling afterwards does not interrupt it,
/// and the run itself may schedule the next one.
#[derive(Debug, Default)]
pub struct ScheduledTask {
    slot: Arc<Mutex<Slot>>,
}

impl ScheduledTask {
    /// Creates an empty slot.
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `task` after `delay`, replacing any pending run.
    ///
    /// Must be called from within a tokio runtime.
    pub fn schedule<F>(&self, delay: Duration, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut slot = self.slot.lock();
        slot.generation = slot.generation.wrapping_add(1);
        let generation = slot.generation;
        let shared = Arc::clone(&self.slot);

        let handle = tokio::spawn(async move {
            time::sleep(delay).await;
            {
                let mut slot = shared.lock();
                if slot.generation != generation {
                    return;
                }
                slot.handle = None;
            }
            task.await;
        });

        if let Some(previous) = slot.handle.replace(handle) {
            previous.abort();
        }
    }

    /// Cancels the pending run. Returns whether one was pending.
    pub fn cancel(&self) -> bool {
        let mut slot = self.slot.lock();
        slot.generation = slot.generation.wrapping_add(1);
        match slot.handle.take() {
            Some(handle) => {
                handle.abort();
                true
            }
            None => false,
        }
    }

    /// Returns true if a run is waiting to fire.
    pub fn is_pending(&self) -> bool {
        self.slot
            .lock()
            .handle
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }
}

impl Drop for ScheduledTask {
    fn drop(&mut self) {
        if let Some(handle) = self.slot.lock().handle.take() {
            handle.abort();
        }
    }
}

/// A fixed-interval repeating task.
///
/// The first tick happens one full period after `start`. A slow tick delays
/// the next one instead of bunching ticks up.
#[derive(Debug, Default)]
pub struct PeriodicTask {
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl PeriodicTask {
    /// Creates a stopped task.
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts calling `tick` every `period`, replacing any running loop.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start<F, Fut>(&self, period: Duration, mut tick: F)
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(async move {
            let mut interval = time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                tick().await;
            }
        });

        if let Some(previous) = self.handle.lock().replace(handle) {
            previous.abort();
        }
    }

    /// Stops the loop. Returns whether it was running.
    pub fn stop(&self) -> bool {
        match self.handle.lock().take() {
            Some(handle) => {
                handle.abort();
                true
            }
            None => false,
        }
    }

    /// Returns true while the loop is running.
    pub fn is_running(&self) -> bool {
        self.handle
            .lock()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }
}

impl Drop for PeriodicTask {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counter() -> Arc<AtomicUsize> {
        Arc::new(AtomicUsize::new(0))
    }

    #[tokio::test(start_paused = true)]
    async fn scheduled_task_fires_after_delay() {
        let hits = counter();
        let task = ScheduledTask::new();
        let h = Arc::clone(&hits);
        task.schedule(Duration::from_millis(300), async move {
            h.fetch_add(1, Ordering::SeqCst);
        });
        assert!(task.is_pending());

        time::sleep(Duration::from_millis(299)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 0);

        time::sleep(Duration::from_millis(2)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert!(!task.is_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn scheduled_task_replaces_pending_run() {
        let hits = counter();
        let task = ScheduledTask::new();
        for _ in 0..5 {
            let h = Arc::clone(&hits);
            task.schedule(Duration::from_millis(300), async move {
                h.fetch_add(1, Ordering::SeqCst);
            });
            time::sleep(Duration::from_millis(100)).await;
        }

        time::sleep(Duration::from_secs(1)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn scheduled_task_cancel() {
        let hits = counter();
        let task = ScheduledTask::new();
        let h = Arc::clone(&hits);
        task.schedule(Duration::from_millis(100), async move {
            h.fetch_add(1, Ordering::SeqCst);
        });

        assert!(task.cancel());
        assert!(!task.cancel());
        time::sleep(Duration::from_secs(1)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn scheduled_task_can_reschedule_itself() {
        let hits = counter();
        let task = Arc::new(ScheduledTask::new());

        let h = Arc::clone(&hits);
        let t = Arc::clone(&task);
        task.schedule(Duration::from_millis(100), async move {
            h.fetch_add(1, Ordering::SeqCst);
            let h2 = Arc::clone(&h);
            t.schedule(Duration::from_millis(100), async move {
                h2.fetch_add(1, Ordering::SeqCst);
            });
        });

        time::sleep(Duration::from_millis(250)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn periodic_task_ticks_until_stopped() {
        let hits = counter();
        let task = PeriodicTask::new();
        let h = Arc::clone(&hits);
        task.start(Duration::from_millis(8000), move || {
            let h = Arc::clone(&h);
            async move {
                h.fetch_add(1, Ordering::SeqCst);
            }
        });
        assert!(task.is_running());

        time::sleep(Duration::from_millis(7999)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 0);

        time::sleep(Duration::from_millis(16_002)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 3);

        assert!(task.stop());
        time::sleep(Duration::from_secs(60)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 3);
        assert!(!task.is_running());
    }
}
