//! Task scheduler with explicit start/stop and teardown
//!
//! Every task the application spawns goes through here. `stop()` flips the
//! lifecycle flag and aborts every task, so no job body starts afterwards.

use parking_lot::Mutex;
use std::future::Future;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info};

/// When the first tick of a repeating job fires
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FirstTick {
    /// Run right away, then every period
    Immediate,
    /// Wait one full period before the first run
    Delayed,
}

pub struct Scheduler {
    shutdown: watch::Sender<bool>,
    tasks: Mutex<Vec<(&'static str, JoinHandle<()>)>>,
}

impl Scheduler {
    pub fn new() -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            shutdown,
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Run `job` every `period` until the scheduler stops.
    ///
    /// A job never overlaps with itself: the next tick is awaited only after
    /// the previous run finished.
    pub fn every<F, Fut>(&self, name: &'static str, period: Duration, first: FirstTick, mut job: F)
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut shutdown = self.shutdown.subscribe();

        let handle = tokio::spawn(async move {
            let mut ticker = match first {
                FirstTick::Immediate => interval(period),
                FirstTick::Delayed => interval_at(Instant::now() + period, period),
            };
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                if *shutdown.borrow() {
                    break;
                }
                tokio::select! {
                    biased;
                    _ = shutdown.changed() => break,
                    _ = ticker.tick() => {}
                }
                if *shutdown.borrow() {
                    break;
                }
                tokio::select! {
                    biased;
                    _ = shutdown.changed() => break,
                    _ = job() => {}
                }
            }
            debug!(target: "SCHEDULER", "Job {} finished", name);
        });

        self.track(name, handle);
    }

    /// Spawn a one-shot task that is cancelled on stop
    pub fn spawn<Fut>(&self, name: &'static str, fut: Fut)
    where
        Fut: Future<Output = ()> + Send + 'static,
    {
        if self.is_stopped() {
            debug!(target: "SCHEDULER", "Refusing to spawn {} after stop", name);
            return;
        }

        let mut shutdown = self.shutdown.subscribe();
        let handle = tokio::spawn(async move {
            tokio::select! {
                biased;
                _ = shutdown.changed() => {}
                _ = fut => {}
            }
        });

        self.track(name, handle);
    }

    /// Stop every task. Idempotent.
    pub fn stop(&self) {
        self.shutdown.send_replace(true);

        let tasks: Vec<_> = self.tasks.lock().drain(..).collect();
        for (name, handle) in &tasks {
            handle.abort();
            debug!(target: "SCHEDULER", "Cancelled {}", name);
        }
        info!(target: "SCHEDULER", "Scheduler stopped ({} tasks cancelled)", tasks.len());
    }

    pub fn is_stopped(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Number of tasks still alive
    pub fn active_tasks(&self) -> usize {
        let mut tasks = self.tasks.lock();
        tasks.retain(|(_, handle)| !handle.is_finished());
        tasks.len()
    }

    fn track(&self, name: &'static str, handle: JoinHandle<()>) {
        let mut tasks = self.tasks.lock();
        tasks.retain(|(_, h)| !h.is_finished());
        if self.is_stopped() {
            // stop() raced with this spawn
            handle.abort();
            return;
        }
        tasks.push((name, handle));
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.shutdown.send_replace(true);
        for (_, handle) in self.tasks.get_mut().drain(..) {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn counting_job(counter: &Arc<AtomicUsize>) -> impl FnMut() -> std::future::Ready<()> {
        let counter = Arc::clone(counter);
        move || {
            counter.fetch_add(1, Ordering::SeqCst);
            std::future::ready(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_delayed_job_waits_one_period() {
        let scheduler = Scheduler::new();
        let runs = Arc::new(AtomicUsize::new(0));
        scheduler.every("tick", Duration::from_secs(4), FirstTick::Delayed, counting_job(&runs));

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_immediate_job_runs_at_start() {
        let scheduler = Scheduler::new();
        let runs = Arc::new(AtomicUsize::new(0));
        scheduler.every("poll", Duration::from_secs(30), FirstTick::Immediate, counting_job(&runs));

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_run_after_stop() {
        let scheduler = Scheduler::new();
        let runs = Arc::new(AtomicUsize::new(0));
        scheduler.every("tick", Duration::from_secs(4), FirstTick::Delayed, counting_job(&runs));

        tokio::time::sleep(Duration::from_secs(9)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 2);

        scheduler.stop();
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 2);
        assert!(scheduler.is_stopped());
        assert_eq!(scheduler.active_tasks(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_spawn_after_stop_is_ignored() {
        let scheduler = Scheduler::new();
        scheduler.stop();

        let runs = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&runs);
        scheduler.spawn("late", async move {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 0);
    }
}
