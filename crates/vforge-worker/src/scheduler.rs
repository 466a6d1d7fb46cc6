//! Periodic tick scheduling.
//!
//! A [`Scheduler`] drives a [`TickTask`] from a [`Clock`]. Ticks never
//! overlap: the next clock tick is awaited only after the task returns.
//! Stopping waits for a tick already in progress to finish.

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Interval, MissedTickBehavior};
use tracing::{debug, info};

/// Source of scheduler ticks.
#[async_trait]
pub trait Clock: Send + 'static {
    /// Wait for the next tick.
    async fn tick(&mut self);
}

/// Work run once per tick.
#[async_trait]
pub trait TickTask: Send + 'static {
    async fn run_tick(&mut self);
}

/// Clock on Tokio time with a fixed period. The first tick is immediate.
#[derive(Debug)]
pub struct IntervalClock {
    interval: Interval,
}

impl IntervalClock {
    pub fn new(period: Duration) -> Self {
        let mut interval = tokio::time::interval(period);
        // A tick that overran its period pushes the schedule back instead of
        // firing a burst of catch-up ticks.
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self { interval }
    }
}

#[async_trait]
impl Clock for IntervalClock {
    async fn tick(&mut self) {
        self.interval.tick().await;
    }
}

/// Clock that ticks only when its [`ManualTicker`] says so.
#[derive(Debug)]
pub struct ManualClock {
    rx: mpsc::UnboundedReceiver<()>,
}

/// Handle firing ticks on a [`ManualClock`].
#[derive(Debug, Clone)]
pub struct ManualTicker {
    tx: mpsc::UnboundedSender<()>,
}

impl ManualClock {
    pub fn new() -> (Self, ManualTicker) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { rx }, ManualTicker { tx })
    }
}

impl ManualTicker {
    /// Queue one tick.
    pub fn tick(&self) {
        let _ = self.tx.send(());
    }
}

#[async_trait]
impl Clock for ManualClock {
    async fn tick(&mut self) {
        if self.rx.recv().await.is_none() {
            // All tickers dropped: no tick will ever come.
            std::future::pending::<()>().await;
        }
    }
}

/// Entry point for starting a scheduler loop.
pub struct Scheduler;

impl Scheduler {
    /// Spawn the tick loop.
    pub fn start<C, T>(mut clock: C, mut task: T) -> SchedulerHandle<T>
    where
        C: Clock,
        T: TickTask,
    {
        let (stop_tx, mut stop_rx) = watch::channel(false);

        let join = tokio::spawn(async move {
            info!("Scheduler started");
            loop {
                tokio::select! {
                    changed = stop_rx.changed() => {
                        // Handle dropped.
                        if changed.is_err() {
                            break;
                        }
                    }
                    _ = clock.tick() => {}
                }
                if *stop_rx.borrow() {
                    break;
                }
                debug!("Scheduler tick");
                task.run_tick().await;
            }
            info!("Scheduler stopped");
            task
        });

        SchedulerHandle { stop_tx, join }
    }
}

/// Running scheduler. Dropping the handle also ends the loop after the
/// current tick.
pub struct SchedulerHandle<T> {
    stop_tx: watch::Sender<bool>,
    join: JoinHandle<T>,
}

impl<T> SchedulerHandle<T> {
    /// Stop the loop and hand back the task once any in-progress tick is done.
    ///
    /// Returns `None` if the task panicked.
    pub async fn stop(self) -> Option<T> {
        let _ = self.stop_tx.send(true);
        self.join.await.ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::oneshot;

    struct Counter {
        ticks: usize,
        done: mpsc::UnboundedSender<usize>,
    }

    #[async_trait]
    impl TickTask for Counter {
        async fn run_tick(&mut self) {
            self.ticks += 1;
            let _ = self.done.send(self.ticks);
        }
    }

    fn counter() -> (Counter, mpsc::UnboundedReceiver<usize>) {
        let (done, rx) = mpsc::unbounded_channel();
        (Counter { ticks: 0, done }, rx)
    }

    #[tokio::test]
    async fn test_manual_clock_drives_ticks() {
        let (clock, ticker) = ManualClock::new();
        let (task, mut done) = counter();
        let handle = Scheduler::start(clock, task);

        ticker.tick();
        assert_eq!(done.recv().await, Some(1));
        ticker.tick();
        ticker.tick();
        assert_eq!(done.recv().await, Some(2));
        assert_eq!(done.recv().await, Some(3));

        let task = handle.stop().await.unwrap();
        assert_eq!(task.ticks, 3);
    }

    #[tokio::test]
    async fn test_stop_without_ticks() {
        let (clock, _ticker) = ManualClock::new();
        let (task, _done) = counter();
        let handle = Scheduler::start(clock, task);
        let task = handle.stop().await.unwrap();
        assert_eq!(task.ticks, 0);
    }

    #[tokio::test]
    async fn test_stop_with_dropped_ticker() {
        let (clock, ticker) = ManualClock::new();
        drop(ticker);
        let (task, _done) = counter();
        let handle = Scheduler::start(clock, task);
        assert!(handle.stop().await.is_some());
    }

    struct Slow {
        started: Option<oneshot::Sender<()>>,
        finished: bool,
    }

    #[async_trait]
    impl TickTask for Slow {
        async fn run_tick(&mut self) {
            if let Some(started) = self.started.take() {
                let _ = started.send(());
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
            self.finished = true;
        }
    }

    #[tokio::test]
    async fn test_stop_waits_for_running_tick() {
        let (clock, ticker) = ManualClock::new();
        let (started_tx, started_rx) = oneshot::channel();
        let handle = Scheduler::start(
            clock,
            Slow {
                started: Some(started_tx),
                finished: false,
            },
        );

        ticker.tick();
        started_rx.await.unwrap();
        let task = handle.stop().await.unwrap();
        assert!(task.finished);
    }

    #[tokio::test(start_paused = true)]
    async fn test_interval_clock_ticks() {
        let (task, mut done) = counter();
        let handle = Scheduler::start(IntervalClock::new(Duration::from_secs(2)), task);

        // First tick is immediate, the next after one period.
        assert_eq!(done.recv().await, Some(1));
        assert_eq!(done.recv().await, Some(2));
        handle.stop().await.unwrap();
    }
}
