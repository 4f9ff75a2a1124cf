use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::info;

use crate::scheduler::Scheduler;

/// Background loop that ticks a [`Scheduler`] on a fixed interval.
pub struct SchedulerEngine {
    scheduler: Arc<Scheduler>,
    interval: Duration,
}

/// Running engine. [`EngineHandle::stop`] ends the loop and waits for it;
/// dropping the handle ends it too, without waiting.
pub struct EngineHandle {
    shutdown_tx: watch::Sender<bool>,
    join: JoinHandle<()>,
}

impl SchedulerEngine {
    pub fn new(scheduler: Arc<Scheduler>, interval: Duration) -> Self {
        Self {
            scheduler,
            interval,
        }
    }

    /// Tick immediately, then every `interval` until `shutdown` broadcasts
    /// `true` or its sender is dropped. A tick in progress finishes before
    /// the loop exits.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(interval_secs = self.interval.as_secs(), "scheduler engine started");

        let mut interval = tokio::time::interval(self.interval);
        // A tick that overruns the period should not trigger a burst afterwards.
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.scheduler.tick().await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        info!("shutdown sender dropped; scheduler engine exiting");
                        break;
                    }
                    if *shutdown.borrow() {
                        info!("scheduler engine shutting down");
                        break;
                    }
                }
            }
        }
    }

    /// Run on the current tokio runtime.
    pub fn spawn(self) -> EngineHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let join = tokio::spawn(self.run(shutdown_rx));
        EngineHandle { shutdown_tx, join }
    }
}

impl EngineHandle {
    /// Signal the loop and wait for it to exit. No tick starts afterwards.
    pub async fn stop(self) {
        let _ = self.shutdown_tx.send(true);
        let _ = self.join.await;
    }
}
