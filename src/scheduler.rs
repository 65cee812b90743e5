//! Named interval ticks
//!
//! The scheduler knows nothing about the protocol: it fires task names at a
//! [`TickHandler`]. Each task ticks immediately and then every interval, on
//! its own timer. Every tick runs in its own task, so a handler that fails,
//! panics or runs long never delays or suppresses the next tick. Those tasks
//! belong to their timer: stopping the scheduler aborts any tick still in
//! progress and waits for it to unwind.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// A named interval task
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduledTask {
    pub name: String,
    pub interval: Duration,
    pub enabled: bool,
}

impl ScheduledTask {
    pub fn new(name: impl Into<String>, interval: Duration) -> Self {
        Self {
            name: name.into(),
            interval,
            enabled: true,
        }
    }
}

/// Receives ticks by task name
#[async_trait]
pub trait TickHandler: Send + Sync + 'static {
    async fn on_tick(&self, name: &str) -> anyhow::Result<()>;
}

pub struct Scheduler {
    handler: Arc<dyn TickHandler>,
    /// Replaced on stop so a later start gets a live token
    shutdown: Mutex<CancellationToken>,
    timers: Mutex<Vec<JoinHandle<()>>>,
    running: watch::Sender<bool>,
}

impl Scheduler {
    pub fn new(handler: Arc<dyn TickHandler>) -> Self {
        let (running, _) = watch::channel(false);
        Self {
            handler,
            shutdown: Mutex::new(CancellationToken::new()),
            timers: Mutex::new(Vec::new()),
            running,
        }
    }

    /// Start one timer per enabled task.
    ///
    /// Calling start again adds another independent set of timers; tasks are
    /// not deduplicated by name.
    pub async fn start(&self, tasks: Vec<ScheduledTask>) {
        let shutdown = self.shutdown.lock().await.clone();
        let mut timers = self.timers.lock().await;

        for task in tasks.into_iter().filter(|t| t.enabled) {
            if task.interval.is_zero() {
                warn!(task = %task.name, "Skipping task with zero interval");
                continue;
            }
            debug!(task = %task.name, interval = ?task.interval, "Starting timer");
            let handler = self.handler.clone();
            let token = shutdown.clone();
            timers.push(tokio::spawn(run_timer(task, handler, token)));
        }

        self.running.send_replace(true);
        info!(timers = timers.len(), "Scheduler started");
    }

    /// Cancel every timer along with any tick still running. Once this
    /// returns no handler code runs until the next start.
    pub async fn stop(&self) {
        {
            let mut token = self.shutdown.lock().await;
            token.cancel();
            *token = CancellationToken::new();
        }

        // Each timer shuts its own ticks down before exiting
        let timers: Vec<_> = self.timers.lock().await.drain(..).collect();
        for timer in timers {
            if let Err(e) = timer.await {
                warn!("Timer task failed: {}", e);
            }
        }

        self.running.send_replace(false);
        info!("Scheduler stopped");
    }

    pub fn is_running(&self) -> bool {
        *self.running.borrow()
    }

    /// Lifecycle signal: `true` while started
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.running.subscribe()
    }
}

async fn run_timer(task: ScheduledTask, handler: Arc<dyn TickHandler>, shutdown: CancellationToken) {
    let mut ticker = interval(task.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let name: Arc<str> = Arc::from(task.name.as_str());
    let mut ticks = JoinSet::new();

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            Some(done) = ticks.join_next(), if !ticks.is_empty() => {
                if let Err(e) = done {
                    warn!(task = %name, "Tick task failed: {}", e);
                }
            }
            _ = ticker.tick() => {
                let handler = handler.clone();
                let name = name.clone();
                ticks.spawn(async move {
                    if let Err(e) = handler.on_tick(&name).await {
                        warn!(task = %name, "Tick failed: {:#}", e);
                    }
                });
            }
        }
    }

    if !ticks.is_empty() {
        debug!(task = %name, in_flight = ticks.len(), "Aborting running ticks");
    }
    ticks.shutdown().await;
    debug!(task = %name, "Timer stopped");
}
