//! DeviceHandle - drives an AvrClient from the scheduler with lifecycle management

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::client::AvrClient;
use crate::bus::{BusEvent, SharedBus};
use crate::scheduler::{ScheduledTask, Scheduler, TickHandler};

pub const CONNECT_TASK: &str = "connect";
pub const CHECK_STATE_TASK: &str = "checkState";

/// Tick intervals for the two polling cycles
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollIntervals {
    /// Retry interval while the device has not answered the handshake
    pub connect: Duration,
    pub refresh: Duration,
}

/// Maps scheduler ticks onto client cycles
struct CycleDriver {
    client: Arc<AvrClient>,
}

#[async_trait]
impl TickHandler for CycleDriver {
    async fn on_tick(&self, name: &str) -> Result<()> {
        match name {
            CONNECT_TASK => {
                if !self.client.is_connected().await {
                    self.client.connect().await?;
                    // Publish state right away instead of waiting a refresh interval
                    self.client.check_state().await?;
                }
            }
            CHECK_STATE_TASK => {
                if self.client.is_connected().await {
                    self.client.check_state().await?;
                }
            }
            other => anyhow::bail!("unknown task {}", other),
        }
        Ok(())
    }
}

/// DeviceHandle owns the scheduler for one client and provides:
/// - Connect ticks until the first successful handshake, then state polling
/// - Stop on the cancellation token or a ShuttingDown bus event
/// - DeviceDisconnected published on exit, after any cycle still running
///   has been cut off
pub struct DeviceHandle {
    client: Arc<AvrClient>,
    bus: SharedBus,
    shutdown: CancellationToken,
    intervals: PollIntervals,
}

impl DeviceHandle {
    pub fn new(
        client: Arc<AvrClient>,
        bus: SharedBus,
        shutdown: CancellationToken,
        intervals: PollIntervals,
    ) -> Self {
        Self {
            client,
            bus,
            shutdown,
            intervals,
        }
    }

    pub async fn run(self) -> Result<()> {
        let host = self.client.session().host().to_string();
        info!("Starting device: {}", host);

        // Subscribe before starting so a ShuttingDown published meanwhile is seen
        let mut rx = self.bus.subscribe();

        let scheduler = Scheduler::new(Arc::new(CycleDriver {
            client: self.client.clone(),
        }));
        scheduler
            .start(vec![
                ScheduledTask::new(CONNECT_TASK, self.intervals.connect),
                ScheduledTask::new(CHECK_STATE_TASK, self.intervals.refresh),
            ])
            .await;
        self.bus.publish(BusEvent::SchedulerRunning(true));

        let reason = tokio::select! {
            _ = async {
                loop {
                    match rx.recv().await {
                        Ok(BusEvent::ShuttingDown { .. }) => break,
                        Ok(_) => {}
                        Err(RecvError::Lagged(n)) => debug!(skipped = n, "Device handle lagged on bus"),
                        // Bus gone; fall back to the token
                        Err(RecvError::Closed) => std::future::pending::<()>().await,
                    }
                }
            } => {
                info!("Device {} received ShuttingDown event", host);
                "shutting down"
            }

            _ = self.shutdown.cancelled() => {
                info!("Device {} cancelled via token", host);
                "cancelled"
            }
        };

        scheduler.stop().await;
        self.bus.publish(BusEvent::SchedulerRunning(false));

        if !self.client.is_connected().await {
            warn!("Device {} stopped before it ever connected", host);
        }
        self.bus.publish(BusEvent::DeviceDisconnected {
            host: host.clone(),
            reason: Some(reason.to_string()),
        });

        info!("Device {} stopped", host);
        Ok(())
    }
}
