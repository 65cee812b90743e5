//! Event bus between the protocol engine and its consumers
//!
//! A thin wrapper over `tokio::sync::broadcast`. Publishing never blocks and
//! never fails: with no subscribers the event is simply dropped.

use denon_events::{AvrEvent, DeviceInfo, InputDescriptor, Zone, ZoneSnapshot};
use std::sync::Arc;
use tokio::sync::broadcast;

/// Broadcast capacity; slow subscribers lag instead of blocking producers
const BUS_CAPACITY: usize = 256;

/// Internal bus events
#[derive(Debug, Clone)]
pub enum BusEvent {
    DeviceInfo(DeviceInfo),
    DeviceConnected { host: String, zone: Zone },
    DeviceDisconnected { host: String, reason: Option<String> },
    InputsUpdated { inputs: Vec<InputDescriptor>, remove: bool },
    StateChanged(ZoneSnapshot),
    /// Raw decoded document for the REST/MQTT bridges
    RawDocument { topic: String, document: serde_json::Value },
    /// Scheduler lifecycle
    SchedulerRunning(bool),
    /// Process is going down; handles stop their device
    ShuttingDown { reason: Option<String> },
}

impl BusEvent {
    /// Convert to the wire event consumers see, if this event crosses the boundary
    pub fn to_wire(&self) -> Option<AvrEvent> {
        match self {
            Self::DeviceInfo(info) => Some(AvrEvent::DeviceInfo(info.clone())),
            Self::DeviceConnected { host, zone } => Some(AvrEvent::DeviceConnected {
                host: host.clone(),
                zone: *zone,
            }),
            Self::DeviceDisconnected { host, reason } => Some(AvrEvent::DeviceDisconnected {
                host: host.clone(),
                reason: reason.clone(),
            }),
            Self::InputsUpdated { inputs, remove } => Some(AvrEvent::InputsUpdated {
                inputs: inputs.clone(),
                remove: *remove,
            }),
            Self::StateChanged(snapshot) => Some(AvrEvent::StateChanged(snapshot.clone())),
            Self::RawDocument { topic, document } => Some(AvrEvent::RawDocument {
                topic: topic.clone(),
                document: document.clone(),
            }),
            Self::SchedulerRunning(_) | Self::ShuttingDown { .. } => None,
        }
    }
}

pub struct EventBus {
    tx: broadcast::Sender<BusEvent>,
}

impl EventBus {
    pub fn publish(&self, event: BusEvent) {
        // Err only means nobody is listening
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BusEvent> {
        self.tx.subscribe()
    }
}

pub type SharedBus = Arc<EventBus>;

pub fn create_bus() -> SharedBus {
    let (tx, _) = broadcast::channel(BUS_CAPACITY);
    Arc::new(EventBus { tx })
}
