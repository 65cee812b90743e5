//! Wire protocol events for consumers of the AVR engine.
//!
//! `AvrEvent` is the subset of the engine's internal `BusEvent` that
//! external consumers need. The engine converts from `BusEvent` to
//! `AvrEvent` at the consumer boundary.

use crate::device::DeviceInfo;
use crate::input::InputDescriptor;
use crate::zone::{Zone, ZoneSnapshot};
use serde::{Deserialize, Serialize};

/// Events that cross the wire to consumers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "payload")]
pub enum AvrEvent {
    // =========================================================================
    // Device Lifecycle Events
    // =========================================================================
    /// Device identity, published once after the first successful connect
    DeviceInfo(DeviceInfo),

    /// The engine reached the device for the first time
    DeviceConnected {
        /// Device host
        host: String,
        /// Controlled zone
        zone: Zone,
    },

    /// The engine stopped driving the device
    DeviceDisconnected {
        /// Device host
        host: String,
        /// Reason for disconnection
        reason: Option<String>,
    },

    // =========================================================================
    // Input Events
    // =========================================================================
    /// Inputs were added, updated or removed
    InputsUpdated {
        /// Affected inputs (the full list after a connect)
        inputs: Vec<InputDescriptor>,
        /// True when the listed inputs were removed
        remove: bool,
    },

    // =========================================================================
    // State Events
    // =========================================================================
    /// At least one tracked field of the zone changed
    StateChanged(ZoneSnapshot),

    /// Decoded device document, forwarded for REST and MQTT bridges
    RawDocument {
        /// Topic name ("info" or "state")
        topic: String,
        /// Document as JSON
        document: serde_json::Value,
    },
}

impl AvrEvent {
    /// Get the event type as a string (for logging/filtering)
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::DeviceInfo(_) => "device_info",
            Self::DeviceConnected { .. } => "device_connected",
            Self::DeviceDisconnected { .. } => "device_disconnected",
            Self::InputsUpdated { .. } => "inputs_updated",
            Self::StateChanged(_) => "state_changed",
            Self::RawDocument { .. } => "raw_document",
        }
    }

    /// Check if this is a device lifecycle event
    pub fn is_device_event(&self) -> bool {
        matches!(
            self,
            Self::DeviceInfo(_) | Self::DeviceConnected { .. } | Self::DeviceDisconnected { .. }
        )
    }

    /// Check if this event should be forwarded to REST/MQTT bridges only
    pub fn is_passthrough(&self) -> bool {
        matches!(self, Self::RawDocument { .. })
    }
}
