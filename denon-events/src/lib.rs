//! Shared event and state types for the AVR control engine.
//!
//! This crate defines the types that cross the boundary between the
//! protocol engine (the producer) and whatever consumes its events:
//! accessory builders, REST or MQTT bridges, dashboards.
//!
//! # Modules
//! - [`zone`] - Zone identifiers and the polled zone snapshot
//! - [`device`] - Device identity and capability summary
//! - [`input`] - Zone-routable input descriptors
//! - [`events`] - Wire protocol events (AvrEvent)

pub mod device;
pub mod events;
pub mod input;
pub mod zone;

// Re-export commonly used types at crate root
pub use device::DeviceInfo;
pub use events::AvrEvent;
pub use input::InputDescriptor;
pub use zone::{PictureMode, VolumeDisplay, Zone, ZoneSnapshot, VOLUME_UNKNOWN_DB};
