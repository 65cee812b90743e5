//! Denon/Marantz AVR control engine
//!
//! Speaks the receivers' HTTP/XML control protocol, keeps a normalized view
//! of one zone, and publishes changes on an event bus.
//!
//! This library provides:
//! - Connection handshake and capability discovery for all protocol generations
//! - Interval polling with change detection
//! - Input list reconciliation (device inputs, shortcuts, favorites, quick select)
//! - Zone-aware command routing with inter-command pacing

// =============================================================================
// Lints - Enforce code quality and consistency
// =============================================================================

#![deny(unsafe_code)]
#![deny(unused_must_use)]

pub mod bus;
pub mod config;
pub mod control;
pub mod device;
pub mod differ;
pub mod error;
pub mod inputs;
pub mod scheduler;
pub mod store;

pub use error::{DeviceError, DeviceResult};
