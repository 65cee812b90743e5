//! Receiver protocol client and its lifecycle handle

pub mod client;
pub mod documents;
pub mod flight;
pub mod handle;
pub mod session;
pub mod transport;

pub use client::{AvrClient, ClientOptions, CycleOutcome};
pub use handle::{DeviceHandle, PollIntervals};
pub use session::{DeviceSession, Generation};
pub use transport::{HttpTransport, Transport};
