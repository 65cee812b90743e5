//! Error types for the protocol engine

use thiserror::Error;

/// Errors raised while talking to a receiver or handling its data
#[derive(Error, Debug)]
pub enum DeviceError {
    /// HTTP request failed or timed out
    #[error("transport error: {0}")]
    Transport(String),

    /// Device answered with a non-success status
    #[error("device returned HTTP {status} for {path}")]
    Status { status: u16, path: String },

    /// Payload was not the XML we expected
    #[error("decode error: {0}")]
    Decode(String),

    /// A field the protocol requires was missing or unusable
    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("persistence error: {0}")]
    Persistence(#[from] StoreError),

    /// Intent/policy pairing the router cannot address
    #[error("routing error: {0}")]
    Routing(String),

    /// A connect or checkState cycle failed
    #[error("{cycle} failed: {source}")]
    Cycle {
        cycle: &'static str,
        #[source]
        source: Box<DeviceError>,
    },
}

impl DeviceError {
    /// Wrap a failure that happened inside a polling cycle
    pub fn cycle(cycle: &'static str, source: DeviceError) -> Self {
        Self::Cycle {
            cycle,
            source: Box::new(source),
        }
    }
}

impl From<reqwest::Error> for DeviceError {
    fn from(e: reqwest::Error) -> Self {
        Self::Transport(e.to_string())
    }
}

impl From<quick_xml::DeError> for DeviceError {
    fn from(e: quick_xml::DeError) -> Self {
        Self::Decode(e.to_string())
    }
}

/// Errors from the key-value blob store
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("failed to access {key}: {source}")]
    Io {
        key: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid JSON in {key}: {source}")]
    Json {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

pub type DeviceResult<T> = Result<T, DeviceError>;
