//! Device session and the protocol paths it selects

use denon_events::Zone;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Command/response endpoint (picture mode, surround mode, Audyssey)
pub const APP_COMMAND_PATH: &str = "/goform/AppCommand.xml";

/// Fire-and-forget command endpoint; the command is the query string
pub const COMMAND_PATH: &str = "/goform/formiPhoneAppDirect.xml";

/// Protocol generation of the receiver's web API
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Generation {
    /// Pre-2016 models: no Deviceinfo.xml, flat input lists
    Gen0,
    #[default]
    Gen1,
    /// Models served over HTTPS with a self-signed certificate
    Gen2,
}

impl Generation {
    pub fn from_id(id: u8) -> Option<Self> {
        match id {
            0 => Some(Self::Gen0),
            1 => Some(Self::Gen1),
            2 => Some(Self::Gen2),
            _ => None,
        }
    }

    pub fn id(self) -> u8 {
        match self {
            Self::Gen0 => 0,
            Self::Gen1 => 1,
            Self::Gen2 => 2,
        }
    }

    pub fn device_info_path(self) -> &'static str {
        match self {
            Self::Gen0 => "/goform/formMainZone_MainZoneXml.xml",
            Self::Gen1 | Self::Gen2 => "/goform/Deviceinfo.xml",
        }
    }

    pub fn uses_tls(self) -> bool {
        matches!(self, Self::Gen2)
    }

    pub fn default_port(self) -> u16 {
        match self {
            Self::Gen0 => 80,
            Self::Gen1 => 8080,
            Self::Gen2 => 10443,
        }
    }
}

impl TryFrom<u8> for Generation {
    type Error = String;

    fn try_from(id: u8) -> Result<Self, Self::Error> {
        Self::from_id(id).ok_or_else(|| format!("unknown protocol generation {}", id))
    }
}

impl From<Generation> for u8 {
    fn from(generation: Generation) -> Self {
        generation.id()
    }
}

/// Status document polled for a zone
pub fn zone_status_path(zone: Zone) -> &'static str {
    match zone {
        Zone::Main | Zone::PassThrough => "/goform/formMainZone_MainZoneXmlStatusLite.xml",
        Zone::Zone2 => "/goform/formZone2_Zone2XmlStatusLite.xml",
        Zone::Zone3 => "/goform/formZone3_Zone3XmlStatusLite.xml",
        Zone::SoundMode => "/goform/formMainZone_MainZoneXmlStatus.xml",
    }
}

/// Path that delivers a command in the query string.
///
/// Only what cannot appear in a query is escaped. `/` and `:` are legal
/// query characters and the receiver matches them literally, as in
/// `SISAT/CBL` or `MSNEURAL:X`.
pub fn command_path(command: &str) -> String {
    let query = urlencoding::encode(command)
        .replace("%2F", "/")
        .replace("%3A", ":");
    format!("{}?{}", COMMAND_PATH, query)
}

/// Envelope flavor of the command/response endpoint
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AppCommandVariant {
    #[default]
    Standard,
    /// API 0300 and newer
    V0300,
}

impl AppCommandVariant {
    /// Pick the variant for a reported API version such as "0301"
    pub fn for_api_version(api_version: &str) -> Self {
        match api_version.trim().parse::<u16>() {
            Ok(v) if v >= 300 => Self::V0300,
            _ => Self::Standard,
        }
    }

    pub fn id(self) -> &'static str {
        match self {
            Self::Standard => "1",
            Self::V0300 => "3",
        }
    }

    pub fn envelope(self, verb: &str) -> String {
        format!(
            "<?xml version=\"1.0\" encoding=\"utf-8\"?><tx><cmd id='{}'>{}</cmd></tx>",
            self.id(),
            verb
        )
    }
}

/// Connection context for one controlled zone of one receiver.
///
/// Fixed at creation; the client never changes it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceSession {
    host: String,
    port: u16,
    generation: Generation,
    zone: Zone,
    timeout: Duration,
}

impl DeviceSession {
    pub fn new(host: impl Into<String>, port: u16, generation: Generation, zone: Zone) -> Self {
        Self {
            host: host.into(),
            port,
            generation,
            zone,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    pub fn zone(&self) -> Zone {
        self.zone
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn zone_status_path(&self) -> &'static str {
        zone_status_path(self.zone)
    }

    /// Store key namespaced by host and zone, so several sessions can share a store
    pub fn storage_key(&self, key: &str) -> String {
        let host: String = self
            .host
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
            .collect();
        format!("{}-{}-{}", host, self.zone, key)
    }
}
