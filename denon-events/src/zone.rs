//! Zone identifiers and polled zone state.
//!
//! A receiver exposes several independently controllable outputs. The
//! engine controls exactly one of them per session, and publishes the
//! polled state of that zone as a [`ZoneSnapshot`].

use serde::{Deserialize, Serialize};

/// Volume reported when the device gives no usable level.
///
/// Anything below -79.5 dB (including the device's `--` marker) is folded
/// onto this value.
pub const VOLUME_UNKNOWN_DB: f32 = -80.0;

/// A controllable zone on the receiver.
///
/// Serialized as its numeric id (0 = main ... 4 = passthrough), which is
/// also how it appears in configuration.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(try_from = "u8", into = "u8")]
pub enum Zone {
    #[default]
    Main,
    Zone2,
    Zone3,
    /// Virtual zone that selects surround modes on the main zone
    SoundMode,
    /// Main zone driven in pass-through mode
    PassThrough,
}

impl Zone {
    /// All zones, in id order
    pub const ALL: [Zone; 5] = [
        Zone::Main,
        Zone::Zone2,
        Zone::Zone3,
        Zone::SoundMode,
        Zone::PassThrough,
    ];

    pub fn id(self) -> u8 {
        match self {
            Self::Main => 0,
            Self::Zone2 => 1,
            Self::Zone3 => 2,
            Self::SoundMode => 3,
            Self::PassThrough => 4,
        }
    }

    pub fn from_id(id: u8) -> Option<Self> {
        match id {
            0 => Some(Self::Main),
            1 => Some(Self::Zone2),
            2 => Some(Self::Zone3),
            3 => Some(Self::SoundMode),
            4 => Some(Self::PassThrough),
            _ => None,
        }
    }

    /// Whether this zone maps onto a physical zone of the device (0-2).
    ///
    /// Only physical zones carry zone capability data and forward raw
    /// documents to bridges.
    pub fn is_physical(self) -> bool {
        matches!(self, Self::Main | Self::Zone2 | Self::Zone3)
    }
}

impl TryFrom<u8> for Zone {
    type Error = String;

    fn try_from(id: u8) -> Result<Self, Self::Error> {
        Self::from_id(id).ok_or_else(|| format!("unknown zone id {}", id))
    }
}

impl From<Zone> for u8 {
    fn from(zone: Zone) -> Self {
        zone.id()
    }
}

impl std::fmt::Display for Zone {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Main => write!(f, "main"),
            Self::Zone2 => write!(f, "zone2"),
            Self::Zone3 => write!(f, "zone3"),
            Self::SoundMode => write!(f, "soundmode"),
            Self::PassThrough => write!(f, "passthrough"),
        }
    }
}

/// How the device displays its master volume
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum VolumeDisplay {
    /// 0..98 scale
    Absolute,
    /// dB relative to reference level
    Relative,
    #[default]
    Unknown,
}

impl From<&str> for VolumeDisplay {
    fn from(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "absolute" => Self::Absolute,
            "relative" => Self::Relative,
            _ => Self::Unknown,
        }
    }
}

/// Video picture mode, as reported by `GetPictureMode`
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PictureMode {
    Off,
    Standard,
    Movie,
    Vivid,
    Streaming,
    Custom,
    IsfDay,
    IsfNight,
}

impl PictureMode {
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::Off),
            1 => Some(Self::Standard),
            2 => Some(Self::Movie),
            3 => Some(Self::Vivid),
            4 => Some(Self::Streaming),
            5 => Some(Self::Custom),
            6 => Some(Self::IsfDay),
            7 => Some(Self::IsfNight),
            _ => None,
        }
    }
}

/// Complete tracked state of the controlled zone at one poll instant.
///
/// Snapshots are replaced wholesale after each poll, never patched.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ZoneSnapshot {
    pub power: bool,

    /// Selected input, or the surround mode when controlling the sound mode zone
    pub reference: String,

    /// Master volume in dB ([`VOLUME_UNKNOWN_DB`] when unknown)
    pub volume_db: f32,

    pub volume_display: VolumeDisplay,

    pub muted: bool,

    /// Only polled for the main zone when the device supports it
    pub picture_mode: Option<PictureMode>,

    pub sound_mode: String,

    pub audyssey_mode: String,
}

impl Default for ZoneSnapshot {
    fn default() -> Self {
        Self {
            power: false,
            reference: String::new(),
            volume_db: VOLUME_UNKNOWN_DB,
            volume_display: VolumeDisplay::Unknown,
            muted: false,
            picture_mode: None,
            sound_mode: String::new(),
            audyssey_mode: String::new(),
        }
    }
}
