//! Static lookup tables for input normalization and routing
//!
//! Built once at startup and shared by reference; nothing mutates them after
//! construction.

use std::collections::HashMap;

/// Characters removed from a main-zone reference that matched an input mode.
///
/// Mode-form references are written `<mode> <value>`, e.g. `TF AN10570` or
/// `ZM FAVORITE1`, so the mode and its separator are 3 characters.
pub const INPUT_MODE_STRIP: usize = 3;

/// Device and display names that differ from the reference the protocol expects
const REFERENCE_CONVERSIONS: &[(&str, &str)] = &[
    ("CBL/SAT", "SAT/CBL"),
    ("Media Player", "MPLAY"),
    ("MEDIA PLAYER", "MPLAY"),
    ("Blu-ray", "BD"),
    ("TV Audio", "TV"),
    ("TV AUDIO", "TV"),
    ("iPod/USB", "USB/IPOD"),
    ("USB", "USB/IPOD"),
    ("Bluetooth", "BT"),
    ("Internet Radio", "IRADIO"),
    ("Online Music", "NET"),
    ("HEOS Music", "NET"),
    ("Network", "NET"),
    ("NETWORK", "NET"),
    ("Media Server", "SERVER"),
    ("AUX", "AUX1"),
    ("Tuner", "TUNER"),
    ("Phono", "PHONO"),
    ("Game", "GAME"),
    ("Spotify", "SPOTIFY"),
    ("Favorites", "FAVORITES"),
    // Surround modes as reported by GetSurroundModeStatus
    ("Stereo", "STEREO"),
    ("MULTI CH STEREO", "MCH STEREO"),
    ("Multi Ch Stereo", "MCH STEREO"),
    ("Direct", "DIRECT"),
    ("Pure Direct", "PURE DIRECT"),
    ("Auto", "AUTO"),
    ("Movie", "MOVIE"),
    ("Music", "MUSIC"),
    ("Dolby Surround", "DOLBY SURROUND"),
    ("DTS Neural:X", "NEURAL:X"),
];

/// Five-character mode prefixes, checked before the two-character ones
const INPUT_MODES_LONG: &[(&str, &str)] = &[
    ("ZM FA", "ZM"),
    ("MS QU", "MS"),
    ("MS SM", "MS"),
];

const INPUT_MODES_SHORT: &[(&str, &str)] = &[
    ("MS", "MS"),
    ("TF", "TF"),
    ("TP", "TP"),
    ("NS", "NS"),
    ("MN", "MN"),
    ("PV", "PV"),
    ("FV", "FV"),
];

#[derive(Debug, Clone)]
pub struct LookupTables {
    conversions: HashMap<String, String>,
    modes_long: HashMap<String, String>,
    modes_short: HashMap<String, String>,
}

impl LookupTables {
    /// Tables shipped with the engine
    pub fn standard() -> Self {
        let owned = |pairs: &[(&str, &str)]| {
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect::<HashMap<_, _>>()
        };
        Self {
            conversions: owned(REFERENCE_CONVERSIONS),
            modes_long: owned(INPUT_MODES_LONG),
            modes_short: owned(INPUT_MODES_SHORT),
        }
    }

    /// Add or replace conversions (from configuration)
    pub fn with_conversions(mut self, extra: impl IntoIterator<Item = (String, String)>) -> Self {
        self.conversions.extend(extra);
        self
    }

    /// Exact, case-sensitive lookup; unmapped references pass through
    pub fn convert<'a>(&'a self, reference: &'a str) -> &'a str {
        self.conversions
            .get(reference)
            .map(String::as_str)
            .unwrap_or(reference)
    }

    /// Routing prefix for a main-zone reference written in mode form
    pub fn input_mode(&self, reference: &str) -> Option<&str> {
        reference
            .get(..5)
            .and_then(|p| self.modes_long.get(p))
            .or_else(|| reference.get(..2).and_then(|p| self.modes_short.get(p)))
            .map(String::as_str)
    }
}

impl Default for LookupTables {
    fn default() -> Self {
        Self::standard()
    }
}
