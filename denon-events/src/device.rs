//! Device identity published once per session.

use serde::{Deserialize, Serialize};

/// Identity and capability summary of the connected receiver.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DeviceInfo {
    /// "Denon", "Marantz" or "Denon/Marantz" when the brand code is unknown
    pub manufacturer: String,

    pub model_name: String,

    /// MAC address, or a host-derived id when the device reports none
    pub serial_number: String,

    pub firmware_revision: String,

    /// Number of zones the device reports
    pub zones: u8,

    /// Communication API version, e.g. "0301"
    pub api_version: String,

    pub supports_picture_mode: bool,

    pub supports_sound_mode: bool,
}

impl DeviceInfo {
    /// Map the device brand code onto a manufacturer name
    pub fn manufacturer_for(brand_code: Option<u8>) -> &'static str {
        match brand_code {
            Some(0) => "Denon",
            Some(1) => "Marantz",
            _ => "Denon/Marantz",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manufacturer_for_brand_code() {
        assert_eq!(DeviceInfo::manufacturer_for(Some(0)), "Denon");
        assert_eq!(DeviceInfo::manufacturer_for(Some(1)), "Marantz");
        assert_eq!(DeviceInfo::manufacturer_for(Some(7)), "Denon/Marantz");
        assert_eq!(DeviceInfo::manufacturer_for(None), "Denon/Marantz");
    }
}
