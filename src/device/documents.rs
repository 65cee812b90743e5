//! XML documents served by the receiver
//!
//! Every field is optional: firmware versions omit elements freely, and a
//! missing element must degrade to a default rather than fail the decode.
//! The same structs serialize to JSON for raw-document forwarding.

use denon_events::{DeviceInfo, VolumeDisplay, Zone, VOLUME_UNKNOWN_DB};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::DeviceResult;
use crate::inputs::{flat_inputs, InputSources, RawInput, RawShortcut};

/// Volume readings below this are reported as the unknown/minimum sentinel
const VOLUME_FLOOR_DB: f32 = -79.5;

pub fn decode<T: DeserializeOwned>(xml: &str) -> DeviceResult<T> {
    Ok(quick_xml::de::from_str(xml)?)
}

fn text(field: &Option<String>) -> Option<&str> {
    field.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

fn flag(control: &Option<String>) -> bool {
    text(control) == Some("1")
}

/// `<Element><value>..</value></Element>`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValueField {
    #[serde(default)]
    pub value: Option<String>,
}

impl ValueField {
    pub fn text(&self) -> Option<&str> {
        text(&self.value)
    }
}

/// `<Element><value>a</value><value>b</value>..</Element>`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValueList {
    #[serde(rename = "value", default)]
    pub values: Vec<String>,
}

fn field_text(field: &Option<ValueField>) -> Option<&str> {
    field.as_ref().and_then(ValueField::text)
}

fn list_values(list: &Option<ValueList>) -> &[String] {
    list.as_ref().map(|l| l.values.as_slice()).unwrap_or(&[])
}

/// Host-derived identifier for devices that report no MAC address
pub fn synthetic_serial(host: &str) -> String {
    let id: String = host
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .collect::<String>()
        .to_uppercase();
    format!("AVR{}", id)
}

// =============================================================================
// Deviceinfo.xml (generation 1 and 2)
// =============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DeviceInfoDocument {
    #[serde(default)]
    pub comm_api_vers: Option<String>,
    #[serde(default)]
    pub brand_code: Option<String>,
    #[serde(default)]
    pub model_name: Option<String>,
    #[serde(default)]
    pub mac_address: Option<String>,
    #[serde(default)]
    pub upgrade_version: Option<String>,
    #[serde(default)]
    pub device_zones: Option<String>,
    #[serde(default)]
    pub device_capabilities: Option<DeviceCapabilities>,
    #[serde(rename = "DeviceZoneCapabilities", default)]
    pub zone_capabilities: Vec<ZoneCapabilities>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DeviceCapabilities {
    #[serde(default)]
    pub setup: Option<SetupCapabilities>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SetupCapabilities {
    #[serde(default)]
    pub picture_mode: Option<ControlFlag>,
    #[serde(default)]
    pub sound_mode: Option<ControlFlag>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ControlFlag {
    #[serde(default)]
    pub control: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ZoneCapabilities {
    #[serde(default)]
    pub shortcut_control: Option<ShortcutControl>,
    #[serde(default)]
    pub operation: Option<ZoneOperation>,
    #[serde(default)]
    pub input_source: Option<InputSourceCapability>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ShortcutControl {
    #[serde(default)]
    pub control: Option<String>,
    #[serde(default)]
    pub entry_list: Option<ShortcutList>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ShortcutList {
    #[serde(rename = "Shortcut", default)]
    pub shortcuts: Vec<ShortcutEntry>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ShortcutEntry {
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub disp_name: Option<String>,
    #[serde(default)]
    pub func_name: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ZoneOperation {
    #[serde(default)]
    pub favorites: Option<FavoritesCapability>,
    #[serde(default)]
    pub quick_select: Option<QuickSelectCapability>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct FavoritesCapability {
    #[serde(default)]
    pub control: Option<String>,
    #[serde(default)]
    pub entry_list: Option<FavoriteList>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FavoriteList {
    #[serde(rename = "Favorite", default)]
    pub favorites: Vec<FavoriteEntry>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct FavoriteEntry {
    #[serde(default)]
    pub disp_name: Option<String>,
    #[serde(default)]
    pub func_name: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct QuickSelectCapability {
    #[serde(default)]
    pub control: Option<String>,
    #[serde(default)]
    pub max_quick_select: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct InputSourceCapability {
    #[serde(default)]
    pub control: Option<String>,
    #[serde(default)]
    pub list: Option<SourceList>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourceList {
    #[serde(rename = "Source", default)]
    pub sources: Vec<SourceEntry>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SourceEntry {
    #[serde(default)]
    pub func_name: Option<String>,
    #[serde(default)]
    pub default_name: Option<String>,
}

/// Position of a zone's entry in the capability list
pub fn capability_index(zone: Zone) -> Option<usize> {
    match zone {
        Zone::Main => Some(0),
        Zone::Zone2 => Some(1),
        Zone::Zone3 => Some(2),
        Zone::SoundMode | Zone::PassThrough => None,
    }
}

impl DeviceInfoDocument {
    pub fn device_info(&self, host: &str) -> DeviceInfo {
        let brand = text(&self.brand_code).and_then(|c| c.parse::<u8>().ok());
        let setup = self
            .device_capabilities
            .as_ref()
            .and_then(|c| c.setup.as_ref());

        DeviceInfo {
            manufacturer: DeviceInfo::manufacturer_for(brand).to_string(),
            model_name: text(&self.model_name)
                .map(|m| m.trim_start_matches('*').to_string())
                .unwrap_or_default(),
            serial_number: text(&self.mac_address)
                .map(str::to_string)
                .unwrap_or_else(|| synthetic_serial(host)),
            firmware_revision: text(&self.upgrade_version).unwrap_or_default().to_string(),
            zones: text(&self.device_zones)
                .and_then(|z| z.parse().ok())
                .unwrap_or(1),
            api_version: text(&self.comm_api_vers).unwrap_or_default().to_string(),
            supports_picture_mode: setup
                .and_then(|s| s.picture_mode.as_ref())
                .is_some_and(|f| flag(&f.control)),
            supports_sound_mode: setup
                .and_then(|s| s.sound_mode.as_ref())
                .is_some_and(|f| flag(&f.control)),
        }
    }

    pub fn zone_capabilities(&self, zone: Zone) -> Option<&ZoneCapabilities> {
        capability_index(zone).and_then(|i| self.zone_capabilities.get(i))
    }
}

impl ZoneCapabilities {
    /// Raw sources a zone offers; optional lists are `None` when unsupported
    pub fn input_sources(&self) -> InputSources {
        let base = self
            .input_source
            .as_ref()
            .filter(|s| flag(&s.control))
            .and_then(|s| s.list.as_ref())
            .map(|list| {
                list.sources
                    .iter()
                    .map(|s| {
                        RawInput::new(
                            text(&s.default_name).unwrap_or_default(),
                            text(&s.func_name).unwrap_or_default(),
                        )
                    })
                    .collect()
            })
            .unwrap_or_default();

        let shortcuts = self
            .shortcut_control
            .as_ref()
            .filter(|s| flag(&s.control))
            .map(|s| {
                s.entry_list
                    .iter()
                    .flat_map(|l| l.shortcuts.iter())
                    .map(|e| RawShortcut {
                        category: text(&e.category).unwrap_or_default().to_string(),
                        name: text(&e.disp_name).unwrap_or_default().to_string(),
                        reference: text(&e.func_name).unwrap_or_default().to_string(),
                    })
                    .collect()
            });

        let operation = self.operation.as_ref();

        let favorites = operation
            .and_then(|o| o.favorites.as_ref())
            .filter(|f| flag(&f.control))
            .map(|f| {
                f.entry_list
                    .iter()
                    .flat_map(|l| l.favorites.iter())
                    .map(|e| {
                        RawInput::new(
                            text(&e.disp_name).unwrap_or_default(),
                            text(&e.func_name).unwrap_or_default(),
                        )
                    })
                    .collect()
            });

        let quick_select = operation
            .and_then(|o| o.quick_select.as_ref())
            .filter(|q| flag(&q.control))
            .and_then(|q| text(&q.max_quick_select))
            .and_then(|n| n.parse().ok());

        InputSources {
            base,
            shortcuts,
            favorites,
            quick_select,
        }
    }
}

// =============================================================================
// formMainZone_MainZoneXml.xml (generation 0)
// =============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct MainZoneDocument {
    #[serde(default)]
    pub friendly_name: Option<ValueField>,
    #[serde(default)]
    pub brand_id: Option<ValueField>,
    #[serde(default)]
    pub input_func_list: Option<ValueList>,
    #[serde(default)]
    pub rename_source: Option<ValueList>,
    #[serde(default)]
    pub source_delete: Option<ValueList>,
}

impl MainZoneDocument {
    pub fn device_info(&self, host: &str) -> DeviceInfo {
        let brand = match field_text(&self.brand_id) {
            Some("DENON_MODEL") => Some(0),
            Some("MARANTZ_MODEL") => Some(1),
            _ => None,
        };

        DeviceInfo {
            manufacturer: DeviceInfo::manufacturer_for(brand).to_string(),
            model_name: field_text(&self.friendly_name)
                .map(|m| m.trim_start_matches('*').to_string())
                .unwrap_or_default(),
            serial_number: synthetic_serial(host),
            zones: 1,
            ..Default::default()
        }
    }

    pub fn base_inputs(&self) -> Vec<RawInput> {
        flat_inputs(
            list_values(&self.input_func_list),
            list_values(&self.rename_source),
            list_values(&self.source_delete),
        )
    }
}

// =============================================================================
// Zone status documents
// =============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ZoneStatusDocument {
    #[serde(default)]
    pub power: Option<ValueField>,
    #[serde(default)]
    pub input_func_select: Option<ValueField>,
    #[serde(default)]
    pub volume_display: Option<ValueField>,
    #[serde(default)]
    pub master_volume: Option<ValueField>,
    #[serde(default)]
    pub mute: Option<ValueField>,
}

impl ZoneStatusDocument {
    pub fn power(&self) -> bool {
        field_text(&self.power) == Some("ON")
    }

    pub fn input(&self) -> &str {
        field_text(&self.input_func_select).unwrap_or_default()
    }

    /// Master volume in dB; "--" and anything at the floor map to the sentinel
    pub fn volume_db(&self) -> f32 {
        match field_text(&self.master_volume).and_then(|v| v.parse::<f32>().ok()) {
            Some(db) if db >= VOLUME_FLOOR_DB => db,
            _ => VOLUME_UNKNOWN_DB,
        }
    }

    pub fn volume_display(&self) -> VolumeDisplay {
        field_text(&self.volume_display)
            .map(VolumeDisplay::from)
            .unwrap_or_default()
    }

    pub fn muted(&self) -> bool {
        field_text(&self.mute).is_some_and(|m| m.eq_ignore_ascii_case("on"))
    }
}

// =============================================================================
// AppCommand.xml reply
// =============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppCommandReply {
    #[serde(default)]
    pub cmd: Option<ReplyCommand>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReplyCommand {
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub surround: Option<String>,
    #[serde(default)]
    pub mode: Option<String>,
}

impl AppCommandReply {
    /// First non-empty of value, surround, mode
    pub fn value(&self) -> Option<&str> {
        let cmd = self.cmd.as_ref()?;
        text(&cmd.value)
            .or_else(|| text(&cmd.surround))
            .or_else(|| text(&cmd.mode))
    }
}
