//! Configuration management

use anyhow::{bail, Result};
use denon_events::Zone;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::control::ControlPolicies;
use crate::device::{ClientOptions, DeviceSession, Generation, PollIntervals};
use crate::inputs::{InputOptions, LookupTables, RawInput};

#[derive(Debug, Deserialize)]
pub struct Config {
    pub device: DeviceConfig,

    #[serde(default)]
    pub polling: PollingConfig,

    #[serde(default)]
    pub inputs: InputsConfig,

    #[serde(default)]
    pub control: ControlPolicies,

    /// Where persisted device data lives; defaults to the platform data dir
    #[serde(default)]
    pub storage_dir: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
pub struct DeviceConfig {
    pub host: String,
    /// Defaults to the generation's usual port
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub generation: Generation,
    #[serde(default)]
    pub zone: Zone,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_timeout_ms() -> u64 {
    10_000
}

#[derive(Debug, Deserialize)]
pub struct PollingConfig {
    #[serde(default = "default_connect_interval_secs")]
    pub connect_interval_secs: u64,
    #[serde(default = "default_refresh_interval_ms")]
    pub refresh_interval_ms: u64,
}

fn default_connect_interval_secs() -> u64 {
    15
}

fn default_refresh_interval_ms() -> u64 {
    5_000
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            connect_interval_secs: default_connect_interval_secs(),
            refresh_interval_ms: default_refresh_interval_ms(),
        }
    }
}

impl PollingConfig {
    pub fn intervals(&self) -> PollIntervals {
        PollIntervals {
            connect: Duration::from_secs(self.connect_interval_secs),
            refresh: Duration::from_millis(self.refresh_interval_ms),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct InputsConfig {
    /// Use the device's own input list instead of `static_list`
    #[serde(default = "default_true")]
    pub from_device: bool,
    #[serde(default)]
    pub static_list: Vec<RawInput>,
    #[serde(default)]
    pub shortcuts: bool,
    #[serde(default)]
    pub favorites: bool,
    #[serde(default)]
    pub quick_select: bool,
    /// Extra reference conversions, merged over the built-in table
    #[serde(default)]
    pub conversions: Vec<Conversion>,
}

/// A list rather than a map: config keys are case-folded, references are not
#[derive(Debug, Clone, Deserialize)]
pub struct Conversion {
    pub from: String,
    pub to: String,
}

fn default_true() -> bool {
    true
}

impl Default for InputsConfig {
    fn default() -> Self {
        Self {
            from_device: true,
            static_list: Vec::new(),
            shortcuts: false,
            favorites: false,
            quick_select: false,
            conversions: Vec::new(),
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        if self.device.host.trim().is_empty() {
            bail!("device.host must be set");
        }
        // A zero period would make the scheduler skip the task entirely
        if self.polling.connect_interval_secs == 0 || self.polling.refresh_interval_ms == 0 {
            bail!("polling intervals must be greater than zero");
        }
        if self.control.power > 7 || self.control.volume > 7 || self.control.mute > 7 {
            bail!("control policies must be between 0 and 7");
        }
        Ok(())
    }

    pub fn session(&self) -> DeviceSession {
        let generation = self.device.generation;
        DeviceSession::new(
            self.device.host.trim(),
            self.device.port.unwrap_or_else(|| generation.default_port()),
            generation,
            self.device.zone,
        )
        .with_timeout(Duration::from_millis(self.device.timeout_ms))
    }

    pub fn client_options(&self) -> ClientOptions {
        ClientOptions {
            device_inputs: self.inputs.from_device,
            static_inputs: self.inputs.static_list.clone(),
            input_options: InputOptions {
                shortcuts: self.inputs.shortcuts,
                favorites: self.inputs.favorites,
                quick_select: self.inputs.quick_select,
            },
            policies: self.control,
        }
    }

    pub fn tables(&self) -> LookupTables {
        LookupTables::standard().with_conversions(
            self.inputs
                .conversions
                .iter()
                .map(|c| (c.from.clone(), c.to.clone())),
        )
    }

    pub fn storage_dir(&self) -> PathBuf {
        self.storage_dir.clone().unwrap_or_else(get_data_dir)
    }
}

fn project_dirs() -> Option<directories::ProjectDirs> {
    directories::ProjectDirs::from("com", "denon-control", "denon-control")
}

pub fn get_config_dir() -> PathBuf {
    project_dirs()
        .map(|dirs| dirs.config_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("."))
}

pub fn get_data_dir() -> PathBuf {
    project_dirs()
        .map(|dirs| dirs.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("./data"))
}

pub fn load_config() -> Result<Config> {
    let config_dir = get_config_dir();

    let config = ::config::Config::builder()
        // Load from config file if it exists
        .add_source(
            ::config::File::with_name(&config_dir.join("config").to_string_lossy())
                .required(false),
        )
        // Override with environment variables (DENON__DEVICE__HOST, DENON__POLLING__REFRESH_INTERVAL_MS, etc.)
        .add_source(
            ::config::Environment::with_prefix("DENON")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    let config: Config = config.try_deserialize()?;
    config.validate()?;
    Ok(config)
}
