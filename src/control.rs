//! Command routing and pacing
//!
//! A control intent plus a zone-targeting policy becomes an ordered plan of
//! protocol commands, each with the pause that must follow it. Planning is
//! pure; [`run_plan`] executes a plan against any [`CommandSink`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::error::{DeviceError, DeviceResult};

/// Settling time after powering on the first of several zones
pub const POWER_ON_SETTLE: Duration = Duration::from_millis(4000);

/// Pause between any two other sequential commands
pub const COMMAND_GAP: Duration = Duration::from_millis(75);

/// Highest device volume level (+18 dB)
const MAX_VOLUME_LEVEL: f32 = 98.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VolumeStep {
    Up,
    Down,
}

/// What the caller wants done, independent of zones
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ControlVerb {
    Power(bool),
    /// Absolute master volume in dB (-80.0 ..= 18.0)
    Volume(f32),
    Mute(bool),
    VolumeSelector(VolumeStep),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CommandIntent {
    pub verb: ControlVerb,
    /// Zone-targeting policy id, 0-7
    pub policy: u8,
}

/// Configured zone-targeting policy per verb family
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlPolicies {
    #[serde(default)]
    pub power: u8,
    /// Used for absolute volume and volume steps
    #[serde(default)]
    pub volume: u8,
    #[serde(default)]
    pub mute: u8,
}

impl ControlPolicies {
    pub fn intent(&self, verb: ControlVerb) -> CommandIntent {
        let policy = match verb {
            ControlVerb::Power(_) => self.power,
            ControlVerb::Volume(_) | ControlVerb::VolumeSelector(_) => self.volume,
            ControlVerb::Mute(_) => self.mute,
        };
        CommandIntent { verb, policy }
    }
}

/// A zone the router can address
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Target {
    Main,
    Zone2,
    Zone3,
    /// Whole-system power
    System,
}

impl Target {
    fn power_prefix(self) -> &'static str {
        match self {
            Self::Main => "ZM",
            Self::Zone2 => "Z2",
            Self::Zone3 => "Z3",
            Self::System => "PW",
        }
    }

    fn volume_prefix(self) -> Option<&'static str> {
        match self {
            Self::Main => Some("MV"),
            Self::Zone2 => Some("Z2"),
            Self::Zone3 => Some("Z3"),
            Self::System => None,
        }
    }

    fn mute_prefix(self) -> Option<String> {
        match self {
            // MU already addresses the main zone
            Self::Main => Some("MU".to_string()),
            Self::Zone2 | Self::Zone3 => Some(format!("{}MU", self.power_prefix())),
            Self::System => None,
        }
    }
}

fn targets(policy: u8) -> Option<&'static [Target]> {
    use Target::*;
    let targets: &'static [Target] = match policy {
        0 => &[Main],
        1 => &[Zone2],
        2 => &[Zone3],
        3 => &[Zone2, Zone3],
        4 => &[Main, Zone2],
        5 => &[Main, Zone3],
        6 => &[Main, Zone2, Zone3],
        7 => &[System],
        _ => return None,
    };
    Some(targets)
}

/// One command and the pause that must follow it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PacedCommand {
    pub command: String,
    pub delay_after: Duration,
}

/// Device level for an absolute volume, e.g. -40.0 dB -> "40", -40.5 dB -> "395"
pub fn volume_level(db: f32) -> String {
    let level = ((db + 80.0) * 2.0).round() / 2.0;
    let level = level.clamp(0.0, MAX_VOLUME_LEVEL);
    let whole = level.trunc() as u32;
    if level.fract() > 0.0 {
        format!("{:02}5", whole)
    } else {
        format!("{:02}", whole)
    }
}

fn command_for(target: Target, verb: ControlVerb) -> Option<String> {
    match verb {
        ControlVerb::Power(on) => {
            let value = match (target, on) {
                (_, true) => "ON",
                (Target::System, false) => "STANDBY",
                (_, false) => "OFF",
            };
            Some(format!("{}{}", target.power_prefix(), value))
        }
        ControlVerb::Volume(db) => target
            .volume_prefix()
            .map(|p| format!("{}{}", p, volume_level(db))),
        ControlVerb::VolumeSelector(step) => target.volume_prefix().map(|p| {
            let value = match step {
                VolumeStep::Up => "UP",
                VolumeStep::Down => "DOWN",
            };
            format!("{}{}", p, value)
        }),
        ControlVerb::Mute(on) => target
            .mute_prefix()
            .map(|p| format!("{}{}", p, if on { "ON" } else { "OFF" })),
    }
}

/// Resolve an intent into an ordered, paced command plan
pub fn plan(intent: CommandIntent) -> DeviceResult<Vec<PacedCommand>> {
    let targets = targets(intent.policy).ok_or_else(|| {
        DeviceError::Routing(format!("unknown zone policy {}", intent.policy))
    })?;

    let commands = targets
        .iter()
        .map(|&t| command_for(t, intent.verb))
        .collect::<Option<Vec<_>>>()
        .ok_or_else(|| {
            DeviceError::Routing(format!(
                "{:?} cannot be sent with zone policy {}",
                intent.verb, intent.policy
            ))
        })?;

    let settle = matches!(intent.verb, ControlVerb::Power(true)) && commands.len() > 1;
    let last = commands.len() - 1;

    Ok(commands
        .into_iter()
        .enumerate()
        .map(|(i, command)| {
            let delay_after = if i == last {
                Duration::ZERO
            } else if i == 0 && settle {
                POWER_ON_SETTLE
            } else {
                COMMAND_GAP
            };
            PacedCommand {
                command,
                delay_after,
            }
        })
        .collect())
}

/// Anything that can write a literal command to the device
#[async_trait]
pub trait CommandSink: Send + Sync {
    async fn send(&self, command: &str) -> DeviceResult<()>;
}

/// Send a plan strictly in order, pausing between commands.
///
/// Stops at the first failed send; nothing is retried.
pub async fn run_plan<S: CommandSink + ?Sized>(sink: &S, plan: &[PacedCommand]) -> DeviceResult<()> {
    for step in plan {
        sink.send(&step.command).await?;
        if !step.delay_after.is_zero() {
            debug!(command = %step.command, delay = ?step.delay_after, "Pausing after command");
            tokio::time::sleep(step.delay_after).await;
        }
    }
    Ok(())
}
