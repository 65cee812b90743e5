//! Input list reconciliation
//!
//! Turns whatever the device (or configuration) offers as selectable sources
//! into one deduplicated, zone-routable list. Everything here is pure; the
//! client persists and publishes the result.

pub mod tables;

use denon_events::{InputDescriptor, Zone};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

pub use tables::{LookupTables, INPUT_MODE_STRIP};

/// Shortcut category the device uses for plain input switches
pub const SHORTCUT_INPUTS_CATEGORY: &str = "4";

/// A source as offered by the device or configuration, before normalization
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawInput {
    pub name: String,
    pub reference: String,
    #[serde(default = "default_visible")]
    pub visible: bool,
}

fn default_visible() -> bool {
    true
}

impl RawInput {
    pub fn new(name: impl Into<String>, reference: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            reference: reference.into(),
            visible: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawShortcut {
    pub category: String,
    pub name: String,
    pub reference: String,
}

/// Everything the reconciler can draw from.
///
/// `None` on an optional source means the device does not support it.
#[derive(Debug, Clone, Default)]
pub struct InputSources {
    pub base: Vec<RawInput>,
    pub shortcuts: Option<Vec<RawShortcut>>,
    pub favorites: Option<Vec<RawInput>>,
    /// Number of quick/smart select slots
    pub quick_select: Option<u8>,
}

/// Which optional sources the user wants merged in
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputOptions {
    #[serde(default)]
    pub shortcuts: bool,
    #[serde(default)]
    pub favorites: bool,
    #[serde(default)]
    pub quick_select: bool,
}

/// Per-reference user overrides, persisted separately from the list
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InputOverrides {
    pub names: HashMap<String, String>,
    pub visibility: HashMap<String, bool>,
}

/// Routing prefix used for plain input switches in a zone
pub fn default_prefix(zone: Zone) -> &'static str {
    match zone {
        Zone::Main | Zone::PassThrough => "SI",
        Zone::Zone2 => "Z2",
        Zone::Zone3 => "Z3",
        Zone::SoundMode => "MS",
    }
}

/// The single entry a zone falls back to when nothing else is available
pub fn fallback_input(zone: Zone) -> InputDescriptor {
    let (name, reference) = match zone {
        Zone::SoundMode => ("STEREO", "STEREO"),
        _ => ("CBL/SAT", "SAT/CBL"),
    };
    InputDescriptor {
        identifier: 1,
        name: name.to_string(),
        reference: reference.to_string(),
        routing_prefix: default_prefix(zone).to_string(),
        visible: true,
    }
}

/// Reference of quick select slot `n`; the main zone addresses it through
/// the sound mode command family.
pub fn quick_select_reference(zone: Zone, slot: u8) -> String {
    match zone {
        Zone::Main => format!("MS QUICK{}", slot),
        _ => format!("QUICK{}", slot),
    }
}

/// Build the base list of a first-generation device from its parallel
/// function/rename/delete lists.
///
/// Names come from the rename list by position, falling back to `Input {n}`.
/// Sources the device marks `DEL` are kept but hidden.
pub fn flat_inputs(functions: &[String], renames: &[String], deletes: &[String]) -> Vec<RawInput> {
    functions
        .iter()
        .enumerate()
        .map(|(i, function)| {
            let name = renames
                .get(i)
                .map(|n| n.trim())
                .filter(|n| !n.is_empty())
                .map(str::to_string)
                .unwrap_or_else(|| format!("Input {}", i + 1));
            let visible = deletes.get(i).map(|d| d.trim() != "DEL").unwrap_or(true);
            RawInput {
                name,
                reference: function.trim().to_string(),
                visible,
            }
        })
        .collect()
}

/// Produce the canonical input list for `zone`.
///
/// Order is deterministic: base, shortcuts, favorites, quick select; the first
/// occurrence of a reference wins. Never returns an empty list.
pub fn reconcile(
    zone: Zone,
    sources: &InputSources,
    options: &InputOptions,
    overrides: &InputOverrides,
    tables: &LookupTables,
) -> Vec<InputDescriptor> {
    let mut inputs = reconcile_entries(zone, sources, options, overrides, tables);
    if inputs.is_empty() {
        tracing::debug!(%zone, "No usable inputs, using fallback entry");
        inputs.push(fallback_input(zone));
    }
    inputs
}

/// [`reconcile`] without the fallback: empty when no source yields a usable
/// entry, so callers can tell a real list from the placeholder.
pub fn reconcile_entries(
    zone: Zone,
    sources: &InputSources,
    options: &InputOptions,
    overrides: &InputOverrides,
    tables: &LookupTables,
) -> Vec<InputDescriptor> {
    let mut collected: Vec<RawInput> = sources.base.clone();

    if let (true, Some(shortcuts)) = (options.shortcuts, &sources.shortcuts) {
        collected.extend(
            shortcuts
                .iter()
                .filter(|s| s.category == SHORTCUT_INPUTS_CATEGORY)
                .map(|s| RawInput::new(s.name.clone(), s.reference.clone())),
        );
    }

    if let (true, Some(favorites)) = (options.favorites, &sources.favorites) {
        collected.extend(favorites.iter().cloned());
    }

    if let (true, Some(slots)) = (options.quick_select, sources.quick_select) {
        collected.extend(
            (1..=slots)
                .map(|n| RawInput::new(format!("QuickSelect{}", n), quick_select_reference(zone, n))),
        );
    }

    let mut seen = HashSet::new();
    let mut inputs = Vec::new();

    for raw in collected {
        let Some(mut input) = normalize(zone, &raw, tables) else {
            continue;
        };
        if !seen.insert(input.reference.clone()) {
            continue;
        }

        if let Some(name) = overrides.names.get(&input.reference) {
            input.name = name.clone();
        }
        if let Some(visible) = overrides.visibility.get(&input.reference) {
            input.visible = *visible;
        }
        input.identifier = inputs.len() as u32 + 1;
        inputs.push(input);
    }

    inputs
}

/// Normalize one raw entry: trim, convert, route.
///
/// Returns `None` for entries with an empty name or reference. The
/// identifier is left at 0 for the caller to assign.
pub fn normalize(zone: Zone, raw: &RawInput, tables: &LookupTables) -> Option<InputDescriptor> {
    let name = raw.name.trim();
    if name.is_empty() {
        return None;
    }
    let (routing_prefix, reference) = canonical_reference(zone, &raw.reference, tables)?;
    Some(InputDescriptor {
        identifier: 0,
        name: name.to_string(),
        reference,
        routing_prefix,
        visible: raw.visible,
    })
}

/// Routing prefix and canonical form of a reference as it would appear in
/// the reconciled list, or `None` if nothing is left after trimming.
pub fn canonical_reference(zone: Zone, reference: &str, tables: &LookupTables) -> Option<(String, String)> {
    let reference = reference.trim();
    if reference.is_empty() {
        return None;
    }
    let (routing_prefix, reference) = route(zone, tables.convert(reference), tables);
    (!reference.is_empty()).then_some((routing_prefix, reference))
}

/// Pick the routing prefix, rewriting main-zone mode-form references
fn route(zone: Zone, reference: &str, tables: &LookupTables) -> (String, String) {
    if zone == Zone::Main {
        if let Some(mode) = tables.input_mode(reference) {
            let stripped = reference.get(INPUT_MODE_STRIP..).unwrap_or("").trim();
            return (mode.to_string(), stripped.to_string());
        }
    }
    (default_prefix(zone).to_string(), reference.to_string())
}
