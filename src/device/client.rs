//! Protocol client for one zone of one receiver
//!
//! Owns the session, the live snapshot and the input list. `connect` and
//! `check_state` are the two polling cycles; each sits behind its own
//! single-flight guard so overlapping ticks collapse into one request.

use async_trait::async_trait;
use denon_events::{DeviceInfo, InputDescriptor, PictureMode, Zone, ZoneSnapshot};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use super::documents::{
    decode, AppCommandReply, DeviceInfoDocument, MainZoneDocument, ZoneCapabilities,
    ZoneStatusDocument,
};
use super::flight::SingleFlight;
use super::session::{command_path, AppCommandVariant, DeviceSession, Generation, APP_COMMAND_PATH};
use super::transport::Transport;
use crate::bus::{BusEvent, SharedBus};
use crate::control::{self, CommandSink, ControlPolicies, ControlVerb, VolumeStep};
use crate::differ::has_changed;
use crate::error::{DeviceError, DeviceResult};
use crate::inputs::{
    canonical_reference, default_prefix, fallback_input, normalize, reconcile_entries,
    InputOptions, InputOverrides, InputSources, LookupTables, RawInput,
};
use crate::store::{Store, DEVICE_INFO_KEY, INPUTS_KEY, INPUT_NAMES_KEY, INPUT_VISIBILITY_KEY};

/// Result of triggering a cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// The same cycle was already running; this trigger was dropped
    Skipped,
    Completed,
    /// checkState ran but the snapshot did not change
    Unchanged,
}

/// Behavior the client takes from configuration
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Use the inputs the device reports; otherwise `static_inputs`
    pub device_inputs: bool,
    pub static_inputs: Vec<RawInput>,
    pub input_options: InputOptions,
    pub policies: ControlPolicies,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            device_inputs: true,
            static_inputs: Vec::new(),
            input_options: InputOptions::default(),
            policies: ControlPolicies::default(),
        }
    }
}

#[derive(Default)]
struct ClientState {
    connected: bool,
    /// Set by the first successful connect
    info: Option<DeviceInfo>,
    variant: AppCommandVariant,
    snapshot: ZoneSnapshot,
    inputs: Vec<InputDescriptor>,
    /// `inputs` holds only the zone fallback, not a real source
    placeholder: bool,
}

pub struct AvrClient {
    session: DeviceSession,
    transport: Arc<dyn Transport>,
    store: Arc<dyn Store>,
    bus: SharedBus,
    tables: Arc<LookupTables>,
    options: ClientOptions,
    state: RwLock<ClientState>,
    connect_flight: SingleFlight,
    check_flight: SingleFlight,
}

impl AvrClient {
    pub fn new(
        session: DeviceSession,
        transport: Arc<dyn Transport>,
        store: Arc<dyn Store>,
        bus: SharedBus,
        tables: Arc<LookupTables>,
        options: ClientOptions,
    ) -> Self {
        Self {
            session,
            transport,
            store,
            bus,
            tables,
            options,
            state: RwLock::new(ClientState::default()),
            connect_flight: SingleFlight::new(),
            check_flight: SingleFlight::new(),
        }
    }

    pub fn session(&self) -> &DeviceSession {
        &self.session
    }

    pub async fn is_connected(&self) -> bool {
        self.state.read().await.connected
    }

    pub async fn device_info(&self) -> Option<DeviceInfo> {
        self.state.read().await.info.clone()
    }

    pub async fn snapshot(&self) -> ZoneSnapshot {
        self.state.read().await.snapshot.clone()
    }

    pub async fn inputs(&self) -> Vec<InputDescriptor> {
        self.state.read().await.inputs.clone()
    }

    fn key(&self, key: &str) -> String {
        self.session.storage_key(key)
    }

    // =========================================================================
    // connect
    // =========================================================================

    /// Handshake: identify the device, discover capabilities, rebuild inputs
    pub async fn connect(&self) -> DeviceResult<CycleOutcome> {
        let Some(_permit) = self.connect_flight.try_acquire() else {
            debug!(host = self.session.host(), "connect already in flight, skipping");
            return Ok(CycleOutcome::Skipped);
        };

        match self.run_connect().await {
            Ok(()) => Ok(CycleOutcome::Completed),
            Err(e) => {
                error!(host = self.session.host(), zone = %self.session.zone(), "Connect failed: {}", e);
                Err(DeviceError::cycle("connect", e))
            }
        }
    }

    async fn run_connect(&self) -> DeviceResult<()> {
        let host = self.session.host();
        let zone = self.session.zone();
        let generation = self.session.generation();

        let xml = self.transport.get(generation.device_info_path()).await?;

        let (info, mut sources, document) = match generation {
            Generation::Gen0 => {
                let doc: MainZoneDocument = decode(&xml)?;
                let base = if zone.is_physical() {
                    doc.base_inputs()
                } else {
                    Vec::new()
                };
                let sources = InputSources {
                    base,
                    ..Default::default()
                };
                (doc.device_info(host), sources, to_document(&doc)?)
            }
            Generation::Gen1 | Generation::Gen2 => {
                let doc: DeviceInfoDocument = decode(&xml)?;
                let sources = doc
                    .zone_capabilities(zone)
                    .map(ZoneCapabilities::input_sources)
                    .unwrap_or_default();
                (doc.device_info(host), sources, to_document(&doc)?)
            }
        };

        if !self.options.device_inputs || sources.base.is_empty() {
            sources.base = self.options.static_inputs.clone();
        }

        let overrides = self.load_overrides()?;
        let mut inputs = reconcile_entries(
            zone,
            &sources,
            &self.options.input_options,
            &overrides,
            &self.tables,
        );
        let placeholder = inputs.is_empty();
        if placeholder {
            debug!(%zone, "No usable inputs, using fallback entry");
            inputs.push(fallback_input(zone));
        }

        self.store.save(&self.key(INPUTS_KEY), &inputs)?;
        self.store.save(&self.key(DEVICE_INFO_KEY), &info)?;

        let first = {
            let mut state = self.state.write().await;
            let first = state.info.is_none();
            state.connected = true;
            state.variant = AppCommandVariant::for_api_version(&info.api_version);
            state.info = Some(info.clone());
            state.inputs = inputs.clone();
            state.placeholder = placeholder;
            first
        };

        info!(
            host,
            %zone,
            manufacturer = %info.manufacturer,
            model = %info.model_name,
            inputs = inputs.len(),
            "Connected to receiver"
        );

        if first {
            self.bus.publish(BusEvent::DeviceInfo(info));
            self.bus.publish(BusEvent::DeviceConnected {
                host: host.to_string(),
                zone,
            });
        }
        self.bus.publish(BusEvent::InputsUpdated {
            inputs,
            remove: false,
        });
        if zone.is_physical() {
            self.bus.publish(BusEvent::RawDocument {
                topic: "info".to_string(),
                document,
            });
        }

        Ok(())
    }

    fn load_overrides(&self) -> DeviceResult<InputOverrides> {
        Ok(InputOverrides {
            names: self
                .store
                .load(&self.key(INPUT_NAMES_KEY))?
                .unwrap_or_default(),
            visibility: self
                .store
                .load(&self.key(INPUT_VISIBILITY_KEY))?
                .unwrap_or_default(),
        })
    }

    // =========================================================================
    // checkState
    // =========================================================================

    /// Poll the zone and publish a change event if anything moved
    pub async fn check_state(&self) -> DeviceResult<CycleOutcome> {
        let Some(_permit) = self.check_flight.try_acquire() else {
            debug!(host = self.session.host(), "checkState already in flight, skipping");
            return Ok(CycleOutcome::Skipped);
        };

        match self.run_check_state().await {
            Ok(true) => Ok(CycleOutcome::Completed),
            Ok(false) => Ok(CycleOutcome::Unchanged),
            Err(e) => {
                error!(host = self.session.host(), zone = %self.session.zone(), "checkState failed: {}", e);
                Err(DeviceError::cycle("checkState", e))
            }
        }
    }

    async fn run_check_state(&self) -> DeviceResult<bool> {
        let zone = self.session.zone();
        let xml = self.transport.get(self.session.zone_status_path()).await?;
        let doc: ZoneStatusDocument = decode(&xml)?;
        let power = doc.power();

        // Without a device profile every capability reads as unsupported
        let (supports_picture, supports_sound, variant) = {
            let state = self.state.read().await;
            let info = state.info.as_ref();
            (
                info.is_some_and(|i| i.supports_picture_mode),
                info.is_some_and(|i| i.supports_sound_mode),
                state.variant,
            )
        };

        let picture_mode = if zone == Zone::Main && supports_picture && power {
            self.query(variant, "GetPictureMode")
                .await?
                .and_then(|code| code.parse::<u8>().ok())
                .and_then(PictureMode::from_code)
        } else {
            None
        };

        let sound_mode = if power && (zone == Zone::SoundMode || (zone == Zone::Main && supports_sound)) {
            self.query(variant, "GetSurroundModeStatus")
                .await?
                .map(|mode| self.tables.convert(&mode).to_string())
                .unwrap_or_default()
        } else {
            String::new()
        };

        let audyssey_mode = if zone == Zone::Main && power && variant == AppCommandVariant::V0300 {
            self.query(variant, "GetAudyssey").await?.unwrap_or_default()
        } else {
            String::new()
        };

        let reference = if zone == Zone::SoundMode {
            sound_mode.clone()
        } else {
            self.tables.convert(doc.input()).to_string()
        };

        let snapshot = ZoneSnapshot {
            power,
            reference,
            volume_db: doc.volume_db(),
            volume_display: doc.volume_display(),
            muted: doc.muted(),
            picture_mode,
            sound_mode,
            audyssey_mode,
        };

        if zone.is_physical() {
            self.bus.publish(BusEvent::RawDocument {
                topic: "state".to_string(),
                document: to_document(&doc)?,
            });
        }

        let changed = {
            let mut state = self.state.write().await;
            if has_changed(&state.snapshot, &snapshot) {
                state.snapshot = snapshot.clone();
                true
            } else {
                false
            }
        };

        if changed {
            debug!(
                %zone,
                power = snapshot.power,
                reference = %snapshot.reference,
                volume = snapshot.volume_db,
                muted = snapshot.muted,
                "Zone state changed"
            );
            self.bus.publish(BusEvent::StateChanged(snapshot));
        }

        Ok(changed)
    }

    /// One command/response exchange; `None` when the reply carries no value
    async fn query(&self, variant: AppCommandVariant, verb: &str) -> DeviceResult<Option<String>> {
        let xml = self
            .transport
            .post(APP_COMMAND_PATH, variant.envelope(verb))
            .await?;
        let reply: AppCommandReply = decode(&xml)?;
        let value = reply.value().map(str::to_string);
        debug!(verb, value = ?value, "Device reply");
        Ok(value)
    }

    // =========================================================================
    // Commands
    // =========================================================================

    /// Write one literal command. Not retried.
    pub async fn send(&self, command: &str) -> DeviceResult<()> {
        debug!(host = self.session.host(), command, "Sending command");
        self.transport
            .get(&command_path(command))
            .await
            .map(|_| ())
            .inspect_err(|e| warn!(command, "Command failed: {}", e))
    }

    /// Route and send a control intent. Unroutable intents are logged and dropped.
    pub async fn control(&self, intent: control::CommandIntent) -> DeviceResult<()> {
        let plan = match control::plan(intent) {
            Ok(plan) => plan,
            Err(e) => {
                warn!(?intent, "Ignoring control request: {}", e);
                return Ok(());
            }
        };
        control::run_plan(self, &plan).await
    }

    pub async fn set_power(&self, on: bool) -> DeviceResult<()> {
        self.control(self.options.policies.intent(ControlVerb::Power(on)))
            .await
    }

    pub async fn set_volume(&self, db: f32) -> DeviceResult<()> {
        self.control(self.options.policies.intent(ControlVerb::Volume(db)))
            .await
    }

    pub async fn step_volume(&self, step: VolumeStep) -> DeviceResult<()> {
        self.control(
            self.options
                .policies
                .intent(ControlVerb::VolumeSelector(step)),
        )
        .await
    }

    pub async fn set_mute(&self, muted: bool) -> DeviceResult<()> {
        self.control(self.options.policies.intent(ControlVerb::Mute(muted)))
            .await
    }

    /// Switch the zone to a known input
    pub async fn select_input(&self, reference: &str) -> DeviceResult<()> {
        let command = self
            .state
            .read()
            .await
            .inputs
            .iter()
            .find(|i| i.reference == reference)
            .map(InputDescriptor::select_command)
            .ok_or_else(|| DeviceError::Protocol(format!("unknown input {}", reference)))?;
        self.send(&command).await
    }

    // =========================================================================
    // Input list maintenance
    // =========================================================================

    /// Upsert or remove descriptors by reference.
    ///
    /// Changes are normalized the way the reconciler normalizes device
    /// entries, so a reference is matched in its canonical form and entries
    /// with an empty name or reference are ignored. New entries are numbered
    /// after the current maximum identifier.
    ///
    /// The list never goes empty: removing the last entry puts the zone
    /// fallback in its place, and the first real entry added afterwards
    /// replaces it. Every change to the list is published, the fallback
    /// included; removals go out before additions.
    pub async fn update_inputs(&self, changes: Vec<InputDescriptor>, remove: bool) -> DeviceResult<()> {
        let zone = self.session.zone();

        let (inputs, published) = {
            let mut guard = self.state.write().await;
            let state = &mut *guard;
            let mut published: Vec<(Vec<InputDescriptor>, bool)> = Vec::new();

            if remove {
                let mut removed = Vec::new();
                for change in &changes {
                    let Some(pos) = self.position_of(&state.inputs, &change.reference) else {
                        continue;
                    };
                    removed.push(state.inputs.remove(pos));
                }
                if !removed.is_empty() {
                    published.push((removed, true));
                }
                if state.inputs.is_empty() {
                    let fallback = fallback_input(zone);
                    state.inputs.push(fallback.clone());
                    state.placeholder = true;
                    published.push((vec![fallback], false));
                }
            } else {
                let normalized: Vec<_> = changes
                    .iter()
                    .filter_map(|change| {
                        let raw = RawInput {
                            name: change.name.clone(),
                            reference: change.reference.clone(),
                            visible: change.visible,
                        };
                        let mut input = normalize(zone, &raw, &self.tables)?;
                        // Keep an explicit prefix unless the reference carried its own mode
                        let requested = change.routing_prefix.trim();
                        if !requested.is_empty() && input.routing_prefix == default_prefix(zone) {
                            input.routing_prefix = requested.to_string();
                        }
                        Some((change.reference.trim().to_string(), input))
                    })
                    .collect();

                // Edits to the fallback itself leave it in place
                let adds_real_entry = normalized.iter().any(|(raw_reference, change)| {
                    !state
                        .inputs
                        .iter()
                        .any(|i| i.reference == change.reference || i.reference == *raw_reference)
                });
                if state.placeholder && adds_real_entry {
                    published.push((std::mem::take(&mut state.inputs), true));
                    state.placeholder = false;
                }

                let mut upserted = Vec::new();
                for (raw_reference, change) in normalized {
                    let existing = state
                        .inputs
                        .iter()
                        .position(|i| i.reference == change.reference || i.reference == raw_reference);
                    match existing {
                        Some(pos) => {
                            let existing = &mut state.inputs[pos];
                            existing.name = change.name;
                            existing.visible = change.visible;
                            upserted.push(existing.clone());
                        }
                        None => {
                            let identifier =
                                state.inputs.iter().map(|i| i.identifier).max().unwrap_or(0) + 1;
                            let added = InputDescriptor { identifier, ..change };
                            state.inputs.push(added.clone());
                            upserted.push(added);
                        }
                    }
                }
                if !upserted.is_empty() {
                    published.push((upserted, false));
                }
            }

            (state.inputs.clone(), published)
        };

        if published.is_empty() {
            debug!(remove, "No matching inputs to update");
            return Ok(());
        }

        self.store.save(&self.key(INPUTS_KEY), &inputs)?;
        for (affected, remove) in published {
            info!(count = affected.len(), remove, "Inputs updated");
            self.bus.publish(BusEvent::InputsUpdated {
                inputs: affected,
                remove,
            });
        }
        Ok(())
    }

    /// Index of the entry a caller-supplied reference names, trying the
    /// reference as given and then its canonical form
    fn position_of(&self, inputs: &[InputDescriptor], reference: &str) -> Option<usize> {
        let trimmed = reference.trim();
        inputs.iter().position(|i| i.reference == trimmed).or_else(|| {
            let (_, canonical) = canonical_reference(self.session.zone(), trimmed, &self.tables)?;
            inputs.iter().position(|i| i.reference == canonical)
        })
    }

    /// Persist a display-name override and apply it to the live list
    pub async fn rename_input(&self, reference: &str, name: &str) -> DeviceResult<()> {
        let key = self.key(INPUT_NAMES_KEY);
        let mut names: std::collections::HashMap<String, String> =
            self.store.load(&key)?.unwrap_or_default();
        names.insert(reference.to_string(), name.to_string());
        self.store.save(&key, &names)?;

        self.apply_override(reference, |input| input.name = name.to_string())
            .await
    }

    /// Persist a visibility override and apply it to the live list
    pub async fn set_input_visibility(&self, reference: &str, visible: bool) -> DeviceResult<()> {
        let key = self.key(INPUT_VISIBILITY_KEY);
        let mut visibility: std::collections::HashMap<String, bool> =
            self.store.load(&key)?.unwrap_or_default();
        visibility.insert(reference.to_string(), visible);
        self.store.save(&key, &visibility)?;

        self.apply_override(reference, |input| input.visible = visible)
            .await
    }

    async fn apply_override(
        &self,
        reference: &str,
        apply: impl FnOnce(&mut InputDescriptor),
    ) -> DeviceResult<()> {
        let current = self
            .state
            .read()
            .await
            .inputs
            .iter()
            .find(|i| i.reference == reference)
            .cloned();

        match current {
            Some(mut input) => {
                apply(&mut input);
                self.update_inputs(vec![input], false).await
            }
            // Stored anyway; picked up when the list is next rebuilt
            None => Ok(()),
        }
    }
}

#[async_trait]
impl CommandSink for AvrClient {
    async fn send(&self, command: &str) -> DeviceResult<()> {
        AvrClient::send(self, command).await
    }
}

fn to_document<T: Serialize>(doc: &T) -> DeviceResult<serde_json::Value> {
    serde_json::to_value(doc).map_err(|e| DeviceError::Decode(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::create_bus;
    use crate::control::CommandIntent;
    use crate::device::transport::mock::MockTransport;
    use crate::store::MemoryStore;
    use denon_events::VolumeDisplay;
    use std::time::Duration;
    use tokio::sync::broadcast;

    const DEVICE_INFO_PATH: &str = "/goform/Deviceinfo.xml";
    const MAIN_STATUS_PATH: &str = "/goform/formMainZone_MainZoneXmlStatusLite.xml";

    fn device_info_xml(api: &str) -> String {
        format!(
            r#"<?xml version="1.0" encoding="utf-8" ?>
<Device_Info>
  <CommApiVers>{}</CommApiVers>
  <BrandCode>0</BrandCode>
  <ModelName>*AVR-X3700H</ModelName>
  <MacAddress>0005CD112233</MacAddress>
  <UpgradeVersion>3040</UpgradeVersion>
  <DeviceZones>3</DeviceZones>
  <DeviceCapabilities>
    <Setup>
      <PictureMode><Control>1</Control></PictureMode>
      <SoundMode><Control>1</Control></SoundMode>
    </Setup>
  </DeviceCapabilities>
  <DeviceZoneCapabilities>
    <InputSource>
      <Control>1</Control>
      <List>
        <Source><FuncName>CBL/SAT</FuncName><DefaultName>Cable</DefaultName></Source>
        <Source><FuncName>Media Player</FuncName><DefaultName>Media Player</DefaultName></Source>
        <Source><FuncName>GAME</FuncName><DefaultName>Game</DefaultName></Source>
      </List>
    </InputSource>
  </DeviceZoneCapabilities>
</Device_Info>"#,
            api
        )
    }

    fn status_xml(power: &str, input: &str, volume: &str, mute: &str) -> String {
        format!(
            r#"<?xml version="1.0" encoding="utf-8" ?>
<item>
  <Power><value>{}</value></Power>
  <InputFuncSelect><value>{}</value></InputFuncSelect>
  <VolumeDisplay><value>Relative</value></VolumeDisplay>
  <MasterVolume><value>{}</value></MasterVolume>
  <Mute><value>{}</value></Mute>
</item>"#,
            power, input, volume, mute
        )
    }

    struct Fixture {
        client: Arc<AvrClient>,
        transport: Arc<MockTransport>,
        store: Arc<MemoryStore>,
        events: broadcast::Receiver<BusEvent>,
    }

    fn fixture_with(zone: Zone, transport: MockTransport, options: ClientOptions) -> Fixture {
        let transport = Arc::new(transport);
        transport.set_document(DEVICE_INFO_PATH, &device_info_xml("0220"));
        transport.set_document(MAIN_STATUS_PATH, &status_xml("ON", "CBL/SAT", "-40.0", "off"));
        transport.set_reply("GetPictureMode", "<rx><cmd><value>2</value></cmd></rx>");
        transport.set_reply(
            "GetSurroundModeStatus",
            "<rx><cmd><surround>Stereo</surround></cmd></rx>",
        );
        transport.set_reply("GetAudyssey", "<rx><cmd><value>REFERENCE</value></cmd></rx>");

        let store = Arc::new(MemoryStore::new());
        let bus = create_bus();
        let events = bus.subscribe();
        let client = Arc::new(AvrClient::new(
            DeviceSession::new("10.0.0.9", 8080, Generation::Gen1, zone),
            transport.clone(),
            store.clone(),
            bus,
            Arc::new(LookupTables::standard()),
            options,
        ));

        Fixture {
            client,
            transport,
            store,
            events,
        }
    }

    fn fixture(zone: Zone) -> Fixture {
        fixture_with(zone, MockTransport::new(), ClientOptions::default())
    }

    fn drain(events: &mut broadcast::Receiver<BusEvent>) -> Vec<BusEvent> {
        let mut out = Vec::new();
        while let Ok(event) = events.try_recv() {
            out.push(event);
        }
        out
    }

    fn state_changes(events: &[BusEvent]) -> Vec<ZoneSnapshot> {
        events
            .iter()
            .filter_map(|e| match e {
                BusEvent::StateChanged(s) => Some(s.clone()),
                _ => None,
            })
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_connect_fetches_device_info_once() {
        let f = fixture_with(
            Zone::Main,
            MockTransport::with_delay(Duration::from_millis(50)),
            ClientOptions::default(),
        );

        let (a, b) = tokio::join!(f.client.connect(), f.client.connect());
        let mut outcomes = vec![a.unwrap(), b.unwrap()];
        outcomes.sort_by_key(|o| *o == CycleOutcome::Skipped);

        assert_eq!(outcomes, vec![CycleOutcome::Completed, CycleOutcome::Skipped]);
        assert_eq!(f.transport.count(&format!("GET {}", DEVICE_INFO_PATH)), 1);

        // Guard is free again
        assert_eq!(f.client.connect().await.unwrap(), CycleOutcome::Completed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_check_state_polls_once() {
        let f = fixture_with(
            Zone::Main,
            MockTransport::with_delay(Duration::from_millis(50)),
            ClientOptions::default(),
        );

        let (a, b) = tokio::join!(f.client.check_state(), f.client.check_state());
        let mut outcomes = vec![a.unwrap(), b.unwrap()];
        outcomes.sort_by_key(|o| *o == CycleOutcome::Skipped);

        assert_eq!(outcomes, vec![CycleOutcome::Completed, CycleOutcome::Skipped]);
        assert_eq!(f.transport.count(&format!("GET {}", MAIN_STATUS_PATH)), 1);

        // Guard is free again; same status, so nothing changed
        assert_eq!(f.client.check_state().await.unwrap(), CycleOutcome::Unchanged);
        assert_eq!(f.transport.count(&format!("GET {}", MAIN_STATUS_PATH)), 2);
    }

    #[tokio::test]
    async fn test_connect_publishes_device_info_once_and_inputs_every_time() {
        let mut f = fixture(Zone::Main);

        f.client.connect().await.unwrap();
        f.client.connect().await.unwrap();
        let events = drain(&mut f.events);

        let infos = events
            .iter()
            .filter(|e| matches!(e, BusEvent::DeviceInfo(_)))
            .count();
        let connected = events
            .iter()
            .filter(|e| matches!(e, BusEvent::DeviceConnected { .. }))
            .count();
        let inputs = events
            .iter()
            .filter(|e| matches!(e, BusEvent::InputsUpdated { remove: false, .. }))
            .count();
        assert_eq!((infos, connected, inputs), (1, 1, 2));

        let info = f.client.device_info().await.unwrap();
        assert_eq!(info.manufacturer, "Denon");
        assert_eq!(info.model_name, "AVR-X3700H");
    }

    #[tokio::test]
    async fn test_connect_persists_reconciled_inputs() {
        let f = fixture(Zone::Main);
        f.client.connect().await.unwrap();

        let store: Arc<dyn Store> = f.store.clone();
        let key = f.client.session().storage_key(INPUTS_KEY);
        let saved: Vec<InputDescriptor> = store.load(&key).unwrap().unwrap();

        let references: Vec<&str> = saved.iter().map(|i| i.reference.as_str()).collect();
        assert_eq!(references, vec!["SAT/CBL", "MPLAY", "GAME"]);
        assert_eq!(saved, f.client.inputs().await);

        let info: DeviceInfo = store
            .load(&f.client.session().storage_key(DEVICE_INFO_KEY))
            .unwrap()
            .unwrap();
        assert_eq!(info.serial_number, "0005CD112233");
    }

    #[tokio::test]
    async fn test_static_inputs_when_device_inputs_disabled() {
        let options = ClientOptions {
            device_inputs: false,
            static_inputs: vec![RawInput::new("Turntable", "PHONO")],
            ..Default::default()
        };
        let f = fixture_with(Zone::Main, MockTransport::new(), options);
        f.client.connect().await.unwrap();

        let inputs = f.client.inputs().await;
        assert_eq!(inputs.len(), 1);
        assert_eq!(inputs[0].select_command(), "SIPHONO");
    }

    #[tokio::test]
    async fn test_identical_polls_emit_once_then_volume_change_emits_once() {
        let mut f = fixture(Zone::Main);
        f.client.connect().await.unwrap();
        drain(&mut f.events);

        assert_eq!(f.client.check_state().await.unwrap(), CycleOutcome::Completed);
        assert_eq!(state_changes(&drain(&mut f.events)).len(), 1);

        assert_eq!(f.client.check_state().await.unwrap(), CycleOutcome::Unchanged);
        assert_eq!(f.client.check_state().await.unwrap(), CycleOutcome::Unchanged);
        assert!(state_changes(&drain(&mut f.events)).is_empty());

        f.transport
            .set_document(MAIN_STATUS_PATH, &status_xml("ON", "CBL/SAT", "-39.5", "off"));
        f.client.check_state().await.unwrap();
        let changes = state_changes(&drain(&mut f.events));
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].volume_db, -39.5);
    }

    #[tokio::test]
    async fn test_main_zone_snapshot_uses_capabilities() {
        let f = fixture(Zone::Main);
        f.client.connect().await.unwrap();
        f.client.check_state().await.unwrap();

        let snapshot = f.client.snapshot().await;
        assert!(snapshot.power);
        assert_eq!(snapshot.reference, "SAT/CBL");
        assert_eq!(snapshot.volume_db, -40.0);
        assert_eq!(snapshot.volume_display, VolumeDisplay::Relative);
        assert_eq!(snapshot.picture_mode, Some(PictureMode::Movie));
        assert_eq!(snapshot.sound_mode, "STEREO");
        // API 0220 uses the id 1 envelope, which has no Audyssey query
        assert_eq!(snapshot.audyssey_mode, "");
        assert_eq!(f.transport.count("POST /goform/AppCommand.xml GetAudyssey"), 0);
    }

    #[tokio::test]
    async fn test_audyssey_queried_on_newer_api() {
        let f = fixture(Zone::Main);
        f.transport
            .set_document(DEVICE_INFO_PATH, &device_info_xml("0301"));
        f.client.connect().await.unwrap();
        f.client.check_state().await.unwrap();

        assert_eq!(f.client.snapshot().await.audyssey_mode, "REFERENCE");
    }

    #[tokio::test]
    async fn test_power_off_skips_command_queries() {
        let f = fixture(Zone::Main);
        f.transport
            .set_document(MAIN_STATUS_PATH, &status_xml("STANDBY", "CBL/SAT", "--", "off"));
        f.client.connect().await.unwrap();
        f.client.check_state().await.unwrap();

        let snapshot = f.client.snapshot().await;
        assert!(!snapshot.power);
        assert_eq!(snapshot.volume_db, -80.0);
        assert_eq!(snapshot.picture_mode, None);
        assert_eq!(f.transport.count("POST"), 0);
    }

    #[tokio::test]
    async fn test_sound_mode_zone_reference_is_surround_mode() {
        let f = fixture(Zone::SoundMode);
        f.transport.set_document(
            "/goform/formMainZone_MainZoneXmlStatus.xml",
            &status_xml("ON", "DVD", "-30.0", "off"),
        );
        f.client.connect().await.unwrap();
        f.client.check_state().await.unwrap();

        let snapshot = f.client.snapshot().await;
        assert_eq!(snapshot.reference, "STEREO");
        assert_eq!(snapshot.picture_mode, None);
    }

    #[tokio::test]
    async fn test_check_state_without_profile() {
        let f = fixture(Zone::Main);
        f.client.check_state().await.unwrap();

        let snapshot = f.client.snapshot().await;
        assert_eq!(snapshot.reference, "SAT/CBL");
        assert_eq!(snapshot.picture_mode, None);
        assert_eq!(f.transport.count("POST"), 0);
    }

    #[tokio::test]
    async fn test_raw_documents_only_for_physical_zones() {
        let mut main = fixture(Zone::Main);
        main.client.connect().await.unwrap();
        main.client.check_state().await.unwrap();
        let topics: Vec<String> = drain(&mut main.events)
            .into_iter()
            .filter_map(|e| match e {
                BusEvent::RawDocument { topic, .. } => Some(topic),
                _ => None,
            })
            .collect();
        assert_eq!(topics, vec!["info", "state"]);

        let mut passthrough = fixture(Zone::PassThrough);
        passthrough.client.connect().await.unwrap();
        passthrough.client.check_state().await.unwrap();
        assert!(!drain(&mut passthrough.events)
            .iter()
            .any(|e| matches!(e, BusEvent::RawDocument { .. })));
    }

    #[tokio::test]
    async fn test_failed_cycle_is_wrapped_and_releases_guard() {
        let f = fixture(Zone::Zone3);

        let err = f.client.check_state().await.unwrap_err();
        assert!(matches!(err, DeviceError::Cycle { cycle: "checkState", .. }));

        f.transport.set_document(
            "/goform/formZone3_Zone3XmlStatusLite.xml",
            &status_xml("ON", "TUNER", "-50.0", "on"),
        );
        assert_eq!(f.client.check_state().await.unwrap(), CycleOutcome::Completed);
        assert!(f.client.snapshot().await.muted);
    }

    #[tokio::test(start_paused = true)]
    async fn test_control_sends_routed_commands_in_order() {
        let f = fixture(Zone::Main);
        f.client
            .control(CommandIntent {
                verb: ControlVerb::Power(true),
                policy: 6,
            })
            .await
            .unwrap();

        assert_eq!(
            f.transport.calls(),
            vec![
                "GET /goform/formiPhoneAppDirect.xml?ZMON",
                "GET /goform/formiPhoneAppDirect.xml?Z2ON",
                "GET /goform/formiPhoneAppDirect.xml?Z3ON",
            ]
        );
    }

    #[tokio::test]
    async fn test_unroutable_control_is_dropped() {
        let f = fixture(Zone::Main);
        f.client
            .control(CommandIntent {
                verb: ControlVerb::Volume(-20.0),
                policy: 7,
            })
            .await
            .unwrap();
        assert!(f.transport.calls().is_empty());
    }

    #[tokio::test]
    async fn test_configured_policies_drive_helpers() {
        let options = ClientOptions {
            policies: ControlPolicies {
                power: 7,
                volume: 1,
                mute: 0,
            },
            ..Default::default()
        };
        let f = fixture_with(Zone::Main, MockTransport::new(), options);

        f.client.set_power(false).await.unwrap();
        f.client.set_volume(-40.5).await.unwrap();
        f.client.step_volume(VolumeStep::Up).await.unwrap();
        f.client.set_mute(true).await.unwrap();

        assert_eq!(
            f.transport.calls(),
            vec![
                "GET /goform/formiPhoneAppDirect.xml?PWSTANDBY",
                "GET /goform/formiPhoneAppDirect.xml?Z2395",
                "GET /goform/formiPhoneAppDirect.xml?Z2UP",
                "GET /goform/formiPhoneAppDirect.xml?MUON",
            ]
        );
    }

    #[tokio::test]
    async fn test_select_input_uses_routing_prefix() {
        let f = fixture(Zone::Main);
        f.client.connect().await.unwrap();

        f.client.select_input("MPLAY").await.unwrap();
        assert!(f
            .transport
            .calls()
            .contains(&"GET /goform/formiPhoneAppDirect.xml?SIMPLAY".to_string()));

        let err = f.client.select_input("PHONO").await.unwrap_err();
        assert!(matches!(err, DeviceError::Protocol(_)));
    }

    #[tokio::test]
    async fn test_update_inputs_appends_after_max_identifier() {
        let mut f = fixture(Zone::Main);
        f.client.connect().await.unwrap();
        drain(&mut f.events);

        let added = InputDescriptor {
            identifier: 0,
            name: "Phono".to_string(),
            reference: "PHONO".to_string(),
            routing_prefix: String::new(),
            visible: true,
        };
        f.client.update_inputs(vec![added], false).await.unwrap();

        let events = drain(&mut f.events);
        let BusEvent::InputsUpdated { inputs, remove } = &events[0] else {
            panic!("expected InputsUpdated, got {:?}", events);
        };
        assert!(!remove);
        assert_eq!(inputs.len(), 1);
        assert_eq!(inputs[0].identifier, 4);
        assert_eq!(inputs[0].select_command(), "SIPHONO");
        assert_eq!(f.client.inputs().await.len(), 4);
    }

    fn inputs_updates(events: &[BusEvent]) -> Vec<(Vec<String>, bool)> {
        events
            .iter()
            .filter_map(|e| match e {
                BusEvent::InputsUpdated { inputs, remove } => Some((
                    inputs.iter().map(|i| i.reference.clone()).collect(),
                    *remove,
                )),
                _ => None,
            })
            .collect()
    }

    fn descriptor(name: &str, reference: &str) -> InputDescriptor {
        InputDescriptor {
            identifier: 0,
            name: name.to_string(),
            reference: reference.to_string(),
            routing_prefix: String::new(),
            visible: true,
        }
    }

    #[tokio::test]
    async fn test_removing_every_input_publishes_fallback() {
        let mut f = fixture(Zone::Main);
        f.client.connect().await.unwrap();
        let all = f.client.inputs().await;
        drain(&mut f.events);

        f.client.update_inputs(all, true).await.unwrap();

        let remaining = f.client.inputs().await;
        assert_eq!(remaining, vec![fallback_input(Zone::Main)]);
        assert_eq!(remaining[0].name, "CBL/SAT");

        let updates = inputs_updates(&drain(&mut f.events));
        assert_eq!(
            updates,
            vec![
                (
                    vec!["SAT/CBL".to_string(), "MPLAY".to_string(), "GAME".to_string()],
                    true
                ),
                (vec!["SAT/CBL".to_string()], false),
            ]
        );
        let store: Arc<dyn Store> = f.store.clone();
        let saved: Vec<InputDescriptor> = store
            .load(&f.client.session().storage_key(INPUTS_KEY))
            .unwrap()
            .unwrap();
        assert_eq!(saved, remaining);
    }

    #[tokio::test]
    async fn test_adding_to_fallback_list_replaces_placeholder() {
        let mut f = fixture(Zone::Main);
        f.client.connect().await.unwrap();
        let all = f.client.inputs().await;
        f.client.update_inputs(all, true).await.unwrap();
        drain(&mut f.events);

        f.client
            .update_inputs(vec![descriptor("CD Player", "CD")], false)
            .await
            .unwrap();

        let inputs = f.client.inputs().await;
        assert_eq!(inputs.len(), 1);
        assert_eq!(inputs[0].reference, "CD");
        assert_eq!(inputs[0].identifier, 1);

        let updates = inputs_updates(&drain(&mut f.events));
        assert_eq!(
            updates,
            vec![
                (vec!["SAT/CBL".to_string()], true),
                (vec!["CD".to_string()], false),
            ]
        );
    }

    #[tokio::test]
    async fn test_connect_fallback_is_replaced_by_first_real_input() {
        // The device reports no capabilities for zone 2
        let mut f = fixture(Zone::Zone2);
        f.client.connect().await.unwrap();
        assert_eq!(f.client.inputs().await, vec![fallback_input(Zone::Zone2)]);
        drain(&mut f.events);

        f.client
            .update_inputs(vec![descriptor("FM", "Tuner")], false)
            .await
            .unwrap();

        let inputs = f.client.inputs().await;
        assert_eq!(inputs.len(), 1);
        assert_eq!(inputs[0].select_command(), "Z2TUNER");
        assert_eq!(
            inputs_updates(&drain(&mut f.events)),
            vec![
                (vec!["SAT/CBL".to_string()], true),
                (vec!["TUNER".to_string()], false),
            ]
        );
    }

    #[tokio::test]
    async fn test_renaming_the_fallback_keeps_it_in_place() {
        let mut f = fixture(Zone::Main);
        f.client.connect().await.unwrap();
        let all = f.client.inputs().await;
        f.client.update_inputs(all, true).await.unwrap();
        drain(&mut f.events);

        f.client.rename_input("SAT/CBL", "Set-top box").await.unwrap();

        let inputs = f.client.inputs().await;
        assert_eq!(inputs.len(), 1);
        assert_eq!(inputs[0].name, "Set-top box");
        assert_eq!(
            inputs_updates(&drain(&mut f.events)),
            vec![(vec!["SAT/CBL".to_string()], false)]
        );
    }

    #[tokio::test]
    async fn test_update_inputs_normalizes_changes() {
        let mut f = fixture(Zone::Main);
        f.client.connect().await.unwrap();
        drain(&mut f.events);

        f.client
            .update_inputs(
                vec![
                    // Device spelling of an existing entry
                    descriptor(" Cable ", "CBL/SAT"),
                    descriptor("Blank", ""),
                    descriptor("", "DVD"),
                    descriptor("Radio", "TF AN10570"),
                ],
                false,
            )
            .await
            .unwrap();

        let inputs = f.client.inputs().await;
        let live: Vec<_> = inputs
            .iter()
            .map(|i| (i.name.as_str(), i.reference.as_str()))
            .collect();
        assert_eq!(
            live,
            vec![
                ("Cable", "SAT/CBL"),
                ("Media Player", "MPLAY"),
                ("Game", "GAME"),
                ("Radio", "AN10570"),
            ]
        );
        assert_eq!(inputs[3].select_command(), "TFAN10570");
        assert_eq!(inputs[3].identifier, 4);

        assert_eq!(
            inputs_updates(&drain(&mut f.events)),
            vec![(vec!["SAT/CBL".to_string(), "AN10570".to_string()], false)]
        );
    }

    #[tokio::test]
    async fn test_remove_matches_canonical_reference() {
        let mut f = fixture(Zone::Main);
        f.client.connect().await.unwrap();
        drain(&mut f.events);

        f.client
            .update_inputs(vec![descriptor("", "Media Player"), descriptor("", "PHONO")], true)
            .await
            .unwrap();

        let references: Vec<_> = f.client.inputs().await.into_iter().map(|i| i.reference).collect();
        assert_eq!(references, vec!["SAT/CBL", "GAME"]);
        assert_eq!(
            inputs_updates(&drain(&mut f.events)),
            vec![(vec!["MPLAY".to_string()], true)]
        );
    }

    #[tokio::test]
    async fn test_update_with_only_unusable_entries_publishes_nothing() {
        let mut f = fixture(Zone::Main);
        f.client.connect().await.unwrap();
        drain(&mut f.events);

        f.client
            .update_inputs(vec![descriptor("Blank", "  ")], false)
            .await
            .unwrap();

        assert_eq!(f.client.inputs().await.len(), 3);
        assert!(drain(&mut f.events).is_empty());
    }

    #[tokio::test]
    async fn test_rename_survives_reconnect() {
        let mut f = fixture(Zone::Main);
        f.client.connect().await.unwrap();
        drain(&mut f.events);

        f.client.rename_input("MPLAY", "Apple TV").await.unwrap();
        f.client.set_input_visibility("GAME", false).await.unwrap();
        assert_eq!(
            drain(&mut f.events)
                .iter()
                .filter(|e| matches!(e, BusEvent::InputsUpdated { .. }))
                .count(),
            2
        );

        f.client.connect().await.unwrap();
        let inputs = f.client.inputs().await;
        assert_eq!(inputs[1].name, "Apple TV");
        assert!(!inputs[2].visible);
    }
}
