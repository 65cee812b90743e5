//! Change detection between zone snapshots

use denon_events::ZoneSnapshot;

/// True when any tracked field differs.
///
/// Comparison is strict: no tolerance on volume, so a 0.5 dB step is a change.
pub fn has_changed(previous: &ZoneSnapshot, candidate: &ZoneSnapshot) -> bool {
    previous.power != candidate.power
        || previous.reference != candidate.reference
        || previous.volume_db != candidate.volume_db
        || previous.volume_display != candidate.volume_display
        || previous.muted != candidate.muted
        || previous.picture_mode != candidate.picture_mode
        || previous.sound_mode != candidate.sound_mode
        || previous.audyssey_mode != candidate.audyssey_mode
}
