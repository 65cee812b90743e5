//! Zone-routable input descriptors.

use serde::{Deserialize, Serialize};

/// One selectable entry of a zone's input list.
///
/// `reference` is unique within a list. The command that selects the entry
/// is the routing prefix followed by the reference.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InputDescriptor {
    /// Stable ordinal within the list, starting at 1
    pub identifier: u32,

    /// Display name
    pub name: String,

    /// Canonical reference, after conversion-table normalization
    pub reference: String,

    /// Protocol prefix addressing the zone or feature (e.g. "SI", "Z2", "MS")
    pub routing_prefix: String,

    pub visible: bool,
}

impl InputDescriptor {
    /// Command string that selects this input
    pub fn select_command(&self) -> String {
        format!("{}{}", self.routing_prefix, self.reference)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_select_command_joins_prefix_and_reference() {
        let input = InputDescriptor {
            identifier: 1,
            name: "Apple TV".to_string(),
            reference: "MPLAY".to_string(),
            routing_prefix: "Z2".to_string(),
            visible: true,
        };
        assert_eq!(input.select_command(), "Z2MPLAY");
    }
}
