//! Content template definitions.
//!
//! Templates are immutable, tenant-independent blueprints loaded from content
//! files at startup. Live entities reference templates by key and carry their
//! own mutable state.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::effects::ItemEffect;
use crate::stage::StageDefinition;

/// Blueprint for item instances.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemTemplate {
    /// Stable content key (e.g., "healing_potion").
    pub key: String,
    pub name: String,
    /// Category used for equip-slot compatibility (e.g., "weapon", "armor").
    pub item_type: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub effects: Vec<ItemEffect>,
    /// Stackable items merge into one instance per owner.
    #[serde(default)]
    pub stackable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Blueprint for NPC instances.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NpcTemplate {
    pub key: String,
    pub name: String,
    pub max_hp: i32,
    #[serde(default)]
    pub stats: HashMap<String, f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Blueprint for events, including the full stage graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventTemplate {
    pub key: String,
    pub name: String,
    /// Stage the event enters when started.
    pub initial_stage: String,
    pub stages: HashMap<String, StageDefinition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl EventTemplate {
    pub fn stage(&self, stage_id: &str) -> Option<&StageDefinition> {
        self.stages.get(stage_id)
    }
}

/// An equipment slot and the item types it accepts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EquipSlotDef {
    /// Slot id (e.g., "main_hand", "chest").
    pub id: String,
    /// Item types this slot accepts; an equip request picks the first free
    /// compatible slot.
    pub compatible_types: Vec<String>,
}

impl EquipSlotDef {
    pub fn accepts(&self, item_type: &str) -> bool {
        self.compatible_types.iter().any(|t| t == item_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_item_template_defaults() {
        let template: ItemTemplate = serde_json::from_value(serde_json::json!({
            "key": "torch",
            "name": "Torch",
            "item_type": "tool",
        }))
        .expect("deserialize");
        assert!(!template.stackable);
        assert!(template.effects.is_empty());
    }

    #[test]
    fn test_equip_slot_compatibility() {
        let slot = EquipSlotDef {
            id: "main_hand".to_string(),
            compatible_types: vec!["weapon".to_string(), "tool".to_string()],
        };
        assert!(slot.accepts("weapon"));
        assert!(!slot.accepts("armor"));
    }

    #[test]
    fn test_event_template_stage_lookup() {
        let template: EventTemplate = serde_json::from_value(serde_json::json!({
            "key": "bandit_ambush",
            "name": "Bandit Ambush",
            "initial_stage": "approach",
            "stages": {"approach": {}, "event_end": {}},
        }))
        .expect("deserialize");
        assert!(template.stage("approach").is_some());
        assert!(template.stage("missing").is_none());
    }
}
