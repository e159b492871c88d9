//! Content library.
//!
//! Immutable blueprints loaded once at startup from JSON files in the content
//! directory: item/NPC/event templates, equipment slots and default action
//! durations. Live tenants reference these by key; the library itself is
//! never persisted.

use std::collections::HashMap;
use std::path::Path;

use serde::de::DeserializeOwned;
use tracing::{debug, warn};
use wayfarer_domain::{EquipSlotDef, EventTemplate, ItemTemplate, NpcTemplate, EVENT_END_STAGE};

use crate::error::EngineError;

#[derive(Debug, Default, Clone)]
pub struct ContentLibrary {
    items: HashMap<String, ItemTemplate>,
    npcs: HashMap<String, NpcTemplate>,
    events: HashMap<String, EventTemplate>,
    equip_slots: Vec<EquipSlotDef>,
    action_durations: HashMap<String, f64>,
}

impl ContentLibrary {
    /// Loads all content files from a directory. Missing files load as empty
    /// collections; malformed files are an error.
    ///
    /// Expected layout: `items.json`, `npcs.json`, `events.json`,
    /// `equip_slots.json` (arrays) and `action_durations.json` (map of
    /// action keyword to world-seconds).
    pub fn load_from_dir(dir: impl AsRef<Path>) -> Result<Self, EngineError> {
        let dir = dir.as_ref();

        let items: Vec<ItemTemplate> = load_file(dir, "items.json")?;
        let npcs: Vec<NpcTemplate> = load_file(dir, "npcs.json")?;
        let events: Vec<EventTemplate> = load_file(dir, "events.json")?;
        let equip_slots: Vec<EquipSlotDef> = load_file(dir, "equip_slots.json")?;
        let action_durations: HashMap<String, f64> = load_file(dir, "action_durations.json")?;

        let library = Self {
            items: items.into_iter().map(|t| (t.key.clone(), t)).collect(),
            npcs: npcs.into_iter().map(|t| (t.key.clone(), t)).collect(),
            events: events.into_iter().map(|t| (t.key.clone(), t)).collect(),
            equip_slots,
            action_durations,
        };
        library.validate()?;

        debug!(
            items = library.items.len(),
            npcs = library.npcs.len(),
            events = library.events.len(),
            slots = library.equip_slots.len(),
            "Content library loaded"
        );
        Ok(library)
    }

    /// Builds a library from already-parsed collections (tests, embedders).
    pub fn from_parts(
        items: Vec<ItemTemplate>,
        npcs: Vec<NpcTemplate>,
        events: Vec<EventTemplate>,
        equip_slots: Vec<EquipSlotDef>,
        action_durations: HashMap<String, f64>,
    ) -> Result<Self, EngineError> {
        let library = Self {
            items: items.into_iter().map(|t| (t.key.clone(), t)).collect(),
            npcs: npcs.into_iter().map(|t| (t.key.clone(), t)).collect(),
            events: events.into_iter().map(|t| (t.key.clone(), t)).collect(),
            equip_slots,
            action_durations,
        };
        library.validate()?;
        Ok(library)
    }

    /// Rejects event templates whose initial stage is missing. Dangling
    /// transition targets are only warned about; the stage machine refuses
    /// them again at runtime.
    fn validate(&self) -> Result<(), EngineError> {
        for template in self.events.values() {
            if template.stage(&template.initial_stage).is_none() {
                return Err(EngineError::content(format!(
                    "event template '{}' has no initial stage '{}'",
                    template.key, template.initial_stage
                )));
            }
            for (stage_id, stage) in &template.stages {
                for rule in &stage.auto_transitions {
                    let target = rule.target_stage();
                    if target != EVENT_END_STAGE && !template.stages.contains_key(target) {
                        warn!(
                            template = %template.key,
                            stage = %stage_id,
                            target = %target,
                            "Auto-transition targets an unknown stage"
                        );
                    }
                }
            }
        }
        Ok(())
    }

    pub fn item(&self, key: &str) -> Option<&ItemTemplate> {
        self.items.get(key)
    }

    pub fn npc(&self, key: &str) -> Option<&NpcTemplate> {
        self.npcs.get(key)
    }

    pub fn event(&self, key: &str) -> Option<&EventTemplate> {
        self.events.get(key)
    }

    pub fn equip_slots(&self) -> &[EquipSlotDef] {
        &self.equip_slots
    }

    pub fn action_duration(&self, action_type: &str) -> Option<f64> {
        self.action_durations.get(action_type).copied()
    }

    pub fn event_keys(&self) -> impl Iterator<Item = &str> {
        self.events.keys().map(String::as_str)
    }
}

fn load_file<T: DeserializeOwned + Default>(dir: &Path, name: &str) -> Result<T, EngineError> {
    let path = dir.join(name);
    if !path.exists() {
        debug!(file = %path.display(), "Content file missing, using empty default");
        return Ok(T::default());
    }
    let raw = std::fs::read_to_string(&path)
        .map_err(|e| EngineError::content(format!("cannot read {}: {e}", path.display())))?;
    serde_json::from_str(&raw)
        .map_err(|e| EngineError::content(format!("cannot parse {}: {e}", path.display())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_files_load_as_empty() {
        let dir = tempfile::tempdir().expect("tempdir");
        let library = ContentLibrary::load_from_dir(dir.path()).expect("load");
        assert!(library.item("anything").is_none());
        assert!(library.equip_slots().is_empty());
    }

    #[test]
    fn loads_and_indexes_templates_by_key() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(
            dir.path().join("items.json"),
            serde_json::json!([
                {"key": "healing_potion", "name": "Healing Potion", "item_type": "consumable",
                 "stackable": true,
                 "effects": [{"type": "heal", "amount": 10}]},
            ])
            .to_string(),
        )
        .expect("write items");
        std::fs::write(
            dir.path().join("action_durations.json"),
            serde_json::json!({"move": 5.0}).to_string(),
        )
        .expect("write durations");

        let library = ContentLibrary::load_from_dir(dir.path()).expect("load");
        assert_eq!(
            library.item("healing_potion").expect("template").name,
            "Healing Potion"
        );
        assert_eq!(library.action_duration("move"), Some(5.0));
        assert_eq!(library.action_duration("rest"), None);
    }

    #[test]
    fn rejects_event_template_with_missing_initial_stage() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(
            dir.path().join("events.json"),
            serde_json::json!([
                {"key": "broken", "name": "Broken", "initial_stage": "nowhere", "stages": {}},
            ])
            .to_string(),
        )
        .expect("write events");

        let err = ContentLibrary::load_from_dir(dir.path()).expect_err("must fail");
        assert!(err.to_string().contains("initial stage"));
    }

    #[test]
    fn malformed_json_is_an_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("items.json"), "{not json").expect("write");
        assert!(ContentLibrary::load_from_dir(dir.path()).is_err());
    }
}
