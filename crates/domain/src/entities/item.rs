//! Item instance entity.
//!
//! An instance is one concrete occurrence of an item template. Ownership is a
//! single [`ItemOwner`] value, so an item can never be in two inventories at
//! once; moving an item means rewriting its owner.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::effects::ItemEffect;
use crate::entities::WorldEntity;
use crate::ids::{CharacterId, EventId, ItemId, LocationId, NpcId, TenantId};

/// Who currently holds an item. Exactly one variant at a time, so the
/// owner/location exclusivity invariant holds by construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum ItemOwner {
    Character(CharacterId),
    Npc(NpcId),
    /// Lying on the ground at a location.
    Location(LocationId),
    /// Unowned (minted but not yet assigned).
    None,
}

impl ItemOwner {
    pub fn as_character(&self) -> Option<CharacterId> {
        match self {
            Self::Character(id) => Some(*id),
            _ => None,
        }
    }

    pub fn as_npc(&self) -> Option<NpcId> {
        match self {
            Self::Npc(id) => Some(*id),
            _ => None,
        }
    }

    pub fn as_location(&self) -> Option<LocationId> {
        match self {
            Self::Location(id) => Some(*id),
            _ => None,
        }
    }

    pub fn is_unowned(&self) -> bool {
        matches!(self, Self::None)
    }
}

/// Mutable per-instance state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ItemState {
    #[serde(default)]
    pub equipped: bool,
    /// Slot id while equipped (e.g., "main_hand").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slot: Option<String>,
    /// Instance-level effects layered over the template's (e.g., an
    /// enchantment applied at runtime).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub effects: Vec<ItemEffect>,
    /// Free-form state commands may attach (charges, inscriptions).
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub custom: HashMap<String, serde_json::Value>,
}

/// A concrete item in the world.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemInstance {
    pub id: ItemId,
    pub tenant: TenantId,
    /// Content key of the template this instance was minted from.
    pub template_id: String,
    pub owner: ItemOwner,
    /// Count for stackable items; 1.0 otherwise.
    pub quantity: f64,
    #[serde(default)]
    pub state: ItemState,
    /// Spawned by an event and removed when that event ends.
    #[serde(default)]
    pub temporary: bool,
    /// Set when `temporary` so cleanup can find this instance.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_event: Option<EventId>,
}

impl ItemInstance {
    pub fn new(tenant: TenantId, template_id: impl Into<String>, owner: ItemOwner) -> Self {
        Self {
            id: ItemId::new(),
            tenant,
            template_id: template_id.into(),
            owner,
            quantity: 1.0,
            state: ItemState::default(),
            temporary: false,
            source_event: None,
        }
    }

    pub fn with_quantity(mut self, quantity: f64) -> Self {
        self.quantity = quantity;
        self
    }

    pub fn spawned_by(mut self, event: EventId) -> Self {
        self.temporary = true;
        self.source_event = Some(event);
        self
    }

    pub fn is_equipped(&self) -> bool {
        self.state.equipped
    }

    pub fn equip(&mut self, slot: impl Into<String>) {
        self.state.equipped = true;
        self.state.slot = Some(slot.into());
    }

    pub fn unequip(&mut self) {
        self.state.equipped = false;
        self.state.slot = None;
    }
}

impl WorldEntity for ItemInstance {
    type Id = ItemId;

    const KIND: &'static str = "item";

    fn id(&self) -> ItemId {
        self.id
    }

    fn tenant(&self) -> &TenantId {
        &self.tenant
    }
}

/// Flattened inventory row for responses: instance plus the template fields a
/// player cares about.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventoryEntry {
    pub item_id: ItemId,
    pub template_id: String,
    pub name: String,
    pub quantity: f64,
    pub equipped: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slot: Option<String>,
}
