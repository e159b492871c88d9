//! Character entity - a player-controlled actor in a tenant's world.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::action::ActionState;
use crate::effects::{CraftingJob, StatusEffect};
use crate::entities::WorldEntity;
use crate::ids::{CharacterId, LocationId, PartyId, TenantId};

/// A player character.
///
/// The character carries no item list; item instances point at their owner
/// and the engine's inventory view is a projection over that ownership.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Character {
    pub id: CharacterId,
    pub tenant: TenantId,
    pub name: String,
    pub location_id: Option<LocationId>,
    pub hp: i32,
    pub max_hp: i32,
    /// Base stat values keyed by stat name (e.g., "strength").
    #[serde(default)]
    pub base_stats: HashMap<String, f64>,
    /// Base stats plus equipment and status bonuses. Recomputed after load
    /// and after every mutation that can affect it; never persisted.
    #[serde(skip)]
    pub effective_stats: HashMap<String, f64>,
    #[serde(default)]
    pub actions: ActionState,
    #[serde(default)]
    pub status_effects: Vec<StatusEffect>,
    /// Crafting queue; only the head job accrues progress.
    #[serde(default)]
    pub crafting: Vec<CraftingJob>,
    pub party_id: Option<PartyId>,
}

impl Character {
    pub fn new(tenant: TenantId, name: impl Into<String>) -> Self {
        Self {
            id: CharacterId::new(),
            tenant,
            name: name.into(),
            location_id: None,
            hp: 10,
            max_hp: 10,
            base_stats: HashMap::new(),
            effective_stats: HashMap::new(),
            actions: ActionState::default(),
            status_effects: Vec::new(),
            crafting: Vec::new(),
            party_id: None,
        }
    }

    pub fn with_hp(mut self, current: i32, max: i32) -> Self {
        self.hp = current;
        self.max_hp = max;
        self
    }

    pub fn with_stat(mut self, name: impl Into<String>, value: f64) -> Self {
        self.base_stats.insert(name.into(), value);
        self
    }

    pub fn with_location(mut self, location_id: LocationId) -> Self {
        self.location_id = Some(location_id);
        self
    }

    pub fn with_status_effect(mut self, effect: StatusEffect) -> Self {
        self.status_effects.push(effect);
        self
    }

    pub fn is_alive(&self) -> bool {
        self.hp > 0
    }

    /// Applies a hit-point change, clamped to `[0, max_hp]`.
    pub fn apply_hp_delta(&mut self, delta: i32) {
        self.hp = (self.hp + delta).clamp(0, self.max_hp);
    }

    pub fn effective_stat(&self, name: &str) -> Option<f64> {
        self.effective_stats
            .get(name)
            .or_else(|| self.base_stats.get(name))
            .copied()
    }
}

impl WorldEntity for Character {
    type Id = CharacterId;

    const KIND: &'static str = "character";

    fn id(&self) -> CharacterId {
        self.id
    }

    fn tenant(&self) -> &TenantId {
        &self.tenant
    }
}
