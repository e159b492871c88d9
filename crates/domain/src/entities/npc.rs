//! NPC instance entity.

use serde::{Deserialize, Serialize};

use crate::action::ActionState;
use crate::content::NpcTemplate;
use crate::effects::StatusEffect;
use crate::entities::WorldEntity;
use crate::ids::{EventId, LocationId, NpcId, TenantId};

/// A live NPC. NPCs share the character action machinery but are owned by the
/// world, not a player.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NpcInstance {
    pub id: NpcId,
    pub tenant: TenantId,
    /// Content key of the template this NPC was minted from.
    pub template_id: String,
    pub name: String,
    pub location_id: Option<LocationId>,
    pub hp: i32,
    pub max_hp: i32,
    #[serde(default)]
    pub actions: ActionState,
    #[serde(default)]
    pub status_effects: Vec<StatusEffect>,
    /// Event that spawned this NPC, when it should be removed at event end.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_id: Option<EventId>,
    /// Temporary NPCs are deleted rather than kept when their event ends.
    #[serde(default)]
    pub temporary: bool,
}

impl NpcInstance {
    pub fn from_template(tenant: TenantId, template: &NpcTemplate) -> Self {
        Self {
            id: NpcId::new(),
            tenant,
            template_id: template.key.clone(),
            name: template.name.clone(),
            location_id: None,
            hp: template.max_hp,
            max_hp: template.max_hp,
            actions: ActionState::default(),
            status_effects: Vec::new(),
            event_id: None,
            temporary: false,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_location(mut self, location: LocationId) -> Self {
        self.location_id = Some(location);
        self
    }

    pub fn with_status_effect(mut self, effect: StatusEffect) -> Self {
        self.status_effects.push(effect);
        self
    }

    pub fn spawned_by(mut self, event: EventId) -> Self {
        self.event_id = Some(event);
        self.temporary = true;
        self
    }

    pub fn is_alive(&self) -> bool {
        self.hp > 0
    }

    pub fn apply_hp_delta(&mut self, delta: i32) {
        self.hp = (self.hp + delta).clamp(0, self.max_hp);
    }
}

impl WorldEntity for NpcInstance {
    type Id = NpcId;

    const KIND: &'static str = "npc";

    fn id(&self) -> NpcId {
        self.id
    }

    fn tenant(&self) -> &TenantId {
        &self.tenant
    }
}
