//! Party entity - a named group of characters that can act as one.

use serde::{Deserialize, Serialize};

use crate::action::ActionState;
use crate::entities::WorldEntity;
use crate::ids::{CharacterId, LocationId, PartyId, TenantId};

/// A group of characters. Parties carry their own action state so group
/// activities (e.g., traveling together) run as a single scheduled action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Party {
    pub id: PartyId,
    pub tenant: TenantId,
    pub name: String,
    pub leader: CharacterId,
    /// Includes the leader.
    pub members: Vec<CharacterId>,
    pub location_id: Option<LocationId>,
    #[serde(default)]
    pub actions: ActionState,
}

impl Party {
    pub fn new(tenant: TenantId, name: impl Into<String>, leader: CharacterId) -> Self {
        Self {
            id: PartyId::new(),
            tenant,
            name: name.into(),
            leader,
            members: vec![leader],
            location_id: None,
            actions: ActionState::default(),
        }
    }

    pub fn is_member(&self, character_id: CharacterId) -> bool {
        self.members.contains(&character_id)
    }

    pub fn add_member(&mut self, character_id: CharacterId) {
        if !self.is_member(character_id) {
            self.members.push(character_id);
        }
    }

    /// Removes a member. Removing the leader promotes the next member; the
    /// caller disbands the party when this returns an empty roster.
    pub fn remove_member(&mut self, character_id: CharacterId) -> bool {
        let before = self.members.len();
        self.members.retain(|id| *id != character_id);
        let removed = self.members.len() < before;
        if removed && self.leader == character_id {
            if let Some(next) = self.members.first() {
                self.leader = *next;
            }
        }
        removed
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

impl WorldEntity for Party {
    type Id = PartyId;

    const KIND: &'static str = "party";

    fn id(&self) -> PartyId {
        self.id
    }

    fn tenant(&self) -> &TenantId {
        &self.tenant
    }
}
