//! Location entity.

use serde::{Deserialize, Serialize};

use crate::entities::WorldEntity;
use crate::ids::{LocationId, TenantId};

/// A place characters and NPCs can occupy. Exits are one-way edges; a
/// two-way passage is an exit on each side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub id: LocationId,
    pub tenant: TenantId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub exits: Vec<LocationId>,
}

impl Location {
    pub fn new(tenant: TenantId, name: impl Into<String>) -> Self {
        Self {
            id: LocationId::new(),
            tenant,
            name: name.into(),
            description: String::new(),
            exits: Vec::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn connects_to(&self, target: LocationId) -> bool {
        self.exits.contains(&target)
    }

    pub fn add_exit(&mut self, target: LocationId) {
        if !self.connects_to(target) {
            self.exits.push(target);
        }
    }
}

impl WorldEntity for Location {
    type Id = LocationId;

    const KIND: &'static str = "location";

    fn id(&self) -> LocationId {
        self.id
    }

    fn tenant(&self) -> &TenantId {
        &self.tenant
    }
}
