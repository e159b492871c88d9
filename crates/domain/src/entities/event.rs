//! World event entity - one live run of an event template.
//!
//! The event copies its template's stage graph at start, so edits to content
//! never change an event already in flight. All bookkeeping the stage machine
//! needs (timers, state variables, spawned entity ids) lives in typed fields
//! on the instance and persists with it.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::content::EventTemplate;
use crate::entities::WorldEntity;
use crate::ids::{ChannelId, CharacterId, EventId, ItemId, NpcId, TenantId};
use crate::stage::{StageDefinition, EVENT_END_STAGE};

/// Timer every stage entry resets to zero; the default subject of
/// `time_elapsed` transition rules.
pub const STAGE_TIMER: &str = "stage_timer";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorldEvent {
    pub id: EventId,
    pub tenant: TenantId,
    /// Content key of the template this event was started from.
    pub template_id: String,
    /// Channel the event plays out in; notifications go here.
    pub channel: ChannelId,
    pub current_stage_id: String,
    pub is_active: bool,
    /// Characters participating in the event.
    #[serde(default)]
    pub players: Vec<CharacterId>,
    /// Named numeric state commands and transition rules read and write.
    #[serde(default)]
    pub state_variables: HashMap<String, f64>,
    /// World-second timers. Reset on every stage entry.
    #[serde(default)]
    pub timers: HashMap<String, f64>,
    /// NPCs spawned by this event, removed when it ends.
    #[serde(default)]
    pub spawned_npcs: Vec<NpcId>,
    /// Temporary items spawned by this event, removed when it ends.
    #[serde(default)]
    pub spawned_items: Vec<ItemId>,
    /// Stage graph copied from the template at start time.
    pub stages: HashMap<String, StageDefinition>,
}

impl WorldEvent {
    /// Starts a new event in the template's initial stage. Entry side effects
    /// for that stage are the engine's job.
    pub fn from_template(tenant: TenantId, template: &EventTemplate, channel: ChannelId) -> Self {
        Self {
            id: EventId::new(),
            tenant,
            template_id: template.key.clone(),
            channel,
            current_stage_id: template.initial_stage.clone(),
            is_active: true,
            players: Vec::new(),
            state_variables: HashMap::new(),
            timers: HashMap::from([(STAGE_TIMER.to_string(), 0.0)]),
            spawned_npcs: Vec::new(),
            spawned_items: Vec::new(),
            stages: template.stages.clone(),
        }
    }

    pub fn current_stage(&self) -> Option<&StageDefinition> {
        self.stages.get(&self.current_stage_id)
    }

    pub fn has_stage(&self, stage_id: &str) -> bool {
        stage_id == EVENT_END_STAGE || self.stages.contains_key(stage_id)
    }

    /// Moves to a stage and resets the timer map. Does not run entry side
    /// effects or end the event; the stage machine layers those on.
    pub fn enter_stage(&mut self, stage_id: impl Into<String>) {
        self.current_stage_id = stage_id.into();
        self.timers.clear();
        self.timers.insert(STAGE_TIMER.to_string(), 0.0);
    }

    pub fn is_ended(&self) -> bool {
        !self.is_active || self.current_stage_id == EVENT_END_STAGE
    }

    pub fn advance_timers(&mut self, delta: f64) {
        for value in self.timers.values_mut() {
            *value += delta;
        }
    }

    pub fn timer(&self, name: &str) -> Option<f64> {
        self.timers.get(name).copied()
    }

    pub fn variable(&self, name: &str) -> Option<f64> {
        self.state_variables.get(name).copied()
    }

    pub fn set_variable(&mut self, name: impl Into<String>, value: f64) {
        self.state_variables.insert(name.into(), value);
    }

    pub fn has_player(&self, character_id: CharacterId) -> bool {
        self.players.contains(&character_id)
    }

    pub fn add_player(&mut self, character_id: CharacterId) {
        if !self.has_player(character_id) {
            self.players.push(character_id);
        }
    }

    pub fn remove_player(&mut self, character_id: CharacterId) -> bool {
        let before = self.players.len();
        self.players.retain(|id| *id != character_id);
        self.players.len() < before
    }
}

impl WorldEntity for WorldEvent {
    type Id = EventId;

    const KIND: &'static str = "event";

    fn id(&self) -> EventId {
        self.id
    }

    fn tenant(&self) -> &TenantId {
        &self.tenant
    }
}
