//! Wayfarer Domain - Core simulation types.
//!
//! Pure data model for the multi-tenant world simulation: entity records,
//! id newtypes, value objects (actions, status effects, event stages) and
//! the domain error taxonomy. No I/O lives here; persistence and scheduling
//! belong to the engine crate.

pub mod action;
pub mod clock;
pub mod content;
pub mod effects;
pub mod entities;
pub mod error;
pub mod ids;
pub mod stage;

pub use action::{ActionState, ActiveAction, QueuedAction};
pub use clock::{TimeOfDay, WorldClock, DEFAULT_DAY_LENGTH_SECS};
pub use content::{EquipSlotDef, EventTemplate, ItemTemplate, NpcTemplate};
pub use effects::{
    CraftingJob, EffectResult, ItemEffect, PeriodicEffect, PeriodicKind, StatusEffect,
};
pub use entities::event::STAGE_TIMER;
pub use entities::{
    Character, InventoryEntry, ItemInstance, ItemOwner, ItemState, Location, NpcInstance, Party,
    WorldEntity, WorldEvent,
};
pub use error::DomainError;
pub use ids::{
    ChannelId, CharacterId, ClockId, EventId, ItemId, LocationId, NpcId, PartyId, TenantId,
};
pub use stage::{
    AutoTransitionRule, CompareOp, ItemSpawn, NpcSpawn, OnEnter, StageAction, StageDefinition,
    StageOutcome, EVENT_END_STAGE,
};
