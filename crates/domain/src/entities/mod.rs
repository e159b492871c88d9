//! Live world entities.
//!
//! Everything here is mutable per-tenant state: created at runtime, cached by
//! the engine and written back to storage when dirty. Immutable blueprints
//! live in [`crate::content`].

pub mod character;
pub mod event;
pub mod item;
pub mod location;
pub mod npc;
pub mod party;

pub use character::Character;
pub use event::WorldEvent;
pub use item::{InventoryEntry, ItemInstance, ItemOwner, ItemState};
pub use location::Location;
pub use npc::NpcInstance;
pub use party::Party;

use std::fmt::Display;
use std::hash::Hash;

use crate::ids::TenantId;

/// Implemented by every entity the engine caches and persists.
///
/// The associated id type keys the per-tenant cache; `KIND` names the entity
/// in logs and not-found errors.
pub trait WorldEntity: Clone + Send + Sync + 'static {
    type Id: Copy + Eq + Hash + Display + Send + Sync + 'static;

    const KIND: &'static str;

    fn id(&self) -> Self::Id;
    fn tenant(&self) -> &TenantId;
}
