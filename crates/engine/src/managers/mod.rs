//! Per-entity managers.
//!
//! Each manager pairs a [`TenantStore`](crate::store::TenantStore) with the
//! SQLite rows for its entity kind and exposes the same persistence contract:
//!
//! - `ensure_schema` creates the table if missing.
//! - `load` reads every row for a tenant into the cache without dirtying it.
//! - `rebuild_caches` derives secondary indices from the loaded entities.
//! - `save` writes deleted rows first, then upserts dirty ones, inside the
//!   coordinator's transaction, and returns the ids it processed.
//! - `confirm_flush` clears exactly those ids after the commit succeeds.
//!
//! Mutations go through each manager's `update` closure so the dirty flag can
//! never be forgotten; managers with secondary indices add dedicated movers
//! (`ItemManager::move_owner`, for one) that keep index pairing atomic.

pub mod characters;
pub mod clocks;
pub mod events;
pub mod items;
pub mod locations;
pub mod npcs;
pub mod parties;

pub use characters::CharacterManager;
pub use clocks::ClockManager;
pub use events::EventManager;
pub use items::ItemManager;
pub use locations::LocationManager;
pub use npcs::NpcManager;
pub use parties::PartyManager;
