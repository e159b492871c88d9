//! Wayfarer Engine - the simulation backend behind a multi-tenant persistent
//! world.
//!
//! The engine owns all mutable world state in per-tenant caches, advances it
//! with a fixed-order tick, and writes back only what changed. External
//! concerns (chat front end, narrative generation, combat math, the database
//! driver) enter through ports with null adapters registered by default.
//!
//! Module map:
//! - [`store`] - generic dirty-tracking tenant cache
//! - [`managers`] - one manager per entity kind, each owning a store
//! - [`persistence`] - load/save/rebuild coordination over SQLite
//! - [`actions`] - duration-based action scheduling
//! - [`stages`] - event stage state machine
//! - [`tick`] - the world tick driver and its background loop
//! - [`commands`] - keyword -> handler registry executed on action completion
//! - [`service`] - the facade embedding applications call

pub mod actions;
pub mod adapters;
pub mod commands;
pub mod composition;
pub mod config;
pub mod content;
pub mod error;
pub mod managers;
pub mod persistence;
pub mod ports;
pub mod run;
pub mod service;
pub mod stages;
pub mod state;
pub mod store;
pub mod tick;

#[cfg(test)]
pub(crate) mod test_support;

pub use config::AppConfig;
pub use error::{EngineError, StoreError};
pub use service::WorldService;
