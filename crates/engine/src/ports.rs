//! Capability ports.
//!
//! Everything the simulation needs from the outside world comes through one
//! of these traits. Call sites invoke them unconditionally; optional
//! capabilities ship a null adapter that encodes "feature unavailable"
//! centrally instead of scattering presence checks.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use wayfarer_domain::{EffectResult, EventId, ItemTemplate, TenantId};
use wayfarer_shared::Notification;

use crate::error::EngineError;

// =============================================================================
// Rules
// =============================================================================

/// Rule-table math: durations, rolls, item effects, condition checks.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RulesPort: Send + Sync {
    /// Duration in world-seconds for an action type, when the rule tables
    /// know it. `None` falls back to the request hint, then the engine
    /// default.
    async fn calculate_duration(
        &self,
        action_type: &str,
        params: &serde_json::Value,
    ) -> Option<f64>;

    /// Resolves using an item (consumables, tools) into concrete effects.
    async fn resolve_item_use(
        &self,
        template: &ItemTemplate,
        user_stats: &HashMap<String, f64>,
    ) -> EffectResult;

    /// Outcome keyword for a completed action ("success", "failure", ...).
    async fn resolve_outcome(
        &self,
        action_type: &str,
        actor_stats: &HashMap<String, f64>,
    ) -> String;

    /// Evaluates named conditions against an event's state variables.
    async fn check_conditions(
        &self,
        conditions: &[String],
        variables: &HashMap<String, f64>,
    ) -> bool;
}

// =============================================================================
// Narrative
// =============================================================================

/// Flavor-text generation. Always optional: failures degrade narration,
/// never correctness.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait NarrativePort: Send + Sync {
    async fn generate(&self, system_prompt: &str, user_prompt: &str)
        -> Result<String, EngineError>;
}

// =============================================================================
// Notifier
// =============================================================================

/// Outbound push to the presentation layer (chat channel messages).
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait NotifierPort: Send + Sync {
    async fn notify(&self, notification: Notification) -> Result<(), EngineError>;
}

// =============================================================================
// Combat
// =============================================================================

/// A combat instance that finished during a round advance.
#[derive(Debug, Clone, PartialEq)]
pub struct FinishedCombat {
    pub combat_id: String,
    /// Set when the combat was started by an event.
    pub event_id: Option<EventId>,
    pub summary: String,
}

/// External combat resolution. The null adapter reports no combats and makes
/// every mutation a no-op.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CombatPort: Send + Sync {
    /// Advances all active combats for a tenant; returns the ones that ended.
    async fn advance_rounds(&self, tenant: &TenantId, delta: f64) -> Vec<FinishedCombat>;

    async fn end_combat(&self, tenant: &TenantId, combat_id: &str);

    /// Ends every combat linked to an event (event cleanup path).
    async fn end_combat_for_event(&self, tenant: &TenantId, event_id: EventId);

    /// Drops all combat state for a tenant (tenant unload).
    async fn clear_tenant(&self, tenant: &TenantId);
}

// =============================================================================
// Clock
// =============================================================================

#[cfg_attr(test, mockall::automock)]
pub trait ClockPort: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

// =============================================================================
// Bundle
// =============================================================================

/// The full port set threaded through commands, the tick and the stage
/// machine.
#[derive(Clone)]
pub struct Ports {
    pub rules: Arc<dyn RulesPort>,
    pub narrative: Arc<dyn NarrativePort>,
    pub notifier: Arc<dyn NotifierPort>,
    pub combat: Arc<dyn CombatPort>,
    pub clock: Arc<dyn ClockPort>,
}
