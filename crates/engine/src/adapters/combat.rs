//! Null combat adapter.

use async_trait::async_trait;
use tracing::debug;
use wayfarer_domain::{EventId, TenantId};

use crate::ports::{CombatPort, FinishedCombat};

/// Wired when no combat system is attached: no combats ever run and every
/// mutation is a logged no-op.
#[derive(Debug, Clone, Default)]
pub struct NullCombat;

#[async_trait]
impl CombatPort for NullCombat {
    async fn advance_rounds(&self, _tenant: &TenantId, _delta: f64) -> Vec<FinishedCombat> {
        Vec::new()
    }

    async fn end_combat(&self, tenant: &TenantId, combat_id: &str) {
        debug!(%tenant, combat_id, "Combat capability not attached, end_combat ignored");
    }

    async fn end_combat_for_event(&self, tenant: &TenantId, event_id: EventId) {
        debug!(%tenant, %event_id, "Combat capability not attached, event cleanup ignored");
    }

    async fn clear_tenant(&self, tenant: &TenantId) {
        debug!(%tenant, "Combat capability not attached, clear_tenant ignored");
    }
}
