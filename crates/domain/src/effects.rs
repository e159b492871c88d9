//! Status effects, item effects and crafting jobs.
//!
//! Status effects are timed modifiers attached to a character or NPC. They
//! expire by world-seconds and may carry a periodic component (damage or
//! healing applied on a fixed cadence). Item effects describe what consuming
//! or wielding an item does; the rules capability resolves them into an
//! [`EffectResult`].

use serde::{Deserialize, Serialize};

use crate::ids::EventId;

// ============================================================================
// Status effects
// ============================================================================

/// What a periodic component does on each application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PeriodicKind {
    Damage,
    Heal,
}

/// Repeating tick payload inside a status effect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeriodicEffect {
    pub kind: PeriodicKind,
    /// Hit points applied per application.
    pub amount: i32,
    /// World-seconds between applications.
    pub every: f64,
    /// World-seconds accumulated since the last application.
    #[serde(default)]
    pub accrued: f64,
}

impl PeriodicEffect {
    /// Advances the accrual clock and returns how many applications are due.
    pub fn advance(&mut self, delta: f64) -> u32 {
        if self.every <= 0.0 {
            return 0;
        }
        self.accrued += delta;
        let due = (self.accrued / self.every).floor() as u32;
        self.accrued -= f64::from(due) * self.every;
        due
    }
}

/// A timed modifier on a character or NPC.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusEffect {
    /// Effect keyword (e.g., "poisoned", "blessed"). Not unique per actor;
    /// the same key may be stacked by different sources.
    pub key: String,
    /// World-seconds until expiry.
    pub remaining: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub periodic: Option<PeriodicEffect>,
    /// Event that applied this effect, when event cleanup should remove it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_event: Option<EventId>,
}

impl StatusEffect {
    pub fn new(key: impl Into<String>, remaining: f64) -> Self {
        Self {
            key: key.into(),
            remaining,
            periodic: None,
            source_event: None,
        }
    }

    pub fn with_periodic(mut self, periodic: PeriodicEffect) -> Self {
        self.periodic = Some(periodic);
        self
    }

    pub fn from_event(mut self, event: EventId) -> Self {
        self.source_event = Some(event);
        self
    }

    pub fn is_expired(&self) -> bool {
        self.remaining <= 0.0
    }
}

// ============================================================================
// Item effects
// ============================================================================

/// Declarative effect carried by an item template or instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ItemEffect {
    Heal { amount: i32 },
    Damage { amount: i32 },
    ApplyStatus { key: String, duration: f64 },
    StatBonus { stat: String, amount: f64 },
}

/// Outcome of resolving an item use against its effects.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EffectResult {
    /// Whether one unit of the item was consumed.
    pub consumed: bool,
    /// Net hit-point change for the user (positive heals).
    pub hp_delta: i32,
    /// Status effects to attach to the user.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub statuses: Vec<StatusEffect>,
    /// Human-readable summary for the requesting layer.
    pub message: String,
}

// ============================================================================
// Crafting
// ============================================================================

/// A queued or in-progress crafting job on a character.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CraftingJob {
    /// Recipe keyword resolved by content at completion time.
    pub recipe: String,
    /// World-seconds accumulated. Only the head of the queue advances.
    #[serde(default)]
    pub progress: f64,
    /// World-seconds required per unit.
    pub duration: f64,
    /// Units still to produce.
    pub quantity: f64,
}

impl CraftingJob {
    pub fn new(recipe: impl Into<String>, duration: f64, quantity: f64) -> Self {
        Self {
            recipe: recipe.into(),
            progress: 0.0,
            duration,
            quantity,
        }
    }

    pub fn unit_complete(&self) -> bool {
        self.progress >= self.duration
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_periodic_advance_counts_whole_applications() {
        let mut periodic = PeriodicEffect {
            kind: PeriodicKind::Damage,
            amount: 2,
            every: 3.0,
            accrued: 0.0,
        };
        assert_eq!(periodic.advance(2.0), 0);
        assert_eq!(periodic.advance(2.0), 1);
        assert!((periodic.accrued - 1.0).abs() < 1e-9);
        assert_eq!(periodic.advance(9.0), 3);
    }

    #[test]
    fn test_periodic_advance_ignores_non_positive_cadence() {
        let mut periodic = PeriodicEffect {
            kind: PeriodicKind::Heal,
            amount: 1,
            every: 0.0,
            accrued: 0.0,
        };
        assert_eq!(periodic.advance(10.0), 0);
    }

    #[test]
    fn test_status_effect_expiry() {
        let mut effect = StatusEffect::new("poisoned", 1.5);
        assert!(!effect.is_expired());
        effect.remaining -= 1.5;
        assert!(effect.is_expired());
    }

    #[test]
    fn test_item_effect_tagged_json_shape() {
        let effect = ItemEffect::ApplyStatus {
            key: "blessed".to_string(),
            duration: 30.0,
        };
        let json = serde_json::to_value(&effect).expect("serialize");
        assert_eq!(json["type"], "apply_status");
        assert_eq!(json["key"], "blessed");
    }
}
