//! Event stage machine vocabulary.
//!
//! An event is always in exactly one stage. Stages declare which commands are
//! allowed while the stage is current, where each command leads
//! ([`StageOutcome`]), automatic transitions evaluated every tick
//! ([`AutoTransitionRule`]), and side effects applied on entry ([`OnEnter`]).
//!
//! The reserved stage id [`EVENT_END_STAGE`] is terminal: entering it ends
//! the event.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// Reserved terminal stage id.
pub const EVENT_END_STAGE: &str = "event_end";

// ============================================================================
// Comparisons
// ============================================================================

/// Comparison operator used by state-variable transition rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompareOp {
    Lt,
    Le,
    Eq,
    Gt,
    Ge,
    Ne,
}

impl CompareOp {
    pub fn eval(self, lhs: f64, rhs: f64) -> bool {
        match self {
            Self::Lt => lhs < rhs,
            Self::Le => lhs <= rhs,
            Self::Eq => lhs == rhs,
            Self::Gt => lhs > rhs,
            Self::Ge => lhs >= rhs,
            Self::Ne => lhs != rhs,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Eq => "==",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::Ne => "!=",
        }
    }
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

impl FromStr for CompareOp {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "<" => Ok(Self::Lt),
            "<=" => Ok(Self::Le),
            "==" | "=" => Ok(Self::Eq),
            ">" => Ok(Self::Gt),
            ">=" => Ok(Self::Ge),
            "!=" => Ok(Self::Ne),
            other => Err(DomainError::parse(format!(
                "unknown comparison operator: {other}"
            ))),
        }
    }
}

// ============================================================================
// Automatic transitions
// ============================================================================

/// A rule the tick evaluates against a live event. Rules are checked in
/// declaration order; the first match wins for that tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AutoTransitionRule {
    /// Fires once the named stage timer reaches the threshold.
    TimeElapsed {
        /// Timer name in the event's timer map. Timers reset on stage entry.
        timer: String,
        /// World-seconds the timer must reach.
        threshold: f64,
        target_stage: String,
    },
    /// Fires once a state variable compares true against a constant.
    StateVariableThreshold {
        variable: String,
        op: CompareOp,
        value: f64,
        target_stage: String,
    },
}

impl AutoTransitionRule {
    pub fn target_stage(&self) -> &str {
        match self {
            Self::TimeElapsed { target_stage, .. }
            | Self::StateVariableThreshold { target_stage, .. } => target_stage,
        }
    }
}

// ============================================================================
// Manual transitions
// ============================================================================

/// Where a command leads when executed in a stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StageOutcome {
    /// Single destination regardless of how the command resolved.
    Always(String),
    /// Destination chosen by the command's outcome keyword (e.g., "success",
    /// "failure"). A missing key means the event stays in the current stage.
    ByOutcome(HashMap<String, String>),
}

impl StageOutcome {
    /// Resolves the destination for an outcome keyword.
    pub fn destination(&self, outcome: &str) -> Option<&str> {
        match self {
            Self::Always(stage) => Some(stage),
            Self::ByOutcome(map) => map.get(outcome).map(String::as_str),
        }
    }
}

/// A command made available by a stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageAction {
    /// Command keyword looked up in the command registry.
    pub command: String,
    pub outcome: StageOutcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

// ============================================================================
// Entry side effects
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NpcSpawn {
    /// NPC template key in the content library.
    pub template: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name_override: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemSpawn {
    /// Item template key in the content library.
    pub template: String,
    #[serde(default = "default_spawn_quantity")]
    pub quantity: f64,
}

fn default_spawn_quantity() -> f64 {
    1.0
}

/// Side effects applied exactly once when an event enters a stage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OnEnter {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub spawn_npcs: Vec<NpcSpawn>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub spawn_items: Vec<ItemSpawn>,
    /// Prompt handed to the narrative capability, when one is wired.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub narrative_prompt: Option<String>,
}

impl OnEnter {
    pub fn is_empty(&self) -> bool {
        self.spawn_npcs.is_empty() && self.spawn_items.is_empty() && self.narrative_prompt.is_none()
    }
}

// ============================================================================
// Stage definition
// ============================================================================

/// Full definition of one stage within an event template.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StageDefinition {
    /// Commands usable while this stage is current, keyed by the player-facing
    /// action keyword.
    #[serde(default)]
    pub allowed_actions: HashMap<String, StageAction>,
    /// Evaluated in declaration order every tick; first match wins.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub auto_transitions: Vec<AutoTransitionRule>,
    #[serde(default, skip_serializing_if = "OnEnter::is_empty")]
    pub on_enter: OnEnter,
}

impl StageDefinition {
    pub fn action(&self, keyword: &str) -> Option<&StageAction> {
        self.allowed_actions.get(keyword)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compare_op_eval() {
        assert!(CompareOp::Lt.eval(1.0, 2.0));
        assert!(CompareOp::Le.eval(2.0, 2.0));
        assert!(CompareOp::Eq.eval(3.0, 3.0));
        assert!(CompareOp::Gt.eval(4.0, 3.0));
        assert!(CompareOp::Ge.eval(3.0, 3.0));
        assert!(CompareOp::Ne.eval(1.0, 2.0));
        assert!(!CompareOp::Eq.eval(1.0, 2.0));
    }

    #[test]
    fn test_compare_op_parses_symbols() {
        assert_eq!("<".parse::<CompareOp>().expect("parse"), CompareOp::Lt);
        assert_eq!(">=".parse::<CompareOp>().expect("parse"), CompareOp::Ge);
        assert!("<>".parse::<CompareOp>().is_err());
    }

    #[test]
    fn test_auto_transition_rules_deserialize_tagged() {
        let json = serde_json::json!([
            {"type": "time_elapsed", "timer": "stage_timer", "threshold": 120.0,
             "target_stage": "ambush"},
            {"type": "state_variable_threshold", "variable": "morale", "op": "le",
             "value": 0.0, "target_stage": "event_end"},
        ]);
        let rules: Vec<AutoTransitionRule> =
            serde_json::from_value(json).expect("deserialize rules");
        assert_eq!(rules.len(), 2);
        assert_eq!(rules[0].target_stage(), "ambush");
        assert_eq!(rules[1].target_stage(), EVENT_END_STAGE);
    }

    #[test]
    fn test_stage_outcome_untagged_forms() {
        let always: StageOutcome =
            serde_json::from_value(serde_json::json!("camp")).expect("always form");
        assert_eq!(always.destination("anything"), Some("camp"));

        let by_outcome: StageOutcome = serde_json::from_value(
            serde_json::json!({"success": "treasure_room", "failure": "event_end"}),
        )
        .expect("map form");
        assert_eq!(by_outcome.destination("success"), Some("treasure_room"));
        assert_eq!(by_outcome.destination("draw"), None);
    }

    #[test]
    fn test_stage_definition_defaults_to_empty() {
        let stage: StageDefinition = serde_json::from_value(serde_json::json!({}))
            .expect("empty stage");
        assert!(stage.allowed_actions.is_empty());
        assert!(stage.auto_transitions.is_empty());
        assert!(stage.on_enter.is_empty());
    }
}
