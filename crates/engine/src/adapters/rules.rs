//! Default rules adapter.
//!
//! Content-table-driven: durations come from the content library, item use
//! is resolved from template effects, and action outcomes are a weighted
//! roll against the actor's matching stat. A real rules system replaces this
//! adapter wholesale.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use rand::Rng;
use wayfarer_domain::{CompareOp, EffectResult, ItemEffect, ItemTemplate, StatusEffect};

use crate::content::ContentLibrary;
use crate::ports::RulesPort;

const BASE_SUCCESS_CHANCE: f64 = 0.5;
const STAT_WEIGHT: f64 = 0.05;

pub struct StaticRules {
    content: Arc<ContentLibrary>,
}

impl StaticRules {
    pub fn new(content: Arc<ContentLibrary>) -> Self {
        Self { content }
    }
}

#[async_trait]
impl RulesPort for StaticRules {
    async fn calculate_duration(
        &self,
        action_type: &str,
        _params: &serde_json::Value,
    ) -> Option<f64> {
        self.content.action_duration(action_type)
    }

    async fn resolve_item_use(
        &self,
        template: &ItemTemplate,
        _user_stats: &HashMap<String, f64>,
    ) -> EffectResult {
        let mut result = EffectResult {
            consumed: template.item_type == "consumable",
            ..EffectResult::default()
        };

        let mut parts = vec![format!("You use the {}.", template.name)];
        for effect in &template.effects {
            match effect {
                ItemEffect::Heal { amount } => {
                    result.hp_delta += amount;
                    parts.push(format!("Restores {amount} HP."));
                }
                ItemEffect::Damage { amount } => {
                    result.hp_delta -= amount;
                    parts.push(format!("Deals {amount} damage."));
                }
                ItemEffect::ApplyStatus { key, duration } => {
                    result.statuses.push(StatusEffect::new(key.clone(), *duration));
                    parts.push(format!("You are now {key}."));
                }
                // Stat bonuses apply while equipped, not on use.
                ItemEffect::StatBonus { .. } => {}
            }
        }
        result.message = parts.join(" ");
        result
    }

    async fn resolve_outcome(
        &self,
        action_type: &str,
        actor_stats: &HashMap<String, f64>,
    ) -> String {
        let relevant = actor_stats.get(action_type).copied().unwrap_or(0.0);
        let chance = (BASE_SUCCESS_CHANCE + relevant * STAT_WEIGHT).clamp(0.05, 0.95);
        if rand::thread_rng().gen::<f64>() < chance {
            "success".to_string()
        } else {
            "failure".to_string()
        }
    }

    async fn check_conditions(
        &self,
        conditions: &[String],
        variables: &HashMap<String, f64>,
    ) -> bool {
        conditions.iter().all(|condition| {
            match parse_condition(condition) {
                Some((name, op, value)) => variables
                    .get(name)
                    .is_some_and(|current| op.eval(*current, value)),
                // Unparseable conditions never hold.
                None => false,
            }
        })
    }
}

/// Parses `"morale >= 3"` into its parts. Two-character operators are
/// matched before their one-character prefixes.
fn parse_condition(condition: &str) -> Option<(&str, CompareOp, f64)> {
    for symbol in [">=", "<=", "==", "!=", ">", "<", "="] {
        if let Some(pos) = condition.find(symbol) {
            let name = condition[..pos].trim();
            let value = condition[pos + symbol.len()..].trim().parse::<f64>().ok()?;
            let op = CompareOp::from_str(symbol).ok()?;
            if name.is_empty() {
                return None;
            }
            return Some((name, op, value));
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support;

    #[tokio::test]
    async fn duration_comes_from_content_table() {
        let rules = StaticRules::new(test_support::content());
        assert_eq!(
            rules.calculate_duration("move", &serde_json::Value::Null).await,
            Some(5.0)
        );
        assert_eq!(
            rules
                .calculate_duration("unlisted", &serde_json::Value::Null)
                .await,
            None
        );
    }

    #[tokio::test]
    async fn potion_use_heals_and_consumes() {
        let rules = StaticRules::new(test_support::content());
        let library = test_support::content();
        let template = library.item("healing_potion").expect("template");

        let result = rules.resolve_item_use(template, &HashMap::new()).await;
        assert!(result.consumed);
        assert_eq!(result.hp_delta, 10);
        assert!(result.message.contains("Healing Potion"));
    }

    #[tokio::test]
    async fn outcome_is_a_known_keyword() {
        let rules = StaticRules::new(test_support::content());
        let outcome = rules.resolve_outcome("gather", &HashMap::new()).await;
        assert!(outcome == "success" || outcome == "failure");
    }

    #[test]
    fn parse_condition_handles_two_char_operators() {
        let (name, op, value) = parse_condition("morale >= 3").expect("parse");
        assert_eq!(name, "morale");
        assert_eq!(op, CompareOp::Ge);
        assert_eq!(value, 3.0);

        assert!(parse_condition(">= 3").is_none());
        assert!(parse_condition("morale > zebra").is_none());
    }

    #[tokio::test]
    async fn conditions_require_every_clause() {
        let rules = StaticRules::new(test_support::content());
        let variables = HashMap::from([("morale".to_string(), 4.0), ("gold".to_string(), 0.0)]);

        let all_hold = vec!["morale >= 3".to_string(), "gold == 0".to_string()];
        assert!(rules.check_conditions(&all_hold, &variables).await);

        let one_fails = vec!["morale >= 3".to_string(), "gold > 0".to_string()];
        assert!(!rules.check_conditions(&one_fails, &variables).await);

        let unknown_var = vec!["fame > 1".to_string()];
        assert!(!rules.check_conditions(&unknown_var, &variables).await);
    }
}
