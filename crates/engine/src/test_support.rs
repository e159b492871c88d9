//! Shared fixtures for the engine test suite.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use wayfarer_domain::{EffectResult, EquipSlotDef, ItemEffect, ItemTemplate, NpcTemplate};

use crate::adapters::{NullCombat, NullNarrative, NullNotifier, StaticRules, SystemClock};
use crate::content::ContentLibrary;
use crate::ports::{Ports, RulesPort};

/// A small content library shared across test modules: a potion, a sword,
/// one slot per item type and a couple of action durations.
pub(crate) fn content() -> Arc<ContentLibrary> {
    let items = vec![
        ItemTemplate {
            key: "healing_potion".to_string(),
            name: "Healing Potion".to_string(),
            item_type: "consumable".to_string(),
            effects: vec![ItemEffect::Heal { amount: 10 }],
            stackable: true,
            description: None,
        },
        ItemTemplate {
            key: "iron_sword".to_string(),
            name: "Iron Sword".to_string(),
            item_type: "weapon".to_string(),
            effects: vec![ItemEffect::StatBonus {
                stat: "strength".to_string(),
                amount: 2.0,
            }],
            stackable: false,
            description: None,
        },
    ];
    let npcs = vec![NpcTemplate {
        key: "bandit".to_string(),
        name: "Bandit".to_string(),
        max_hp: 8,
        stats: HashMap::from([("strength".to_string(), 2.0)]),
        description: None,
    }];
    let equip_slots = vec![
        EquipSlotDef {
            id: "main_hand".to_string(),
            compatible_types: vec!["weapon".to_string()],
        },
        EquipSlotDef {
            id: "finger".to_string(),
            compatible_types: vec!["accessory".to_string()],
        },
    ];
    let action_durations =
        HashMap::from([("move".to_string(), 5.0), ("rest".to_string(), 10.0)]);

    let library =
        ContentLibrary::from_parts(items, npcs, Vec::new(), equip_slots, action_durations)
            .expect("fixture content is valid");
    Arc::new(library)
}

pub(crate) fn ports() -> Ports {
    ports_with_rules(Arc::new(StaticRules::new(content())))
}

pub(crate) fn ports_with_rules(rules: Arc<dyn RulesPort>) -> Ports {
    Ports {
        rules,
        narrative: Arc::new(NullNarrative),
        notifier: Arc::new(NullNotifier),
        combat: Arc::new(NullCombat),
        clock: Arc::new(SystemClock),
    }
}

/// Rules that never roll dice: every outcome is "success". Durations, item
/// use and conditions still behave like [`StaticRules`].
pub(crate) fn always_success_rules() -> Arc<dyn RulesPort> {
    Arc::new(AlwaysSucceeds {
        inner: StaticRules::new(content()),
    })
}

struct AlwaysSucceeds {
    inner: StaticRules,
}

#[async_trait]
impl RulesPort for AlwaysSucceeds {
    async fn calculate_duration(
        &self,
        action_type: &str,
        params: &serde_json::Value,
    ) -> Option<f64> {
        self.inner.calculate_duration(action_type, params).await
    }

    async fn resolve_item_use(
        &self,
        template: &ItemTemplate,
        user_stats: &HashMap<String, f64>,
    ) -> EffectResult {
        self.inner.resolve_item_use(template, user_stats).await
    }

    async fn resolve_outcome(&self, _action_type: &str, _stats: &HashMap<String, f64>) -> String {
        "success".to_string()
    }

    async fn check_conditions(
        &self,
        conditions: &[String],
        variables: &HashMap<String, f64>,
    ) -> bool {
        self.inner.check_conditions(conditions, variables).await
    }
}
