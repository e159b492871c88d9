//! Aggregate simulation state for all loaded tenants.
//!
//! One [`WorldState`] sits behind `Arc<tokio::sync::RwLock<..>>` in the
//! service. The tick loop holds the write guard for a whole pass; command
//! handling takes it per operation. Nothing else mutates the managers, so
//! between await points every cache mutation is atomic.

use std::collections::HashMap;
use std::sync::Arc;

use wayfarer_domain::{CharacterId, InventoryEntry, ItemEffect, TenantId};

use crate::content::ContentLibrary;
use crate::managers::{
    CharacterManager, ClockManager, EventManager, ItemManager, LocationManager, NpcManager,
    PartyManager,
};

pub struct WorldState {
    pub characters: CharacterManager,
    pub items: ItemManager,
    pub events: EventManager,
    pub npcs: NpcManager,
    pub parties: PartyManager,
    pub locations: LocationManager,
    pub clocks: ClockManager,
    pub content: Arc<ContentLibrary>,
    /// Tenants fully loaded from storage, in registration order. The tick
    /// loop iterates this order within a pass.
    loaded: Vec<TenantId>,
    /// World-seconds accumulated since each tenant's last periodic save.
    save_accumulator: HashMap<TenantId, f64>,
}

impl WorldState {
    pub fn new(content: Arc<ContentLibrary>) -> Self {
        Self {
            characters: CharacterManager::new(),
            items: ItemManager::new(),
            events: EventManager::new(),
            npcs: NpcManager::new(),
            parties: PartyManager::new(),
            locations: LocationManager::new(),
            clocks: ClockManager::new(),
            content,
            loaded: Vec::new(),
            save_accumulator: HashMap::new(),
        }
    }

    // -------------------------------------------------------------------------
    // Loaded-tenant registry
    // -------------------------------------------------------------------------

    pub fn is_loaded(&self, tenant: &TenantId) -> bool {
        self.loaded.contains(tenant)
    }

    pub fn loaded_tenants(&self) -> Vec<TenantId> {
        self.loaded.clone()
    }

    pub fn register_loaded(&mut self, tenant: &TenantId) {
        if !self.is_loaded(tenant) {
            self.loaded.push(tenant.clone());
        }
    }

    pub fn unregister_loaded(&mut self, tenant: &TenantId) {
        self.loaded.retain(|t| t != tenant);
        self.save_accumulator.remove(tenant);
    }

    /// Add tick time toward the tenant's next periodic save and return the
    /// running total.
    pub fn accumulate_save_time(&mut self, tenant: &TenantId, delta: f64) -> f64 {
        let total = self.save_accumulator.entry(tenant.clone()).or_insert(0.0);
        *total += delta;
        *total
    }

    pub fn reset_save_accumulator(&mut self, tenant: &TenantId) {
        self.save_accumulator.insert(tenant.clone(), 0.0);
    }

    // -------------------------------------------------------------------------
    // Derived character state
    // -------------------------------------------------------------------------

    /// Rebuild a character's effective stats: base stats plus every
    /// `StatBonus` carried by currently equipped items (template effects and
    /// per-instance extras).
    pub fn recompute_effective_stats(&mut self, tenant: &TenantId, character_id: CharacterId) {
        let Some(character) = self.characters.get(tenant, character_id) else {
            return;
        };
        let mut stats = character.base_stats.clone();

        for item_id in self.items.character_items(tenant, character_id) {
            let Some(item) = self.items.get(tenant, item_id) else {
                continue;
            };
            if !item.is_equipped() {
                continue;
            }
            let template_effects = self
                .content
                .item(&item.template_id)
                .map(|t| t.effects.as_slice())
                .unwrap_or_default();
            for effect in template_effects.iter().chain(item.state.effects.iter()) {
                if let ItemEffect::StatBonus { stat, amount } = effect {
                    *stats.entry(stat.clone()).or_insert(0.0) += amount;
                }
            }
        }

        self.characters.set_effective_stats(tenant, character_id, stats);
    }

    pub fn recompute_all_effective_stats(&mut self, tenant: &TenantId) {
        for id in self.characters.ids(tenant) {
            self.recompute_effective_stats(tenant, id);
        }
    }

    /// Inventory projection for display: item instances resolved against
    /// their templates for names.
    pub fn inventory(&self, tenant: &TenantId, character_id: CharacterId) -> Vec<InventoryEntry> {
        self.items
            .character_items(tenant, character_id)
            .into_iter()
            .filter_map(|item_id| {
                let item = self.items.get(tenant, item_id)?;
                let name = self
                    .content
                    .item(&item.template_id)
                    .map(|t| t.name.clone())
                    .unwrap_or_else(|| item.template_id.clone());
                Some(InventoryEntry {
                    item_id,
                    template_id: item.template_id.clone(),
                    name,
                    quantity: item.quantity,
                    equipped: item.is_equipped(),
                    slot: item.state.slot.clone(),
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wayfarer_domain::{Character, ItemInstance, ItemOwner, ItemTemplate};

    fn content_with_ring() -> Arc<ContentLibrary> {
        let ring = ItemTemplate {
            key: "iron_ring".into(),
            name: "Iron Ring".into(),
            item_type: "accessory".into(),
            effects: vec![ItemEffect::StatBonus {
                stat: "strength".into(),
                amount: 2.0,
            }],
            stackable: false,
            description: None,
        };
        Arc::new(
            ContentLibrary::from_parts(vec![ring], Vec::new(), Vec::new(), Vec::new(), HashMap::new())
                .expect("content"),
        )
    }

    #[test]
    fn equipped_stat_bonus_lands_in_effective_stats() {
        let tenant = TenantId::new("guild-1");
        let mut state = WorldState::new(content_with_ring());

        let hero = state
            .characters
            .create(Character::new(tenant.clone(), "Mira").with_stat("strength", 10.0));
        let ring = state.items.grant(
            ItemInstance::new(tenant.clone(), "iron_ring", ItemOwner::Character(hero)),
            false,
        );

        state.recompute_effective_stats(&tenant, hero);
        let value = state
            .characters
            .get(&tenant, hero)
            .expect("hero")
            .effective_stat("strength");
        assert_eq!(value, Some(10.0));

        state.items.update(&tenant, ring, |i| i.equip("finger"));
        state.recompute_effective_stats(&tenant, hero);
        let value = state
            .characters
            .get(&tenant, hero)
            .expect("hero")
            .effective_stat("strength");
        assert_eq!(value, Some(12.0));
    }

    #[test]
    fn inventory_projection_resolves_template_names() {
        let tenant = TenantId::new("guild-1");
        let mut state = WorldState::new(content_with_ring());

        let hero = state.characters.create(Character::new(tenant.clone(), "Mira"));
        state.items.grant(
            ItemInstance::new(tenant.clone(), "iron_ring", ItemOwner::Character(hero)),
            false,
        );
        state.items.grant(
            ItemInstance::new(tenant.clone(), "mystery_orb", ItemOwner::Character(hero)),
            false,
        );

        let mut names: Vec<String> = state
            .inventory(&tenant, hero)
            .into_iter()
            .map(|e| e.name)
            .collect();
        names.sort();
        assert_eq!(names, vec!["Iron Ring".to_string(), "mystery_orb".to_string()]);
    }

    #[test]
    fn save_accumulator_tracks_per_tenant() {
        let tenant = TenantId::new("guild-1");
        let other = TenantId::new("guild-2");
        let mut state = WorldState::new(content_with_ring());

        assert_eq!(state.accumulate_save_time(&tenant, 10.0), 10.0);
        assert_eq!(state.accumulate_save_time(&tenant, 5.0), 15.0);
        assert_eq!(state.accumulate_save_time(&other, 1.0), 1.0);

        state.reset_save_accumulator(&tenant);
        assert_eq!(state.accumulate_save_time(&tenant, 2.0), 2.0);
        assert_eq!(state.accumulate_save_time(&other, 1.0), 2.0);
    }
}
