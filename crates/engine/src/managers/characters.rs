//! Player character manager.

use std::collections::HashMap;

use sqlx::{Row, SqlitePool, Transaction};
use tracing::warn;

use wayfarer_domain::{
    ActionState, Character, CharacterId, CraftingJob, LocationId, PartyId, StatusEffect, TenantId,
};

use crate::error::StoreError;
use crate::store::{PendingFlush, TenantStore};

pub struct CharacterManager {
    store: TenantStore<Character>,
}

impl Default for CharacterManager {
    fn default() -> Self {
        Self::new()
    }
}

impl CharacterManager {
    pub fn new() -> Self {
        Self {
            store: TenantStore::new(),
        }
    }

    pub async fn ensure_schema(pool: &SqlitePool) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS characters (
                tenant_id TEXT NOT NULL,
                id TEXT NOT NULL,
                name TEXT NOT NULL,
                location_id TEXT,
                hp INTEGER NOT NULL,
                max_hp INTEGER NOT NULL,
                stats_json TEXT NOT NULL,
                actions_json TEXT NOT NULL,
                status_effects_json TEXT NOT NULL,
                crafting_json TEXT NOT NULL,
                party_id TEXT,
                PRIMARY KEY (tenant_id, id)
            )
            "#,
        )
        .execute(pool)
        .await?;
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Cache operations
    // -------------------------------------------------------------------------

    pub fn create(&mut self, character: Character) -> CharacterId {
        let id = character.id;
        self.store.insert(character);
        id
    }

    pub fn get(&self, tenant: &TenantId, id: CharacterId) -> Option<&Character> {
        self.store.get(tenant, id)
    }

    pub fn list(&self, tenant: &TenantId) -> Vec<&Character> {
        self.store.all(tenant)
    }

    pub fn ids(&self, tenant: &TenantId) -> Vec<CharacterId> {
        self.store.ids(tenant)
    }

    pub fn contains(&self, tenant: &TenantId, id: CharacterId) -> bool {
        self.store.contains(tenant, id)
    }

    /// Apply a mutation and mark the character dirty. Returns the closure's
    /// result, or `None` when the id is not cached.
    pub fn update<R>(
        &mut self,
        tenant: &TenantId,
        id: CharacterId,
        f: impl FnOnce(&mut Character) -> R,
    ) -> Option<R> {
        let result = f(self.store.get_mut(tenant, id)?);
        self.store.mark_dirty(tenant, id);
        Some(result)
    }

    pub fn remove(&mut self, tenant: &TenantId, id: CharacterId) -> Option<Character> {
        let removed = self.store.remove(tenant, id);
        if removed.is_some() {
            self.store.mark_deleted(tenant, id);
        }
        removed
    }

    /// Overwrite the derived stat cache. Does not dirty the character; the
    /// derived map is never persisted.
    pub fn set_effective_stats(
        &mut self,
        tenant: &TenantId,
        id: CharacterId,
        stats: HashMap<String, f64>,
    ) {
        if let Some(character) = self.store.get_mut(tenant, id) {
            character.effective_stats = stats;
        }
    }

    // -------------------------------------------------------------------------
    // Persistence contract
    // -------------------------------------------------------------------------

    pub async fn load(&mut self, pool: &SqlitePool, tenant: &TenantId) -> Result<usize, StoreError> {
        let rows = sqlx::query("SELECT * FROM characters WHERE tenant_id = ?")
            .bind(tenant.as_str())
            .fetch_all(pool)
            .await?;
        let count = rows.len();
        for row in rows {
            self.store.insert_clean(row_to_character(tenant, &row)?);
        }
        Ok(count)
    }

    pub fn rebuild_caches(&mut self, _tenant: &TenantId) {
        // No secondary indices for characters.
    }

    pub async fn save(
        &self,
        tenant: &TenantId,
        tx: &mut Transaction<'_, sqlx::Sqlite>,
    ) -> Result<PendingFlush<CharacterId>, StoreError> {
        let deleted = self.store.deleted_ids(tenant);
        for id in &deleted {
            sqlx::query("DELETE FROM characters WHERE tenant_id = ? AND id = ?")
                .bind(tenant.as_str())
                .bind(id.to_string())
                .execute(&mut **tx)
                .await?;
        }

        let mut dirty = Vec::new();
        for id in self.store.dirty_ids(tenant) {
            let Some(character) = self.store.get(tenant, id) else {
                // Nothing to write; confirm so the stale flag clears.
                warn!(tenant = %tenant, character_id = %id, "Dirty character missing from cache");
                dirty.push(id);
                continue;
            };
            sqlx::query(
                r#"
                INSERT INTO characters (
                    tenant_id, id, name, location_id, hp, max_hp,
                    stats_json, actions_json,
                    status_effects_json, crafting_json, party_id
                )
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(tenant_id, id) DO UPDATE SET
                    name = excluded.name,
                    location_id = excluded.location_id,
                    hp = excluded.hp,
                    max_hp = excluded.max_hp,
                    stats_json = excluded.stats_json,
                    actions_json = excluded.actions_json,
                    status_effects_json = excluded.status_effects_json,
                    crafting_json = excluded.crafting_json,
                    party_id = excluded.party_id
                "#,
            )
            .bind(tenant.as_str())
            .bind(id.to_string())
            .bind(&character.name)
            .bind(character.location_id.map(|l| l.to_string()))
            .bind(character.hp)
            .bind(character.max_hp)
            .bind(serde_json::to_string(&character.base_stats)?)
            .bind(serde_json::to_string(&character.actions)?)
            .bind(serde_json::to_string(&character.status_effects)?)
            .bind(serde_json::to_string(&character.crafting)?)
            .bind(character.party_id.map(|p| p.to_string()))
            .execute(&mut **tx)
            .await?;
            dirty.push(id);
        }

        Ok(PendingFlush { dirty, deleted })
    }

    pub fn confirm_flush(&mut self, tenant: &TenantId, flush: &PendingFlush<CharacterId>) {
        self.store.clear_flushed(tenant, &flush.dirty, &flush.deleted);
    }

    pub fn has_pending(&self, tenant: &TenantId) -> bool {
        self.store.has_pending(tenant)
    }

    pub fn evict(&mut self, tenant: &TenantId) {
        self.store.evict_tenant(tenant);
    }
}

fn row_to_character(tenant: &TenantId, row: &sqlx::sqlite::SqliteRow) -> Result<Character, StoreError> {
    let id_text: String = row.get("id");
    let id = CharacterId::parse(&id_text)
        .map_err(|e| StoreError::corrupt(format!("character id '{id_text}': {e}")))?;

    let location_id = row
        .get::<Option<String>, _>("location_id")
        .map(|s| LocationId::parse(&s))
        .transpose()
        .map_err(|e| StoreError::corrupt(format!("character location id: {e}")))?;
    let party_id = row
        .get::<Option<String>, _>("party_id")
        .map(|s| PartyId::parse(&s))
        .transpose()
        .map_err(|e| StoreError::corrupt(format!("character party id: {e}")))?;

    let base_stats: HashMap<String, f64> = serde_json::from_str(&row.get::<String, _>("stats_json"))?;
    let actions: ActionState = serde_json::from_str(&row.get::<String, _>("actions_json"))?;
    let status_effects: Vec<StatusEffect> =
        serde_json::from_str(&row.get::<String, _>("status_effects_json"))?;
    let crafting: Vec<CraftingJob> =
        serde_json::from_str(&row.get::<String, _>("crafting_json"))?;

    Ok(Character {
        id,
        tenant: tenant.clone(),
        name: row.get("name"),
        location_id,
        hp: row.get("hp"),
        max_hp: row.get("max_hp"),
        base_stats,
        effective_stats: HashMap::new(),
        actions,
        status_effects,
        crafting,
        party_id,
    })
}
