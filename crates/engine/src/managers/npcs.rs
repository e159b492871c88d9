//! NPC instance manager.

use sqlx::{Row, SqlitePool, Transaction};
use tracing::warn;

use wayfarer_domain::{ActionState, EventId, LocationId, NpcId, NpcInstance, StatusEffect, TenantId};

use crate::error::StoreError;
use crate::store::{PendingFlush, TenantStore};

pub struct NpcManager {
    store: TenantStore<NpcInstance>,
}

impl Default for NpcManager {
    fn default() -> Self {
        Self::new()
    }
}

impl NpcManager {
    pub fn new() -> Self {
        Self {
            store: TenantStore::new(),
        }
    }

    pub async fn ensure_schema(pool: &SqlitePool) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS npcs (
                tenant_id TEXT NOT NULL,
                id TEXT NOT NULL,
                template_id TEXT NOT NULL,
                name TEXT NOT NULL,
                location_id TEXT,
                hp INTEGER NOT NULL,
                max_hp INTEGER NOT NULL,
                actions_json TEXT NOT NULL,
                status_effects_json TEXT NOT NULL,
                event_id TEXT,
                temporary INTEGER NOT NULL,
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

    pub fn spawn(&mut self, npc: NpcInstance) -> NpcId {
        let id = npc.id;
        self.store.insert(npc);
        id
    }

    pub fn get(&self, tenant: &TenantId, id: NpcId) -> Option<&NpcInstance> {
        self.store.get(tenant, id)
    }

    pub fn list(&self, tenant: &TenantId) -> Vec<&NpcInstance> {
        self.store.all(tenant)
    }

    pub fn ids(&self, tenant: &TenantId) -> Vec<NpcId> {
        self.store.ids(tenant)
    }

    pub fn update<R>(
        &mut self,
        tenant: &TenantId,
        id: NpcId,
        f: impl FnOnce(&mut NpcInstance) -> R,
    ) -> Option<R> {
        let result = f(self.store.get_mut(tenant, id)?);
        self.store.mark_dirty(tenant, id);
        Some(result)
    }

    pub fn remove(&mut self, tenant: &TenantId, id: NpcId) -> Option<NpcInstance> {
        let removed = self.store.remove(tenant, id);
        if removed.is_some() {
            self.store.mark_deleted(tenant, id);
        }
        removed
    }

    pub fn at_location(&self, tenant: &TenantId, location: LocationId) -> Vec<NpcId> {
        self.store
            .all(tenant)
            .into_iter()
            .filter(|n| n.location_id == Some(location))
            .map(|n| n.id)
            .collect()
    }

    /// Temporary NPCs minted by `event`, used by event teardown.
    pub fn spawned_by_event(&self, tenant: &TenantId, event: EventId) -> Vec<NpcId> {
        self.store
            .all(tenant)
            .into_iter()
            .filter(|n| n.temporary && n.event_id == Some(event))
            .map(|n| n.id)
            .collect()
    }

    // -------------------------------------------------------------------------
    // Persistence contract
    // -------------------------------------------------------------------------

    pub async fn load(&mut self, pool: &SqlitePool, tenant: &TenantId) -> Result<usize, StoreError> {
        let rows = sqlx::query("SELECT * FROM npcs WHERE tenant_id = ?")
            .bind(tenant.as_str())
            .fetch_all(pool)
            .await?;
        let count = rows.len();
        for row in rows {
            self.store.insert_clean(row_to_npc(tenant, &row)?);
        }
        Ok(count)
    }

    pub fn rebuild_caches(&mut self, _tenant: &TenantId) {
        // Location and event lookups scan the cache; no indices to rebuild.
    }

    pub async fn save(
        &self,
        tenant: &TenantId,
        tx: &mut Transaction<'_, sqlx::Sqlite>,
    ) -> Result<PendingFlush<NpcId>, StoreError> {
        let deleted = self.store.deleted_ids(tenant);
        for id in &deleted {
            sqlx::query("DELETE FROM npcs WHERE tenant_id = ? AND id = ?")
                .bind(tenant.as_str())
                .bind(id.to_string())
                .execute(&mut **tx)
                .await?;
        }

        let mut dirty = Vec::new();
        for id in self.store.dirty_ids(tenant) {
            let Some(npc) = self.store.get(tenant, id) else {
                warn!(tenant = %tenant, npc_id = %id, "Dirty NPC missing from cache");
                dirty.push(id);
                continue;
            };
            sqlx::query(
                r#"
                INSERT INTO npcs (
                    tenant_id, id, template_id, name, location_id, hp, max_hp,
                    actions_json, status_effects_json, event_id, temporary
                )
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(tenant_id, id) DO UPDATE SET
                    template_id = excluded.template_id,
                    name = excluded.name,
                    location_id = excluded.location_id,
                    hp = excluded.hp,
                    max_hp = excluded.max_hp,
                    actions_json = excluded.actions_json,
                    status_effects_json = excluded.status_effects_json,
                    event_id = excluded.event_id,
                    temporary = excluded.temporary
                "#,
            )
            .bind(tenant.as_str())
            .bind(id.to_string())
            .bind(&npc.template_id)
            .bind(&npc.name)
            .bind(npc.location_id.map(|l| l.to_string()))
            .bind(npc.hp)
            .bind(npc.max_hp)
            .bind(serde_json::to_string(&npc.actions)?)
            .bind(serde_json::to_string(&npc.status_effects)?)
            .bind(npc.event_id.map(|e| e.to_string()))
            .bind(npc.temporary)
            .execute(&mut **tx)
            .await?;
            dirty.push(id);
        }

        Ok(PendingFlush { dirty, deleted })
    }

    pub fn confirm_flush(&mut self, tenant: &TenantId, flush: &PendingFlush<NpcId>) {
        self.store.clear_flushed(tenant, &flush.dirty, &flush.deleted);
    }

    pub fn has_pending(&self, tenant: &TenantId) -> bool {
        self.store.has_pending(tenant)
    }

    pub fn evict(&mut self, tenant: &TenantId) {
        self.store.evict_tenant(tenant);
    }
}

fn row_to_npc(tenant: &TenantId, row: &sqlx::sqlite::SqliteRow) -> Result<NpcInstance, StoreError> {
    let id_text: String = row.get("id");
    let id = NpcId::parse(&id_text)
        .map_err(|e| StoreError::corrupt(format!("npc id '{id_text}': {e}")))?;

    let location_id = row
        .get::<Option<String>, _>("location_id")
        .map(|s| LocationId::parse(&s))
        .transpose()
        .map_err(|e| StoreError::corrupt(format!("npc location id: {e}")))?;
    let event_id = row
        .get::<Option<String>, _>("event_id")
        .map(|s| EventId::parse(&s))
        .transpose()
        .map_err(|e| StoreError::corrupt(format!("npc event id: {e}")))?;

    let actions: ActionState = serde_json::from_str(&row.get::<String, _>("actions_json"))?;
    let status_effects: Vec<StatusEffect> =
        serde_json::from_str(&row.get::<String, _>("status_effects_json"))?;

    Ok(NpcInstance {
        id,
        tenant: tenant.clone(),
        template_id: row.get("template_id"),
        name: row.get("name"),
        location_id,
        hp: row.get("hp"),
        max_hp: row.get("max_hp"),
        actions,
        status_effects,
        event_id,
        temporary: row.get("temporary"),
    })
}
