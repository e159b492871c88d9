//! Party manager.

use sqlx::{Row, SqlitePool, Transaction};
use tracing::warn;

use wayfarer_domain::{ActionState, CharacterId, LocationId, Party, PartyId, TenantId};

use crate::error::StoreError;
use crate::store::{PendingFlush, TenantStore};

pub struct PartyManager {
    store: TenantStore<Party>,
}

impl Default for PartyManager {
    fn default() -> Self {
        Self::new()
    }
}

impl PartyManager {
    pub fn new() -> Self {
        Self {
            store: TenantStore::new(),
        }
    }

    pub async fn ensure_schema(pool: &SqlitePool) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS parties (
                tenant_id TEXT NOT NULL,
                id TEXT NOT NULL,
                name TEXT NOT NULL,
                leader_id TEXT NOT NULL,
                members_json TEXT NOT NULL,
                location_id TEXT,
                actions_json TEXT NOT NULL,
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

    pub fn create(&mut self, party: Party) -> PartyId {
        let id = party.id;
        self.store.insert(party);
        id
    }

    pub fn get(&self, tenant: &TenantId, id: PartyId) -> Option<&Party> {
        self.store.get(tenant, id)
    }

    pub fn list(&self, tenant: &TenantId) -> Vec<&Party> {
        self.store.all(tenant)
    }

    pub fn ids(&self, tenant: &TenantId) -> Vec<PartyId> {
        self.store.ids(tenant)
    }

    pub fn update<R>(
        &mut self,
        tenant: &TenantId,
        id: PartyId,
        f: impl FnOnce(&mut Party) -> R,
    ) -> Option<R> {
        let result = f(self.store.get_mut(tenant, id)?);
        self.store.mark_dirty(tenant, id);
        Some(result)
    }

    pub fn remove(&mut self, tenant: &TenantId, id: PartyId) -> Option<Party> {
        let removed = self.store.remove(tenant, id);
        if removed.is_some() {
            self.store.mark_deleted(tenant, id);
        }
        removed
    }

    /// Whether the party a character belongs to is mid-action. Characters
    /// without a party are never party-blocked.
    pub fn is_character_party_busy(&self, tenant: &TenantId, party_id: Option<PartyId>) -> bool {
        party_id
            .and_then(|id| self.store.get(tenant, id))
            .is_some_and(|p| p.actions.is_busy())
    }

    // -------------------------------------------------------------------------
    // Persistence contract
    // -------------------------------------------------------------------------

    pub async fn load(&mut self, pool: &SqlitePool, tenant: &TenantId) -> Result<usize, StoreError> {
        let rows = sqlx::query("SELECT * FROM parties WHERE tenant_id = ?")
            .bind(tenant.as_str())
            .fetch_all(pool)
            .await?;
        let count = rows.len();
        for row in rows {
            self.store.insert_clean(row_to_party(tenant, &row)?);
        }
        Ok(count)
    }

    pub fn rebuild_caches(&mut self, _tenant: &TenantId) {
        // Membership is read through the character's party_id; no indices.
    }

    pub async fn save(
        &self,
        tenant: &TenantId,
        tx: &mut Transaction<'_, sqlx::Sqlite>,
    ) -> Result<PendingFlush<PartyId>, StoreError> {
        let deleted = self.store.deleted_ids(tenant);
        for id in &deleted {
            sqlx::query("DELETE FROM parties WHERE tenant_id = ? AND id = ?")
                .bind(tenant.as_str())
                .bind(id.to_string())
                .execute(&mut **tx)
                .await?;
        }

        let mut dirty = Vec::new();
        for id in self.store.dirty_ids(tenant) {
            let Some(party) = self.store.get(tenant, id) else {
                warn!(tenant = %tenant, party_id = %id, "Dirty party missing from cache");
                dirty.push(id);
                continue;
            };
            sqlx::query(
                r#"
                INSERT INTO parties (
                    tenant_id, id, name, leader_id, members_json, location_id, actions_json
                )
                VALUES (?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(tenant_id, id) DO UPDATE SET
                    name = excluded.name,
                    leader_id = excluded.leader_id,
                    members_json = excluded.members_json,
                    location_id = excluded.location_id,
                    actions_json = excluded.actions_json
                "#,
            )
            .bind(tenant.as_str())
            .bind(id.to_string())
            .bind(&party.name)
            .bind(party.leader.to_string())
            .bind(serde_json::to_string(&party.members)?)
            .bind(party.location_id.map(|l| l.to_string()))
            .bind(serde_json::to_string(&party.actions)?)
            .execute(&mut **tx)
            .await?;
            dirty.push(id);
        }

        Ok(PendingFlush { dirty, deleted })
    }

    pub fn confirm_flush(&mut self, tenant: &TenantId, flush: &PendingFlush<PartyId>) {
        self.store.clear_flushed(tenant, &flush.dirty, &flush.deleted);
    }

    pub fn has_pending(&self, tenant: &TenantId) -> bool {
        self.store.has_pending(tenant)
    }

    pub fn evict(&mut self, tenant: &TenantId) {
        self.store.evict_tenant(tenant);
    }
}

fn row_to_party(tenant: &TenantId, row: &sqlx::sqlite::SqliteRow) -> Result<Party, StoreError> {
    let id_text: String = row.get("id");
    let id = PartyId::parse(&id_text)
        .map_err(|e| StoreError::corrupt(format!("party id '{id_text}': {e}")))?;

    let leader_text: String = row.get("leader_id");
    let leader = CharacterId::parse(&leader_text)
        .map_err(|e| StoreError::corrupt(format!("party {id} leader: {e}")))?;
    let location_id = row
        .get::<Option<String>, _>("location_id")
        .map(|s| LocationId::parse(&s))
        .transpose()
        .map_err(|e| StoreError::corrupt(format!("party location id: {e}")))?;

    let members: Vec<CharacterId> = serde_json::from_str(&row.get::<String, _>("members_json"))?;
    let actions: ActionState = serde_json::from_str(&row.get::<String, _>("actions_json"))?;

    Ok(Party {
        id,
        tenant: tenant.clone(),
        name: row.get("name"),
        leader,
        members,
        location_id,
        actions,
    })
}
