//! Item instance manager.
//!
//! Items are the one entity whose secondary index is authoritative for
//! gameplay: every ownership lookup (a character's inventory, the pile on a
//! location's floor) goes through `by_owner`. Ownership changes must use
//! [`ItemManager::move_owner`] so the index and the entity never disagree.

use sqlx::{Row, SqlitePool, Transaction};
use tracing::warn;

use wayfarer_domain::{
    CharacterId, EventId, ItemId, ItemInstance, ItemOwner, ItemState, LocationId, NpcId, TenantId,
};

use crate::error::StoreError;
use crate::store::{PendingFlush, TenantIndex, TenantStore};

/// Quantities at or below this are treated as an empty stack.
const STACK_EPSILON: f64 = 1e-9;

pub struct ItemManager {
    store: TenantStore<ItemInstance>,
    by_owner: TenantIndex<ItemOwner, ItemId>,
}

impl Default for ItemManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ItemManager {
    pub fn new() -> Self {
        Self {
            store: TenantStore::new(),
            by_owner: TenantIndex::new(),
        }
    }

    pub async fn ensure_schema(pool: &SqlitePool) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS items (
                tenant_id TEXT NOT NULL,
                id TEXT NOT NULL,
                template_id TEXT NOT NULL,
                owner_kind TEXT NOT NULL,
                owner_id TEXT,
                location_id TEXT,
                quantity REAL NOT NULL,
                state_json TEXT NOT NULL,
                temporary INTEGER NOT NULL,
                source_event TEXT,
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

    /// Insert a freshly minted instance. When `stackable` is set and the owner
    /// already holds an unequipped stack of the same template, the quantities
    /// merge instead.
    pub fn grant(&mut self, item: ItemInstance, stackable: bool) -> ItemId {
        if stackable {
            let existing = self
                .by_owner
                .get(&item.tenant, &item.owner)
                .into_iter()
                .find(|id| {
                    self.store
                        .get(&item.tenant, *id)
                        .is_some_and(|i| i.template_id == item.template_id && !i.is_equipped())
                });
            if let Some(id) = existing {
                let tenant = item.tenant.clone();
                let quantity = item.quantity;
                if let Some(stack) = self.store.get_mut(&tenant, id) {
                    stack.quantity += quantity;
                    self.store.mark_dirty(&tenant, id);
                    return id;
                }
            }
        }

        let id = item.id;
        self.by_owner.add(&item.tenant, item.owner, id);
        self.store.insert(item);
        id
    }

    pub fn get(&self, tenant: &TenantId, id: ItemId) -> Option<&ItemInstance> {
        self.store.get(tenant, id)
    }

    pub fn list(&self, tenant: &TenantId) -> Vec<&ItemInstance> {
        self.store.all(tenant)
    }

    /// Mutate non-ownership fields and mark dirty. Ownership changes must go
    /// through [`ItemManager::move_owner`].
    pub fn update<R>(
        &mut self,
        tenant: &TenantId,
        id: ItemId,
        f: impl FnOnce(&mut ItemInstance) -> R,
    ) -> Option<R> {
        let result = f(self.store.get_mut(tenant, id)?);
        self.store.mark_dirty(tenant, id);
        Some(result)
    }

    pub fn move_owner(&mut self, tenant: &TenantId, id: ItemId, new_owner: ItemOwner) -> bool {
        let Some(item) = self.store.get_mut(tenant, id) else {
            return false;
        };
        let old_owner = item.owner;
        item.owner = new_owner;
        // Equipment does not follow an item across owners.
        item.unequip();
        self.by_owner.remove(tenant, &old_owner, id);
        self.by_owner.add(tenant, new_owner, id);
        self.store.mark_dirty(tenant, id);
        true
    }

    pub fn owned_by(&self, tenant: &TenantId, owner: &ItemOwner) -> Vec<ItemId> {
        self.by_owner.get(tenant, owner)
    }

    pub fn character_items(&self, tenant: &TenantId, character: CharacterId) -> Vec<ItemId> {
        self.owned_by(tenant, &ItemOwner::Character(character))
    }

    pub fn npc_items(&self, tenant: &TenantId, npc: NpcId) -> Vec<ItemId> {
        self.owned_by(tenant, &ItemOwner::Npc(npc))
    }

    pub fn ground_items(&self, tenant: &TenantId, location: LocationId) -> Vec<ItemId> {
        self.owned_by(tenant, &ItemOwner::Location(location))
    }

    /// First instance of a template held by `owner`, if any.
    pub fn find_by_template(
        &self,
        tenant: &TenantId,
        owner: &ItemOwner,
        template_id: &str,
    ) -> Option<ItemId> {
        self.by_owner
            .get(tenant, owner)
            .into_iter()
            .find(|id| {
                self.store
                    .get(tenant, *id)
                    .is_some_and(|i| i.template_id == template_id)
            })
    }

    /// Reduce a stack by `amount`. The instance is deleted once empty.
    /// Returns the remaining quantity, or `None` when the id is unknown.
    pub fn consume(&mut self, tenant: &TenantId, id: ItemId, amount: f64) -> Option<f64> {
        let item = self.store.get_mut(tenant, id)?;
        item.quantity -= amount;
        let remaining = item.quantity;
        if remaining <= STACK_EPSILON {
            self.remove(tenant, id);
            Some(0.0)
        } else {
            self.store.mark_dirty(tenant, id);
            Some(remaining)
        }
    }

    pub fn remove(&mut self, tenant: &TenantId, id: ItemId) -> Option<ItemInstance> {
        let removed = self.store.remove(tenant, id)?;
        self.by_owner.remove(tenant, &removed.owner, id);
        self.store.mark_deleted(tenant, id);
        Some(removed)
    }

    /// Temporary items minted by `event`, used by event teardown.
    pub fn spawned_by_event(&self, tenant: &TenantId, event: EventId) -> Vec<ItemId> {
        self.store
            .all(tenant)
            .into_iter()
            .filter(|i| i.temporary && i.source_event == Some(event))
            .map(|i| i.id)
            .collect()
    }

    // -------------------------------------------------------------------------
    // Persistence contract
    // -------------------------------------------------------------------------

    pub async fn load(&mut self, pool: &SqlitePool, tenant: &TenantId) -> Result<usize, StoreError> {
        let rows = sqlx::query("SELECT * FROM items WHERE tenant_id = ?")
            .bind(tenant.as_str())
            .fetch_all(pool)
            .await?;
        let count = rows.len();
        for row in rows {
            self.store.insert_clean(row_to_item(tenant, &row)?);
        }
        Ok(count)
    }

    pub fn rebuild_caches(&mut self, tenant: &TenantId) {
        self.by_owner.clear_tenant(tenant);
        let pairs: Vec<(ItemOwner, ItemId)> = self
            .store
            .all(tenant)
            .into_iter()
            .map(|i| (i.owner, i.id))
            .collect();
        for (owner, id) in pairs {
            self.by_owner.add(tenant, owner, id);
        }
    }

    pub async fn save(
        &self,
        tenant: &TenantId,
        tx: &mut Transaction<'_, sqlx::Sqlite>,
    ) -> Result<PendingFlush<ItemId>, StoreError> {
        let deleted = self.store.deleted_ids(tenant);
        for id in &deleted {
            sqlx::query("DELETE FROM items WHERE tenant_id = ? AND id = ?")
                .bind(tenant.as_str())
                .bind(id.to_string())
                .execute(&mut **tx)
                .await?;
        }

        let mut dirty = Vec::new();
        for id in self.store.dirty_ids(tenant) {
            let Some(item) = self.store.get(tenant, id) else {
                warn!(tenant = %tenant, item_id = %id, "Dirty item missing from cache");
                dirty.push(id);
                continue;
            };
            let (owner_kind, owner_id, location_id) = owner_columns(&item.owner);
            sqlx::query(
                r#"
                INSERT INTO items (
                    tenant_id, id, template_id, owner_kind, owner_id,
                    location_id, quantity, state_json, temporary, source_event
                )
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(tenant_id, id) DO UPDATE SET
                    template_id = excluded.template_id,
                    owner_kind = excluded.owner_kind,
                    owner_id = excluded.owner_id,
                    location_id = excluded.location_id,
                    quantity = excluded.quantity,
                    state_json = excluded.state_json,
                    temporary = excluded.temporary,
                    source_event = excluded.source_event
                "#,
            )
            .bind(tenant.as_str())
            .bind(id.to_string())
            .bind(&item.template_id)
            .bind(owner_kind)
            .bind(owner_id)
            .bind(location_id)
            .bind(item.quantity)
            .bind(serde_json::to_string(&item.state)?)
            .bind(item.temporary)
            .bind(item.source_event.map(|e| e.to_string()))
            .execute(&mut **tx)
            .await?;
            dirty.push(id);
        }

        Ok(PendingFlush { dirty, deleted })
    }

    pub fn confirm_flush(&mut self, tenant: &TenantId, flush: &PendingFlush<ItemId>) {
        self.store.clear_flushed(tenant, &flush.dirty, &flush.deleted);
    }

    pub fn has_pending(&self, tenant: &TenantId) -> bool {
        self.store.has_pending(tenant)
    }

    pub fn evict(&mut self, tenant: &TenantId) {
        self.store.evict_tenant(tenant);
        self.by_owner.clear_tenant(tenant);
    }
}

fn owner_columns(owner: &ItemOwner) -> (&'static str, Option<String>, Option<String>) {
    match owner {
        ItemOwner::Character(id) => ("character", Some(id.to_string()), None),
        ItemOwner::Npc(id) => ("npc", Some(id.to_string()), None),
        ItemOwner::Location(id) => ("location", None, Some(id.to_string())),
        ItemOwner::None => ("none", None, None),
    }
}

fn row_to_item(tenant: &TenantId, row: &sqlx::sqlite::SqliteRow) -> Result<ItemInstance, StoreError> {
    let id_text: String = row.get("id");
    let id = ItemId::parse(&id_text)
        .map_err(|e| StoreError::corrupt(format!("item id '{id_text}': {e}")))?;

    let owner_kind: String = row.get("owner_kind");
    let owner_id: Option<String> = row.get("owner_id");
    let location_id: Option<String> = row.get("location_id");
    let owner = match owner_kind.as_str() {
        "character" => {
            let raw = owner_id
                .ok_or_else(|| StoreError::corrupt(format!("item {id} has no owner id")))?;
            ItemOwner::Character(
                CharacterId::parse(&raw)
                    .map_err(|e| StoreError::corrupt(format!("item {id} owner: {e}")))?,
            )
        }
        "npc" => {
            let raw = owner_id
                .ok_or_else(|| StoreError::corrupt(format!("item {id} has no owner id")))?;
            ItemOwner::Npc(
                NpcId::parse(&raw)
                    .map_err(|e| StoreError::corrupt(format!("item {id} owner: {e}")))?,
            )
        }
        "location" => {
            let raw = location_id
                .ok_or_else(|| StoreError::corrupt(format!("item {id} has no location id")))?;
            ItemOwner::Location(
                LocationId::parse(&raw)
                    .map_err(|e| StoreError::corrupt(format!("item {id} location: {e}")))?,
            )
        }
        "none" => ItemOwner::None,
        other => {
            return Err(StoreError::corrupt(format!(
                "item {id} has unknown owner kind '{other}'"
            )))
        }
    };

    let state: ItemState = serde_json::from_str(&row.get::<String, _>("state_json"))?;
    let source_event = row
        .get::<Option<String>, _>("source_event")
        .map(|s| EventId::parse(&s))
        .transpose()
        .map_err(|e| StoreError::corrupt(format!("item {id} source event: {e}")))?;

    Ok(ItemInstance {
        id,
        tenant: tenant.clone(),
        template_id: row.get("template_id"),
        owner,
        quantity: row.get("quantity"),
        state,
        temporary: row.get("temporary"),
        source_event,
    })
}
