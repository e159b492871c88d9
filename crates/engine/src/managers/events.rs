//! World event manager.
//!
//! Events carry their stage graph with them (copied from the template at
//! start), so a tenant's running events stay valid even if content files
//! change under them. Ended events go through a two-phase retirement: the
//! first save after `retire` writes the row with `is_active = 0`, the next
//! save deletes it. A restart between the two phases resumes the purge.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use sqlx::{Row, SqlitePool, Transaction};
use tracing::warn;

use wayfarer_domain::{ChannelId, CharacterId, EventId, ItemId, NpcId, StageDefinition, TenantId, WorldEvent};

use crate::error::StoreError;
use crate::store::{PendingFlush, TenantIndex, TenantStore};

/// Wire form of the spawn bookkeeping lists, stored as one JSON column.
#[derive(Debug, Default, Serialize, Deserialize)]
struct SpawnedRecord {
    npcs: Vec<NpcId>,
    items: Vec<ItemId>,
}

pub struct EventManager {
    store: TenantStore<WorldEvent>,
    by_channel: TenantIndex<ChannelId, EventId>,
    /// Ended events waiting for their inactive row to hit disk.
    retired: HashMap<TenantId, HashSet<EventId>>,
}

impl Default for EventManager {
    fn default() -> Self {
        Self::new()
    }
}

impl EventManager {
    pub fn new() -> Self {
        Self {
            store: TenantStore::new(),
            by_channel: TenantIndex::new(),
            retired: HashMap::new(),
        }
    }

    pub async fn ensure_schema(pool: &SqlitePool) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS events (
                tenant_id TEXT NOT NULL,
                id TEXT NOT NULL,
                template_id TEXT NOT NULL,
                channel_id TEXT NOT NULL,
                current_stage_id TEXT NOT NULL,
                is_active INTEGER NOT NULL,
                players_json TEXT NOT NULL,
                state_vars_json TEXT NOT NULL,
                timers_json TEXT NOT NULL,
                spawned_json TEXT NOT NULL,
                stages_json TEXT NOT NULL,
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

    pub fn create(&mut self, event: WorldEvent) -> EventId {
        let id = event.id;
        self.by_channel.add(&event.tenant, event.channel.clone(), id);
        self.store.insert(event);
        id
    }

    pub fn get(&self, tenant: &TenantId, id: EventId) -> Option<&WorldEvent> {
        self.store.get(tenant, id)
    }

    pub fn list(&self, tenant: &TenantId) -> Vec<&WorldEvent> {
        self.store.all(tenant)
    }

    pub fn ids(&self, tenant: &TenantId) -> Vec<EventId> {
        self.store.ids(tenant)
    }

    /// Ids of events still running, the set the tick loop iterates.
    pub fn active_ids(&self, tenant: &TenantId) -> Vec<EventId> {
        self.store
            .all(tenant)
            .into_iter()
            .filter(|e| e.is_active)
            .map(|e| e.id)
            .collect()
    }

    pub fn update<R>(
        &mut self,
        tenant: &TenantId,
        id: EventId,
        f: impl FnOnce(&mut WorldEvent) -> R,
    ) -> Option<R> {
        let result = f(self.store.get_mut(tenant, id)?);
        self.store.mark_dirty(tenant, id);
        Some(result)
    }

    /// The running event bound to `channel`, if any. At most one event per
    /// channel is active at a time; callers enforce that by checking this
    /// before starting a new one.
    pub fn active_in_channel(&self, tenant: &TenantId, channel: &ChannelId) -> Option<EventId> {
        self.by_channel
            .get(tenant, channel)
            .into_iter()
            .find(|id| self.store.get(tenant, *id).is_some_and(|e| e.is_active))
    }

    /// Flag an ended event for the two-phase purge. Idempotent.
    pub fn retire(&mut self, tenant: &TenantId, id: EventId) {
        if let Some(event) = self.store.get_mut(tenant, id) {
            event.is_active = false;
            self.store.mark_dirty(tenant, id);
            self.retired.entry(tenant.clone()).or_default().insert(id);
        }
    }

    pub fn remove(&mut self, tenant: &TenantId, id: EventId) -> Option<WorldEvent> {
        let removed = self.store.remove(tenant, id)?;
        self.by_channel.remove(tenant, &removed.channel, id);
        self.store.mark_deleted(tenant, id);
        if let Some(set) = self.retired.get_mut(tenant) {
            set.remove(&id);
        }
        Some(removed)
    }

    // -------------------------------------------------------------------------
    // Persistence contract
    // -------------------------------------------------------------------------

    pub async fn load(&mut self, pool: &SqlitePool, tenant: &TenantId) -> Result<usize, StoreError> {
        let rows = sqlx::query("SELECT * FROM events WHERE tenant_id = ?")
            .bind(tenant.as_str())
            .fetch_all(pool)
            .await?;
        let count = rows.len();
        for row in rows {
            self.store.insert_clean(row_to_event(tenant, &row)?);
        }
        Ok(count)
    }

    pub fn rebuild_caches(&mut self, tenant: &TenantId) {
        self.by_channel.clear_tenant(tenant);
        let mut inactive = Vec::new();
        for event in self.store.all(tenant) {
            self.by_channel.add(tenant, event.channel.clone(), event.id);
            if !event.is_active {
                inactive.push(event.id);
            }
        }
        // Inactive rows are leftovers from a shutdown between the two purge
        // phases. Re-dirty them so the purge completes on coming saves.
        for id in inactive {
            self.store.mark_dirty(tenant, id);
            self.retired.entry(tenant.clone()).or_default().insert(id);
        }
    }

    pub async fn save(
        &self,
        tenant: &TenantId,
        tx: &mut Transaction<'_, sqlx::Sqlite>,
    ) -> Result<PendingFlush<EventId>, StoreError> {
        let deleted = self.store.deleted_ids(tenant);
        for id in &deleted {
            sqlx::query("DELETE FROM events WHERE tenant_id = ? AND id = ?")
                .bind(tenant.as_str())
                .bind(id.to_string())
                .execute(&mut **tx)
                .await?;
        }

        let mut dirty = Vec::new();
        for id in self.store.dirty_ids(tenant) {
            let Some(event) = self.store.get(tenant, id) else {
                warn!(tenant = %tenant, event_id = %id, "Dirty event missing from cache");
                dirty.push(id);
                continue;
            };
            let spawned = SpawnedRecord {
                npcs: event.spawned_npcs.clone(),
                items: event.spawned_items.clone(),
            };
            sqlx::query(
                r#"
                INSERT INTO events (
                    tenant_id, id, template_id, channel_id, current_stage_id,
                    is_active, players_json, state_vars_json, timers_json,
                    spawned_json, stages_json
                )
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(tenant_id, id) DO UPDATE SET
                    template_id = excluded.template_id,
                    channel_id = excluded.channel_id,
                    current_stage_id = excluded.current_stage_id,
                    is_active = excluded.is_active,
                    players_json = excluded.players_json,
                    state_vars_json = excluded.state_vars_json,
                    timers_json = excluded.timers_json,
                    spawned_json = excluded.spawned_json,
                    stages_json = excluded.stages_json
                "#,
            )
            .bind(tenant.as_str())
            .bind(id.to_string())
            .bind(&event.template_id)
            .bind(event.channel.as_str())
            .bind(&event.current_stage_id)
            .bind(event.is_active)
            .bind(serde_json::to_string(&event.players)?)
            .bind(serde_json::to_string(&event.state_variables)?)
            .bind(serde_json::to_string(&event.timers)?)
            .bind(serde_json::to_string(&spawned)?)
            .bind(serde_json::to_string(&event.stages)?)
            .execute(&mut **tx)
            .await?;
            dirty.push(id);
        }

        Ok(PendingFlush { dirty, deleted })
    }

    pub fn confirm_flush(&mut self, tenant: &TenantId, flush: &PendingFlush<EventId>) {
        self.store.clear_flushed(tenant, &flush.dirty, &flush.deleted);
        // Retired events whose inactive row just committed enter phase two:
        // cache removal now, row deletion on the next save.
        let Some(set) = self.retired.get_mut(tenant) else {
            return;
        };
        for id in &flush.dirty {
            if set.remove(id) {
                if let Some(event) = self.store.remove(tenant, *id) {
                    self.by_channel.remove(tenant, &event.channel, *id);
                }
                self.store.mark_deleted(tenant, *id);
            }
        }
    }

    pub fn has_pending(&self, tenant: &TenantId) -> bool {
        self.store.has_pending(tenant)
    }

    pub fn evict(&mut self, tenant: &TenantId) {
        self.store.evict_tenant(tenant);
        self.by_channel.clear_tenant(tenant);
        self.retired.remove(tenant);
    }
}

fn row_to_event(tenant: &TenantId, row: &sqlx::sqlite::SqliteRow) -> Result<WorldEvent, StoreError> {
    let id_text: String = row.get("id");
    let id = EventId::parse(&id_text)
        .map_err(|e| StoreError::corrupt(format!("event id '{id_text}': {e}")))?;

    let players: Vec<CharacterId> = serde_json::from_str(&row.get::<String, _>("players_json"))?;
    let state_variables: HashMap<String, f64> =
        serde_json::from_str(&row.get::<String, _>("state_vars_json"))?;
    let timers: HashMap<String, f64> = serde_json::from_str(&row.get::<String, _>("timers_json"))?;
    let spawned: SpawnedRecord = serde_json::from_str(&row.get::<String, _>("spawned_json"))?;
    let stages: HashMap<String, StageDefinition> =
        serde_json::from_str(&row.get::<String, _>("stages_json"))?;

    Ok(WorldEvent {
        id,
        tenant: tenant.clone(),
        template_id: row.get("template_id"),
        channel: ChannelId::new(row.get::<String, _>("channel_id")),
        current_stage_id: row.get("current_stage_id"),
        is_active: row.get("is_active"),
        players,
        state_variables,
        timers,
        spawned_npcs: spawned.npcs,
        spawned_items: spawned.items,
        stages,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use wayfarer_domain::EventTemplate;

    fn template() -> EventTemplate {
        let stages = serde_json::from_value(serde_json::json!({
            "ambush": {
                "allowed_actions": {
                    "fight": { "command": "attack", "outcome": "event_end" }
                },
                "auto_transitions": [
                    { "type": "time_elapsed", "timer": "stage_timer", "threshold": 30.0, "target_stage": "event_end" }
                ]
            }
        }))
        .expect("stage graph");
        EventTemplate {
            key: "roadside_ambush".into(),
            name: "Roadside Ambush".into(),
            initial_stage: "ambush".into(),
            stages,
            description: None,
        }
    }

    async fn open_pool(dir: &tempfile::TempDir) -> SqlitePool {
        let path = dir.path().join("world.db");
        let pool = SqlitePool::connect(&format!("sqlite:{}?mode=rwc", path.to_string_lossy()))
            .await
            .expect("open pool");
        EventManager::ensure_schema(&pool).await.expect("schema");
        pool
    }

    async fn commit_save(manager: &mut EventManager, pool: &SqlitePool, tenant: &TenantId) {
        let mut tx = pool.begin().await.expect("begin");
        let flush = manager.save(tenant, &mut tx).await.expect("save");
        tx.commit().await.expect("commit");
        manager.confirm_flush(tenant, &flush);
    }

    #[tokio::test]
    async fn event_round_trips_with_stage_graph() {
        let dir = tempfile::tempdir().expect("tempdir");
        let pool = open_pool(&dir).await;
        let tenant = TenantId::new("guild-1");
        let channel = ChannelId::new("channel-9");

        let mut manager = EventManager::new();
        let mut event = WorldEvent::from_template(tenant.clone(), &template(), channel.clone());
        event.set_variable("bandits", 3.0);
        event.add_player(CharacterId::new());
        let id = manager.create(event);
        commit_save(&mut manager, &pool, &tenant).await;

        let mut reloaded = EventManager::new();
        reloaded.load(&pool, &tenant).await.expect("load");
        reloaded.rebuild_caches(&tenant);

        let event = reloaded.get(&tenant, id).expect("event loaded");
        assert_eq!(event.current_stage_id, "ambush");
        assert_eq!(event.variable("bandits"), Some(3.0));
        assert_eq!(event.players.len(), 1);
        assert!(event.stages.contains_key("ambush"));
        assert_eq!(reloaded.active_in_channel(&tenant, &channel), Some(id));
    }

    #[tokio::test]
    async fn retired_event_survives_one_save_then_disappears() {
        let dir = tempfile::tempdir().expect("tempdir");
        let pool = open_pool(&dir).await;
        let tenant = TenantId::new("guild-1");
        let channel = ChannelId::new("channel-9");

        let mut manager = EventManager::new();
        let id = manager.create(WorldEvent::from_template(
            tenant.clone(),
            &template(),
            channel.clone(),
        ));
        commit_save(&mut manager, &pool, &tenant).await;

        manager.retire(&tenant, id);
        assert_eq!(manager.active_in_channel(&tenant, &channel), None);

        // Phase one: the inactive row is written and the cache lets go.
        commit_save(&mut manager, &pool, &tenant).await;
        assert!(manager.get(&tenant, id).is_none());
        let mut check = EventManager::new();
        assert_eq!(check.load(&pool, &tenant).await.expect("load"), 1);

        // Phase two: the row is gone.
        commit_save(&mut manager, &pool, &tenant).await;
        let mut check = EventManager::new();
        assert_eq!(check.load(&pool, &tenant).await.expect("load"), 0);
    }

    #[tokio::test]
    async fn restart_between_purge_phases_resumes() {
        let dir = tempfile::tempdir().expect("tempdir");
        let pool = open_pool(&dir).await;
        let tenant = TenantId::new("guild-1");

        let mut manager = EventManager::new();
        let id = manager.create(WorldEvent::from_template(
            tenant.clone(),
            &template(),
            ChannelId::new("channel-9"),
        ));
        manager.retire(&tenant, id);
        // Inactive row on disk, then the process dies before the next save.
        commit_save(&mut manager, &pool, &tenant).await;

        let mut survivor = EventManager::new();
        survivor.load(&pool, &tenant).await.expect("load");
        survivor.rebuild_caches(&tenant);
        commit_save(&mut survivor, &pool, &tenant).await;
        commit_save(&mut survivor, &pool, &tenant).await;

        let mut check = EventManager::new();
        assert_eq!(check.load(&pool, &tenant).await.expect("load"), 0);
    }

    #[tokio::test]
    async fn second_event_in_channel_sees_no_active_conflict_after_retire() {
        let tenant = TenantId::new("guild-1");
        let channel = ChannelId::new("channel-9");

        let mut manager = EventManager::new();
        let first = manager.create(WorldEvent::from_template(
            tenant.clone(),
            &template(),
            channel.clone(),
        ));
        assert_eq!(manager.active_in_channel(&tenant, &channel), Some(first));

        manager.retire(&tenant, first);
        let second = manager.create(WorldEvent::from_template(
            tenant.clone(),
            &template(),
            channel.clone(),
        ));
        assert_eq!(manager.active_in_channel(&tenant, &channel), Some(second));
    }
}
