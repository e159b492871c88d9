//! Persistence coordinator.
//!
//! Single entry point for tenant load/save lifecycle. Managers do the
//! per-table work; this module fixes the ordering, the transaction boundary,
//! and the mandatory/optional split. Characters, events, and locations are
//! mandatory: a load failure there aborts the tenant load. Items, NPCs,
//! parties, and clocks are optional: a failure is logged and the tenant comes
//! up without that subsystem's rows.

use std::path::Path;

use sqlx::SqlitePool;
use tracing::{debug, error, info};

use wayfarer_domain::{CharacterId, ClockId, EventId, ItemId, LocationId, NpcId, PartyId, TenantId};

use crate::error::StoreError;
use crate::managers::{
    CharacterManager, ClockManager, EventManager, ItemManager, LocationManager, NpcManager,
    PartyManager,
};
use crate::state::WorldState;
use crate::store::PendingFlush;

/// One save pass's processed ids for every manager, confirmed after commit.
#[derive(Default)]
struct TenantFlush {
    locations: PendingFlush<LocationId>,
    characters: PendingFlush<CharacterId>,
    items: PendingFlush<ItemId>,
    npcs: PendingFlush<NpcId>,
    parties: PendingFlush<PartyId>,
    events: PendingFlush<EventId>,
    clocks: PendingFlush<ClockId>,
}

impl TenantFlush {
    fn total(&self) -> usize {
        self.locations.total()
            + self.characters.total()
            + self.items.total()
            + self.npcs.total()
            + self.parties.total()
            + self.events.total()
            + self.clocks.total()
    }
}

/// Clone shares the underlying pool; the tick loop and the service hold
/// their own handles.
#[derive(Clone)]
pub struct Persistence {
    pool: SqlitePool,
}

impl Persistence {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open (and create if missing) the world database file.
    pub async fn connect(database_path: &str) -> Result<Self, StoreError> {
        if let Some(parent) = Path::new(database_path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| StoreError::corrupt(format!("database directory: {e}")))?;
            }
        }
        let pool = SqlitePool::connect(&format!("sqlite:{database_path}?mode=rwc")).await?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        LocationManager::ensure_schema(&self.pool).await?;
        CharacterManager::ensure_schema(&self.pool).await?;
        ItemManager::ensure_schema(&self.pool).await?;
        NpcManager::ensure_schema(&self.pool).await?;
        PartyManager::ensure_schema(&self.pool).await?;
        EventManager::ensure_schema(&self.pool).await?;
        ClockManager::ensure_schema(&self.pool).await?;
        Ok(())
    }

    /// Load every row for a tenant into the caches and register it as loaded.
    /// Loading an already-loaded tenant is a no-op.
    pub async fn load_tenant(
        &self,
        state: &mut WorldState,
        tenant: &TenantId,
    ) -> Result<(), StoreError> {
        if state.is_loaded(tenant) {
            debug!(tenant = %tenant, "Tenant already loaded");
            return Ok(());
        }

        let locations = state.locations.load(&self.pool, tenant).await?;
        let characters = state.characters.load(&self.pool, tenant).await?;

        let mut items = 0;
        match state.items.load(&self.pool, tenant).await {
            Ok(n) => items = n,
            Err(e) => error!(tenant = %tenant, error = %e, "Item load failed, continuing without items"),
        }
        let mut npcs = 0;
        match state.npcs.load(&self.pool, tenant).await {
            Ok(n) => npcs = n,
            Err(e) => error!(tenant = %tenant, error = %e, "NPC load failed, continuing without NPCs"),
        }
        let mut parties = 0;
        match state.parties.load(&self.pool, tenant).await {
            Ok(n) => parties = n,
            Err(e) => error!(tenant = %tenant, error = %e, "Party load failed, continuing without parties"),
        }

        let events = state.events.load(&self.pool, tenant).await?;

        match state.clocks.load(&self.pool, tenant).await {
            Ok(_) => {}
            Err(e) => error!(tenant = %tenant, error = %e, "Clock load failed, starting time from zero"),
        }

        // Secondary indices and derived state only after every table loaded.
        state.locations.rebuild_caches(tenant);
        state.characters.rebuild_caches(tenant);
        state.items.rebuild_caches(tenant);
        state.npcs.rebuild_caches(tenant);
        state.parties.rebuild_caches(tenant);
        state.events.rebuild_caches(tenant);
        state.clocks.rebuild_caches(tenant);
        state.recompute_all_effective_stats(tenant);
        state.clocks.ensure_clock(tenant);

        state.register_loaded(tenant);
        info!(
            tenant = %tenant,
            locations, characters, items, npcs, parties, events,
            "Tenant loaded"
        );
        Ok(())
    }

    /// Flush every dirty/deleted id for the tenant in one transaction.
    ///
    /// On error the transaction rolls back and every pending flag survives
    /// for the next save point. On success the flags for exactly the
    /// processed ids are cleared.
    pub async fn save_tenant(
        &self,
        state: &mut WorldState,
        tenant: &TenantId,
    ) -> Result<usize, StoreError> {
        let mut tx = self.pool.begin().await?;

        let flush = TenantFlush {
            locations: state.locations.save(tenant, &mut tx).await?,
            characters: state.characters.save(tenant, &mut tx).await?,
            items: state.items.save(tenant, &mut tx).await?,
            npcs: state.npcs.save(tenant, &mut tx).await?,
            parties: state.parties.save(tenant, &mut tx).await?,
            events: state.events.save(tenant, &mut tx).await?,
            clocks: state.clocks.save(tenant, &mut tx).await?,
        };

        tx.commit().await?;

        state.locations.confirm_flush(tenant, &flush.locations);
        state.characters.confirm_flush(tenant, &flush.characters);
        state.items.confirm_flush(tenant, &flush.items);
        state.npcs.confirm_flush(tenant, &flush.npcs);
        state.parties.confirm_flush(tenant, &flush.parties);
        state.events.confirm_flush(tenant, &flush.events);
        state.clocks.confirm_flush(tenant, &flush.clocks);

        let total = flush.total();
        if total > 0 {
            debug!(tenant = %tenant, rows = total, "Tenant saved");
        }
        Ok(total)
    }

    /// Shutdown path: save every loaded tenant, logging failures without
    /// aborting the remainder.
    pub async fn save_all_loaded_tenants(&self, state: &mut WorldState) -> usize {
        let mut failures = 0;
        for tenant in state.loaded_tenants() {
            if let Err(e) = self.save_tenant(state, &tenant).await {
                failures += 1;
                error!(tenant = %tenant, error = %e, "Tenant save failed");
            }
        }
        failures
    }

    /// Save, then drop the tenant's maps from every store. A failed save
    /// leaves the tenant loaded so no pending write is lost.
    pub async fn unload_tenant(
        &self,
        state: &mut WorldState,
        tenant: &TenantId,
    ) -> Result<(), StoreError> {
        self.save_tenant(state, tenant).await?;

        state.locations.evict(tenant);
        state.characters.evict(tenant);
        state.items.evict(tenant);
        state.npcs.evict(tenant);
        state.parties.evict(tenant);
        state.events.evict(tenant);
        state.clocks.evict(tenant);
        state.unregister_loaded(tenant);
        info!(tenant = %tenant, "Tenant unloaded");
        Ok(())
    }
}
