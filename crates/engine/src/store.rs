//! Generic per-tenant entity cache with dirty tracking.
//!
//! Every manager owns one [`TenantStore`]: a two-level map (tenant, then
//! entity id) holding the authoritative in-memory record, plus per-tenant
//! dirty and deleted id sets that drive incremental persistence. The store
//! never touches storage itself; managers serialize dirty entities and delete
//! deleted rows inside the coordinator's transaction, then confirm with
//! [`TenantStore::clear_flushed`] after commit.
//!
//! Invariants:
//! - An id is never in both the active cache and the deleted set, except in
//!   the delete-then-recreate window, where the save pass deletes the row
//!   before upserting the fresh one.
//! - `mark_dirty` on an id absent from the active cache is a no-op, so stale
//!   callers cannot resurrect a deleted entity.
//! - Dirty/deleted sets survive failed saves untouched; only a committed
//!   transaction clears them, and only the ids it actually processed.

use std::collections::{HashMap, HashSet};
use std::hash::Hash;

use wayfarer_domain::{TenantId, WorldEntity};

/// Ids a save pass wrote or deleted, held until the transaction commits.
///
/// The coordinator collects one of these per manager, commits, and only then
/// confirms the flush. A failed commit drops the batch and leaves every
/// dirty/deleted flag in place for the next attempt.
#[derive(Debug, Clone)]
pub struct PendingFlush<Id> {
    pub dirty: Vec<Id>,
    pub deleted: Vec<Id>,
}

impl<Id> Default for PendingFlush<Id> {
    fn default() -> Self {
        Self {
            dirty: Vec::new(),
            deleted: Vec::new(),
        }
    }
}

impl<Id> PendingFlush<Id> {
    pub fn is_empty(&self) -> bool {
        self.dirty.is_empty() && self.deleted.is_empty()
    }

    pub fn total(&self) -> usize {
        self.dirty.len() + self.deleted.len()
    }
}

pub struct TenantStore<T: WorldEntity> {
    entities: HashMap<TenantId, HashMap<T::Id, T>>,
    dirty: HashMap<TenantId, HashSet<T::Id>>,
    deleted: HashMap<TenantId, HashSet<T::Id>>,
}

impl<T: WorldEntity> Default for TenantStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: WorldEntity> TenantStore<T> {
    pub fn new() -> Self {
        Self {
            entities: HashMap::new(),
            dirty: HashMap::new(),
            deleted: HashMap::new(),
        }
    }

    // -------------------------------------------------------------------------
    // Reads
    // -------------------------------------------------------------------------

    pub fn get(&self, tenant: &TenantId, id: T::Id) -> Option<&T> {
        self.entities.get(tenant)?.get(&id)
    }

    pub fn get_mut(&mut self, tenant: &TenantId, id: T::Id) -> Option<&mut T> {
        self.entities.get_mut(tenant)?.get_mut(&id)
    }

    pub fn contains(&self, tenant: &TenantId, id: T::Id) -> bool {
        self.entities
            .get(tenant)
            .is_some_and(|map| map.contains_key(&id))
    }

    /// All live entities for a tenant. Iteration order is arbitrary but
    /// stable while the map is not mutated.
    pub fn all(&self, tenant: &TenantId) -> Vec<&T> {
        self.entities
            .get(tenant)
            .map(|map| map.values().collect())
            .unwrap_or_default()
    }

    pub fn ids(&self, tenant: &TenantId) -> Vec<T::Id> {
        self.entities
            .get(tenant)
            .map(|map| map.keys().copied().collect())
            .unwrap_or_default()
    }

    pub fn len(&self, tenant: &TenantId) -> usize {
        self.entities.get(tenant).map_or(0, HashMap::len)
    }

    pub fn is_empty(&self, tenant: &TenantId) -> bool {
        self.len(tenant) == 0
    }

    // -------------------------------------------------------------------------
    // Mutations
    // -------------------------------------------------------------------------

    /// Inserts (or replaces) an entity and marks it dirty. Inserting an id
    /// sitting in the deleted set is allowed and does not un-delete it: the
    /// next save deletes the old row first, then writes the new one.
    pub fn insert(&mut self, entity: T) {
        let tenant = entity.tenant().clone();
        let id = entity.id();
        self.entities.entry(tenant.clone()).or_default().insert(id, entity);
        self.dirty.entry(tenant).or_default().insert(id);
    }

    /// Loads an entity without marking it dirty (load path only).
    pub fn insert_clean(&mut self, entity: T) {
        let tenant = entity.tenant().clone();
        self.entities
            .entry(tenant)
            .or_default()
            .insert(entity.id(), entity);
    }

    /// Flags an entity for the next save. No-op when the id is not in the
    /// active cache.
    pub fn mark_dirty(&mut self, tenant: &TenantId, id: T::Id) {
        if self.contains(tenant, id) {
            self.dirty.entry(tenant.clone()).or_default().insert(id);
        }
    }

    /// Removes an entity from the cache, returning it so the owning manager
    /// can prune secondary indices from the pre-mutation snapshot. Dirty and
    /// deleted bookkeeping is the caller's next step (`mark_deleted`).
    pub fn remove(&mut self, tenant: &TenantId, id: T::Id) -> Option<T> {
        self.entities.get_mut(tenant)?.remove(&id)
    }

    /// Schedules a row deletion: drops the id from the dirty set (and the
    /// cache, if a stale copy remains) and records it as deleted.
    pub fn mark_deleted(&mut self, tenant: &TenantId, id: T::Id) {
        if let Some(map) = self.entities.get_mut(tenant) {
            map.remove(&id);
        }
        if let Some(set) = self.dirty.get_mut(tenant) {
            set.remove(&id);
        }
        self.deleted.entry(tenant.clone()).or_default().insert(id);
    }

    // -------------------------------------------------------------------------
    // Save protocol
    // -------------------------------------------------------------------------

    pub fn dirty_ids(&self, tenant: &TenantId) -> Vec<T::Id> {
        self.dirty
            .get(tenant)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn deleted_ids(&self, tenant: &TenantId) -> Vec<T::Id> {
        self.deleted
            .get(tenant)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn has_pending(&self, tenant: &TenantId) -> bool {
        self.dirty.get(tenant).is_some_and(|s| !s.is_empty())
            || self.deleted.get(tenant).is_some_and(|s| !s.is_empty())
    }

    /// Clears exactly the ids a committed save processed. Ids dirtied or
    /// deleted after the save snapshot was taken stay pending.
    pub fn clear_flushed(&mut self, tenant: &TenantId, dirty: &[T::Id], deleted: &[T::Id]) {
        if let Some(set) = self.dirty.get_mut(tenant) {
            for id in dirty {
                set.remove(id);
            }
        }
        if let Some(set) = self.deleted.get_mut(tenant) {
            for id in deleted {
                set.remove(id);
            }
        }
    }

    // -------------------------------------------------------------------------
    // Tenant lifecycle
    // -------------------------------------------------------------------------

    /// Drops every map for a tenant (unload path; caller saved first).
    pub fn evict_tenant(&mut self, tenant: &TenantId) {
        self.entities.remove(tenant);
        self.dirty.remove(tenant);
        self.deleted.remove(tenant);
    }
}

// =============================================================================
// Secondary indices
// =============================================================================

/// Named secondary index maintained by the owning manager (owner -> items,
/// location -> items, channel -> event). Maintenance is always paired:
/// remove the old key computed from the pre-mutation snapshot, then add the
/// new key.
pub struct TenantIndex<K, Id> {
    map: HashMap<TenantId, HashMap<K, HashSet<Id>>>,
}

impl<K, Id> Default for TenantIndex<K, Id> {
    fn default() -> Self {
        Self {
            map: HashMap::new(),
        }
    }
}

impl<K, Id> TenantIndex<K, Id>
where
    K: Eq + Hash,
    Id: Copy + Eq + Hash,
{
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, tenant: &TenantId, key: K, id: Id) {
        self.map
            .entry(tenant.clone())
            .or_default()
            .entry(key)
            .or_default()
            .insert(id);
    }

    pub fn remove(&mut self, tenant: &TenantId, key: &K, id: Id) {
        if let Some(keys) = self.map.get_mut(tenant) {
            if let Some(set) = keys.get_mut(key) {
                set.remove(&id);
                if set.is_empty() {
                    keys.remove(key);
                }
            }
        }
    }

    pub fn get(&self, tenant: &TenantId, key: &K) -> Vec<Id> {
        self.map
            .get(tenant)
            .and_then(|keys| keys.get(key))
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn first(&self, tenant: &TenantId, key: &K) -> Option<Id> {
        self.map
            .get(tenant)?
            .get(key)?
            .iter()
            .next()
            .copied()
    }

    pub fn clear_tenant(&mut self, tenant: &TenantId) {
        self.map.remove(tenant);
    }
}
