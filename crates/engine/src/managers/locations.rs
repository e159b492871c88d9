//! Location manager.

use sqlx::{Row, SqlitePool, Transaction};
use tracing::warn;

use wayfarer_domain::{Location, LocationId, TenantId};

use crate::error::StoreError;
use crate::store::{PendingFlush, TenantStore};

pub struct LocationManager {
    store: TenantStore<Location>,
}

impl Default for LocationManager {
    fn default() -> Self {
        Self::new()
    }
}

impl LocationManager {
    pub fn new() -> Self {
        Self {
            store: TenantStore::new(),
        }
    }

    pub async fn ensure_schema(pool: &SqlitePool) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS locations (
                tenant_id TEXT NOT NULL,
                id TEXT NOT NULL,
                name TEXT NOT NULL,
                description TEXT,
                exits_json TEXT NOT NULL,
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

    pub fn create(&mut self, location: Location) -> LocationId {
        let id = location.id;
        self.store.insert(location);
        id
    }

    pub fn get(&self, tenant: &TenantId, id: LocationId) -> Option<&Location> {
        self.store.get(tenant, id)
    }

    pub fn list(&self, tenant: &TenantId) -> Vec<&Location> {
        self.store.all(tenant)
    }

    pub fn contains(&self, tenant: &TenantId, id: LocationId) -> bool {
        self.store.contains(tenant, id)
    }

    pub fn update<R>(
        &mut self,
        tenant: &TenantId,
        id: LocationId,
        f: impl FnOnce(&mut Location) -> R,
    ) -> Option<R> {
        let result = f(self.store.get_mut(tenant, id)?);
        self.store.mark_dirty(tenant, id);
        Some(result)
    }

    pub fn remove(&mut self, tenant: &TenantId, id: LocationId) -> Option<Location> {
        let removed = self.store.remove(tenant, id);
        if removed.is_some() {
            self.store.mark_deleted(tenant, id);
        }
        removed
    }

    /// Whether movement from `from` to `to` follows a declared exit.
    pub fn is_exit(&self, tenant: &TenantId, from: LocationId, to: LocationId) -> bool {
        self.store
            .get(tenant, from)
            .is_some_and(|l| l.connects_to(to))
    }

    // -------------------------------------------------------------------------
    // Persistence contract
    // -------------------------------------------------------------------------

    pub async fn load(&mut self, pool: &SqlitePool, tenant: &TenantId) -> Result<usize, StoreError> {
        let rows = sqlx::query("SELECT * FROM locations WHERE tenant_id = ?")
            .bind(tenant.as_str())
            .fetch_all(pool)
            .await?;
        let count = rows.len();
        for row in rows {
            self.store.insert_clean(row_to_location(tenant, &row)?);
        }
        Ok(count)
    }

    pub fn rebuild_caches(&mut self, _tenant: &TenantId) {}

    pub async fn save(
        &self,
        tenant: &TenantId,
        tx: &mut Transaction<'_, sqlx::Sqlite>,
    ) -> Result<PendingFlush<LocationId>, StoreError> {
        let deleted = self.store.deleted_ids(tenant);
        for id in &deleted {
            sqlx::query("DELETE FROM locations WHERE tenant_id = ? AND id = ?")
                .bind(tenant.as_str())
                .bind(id.to_string())
                .execute(&mut **tx)
                .await?;
        }

        let mut dirty = Vec::new();
        for id in self.store.dirty_ids(tenant) {
            let Some(location) = self.store.get(tenant, id) else {
                warn!(tenant = %tenant, location_id = %id, "Dirty location missing from cache");
                dirty.push(id);
                continue;
            };
            sqlx::query(
                r#"
                INSERT INTO locations (tenant_id, id, name, description, exits_json)
                VALUES (?, ?, ?, ?, ?)
                ON CONFLICT(tenant_id, id) DO UPDATE SET
                    name = excluded.name,
                    description = excluded.description,
                    exits_json = excluded.exits_json
                "#,
            )
            .bind(tenant.as_str())
            .bind(id.to_string())
            .bind(&location.name)
            .bind(location.description.as_deref())
            .bind(serde_json::to_string(&location.exits)?)
            .execute(&mut **tx)
            .await?;
            dirty.push(id);
        }

        Ok(PendingFlush { dirty, deleted })
    }

    pub fn confirm_flush(&mut self, tenant: &TenantId, flush: &PendingFlush<LocationId>) {
        self.store.clear_flushed(tenant, &flush.dirty, &flush.deleted);
    }

    pub fn has_pending(&self, tenant: &TenantId) -> bool {
        self.store.has_pending(tenant)
    }

    pub fn evict(&mut self, tenant: &TenantId) {
        self.store.evict_tenant(tenant);
    }
}

fn row_to_location(tenant: &TenantId, row: &sqlx::sqlite::SqliteRow) -> Result<Location, StoreError> {
    let id_text: String = row.get("id");
    let id = LocationId::parse(&id_text)
        .map_err(|e| StoreError::corrupt(format!("location id '{id_text}': {e}")))?;

    let exits: Vec<LocationId> = serde_json::from_str(&row.get::<String, _>("exits_json"))?;

    Ok(Location {
        id,
        tenant: tenant.clone(),
        name: row.get("name"),
        description: row.get("description"),
        exits,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn open_pool(dir: &tempfile::TempDir) -> SqlitePool {
        let path = dir.path().join("world.db");
        let pool = SqlitePool::connect(&format!("sqlite:{}?mode=rwc", path.to_string_lossy()))
            .await
            .expect("open pool");
        LocationManager::ensure_schema(&pool).await.expect("schema");
        pool
    }

    #[tokio::test]
    async fn location_round_trips_with_exits() {
        let dir = tempfile::tempdir().expect("tempdir");
        let pool = open_pool(&dir).await;
        let tenant = TenantId::new("guild-1");

        let mut manager = LocationManager::new();
        let square = manager.create(Location::new(tenant.clone(), "Town Square"));
        let gate = manager.create(
            Location::new(tenant.clone(), "North Gate").with_description("A weathered arch."),
        );
        manager.update(&tenant, square, |l| l.add_exit(gate));

        let mut tx = pool.begin().await.expect("begin");
        let flush = manager.save(&tenant, &mut tx).await.expect("save");
        tx.commit().await.expect("commit");
        manager.confirm_flush(&tenant, &flush);

        let mut reloaded = LocationManager::new();
        reloaded.load(&pool, &tenant).await.expect("load");
        assert!(reloaded.is_exit(&tenant, square, gate));
        assert!(!reloaded.is_exit(&tenant, gate, square));
        assert_eq!(
            reloaded.get(&tenant, gate).expect("gate").description.as_deref(),
            Some("A weathered arch.")
        );
    }
}
