//! World clock manager. One clock per tenant.

use sqlx::{Row, SqlitePool, Transaction};
use tracing::warn;

use wayfarer_domain::{ClockId, TenantId, WorldClock};

use crate::error::StoreError;
use crate::store::{PendingFlush, TenantStore};

pub struct ClockManager {
    store: TenantStore<WorldClock>,
}

impl Default for ClockManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ClockManager {
    pub fn new() -> Self {
        Self {
            store: TenantStore::new(),
        }
    }

    pub async fn ensure_schema(pool: &SqlitePool) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS world_clocks (
                tenant_id TEXT NOT NULL,
                id TEXT NOT NULL,
                elapsed REAL NOT NULL,
                day_length REAL NOT NULL,
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

    /// The tenant's clock, created on first touch.
    pub fn ensure_clock(&mut self, tenant: &TenantId) -> ClockId {
        if let Some(clock) = self.store.all(tenant).first() {
            return clock.id;
        }
        let clock = WorldClock::new(tenant.clone());
        let id = clock.id;
        self.store.insert(clock);
        id
    }

    pub fn get(&self, tenant: &TenantId) -> Option<&WorldClock> {
        self.store.all(tenant).into_iter().next()
    }

    pub fn advance(&mut self, tenant: &TenantId, delta: f64) {
        let id = self.ensure_clock(tenant);
        if let Some(clock) = self.store.get_mut(tenant, id) {
            clock.advance(delta);
            self.store.mark_dirty(tenant, id);
        }
    }

    // -------------------------------------------------------------------------
    // Persistence contract
    // -------------------------------------------------------------------------

    pub async fn load(&mut self, pool: &SqlitePool, tenant: &TenantId) -> Result<usize, StoreError> {
        let rows = sqlx::query("SELECT * FROM world_clocks WHERE tenant_id = ?")
            .bind(tenant.as_str())
            .fetch_all(pool)
            .await?;
        let count = rows.len();
        for row in rows {
            self.store.insert_clean(row_to_clock(tenant, &row)?);
        }
        Ok(count)
    }

    pub fn rebuild_caches(&mut self, _tenant: &TenantId) {}

    pub async fn save(
        &self,
        tenant: &TenantId,
        tx: &mut Transaction<'_, sqlx::Sqlite>,
    ) -> Result<PendingFlush<ClockId>, StoreError> {
        let deleted = self.store.deleted_ids(tenant);
        for id in &deleted {
            sqlx::query("DELETE FROM world_clocks WHERE tenant_id = ? AND id = ?")
                .bind(tenant.as_str())
                .bind(id.to_string())
                .execute(&mut **tx)
                .await?;
        }

        let mut dirty = Vec::new();
        for id in self.store.dirty_ids(tenant) {
            let Some(clock) = self.store.get(tenant, id) else {
                warn!(tenant = %tenant, clock_id = %id, "Dirty clock missing from cache");
                dirty.push(id);
                continue;
            };
            sqlx::query(
                r#"
                INSERT INTO world_clocks (tenant_id, id, elapsed, day_length)
                VALUES (?, ?, ?, ?)
                ON CONFLICT(tenant_id, id) DO UPDATE SET
                    elapsed = excluded.elapsed,
                    day_length = excluded.day_length
                "#,
            )
            .bind(tenant.as_str())
            .bind(id.to_string())
            .bind(clock.elapsed)
            .bind(clock.day_length)
            .execute(&mut **tx)
            .await?;
            dirty.push(id);
        }

        Ok(PendingFlush { dirty, deleted })
    }

    pub fn confirm_flush(&mut self, tenant: &TenantId, flush: &PendingFlush<ClockId>) {
        self.store.clear_flushed(tenant, &flush.dirty, &flush.deleted);
    }

    pub fn has_pending(&self, tenant: &TenantId) -> bool {
        self.store.has_pending(tenant)
    }

    pub fn evict(&mut self, tenant: &TenantId) {
        self.store.evict_tenant(tenant);
    }
}

fn row_to_clock(tenant: &TenantId, row: &sqlx::sqlite::SqliteRow) -> Result<WorldClock, StoreError> {
    let id_text: String = row.get("id");
    let id = ClockId::parse(&id_text)
        .map_err(|e| StoreError::corrupt(format!("clock id '{id_text}': {e}")))?;

    Ok(WorldClock {
        id,
        tenant: tenant.clone(),
        elapsed: row.get("elapsed"),
        day_length: row.get("day_length"),
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
        ClockManager::ensure_schema(&pool).await.expect("schema");
        pool
    }

    #[tokio::test]
    async fn clock_elapsed_survives_restart() {
        let dir = tempfile::tempdir().expect("tempdir");
        let pool = open_pool(&dir).await;
        let tenant = TenantId::new("guild-1");

        let mut manager = ClockManager::new();
        manager.advance(&tenant, 3_600.0);

        let mut tx = pool.begin().await.expect("begin");
        let flush = manager.save(&tenant, &mut tx).await.expect("save");
        tx.commit().await.expect("commit");
        manager.confirm_flush(&tenant, &flush);

        let mut reloaded = ClockManager::new();
        assert_eq!(reloaded.load(&pool, &tenant).await.expect("load"), 1);
        let clock = reloaded.get(&tenant).expect("clock loaded");
        assert_eq!(clock.elapsed, 3_600.0);
    }

    #[tokio::test]
    async fn ensure_clock_is_idempotent() {
        let tenant = TenantId::new("guild-1");
        let mut manager = ClockManager::new();

        let first = manager.ensure_clock(&tenant);
        let second = manager.ensure_clock(&tenant);
        assert_eq!(first, second);
        manager.advance(&tenant, 10.0);
        manager.advance(&tenant, 5.0);
        assert_eq!(manager.get(&tenant).expect("clock").elapsed, 15.0);
    }
}
