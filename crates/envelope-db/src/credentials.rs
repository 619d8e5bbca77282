use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use envelope_credentials::ExpiringStore;
use tracing::error;

use crate::Database;
use crate::queries::OptionalExt;

impl Database {
    /// Insert or replace the credential for `device_id`.
    pub fn set_credential(&self, device_id: &str, hash: &str, expires_at: Option<i64>) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO device_credentials (deviceid, hash, expires_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(deviceid) DO UPDATE SET hash = excluded.hash, expires_at = excluded.expires_at",
                rusqlite::params![device_id, hash, expires_at],
            )?;
            Ok(())
        })
    }

    /// Credential for `device_id` if it is still live at `now` (unix millis).
    pub fn get_credential(&self, device_id: &str, now: i64) -> Result<Option<String>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT hash FROM device_credentials
                 WHERE deviceid = ?1 AND (expires_at IS NULL OR expires_at > ?2)",
                rusqlite::params![device_id, now],
                |row| row.get(0),
            )
            .optional()
        })
    }

    pub fn purge_credentials(&self, now: i64) -> Result<usize> {
        self.with_conn_mut(|conn| {
            let removed = conn.execute(
                "DELETE FROM device_credentials WHERE expires_at IS NOT NULL AND expires_at <= ?1",
                [now],
            )?;
            Ok(removed)
        })
    }
}

/// [`ExpiringStore`] backed by the `device_credentials` table, so tokens
/// survive restarts alongside the posts they gate.
#[derive(Clone)]
pub struct SqliteStore {
    db: Arc<Database>,
}

impl SqliteStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    // Run blocking DB work off the async runtime
    async fn blocking<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Database) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || f(&db))
            .await
            .map_err(|e| {
                error!("spawn_blocking join error: {}", e);
                anyhow::anyhow!("credential task failed: {}", e)
            })?
    }
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[async_trait]
impl ExpiringStore for SqliteStore {
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()> {
        let key = key.to_string();
        let value = value.to_string();
        let expires_at = ttl.map(|ttl| {
            let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
            now_millis().saturating_add(ttl_ms)
        });
        self.blocking(move |db| db.set_credential(&key, &value, expires_at))
            .await
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let key = key.to_string();
        self.blocking(move |db| db.get_credential(&key, now_millis()))
            .await
    }

    async fn purge_expired(&self) -> Result<usize> {
        self.blocking(|db| db.purge_credentials(now_millis())).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::temp_db;

    #[tokio::test]
    async fn stored_credential_reads_back_until_expiry() {
        let (_dir, db) = temp_db();
        let store = SqliteStore::new(Arc::new(db));

        store
            .set("device-a", "token", Some(Duration::from_millis(40)))
            .await
            .unwrap();
        assert_eq!(store.get("device-a").await.unwrap().as_deref(), Some("token"));

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(store.get("device-a").await.unwrap(), None);
        assert_eq!(store.purge_expired().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn set_replaces_token_and_expiry() {
        let (_dir, db) = temp_db();
        let store = SqliteStore::new(Arc::new(db));

        store
            .set("device-a", "old", Some(Duration::from_millis(1)))
            .await
            .unwrap();
        store.set("device-a", "new", None).await.unwrap();

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(store.get("device-a").await.unwrap().as_deref(), Some("new"));
        assert_eq!(store.purge_expired().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn huge_ttl_saturates_instead_of_wrapping() {
        let (_dir, db) = temp_db();
        let store = SqliteStore::new(Arc::new(db));

        store
            .set("device-a", "token", Some(Duration::MAX))
            .await
            .unwrap();
        assert_eq!(store.get("device-a").await.unwrap().as_deref(), Some("token"));
        assert_eq!(store.purge_expired().await.unwrap(), 0);
    }
}
