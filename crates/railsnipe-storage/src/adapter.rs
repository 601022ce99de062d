// SPDX-FileCopyrightText: 2026 Railsnipe Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite implementation of the session store and task journal.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tracing::debug;

use railsnipe_config::model::StorageConfig;
use railsnipe_core::{
    AdapterType, EncryptedBlob, HealthStatus, PluginAdapter, RailsnipeError, SessionStore, TaskId,
    TaskJournal, TaskState,
};

use crate::database::{map_tr_err, Database};
use crate::queries;

/// SQLite-backed store shared by every worker pointed at the same file.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    db: Database,
}

impl SqliteStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Open the configured database and wrap it.
    pub async fn open(config: &StorageConfig) -> Result<Self, RailsnipeError> {
        let db = Database::open_with(&config.database_path, config.wal_mode).await?;
        debug!(path = %config.database_path, "SQLite store initialized");
        Ok(Self::new(db))
    }

    pub fn database(&self) -> &Database {
        &self.db
    }
}

fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

fn after(now: i64, span: Duration) -> i64 {
    now.saturating_add(i64::try_from(span.as_millis()).unwrap_or(i64::MAX))
}

#[async_trait]
impl PluginAdapter for SqliteStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Storage
    }

    async fn health_check(&self) -> Result<HealthStatus, RailsnipeError> {
        self.db
            .connection()
            .call(|conn| -> Result<i64, rusqlite::Error> {
                conn.query_row("SELECT 1", [], |row| row.get(0))
            })
            .await
            .map_err(map_tr_err)?;
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), RailsnipeError> {
        self.db.checkpoint().await
    }
}

#[async_trait]
impl SessionStore for SqliteStore {
    async fn get(&self, key: &str) -> Result<Option<EncryptedBlob>, RailsnipeError> {
        queries::sessions::get_entry(&self.db, key, now_millis()).await
    }

    async fn put(
        &self,
        key: &str,
        blob: EncryptedBlob,
        ttl: Duration,
    ) -> Result<(), RailsnipeError> {
        queries::sessions::put_entry(&self.db, key, blob, after(now_millis(), ttl)).await
    }

    async fn delete(&self, key: &str) -> Result<(), RailsnipeError> {
        queries::sessions::delete_entry(&self.db, key).await
    }

    async fn try_claim(
        &self,
        key: &str,
        owner: &str,
        lease: Duration,
    ) -> Result<bool, RailsnipeError> {
        let now = now_millis();
        queries::claims::try_claim(&self.db, key, owner, now, after(now, lease)).await
    }

    async fn release_claim(&self, key: &str, owner: &str) -> Result<(), RailsnipeError> {
        queries::claims::release_claim(&self.db, key, owner).await
    }

    async fn purge_expired(&self) -> Result<u64, RailsnipeError> {
        let now = now_millis();
        let purged = queries::sessions::purge_expired(&self.db, now).await?;
        let lapsed = queries::claims::purge_lapsed(&self.db, now).await?;
        debug!(purged, lapsed, "expired session entries purged");
        Ok(purged)
    }
}

#[async_trait]
impl TaskJournal for SqliteStore {
    async fn record(&self, state: &TaskState) -> Result<(), RailsnipeError> {
        queries::tasks::upsert_task(&self.db, state).await
    }

    async fn load(&self, task_id: &TaskId) -> Result<Option<TaskState>, RailsnipeError> {
        queries::tasks::get_task(&self.db, task_id).await
    }

    async fn mark_interrupted(&self) -> Result<u64, RailsnipeError> {
        queries::tasks::mark_interrupted(&self.db).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    async fn store() -> (SqliteStore, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let config = StorageConfig {
            database_path: dir.path().join("store.db").to_str().unwrap().to_string(),
            wal_mode: true,
        };
        (SqliteStore::open(&config).await.unwrap(), dir)
    }

    #[tokio::test]
    async fn implements_plugin_adapter() {
        let (store, _dir) = store().await;
        assert_eq!(store.name(), "sqlite");
        assert_eq!(store.adapter_type(), AdapterType::Storage);
        assert_eq!(store.health_check().await.unwrap(), HealthStatus::Healthy);
        store.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn session_entries_honour_ttl() {
        let (store, _dir) = store().await;
        let blob = EncryptedBlob {
            nonce: [7; 12],
            ciphertext: vec![1, 2, 3],
        };
        store.put("k", blob.clone(), Duration::from_secs(60)).await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), Some(blob.clone()));

        store.put("gone", blob, Duration::ZERO).await.unwrap();
        assert!(store.get("gone").await.unwrap().is_none());
        assert_eq!(store.purge_expired().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn two_processes_on_one_file_share_claims() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("shared.db");
        let path = path.to_str().unwrap();
        let a = SqliteStore::new(Database::open(path).await.unwrap());
        let b = SqliteStore::new(Database::open(path).await.unwrap());

        assert!(a.try_claim("k", "worker-a", Duration::from_secs(30)).await.unwrap());
        assert!(!b.try_claim("k", "worker-b", Duration::from_secs(30)).await.unwrap());
        a.release_claim("k", "worker-a").await.unwrap();
        assert!(b.try_claim("k", "worker-b", Duration::from_secs(30)).await.unwrap());
    }
}
