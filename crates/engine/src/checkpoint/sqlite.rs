//! SQLite-backed key-value store.
//!
//! The engine API is synchronous, so the store owns a current-thread runtime
//! and blocks on each query.

use std::path::Path;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use tokio::runtime::Runtime;

use super::store::{KeyValueStore, StoreError};

#[derive(Debug)]
pub struct SqliteKeyValueStore {
    rt: Runtime,
    pool: SqlitePool,
}

impl SqliteKeyValueStore {
    /// Open (creating if needed) the database at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                StoreError::Storage(format!("failed to create {}: {e}", parent.display()))
            })?;
        }

        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| StoreError::Storage(format!("failed to start runtime: {e}")))?;

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);

        let pool = rt.block_on(async {
            let pool = SqlitePoolOptions::new()
                .max_connections(1)
                .connect_with(options)
                .await
                .map_err(storage)?;

            sqlx::query(
                r#"
                CREATE TABLE IF NOT EXISTS kv_entries (
                    key        TEXT PRIMARY KEY NOT NULL,
                    value      TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                )
                "#,
            )
            .execute(&pool)
            .await
            .map_err(storage)?;

            Ok::<_, StoreError>(pool)
        })?;

        Ok(Self { rt, pool })
    }
}

fn storage(e: sqlx::Error) -> StoreError {
    StoreError::Storage(e.to_string())
}

impl KeyValueStore for SqliteKeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.rt.block_on(async {
            let row = sqlx::query("SELECT value FROM kv_entries WHERE key = ?1")
                .bind(key)
                .fetch_optional(&self.pool)
                .await
                .map_err(storage)?;
            row.map(|r| r.try_get::<String, _>("value").map_err(storage))
                .transpose()
        })
    }

    fn put(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let now = chrono::Utc::now().to_rfc3339();
        self.rt.block_on(async {
            sqlx::query(
                r#"
                INSERT INTO kv_entries (key, value, updated_at)
                VALUES (?1, ?2, ?3)
                ON CONFLICT(key) DO UPDATE
                SET value = excluded.value, updated_at = excluded.updated_at
                "#,
            )
            .bind(key)
            .bind(value)
            .bind(&now)
            .execute(&self.pool)
            .await
            .map_err(storage)?;
            Ok(())
        })
    }

    fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.rt.block_on(async {
            sqlx::query("DELETE FROM kv_entries WHERE key = ?1")
                .bind(key)
                .execute(&self.pool)
                .await
                .map_err(storage)?;
            Ok(())
        })
    }
}
