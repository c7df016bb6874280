use std::path::{Path, PathBuf};

use sqlx::SqlitePool;
use thiserror::Error;
use tokio::sync::OnceCell;

use super::init_db;
use crate::models::{record_id, Record, StoreName};

#[derive(Debug, Error)]
pub enum LocalStoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
    #[error("Record in '{0}' has no string id")]
    MissingId(StoreName),
    #[error("Failed to encode record for '{store}': {source}")]
    Encode {
        store: StoreName,
        source: serde_json::Error,
    },
    #[error("Corrupt record '{id}' in '{store}': {reason}")]
    Corrupt {
        store: StoreName,
        id: String,
        reason: String,
    },
}

#[derive(sqlx::FromRow)]
struct RecordRow {
    id: String,
    body: String,
}

/// Key-value tables, one per store name, persisted in SQLite.
///
/// The connection pool is created on first use and kept for the lifetime of
/// the store.
#[derive(Debug)]
pub struct LocalStore {
    path: PathBuf,
    pool: OnceCell<SqlitePool>,
}

impl LocalStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            pool: OnceCell::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the shared handle, provisioning the database on first call.
    pub async fn open(&self) -> Result<&SqlitePool, LocalStoreError> {
        self.pool.get_or_try_init(|| init_db(&self.path)).await
    }

    /// Highest applied schema version.
    pub async fn schema_version(&self) -> Result<i64, LocalStoreError> {
        let pool = self.open().await?;
        let (version,): (i64,) = sqlx::query_as(
            "SELECT COALESCE(MAX(version), 0) FROM _sqlx_migrations WHERE success = 1",
        )
        .fetch_one(pool)
        .await?;
        Ok(version)
    }

    /// Every record in `store`. Order is unspecified.
    pub async fn get_all(&self, store: StoreName) -> Result<Vec<Record>, LocalStoreError> {
        let pool = self.open().await?;
        let rows: Vec<RecordRow> = sqlx::query_as(&format!("SELECT id, body FROM {}", store))
            .fetch_all(pool)
            .await?;

        rows.into_iter().map(|row| decode_row(store, row)).collect()
    }

    pub async fn get(&self, store: StoreName, id: &str) -> Result<Option<Record>, LocalStoreError> {
        let pool = self.open().await?;
        let row: Option<RecordRow> =
            sqlx::query_as(&format!("SELECT id, body FROM {} WHERE id = ?", store))
                .bind(id)
                .fetch_optional(pool)
                .await?;

        row.map(|row| decode_row(store, row)).transpose()
    }

    /// Inserts or overwrites the record with the same id.
    pub async fn put(&self, store: StoreName, record: &Record) -> Result<(), LocalStoreError> {
        let (id, body) = encode_record(store, record)?;
        let pool = self.open().await?;

        sqlx::query(&upsert_sql(store))
            .bind(id)
            .bind(body)
            .execute(pool)
            .await?;
        Ok(())
    }

    /// Upserts every record in one transaction. Nothing is written if any
    /// record is rejected.
    pub async fn put_all(&self, store: StoreName, records: &[Record]) -> Result<(), LocalStoreError> {
        let encoded = records
            .iter()
            .map(|record| encode_record(store, record))
            .collect::<Result<Vec<_>, _>>()?;

        let pool = self.open().await?;
        let mut tx = pool.begin().await?;
        let sql = upsert_sql(store);

        for (id, body) in encoded {
            sqlx::query(&sql)
                .bind(id)
                .bind(body)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Removes the record if present. Deleting an absent id is not an error.
    pub async fn delete(&self, store: StoreName, id: &str) -> Result<(), LocalStoreError> {
        let pool = self.open().await?;
        sqlx::query(&format!("DELETE FROM {} WHERE id = ?", store))
            .bind(id)
            .execute(pool)
            .await?;
        Ok(())
    }

    pub async fn count(&self, store: StoreName) -> Result<i64, LocalStoreError> {
        let pool = self.open().await?;
        let (count,): (i64,) = sqlx::query_as(&format!("SELECT COUNT(*) FROM {}", store))
            .fetch_one(pool)
            .await?;
        Ok(count)
    }
}

// Table names come from the closed `StoreName` set, never from user input.
fn upsert_sql(store: StoreName) -> String {
    format!(
        "INSERT INTO {} (id, body) VALUES (?, ?) ON CONFLICT(id) DO UPDATE SET body = excluded.body",
        store
    )
}

fn encode_record(store: StoreName, record: &Record) -> Result<(String, String), LocalStoreError> {
    let id = record_id(record)
        .ok_or(LocalStoreError::MissingId(store))?
        .to_string();
    let body =
        serde_json::to_string(record).map_err(|source| LocalStoreError::Encode { store, source })?;
    Ok((id, body))
}

fn decode_row(store: StoreName, row: RecordRow) -> Result<Record, LocalStoreError> {
    serde_json::from_str(&row.body).map_err(|e| LocalStoreError::Corrupt {
        store,
        id: row.id,
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};
    use tempfile::TempDir;

    struct TestContext {
        store: LocalStore,
        _temp_dir: TempDir, // Keep alive for duration of test
    }

    fn setup_store() -> TestContext {
        let temp_dir = TempDir::new().unwrap();
        let store = LocalStore::new(temp_dir.path().join("local.db"));
        TestContext {
            store,
            _temp_dir: temp_dir,
        }
    }

    fn obj(value: Value) -> Record {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn test_open_is_lazy_and_idempotent() {
        let ctx = setup_store();
        assert!(!ctx.store.path().exists());

        let first = ctx.store.open().await.unwrap() as *const SqlitePool;
        let second = ctx.store.open().await.unwrap() as *const SqlitePool;

        assert!(ctx.store.path().exists());
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_schema_version_after_provisioning() {
        let ctx = setup_store();
        assert_eq!(ctx.store.schema_version().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_put_and_get_all() {
        let ctx = setup_store();
        let record = obj(json!({"id": "t1", "title": "Buy milk", "isCompleted": false}));

        ctx.store.put(StoreName::Tasks, &record).await.unwrap();

        let all = ctx.store.get_all(StoreName::Tasks).await.unwrap();
        assert_eq!(all, vec![record]);
        assert!(ctx.store.get_all(StoreName::Thoughts).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_put_same_id_overwrites() {
        let ctx = setup_store();
        ctx.store
            .put(StoreName::Tasks, &obj(json!({"id": "t1", "title": "first"})))
            .await
            .unwrap();
        ctx.store
            .put(StoreName::Tasks, &obj(json!({"id": "t1", "title": "second"})))
            .await
            .unwrap();

        let all = ctx.store.get_all(StoreName::Tasks).await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].get("title"), Some(&json!("second")));
    }

    #[tokio::test]
    async fn test_put_without_id_fails() {
        let ctx = setup_store();
        let result = ctx
            .store
            .put(StoreName::Memories, &obj(json!({"content": "orphan"})))
            .await;

        assert!(matches!(
            result,
            Err(LocalStoreError::MissingId(StoreName::Memories))
        ));
    }

    #[tokio::test]
    async fn test_delete_absent_id_is_noop() {
        let ctx = setup_store();
        ctx.store
            .put(StoreName::Journal, &obj(json!({"id": "j1", "content": "hi"})))
            .await
            .unwrap();

        ctx.store.delete(StoreName::Journal, "nope").await.unwrap();

        assert_eq!(ctx.store.count(StoreName::Journal).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_delete_removes_record() {
        let ctx = setup_store();
        ctx.store
            .put(StoreName::Habits, &obj(json!({"id": "h1"})))
            .await
            .unwrap();

        ctx.store.delete(StoreName::Habits, "h1").await.unwrap();

        assert!(ctx.store.get(StoreName::Habits, "h1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_put_all_upserts_batch() {
        let ctx = setup_store();
        ctx.store
            .put(StoreName::Thoughts, &obj(json!({"id": "a", "content": "old"})))
            .await
            .unwrap();

        let batch = vec![
            obj(json!({"id": "a", "content": "new"})),
            obj(json!({"id": "b", "content": "b"})),
        ];
        ctx.store.put_all(StoreName::Thoughts, &batch).await.unwrap();

        let a = ctx.store.get(StoreName::Thoughts, "a").await.unwrap().unwrap();
        assert_eq!(a.get("content"), Some(&json!("new")));
        assert_eq!(ctx.store.count(StoreName::Thoughts).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_put_all_is_all_or_nothing() {
        let ctx = setup_store();
        let batch = vec![
            obj(json!({"id": "a"})),
            obj(json!({"content": "no id"})),
        ];

        assert!(ctx.store.put_all(StoreName::Memories, &batch).await.is_err());
        assert_eq!(ctx.store.count(StoreName::Memories).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_data_survives_reopen() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("local.db");

        {
            let store = LocalStore::new(&path);
            store
                .put(StoreName::Projects, &obj(json!({"id": "p1", "columns": []})))
                .await
                .unwrap();
        }

        let reopened = LocalStore::new(&path);
        let all = reopened.get_all(StoreName::Projects).await.unwrap();
        assert_eq!(all.len(), 1);
    }
}
