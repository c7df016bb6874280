//! Server-side row storage for the hosted tables.
//!
//! One SQLite table per store, each row tagged with its owner:
//! ```text
//! <table>(id TEXT PRIMARY KEY, user_id TEXT, body TEXT)
//! ```
//!
//! Every operation is scoped to a user. A row can only be read, replaced or
//! deleted by the user who owns it.

use std::path::Path;

use serde_json::Value;
use sqlx::migrate::Migrator;
use sqlx::SqlitePool;
use thiserror::Error;

use crate::db::connect;
use crate::mapper::OWNER_FIELD;
use crate::models::{record_id, Record, StoreName};

pub static REMOTE_MIGRATOR: Migrator = sqlx::migrate!("./migrations/remote");

#[derive(Debug, Error)]
pub enum ServerStorageError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
    #[error("Row has no string id")]
    MissingId,
    #[error("{0}")]
    Forbidden(String),
    #[error("Stored row '{id}' in '{store}' is unreadable: {reason}")]
    Corrupt {
        store: StoreName,
        id: String,
        reason: String,
    },
}

#[derive(sqlx::FromRow)]
struct StoredRow {
    id: String,
    body: String,
}

/// Hosted tables backed by one SQLite database.
#[derive(Debug, Clone)]
pub struct RemoteTables {
    pool: SqlitePool,
}

impl RemoteTables {
    /// Opens the database at `path` and provisions every table.
    pub async fn open(path: &Path) -> Result<Self, ServerStorageError> {
        let pool = connect(path).await?;
        REMOTE_MIGRATOR.run(&pool).await?;
        Ok(Self { pool })
    }

    /// Every row in `store` owned by `user_id`.
    pub async fn select_all(
        &self,
        user_id: &str,
        store: StoreName,
    ) -> Result<Vec<Record>, ServerStorageError> {
        let rows: Vec<StoredRow> = sqlx::query_as(&format!(
            "SELECT id, body FROM {} WHERE user_id = ? ORDER BY id",
            store
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                serde_json::from_str(&row.body).map_err(|e| ServerStorageError::Corrupt {
                    store,
                    id: row.id,
                    reason: e.to_string(),
                })
            })
            .collect()
    }

    /// Inserts or replaces a row on behalf of `user_id`.
    ///
    /// The row must name `user_id` as its owner, and an existing row with the
    /// same id must belong to the same user.
    pub async fn upsert(
        &self,
        user_id: &str,
        store: StoreName,
        row: &Record,
    ) -> Result<(), ServerStorageError> {
        let id = record_id(row).ok_or(ServerStorageError::MissingId)?;
        let owner = row.get(OWNER_FIELD).and_then(Value::as_str);
        if owner != Some(user_id) {
            return Err(ServerStorageError::Forbidden(format!(
                "row '{}' must carry {} = '{}'",
                id, OWNER_FIELD, user_id
            )));
        }

        let body = serde_json::to_string(row).map_err(|e| ServerStorageError::Corrupt {
            store,
            id: id.to_string(),
            reason: e.to_string(),
        })?;

        let mut tx = self.pool.begin().await?;

        let existing: Option<(String,)> =
            sqlx::query_as(&format!("SELECT user_id FROM {} WHERE id = ?", store))
                .bind(id)
                .fetch_optional(&mut *tx)
                .await?;
        if let Some((existing_owner,)) = existing {
            if existing_owner != user_id {
                return Err(ServerStorageError::Forbidden(format!(
                    "row '{}' belongs to another user",
                    id
                )));
            }
        }

        sqlx::query(&format!(
            "INSERT INTO {} (id, user_id, body) VALUES (?, ?, ?) \
             ON CONFLICT(id) DO UPDATE SET body = excluded.body",
            store
        ))
        .bind(id)
        .bind(user_id)
        .bind(body)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Deletes the row if `user_id` owns it. Returns whether a row was removed.
    pub async fn delete(
        &self,
        user_id: &str,
        store: StoreName,
        id: &str,
    ) -> Result<bool, ServerStorageError> {
        let result = sqlx::query(&format!(
            "DELETE FROM {} WHERE id = ? AND user_id = ?",
            store
        ))
        .bind(id)
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}
