//! The single entry point the application uses for its data.
//!
//! Reads only ever touch the local store. Writes land locally first and are
//! then handed to the sync coordinator, which pushes them in the background.

use std::sync::Arc;

use thiserror::Error;
use tracing::{error, warn};

use crate::db::{LocalStore, LocalStoreError};
use crate::models::{record_id, Entity, Record, StoreName};
use crate::remote::RemoteStore;
use crate::sync::{PullReport, RetryPolicy, Session, SyncCoordinator, SyncStats};

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error(transparent)]
    Local(#[from] LocalStoreError),
    #[error("Failed to encode {store} record: {source}")]
    Encode {
        store: StoreName,
        source: serde_json::Error,
    },
}

pub struct Persistence {
    local: Arc<LocalStore>,
    coordinator: SyncCoordinator,
}

impl Persistence {
    /// Must be called inside a tokio runtime; the push workers are spawned here.
    pub fn new(local: Arc<LocalStore>, remote: Arc<dyn RemoteStore>, policy: RetryPolicy) -> Self {
        let coordinator = SyncCoordinator::new(Arc::clone(&local), remote, policy);
        Self { local, coordinator }
    }

    pub fn local(&self) -> &LocalStore {
        &self.local
    }

    /// Every entity of type `T` held locally.
    ///
    /// Records that no longer decode as `T` are skipped with a warning.
    pub async fn get_all<T: Entity>(&self) -> Result<Vec<T>, PersistenceError> {
        let records = self.get_records(T::STORE).await?;
        Ok(records
            .into_iter()
            .filter_map(|record| {
                let id = record_id(&record).unwrap_or_default().to_string();
                match T::from_record(record) {
                    Ok(entity) => Some(entity),
                    Err(e) => {
                        warn!(store = %T::STORE, id = %id, error = %e, "Skipping undecodable record");
                        None
                    }
                }
            })
            .collect())
    }

    pub async fn get_records(&self, store: StoreName) -> Result<Vec<Record>, PersistenceError> {
        self.local.get_all(store).await.map_err(|e| {
            error!(store = %store, error = %e, "Local read failed");
            PersistenceError::Local(e)
        })
    }

    /// Writes `item` locally, then queues its push.
    pub async fn save_item<T: Entity>(&self, item: &T) -> Result<(), PersistenceError> {
        let record = encode(item)?;
        self.save_record(T::STORE, record).await
    }

    /// Batch upsert of `items`. Records not in the batch are kept.
    pub async fn save_all<T: Entity>(&self, items: &[T]) -> Result<(), PersistenceError> {
        let records = items.iter().map(encode).collect::<Result<Vec<_>, _>>()?;
        self.save_records(T::STORE, records).await
    }

    pub async fn save_record(&self, store: StoreName, record: Record) -> Result<(), PersistenceError> {
        if let Err(e) = self.local.put(store, &record).await {
            error!(store = %store, error = %e, "Local write failed; nothing pushed");
            return Err(e.into());
        }
        self.coordinator.push_upsert(store, &record);
        Ok(())
    }

    pub async fn save_records(
        &self,
        store: StoreName,
        records: Vec<Record>,
    ) -> Result<(), PersistenceError> {
        if let Err(e) = self.local.put_all(store, &records).await {
            error!(
                store = %store,
                count = records.len(),
                error = %e,
                "Local batch write failed; nothing pushed"
            );
            return Err(e.into());
        }
        for record in &records {
            self.coordinator.push_upsert(store, record);
        }
        Ok(())
    }

    /// Removes `id` locally, then queues the remote delete. Absent ids are fine.
    pub async fn delete_item(&self, store: StoreName, id: &str) -> Result<(), PersistenceError> {
        if let Err(e) = self.local.delete(store, id).await {
            error!(store = %store, id, error = %e, "Local delete failed; nothing pushed");
            return Err(e.into());
        }
        self.coordinator.push_delete(store, id);
        Ok(())
    }

    /// Session boundary. `Some(user)` pulls everything for that user (unless
    /// already synced as them); `None` signs out and keeps local data.
    pub async fn set_auth(&self, user_id: Option<&str>) -> Option<PullReport> {
        match user_id {
            Some(user_id) => self.coordinator.start_session(user_id).await,
            None => {
                self.coordinator.end_session();
                None
            }
        }
    }

    pub async fn flush(&self) {
        self.coordinator.flush().await;
    }

    pub fn session(&self) -> Session {
        self.coordinator.session()
    }

    pub fn stats(&self) -> SyncStats {
        self.coordinator.stats()
    }
}

fn encode<T: Entity>(item: &T) -> Result<Record, PersistenceError> {
    item.to_record().map_err(|source| PersistenceError::Encode {
        store: T::STORE,
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Habit, Task};
    use crate::remote::MemoryRemote;
    use crate::sync::SessionState;
    use serde_json::{json, Value};
    use std::time::Duration;
    use tempfile::TempDir;

    struct TestContext {
        persistence: Persistence,
        remote: Arc<MemoryRemote>,
        _temp_dir: TempDir,
    }

    fn setup() -> TestContext {
        let temp_dir = TempDir::new().unwrap();
        let local = Arc::new(LocalStore::new(temp_dir.path().join("brainsync.db")));
        let remote = Arc::new(MemoryRemote::new("u1"));
        let persistence = Persistence::new(local, remote.clone(), RetryPolicy::none());
        TestContext {
            persistence,
            remote,
            _temp_dir: temp_dir,
        }
    }

    fn obj(value: Value) -> Record {
        value.as_object().cloned().unwrap()
    }

    fn buy_milk() -> Record {
        obj(json!({
            "id": "t1",
            "title": "Buy milk",
            "dueDate": "2024-01-01T00:00:00Z",
            "isCompleted": false
        }))
    }

    #[tokio::test]
    async fn test_saved_record_reads_back_and_pushes_remote_shape() {
        let ctx = setup();
        ctx.persistence.set_auth(Some("u1")).await;

        ctx.persistence
            .save_record(StoreName::Tasks, buy_milk())
            .await
            .unwrap();

        let records = ctx.persistence.get_records(StoreName::Tasks).await.unwrap();
        assert_eq!(records, vec![buy_milk()]);

        ctx.persistence.flush().await;
        assert_eq!(
            Value::Object(ctx.remote.row(StoreName::Tasks, "t1").unwrap()),
            json!({
                "id": "t1",
                "title": "Buy milk",
                "due_date": "2024-01-01T00:00:00Z",
                "is_completed": false,
                "user_id": "u1"
            })
        );
    }

    #[tokio::test]
    async fn test_push_does_not_block_save() {
        let ctx = setup();
        ctx.persistence.set_auth(Some("u1")).await;
        ctx.remote.set_latency(Some(Duration::from_millis(300)));

        ctx.persistence
            .save_record(StoreName::Tasks, buy_milk())
            .await
            .unwrap();

        assert_eq!(ctx.persistence.get_records(StoreName::Tasks).await.unwrap().len(), 1);
        assert!(ctx.remote.row(StoreName::Tasks, "t1").is_none());

        ctx.persistence.flush().await;
        assert!(ctx.remote.row(StoreName::Tasks, "t1").is_some());
    }

    #[tokio::test]
    async fn test_login_pull_merges_with_local_records() {
        let ctx = setup();
        ctx.persistence
            .save_record(StoreName::Tasks, obj(json!({"id": "t1", "title": "Local"})))
            .await
            .unwrap();
        ctx.remote.insert_row(
            StoreName::Tasks,
            obj(json!({"id": "t2", "due_date": null, "is_completed": true, "user_id": "u1"})),
        );

        let report = ctx.persistence.set_auth(Some("u1")).await.unwrap();
        assert!(report.is_complete());

        let mut records = ctx.persistence.get_records(StoreName::Tasks).await.unwrap();
        records.sort_by(|a, b| record_id(a).cmp(&record_id(b)));
        assert_eq!(
            records,
            vec![
                obj(json!({"id": "t1", "title": "Local"})),
                obj(json!({"id": "t2", "dueDate": null, "isCompleted": true})),
            ]
        );
        assert_eq!(ctx.persistence.session().state, SessionState::Synced);
    }

    #[tokio::test]
    async fn test_pull_twice_is_idempotent() {
        let ctx = setup();
        ctx.remote.insert_row(
            StoreName::Projects,
            obj(json!({"id": "p1", "title": "Home", "columns": [{"id": "c1"}], "user_id": "u1"})),
        );

        ctx.persistence.set_auth(Some("u1")).await;
        let first = ctx.persistence.get_records(StoreName::Projects).await.unwrap();
        ctx.persistence.set_auth(None).await;
        ctx.persistence.set_auth(Some("u1")).await;
        let second = ctx.persistence.get_records(StoreName::Projects).await.unwrap();

        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_offline_delete_removes_locally_only() {
        let ctx = setup();
        ctx.persistence.set_auth(Some("u1")).await;
        ctx.persistence
            .save_record(StoreName::Tasks, buy_milk())
            .await
            .unwrap();
        ctx.persistence.flush().await;

        ctx.remote.set_online(false);
        ctx.persistence.delete_item(StoreName::Tasks, "t1").await.unwrap();
        ctx.persistence.flush().await;

        assert!(ctx.persistence.get_records(StoreName::Tasks).await.unwrap().is_empty());
        assert!(ctx.remote.row(StoreName::Tasks, "t1").is_some());
        assert_eq!(ctx.persistence.stats().failed, 1);
    }

    #[tokio::test]
    async fn test_delete_absent_id_is_noop() {
        let ctx = setup();
        ctx.persistence
            .save_record(StoreName::Memories, obj(json!({"id": "m1", "content": "x"})))
            .await
            .unwrap();

        ctx.persistence.delete_item(StoreName::Memories, "missing").await.unwrap();

        assert_eq!(ctx.persistence.get_records(StoreName::Memories).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_same_id_saved_twice_keeps_second_payload() {
        let ctx = setup();
        let mut task = Task::new("first");
        ctx.persistence.save_item(&task).await.unwrap();
        task.title = "second".to_string();
        ctx.persistence.save_item(&task).await.unwrap();

        let tasks: Vec<Task> = ctx.persistence.get_all().await.unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].title, "second");
    }

    #[tokio::test]
    async fn test_save_all_does_not_delete_absent_records() {
        let ctx = setup();
        let run = Habit::new("Run");
        ctx.persistence.save_item(&run).await.unwrap();

        let batch = vec![Habit::new("Read"), Habit::new("Stretch")];
        ctx.persistence.save_all(&batch).await.unwrap();

        let habits: Vec<Habit> = ctx.persistence.get_all().await.unwrap();
        assert_eq!(habits.len(), 3);
    }

    #[tokio::test]
    async fn test_save_all_pushes_every_item() {
        let ctx = setup();
        ctx.persistence.set_auth(Some("u1")).await;

        let batch = vec![Task::new("a"), Task::new("b")];
        ctx.persistence.save_all(&batch).await.unwrap();
        ctx.persistence.flush().await;

        assert_eq!(ctx.remote.rows(StoreName::Tasks).len(), 2);
        assert_eq!(ctx.persistence.stats().pushed, 2);
    }

    #[tokio::test]
    async fn test_missing_id_surfaces_error_and_skips_push() {
        let ctx = setup();
        ctx.persistence.set_auth(Some("u1")).await;

        let err = ctx
            .persistence
            .save_record(StoreName::Thoughts, obj(json!({"content": "no id"})))
            .await
            .unwrap_err();
        ctx.persistence.flush().await;

        assert!(matches!(
            err,
            PersistenceError::Local(LocalStoreError::MissingId(StoreName::Thoughts))
        ));
        assert_eq!(ctx.persistence.stats(), SyncStats::default());
    }

    #[tokio::test]
    async fn test_get_all_skips_records_of_wrong_shape() {
        let ctx = setup();
        ctx.persistence
            .save_record(StoreName::Tasks, obj(json!({"id": "bad", "title": 42})))
            .await
            .unwrap();
        ctx.persistence.save_item(&Task::new("good")).await.unwrap();

        let tasks: Vec<Task> = ctx.persistence.get_all().await.unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].title, "good");
    }

    #[tokio::test]
    async fn test_logout_keeps_local_data_and_stops_pushing() {
        let ctx = setup();
        ctx.persistence.set_auth(Some("u1")).await;
        ctx.persistence.save_item(&Task::new("kept")).await.unwrap();
        ctx.persistence.set_auth(None).await;

        ctx.persistence.save_item(&Task::new("offline")).await.unwrap();
        ctx.persistence.flush().await;

        assert_eq!(ctx.persistence.get_all::<Task>().await.unwrap().len(), 2);
        assert_eq!(ctx.persistence.stats().skipped, 1);
        assert_eq!(ctx.remote.rows(StoreName::Tasks).len(), 1);
    }
}
