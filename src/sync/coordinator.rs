use std::sync::Arc;

use futures::future::join_all;
use serde_json::Value;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use super::push_queue::{PushJob, PushQueue, RetryPolicy, SyncStats};
use super::session::{Session, SessionState};
use crate::db::LocalStore;
use crate::mapper::{self, OWNER_FIELD};
use crate::models::{record_id, Record, StoreName};
use crate::remote::RemoteStore;

/// Result of pulling one store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PullOutcome {
    Pulled { store: StoreName, count: usize },
    Failed { store: StoreName, reason: String },
}

impl PullOutcome {
    pub fn store(&self) -> StoreName {
        match self {
            PullOutcome::Pulled { store, .. } | PullOutcome::Failed { store, .. } => *store,
        }
    }
}

/// Per-store results of a full pull. Stores fail independently.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PullReport {
    pub outcomes: Vec<PullOutcome>,
}

impl PullReport {
    pub fn pulled_total(&self) -> usize {
        self.outcomes
            .iter()
            .map(|o| match o {
                PullOutcome::Pulled { count, .. } => *count,
                PullOutcome::Failed { .. } => 0,
            })
            .sum()
    }

    pub fn failures(&self) -> impl Iterator<Item = &PullOutcome> {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, PullOutcome::Failed { .. }))
    }

    pub fn is_complete(&self) -> bool {
        self.failures().next().is_none()
    }
}

/// Owns the two sync policies: remote is truth when a session starts, local
/// is truth for every write after that.
pub struct SyncCoordinator {
    local: Arc<LocalStore>,
    remote: Arc<dyn RemoteStore>,
    queue: PushQueue,
    session: watch::Sender<Session>,
}

impl SyncCoordinator {
    /// Spawns the push workers. Must be called inside a tokio runtime.
    pub fn new(local: Arc<LocalStore>, remote: Arc<dyn RemoteStore>, policy: RetryPolicy) -> Self {
        let queue = PushQueue::spawn(Arc::clone(&remote), policy);
        let (session, _) = watch::channel(Session::unauthenticated());
        Self {
            local,
            remote,
            queue,
            session,
        }
    }

    pub fn session(&self) -> Session {
        self.session.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Session> {
        self.session.subscribe()
    }

    pub fn current_user(&self) -> Option<String> {
        self.session.borrow().user_id.clone()
    }

    /// Starts a session for `user_id` and pulls every store.
    ///
    /// Returns `None` without pulling when that user is already synced.
    pub async fn start_session(&self, user_id: &str) -> Option<PullReport> {
        let already_synced = self.session.borrow().is_synced_as(user_id);
        if already_synced {
            debug!(user_id, "Session already synced; skipping pull");
            return None;
        }

        self.session.send_replace(Session {
            user_id: Some(user_id.to_string()),
            state: SessionState::Pulling,
        });
        info!(user_id, "Session started, pulling remote data");

        let report = self.pull_all().await;

        self.session.send_modify(|session| {
            if session.user_id.as_deref() == Some(user_id) {
                session.state = SessionState::Synced;
            }
        });
        info!(
            user_id,
            pulled = report.pulled_total(),
            failed_stores = report.failures().count(),
            "Pull finished"
        );

        Some(report)
    }

    /// Ends the session. Local data stays in place as an offline cache.
    pub fn end_session(&self) {
        let previous = self.session.send_replace(Session::unauthenticated());
        if let Some(user_id) = previous.user_id {
            info!(user_id = %user_id, "Session ended");
        }
    }

    /// Overwrites local records with every remote row, store by store.
    ///
    /// Local records absent remotely are left untouched. A failing store
    /// keeps its stale local data and does not affect the others.
    pub async fn pull_all(&self) -> PullReport {
        let outcomes = join_all(StoreName::ALL.into_iter().map(|store| self.pull_store(store))).await;
        PullReport { outcomes }
    }

    async fn pull_store(&self, store: StoreName) -> PullOutcome {
        let rows = match self.remote.select_all(store).await {
            Ok(rows) => rows,
            Err(e) => {
                warn!(
                    store = %store,
                    category = e.category(),
                    error = %e,
                    "Pull failed; keeping local data"
                );
                return PullOutcome::Failed {
                    store,
                    reason: e.to_string(),
                };
            }
        };

        let records: Vec<Record> = rows
            .iter()
            .map(mapper::to_local_shape)
            .filter(|record| {
                let has_id = record_id(record).is_some();
                if !has_id {
                    warn!(store = %store, "Skipping pulled row without an id");
                }
                has_id
            })
            .collect();

        // Written straight to the local store: echoing pulled rows back to
        // the remote would only repeat what it already has.
        match self.local.put_all(store, &records).await {
            Ok(()) => {
                debug!(store = %store, count = records.len(), "Pulled store");
                PullOutcome::Pulled {
                    store,
                    count: records.len(),
                }
            }
            Err(e) => {
                error!(store = %store, error = %e, "Failed to write pulled rows locally");
                PullOutcome::Failed {
                    store,
                    reason: e.to_string(),
                }
            }
        }
    }

    /// Queues a push of `record`. Returns immediately.
    pub fn push_upsert(&self, store: StoreName, record: &Record) {
        let Some(user_id) = self.current_user() else {
            debug!(store = %store, "No authenticated user; write kept local only");
            self.queue.record_skip();
            return;
        };
        let Some(id) = record_id(record).map(str::to_string) else {
            warn!(store = %store, "Record without id not pushed");
            self.queue.record_skip();
            return;
        };

        let mut row = mapper::to_remote_shape(store, record);
        row.insert(OWNER_FIELD.to_string(), Value::String(user_id));
        self.queue.enqueue(store, PushJob::Upsert { id, row });
    }

    /// Queues propagation of a local delete. Returns immediately.
    pub fn push_delete(&self, store: StoreName, id: &str) {
        if self.current_user().is_none() {
            debug!(store = %store, id, "No authenticated user; delete kept local only");
            self.queue.record_skip();
            return;
        }
        self.queue.enqueue(store, PushJob::Delete { id: id.to_string() });
    }

    /// Waits for every queued push to finish.
    pub async fn flush(&self) {
        self.queue.flush().await;
    }

    pub fn stats(&self) -> SyncStats {
        self.queue.stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::{MemoryRemote, RemoteError};
    use serde_json::json;
    use tempfile::TempDir;

    struct TestContext {
        coordinator: SyncCoordinator,
        local: Arc<LocalStore>,
        remote: Arc<MemoryRemote>,
        _temp_dir: TempDir,
    }

    fn setup() -> TestContext {
        let temp_dir = TempDir::new().unwrap();
        let local = Arc::new(LocalStore::new(temp_dir.path().join("local.db")));
        let remote = Arc::new(MemoryRemote::new("u1"));
        let coordinator = SyncCoordinator::new(local.clone(), remote.clone(), RetryPolicy::none());
        TestContext {
            coordinator,
            local,
            remote,
            _temp_dir: temp_dir,
        }
    }

    fn obj(value: Value) -> Record {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn test_session_state_transitions() {
        let ctx = setup();
        let mut rx = ctx.coordinator.subscribe();
        assert_eq!(ctx.coordinator.session().state, SessionState::Unauthenticated);

        ctx.coordinator.start_session("u1").await.unwrap();
        assert_eq!(ctx.coordinator.session().state, SessionState::Synced);
        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().user_id.as_deref(), Some("u1"));

        ctx.coordinator.end_session();
        assert_eq!(ctx.coordinator.session(), Session::unauthenticated());
    }

    #[tokio::test]
    async fn test_same_user_does_not_pull_twice() {
        let ctx = setup();
        assert!(ctx.coordinator.start_session("u1").await.is_some());
        let calls = ctx.remote.call_count();

        assert!(ctx.coordinator.start_session("u1").await.is_none());
        assert_eq!(ctx.remote.call_count(), calls);
    }

    #[tokio::test]
    async fn test_pull_overwrites_and_keeps_local_only_records() {
        let ctx = setup();
        ctx.local
            .put(StoreName::Tasks, &obj(json!({"id": "t1", "title": "local only"})))
            .await
            .unwrap();
        ctx.local
            .put(StoreName::Tasks, &obj(json!({"id": "t2", "title": "newer local"})))
            .await
            .unwrap();
        ctx.remote.insert_row(
            StoreName::Tasks,
            obj(json!({"id": "t2", "title": "remote", "is_completed": true, "user_id": "u1"})),
        );

        let report = ctx.coordinator.start_session("u1").await.unwrap();

        assert!(report.is_complete());
        assert_eq!(report.pulled_total(), 1);
        let t1 = ctx.local.get(StoreName::Tasks, "t1").await.unwrap().unwrap();
        assert_eq!(t1.get("title"), Some(&json!("local only")));
        let t2 = ctx.local.get(StoreName::Tasks, "t2").await.unwrap().unwrap();
        assert_eq!(
            Value::Object(t2),
            json!({"id": "t2", "title": "remote", "isCompleted": true})
        );
    }

    #[tokio::test]
    async fn test_pull_does_not_echo_pushes() {
        let ctx = setup();
        ctx.remote.insert_row(
            StoreName::Memories,
            obj(json!({"id": "m1", "content": "tea", "user_id": "u1"})),
        );

        ctx.coordinator.start_session("u1").await.unwrap();
        ctx.coordinator.flush().await;

        assert_eq!(ctx.coordinator.stats().pushed, 0);
    }

    #[tokio::test]
    async fn test_pull_failure_reported_per_store() {
        let ctx = setup();
        ctx.remote.set_online(false);

        let report = ctx.coordinator.pull_all().await;

        assert_eq!(report.failures().count(), StoreName::ALL.len());
        assert_eq!(report.outcomes.len(), StoreName::ALL.len());
    }

    struct RowsWithoutIds;

    #[async_trait::async_trait]
    impl RemoteStore for RowsWithoutIds {
        async fn select_all(&self, _store: StoreName) -> Result<Vec<Record>, RemoteError> {
            Ok(vec![
                obj(json!({"id": "ok", "content": "fine", "user_id": "u1"})),
                obj(json!({"content": "orphan", "user_id": "u1"})),
            ])
        }

        async fn upsert(&self, _store: StoreName, _row: Record) -> Result<(), RemoteError> {
            Ok(())
        }

        async fn delete_by_id(&self, _store: StoreName, _id: &str) -> Result<(), RemoteError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_pull_skips_rows_without_id() {
        let temp_dir = TempDir::new().unwrap();
        let local = Arc::new(LocalStore::new(temp_dir.path().join("local.db")));
        let coordinator =
            SyncCoordinator::new(local.clone(), Arc::new(RowsWithoutIds), RetryPolicy::none());

        let report = coordinator.pull_all().await;

        assert!(report.is_complete());
        assert_eq!(local.count(StoreName::Thoughts).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_one_failing_store_does_not_block_others() {
        struct FailingTasks(MemoryRemote);

        #[async_trait::async_trait]
        impl RemoteStore for FailingTasks {
            async fn select_all(&self, store: StoreName) -> Result<Vec<Record>, RemoteError> {
                if store == StoreName::Tasks {
                    return Err(RemoteError::Server {
                        status: 500,
                        message: "boom".into(),
                    });
                }
                self.0.select_all(store).await
            }

            async fn upsert(&self, store: StoreName, row: Record) -> Result<(), RemoteError> {
                self.0.upsert(store, row).await
            }

            async fn delete_by_id(&self, store: StoreName, id: &str) -> Result<(), RemoteError> {
                self.0.delete_by_id(store, id).await
            }
        }

        let temp_dir = TempDir::new().unwrap();
        let local = Arc::new(LocalStore::new(temp_dir.path().join("local.db")));
        let inner = MemoryRemote::new("u1");
        inner.insert_row(
            StoreName::Habits,
            obj(json!({"id": "h1", "name": "Run", "user_id": "u1"})),
        );
        local
            .put(StoreName::Tasks, &obj(json!({"id": "t1", "title": "stale"})))
            .await
            .unwrap();
        let coordinator =
            SyncCoordinator::new(local.clone(), Arc::new(FailingTasks(inner)), RetryPolicy::none());

        let report = coordinator.start_session("u1").await.unwrap();

        let failed: Vec<StoreName> = report.failures().map(PullOutcome::store).collect();
        assert_eq!(failed, vec![StoreName::Tasks]);
        assert_eq!(local.count(StoreName::Habits).await.unwrap(), 1);
        assert_eq!(local.count(StoreName::Tasks).await.unwrap(), 1);
        assert_eq!(coordinator.session().state, SessionState::Synced);
    }

    #[tokio::test]
    async fn test_push_attaches_owner_and_maps_fields() {
        let ctx = setup();
        ctx.coordinator.start_session("u1").await.unwrap();

        let record = obj(json!({
            "id": "t1",
            "title": "Buy milk",
            "dueDate": "2024-01-01T00:00:00Z",
            "isCompleted": false,
            "attachments": ["receipt.png"]
        }));
        ctx.coordinator.push_upsert(StoreName::Tasks, &record);
        ctx.coordinator.flush().await;

        let row = ctx.remote.row(StoreName::Tasks, "t1").unwrap();
        assert_eq!(
            Value::Object(row),
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
    async fn test_push_without_session_is_skipped() {
        let ctx = setup();

        ctx.coordinator
            .push_upsert(StoreName::Journal, &obj(json!({"id": "j1", "content": "x"})));
        ctx.coordinator.push_delete(StoreName::Journal, "j1");
        ctx.coordinator.flush().await;

        assert_eq!(ctx.coordinator.stats().skipped, 2);
        assert_eq!(ctx.remote.call_count(), 0);
    }
}
