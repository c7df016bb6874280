use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use super::{RemoteError, RemoteStore};
use crate::mapper::OWNER_FIELD;
use crate::models::{record_id, Record, StoreName};

/// In-process remote store for a single user.
///
/// Connectivity and latency can be switched at runtime, which makes it the
/// remote of choice for tests and demos.
#[derive(Debug)]
pub struct MemoryRemote {
    user_id: String,
    tables: Mutex<HashMap<StoreName, BTreeMap<String, Record>>>,
    online: AtomicBool,
    latency: Mutex<Option<Duration>>,
    calls: AtomicUsize,
}

impl MemoryRemote {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            tables: Mutex::new(HashMap::new()),
            online: AtomicBool::new(true),
            latency: Mutex::new(None),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    /// Delays every call by `latency` before it takes effect.
    pub fn set_latency(&self, latency: Option<Duration>) {
        *lock(&self.latency) = latency;
    }

    /// Seeds a row as if another device had pushed it.
    pub fn insert_row(&self, store: StoreName, row: Record) {
        if let Some(id) = record_id(&row).map(str::to_string) {
            lock(&self.tables).entry(store).or_default().insert(id, row);
        }
    }

    pub fn row(&self, store: StoreName, id: &str) -> Option<Record> {
        lock(&self.tables)
            .get(&store)
            .and_then(|table| table.get(id).cloned())
    }

    pub fn rows(&self, store: StoreName) -> Vec<Record> {
        lock(&self.tables)
            .get(&store)
            .map(|table| table.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Number of calls that reached the store, successful or not.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    async fn enter(&self) -> Result<(), RemoteError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let latency = *lock(&self.latency);
        if let Some(delay) = latency {
            tokio::time::sleep(delay).await;
        }
        if self.online.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(RemoteError::Network("remote unreachable".to_string()))
        }
    }

    fn owned_by_user(&self, row: &Record) -> bool {
        row.get(OWNER_FIELD).and_then(|v| v.as_str()) == Some(self.user_id.as_str())
    }
}

#[async_trait]
impl RemoteStore for MemoryRemote {
    async fn select_all(&self, store: StoreName) -> Result<Vec<Record>, RemoteError> {
        self.enter().await?;
        Ok(self
            .rows(store)
            .into_iter()
            .filter(|row| self.owned_by_user(row))
            .collect())
    }

    async fn upsert(&self, store: StoreName, row: Record) -> Result<(), RemoteError> {
        self.enter().await?;

        let id = record_id(&row)
            .ok_or_else(|| RemoteError::Rejected {
                status: 400,
                message: "row has no id".to_string(),
            })?
            .to_string();
        if !self.owned_by_user(&row) {
            return Err(RemoteError::Rejected {
                status: 403,
                message: "row is not owned by the authenticated user".to_string(),
            });
        }

        let mut tables = lock(&self.tables);
        let table = tables.entry(store).or_default();
        if table.get(&id).is_some_and(|existing| !self.owned_by_user(existing)) {
            return Err(RemoteError::Rejected {
                status: 403,
                message: "row belongs to another user".to_string(),
            });
        }
        table.insert(id, row);
        Ok(())
    }

    async fn delete_by_id(&self, store: StoreName, id: &str) -> Result<(), RemoteError> {
        self.enter().await?;

        let mut tables = lock(&self.tables);
        if let Some(table) = tables.get_mut(&store) {
            if table.get(id).is_some_and(|row| self.owned_by_user(row)) {
                table.remove(id);
            }
        }
        Ok(())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
