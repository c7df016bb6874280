//! The hosted table service the REST remote client talks to.

mod auth;
mod routes;
mod storage;

pub use auth::{auth_middleware, ApiKeyEntry, ApiKeyStore, AuthUser};
pub use routes::{router, ApiError};
pub use storage::{RemoteTables, ServerStorageError, REMOTE_MIGRATOR};

use std::sync::Arc;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub api_keys: Arc<ApiKeyStore>,
    pub tables: RemoteTables,
}
