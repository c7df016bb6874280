//! Access to the hosted per-user tables.
//!
//! Implementations perform no retries; retry policy belongs to the sync
//! coordinator.

mod http;
mod memory;

pub use http::{check_server, RestRemote};
pub use memory::MemoryRemote;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::{Record, StoreName};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteError {
    /// Request never got a response (offline, DNS, connection reset).
    #[error("Network error: {0}")]
    Network(String),
    /// Missing, invalid or expired credentials.
    #[error("Authentication failed: {0}")]
    Unauthorized(String),
    /// The server refused the request (ownership mismatch, bad row).
    #[error("Request rejected ({status}): {message}")]
    Rejected { status: u16, message: String },
    #[error("Server error ({status}): {message}")]
    Server { status: u16, message: String },
    #[error("Invalid response: {0}")]
    Decode(String),
    #[error("Remote store not configured")]
    NotConfigured,
}

impl RemoteError {
    /// Short category name used in log fields.
    pub fn category(&self) -> &'static str {
        match self {
            RemoteError::Network(_) => "network",
            RemoteError::Unauthorized(_) => "auth",
            RemoteError::Rejected { .. } => "rejected",
            RemoteError::Server { .. } => "server",
            RemoteError::Decode(_) => "decode",
            RemoteError::NotConfigured => "not_configured",
        }
    }

    /// Whether the same request may succeed if sent again later.
    pub fn is_transient(&self) -> bool {
        matches!(self, RemoteError::Network(_) | RemoteError::Server { .. })
    }

    pub fn severity(&self) -> Severity {
        match self {
            RemoteError::Network(_) | RemoteError::Server { .. } => Severity::Warning,
            RemoteError::Unauthorized(_)
            | RemoteError::Rejected { .. }
            | RemoteError::Decode(_)
            | RemoteError::NotConfigured => Severity::Error,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Warning,
    Error,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Warning => write!(f, "warning"),
            Severity::Error => write!(f, "error"),
        }
    }
}

/// One hosted table per store, scoped to the authenticated user.
///
/// Rows are in the remote shape (see [`crate::mapper`]). `upsert` expects the
/// ownership column to be attached already.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    async fn select_all(&self, store: StoreName) -> Result<Vec<Record>, RemoteError>;

    async fn upsert(&self, store: StoreName, row: Record) -> Result<(), RemoteError>;

    async fn delete_by_id(&self, store: StoreName, id: &str) -> Result<(), RemoteError>;
}

/// Stand-in used when no remote is configured. Every call fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct Disconnected;

#[async_trait]
impl RemoteStore for Disconnected {
    async fn select_all(&self, _store: StoreName) -> Result<Vec<Record>, RemoteError> {
        Err(RemoteError::NotConfigured)
    }

    async fn upsert(&self, _store: StoreName, _row: Record) -> Result<(), RemoteError> {
        Err(RemoteError::NotConfigured)
    }

    async fn delete_by_id(&self, _store: StoreName, _id: &str) -> Result<(), RemoteError> {
        Err(RemoteError::NotConfigured)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_errors() {
        assert!(RemoteError::Network("reset".into()).is_transient());
        assert!(RemoteError::Server {
            status: 503,
            message: "busy".into()
        }
        .is_transient());
        assert!(!RemoteError::Unauthorized("expired".into()).is_transient());
        assert!(!RemoteError::NotConfigured.is_transient());
    }

    #[test]
    fn test_categories_and_severity() {
        let err = RemoteError::Rejected {
            status: 403,
            message: "not yours".into(),
        };
        assert_eq!(err.category(), "rejected");
        assert_eq!(err.severity(), Severity::Error);
        assert_eq!(RemoteError::Network("x".into()).severity(), Severity::Warning);
        assert_eq!(RemoteError::NotConfigured.severity(), Severity::Error);
    }

    #[tokio::test]
    async fn test_disconnected_always_fails() {
        let remote = Disconnected;
        assert_eq!(
            remote.select_all(StoreName::Tasks).await,
            Err(RemoteError::NotConfigured)
        );
        assert_eq!(
            remote.delete_by_id(StoreName::Tasks, "t1").await,
            Err(RemoteError::NotConfigured)
        );
    }
}
