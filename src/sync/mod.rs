//! Keeps the local store and the remote tables in step.
//!
//! - On sign-in every store is pulled and the remote wins for each record it
//!   holds. Local records the remote has never seen are left alone.
//! - After that, every local write is pushed in the background. The local
//!   store is the source of truth; a failed push is logged and dropped.

mod coordinator;
mod push_queue;
mod session;

pub use coordinator::{PullOutcome, PullReport, SyncCoordinator};
pub use push_queue::{RetryPolicy, SyncStats};
pub use session::{Session, SessionState};
