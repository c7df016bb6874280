//! Background propagation of local writes to the remote store.
//!
//! One worker task per store consumes an unbounded channel, so pushes for the
//! same record are applied remotely in the order they were made locally.
//! Callers never wait on a push; `flush` exists for callers that must know
//! the queue has drained (short-lived processes, tests).

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, warn};

use crate::models::{Record, StoreName};
use crate::remote::{RemoteError, RemoteStore, Severity};

/// Per-attempt limit used unless a policy sets its own.
pub const DEFAULT_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(30);

/// How often a failed push is attempted before it is dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    backoff: Duration,
    timeout: Duration,
}

impl RetryPolicy {
    /// `max_attempts` counts the first attempt and is clamped to at least 1.
    pub fn new(max_attempts: u32, backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff,
            timeout: DEFAULT_ATTEMPT_TIMEOUT,
        }
    }

    /// An attempt still pending after `timeout` counts as a network failure.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Single attempt. A failed push is logged and lost.
    pub fn none() -> Self {
        Self::new(1, Duration::ZERO)
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Linear backoff: the n-th retry waits n times the base delay.
    fn delay_after(&self, attempt: u32) -> Duration {
        self.backoff * attempt
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::none()
    }
}

#[derive(Debug)]
pub(crate) enum PushJob {
    Upsert { id: String, row: Record },
    Delete { id: String },
    Flush(oneshot::Sender<()>),
}

/// Counters since the queue was created.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncStats {
    pub pushed: u64,
    pub deleted: u64,
    pub failed: u64,
    /// Writes never sent because no user was authenticated.
    pub skipped: u64,
}

#[derive(Debug, Default)]
struct Counters {
    pushed: AtomicU64,
    deleted: AtomicU64,
    failed: AtomicU64,
    skipped: AtomicU64,
}

pub(crate) struct PushQueue {
    senders: HashMap<StoreName, mpsc::UnboundedSender<PushJob>>,
    counters: Arc<Counters>,
}

impl PushQueue {
    /// Spawns one worker per store. Must be called inside a tokio runtime.
    pub(crate) fn spawn(remote: Arc<dyn RemoteStore>, policy: RetryPolicy) -> Self {
        let counters = Arc::new(Counters::default());
        let mut senders = HashMap::new();

        for store in StoreName::ALL {
            let (tx, rx) = mpsc::unbounded_channel();
            tokio::spawn(run_worker(
                store,
                rx,
                Arc::clone(&remote),
                policy,
                Arc::clone(&counters),
            ));
            senders.insert(store, tx);
        }

        Self { senders, counters }
    }

    pub(crate) fn enqueue(&self, store: StoreName, job: PushJob) {
        let sent = self
            .senders
            .get(&store)
            .map(|tx| tx.send(job).is_ok())
            .unwrap_or(false);
        if !sent {
            error!(store = %store, "Push worker is gone; change kept local only");
            self.counters.failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn record_skip(&self) {
        self.counters.skipped.fetch_add(1, Ordering::Relaxed);
    }

    /// Waits until every job enqueued before this call has been processed.
    pub(crate) async fn flush(&self) {
        let mut pending = Vec::with_capacity(self.senders.len());
        for tx in self.senders.values() {
            let (done_tx, done_rx) = oneshot::channel();
            if tx.send(PushJob::Flush(done_tx)).is_ok() {
                pending.push(done_rx);
            }
        }
        for done in pending {
            let _ = done.await;
        }
    }

    pub(crate) fn stats(&self) -> SyncStats {
        SyncStats {
            pushed: self.counters.pushed.load(Ordering::Relaxed),
            deleted: self.counters.deleted.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
            skipped: self.counters.skipped.load(Ordering::Relaxed),
        }
    }
}

async fn run_worker(
    store: StoreName,
    mut rx: mpsc::UnboundedReceiver<PushJob>,
    remote: Arc<dyn RemoteStore>,
    policy: RetryPolicy,
    counters: Arc<Counters>,
) {
    while let Some(job) = rx.recv().await {
        match job {
            PushJob::Upsert { id, row } => {
                let result =
                    with_retry(policy, store, "upsert", &id, || remote.upsert(store, row.clone()))
                        .await;
                match result {
                    Ok(()) => {
                        debug!(store = %store, id = %id, "Pushed record");
                        counters.pushed.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(e) => {
                        log_push_failure(store, "upsert", &id, &e);
                        counters.failed.fetch_add(1, Ordering::Relaxed);
                    }
                }
            }
            PushJob::Delete { id } => {
                let result =
                    with_retry(policy, store, "delete", &id, || remote.delete_by_id(store, &id))
                        .await;
                match result {
                    Ok(()) => {
                        debug!(store = %store, id = %id, "Propagated delete");
                        counters.deleted.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(e) => {
                        log_push_failure(store, "delete", &id, &e);
                        counters.failed.fetch_add(1, Ordering::Relaxed);
                    }
                }
            }
            PushJob::Flush(done) => {
                let _ = done.send(());
            }
        }
    }
    debug!(store = %store, "Push worker stopped");
}

async fn with_retry<F, Fut>(
    policy: RetryPolicy,
    store: StoreName,
    operation: &str,
    id: &str,
    mut attempt_fn: F,
) -> Result<(), RemoteError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<(), RemoteError>>,
{
    let mut attempt = 1;
    loop {
        let outcome = match tokio::time::timeout(policy.timeout(), attempt_fn()).await {
            Ok(outcome) => outcome,
            Err(_) => Err(RemoteError::Network(format!(
                "no response after {} ms",
                policy.timeout().as_millis()
            ))),
        };
        match outcome {
            Ok(()) => return Ok(()),
            Err(e) if e.is_transient() && attempt < policy.max_attempts() => {
                debug!(
                    store = %store,
                    operation,
                    id,
                    attempt,
                    error = %e,
                    "Push attempt failed, retrying"
                );
                tokio::time::sleep(policy.delay_after(attempt)).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

fn log_push_failure(store: StoreName, operation: &str, id: &str, e: &RemoteError) {
    match e.severity() {
        Severity::Warning => warn!(
            store = %store,
            operation,
            id,
            category = e.category(),
            severity = %e.severity(),
            error = %e,
            "Push failed; the change stays local until this record is written again"
        ),
        Severity::Error => error!(
            store = %store,
            operation,
            id,
            category = e.category(),
            severity = %e.severity(),
            error = %e,
            "Push failed; the change stays local until this record is written again"
        ),
    }
}
