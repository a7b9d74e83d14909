//! Single-flight background jobs.
//!
//! At most one job per [`JobKind`] runs at a time. Starting a job aborts the
//! one already running under the same kind; its caller gets `Cancelled`.

use crate::{Error, Result};
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::Mutex;
use tokio::task::{AbortHandle, JoinError};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobKind {
    Unlock,
    Login,
    Synchronization,
}

#[derive(Default)]
pub(crate) struct JobRegistry {
    running: Mutex<HashMap<JobKind, (u64, AbortHandle)>>,
    next_id: AtomicU64,
}

impl JobRegistry {
    /// Run `job` as the only job of `kind`, aborting its predecessor
    pub(crate) async fn run<F, T>(&self, kind: JobKind, job: F) -> Result<T>
    where
        F: Future<Output = Result<T>> + Send + 'static,
        T: Send + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);

        // Spawn under the registry lock so `abort` never misses a fresh job
        let handle = {
            let mut running = self.running.lock().await;
            let handle = tokio::spawn(job);
            if let Some((_, previous)) = running.insert(kind, (id, handle.abort_handle())) {
                debug!("Cancelling running {:?} job", kind);
                previous.abort();
            }
            handle
        };

        let outcome = handle.await;

        let mut running = self.running.lock().await;
        if running.get(&kind).map(|(current, _)| *current) == Some(id) {
            running.remove(&kind);
        }
        drop(running);

        outcome.unwrap_or_else(|e| Err(join_error(e)))
    }

    /// Abort the running job of `kind`, if any
    pub(crate) async fn abort(&self, kind: JobKind) {
        if let Some((_, handle)) = self.running.lock().await.remove(&kind) {
            debug!("Aborting {:?} job", kind);
            handle.abort();
        }
    }

    pub(crate) async fn abort_all(&self) {
        for (kind, (_, handle)) in self.running.lock().await.drain() {
            debug!("Aborting {:?} job", kind);
            handle.abort();
        }
    }
}

/// Run CPU-bound work (key derivation, RSA) off the async executor
pub(crate) async fn blocking<F, T>(work: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .unwrap_or_else(|e| Err(join_error(e)))
}

fn join_error(error: JoinError) -> Error {
    if error.is_panic() {
        std::panic::resume_unwind(error.into_panic());
    }
    Error::Cancelled
}
