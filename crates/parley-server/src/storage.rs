//! Async access to the SQLite store.
//!
//! `rusqlite` is blocking and its connection is not `Sync`, so every call is
//! shipped to the blocking pool with the connection behind a mutex. Each call
//! is bounded by the configured timeout; a call that overruns fails the
//! request with [`ServerError::StorageTimeout`] while the blocking work
//! finishes in the background.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use parley_store::Database;
use tracing::warn;

use crate::error::ServerError;

#[derive(Clone)]
pub struct Storage {
    db: Arc<Mutex<Database>>,
    timeout: Duration,
}

impl Storage {
    pub fn new(db: Database, timeout: Duration) -> Self {
        Self {
            db: Arc::new(Mutex::new(db)),
            timeout,
        }
    }

    /// Run `op` against the database on the blocking pool.
    pub async fn run<T, F>(&self, label: &'static str, op: F) -> Result<T, ServerError>
    where
        F: FnOnce(&Database) -> parley_store::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.db.clone();
        let task = tokio::task::spawn_blocking(move || {
            let guard = db
                .lock()
                .map_err(|_| ServerError::Internal("database lock poisoned".into()))?;
            op(&guard).map_err(ServerError::from)
        });

        match tokio::time::timeout(self.timeout, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_err)) => Err(ServerError::Internal(format!(
                "storage task {label} failed: {join_err}"
            ))),
            Err(_) => {
                warn!(op = label, timeout_ms = self.timeout.as_millis() as u64, "Storage call timed out");
                Err(ServerError::StorageTimeout)
            }
        }
    }
}
