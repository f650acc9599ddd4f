//! Worker pool and per-configuration run serialization
//!
//! Independent build configurations run concurrently, bounded by a pool of
//! worker permits. Runs of the same configuration are serialized through a
//! per-configuration lock unless the configuration opts into concurrent
//! runs.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedSemaphorePermit, Semaphore};

/// Bounded pool of run workers
#[derive(Debug, Clone)]
pub struct WorkerPool {
    permits: Arc<Semaphore>,
}

impl WorkerPool {
    pub fn new(size: usize) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(size.max(1))),
        }
    }

    /// Wait for a free worker. The permit is released when dropped.
    pub async fn acquire(&self) -> OwnedSemaphorePermit {
        self.permits
            .clone()
            .acquire_owned()
            .await
            .expect("worker pool semaphore is never closed")
    }
}

/// One async lock per configuration id, created on first use
#[derive(Debug, Default)]
pub struct ConfigurationLocks {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl ConfigurationLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// The lock guarding runs of one configuration
    pub async fn lock_for(&self, configuration_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks
            .entry(configuration_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}
