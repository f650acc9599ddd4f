//! Run history
//!
//! Every run, including skipped ones, is recorded so that dependency
//! gating can ask "did the latest run of this upstream succeed?" and the
//! CLI can show past runs.

#[cfg(feature = "sqlite")]
pub mod store;

#[cfg(feature = "sqlite")]
pub use store::SqliteRunHistory;

use anyhow::Result;
use uuid::Uuid;

use crate::core::run::BuildRun;

/// Trait for run history backends
#[async_trait::async_trait]
pub trait RunHistory: Send + Sync {
    /// Record a run, replacing any earlier record with the same id
    async fn record(&self, run: &BuildRun) -> Result<()>;

    /// Load a run by id
    async fn get(&self, run_id: Uuid) -> Result<Option<BuildRun>>;

    /// All runs of one configuration, most recent first
    async fn list(&self, configuration_id: &str) -> Result<Vec<BuildRun>>;

    /// Most recent run of one configuration
    async fn latest(&self, configuration_id: &str) -> Result<Option<BuildRun>> {
        Ok(self.list(configuration_id).await?.into_iter().next())
    }

    /// All configuration ids with recorded runs
    async fn list_configurations(&self) -> Result<Vec<String>>;
}

/// In-memory history (for testing or ephemeral use)
pub struct InMemoryHistory {
    runs: tokio::sync::RwLock<std::collections::HashMap<Uuid, BuildRun>>,
    by_configuration: tokio::sync::RwLock<std::collections::HashMap<String, Vec<Uuid>>>,
}

impl InMemoryHistory {
    pub fn new() -> Self {
        Self {
            runs: tokio::sync::RwLock::new(std::collections::HashMap::new()),
            by_configuration: tokio::sync::RwLock::new(std::collections::HashMap::new()),
        }
    }
}

impl Default for InMemoryHistory {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl RunHistory for InMemoryHistory {
    async fn record(&self, run: &BuildRun) -> Result<()> {
        let mut runs = self.runs.write().await;
        let replaced = runs.insert(run.id, run.clone()).is_some();

        if !replaced {
            let mut by_configuration = self.by_configuration.write().await;
            by_configuration
                .entry(run.configuration_id.clone())
                .or_insert_with(Vec::new)
                .push(run.id);
        }

        Ok(())
    }

    async fn get(&self, run_id: Uuid) -> Result<Option<BuildRun>> {
        let runs = self.runs.read().await;
        Ok(runs.get(&run_id).cloned())
    }

    async fn list(&self, configuration_id: &str) -> Result<Vec<BuildRun>> {
        let runs = self.runs.read().await;
        let by_configuration = self.by_configuration.read().await;

        match by_configuration.get(configuration_id) {
            // Insertion order is run-creation order; reverse for most recent first
            Some(ids) => Ok(ids
                .iter()
                .rev()
                .filter_map(|id| runs.get(id).cloned())
                .collect()),
            None => Ok(Vec::new()),
        }
    }

    async fn list_configurations(&self) -> Result<Vec<String>> {
        let by_configuration = self.by_configuration.read().await;
        Ok(by_configuration.keys().cloned().collect())
    }
}
