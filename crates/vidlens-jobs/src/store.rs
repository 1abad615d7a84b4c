//! Job storage abstraction.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;
use vidlens_models::{Job, JobId, Transition};

use crate::error::JobsResult;
use crate::memory::InMemoryJobStore;
use crate::redis_store::RedisJobStore;

/// Key-value storage of jobs.
///
/// `transition` must be atomic per job: readers observe either the state
/// before or the state after, never a mix.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert a new job. Fails if the id is taken.
    async fn insert(&self, job: Job) -> JobsResult<()>;

    async fn get(&self, id: &JobId) -> JobsResult<Option<Job>>;

    /// Apply a transition and return the updated job.
    async fn transition(&self, id: &JobId, transition: Transition) -> JobsResult<Job>;

    async fn remove(&self, id: &JobId) -> JobsResult<Option<Job>>;

    /// Snapshot of every stored job.
    async fn list(&self) -> JobsResult<Vec<Job>>;

    async fn len(&self) -> JobsResult<usize>;

    /// Check the backend is reachable.
    async fn ping(&self) -> JobsResult<()> {
        Ok(())
    }

    /// Backend name for logs and readiness output.
    fn backend(&self) -> &'static str;
}

/// Which store backs the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreBackend {
    Memory,
    Redis { url: String, key_prefix: String },
}

/// Store configuration.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub backend: StoreBackend,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Memory,
        }
    }
}

impl StoreConfig {
    /// Create config from `JOB_STORE`, `REDIS_URL` and `JOB_KEY_PREFIX`.
    pub fn from_env() -> Self {
        let backend = match std::env::var("JOB_STORE")
            .unwrap_or_default()
            .to_ascii_lowercase()
            .as_str()
        {
            "redis" => StoreBackend::Redis {
                url: std::env::var("REDIS_URL")
                    .unwrap_or_else(|_| "redis://localhost:6379".to_string()),
                key_prefix: std::env::var("JOB_KEY_PREFIX")
                    .unwrap_or_else(|_| "vidlens".to_string()),
            },
            _ => StoreBackend::Memory,
        };
        Self { backend }
    }

    /// Build the configured store.
    pub async fn build(&self) -> JobsResult<Arc<dyn JobStore>> {
        let store: Arc<dyn JobStore> = match &self.backend {
            StoreBackend::Memory => Arc::new(InMemoryJobStore::new()),
            StoreBackend::Redis { url, key_prefix } => {
                let store = RedisJobStore::new(url, key_prefix.clone())?;
                store.ping().await?;
                Arc::new(store)
            }
        };
        info!(backend = store.backend(), "Job store ready");
        Ok(store)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_memory() {
        assert_eq!(StoreConfig::default().backend, StoreBackend::Memory);
    }

    #[tokio::test]
    async fn test_build_memory() {
        let store = StoreConfig::default().build().await.unwrap();
        assert_eq!(store.backend(), "memory");
        assert_eq!(store.len().await.unwrap(), 0);
    }
}
