//! Process-local job store.

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use vidlens_models::{Job, JobId, Transition};

use crate::error::{JobsError, JobsResult};
use crate::store::JobStore;

/// Job store over a sharded concurrent map.
///
/// Each transition runs under its entry's write lock, so status and payload
/// change together for readers.
#[derive(Debug, Default)]
pub struct InMemoryJobStore {
    jobs: DashMap<JobId, Job>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn insert(&self, job: Job) -> JobsResult<()> {
        match self.jobs.entry(job.id.clone()) {
            Entry::Occupied(_) => Err(JobsError::AlreadyExists(job.id)),
            Entry::Vacant(slot) => {
                slot.insert(job);
                Ok(())
            }
        }
    }

    async fn get(&self, id: &JobId) -> JobsResult<Option<Job>> {
        Ok(self.jobs.get(id).map(|j| j.value().clone()))
    }

    async fn transition(&self, id: &JobId, transition: Transition) -> JobsResult<Job> {
        let mut job = self
            .jobs
            .get_mut(id)
            .ok_or_else(|| JobsError::NotFound(id.clone()))?;
        job.apply(transition)
            .map_err(|e| JobsError::transition(id, e))?;
        Ok(job.clone())
    }

    async fn remove(&self, id: &JobId) -> JobsResult<Option<Job>> {
        Ok(self.jobs.remove(id).map(|(_, job)| job))
    }

    async fn list(&self) -> JobsResult<Vec<Job>> {
        Ok(self.jobs.iter().map(|j| j.value().clone()).collect())
    }

    async fn len(&self) -> JobsResult<usize> {
        Ok(self.jobs.len())
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use vidlens_models::{AnalysisResult, JobError, JobErrorKind, JobSource, JobStatus};

    fn job() -> Job {
        Job::new(JobId::new(), JobSource::Upload, "a.mp4", "/tmp/a.mp4")
    }

    #[tokio::test]
    async fn test_insert_get_remove() {
        let store = InMemoryJobStore::new();
        let job = job();
        let id = job.id.clone();

        store.insert(job.clone()).await.unwrap();
        assert!(matches!(
            store.insert(job).await,
            Err(JobsError::AlreadyExists(_))
        ));
        assert_eq!(store.get(&id).await.unwrap().unwrap().status, JobStatus::Queued);
        assert_eq!(store.len().await.unwrap(), 1);

        assert!(store.remove(&id).await.unwrap().is_some());
        assert!(store.get(&id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_transition_unknown_job() {
        let store = InMemoryJobStore::new();
        let err = store
            .transition(&JobId::new(), Transition::Start)
            .await
            .unwrap_err();
        assert!(matches!(err, JobsError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_illegal_transition_leaves_job_untouched() {
        let store = InMemoryJobStore::new();
        let job = job();
        let id = job.id.clone();
        store.insert(job).await.unwrap();

        let err = store
            .transition(
                &id,
                Transition::Complete {
                    result: AnalysisResult::default(),
                    stages: vec![],
                },
            )
            .await
            .unwrap_err();
        assert!(err.is_illegal_transition());
        assert_eq!(store.get(&id).await.unwrap().unwrap().status, JobStatus::Queued);
    }

    #[tokio::test]
    async fn test_concurrent_writers_on_different_jobs() {
        let store = Arc::new(InMemoryJobStore::new());
        let mut ids = Vec::new();
        for _ in 0..32 {
            let job = job();
            ids.push(job.id.clone());
            store.insert(job).await.unwrap();
        }

        let handles: Vec<_> = ids
            .iter()
            .cloned()
            .enumerate()
            .map(|(i, id)| {
                let store = store.clone();
                tokio::spawn(async move {
                    store.transition(&id, Transition::Start).await.unwrap();
                    let t = if i % 2 == 0 {
                        Transition::Complete {
                            result: AnalysisResult::default(),
                            stages: vec![],
                        }
                    } else {
                        Transition::Fail {
                            error: JobError::new(JobErrorKind::StageFailed, "boom"),
                            stages: vec![],
                        }
                    };
                    store.transition(&id, t).await.unwrap();
                })
            })
            .collect();
        for h in handles {
            h.await.unwrap();
        }

        for (i, id) in ids.iter().enumerate() {
            let job = store.get(id).await.unwrap().unwrap();
            if i % 2 == 0 {
                assert_eq!(job.status, JobStatus::Completed);
                assert!(job.result.is_some() && job.error.is_none());
            } else {
                assert_eq!(job.status, JobStatus::Failed);
                assert!(job.error.is_some() && job.result.is_none());
            }
        }
    }
}
