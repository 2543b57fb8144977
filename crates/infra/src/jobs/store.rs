//! Job storage implementations.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use docsync_core::{ConnectorId, JobId};

use super::types::Job;

/// Process-local job registry.
///
/// All operations are safe to call concurrently without external locking.
pub trait JobStore: Send + Sync {
    /// Insert a new `pending` job under a freshly generated id.
    fn create_job(&self, connector_id: ConnectorId) -> Job;

    fn fetch_job(&self, id: JobId) -> Result<Job, JobStoreError>;

    /// Snapshot of all jobs. Order is unspecified.
    fn fetch_all(&self) -> Vec<Job>;

    fn delete_job(&self, id: JobId) -> Result<(), JobStoreError>;

    /// Apply `mutate` to the stored job in place and return the new value.
    fn update_job(
        &self,
        id: JobId,
        mutate: &mut dyn FnMut(&mut Job),
    ) -> Result<Job, JobStoreError>;
}

/// Job store error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum JobStoreError {
    #[error("job not found: {0}")]
    NotFound(JobId),
}

/// In-memory job store for tests/dev and the running agent.
#[derive(Debug, Default)]
pub struct InMemoryJobStore {
    jobs: RwLock<HashMap<JobId, Job>>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    pub fn len(&self) -> usize {
        self.jobs.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl JobStore for InMemoryJobStore {
    fn create_job(&self, connector_id: ConnectorId) -> Job {
        let mut jobs = self.jobs.write().unwrap_or_else(PoisonError::into_inner);

        let mut id = JobId::new();
        while jobs.contains_key(&id) {
            id = JobId::new();
        }

        let job = Job::new(id, connector_id);
        jobs.insert(id, job.clone());
        job
    }

    fn fetch_job(&self, id: JobId) -> Result<Job, JobStoreError> {
        let jobs = self.jobs.read().unwrap_or_else(PoisonError::into_inner);
        jobs.get(&id).cloned().ok_or(JobStoreError::NotFound(id))
    }

    fn fetch_all(&self) -> Vec<Job> {
        let jobs = self.jobs.read().unwrap_or_else(PoisonError::into_inner);
        jobs.values().cloned().collect()
    }

    fn delete_job(&self, id: JobId) -> Result<(), JobStoreError> {
        let mut jobs = self.jobs.write().unwrap_or_else(PoisonError::into_inner);
        jobs.remove(&id).map(|_| ()).ok_or(JobStoreError::NotFound(id))
    }

    fn update_job(
        &self,
        id: JobId,
        mutate: &mut dyn FnMut(&mut Job),
    ) -> Result<Job, JobStoreError> {
        let mut jobs = self.jobs.write().unwrap_or_else(PoisonError::into_inner);
        let job = jobs.get_mut(&id).ok_or(JobStoreError::NotFound(id))?;
        mutate(job);
        // The id is the key; a mutation must not move the job.
        job.id = id;
        Ok(job.clone())
    }
}

impl<S> JobStore for Arc<S>
where
    S: JobStore + ?Sized,
{
    fn create_job(&self, connector_id: ConnectorId) -> Job {
        (**self).create_job(connector_id)
    }

    fn fetch_job(&self, id: JobId) -> Result<Job, JobStoreError> {
        (**self).fetch_job(id)
    }

    fn fetch_all(&self) -> Vec<Job> {
        (**self).fetch_all()
    }

    fn delete_job(&self, id: JobId) -> Result<(), JobStoreError> {
        (**self).delete_job(id)
    }

    fn update_job(
        &self,
        id: JobId,
        mutate: &mut dyn FnMut(&mut Job),
    ) -> Result<Job, JobStoreError> {
        (**self).update_job(id, mutate)
    }
}
