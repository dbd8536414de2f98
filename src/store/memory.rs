use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::{RelmonError, Result};
use crate::relmon::{CondorStatus, IntentKind, Job, JobStatus};
use crate::store::{Created, JobStore};

/// Job documents keyed by id. Shared by the in-memory and file stores.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(from = "Vec<Job>", into = "Vec<Job>")]
pub(crate) struct JobTable {
    jobs: HashMap<Uuid, Job>,
}

impl From<Vec<Job>> for JobTable {
    fn from(jobs: Vec<Job>) -> Self {
        Self {
            jobs: jobs.into_iter().map(|job| (job.id, job)).collect(),
        }
    }
}

impl From<JobTable> for Vec<Job> {
    fn from(table: JobTable) -> Self {
        table.sorted(|_| true)
    }
}

impl JobTable {
    pub(crate) fn get(&self, id: &Uuid) -> Option<Job> {
        self.jobs.get(id).cloned()
    }

    /// Ids and names are both unique.
    pub(crate) fn create(&mut self, mut job: Job) -> Created {
        if self.jobs.contains_key(&job.id) || self.jobs.values().any(|j| j.name == job.name) {
            return Created::AlreadyExists;
        }
        job.last_update = Some(Utc::now());
        self.jobs.insert(job.id, job.clone());
        Created::Inserted(job)
    }

    pub(crate) fn replace(&mut self, mut job: Job) -> Result<Job> {
        let Some(slot) = self.jobs.get_mut(&job.id) else {
            return Err(RelmonError::JobNotFound(job.id));
        };
        job.last_update = Some(Utc::now());
        *slot = job.clone();
        Ok(job)
    }

    pub(crate) fn delete(&mut self, id: &Uuid) -> bool {
        self.jobs.remove(id).is_some()
    }

    /// Puts back a document exactly as it was, for rollbacks.
    pub(crate) fn restore(&mut self, job: Job) {
        self.jobs.insert(job.id, job);
    }

    /// Matching jobs, oldest first.
    pub(crate) fn sorted(&self, filter: impl Fn(&Job) -> bool) -> Vec<Job> {
        let mut jobs: Vec<Job> = self.jobs.values().filter(|j| filter(j)).cloned().collect();
        jobs.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        jobs
    }

    pub(crate) fn by_status(&self, status: JobStatus) -> Vec<Job> {
        self.sorted(|job| job.status == status)
    }

    pub(crate) fn by_condor_status(&self, status: CondorStatus) -> Vec<Job> {
        self.sorted(|job| job.condor_status == status)
    }

    pub(crate) fn by_name(&self, name: &str) -> Vec<Job> {
        self.sorted(|job| job.name == name)
    }

    pub(crate) fn by_intent(&self, kind: IntentKind) -> Vec<Job> {
        self.sorted(|job| job.pending_intent.as_ref().map(|i| i.kind) == Some(kind))
    }
}

/// Volatile store, used by tests and when no store path is configured.
#[derive(Debug, Default)]
pub struct MemoryStore {
    table: RwLock<JobTable>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobStore for MemoryStore {
    async fn get(&self, id: &Uuid) -> Result<Option<Job>> {
        Ok(self.table.read().await.get(id))
    }

    async fn create(&self, job: Job) -> Result<Created> {
        Ok(self.table.write().await.create(job))
    }

    async fn replace(&self, job: Job) -> Result<Job> {
        self.table.write().await.replace(job)
    }

    async fn delete(&self, id: &Uuid) -> Result<bool> {
        Ok(self.table.write().await.delete(id))
    }

    async fn query_by_status(&self, status: JobStatus) -> Result<Vec<Job>> {
        Ok(self.table.read().await.by_status(status))
    }

    async fn query_by_condor_status(&self, status: CondorStatus) -> Result<Vec<Job>> {
        Ok(self.table.read().await.by_condor_status(status))
    }

    async fn query_by_name(&self, name: &str) -> Result<Vec<Job>> {
        Ok(self.table.read().await.by_name(name))
    }

    async fn query_by_intent(&self, kind: IntentKind) -> Result<Vec<Job>> {
        Ok(self.table.read().await.by_intent(kind))
    }

    async fn all(&self) -> Result<Vec<Job>> {
        Ok(self.table.read().await.sorted(|_| true))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relmon::{Category, HltMode, Intent};

    fn job(name: &str) -> Job {
        let category = Category::new("Generator", HltMode::No, true)
            .with_reference("ref")
            .with_target("tgt");
        Job::new(name, vec![category], None).unwrap()
    }

    #[tokio::test]
    async fn test_create_stamps_last_update() {
        let store = MemoryStore::new();
        let job = job("a");
        assert!(job.last_update.is_none());

        let Created::Inserted(stored) = store.create(job.clone()).await.unwrap() else {
            panic!("expected insert");
        };
        assert!(stored.last_update.is_some());
        assert_eq!(store.get(&job.id).await.unwrap(), Some(stored));
    }

    #[tokio::test]
    async fn test_create_duplicate_id() {
        let store = MemoryStore::new();
        let job = job("a");
        store.create(job.clone()).await.unwrap();
        assert_eq!(store.create(job).await.unwrap(), Created::AlreadyExists);
    }

    #[tokio::test]
    async fn test_create_duplicate_name() {
        let store = MemoryStore::new();
        store.create(job("a")).await.unwrap();
        assert_eq!(store.create(job("a")).await.unwrap(), Created::AlreadyExists);
        assert_eq!(store.all().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_replace_missing_job() {
        let store = MemoryStore::new();
        let job = job("a");
        let result = store.replace(job.clone()).await;
        assert!(matches!(result, Err(RelmonError::JobNotFound(id)) if id == job.id));
    }

    #[tokio::test]
    async fn test_queries() {
        let store = MemoryStore::new();
        let first = job("first");
        let mut second = job("second");
        second.created_at = first.created_at + chrono::Duration::seconds(1);
        second.status = JobStatus::Running;
        second.condor_status = CondorStatus::Run;
        second.pending_intent = Some(Intent::new(IntentKind::Delete, None));
        store.create(first.clone()).await.unwrap();
        store.create(second.clone()).await.unwrap();

        let new_jobs = store.query_by_status(JobStatus::New).await.unwrap();
        assert_eq!(new_jobs.len(), 1);
        assert_eq!(new_jobs[0].id, first.id);

        let running = store.query_by_condor_status(CondorStatus::Run).await.unwrap();
        assert_eq!(running[0].id, second.id);

        assert_eq!(store.query_by_name("first").await.unwrap().len(), 1);
        assert!(store.query_by_name("third").await.unwrap().is_empty());

        let deletes = store.query_by_intent(IntentKind::Delete).await.unwrap();
        assert_eq!(deletes[0].id, second.id);
        assert!(store.query_by_intent(IntentKind::Reset).await.unwrap().is_empty());

        let all = store.all().await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].id, first.id);
    }

    #[tokio::test]
    async fn test_delete() {
        let store = MemoryStore::new();
        let job = job("a");
        store.create(job.clone()).await.unwrap();
        assert!(store.delete(&job.id).await.unwrap());
        assert!(!store.delete(&job.id).await.unwrap());
        assert!(store.get(&job.id).await.unwrap().is_none());
    }
}
