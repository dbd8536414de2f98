//! Job persistence.
//!
//! The store is the single source of truth for job documents. Every write
//! stamps `last_update`; queries return jobs in creation order.

mod file;
mod memory;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::Result;
use crate::relmon::{CondorStatus, IntentKind, Job, JobStatus};

pub use file::FileStore;
pub use memory::MemoryStore;

/// Outcome of [`JobStore::create`].
#[derive(Debug, Clone, PartialEq)]
pub enum Created {
    Inserted(Job),
    AlreadyExists,
}

#[async_trait]
pub trait JobStore: Send + Sync + 'static {
    async fn get(&self, id: &Uuid) -> Result<Option<Job>>;

    /// Inserts a new job unless one with the same id or name exists.
    async fn create(&self, job: Job) -> Result<Created>;

    /// Overwrites an existing job. Returns `JobNotFound` if it was deleted.
    async fn replace(&self, job: Job) -> Result<Job>;

    /// Returns whether a job was removed.
    async fn delete(&self, id: &Uuid) -> Result<bool>;

    async fn query_by_status(&self, status: JobStatus) -> Result<Vec<Job>>;

    async fn query_by_condor_status(&self, status: CondorStatus) -> Result<Vec<Job>>;

    async fn query_by_name(&self, name: &str) -> Result<Vec<Job>>;

    /// Jobs with a pending intent of the given kind.
    async fn query_by_intent(&self, kind: IntentKind) -> Result<Vec<Job>>;

    async fn all(&self) -> Result<Vec<Job>>;
}
