use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::error::Result;
use crate::relmon::{CondorStatus, IntentKind, Job, JobStatus};
use crate::store::memory::JobTable;
use crate::store::{Created, JobStore};

/// Durable store keeping every job in a single JSON document.
///
/// The whole document is rewritten on each write through a temporary file
/// and a rename, so a crash leaves either the old or the new version.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    table: Mutex<JobTable>,
}

impl FileStore {
    /// Loads the document at `path`, starting empty if it does not exist yet.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let table = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => JobTable::default(),
            Err(e) => return Err(e.into()),
        };
        tracing::info!(path = %path.display(), "Opened job store");

        Ok(Self {
            path,
            table: Mutex::new(table),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn persist(&self, table: &JobTable) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let bytes = serde_json::to_vec_pretty(table)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl JobStore for FileStore {
    async fn get(&self, id: &Uuid) -> Result<Option<Job>> {
        Ok(self.table.lock().await.get(id))
    }

    async fn create(&self, job: Job) -> Result<Created> {
        let mut table = self.table.lock().await;
        let created = table.create(job);
        if let Created::Inserted(job) = &created {
            if let Err(e) = self.persist(&table).await {
                table.delete(&job.id);
                return Err(e);
            }
        }
        Ok(created)
    }

    async fn replace(&self, job: Job) -> Result<Job> {
        let mut table = self.table.lock().await;
        let previous = table.get(&job.id);
        let stored = table.replace(job)?;
        if let Err(e) = self.persist(&table).await {
            if let Some(previous) = previous {
                table.restore(previous);
            }
            return Err(e);
        }
        Ok(stored)
    }

    async fn delete(&self, id: &Uuid) -> Result<bool> {
        let mut table = self.table.lock().await;
        let Some(previous) = table.get(id) else {
            return Ok(false);
        };
        table.delete(id);
        if let Err(e) = self.persist(&table).await {
            table.restore(previous);
            return Err(e);
        }
        Ok(true)
    }

    async fn query_by_status(&self, status: JobStatus) -> Result<Vec<Job>> {
        Ok(self.table.lock().await.by_status(status))
    }

    async fn query_by_condor_status(&self, status: CondorStatus) -> Result<Vec<Job>> {
        Ok(self.table.lock().await.by_condor_status(status))
    }

    async fn query_by_name(&self, name: &str) -> Result<Vec<Job>> {
        Ok(self.table.lock().await.by_name(name))
    }

    async fn query_by_intent(&self, kind: IntentKind) -> Result<Vec<Job>> {
        Ok(self.table.lock().await.by_intent(kind))
    }

    async fn all(&self) -> Result<Vec<Job>> {
        Ok(self.table.lock().await.sorted(|_| true))
    }
}
