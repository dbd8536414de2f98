//! RelMon lifecycle controller.
//!
//! A tick walks every job that needs attention: pending deletes, pending
//! resets, jobs believed to be in HTCondor, and newly created jobs. Each job is
//! re-read from the store right before it is changed, and a failure on one job
//! never stops the rest of the tick.

mod callback;

use std::future::Future;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use uuid::Uuid;

use crate::condor;
use crate::config::ControllerConfig;
use crate::error::{RelmonError, Result};
use crate::notify::{Notification, Notifier};
use crate::package::PackageBuilder;
use crate::relmon::{
    Category, CategoryInput, CondorStatus, Intent, IntentKind, Job, JobRequest, JobStatus,
    UserInfo,
};
use crate::remote::RemoteExecutor;
use crate::store::{Created, JobStore};

pub use callback::{CallbackOutcome, CallbackUpdate};

/// Counters for one completed tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickSummary {
    pub deleted: usize,
    pub reset: usize,
    pub checked: usize,
    pub collected: usize,
    pub submitted: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Completed(TickSummary),
    /// Another tick was already running.
    Skipped,
}

/// Clears the in-progress flag however the tick ends.
struct TickGuard<'a>(&'a AtomicBool);

impl Drop for TickGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct Controller {
    store: Arc<dyn JobStore>,
    remote: Arc<dyn RemoteExecutor>,
    packages: Arc<dyn PackageBuilder>,
    notifier: Arc<dyn Notifier>,
    config: ControllerConfig,
    ticking: AtomicBool,
}

impl Controller {
    pub fn new(
        store: Arc<dyn JobStore>,
        remote: Arc<dyn RemoteExecutor>,
        packages: Arc<dyn PackageBuilder>,
        notifier: Arc<dyn Notifier>,
        config: ControllerConfig,
    ) -> Self {
        Self {
            store,
            remote,
            packages,
            notifier,
            config,
            ticking: AtomicBool::new(false),
        }
    }

    pub fn store(&self) -> &Arc<dyn JobStore> {
        &self.store
    }

    // =========================================================================
    // User operations
    // =========================================================================

    /// The store rejects a taken name atomically, so concurrent creates with
    /// the same name cannot both succeed.
    pub async fn create_job(&self, request: JobRequest, user: Option<UserInfo>) -> Result<Job> {
        let job = Job::from_request(request, user)?;
        match self.store.create(job.clone()).await? {
            Created::Inserted(job) => {
                tracing::info!(job_id = %job.id, name = %job.name, "Created RelMon");
                Ok(job)
            }
            Created::AlreadyExists => Err(RelmonError::DuplicateName(job.name)),
        }
    }

    /// Replaces the categories and schedules a reset so the job runs again.
    pub async fn edit_job(
        &self,
        id: &Uuid,
        categories: Vec<CategoryInput>,
        user: Option<UserInfo>,
    ) -> Result<Job> {
        let mut job = self.fetch(id).await?;
        job.set_categories(categories.into_iter().map(Category::from).collect())?;
        job.categories.iter_mut().for_each(Category::reset);
        set_intent(&mut job, IntentKind::Reset, user);

        let job = self.store.replace(job).await?;
        tracing::info!(job_id = %job.id, "Edited RelMon");
        Ok(job)
    }

    pub async fn request_reset(&self, id: &Uuid, user: Option<UserInfo>) -> Result<Job> {
        let mut job = self.fetch(id).await?;
        set_intent(&mut job, IntentKind::Reset, user);
        let job = self.store.replace(job).await?;
        tracing::info!(job_id = %job.id, "Reset requested");
        Ok(job)
    }

    pub async fn request_delete(&self, id: &Uuid, user: Option<UserInfo>) -> Result<Job> {
        let mut job = self.fetch(id).await?;
        set_intent(&mut job, IntentKind::Delete, user);
        let job = self.store.replace(job).await?;
        tracing::info!(job_id = %job.id, "Delete requested");
        Ok(job)
    }

    /// All jobs, newest first.
    pub async fn list_jobs(&self) -> Result<Vec<Job>> {
        let mut jobs = self.store.all().await?;
        jobs.reverse();
        Ok(jobs)
    }

    async fn fetch(&self, id: &Uuid) -> Result<Job> {
        self.store
            .get(id)
            .await?
            .ok_or(RelmonError::JobNotFound(*id))
    }

    // =========================================================================
    // Tick
    // =========================================================================

    pub async fn tick(&self) -> TickOutcome {
        if self
            .ticking
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::info!("Tick already in progress, skipping");
            return TickOutcome::Skipped;
        }
        let _guard = TickGuard(&self.ticking);

        tracing::info!("Controller tick started");
        let mut summary = TickSummary::default();
        self.delete_pass(&mut summary).await;
        self.reset_pass(&mut summary).await;
        self.check_pass(&mut summary).await;
        self.submit_pass(&mut summary).await;

        if let Err(e) = self.remote.close().await {
            tracing::warn!(error = %e, "Failed to close remote session");
        }
        tracing::info!(
            deleted = summary.deleted,
            reset = summary.reset,
            checked = summary.checked,
            collected = summary.collected,
            submitted = summary.submitted,
            failed = summary.failed,
            "Controller tick finished"
        );
        TickOutcome::Completed(summary)
    }

    async fn delete_pass(&self, summary: &mut TickSummary) {
        for id in job_ids(self.store.query_by_intent(IntentKind::Delete)).await {
            match self.delete_job(&id).await {
                Ok(true) => summary.deleted += 1,
                Ok(false) => {}
                Err(e) => tracing::error!(job_id = %id, error = %e, "Failed to delete RelMon"),
            }
        }
    }

    async fn delete_job(&self, id: &Uuid) -> Result<bool> {
        let Some(mut job) = self.store.get(id).await? else {
            return Ok(false);
        };
        if !has_intent(&job, IntentKind::Delete) {
            return Ok(false);
        }

        // Cleared before any remote work: a delete is attempted at most once.
        job.pending_intent = None;
        let job = self.store.replace(job).await?;
        tracing::info!(job_id = %job.id, condor_id = job.condor_id, "Deleting RelMon");

        if let Err(e) = self.terminate(&job).await {
            tracing::warn!(job_id = %job.id, error = %e, "Could not terminate remote job");
        }
        self.remove_remote_directory(&job).await;
        self.remove_local_directory(&job.id).await;

        self.store.delete(id).await
    }

    async fn reset_pass(&self, summary: &mut TickSummary) {
        for id in job_ids(self.store.query_by_intent(IntentKind::Reset)).await {
            match self.reset_job(&id).await {
                Ok(true) => summary.reset += 1,
                Ok(false) => {}
                Err(e) => tracing::error!(job_id = %id, error = %e, "Failed to reset RelMon"),
            }
        }
    }

    async fn reset_job(&self, id: &Uuid) -> Result<bool> {
        let Some(job) = self.store.get(id).await? else {
            return Ok(false);
        };
        let Some(intent) = job.pending_intent.clone().filter(|i| i.kind == IntentKind::Reset)
        else {
            return Ok(false);
        };

        tracing::info!(job_id = %job.id, condor_id = job.condor_id, status = %job.status, "Resetting RelMon");
        // A transport failure keeps the intent so the next tick retries.
        self.terminate(&job).await?;
        self.remove_remote_directory(&job).await;

        if let Some(actor) = &intent.requested_by {
            let owner_changes = job
                .user_info
                .as_ref()
                .is_some_and(|owner| owner.login != actor.login);
            if owner_changes && job.status != JobStatus::Done {
                self.notify(Notification::job_reset_by_other(&job, actor)).await;
            }
        }

        let mut job = self.fetch(id).await?;
        job.reset();
        if has_intent(&job, IntentKind::Reset) {
            job.pending_intent = None;
        }
        if let Some(actor) = intent.requested_by {
            job.user_info = Some(actor);
        }
        let job = self.store.replace(job).await?;
        self.remove_local_directory(&job.id).await;

        tracing::info!(job_id = %job.id, status = %job.status, "RelMon reset");
        Ok(true)
    }

    async fn check_pass(&self, summary: &mut TickSummary) {
        for status in JobStatus::ACTIVE {
            for id in job_ids(self.store.query_by_status(status)).await {
                match self.check_job(&id).await {
                    Ok(Some(condor_status)) => {
                        summary.checked += 1;
                        if condor_status.is_finished() {
                            match self.collect(&id).await {
                                Ok(()) => summary.collected += 1,
                                Err(e) => tracing::error!(job_id = %id, error = %e, "Failed to collect RelMon"),
                            }
                        }
                    }
                    Ok(None) => {}
                    Err(e) => tracing::error!(job_id = %id, error = %e, "Failed to check RelMon"),
                }
            }
        }
    }

    /// Refreshes and persists the HTCondor status of an active job.
    async fn check_job(&self, id: &Uuid) -> Result<Option<CondorStatus>> {
        let Some(job) = self.store.get(id).await? else {
            return Ok(None);
        };
        if !JobStatus::ACTIVE.contains(&job.status) {
            return Ok(None);
        }

        let condor_status = if job.has_condor_job() {
            let output = self
                .remote
                .execute(&[condor::status_query(job.condor_id)])
                .await?;
            condor::parse_status_output(job.condor_id, &output)
        } else {
            tracing::warn!(job_id = %job.id, status = %job.status, "Active RelMon has no HTCondor job");
            CondorStatus::Removed
        };

        tracing::info!(
            job_id = %job.id,
            condor_id = job.condor_id,
            condor_status = %condor_status,
            "HTCondor status"
        );
        // Worker updates may have landed while the queue was queried
        let mut job = self.fetch(id).await?;
        job.condor_status = condor_status;
        self.store.replace(job).await?;
        Ok(Some(condor_status))
    }

    /// Downloads logs, cleans up the working directory and closes the job.
    async fn collect(&self, id: &Uuid) -> Result<()> {
        let job = self.fetch(id).await?;
        let remote_dir = self.config.remote_job_directory(&job.id);
        let local_dir = self.config.local_job_directory(&job.id);
        tokio::fs::create_dir_all(&local_dir).await?;

        let mut attachments = Vec::new();
        for file in condor::collected_files(&job.file_stem()) {
            let local = local_dir.join(&file);
            match self
                .remote
                .download_file(&format!("{remote_dir}/{file}"), &local)
                .await
            {
                Ok(()) => attachments.push(local),
                Err(e) => tracing::warn!(job_id = %job.id, file = %file, error = %e, "Could not download log"),
            }
        }
        self.remove_remote_directory(&job).await;

        let mut job = self.fetch(id).await?;
        if job.status != JobStatus::Failed {
            job.status = JobStatus::Done;
        }
        job.condor_id = 0;
        let job = self.store.replace(job).await?;
        tracing::info!(job_id = %job.id, status = %job.status, attachments = attachments.len(), "Collected RelMon");

        self.notify(
            Notification::job_collected(&job, &self.config.service_url).with_attachments(attachments),
        )
        .await;
        self.remove_local_directory(&job.id).await;
        Ok(())
    }

    async fn submit_pass(&self, summary: &mut TickSummary) {
        for id in job_ids(self.store.query_by_status(JobStatus::Submitting)).await {
            if let Err(e) = self.fail_orphan(&id).await {
                tracing::error!(job_id = %id, error = %e, "Failed to mark orphaned submission");
            }
        }

        for id in job_ids(self.store.query_by_status(JobStatus::New)).await {
            match self.submit_job(&id).await {
                Ok(Some(JobStatus::Submitted)) => summary.submitted += 1,
                Ok(Some(_)) => summary.failed += 1,
                Ok(None) => {}
                Err(e) => tracing::error!(job_id = %id, error = %e, "Failed to submit RelMon"),
            }
        }
    }

    /// A job still `submitting` at this point was left behind by an interrupted tick.
    async fn fail_orphan(&self, id: &Uuid) -> Result<()> {
        let mut job = self.fetch(id).await?;
        if job.status != JobStatus::Submitting {
            return Ok(());
        }
        tracing::warn!(job_id = %job.id, "Submission was interrupted, marking RelMon failed");
        job.status = JobStatus::Failed;
        self.store.replace(job).await?;
        Ok(())
    }

    async fn submit_job(&self, id: &Uuid) -> Result<Option<JobStatus>> {
        let Some(mut job) = self.store.get(id).await? else {
            return Ok(None);
        };
        if job.status != JobStatus::New || job.pending_intent.is_some() {
            return Ok(None);
        }

        job.reset();
        job.status = JobStatus::Submitting;
        job.rotate_secret();
        let job = self.store.replace(job).await?;

        let result = self.submit_remote(&job).await;
        self.remove_local_directory(&job.id).await;

        let mut job = self.fetch(id).await?;
        match result {
            Ok(condor_id) => {
                job.status = JobStatus::Submitted;
                job.condor_id = condor_id;
                job.condor_status = CondorStatus::Idle;
                tracing::info!(job_id = %job.id, condor_id, "Submitted RelMon");
            }
            Err(e) => {
                job.status = JobStatus::Failed;
                tracing::error!(job_id = %job.id, error = %e, "Submission failed");
            }
        }
        let job = self.store.replace(job).await?;
        Ok(Some(job.status))
    }

    async fn submit_remote(&self, job: &Job) -> Result<i64> {
        let resources = job.resources();
        tracing::info!(
            job_id = %job.id,
            items = job.pending_item_count(),
            cpus = resources.cpus,
            memory = %resources.memory(),
            disk = %resources.disk(),
            "Resources"
        );

        let local_dir = self.config.local_job_directory(&job.id);
        let package = self.packages.build(job, &resources, &local_dir).await?;

        let remote_dir = self.config.remote_job_directory(&job.id);
        self.remote
            .execute(&condor::prepare_directory_commands(&remote_dir))
            .await?;
        for file in &package.files {
            let name = file
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .ok_or_else(|| RelmonError::Internal(format!("invalid package file {}", file.display())))?;
            self.remote
                .upload_file(file, &format!("{remote_dir}/{name}"))
                .await?;
        }

        let output = self
            .remote
            .execute(&condor::submit_commands(&remote_dir, &package.submit_file))
            .await?;
        condor::parse_submit_output(&output)
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    /// Removes the HTCondor job if one is believed to be active.
    async fn terminate(&self, job: &Job) -> Result<()> {
        if !job.has_condor_job() {
            tracing::debug!(job_id = %job.id, condor_id = job.condor_id, "No HTCondor job to remove");
            return Ok(());
        }
        let output = self
            .remote
            .execute(&[condor::remove_command(job.condor_id)])
            .await?;
        if output.has_stderr() {
            tracing::warn!(job_id = %job.id, condor_id = job.condor_id, stderr = %output.stderr, "condor_rm reported an error");
        } else {
            tracing::info!(job_id = %job.id, condor_id = job.condor_id, "Removed HTCondor job");
        }
        Ok(())
    }

    async fn remove_remote_directory(&self, job: &Job) {
        let remote_dir = self.config.remote_job_directory(&job.id);
        if let Err(e) = self
            .remote
            .execute(&[condor::cleanup_command(&remote_dir)])
            .await
        {
            tracing::warn!(job_id = %job.id, error = %e, "Could not remove remote directory");
        }
    }

    async fn remove_local_directory(&self, id: &Uuid) {
        remove_dir(&self.config.local_job_directory(id)).await;
    }

    async fn notify(&self, notification: Notification) {
        if let Err(e) = self.notifier.send(notification).await {
            tracing::warn!(error = %e, "Notification failed");
        }
    }
}

/// Ids of the jobs a query returned; a failed query is logged and yields none.
async fn job_ids(query: impl Future<Output = Result<Vec<Job>>>) -> Vec<Uuid> {
    match query.await {
        Ok(jobs) => jobs.into_iter().map(|job| job.id).collect(),
        Err(e) => {
            tracing::error!(error = %e, "Job query failed");
            Vec::new()
        }
    }
}

fn has_intent(job: &Job, kind: IntentKind) -> bool {
    job.pending_intent.as_ref().is_some_and(|i| i.kind == kind)
}

/// Records an intent. A pending delete is never downgraded to a reset.
fn set_intent(job: &mut Job, kind: IntentKind, user: Option<UserInfo>) {
    if kind == IntentKind::Reset && has_intent(job, IntentKind::Delete) {
        return;
    }
    job.pending_intent = Some(Intent::new(kind, user));
}

async fn remove_dir(path: &Path) {
    match tokio::fs::remove_dir_all(path).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!(path = %path.display(), error = %e, "Could not remove local directory"),
    }
}
