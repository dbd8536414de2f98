use constant_time_eq::constant_time_eq;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::controller::Controller;
use crate::error::{RelmonError, Result};
use crate::relmon::category::ensure_unique_names;
use crate::relmon::{Category, Job, JobStatus};

/// Progress report posted by the remote worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallbackUpdate {
    pub id: Uuid,
    pub status: JobStatus,
    #[serde(default)]
    pub categories: Vec<Category>,
    pub secret: String,
}

#[derive(Debug, Clone)]
pub struct CallbackOutcome {
    pub job: Job,
    /// The job status moved, so the caller should trigger a tick.
    pub status_changed: bool,
}

impl Controller {
    /// Applies a worker report. Rejected reports change nothing.
    pub async fn apply_callback(&self, update: CallbackUpdate) -> Result<CallbackOutcome> {
        let mut job = self.fetch(&update.id).await?;
        validate(&job, &update)?;

        let previous = job.status;
        job.status = update.status;
        job.categories = update.categories;
        let job = self.store.replace(job).await?;

        tracing::info!(job_id = %job.id, status = %job.status, previous = %previous, "Worker update");
        Ok(CallbackOutcome {
            status_changed: job.status != previous,
            job,
        })
    }
}

fn validate(job: &Job, update: &CallbackUpdate) -> Result<()> {
    if !secret_matches(job.secret_hash.as_deref(), &update.secret) {
        tracing::warn!(job_id = %job.id, "Worker update with wrong secret");
        return Err(RelmonError::SecretMismatch(job.id));
    }
    if !job.status.accepts_callback() {
        return Err(RelmonError::UnexpectedStatus {
            id: job.id,
            status: job.status,
        });
    }
    if !update.status.is_reportable() {
        return Err(RelmonError::InvalidCallback(format!(
            "status {} cannot be reported",
            update.status
        )));
    }
    ensure_unique_names(&update.categories)
        .map_err(|e| RelmonError::InvalidCallback(e.to_string()))
}

/// Constant-time comparison; a job without a secret matches nothing.
fn secret_matches(expected: Option<&str>, given: &str) -> bool {
    match expected {
        Some(expected) if expected.len() == given.len() => {
            constant_time_eq(expected.as_bytes(), given.as_bytes())
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relmon::HltMode;

    fn running_job() -> Job {
        let category = Category::new("A", HltMode::No, true)
            .with_reference("r")
            .with_target("t");
        let mut job = Job::new("x", vec![category], None).unwrap();
        job.rotate_secret();
        job.status = JobStatus::Running;
        job
    }

    fn update(job: &Job, status: JobStatus) -> CallbackUpdate {
        CallbackUpdate {
            id: job.id,
            status,
            categories: job.categories.clone(),
            secret: job.secret_hash.clone().unwrap_or_default(),
        }
    }

    #[test]
    fn valid_update_passes() {
        let job = running_job();
        assert!(validate(&job, &update(&job, JobStatus::Finishing)).is_ok());
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let job = running_job();
        let mut update = update(&job, JobStatus::Finishing);
        update.secret = "0".repeat(32);
        assert!(matches!(
            validate(&job, &update),
            Err(RelmonError::SecretMismatch(_))
        ));
    }

    #[test]
    fn job_without_secret_rejects_everything() {
        let mut job = running_job();
        job.secret_hash = None;
        let update = CallbackUpdate {
            secret: String::new(),
            ..update(&job, JobStatus::Running)
        };
        assert!(validate(&job, &update).is_err());
    }

    #[test]
    fn secret_comparison() {
        assert!(secret_matches(Some("abc"), "abc"));
        assert!(!secret_matches(Some("abc"), "abd"));
        assert!(!secret_matches(Some("abc"), "abcd"));
        assert!(!secret_matches(Some(""), "x"));
        assert!(!secret_matches(None, ""));
    }

    #[test]
    fn finished_job_rejects_updates() {
        let mut job = running_job();
        job.status = JobStatus::Done;
        assert!(matches!(
            validate(&job, &update(&job, JobStatus::Running)),
            Err(RelmonError::UnexpectedStatus { status: JobStatus::Done, .. })
        ));
    }

    #[test]
    fn unreportable_status_is_rejected() {
        let job = running_job();
        for status in [JobStatus::New, JobStatus::Done, JobStatus::Submitted] {
            assert!(matches!(
                validate(&job, &update(&job, status)),
                Err(RelmonError::InvalidCallback(_))
            ));
        }
    }

    #[test]
    fn duplicate_categories_are_rejected() {
        let job = running_job();
        let mut update = update(&job, JobStatus::Running);
        update.categories.push(update.categories[0].clone());
        assert!(matches!(
            validate(&job, &update),
            Err(RelmonError::InvalidCallback(_))
        ));
    }
}
