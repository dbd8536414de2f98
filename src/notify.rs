//! Outbound notifications on terminal transitions.
//!
//! Delivery is best-effort: callers log failures and carry on.

use std::path::PathBuf;

use async_trait::async_trait;

use crate::error::Result;
use crate::relmon::{Job, JobStatus, UserInfo};

const SIGNATURE: &str = "Sincerely,\nRelMon Service";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub subject: String,
    pub body: String,
    pub recipients: Vec<String>,
    pub attachments: Vec<PathBuf>,
}

impl Notification {
    pub fn new(subject: &str, body: &str, recipients: Vec<String>) -> Self {
        Self {
            subject: format!("[RelMon] {subject}"),
            body: format!("{}\n\n{SIGNATURE}", body.trim()),
            recipients,
            attachments: Vec::new(),
        }
    }

    pub fn with_attachments(mut self, attachments: Vec<PathBuf>) -> Self {
        self.attachments = attachments;
        self
    }

    /// Collection finished, successfully or not.
    pub fn job_collected(job: &Job, service_url: &str) -> Self {
        let (subject, outcome) = if job.status == JobStatus::Failed {
            (format!("{} failed", job.name), "failed")
        } else {
            (format!("{} is done", job.name), "finished successfully")
        };
        let body = format!(
            "RelMon {} {}.\nJob logs are attached.\nDetails: {}/relmons?q={}",
            job.name, outcome, service_url, job.id
        );
        Self::new(&subject, &body, recipients(job))
    }

    /// Someone other than the owner reset the job before it finished.
    pub fn job_reset_by_other(job: &Job, actor: &UserInfo) -> Self {
        let who = if actor.fullname.is_empty() {
            &actor.login
        } else {
            &actor.fullname
        };
        let subject = format!("{} was reset", job.name);
        let body = format!(
            "RelMon {} was reset by {} while it was {}.\nIt will be submitted again on their behalf.",
            job.name, who, job.status
        );
        Self::new(&subject, &body, recipients(job))
    }
}

fn recipients(job: &Job) -> Vec<String> {
    job.owner_email().map(str::to_string).into_iter().collect()
}

#[async_trait]
pub trait Notifier: Send + Sync + 'static {
    async fn send(&self, notification: Notification) -> Result<()>;
}

/// Writes notifications to the log instead of delivering them.
#[derive(Debug, Clone, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, notification: Notification) -> Result<()> {
        tracing::info!(
            subject = %notification.subject,
            recipients = ?notification.recipients,
            attachments = notification.attachments.len(),
            "Notification"
        );
        tracing::debug!(body = %notification.body, "Notification body");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relmon::{Category, HltMode};

    fn job_owned_by(email: &str) -> Job {
        let owner = UserInfo {
            login: "owner".to_string(),
            fullname: "Owner Name".to_string(),
            email: email.to_string(),
        };
        let category = Category::new("Generator", HltMode::No, true)
            .with_reference("r")
            .with_target("t");
        Job::new("weekly", vec![category], Some(owner)).unwrap()
    }

    #[test]
    fn collected_success_and_failure() {
        let mut job = job_owned_by("owner@cern.ch");
        job.status = JobStatus::Done;
        let done = Notification::job_collected(&job, "https://relmon");
        assert_eq!(done.subject, "[RelMon] weekly is done");
        assert_eq!(done.recipients, vec!["owner@cern.ch"]);
        assert!(done.body.ends_with(SIGNATURE));

        job.status = JobStatus::Failed;
        let failed = Notification::job_collected(&job, "https://relmon");
        assert_eq!(failed.subject, "[RelMon] weekly failed");
    }

    #[test]
    fn no_recipient_without_owner_email() {
        let job = job_owned_by("");
        assert!(Notification::job_collected(&job, "x").recipients.is_empty());
    }

    #[test]
    fn reset_names_the_actor() {
        let job = job_owned_by("owner@cern.ch");
        let actor = UserInfo {
            login: "other".to_string(),
            fullname: String::new(),
            email: "other@cern.ch".to_string(),
        };
        let notification = Notification::job_reset_by_other(&job, &actor);
        assert!(notification.body.contains("reset by other"));
        assert_eq!(notification.recipients, vec!["owner@cern.ch"]);
    }

    #[tokio::test]
    async fn log_notifier_accepts_everything() {
        let notification = Notification::new("s", "b", vec![]);
        LogNotifier.send(notification).await.unwrap();
    }
}
