use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{RelmonError, Result};
use crate::relmon::category::{ensure_unique_names, Category, CategoryInput, CategoryStatus};
use crate::relmon::item::sanitize_name;
use crate::relmon::resources::Resources;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    New,
    Submitting,
    Submitted,
    Running,
    Finishing,
    Finished,
    Done,
    Failed,
    Terminated,
}

impl JobStatus {
    /// Statuses polled against HTCondor on every tick.
    pub const ACTIVE: [JobStatus; 4] = [
        JobStatus::Submitted,
        JobStatus::Running,
        JobStatus::Finishing,
        JobStatus::Finished,
    ];

    /// Statuses in which the remote worker is allowed to report progress.
    pub fn accepts_callback(self) -> bool {
        matches!(
            self,
            JobStatus::Submitted | JobStatus::Running | JobStatus::Finishing
        )
    }

    /// Statuses the remote worker may report.
    pub fn is_reportable(self) -> bool {
        matches!(
            self,
            JobStatus::Running | JobStatus::Finishing | JobStatus::Finished | JobStatus::Failed
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Done | JobStatus::Failed | JobStatus::Terminated
        )
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobStatus::New => write!(f, "new"),
            JobStatus::Submitting => write!(f, "submitting"),
            JobStatus::Submitted => write!(f, "submitted"),
            JobStatus::Running => write!(f, "running"),
            JobStatus::Finishing => write!(f, "finishing"),
            JobStatus::Finished => write!(f, "finished"),
            JobStatus::Done => write!(f, "done"),
            JobStatus::Failed => write!(f, "failed"),
            JobStatus::Terminated => write!(f, "terminated"),
        }
    }
}

/// HTCondor's own view of the remote job.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CondorStatus {
    Unexplained,
    Idle,
    Run,
    Removed,
    Done,
    Hold,
    SubmissionError,
    #[default]
    #[serde(rename = "unknown", alias = "<unknown>")]
    Unknown,
}

impl CondorStatus {
    /// Map an HTCondor `JobStatus` code. Unrecognized codes become `Removed`
    /// so the job is collected instead of being polled forever.
    pub fn from_code(code: &str) -> Self {
        match code.trim() {
            "0" => CondorStatus::Unexplained,
            "1" => CondorStatus::Idle,
            "2" => CondorStatus::Run,
            "3" => CondorStatus::Removed,
            "4" => CondorStatus::Done,
            "5" => CondorStatus::Hold,
            "6" => CondorStatus::SubmissionError,
            _ => CondorStatus::Removed,
        }
    }

    /// The remote job has left the queue and its output can be collected.
    pub fn is_finished(self) -> bool {
        matches!(self, CondorStatus::Done | CondorStatus::Removed)
    }
}

impl std::fmt::Display for CondorStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CondorStatus::Unexplained => write!(f, "UNEXPLAINED"),
            CondorStatus::Idle => write!(f, "IDLE"),
            CondorStatus::Run => write!(f, "RUN"),
            CondorStatus::Removed => write!(f, "REMOVED"),
            CondorStatus::Done => write!(f, "DONE"),
            CondorStatus::Hold => write!(f, "HOLD"),
            CondorStatus::SubmissionError => write!(f, "SUBMISSION_ERROR"),
            CondorStatus::Unknown => write!(f, "unknown"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserInfo {
    pub login: String,
    #[serde(default)]
    pub fullname: String,
    #[serde(default)]
    pub email: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntentKind {
    Reset,
    Delete,
}

/// A reset or delete request waiting for the next tick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Intent {
    pub kind: IntentKind,
    pub requested_by: Option<UserInfo>,
    pub requested_at: DateTime<Utc>,
}

impl Intent {
    pub fn new(kind: IntentKind, requested_by: Option<UserInfo>) -> Self {
        Self {
            kind,
            requested_by,
            requested_at: Utc::now(),
        }
    }
}

/// A RelMon: a set of categories whose reference and target datasets are
/// compared by one HTCondor job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub name: String,
    pub status: JobStatus,
    #[serde(default)]
    pub condor_status: CondorStatus,
    #[serde(default)]
    pub condor_id: i64,
    #[serde(default)]
    pub categories: Vec<Category>,
    #[serde(default)]
    pub secret_hash: Option<String>,
    #[serde(default)]
    pub user_info: Option<UserInfo>,
    #[serde(default)]
    pub pending_intent: Option<Intent>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub last_update: Option<DateTime<Utc>>,
}

/// Creation payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRequest {
    pub name: String,
    #[serde(default)]
    pub categories: Vec<CategoryInput>,
}

impl Job {
    pub fn new(name: &str, categories: Vec<Category>, owner: Option<UserInfo>) -> Result<Self> {
        let name = sanitize_name(name);
        if name.is_empty() {
            return Err(RelmonError::InvalidJob(
                "name must not be empty".to_string(),
            ));
        }

        let mut job = Self {
            id: Uuid::new_v4(),
            name,
            status: JobStatus::New,
            condor_status: CondorStatus::Unknown,
            condor_id: 0,
            categories: Vec::new(),
            secret_hash: None,
            user_info: owner,
            pending_intent: None,
            created_at: Utc::now(),
            last_update: None,
        };
        job.set_categories(categories)?;
        job.reset();
        Ok(job)
    }

    pub fn from_request(request: JobRequest, owner: Option<UserInfo>) -> Result<Self> {
        let categories = request.categories.into_iter().map(Category::from).collect();
        Self::new(&request.name, categories, owner)
    }

    /// Replace categories, dropping those without a reference or target side.
    pub fn set_categories(&mut self, categories: Vec<Category>) -> Result<()> {
        ensure_unique_names(&categories)?;
        self.categories = categories.into_iter().filter(|c| !c.is_empty()).collect();
        Ok(())
    }

    /// Back to `new` with every item waiting to be resolved again.
    pub fn reset(&mut self) {
        self.status = JobStatus::New;
        self.condor_status = CondorStatus::Unknown;
        self.condor_id = 0;
        self.categories.iter_mut().for_each(Category::reset);
    }

    /// Whether a remote HTCondor job is believed to exist.
    pub fn has_condor_job(&self) -> bool {
        self.condor_id > 0
    }

    /// Generate a fresh shared secret for remote callbacks.
    pub fn rotate_secret(&mut self) {
        let secret: u128 = rand::thread_rng().gen();
        self.secret_hash = Some(format!("{:032x}", secret));
    }

    /// Items in categories that have not started comparing yet.
    pub fn pending_item_count(&self) -> usize {
        self.categories
            .iter()
            .filter(|c| c.status == CategoryStatus::Initial)
            .map(Category::item_count)
            .sum()
    }

    pub fn resources(&self) -> Resources {
        Resources::for_item_count(self.pending_item_count())
    }

    /// Common stem of the files exchanged with HTCondor.
    pub fn file_stem(&self) -> String {
        format!("RELMON_{}", self.id)
    }

    pub fn owner_email(&self) -> Option<&str> {
        self.user_info
            .as_ref()
            .map(|u| u.email.as_str())
            .filter(|e| !e.is_empty())
    }
}

impl std::fmt::Display for Job {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.name, self.id)
    }
}
