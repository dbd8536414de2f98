//! Files shipped to HTCondor for one job: descriptor, submit file and script.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::config::PackageConfig;
use crate::error::Result;
use crate::relmon::{Job, Resources};

/// Seconds a finished job stays in the queue so its status can still be read.
const LEAVE_IN_QUEUE_SECS: u64 = 7200;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobPackage {
    pub directory: PathBuf,
    /// Every file to upload, submit file included.
    pub files: Vec<PathBuf>,
    /// Submit file name, relative to the remote working directory.
    pub submit_file: String,
}

#[async_trait]
pub trait PackageBuilder: Send + Sync + 'static {
    /// Writes the package for `job` into `directory`, creating it if needed.
    async fn build(&self, job: &Job, resources: &Resources, directory: &Path) -> Result<JobPackage>;
}

#[derive(Debug, Clone)]
pub struct CondorPackageBuilder {
    config: PackageConfig,
}

impl CondorPackageBuilder {
    pub fn new(config: PackageConfig) -> Self {
        Self { config }
    }

    fn grid_file(&self, name: &str) -> String {
        format!("{}/{}", self.config.grid_location.trim_end_matches('/'), name)
    }

    pub fn submit_file(&self, job: &Job, resources: &Resources) -> String {
        let stem = job.file_stem();
        [
            format!("executable              = {stem}.sh"),
            format!("output                  = {stem}.out"),
            format!("error                   = {stem}.err"),
            format!("log                     = {stem}.log"),
            format!(
                "transfer_input_files    = {stem}.json,{},{}",
                self.grid_file(&self.config.cert_file),
                self.grid_file(&self.config.key_file)
            ),
            "when_to_transfer_output = on_exit".to_string(),
            format!("request_cpus            = {}", resources.cpus),
            format!("request_memory          = {}", resources.memory()),
            format!("request_disk            = {}", resources.disk()),
            format!("+JobFlavour             = \"{}\"", self.config.job_flavour),
            format!(
                "leave_in_queue          = JobStatus == 4 && (CompletionDate =?= UNDEFINED || ((CurrentTime - CompletionDate) < {LEAVE_IN_QUEUE_SECS}))"
            ),
            "queue".to_string(),
        ]
        .join("\n")
    }

    pub fn job_script(&self, job: &Job, resources: &Resources) -> String {
        let stem = job.file_stem();
        let release = &self.config.cmssw_release;
        let worker = &self.config.worker_command;
        let callback = &self.config.callback_url;
        let web_target = format!(
            "{}/{}___{}",
            self.config.web_location.trim_end_matches('/'),
            job.id,
            job.name
        );

        [
            "#!/bin/bash".to_string(),
            "DIR=$(pwd)".to_string(),
            format!("scramv1 project CMSSW {release}"),
            format!("cd {release}/src"),
            "(".to_string(),
            "eval `scramv1 runtime -sh`".to_string(),
            "cd $DIR".to_string(),
            "mkdir -p Reports".to_string(),
            format!(
                "{worker} --job {stem}.json --cert {} --key {} --cpus {} --callback {callback}",
                self.config.cert_file, self.config.key_file, resources.cpus
            ),
            ")".to_string(),
            "cd $DIR".to_string(),
            "rm -f *.root".to_string(),
            format!("mkdir -p \"{web_target}\""),
            format!("rsync -a Reports/ \"{web_target}/\""),
            format!("{worker} --job {stem}.json --callback {callback} --notify-done"),
        ]
        .join("\n")
    }
}

#[async_trait]
impl PackageBuilder for CondorPackageBuilder {
    async fn build(&self, job: &Job, resources: &Resources, directory: &Path) -> Result<JobPackage> {
        tokio::fs::create_dir_all(directory).await?;
        let stem = job.file_stem();

        let descriptor = directory.join(format!("{stem}.json"));
        tokio::fs::write(&descriptor, serde_json::to_vec_pretty(job)?).await?;

        let submit_file = format!("{stem}.sub");
        let submit = directory.join(&submit_file);
        tokio::fs::write(&submit, self.submit_file(job, resources)).await?;

        let script = directory.join(format!("{stem}.sh"));
        tokio::fs::write(&script, self.job_script(job, resources)).await?;

        tracing::debug!(job_id = %job.id, directory = %directory.display(), "Wrote job package");
        Ok(JobPackage {
            directory: directory.to_path_buf(),
            files: vec![descriptor, submit, script],
            submit_file,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relmon::{Category, HltMode};

    fn job() -> Job {
        let category = Category::new("Generator", HltMode::No, true)
            .with_reference("r1")
            .with_target("t1");
        let mut job = Job::new("weekly", vec![category], None).unwrap();
        job.rotate_secret();
        job
    }

    #[test]
    fn submit_file_requests_resources() {
        let job = job();
        let builder = CondorPackageBuilder::new(PackageConfig::default());
        let submit = builder.submit_file(&job, &Resources::for_item_count(40));

        assert!(submit.contains(&format!("executable              = RELMON_{}.sh", job.id)));
        assert!(submit.contains("request_cpus            = 4"));
        assert!(submit.contains("request_memory          = 8G"));
        assert!(submit.contains("request_disk            = 12000M"));
        assert!(submit.contains("~/private/usercert.pem"));
        assert!(submit.contains("< 7200"));
        assert!(submit.ends_with("queue"));
    }

    #[test]
    fn script_calls_worker_with_callback() {
        let job = job();
        let config = PackageConfig::default().with_callback_url("https://relmon/api/update");
        let script = CondorPackageBuilder::new(config).job_script(&job, &Resources::for_item_count(2));

        assert!(script.starts_with("#!/bin/bash"));
        assert!(script.contains(&format!(
            "relmon-worker --job RELMON_{}.json --cert usercert.pem --key userkey.pem --cpus 1 --callback https://relmon/api/update",
            job.id
        )));
        assert!(script.contains("--notify-done"));
    }

    #[tokio::test]
    async fn build_writes_all_files() {
        let job = job();
        let dir = tempfile::tempdir().unwrap();
        let directory = dir.path().join("package");
        let builder = CondorPackageBuilder::new(PackageConfig::default());

        let package = builder
            .build(&job, &job.resources(), &directory)
            .await
            .unwrap();

        assert_eq!(package.files.len(), 3);
        assert_eq!(package.submit_file, format!("RELMON_{}.sub", job.id));
        for file in &package.files {
            assert!(file.exists(), "{} missing", file.display());
        }

        let descriptor = std::fs::read(&package.files[0]).unwrap();
        let shipped: Job = serde_json::from_slice(&descriptor).unwrap();
        assert_eq!(shipped.id, job.id);
        assert_eq!(shipped.secret_hash, job.secret_hash);
    }
}
