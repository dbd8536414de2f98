//! Text protocol spoken with HTCondor command line tools.

use crate::error::{RelmonError, Result};
use crate::relmon::CondorStatus;
use crate::remote::CommandOutput;

const SUBMITTED_MARKER: &str = "1 job(s) submitted to cluster";

/// Files collected from a finished job's working directory.
pub fn collected_files(file_stem: &str) -> Vec<String> {
    vec![
        "validation_matrix.log".to_string(),
        format!("{file_stem}.out"),
        format!("{file_stem}.log"),
        format!("{file_stem}.err"),
    ]
}

/// Cluster id from `condor_submit` output.
///
/// Accepts only the single-job success message with nothing on stderr; the id
/// is the last token and may carry a fractional part (`801341.`).
pub fn parse_submit_output(output: &CommandOutput) -> Result<i64> {
    if output.has_stderr() {
        return Err(RelmonError::Submission(output.stderr.clone()));
    }
    if !output.stdout.contains(SUBMITTED_MARKER) {
        return Err(RelmonError::Submission(format!(
            "unexpected condor_submit output: {}",
            output.stdout
        )));
    }

    let token = output.stdout.split_whitespace().last().unwrap_or_default();
    let cluster_id = token
        .parse::<f64>()
        .ok()
        .filter(|id| id.is_finite() && *id >= 1.0)
        .ok_or_else(|| RelmonError::Submission(format!("invalid cluster id: {token:?}")))?;

    Ok(cluster_id.trunc() as i64)
}

pub fn status_query(condor_id: i64) -> String {
    format!("condor_q -af:h ClusterId JobStatus | grep {condor_id}")
}

/// Status of `condor_id` from [`status_query`] output.
///
/// `grep` can also match other clusters or the header, so only the line whose
/// first column is the cluster id counts. Anything on stderr, or no such line,
/// means the status is unknown.
pub fn parse_status_output(condor_id: i64, output: &CommandOutput) -> CondorStatus {
    if output.has_stderr() {
        return CondorStatus::Unknown;
    }

    let id = condor_id.to_string();
    output
        .stdout
        .lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>())
        .find(|columns| columns.first() == Some(&id.as_str()))
        .and_then(|columns| columns.last().copied())
        .map(CondorStatus::from_code)
        .unwrap_or(CondorStatus::Unknown)
}

pub fn remove_command(condor_id: i64) -> String {
    format!("condor_rm {condor_id}")
}

/// Fresh, empty working directory.
pub fn prepare_directory_commands(remote_dir: &str) -> Vec<String> {
    vec![format!("rm -rf {remote_dir}"), format!("mkdir -p {remote_dir}")]
}

pub fn submit_commands(remote_dir: &str, submit_file: &str) -> Vec<String> {
    vec![
        format!("cd {remote_dir}"),
        format!("condor_submit {submit_file}"),
    ]
}

pub fn cleanup_command(remote_dir: &str) -> String {
    format!("rm -rf {remote_dir}")
}
