//! Remote shell and file transfer towards the HTCondor submit host.

pub mod ssh;

use std::path::Path;

use async_trait::async_trait;

use crate::error::Result;

pub use ssh::SshExecutor;

/// Trimmed output of a remote command batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn new(stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into().trim().to_string(),
            stderr: stderr.into().trim().to_string(),
        }
    }

    pub fn has_stderr(&self) -> bool {
        !self.stderr.is_empty()
    }
}

/// A persistent remote session.
///
/// The session is established lazily by the first operation and lives until
/// [`RemoteExecutor::close`]; closing an idle executor is a no-op.
#[async_trait]
pub trait RemoteExecutor: Send + Sync + 'static {
    /// Runs the commands in one shell, joined with `; `.
    async fn execute(&self, commands: &[String]) -> Result<CommandOutput>;

    async fn upload_file(&self, local: &Path, remote: &str) -> Result<()>;

    async fn download_file(&self, remote: &str, local: &Path) -> Result<()>;

    async fn close(&self) -> Result<()>;
}

/// Joins a command batch the way the remote shell receives it.
pub fn join_commands(commands: &[String]) -> String {
    commands.join("; ")
}
