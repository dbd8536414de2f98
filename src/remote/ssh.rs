use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::config::RemoteConfig;
use crate::error::{RelmonError, Result};
use crate::remote::{join_commands, CommandOutput, RemoteExecutor};

/// Exit code OpenSSH uses for its own (connection) failures.
const SSH_TRANSPORT_FAILURE: i32 = 255;

/// Runs commands on the submit host through an OpenSSH control master.
///
/// The master connection is opened on first use and shared by every command
/// and transfer until [`RemoteExecutor::close`] tears it down, so one tick
/// authenticates once.
#[derive(Debug)]
pub struct SshExecutor {
    config: RemoteConfig,
    control_path: Mutex<Option<PathBuf>>,
}

impl SshExecutor {
    pub fn new(config: RemoteConfig) -> Self {
        Self {
            config,
            control_path: Mutex::new(None),
        }
    }

    fn destination(&self) -> String {
        match &self.config.user {
            Some(user) => format!("{}@{}", user, self.config.host),
            None => self.config.host.clone(),
        }
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(self.config.command_timeout_secs)
    }

    /// Control socket of the live session, starting the master if needed.
    async fn session(&self) -> Result<PathBuf> {
        let mut control_path = self.control_path.lock().await;
        if let Some(path) = control_path.as_ref() {
            return Ok(path.clone());
        }

        let path = self
            .config
            .control_dir
            .join(format!("relmon-{}.sock", Uuid::new_v4().simple()));

        let mut args = vec![
            "-M".to_string(),
            "-N".to_string(),
            "-f".to_string(),
            "-o".to_string(),
            format!("ControlPath={}", path.display()),
        ];
        args.extend(self.config.ssh_options.iter().cloned());
        args.push(self.destination());

        tracing::info!(host = %self.config.host, "Opening SSH session");
        let output = self.run("connect", &self.config.ssh_binary, &args).await?;
        if !output.status.success() {
            return Err(RelmonError::Remote(format!(
                "cannot connect to {}: {}",
                self.config.host,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        *control_path = Some(path.clone());
        Ok(path)
    }

    async fn run(&self, operation: &str, program: &str, args: &[String]) -> Result<Output> {
        let child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output();

        match tokio::time::timeout(self.timeout(), child).await {
            Ok(result) => Ok(result?),
            Err(_) => {
                tracing::error!(operation, host = %self.config.host, "Remote operation timed out");
                Err(RelmonError::RemoteTimeout {
                    operation: operation.to_string(),
                    secs: self.config.command_timeout_secs,
                })
            }
        }
    }

    async fn copy(&self, operation: &str, from: String, to: String) -> Result<()> {
        let control_path = self.session().await?;
        let mut args = vec![
            "-q".to_string(),
            "-o".to_string(),
            format!("ControlPath={}", control_path.display()),
        ];
        args.extend(self.config.ssh_options.iter().cloned());
        args.push(from.clone());
        args.push(to.clone());

        let output = self.run(operation, &self.config.scp_binary, &args).await?;
        if output.status.success() {
            tracing::debug!(operation, from = %from, to = %to, "Copied file");
            Ok(())
        } else {
            Err(RelmonError::Remote(format!(
                "{} {} -> {} failed: {}",
                operation,
                from,
                to,
                String::from_utf8_lossy(&output.stderr).trim()
            )))
        }
    }
}

#[async_trait]
impl RemoteExecutor for SshExecutor {
    async fn execute(&self, commands: &[String]) -> Result<CommandOutput> {
        let control_path = self.session().await?;
        let command = join_commands(commands);
        tracing::debug!(command = %command, "Executing remote command");

        let mut args = vec![
            "-S".to_string(),
            control_path.display().to_string(),
        ];
        args.extend(self.config.ssh_options.iter().cloned());
        args.push(self.destination());
        args.push("--".to_string());
        args.push(command);

        let output = self.run("execute", &self.config.ssh_binary, &args).await?;
        let result = CommandOutput::new(
            String::from_utf8_lossy(&output.stdout),
            String::from_utf8_lossy(&output.stderr),
        );

        // The remote command's own exit code is the caller's business; 255 is ssh itself.
        if output.status.code() == Some(SSH_TRANSPORT_FAILURE) {
            return Err(RelmonError::Remote(format!(
                "ssh to {} failed: {}",
                self.config.host, result.stderr
            )));
        }
        Ok(result)
    }

    async fn upload_file(&self, local: &Path, remote: &str) -> Result<()> {
        self.copy(
            "upload",
            local.display().to_string(),
            format!("{}:{}", self.destination(), remote),
        )
        .await
    }

    async fn download_file(&self, remote: &str, local: &Path) -> Result<()> {
        self.copy(
            "download",
            format!("{}:{}", self.destination(), remote),
            local.display().to_string(),
        )
        .await
    }

    async fn close(&self) -> Result<()> {
        let Some(control_path) = self.control_path.lock().await.take() else {
            return Ok(());
        };

        let args = vec![
            "-S".to_string(),
            control_path.display().to_string(),
            "-O".to_string(),
            "exit".to_string(),
            self.destination(),
        ];
        let output = self.run("close", &self.config.ssh_binary, &args).await?;
        if !output.status.success() {
            tracing::warn!(
                host = %self.config.host,
                stderr = %String::from_utf8_lossy(&output.stderr).trim(),
                "SSH master did not exit cleanly"
            );
        }
        let _ = tokio::fs::remove_file(&control_path).await;
        tracing::info!(host = %self.config.host, "Closed SSH session");
        Ok(())
    }
}
