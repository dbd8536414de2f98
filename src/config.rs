use std::net::SocketAddr;
use std::path::PathBuf;

/// Connection to the HTCondor submit host.
#[derive(Debug, Clone)]
pub struct RemoteConfig {
    /// Submit host, e.g. "lxplus.cern.ch"
    pub host: String,
    /// Remote login; the local ssh configuration decides when unset
    pub user: Option<String>,
    pub ssh_binary: String,
    pub scp_binary: String,
    /// Extra options passed to both ssh and scp
    pub ssh_options: Vec<String>,
    /// Where control master sockets are created. Keep the path short,
    /// unix sockets are limited to ~100 bytes.
    pub control_dir: PathBuf,
    /// Upper bound for any single command or transfer
    pub command_timeout_secs: u64,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            host: "lxplus.cern.ch".to_string(),
            user: None,
            ssh_binary: "ssh".to_string(),
            scp_binary: "scp".to_string(),
            ssh_options: vec!["-o".to_string(), "BatchMode=yes".to_string()],
            control_dir: std::env::temp_dir(),
            command_timeout_secs: 300,
        }
    }
}

impl RemoteConfig {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            ..Default::default()
        }
    }

    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    pub fn with_binaries(mut self, ssh: impl Into<String>, scp: impl Into<String>) -> Self {
        self.ssh_binary = ssh.into();
        self.scp_binary = scp.into();
        self
    }

    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.command_timeout_secs = secs;
        self
    }
}

/// What goes into a job package besides the job itself.
#[derive(Debug, Clone)]
pub struct PackageConfig {
    /// Endpoint the remote worker reports progress to
    pub callback_url: String,
    pub cmssw_release: String,
    /// Directory on the submit host holding the grid certificate and key
    pub grid_location: String,
    pub cert_file: String,
    pub key_file: String,
    /// Where finished reports are published
    pub web_location: String,
    /// HTCondor `+JobFlavour`
    pub job_flavour: String,
    /// Comparison worker invoked by the job script
    pub worker_command: String,
}

impl Default for PackageConfig {
    fn default() -> Self {
        Self {
            callback_url: "http://127.0.0.1:8080/api/update".to_string(),
            cmssw_release: "CMSSW_11_0_0".to_string(),
            grid_location: "~/private".to_string(),
            cert_file: "usercert.pem".to_string(),
            key_file: "userkey.pem".to_string(),
            web_location: "/eos/project/c/cmsweb/www/pdmv-web-test/relmon".to_string(),
            job_flavour: "tomorrow".to_string(),
            worker_command: "relmon-worker".to_string(),
        }
    }
}

impl PackageConfig {
    pub fn with_callback_url(mut self, url: impl Into<String>) -> Self {
        self.callback_url = url.into();
        self
    }
}

#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Parent of the per-job working directories on the submit host
    pub remote_directory: String,
    /// Local scratch space for packages and collected logs
    pub scratch_dir: PathBuf,
    /// Public address of the service, used in notifications
    pub service_url: String,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            remote_directory: "relmon".to_string(),
            scratch_dir: PathBuf::from("relmon_scratch"),
            service_url: "http://127.0.0.1:8080".to_string(),
        }
    }
}

impl ControllerConfig {
    pub fn new(remote_directory: impl Into<String>, scratch_dir: impl Into<PathBuf>) -> Self {
        let remote_directory = remote_directory.into();
        Self {
            remote_directory: remote_directory.trim_end_matches('/').to_string(),
            scratch_dir: scratch_dir.into(),
            ..Default::default()
        }
    }

    /// Working directory of one job on the submit host.
    pub fn remote_job_directory(&self, job_id: &uuid::Uuid) -> String {
        format!("{}/{}", self.remote_directory, job_id)
    }

    /// Local scratch directory of one job.
    pub fn local_job_directory(&self, job_id: &uuid::Uuid) -> PathBuf {
        self.scratch_dir.join(job_id.to_string())
    }
}

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub listen_addr: SocketAddr,
    pub tick_interval_secs: u64,
    /// Durable store location; in-memory when unset
    pub store_path: Option<PathBuf>,
    pub controller: ControllerConfig,
    pub remote: RemoteConfig,
    pub package: PackageConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 8080)),
            tick_interval_secs: 600,
            store_path: None,
            controller: ControllerConfig::default(),
            remote: RemoteConfig::default(),
            package: PackageConfig::default(),
        }
    }
}

impl ServiceConfig {
    pub fn new(listen_addr: SocketAddr) -> Self {
        Self {
            listen_addr,
            ..Default::default()
        }
    }

    pub fn with_store_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.store_path = Some(path.into());
        self
    }

    pub fn with_tick_interval_secs(mut self, secs: u64) -> Self {
        self.tick_interval_secs = secs;
        self
    }
}
