use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::api::{self, ApiState};
use crate::config::ServiceConfig;
use crate::controller::{Controller, TickOutcome};
use crate::error::Result;
use crate::notify::LogNotifier;
use crate::package::CondorPackageBuilder;
use crate::remote::SshExecutor;
use crate::store::{FileStore, JobStore, MemoryStore};

/// The running service: tick loop plus HTTP API.
pub struct Service {
    config: ServiceConfig,
    controller: Arc<Controller>,
    trigger: Arc<Notify>,
}

impl Service {
    pub fn new(config: ServiceConfig, controller: Arc<Controller>) -> Self {
        Self {
            config,
            controller,
            trigger: Arc::new(Notify::new()),
        }
    }

    /// Wires the production collaborators described by `config`.
    pub async fn from_config(config: ServiceConfig) -> Result<Self> {
        let store: Arc<dyn JobStore> = match &config.store_path {
            Some(path) => Arc::new(FileStore::open(path).await?),
            None => {
                tracing::warn!("No store path configured, jobs are kept in memory only");
                Arc::new(MemoryStore::new())
            }
        };

        let controller = Controller::new(
            store,
            Arc::new(SshExecutor::new(config.remote.clone())),
            Arc::new(CondorPackageBuilder::new(config.package.clone())),
            Arc::new(LogNotifier),
            config.controller.clone(),
        );
        Ok(Self::new(config, Arc::new(controller)))
    }

    pub fn controller(&self) -> &Arc<Controller> {
        &self.controller
    }

    pub fn trigger(&self) -> &Arc<Notify> {
        &self.trigger
    }

    pub async fn run(self, shutdown: CancellationToken) -> Result<()> {
        let api_state = ApiState {
            controller: self.controller.clone(),
            trigger: self.trigger.clone(),
        };
        let api_shutdown = shutdown.clone();
        let addr = self.config.listen_addr;
        let api = tokio::spawn(async move {
            api::run_api(addr, api_state, api_shutdown).await;
        });

        tick_loop(
            self.controller,
            self.trigger,
            Duration::from_secs(self.config.tick_interval_secs),
            shutdown,
        )
        .await;

        if let Err(e) = api.await {
            tracing::error!(error = %e, "API task panicked");
        }
        tracing::info!("Service stopped");
        Ok(())
    }
}

/// Ticks on every interval and whenever `trigger` is notified.
///
/// A notification that arrives during a tick is remembered by `Notify`, so any
/// number of triggers while busy collapse into one follow-up tick. Shutdown is
/// only observed between ticks.
pub async fn tick_loop(
    controller: Arc<Controller>,
    trigger: Arc<Notify>,
    period: Duration,
    shutdown: CancellationToken,
) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                tracing::info!("Tick loop shutting down");
                break;
            }
            _ = interval.tick() => {}
            _ = trigger.notified() => {
                tracing::debug!("Tick requested");
            }
        }

        if let TickOutcome::Skipped = controller.tick().await {
            tracing::warn!("Tick skipped, previous tick still running");
        }
    }
}
