//! Periodic drivers for refresh and data updates.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::sync::SyncOrchestrator;

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Cadence of full refresh attempts. Attempts overlapping an active run
    /// are absorbed by the orchestrator's single-flight guard.
    pub refresh_interval: Duration,
    /// Cadence of light data updates between refreshes.
    pub update_interval: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            refresh_interval: Duration::from_secs(30),
            update_interval: Duration::from_secs(5),
        }
    }
}

/// Owns the two background loops that keep the wallet current. Dropping the
/// scheduler (or calling [`Self::shutdown`]) aborts them.
pub struct RefreshScheduler {
    orchestrator: Arc<SyncOrchestrator>,
    config: SchedulerConfig,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl RefreshScheduler {
    pub fn new(orchestrator: Arc<SyncOrchestrator>, config: SchedulerConfig) -> Self {
        Self {
            orchestrator,
            config,
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Start both loops. Calling again while they run is a no-op.
    pub fn start(&self) {
        let mut tasks = self.tasks.lock().unwrap();
        if !tasks.is_empty() {
            debug!("scheduler already running");
            return;
        }
        info!(
            refresh_secs = self.config.refresh_interval.as_secs(),
            update_secs = self.config.update_interval.as_secs(),
            "starting refresh scheduler"
        );

        let orchestrator = Arc::clone(&self.orchestrator);
        let refresh_interval = self.config.refresh_interval;
        tasks.push(tokio::spawn(async move {
            let mut interval = tokio::time::interval(refresh_interval);
            loop {
                interval.tick().await;
                orchestrator.refresh(false, false).await;
            }
        }));

        let orchestrator = Arc::clone(&self.orchestrator);
        let update_interval = self.config.update_interval;
        tasks.push(tokio::spawn(async move {
            let mut interval = tokio::time::interval(update_interval);
            loop {
                interval.tick().await;
                orchestrator.update_data().await;
            }
        }));
    }

    pub fn shutdown(&self) {
        let mut tasks = self.tasks.lock().unwrap();
        for task in tasks.drain(..) {
            task.abort();
        }
    }

    pub fn is_running(&self) -> bool {
        !self.tasks.lock().unwrap().is_empty()
    }
}

impl Drop for RefreshScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}
