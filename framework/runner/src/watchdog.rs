use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use stampede_core::prelude::{DelegatedShutdownListener, ShutdownHandle, StopReason};
use tokio::time::Instant;

use crate::config::ConfigError;
use crate::context::stop_run;
use crate::engine::LoadEngine;
use crate::orchestrator::TaskOrchestrator;

/// Reference to the running master task, as handed to workers on their command line.
#[derive(derive_more::Display, Debug, Clone, PartialEq, Eq)]
#[display("{task_arn}")]
pub struct MasterTaskRef {
    task_arn: String,
    cluster: String,
}

impl MasterTaskRef {
    pub fn task_arn(&self) -> &str {
        &self.task_arn
    }

    pub fn cluster(&self) -> &str {
        &self.cluster
    }
}

impl FromStr for MasterTaskRef {
    type Err = ConfigError;

    /// The cluster is the second `/` separated part of `arn:...:task/<cluster>/<task-id>`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split('/');
        let (Some(_), Some(cluster), Some(task_id)) = (parts.next(), parts.next(), parts.next())
        else {
            return Err(ConfigError::InvalidMasterTask(s.to_string()));
        };
        if cluster.is_empty() || task_id.is_empty() {
            return Err(ConfigError::InvalidMasterTask(s.to_string()));
        }

        Ok(Self {
            task_arn: s.to_string(),
            cluster: cluster.to_string(),
        })
    }
}

/// How a watchdog finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchdogOutcome {
    /// The master task is gone and the engine was told to stop.
    MasterGone,
    /// The maximum runtime elapsed and the engine was told to stop.
    MaxRuntimeExceeded,
    /// The run ended for another reason.
    Cancelled(StopReason),
}

/// Watches the master task from a worker and stops the local engine if the master is gone or the
/// run has gone on too long.
///
/// This is a best effort check. A dead master is noticed within one poll interval. A failed query
/// is not taken as a dead master, only an explicit `STOPPED` status or the task being missing.
#[derive(Debug)]
pub struct LivenessWatchdog {
    master_task: MasterTaskRef,
    orchestrator: Arc<dyn TaskOrchestrator>,
    engine: Arc<dyn LoadEngine>,
    shutdown_handle: ShutdownHandle,
    max_runtime: Option<Duration>,
    grace: Duration,
    poll_interval: Duration,
}

impl LivenessWatchdog {
    pub fn new(
        master_task: MasterTaskRef,
        orchestrator: Arc<dyn TaskOrchestrator>,
        engine: Arc<dyn LoadEngine>,
        shutdown_handle: ShutdownHandle,
    ) -> Self {
        Self {
            master_task,
            orchestrator,
            engine,
            shutdown_handle,
            max_runtime: None,
            grace: Duration::from_secs(20),
            poll_interval: Duration::from_secs(60),
        }
    }

    pub fn with_max_runtime(mut self, max_runtime: Option<Duration>) -> Self {
        self.max_runtime = max_runtime;
        self
    }

    pub fn with_intervals(mut self, grace: Duration, poll_interval: Duration) -> Self {
        self.grace = grace;
        self.poll_interval = poll_interval;
        self
    }

    /// Poll until the master is gone, the runtime budget is spent, or the run stops for another
    /// reason.
    pub async fn run(self, mut shutdown_listener: DelegatedShutdownListener) -> WatchdogOutcome {
        let started_at = Instant::now();
        log::info!(
            "Watching master task {} in cluster {}",
            self.master_task,
            self.master_task.cluster()
        );

        let mut wait = self.grace;
        loop {
            tokio::select! {
                reason = shutdown_listener.wait_for_shutdown() => {
                    log::debug!("Watchdog exiting, run is stopping: {reason}");
                    return WatchdogOutcome::Cancelled(reason);
                }
                _ = tokio::time::sleep(wait) => {}
            }
            wait = self.poll_interval;

            if let Some(outcome) = self.check(started_at.elapsed()).await {
                return outcome;
            }
        }
    }

    async fn check(&self, elapsed: Duration) -> Option<WatchdogOutcome> {
        if self.max_runtime.is_some_and(|max| elapsed > max) {
            log::warn!(
                "Worker has been running for {}s, over the maximum runtime, stopping",
                elapsed.as_secs()
            );
            stop_run(
                &self.shutdown_handle,
                self.engine.as_ref(),
                StopReason::MaxRuntimeExceeded,
            );
            return Some(WatchdogOutcome::MaxRuntimeExceeded);
        }

        let tasks = match self
            .orchestrator
            .describe_tasks(
                self.master_task.cluster(),
                &[self.master_task.task_arn().to_string()],
            )
            .await
        {
            Ok(tasks) => tasks,
            Err(e) => {
                log::warn!(
                    "Could not check master task {}, will try again: {e:?}",
                    self.master_task
                );
                return None;
            }
        };

        let gone = match tasks.as_slice() {
            [task] => task.is_stopped(),
            _ => true,
        };
        if gone {
            log::warn!("Master task {} is gone, stopping this worker", self.master_task);
            stop_run(&self.shutdown_handle, self.engine.as_ref(), StopReason::MasterGone);
            return Some(WatchdogOutcome::MasterGone);
        }

        log::debug!("Master task {} is still running", self.master_task);
        None
    }
}
