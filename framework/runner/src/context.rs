use std::sync::Arc;

use stampede_core::prelude::{ShutdownHandle, StopReason};
use tokio::time::Instant;

use crate::config::RunConfig;
use crate::engine::LoadEngine;
use crate::orchestrator::TaskOrchestrator;
use crate::store::ObjectStore;

/// Everything the loops of one process share. Cloning is cheap.
#[derive(Debug, Clone)]
pub struct RunContext {
    config: Arc<RunConfig>,
    engine: Arc<dyn LoadEngine>,
    store: Arc<dyn ObjectStore>,
    orchestrator: Option<Arc<dyn TaskOrchestrator>>,
    shutdown_handle: ShutdownHandle,
}

impl RunContext {
    pub fn new(
        config: RunConfig,
        engine: Arc<dyn LoadEngine>,
        store: Arc<dyn ObjectStore>,
        orchestrator: Option<Arc<dyn TaskOrchestrator>>,
        shutdown_handle: ShutdownHandle,
    ) -> Self {
        Self {
            config: Arc::new(config),
            engine,
            store,
            orchestrator,
            shutdown_handle,
        }
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    pub fn engine(&self) -> &Arc<dyn LoadEngine> {
        &self.engine
    }

    pub fn store(&self) -> &Arc<dyn ObjectStore> {
        &self.store
    }

    pub fn orchestrator(&self) -> Option<&Arc<dyn TaskOrchestrator>> {
        self.orchestrator.as_ref()
    }

    pub fn shutdown_handle(&self) -> &ShutdownHandle {
        &self.shutdown_handle
    }

    /// Stop the run. Only the first caller reaches the engine.
    pub fn stop(&self, reason: StopReason) -> bool {
        stop_run(&self.shutdown_handle, self.engine.as_ref(), reason)
    }
}

/// Record `reason` and stop the engine, unless the run is already stopping.
///
/// Several loops can spot the end of a run at about the same time. Only the first of them issues
/// the stop command.
pub(crate) fn stop_run(
    shutdown_handle: &ShutdownHandle,
    engine: &dyn LoadEngine,
    reason: StopReason,
) -> bool {
    if !shutdown_handle.shutdown(reason) {
        return false;
    }

    log::info!("Stopping run: {reason}");
    engine.stop();
    true
}

/// Seconds since `started_at`, for log lines.
pub(crate) fn elapsed_secs(started_at: Instant) -> u64 {
    started_at.elapsed().as_secs()
}
