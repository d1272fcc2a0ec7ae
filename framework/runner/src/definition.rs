use std::sync::Arc;

use crate::cli::StampedeCli;
use crate::config::{ConfigError, Role, RunConfig, RunTimings};
use crate::engine::LoadEngine;
use crate::init::init;
use crate::orchestrator::TaskOrchestrator;
use crate::store::{FsObjectStore, ObjectStore};

/// The builder for a load test definition.
///
/// This must be used at the start of a load test binary to hand the runner the engine that
/// generates load, and any clients for external systems.
pub struct LoadTestDefinitionBuilder {
    /// The name of the load test, used in logs.
    ///
    /// Recommended value is `env!("CARGO_PKG_NAME")`.
    name: String,
    /// This value is initialised for you from the command line.
    #[doc(hidden)]
    cli: StampedeCli,
    /// The engine that generates load. Required.
    engine: Option<Arc<dyn LoadEngine>>,
    /// Where stage schedules are read from and reports are written to.
    ///
    /// Defaults to a [FsObjectStore] rooted at `--store-root`.
    store: Option<Arc<dyn ObjectStore>>,
    /// Client for the container orchestrator. Only workers watching a master task need one.
    orchestrator: Option<Arc<dyn TaskOrchestrator>>,
    timings: RunTimings,
}

#[derive(Debug)]
pub struct LoadTestDefinition {
    pub name: String,
    pub config: RunConfig,
    pub engine: Arc<dyn LoadEngine>,
    pub store: Arc<dyn ObjectStore>,
    pub orchestrator: Option<Arc<dyn TaskOrchestrator>>,
}

impl LoadTestDefinitionBuilder {
    /// Initialise a new load test definition from the name and command line arguments.
    ///
    /// This sets up logging, so it should be called once, early in `main`.
    pub fn new(name: &str) -> Self {
        Self::with_cli(name, init())
    }

    /// Create a definition from already parsed command line arguments.
    pub fn with_cli(name: &str, cli: StampedeCli) -> Self {
        Self {
            name: name.to_string(),
            cli,
            engine: None,
            store: None,
            orchestrator: None,
            timings: RunTimings::default(),
        }
    }

    /// Set the load engine [LoadTestDefinitionBuilder::engine] for this load test.
    pub fn use_engine(mut self, engine: Arc<dyn LoadEngine>) -> Self {
        self.engine = Some(engine);
        self
    }

    /// Replace the default [LoadTestDefinitionBuilder::store].
    pub fn use_object_store(mut self, store: Arc<dyn ObjectStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Set the orchestrator client [LoadTestDefinitionBuilder::orchestrator].
    pub fn use_orchestrator(mut self, orchestrator: Arc<dyn TaskOrchestrator>) -> Self {
        self.orchestrator = Some(orchestrator);
        self
    }

    /// Override the loop intervals. Mostly useful to make tests fast.
    pub fn with_timings(mut self, timings: RunTimings) -> Self {
        self.timings = timings;
        self
    }

    pub(crate) fn build(self) -> Result<LoadTestDefinition, ConfigError> {
        let mut config = RunConfig::from_cli(&self.cli)?;
        config.timings = self.timings;

        let engine = self.engine.ok_or(ConfigError::MissingEngine)?;

        if let Role::Worker {
            master_task: Some(task),
        } = &config.role
        {
            if self.orchestrator.is_none() {
                return Err(ConfigError::MissingOrchestrator(task.to_string()));
            }
        }

        let store = self
            .store
            .unwrap_or_else(|| Arc::new(FsObjectStore::new(&self.cli.store_root)));

        Ok(LoadTestDefinition {
            name: self.name,
            config,
            engine,
            store,
            orchestrator: self.orchestrator,
        })
    }
}
