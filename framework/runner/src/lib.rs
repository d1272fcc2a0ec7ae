mod aggregator;
mod cli;
mod config;
mod context;
mod coordinator;
mod definition;
mod engine;
mod executor;
mod init;
mod locator;
mod monitor;
mod orchestrator;
mod progress;
mod run;
mod shape;
mod shutdown;
mod stages;
mod store;
mod summary;
mod types;
mod watchdog;

pub mod prelude {
    pub use crate::aggregator::{publish_report, wall_clock_time, ResultAggregator};
    pub use crate::cli::{ClientType, StampedeCli};
    pub use crate::config::{ConfigError, Role, RunConfig, RunTimings};
    pub use crate::context::RunContext;
    pub use crate::coordinator::{CompletionTracker, RunCoordinator};
    pub use crate::definition::{LoadTestDefinition, LoadTestDefinitionBuilder};
    pub use crate::engine::{EngineStatistics, EngineTotals, LoadEngine};
    pub use crate::init::init;
    pub use crate::locator::{
        configure_worker_commands, worker_arguments, MasterLivenessQuery, MasterLocation,
        MasterLocator, MasterStatus, EXECUTION_ID_ENV,
    };
    pub use crate::orchestrator::{
        ContainerOverride, TaskAttachment, TaskDescriptor, TaskOrchestrator, TaskPage,
        STOPPED_STATUS,
    };
    pub use crate::run::{run, RunOutcome};
    pub use crate::shape::{RunState, ShapeMode, ShapeTick, StageShapeController};
    pub use crate::stages::{Stage, StageSchedule};
    pub use crate::store::{FsObjectStore, InMemoryObjectStore, ObjectLocation, ObjectStore};
    pub use crate::summary::{print_summary, render_summary};
    pub use crate::types::StampedeResult;
    pub use crate::watchdog::{LivenessWatchdog, MasterTaskRef, WatchdogOutcome};

    pub use stampede_core::prelude::{ShutdownHandle, StopReason};
    pub use stampede_report_model::{Percentile, Report, StatsSnapshot};
}
