use std::time::Duration;

use stampede_report_model::{parse_percentiles, InvalidPercentile, Percentile};

use crate::cli::{ClientType, StampedeCli};
use crate::shape::ShapeMode;
use crate::store::ObjectLocation;
use crate::watchdog::MasterTaskRef;

/// Configuration problems that stop a run before it starts.
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error(transparent)]
    InvalidPercentile(#[from] InvalidPercentile),
    #[error("stage {index} is invalid: {reason}")]
    InvalidStage { index: usize, reason: String },
    #[error("stage schedule is malformed: {0}")]
    MalformedSchedule(String),
    #[error("stage schedule at {location} is unavailable: {reason}")]
    ScheduleUnavailable { location: String, reason: String },
    #[error("master task reference `{0}` must look like `arn:...:task/<cluster>/<task-id>`")]
    InvalidMasterTask(String),
    #[error("watching master task {0} needs a task orchestrator, none was provided")]
    MissingOrchestrator(String),
    #[error("no load engine was provided, call `use_engine` on the definition")]
    MissingEngine,
}

/// The part this process plays, with the settings only that part needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Role {
    Master { expected_workers: usize },
    /// A worker, optionally watching the master task so it can exit if the master dies.
    Worker { master_task: Option<MasterTaskRef> },
    Local,
}

impl Role {
    pub fn name(&self) -> &'static str {
        match self {
            Role::Master { .. } => "master",
            Role::Worker { .. } => "worker",
            Role::Local => "local",
        }
    }
}

/// Intervals for the run's loops.
///
/// The defaults are the production values. Tests shorten them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunTimings {
    /// How often the shape controller is asked for a new target
    pub shape_tick: Duration,
    /// How often statistics are added to the history
    pub stats_interval: Duration,
    /// How often the coordinator checks whether the run is complete
    pub completion_poll: Duration,
    /// How often a master checks whether enough workers are ready
    pub worker_gate_poll: Duration,
    /// Delay before a worker's first check on the master task
    pub watchdog_grace: Duration,
    /// How often a worker checks on the master task
    pub watchdog_poll: Duration,
}

impl Default for RunTimings {
    fn default() -> Self {
        Self {
            shape_tick: Duration::from_secs(1),
            stats_interval: Duration::from_secs(5),
            completion_poll: Duration::from_secs(5),
            worker_gate_poll: Duration::from_secs(1),
            watchdog_grace: Duration::from_secs(20),
            watchdog_poll: Duration::from_secs(60),
        }
    }
}

/// Validated configuration for one process of a run.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub role: Role,
    /// The service under test
    pub target_host: String,
    /// Where the master binds, or where a worker reaches its master
    pub master_host: String,
    pub master_port: u16,
    pub shapes_location: ObjectLocation,
    pub output_location: Option<ObjectLocation>,
    pub percentiles: Vec<Percentile>,
    pub max_runtime: Option<Duration>,
    pub shape_mode: ShapeMode,
    pub show_progress: bool,
    pub timings: RunTimings,
}

impl RunConfig {
    pub fn from_cli(cli: &StampedeCli) -> Result<Self, ConfigError> {
        let role = match cli.client_type {
            ClientType::Master => Role::Master {
                expected_workers: cli.expected_workers,
            },
            ClientType::Worker => Role::Worker {
                master_task: cli
                    .master_task
                    .as_deref()
                    .map(str::parse::<MasterTaskRef>)
                    .transpose()?,
            },
            ClientType::Local => Role::Local,
        };

        let output_location = match (&cli.output_bucket, &cli.output_key) {
            (Some(bucket), Some(key)) => Some(ObjectLocation::new(bucket, key)),
            _ => None,
        };

        Ok(Self {
            role,
            target_host: cli.host.clone(),
            master_host: cli.master_host.clone(),
            master_port: cli.master_port,
            shapes_location: ObjectLocation::new(&cli.shapes_bucket, &cli.shapes_key),
            output_location,
            percentiles: parse_percentiles(&cli.percentiles)?,
            max_runtime: cli.max_runtime.map(Duration::from_secs),
            shape_mode: cli.shape_mode,
            show_progress: !cli.no_progress,
            timings: RunTimings::default(),
        })
    }

    /// The `host:port` address of the master for this run.
    pub fn master_address(&self) -> String {
        format!("{}:{}", self.master_host, self.master_port)
    }
}
