use clap::{Parser, ValueEnum};

use crate::shape::ShapeMode;

/// Which part this process plays in a run.
#[derive(ValueEnum, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ClientType {
    /// Owns the stage schedule, waits for workers and writes the report.
    Master,
    /// Generates load under the direction of a master.
    Worker,
    /// Runs the whole schedule in this process, without workers.
    #[default]
    Local,
}

#[derive(Parser, Debug, Clone)]
#[command(about, long_about = None)]
pub struct StampedeCli {
    /// Base URL of the service under test
    #[arg(short = 'H', long)]
    pub host: String,

    /// Bucket holding the stage schedule
    #[arg(long)]
    pub shapes_bucket: String,

    /// Key of the stage schedule, a JSON array of `{"duration", "users", "spawn_rate"}` objects
    #[arg(long)]
    pub shapes_key: String,

    /// The role of this process
    #[arg(long, value_enum, default_value_t = ClientType::Local)]
    pub client_type: ClientType,

    /// Address the master binds to, or that workers connect to
    #[arg(long, default_value = "127.0.0.1")]
    pub master_host: String,

    #[arg(long, default_value_t = 5557)]
    pub master_port: u16,

    /// Number of workers the master waits for before starting the schedule
    #[arg(long, default_value_t = 1)]
    pub expected_workers: usize,

    /// Bucket for the report collection. Requires `--output-key`.
    #[arg(long, requires = "output_key")]
    pub output_bucket: Option<String>,

    /// Key of the report collection. Requires `--output-bucket`.
    #[arg(long, requires = "output_bucket")]
    pub output_key: Option<String>,

    /// Comma separated response time percentiles to report, for example `50,95,999`
    #[arg(long, default_value = "50,95")]
    pub percentiles: String,

    /// Stop the run after this many seconds, whatever stage it has reached
    #[arg(long)]
    pub max_runtime: Option<u64>,

    /// Task reference of the master, for example `arn:aws:ecs:region:account:task/cluster/id`.
    ///
    /// When set on a worker, the worker polls the orchestrator and stops itself if the master task
    /// disappears.
    #[arg(long, visible_alias = "fargate-task")]
    pub master_task: Option<String>,

    /// How stages advance
    #[arg(long, value_enum, default_value_t = ShapeMode::Users)]
    pub shape_mode: ShapeMode,

    /// Root directory for buckets when using the filesystem object store
    #[arg(long, default_value = ".")]
    pub store_root: String,

    /// Do not show a progress bar on the CLI.
    ///
    /// This is recommended for containers where nobody is watching the progress bar and it is just
    /// adding noise to the logs.
    #[arg(long, default_value_t = false)]
    pub no_progress: bool,
}
