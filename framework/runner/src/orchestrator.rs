use std::collections::HashMap;
use std::fmt::Debug;

use async_trait::async_trait;

use crate::types::StampedeResult;

/// Status value the orchestrator uses for a task that has exited.
pub const STOPPED_STATUS: &str = "STOPPED";

/// Per-container overrides applied when a task was launched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContainerOverride {
    pub name: String,
    pub environment: HashMap<String, String>,
}

/// A network attachment of a task, such as an elastic network interface.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskAttachment {
    pub attachment_type: String,
    pub details: HashMap<String, String>,
}

/// What the orchestrator knows about one task.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskDescriptor {
    pub task_arn: String,
    pub last_status: String,
    pub container_overrides: Vec<ContainerOverride>,
    pub attachments: Vec<TaskAttachment>,
}

impl TaskDescriptor {
    /// Only an exact `STOPPED` status counts as stopped.
    pub fn is_stopped(&self) -> bool {
        self.last_status == STOPPED_STATUS
    }
}

/// One page of task identifiers from [TaskOrchestrator::list_tasks].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskPage {
    pub task_arns: Vec<String>,
    pub next_token: Option<String>,
}

/// The container orchestrator that runs the master and worker tasks.
#[async_trait]
pub trait TaskOrchestrator: Debug + Send + Sync + 'static {
    /// List running tasks of a task family, one page at a time.
    async fn list_tasks(
        &self,
        cluster: &str,
        family: &str,
        next_token: Option<String>,
    ) -> StampedeResult<TaskPage>;

    /// Describe the given tasks. Tasks the orchestrator no longer knows about are left out.
    async fn describe_tasks(
        &self,
        cluster: &str,
        task_arns: &[String],
    ) -> StampedeResult<Vec<TaskDescriptor>>;
}
