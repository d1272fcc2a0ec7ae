use std::sync::Arc;

use anyhow::Context;

use crate::orchestrator::{TaskDescriptor, TaskOrchestrator};
use crate::types::StampedeResult;

/// Environment variable on the master container that carries the execution id.
pub const EXECUTION_ID_ENV: &str = "EXECUTION_ID";

const NETWORK_INTERFACE_ATTACHMENT: &str = "ElasticNetworkInterface";
const PRIVATE_IP_DETAIL: &str = "privateIPv4Address";

/// Identifies which running task, if any, is the master for one execution of a load test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MasterLivenessQuery {
    pub cluster_id: String,
    pub task_family: String,
    pub task_name: String,
    pub execution_id: String,
}

/// Where to find a running master.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MasterLocation {
    pub last_status: String,
    pub task_arn: String,
    pub private_ip: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MasterStatus {
    Running(MasterLocation),
    /// No task of the family matches the execution, so the master has crashed or never started.
    Stopped,
}

/// Finds the master task for an execution, so that workers can be told where to connect.
#[derive(Debug, Clone)]
pub struct MasterLocator {
    orchestrator: Arc<dyn TaskOrchestrator>,
}

impl MasterLocator {
    pub fn new(orchestrator: Arc<dyn TaskOrchestrator>) -> Self {
        Self { orchestrator }
    }

    /// Page through the running tasks of the family until the master for this execution is found.
    ///
    /// An empty page, or running out of pages, means the master is stopped. Orchestrator errors are
    /// returned to the caller.
    pub async fn locate(&self, query: &MasterLivenessQuery) -> StampedeResult<MasterStatus> {
        let mut next_token = None;
        loop {
            let page = self
                .orchestrator
                .list_tasks(&query.cluster_id, &query.task_family, next_token)
                .await
                .with_context(|| {
                    format!(
                        "Failed to list tasks of family {} in cluster {}",
                        query.task_family, query.cluster_id
                    )
                })?;

            if page.task_arns.is_empty() {
                log::info!(
                    "No running tasks of family {} in cluster {}",
                    query.task_family,
                    query.cluster_id
                );
                return Ok(MasterStatus::Stopped);
            }

            let descriptions = self
                .orchestrator
                .describe_tasks(&query.cluster_id, &page.task_arns)
                .await
                .context("Failed to describe tasks")?;

            if let Some(task) = descriptions.iter().find(|t| is_master_for(t, query)) {
                log::info!(
                    "Found master {} for execution {} with status {}",
                    task.task_arn,
                    query.execution_id,
                    task.last_status
                );
                return Ok(MasterStatus::Running(MasterLocation {
                    last_status: task.last_status.clone(),
                    task_arn: task.task_arn.clone(),
                    private_ip: private_ip(task),
                }));
            }

            match page.next_token {
                Some(token) => next_token = Some(token),
                None => {
                    log::info!("No master found for execution {}", query.execution_id);
                    return Ok(MasterStatus::Stopped);
                }
            }
        }
    }
}

/// The master is the task whose first container is named after the master task and was launched
/// for this execution.
fn is_master_for(task: &TaskDescriptor, query: &MasterLivenessQuery) -> bool {
    task.container_overrides.first().is_some_and(|container| {
        container.name == query.task_name
            && container
                .environment
                .get(EXECUTION_ID_ENV)
                .is_some_and(|id| *id == query.execution_id)
    })
}

fn private_ip(task: &TaskDescriptor) -> Option<String> {
    task.attachments
        .iter()
        .filter(|a| a.attachment_type == NETWORK_INTERFACE_ATTACHMENT)
        .find_map(|a| a.details.get(PRIVATE_IP_DETAIL).cloned())
}

/// Arguments that point a worker at the master and let it watch the master task.
pub fn worker_arguments(location: &MasterLocation) -> Vec<String> {
    let mut args = Vec::with_capacity(4);
    if let Some(ip) = &location.private_ip {
        args.push("--master-host".to_string());
        args.push(ip.clone());
    }
    args.push("--master-task".to_string());
    args.push(location.task_arn.clone());
    args
}

/// Append the [worker_arguments] to every worker command.
pub fn configure_worker_commands(commands: &mut [Vec<String>], location: &MasterLocation) {
    let args = worker_arguments(location);
    for command in commands.iter_mut() {
        command.extend(args.iter().cloned());
    }
}
