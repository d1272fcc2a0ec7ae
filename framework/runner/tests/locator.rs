mod common;

use std::collections::HashMap;
use std::sync::Arc;

use common::{task, ScriptedOrchestrator};
use pretty_assertions::assert_eq;
use stampede_runner::prelude::{
    ContainerOverride, MasterLivenessQuery, MasterLocation, MasterLocator, MasterStatus,
    TaskAttachment, TaskDescriptor, TaskPage, EXECUTION_ID_ENV,
};

fn query() -> MasterLivenessQuery {
    MasterLivenessQuery {
        cluster_id: "load".to_string(),
        task_family: "stampede".to_string(),
        task_name: "stampede-master".to_string(),
        execution_id: "exec-7".to_string(),
    }
}

fn page(arns: &[&str], next_token: Option<&str>) -> TaskPage {
    TaskPage {
        task_arns: arns.iter().map(|a| a.to_string()).collect(),
        next_token: next_token.map(str::to_string),
    }
}

fn launched(arn: &str, container: &str, execution_id: &str, ip: Option<&str>) -> TaskDescriptor {
    TaskDescriptor {
        container_overrides: vec![ContainerOverride {
            name: container.to_string(),
            environment: HashMap::from([(EXECUTION_ID_ENV.to_string(), execution_id.to_string())]),
        }],
        attachments: ip
            .map(|ip| {
                vec![TaskAttachment {
                    attachment_type: "ElasticNetworkInterface".to_string(),
                    details: HashMap::from([
                        ("subnetId".to_string(), "subnet-0a1b".to_string()),
                        ("privateIPv4Address".to_string(), ip.to_string()),
                    ]),
                }]
            })
            .unwrap_or_default(),
        ..task(arn, "RUNNING")
    }
}

#[tokio::test]
async fn find_master_on_later_page() {
    let orchestrator = Arc::new(ScriptedOrchestrator::default());
    orchestrator.add_page(None, Ok(page(&["t/1", "t/2"], Some("more"))));
    orchestrator.add_page(Some("more"), Ok(page(&["t/3"], None)));
    // A worker of this execution and the master of another execution.
    orchestrator.add_task(launched("t/1", "stampede-worker", "exec-7", Some("10.0.0.5")));
    orchestrator.add_task(launched("t/2", "stampede-master", "exec-6", Some("10.0.0.6")));
    orchestrator.add_task(launched("t/3", "stampede-master", "exec-7", Some("10.0.3.12")));

    let status = MasterLocator::new(orchestrator).locate(&query()).await.unwrap();

    assert_eq!(
        MasterStatus::Running(MasterLocation {
            last_status: "RUNNING".to_string(),
            task_arn: "t/3".to_string(),
            private_ip: Some("10.0.3.12".to_string()),
        }),
        status
    );
}

#[tokio::test]
async fn master_stopped_when_no_tasks_run() {
    let orchestrator = Arc::new(ScriptedOrchestrator::default());
    orchestrator.add_page(None, Ok(page(&[], None)));

    let status = MasterLocator::new(orchestrator).locate(&query()).await.unwrap();

    assert_eq!(MasterStatus::Stopped, status);
}

#[tokio::test]
async fn master_stopped_when_pages_run_out() {
    let orchestrator = Arc::new(ScriptedOrchestrator::default());
    orchestrator.add_page(None, Ok(page(&["t/1"], Some("more"))));
    orchestrator.add_page(Some("more"), Ok(page(&["t/2"], None)));
    orchestrator.add_task(launched("t/1", "stampede-worker", "exec-7", None));
    orchestrator.add_task(launched("t/2", "stampede-master", "exec-1", None));

    let status = MasterLocator::new(orchestrator).locate(&query()).await.unwrap();

    assert_eq!(MasterStatus::Stopped, status);
}

#[tokio::test]
async fn orchestrator_errors_are_returned() {
    let orchestrator = Arc::new(ScriptedOrchestrator::default());
    orchestrator.add_page(None, Err("access denied".to_string()));

    let err = MasterLocator::new(orchestrator)
        .locate(&query())
        .await
        .unwrap_err();

    assert!(format!("{err:#}").contains("access denied"));
}
