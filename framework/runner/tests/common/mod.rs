#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use parking_lot::Mutex;
use stampede_runner::prelude::{
    ClientType, EngineStatistics, EngineTotals, LoadEngine, ShapeMode, StampedeCli,
    StampedeResult, TaskDescriptor, TaskOrchestrator, TaskPage,
};

/// Engine that reaches every target instantly and records what it was told.
#[derive(Debug, Default)]
pub struct ScriptedEngine {
    users: Mutex<u64>,
    stopped: Mutex<bool>,
    targets: Mutex<Vec<(u64, f64)>>,
    stop_calls: Mutex<usize>,
    ready_workers: Mutex<usize>,
}

impl ScriptedEngine {
    pub fn with_ready_workers(ready_workers: usize) -> Self {
        let engine = Self::default();
        *engine.ready_workers.lock() = ready_workers;
        engine
    }

    pub fn targets(&self) -> Vec<(u64, f64)> {
        self.targets.lock().clone()
    }

    pub fn stop_calls(&self) -> usize {
        *self.stop_calls.lock()
    }

    /// Stop without going through the runner, as a worker does when its master tells it to quit.
    pub fn quit(&self) {
        *self.stopped.lock() = true;
        *self.users.lock() = 0;
    }
}

impl LoadEngine for ScriptedEngine {
    fn set_target(&self, users: u64, spawn_rate: f64) {
        self.targets.lock().push((users, spawn_rate));
        *self.users.lock() = users;
    }

    fn stop(&self) {
        *self.stop_calls.lock() += 1;
        self.quit();
    }

    fn user_count(&self) -> Option<u64> {
        Some(*self.users.lock())
    }

    fn current_statistics(&self) -> EngineStatistics {
        let users = *self.users.lock();
        EngineStatistics {
            requests_per_second: Some(users as f64 * 2.0),
            failures_per_second: None,
            active_users: Some(users),
        }
    }

    fn current_response_time_percentile(&self, quantile: f64) -> Option<f64> {
        Some(quantile * 100.0)
    }

    fn response_times_cached(&self) -> bool {
        true
    }

    fn is_stopped(&self) -> bool {
        *self.stopped.lock()
    }

    fn ready_worker_count(&self) -> usize {
        *self.ready_workers.lock()
    }

    fn totals(&self) -> EngineTotals {
        EngineTotals {
            min_response_time: Some(3.0),
            max_response_time: Some(250.0),
            num_requests: 42,
        }
    }
}

/// Orchestrator that answers from scripted pages and task states.
#[derive(Debug, Default)]
pub struct ScriptedOrchestrator {
    /// Pages keyed by the token that requests them, `None` for the first page
    pages: Mutex<HashMap<Option<String>, Result<TaskPage, String>>>,
    tasks: Mutex<HashMap<String, TaskDescriptor>>,
    /// Answers to `describe_tasks`, in order. When only one is left it is repeated.
    describe_answers: Mutex<VecDeque<Result<Vec<TaskDescriptor>, String>>>,
    describe_calls: Mutex<usize>,
}

impl ScriptedOrchestrator {
    pub fn add_page(&self, token: Option<&str>, page: Result<TaskPage, String>) {
        self.pages.lock().insert(token.map(str::to_string), page);
    }

    pub fn add_task(&self, task: TaskDescriptor) {
        self.tasks.lock().insert(task.task_arn.clone(), task);
    }

    pub fn push_describe_answer(&self, answer: Result<Vec<TaskDescriptor>, String>) {
        self.describe_answers.lock().push_back(answer);
    }

    pub fn describe_calls(&self) -> usize {
        *self.describe_calls.lock()
    }
}

#[async_trait]
impl TaskOrchestrator for ScriptedOrchestrator {
    async fn list_tasks(
        &self,
        _cluster: &str,
        _family: &str,
        next_token: Option<String>,
    ) -> StampedeResult<TaskPage> {
        match self.pages.lock().get(&next_token) {
            Some(Ok(page)) => Ok(page.clone()),
            Some(Err(e)) => Err(anyhow::anyhow!("{e}")),
            None => Ok(TaskPage::default()),
        }
    }

    async fn describe_tasks(
        &self,
        _cluster: &str,
        task_arns: &[String],
    ) -> StampedeResult<Vec<TaskDescriptor>> {
        *self.describe_calls.lock() += 1;

        let mut answers = self.describe_answers.lock();
        let answer = if answers.len() > 1 {
            answers.pop_front()
        } else {
            answers.front().cloned()
        };

        match answer {
            Some(Ok(tasks)) => Ok(tasks),
            Some(Err(e)) => Err(anyhow::anyhow!("{e}")),
            None => {
                let tasks = self.tasks.lock();
                Ok(task_arns
                    .iter()
                    .filter_map(|arn| tasks.get(arn).cloned())
                    .collect())
            }
        }
    }
}

pub fn task(arn: &str, last_status: &str) -> TaskDescriptor {
    TaskDescriptor {
        task_arn: arn.to_string(),
        last_status: last_status.to_string(),
        ..Default::default()
    }
}

pub fn sample_cli_cfg(client_type: ClientType) -> StampedeCli {
    StampedeCli {
        host: "http://localhost:8080".to_string(),
        shapes_bucket: "configs".to_string(),
        shapes_key: "stages.json".to_string(),
        client_type,
        master_host: "127.0.0.1".to_string(),
        master_port: 5557,
        expected_workers: 1,
        output_bucket: None,
        output_key: None,
        percentiles: "50,95".to_string(),
        max_runtime: None,
        master_task: None,
        shape_mode: ShapeMode::Users,
        store_root: ".".to_string(),
        no_progress: true,
    }
}
