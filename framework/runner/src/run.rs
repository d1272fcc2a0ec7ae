use std::sync::Arc;

use anyhow::Context;
use stampede_core::prelude::{ShutdownHandle, StopReason};
use stampede_report_model::Report;
use tokio::time::Instant;

use crate::aggregator::{publish_report, wall_clock_time, ResultAggregator};
use crate::config::Role;
use crate::context::RunContext;
use crate::coordinator::RunCoordinator;
use crate::definition::LoadTestDefinitionBuilder;
use crate::executor::{stop_reason_of, Executor};
use crate::monitor::start_monitor;
use crate::progress::start_progress;
use crate::shape::StageShapeController;
use crate::shutdown::start_shutdown_listener;
use crate::stages::StageSchedule;
use crate::summary::print_summary;
use crate::watchdog::{LivenessWatchdog, MasterTaskRef};

/// What a finished run produced.
#[derive(Debug, Clone, PartialEq)]
pub struct RunOutcome {
    /// Why the run ended.
    pub stop_reason: StopReason,
    /// The report for this run. Workers do not produce one, and neither does a run interrupted
    /// before it started.
    pub report: Option<Report>,
    /// The report collection as written to the output location, if one is configured and the
    /// write succeeded.
    pub published: Option<Vec<Report>>,
}

impl RunOutcome {
    fn without_report(stop_reason: StopReason) -> Self {
        Self {
            stop_reason,
            report: None,
            published: None,
        }
    }
}

/// Run one process of a load test, in the role chosen on the command line.
///
/// Returns an error for configuration problems, which are all detected before the run starts.
/// Anything that goes wrong once the run is live is logged and reflected in the report instead.
pub fn run(definition: LoadTestDefinitionBuilder) -> anyhow::Result<RunOutcome> {
    let definition = definition.build()?;

    log::info!(
        "Running load test {} as {} against {}",
        definition.name,
        definition.config.role.name(),
        definition.config.target_host
    );

    let runtime = tokio::runtime::Runtime::new().context("Failed to create Tokio runtime")?;
    let shutdown_handle = ShutdownHandle::new();
    let executor = Executor::new(runtime, shutdown_handle.clone());
    start_shutdown_listener(
        executor.runtime(),
        shutdown_handle.clone(),
        definition.engine.clone(),
    );

    let ctx = RunContext::new(
        definition.config,
        definition.engine,
        definition.store,
        definition.orchestrator,
        shutdown_handle,
    );

    match ctx.config().role.clone() {
        Role::Master { expected_workers } => run_driver(&executor, ctx, Some(expected_workers)),
        Role::Local => run_driver(&executor, ctx, None),
        Role::Worker { master_task } => run_worker(&executor, ctx, master_task),
    }
}

/// Master and local processes own the shape and the report.
fn run_driver(
    executor: &Executor,
    ctx: RunContext,
    expected_workers: Option<usize>,
) -> anyhow::Result<RunOutcome> {
    let config = ctx.config().clone();
    let coordinator = RunCoordinator::new(ctx.clone());

    let schedule = match executor.execute_in_place(async {
        Ok(StageSchedule::load(ctx.store().as_ref(), &config.shapes_location).await?)
    }) {
        Ok(schedule) => schedule,
        Err(e) => return stopped_before_start(e),
    };

    if let Some(expected_workers) = expected_workers {
        log::info!(
            "Master on {} waiting for {expected_workers} workers",
            config.master_address()
        );
        if let Err(e) = executor.execute_in_place(async {
            coordinator.wait_for_workers(expected_workers).await;
            Ok(())
        }) {
            return stopped_before_start(e);
        }
    }

    let mut planned_runtime = schedule.planned_runtime(config.shape_mode);
    if let Some(max_runtime) = config.max_runtime {
        planned_runtime = planned_runtime.min(max_runtime);
    }
    if config.show_progress && !planned_runtime.is_zero() {
        if let Err(e) = start_progress(planned_runtime, ctx.shutdown_handle().new_listener()) {
            log::warn!("Could not start the progress bar: {e:?}");
        }
    }
    if let Err(e) = start_monitor(ctx.shutdown_handle().new_listener()) {
        log::warn!("Could not start the resource monitor: {e:?}");
    }

    executor.run_to_completion(async move {
        let started_at = Instant::now();
        log::info!("Starting run with {} stages", schedule.len());

        let controller = StageShapeController::new(schedule, config.shape_mode, started_at);
        let shape = tokio::spawn({
            let coordinator = coordinator.clone();
            async move { coordinator.drive_shape(controller).await }
        });
        let sampler = tokio::spawn(
            ResultAggregator::new(config.percentiles.clone()).run_sampling(
                ctx.engine().clone(),
                config.timings.stats_interval,
                ctx.shutdown_handle().new_listener(),
            ),
        );

        coordinator.watch_completion(started_at).await;
        shape.await.context("Shape loop failed")?;
        let aggregator = sampler.await.context("Statistics sampler failed")?;

        let stop_reason = ctx
            .shutdown_handle()
            .reason()
            .unwrap_or(StopReason::EngineStopped);
        log::info!(
            "Run finished after {}s: {stop_reason}",
            started_at.elapsed().as_secs()
        );

        let report = aggregator.finalize(ctx.engine().totals(), wall_clock_time());
        log::info!(
            "Report: {} requests, {} snapshots",
            report.num_requests,
            report.history.len()
        );

        let published = match &config.output_location {
            Some(location) => {
                match publish_report(ctx.store().as_ref(), location, report.clone()).await {
                    Ok(reports) => Some(reports),
                    Err(e) => {
                        log::error!("Failed to publish report: {e:?}");
                        None
                    }
                }
            }
            None => None,
        };

        print_summary(
            &report,
            published.as_deref().unwrap_or(std::slice::from_ref(&report)),
        );

        anyhow::Ok(RunOutcome {
            stop_reason,
            report: Some(report),
            published,
        })
    })
}

/// Workers follow the master and only watch for it going away.
fn run_worker(
    executor: &Executor,
    ctx: RunContext,
    master_task: Option<MasterTaskRef>,
) -> anyhow::Result<RunOutcome> {
    log::info!("Worker following master at {}", ctx.config().master_address());
    if let Err(e) = start_monitor(ctx.shutdown_handle().new_listener()) {
        log::warn!("Could not start the resource monitor: {e:?}");
    }

    executor.run_to_completion(async move {
        let started_at = Instant::now();
        let coordinator = RunCoordinator::new(ctx.clone());
        let timings = ctx.config().timings;

        let watchdog = match (master_task, ctx.orchestrator()) {
            (Some(master_task), Some(orchestrator)) => Some(tokio::spawn(
                LivenessWatchdog::new(
                    master_task,
                    Arc::clone(orchestrator),
                    ctx.engine().clone(),
                    ctx.shutdown_handle().clone(),
                )
                .with_max_runtime(ctx.config().max_runtime)
                .with_intervals(timings.watchdog_grace, timings.watchdog_poll)
                .run(ctx.shutdown_handle().new_listener()),
            )),
            _ => {
                log::info!("No master task to watch, relying on the master to stop this worker");
                None
            }
        };

        let stop_reason = coordinator.wait_for_engine_stop(started_at).await;
        if let Some(watchdog) = watchdog {
            let outcome = watchdog.await.context("Watchdog failed")?;
            log::debug!("Watchdog finished: {outcome:?}");
        }

        log::info!(
            "Worker finished after {}s: {stop_reason}",
            started_at.elapsed().as_secs()
        );
        anyhow::Ok(RunOutcome::without_report(stop_reason))
    })
}

fn stopped_before_start(err: anyhow::Error) -> anyhow::Result<RunOutcome> {
    match stop_reason_of(&err) {
        Some(reason) => {
            log::info!("Run stopped before it started: {reason}");
            Ok(RunOutcome::without_report(reason))
        }
        None => Err(err),
    }
}
