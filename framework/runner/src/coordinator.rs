use std::time::Duration;

use stampede_core::prelude::StopReason;
use tokio::time::{Instant, MissedTickBehavior};

use crate::context::{elapsed_secs, RunContext};
use crate::shape::{ShapeTick, StageShapeController};

/// Decides when a master or local run is complete.
///
/// The run is complete once active users have been seen above zero and have then dropped back to
/// zero, or once the maximum runtime is spent, whichever comes first.
#[derive(Debug, Clone, Copy)]
pub struct CompletionTracker {
    has_started: bool,
    max_runtime: Option<Duration>,
}

impl CompletionTracker {
    pub fn new(max_runtime: Option<Duration>) -> Self {
        Self {
            has_started: false,
            max_runtime,
        }
    }

    pub fn has_started(&self) -> bool {
        self.has_started
    }

    pub fn observe(&mut self, active_users: u64, elapsed: Duration) -> Option<StopReason> {
        if active_users > 0 {
            self.has_started = true;
        }
        if self.has_started && active_users == 0 {
            return Some(StopReason::RampDownComplete);
        }
        if self.max_runtime.is_some_and(|max| elapsed >= max) {
            return Some(StopReason::MaxRuntimeExceeded);
        }

        None
    }
}

/// Drives one process's part of a run: gates the start on workers, feeds shape targets to the
/// engine and decides when the run is over.
#[derive(Debug, Clone)]
pub struct RunCoordinator {
    ctx: RunContext,
}

impl RunCoordinator {
    pub fn new(ctx: RunContext) -> Self {
        Self { ctx }
    }

    /// Block until at least `expected` workers are ready.
    ///
    /// There is deliberately no timeout. Whoever launched the run is expected to watch for a master
    /// that never starts.
    pub async fn wait_for_workers(&self, expected: usize) {
        let engine = self.ctx.engine();
        let mut last_ready = None;
        loop {
            let ready = engine.ready_worker_count();
            if ready >= expected {
                log::info!("{ready} of {expected} workers ready, starting");
                return;
            }
            if last_ready != Some(ready) {
                log::info!("Waiting for workers, {ready} of {expected} ready");
                last_ready = Some(ready);
            }
            tokio::time::sleep(self.ctx.config().timings.worker_gate_poll).await;
        }
    }

    /// Tick the shape controller and pass each new target on to the engine.
    ///
    /// Returns when the controller is terminal, after stopping the run, or when the run is stopped
    /// by something else.
    pub async fn drive_shape(&self, mut controller: StageShapeController) {
        let engine = self.ctx.engine();
        let mut shutdown_listener = self.ctx.shutdown_handle().new_listener();
        let mut interval = tokio::time::interval(self.ctx.config().timings.shape_tick);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut last_target = None;
        loop {
            tokio::select! {
                reason = shutdown_listener.wait_for_shutdown() => {
                    log::debug!("Shape loop exiting, run is stopping: {reason}");
                    return;
                }
                _ = interval.tick() => {}
            }

            match controller.tick(engine.user_count(), Instant::now()) {
                ShapeTick::Target { users, spawn_rate } => {
                    if last_target != Some((users, spawn_rate)) {
                        log::info!("Targeting {users} users, spawning {spawn_rate}/s");
                        engine.set_target(users, spawn_rate);
                        last_target = Some((users, spawn_rate));
                    }
                }
                ShapeTick::Terminal => {
                    self.ctx.stop(StopReason::StagesExhausted);
                    return;
                }
            }
        }
    }

    /// Poll for completion of a master or local run and stop the engine once it is complete.
    ///
    /// Returns the reason this loop stopped the run, or `None` if it was stopped elsewhere.
    pub async fn watch_completion(&self, started_at: Instant) -> Option<StopReason> {
        let engine = self.ctx.engine();
        let mut shutdown_listener = self.ctx.shutdown_handle().new_listener();
        let mut interval = tokio::time::interval(self.ctx.config().timings.completion_poll);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let deadline = self
            .ctx
            .config()
            .max_runtime
            .and_then(|max| started_at.checked_add(max));

        let mut tracker = CompletionTracker::new(self.ctx.config().max_runtime);
        loop {
            tokio::select! {
                reason = shutdown_listener.wait_for_shutdown() => {
                    log::debug!("Completion watch exiting, run is stopping: {reason}");
                    return None;
                }
                _ = interval.tick() => {}
                _ = sleep_until_deadline(deadline) => {}
            }

            let active_users = engine.user_count().unwrap_or_default();
            if let Some(reason) = tracker.observe(active_users, started_at.elapsed()) {
                log::info!(
                    "Run complete after {}s with {active_users} active users: {reason}",
                    elapsed_secs(started_at)
                );
                return self.ctx.stop(reason).then_some(reason);
            }
        }
    }

    /// Wait for a worker's engine to stop, which happens when the master tells it to quit.
    ///
    /// The maximum runtime is enforced here as well as in the watchdog, so a worker without a
    /// master task to watch still cannot run forever.
    pub async fn wait_for_engine_stop(&self, started_at: Instant) -> StopReason {
        let engine = self.ctx.engine();
        let mut shutdown_listener = self.ctx.shutdown_handle().new_listener();
        let mut interval = tokio::time::interval(self.ctx.config().timings.completion_poll);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let deadline = self
            .ctx
            .config()
            .max_runtime
            .and_then(|max| started_at.checked_add(max));

        loop {
            tokio::select! {
                reason = shutdown_listener.wait_for_shutdown() => return reason,
                _ = interval.tick() => {}
                _ = sleep_until_deadline(deadline) => {}
            }

            if engine.is_stopped() {
                log::info!("Engine stopped after {}s", elapsed_secs(started_at));
                self.ctx.shutdown_handle().shutdown(StopReason::EngineStopped);
                return self
                    .ctx
                    .shutdown_handle()
                    .reason()
                    .unwrap_or(StopReason::EngineStopped);
            }
            if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
                self.ctx.stop(StopReason::MaxRuntimeExceeded);
                return self
                    .ctx
                    .shutdown_handle()
                    .reason()
                    .unwrap_or(StopReason::MaxRuntimeExceeded);
            }
        }
    }
}

async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
