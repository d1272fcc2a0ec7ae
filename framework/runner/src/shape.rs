use tokio::time::Instant;

use crate::stages::{Stage, StageSchedule};

/// How the shape controller decides to move on to the next stage.
#[derive(clap::ValueEnum, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ShapeMode {
    /// Hold each stage for its duration once the target user count has been reached.
    ///
    /// If the target is never reached, the stage is never left. Load fidelity wins over the
    /// schedule.
    #[default]
    Users,
    /// Follow the wall clock only. Stage durations are cumulative thresholds from the start of the
    /// run.
    Time,
}

/// What the run should do after a tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ShapeTick {
    Target { users: u64, spawn_rate: f64 },
    /// No stage applies any more. The run should stop.
    Terminal,
}

impl From<&Stage> for ShapeTick {
    fn from(stage: &Stage) -> Self {
        ShapeTick::Target {
            users: stage.target_concurrency,
            spawn_rate: stage.spawn_rate,
        }
    }
}

/// Controller state, owned by a single [StageShapeController].
#[derive(Debug, Clone)]
pub struct RunState {
    pub current_stage_index: usize,
    /// When the current stage's target was first observed and the hold began. Only used in
    /// [ShapeMode::Users].
    pub stage_entered_at: Option<Instant>,
    pub mode: ShapeMode,
    pub run_started_at: Instant,
    /// The user count passed to the most recent tick.
    pub observed_concurrency: Option<u64>,
    finished: bool,
}

impl RunState {
    pub fn is_finished(&self) -> bool {
        self.finished
    }
}

/// Decides, tick by tick, how many users should be active and how fast to spawn them.
///
/// Absence of a next stage is always reported as [ShapeTick::Terminal], never as an error, and once
/// terminal the controller stays terminal.
#[derive(Debug)]
pub struct StageShapeController {
    schedule: StageSchedule,
    state: RunState,
}

impl StageShapeController {
    pub fn new(schedule: StageSchedule, mode: ShapeMode, run_started_at: Instant) -> Self {
        Self {
            schedule,
            state: RunState {
                current_stage_index: 0,
                stage_entered_at: None,
                mode,
                run_started_at,
                observed_concurrency: None,
                finished: false,
            },
        }
    }

    pub fn state(&self) -> &RunState {
        &self.state
    }

    /// Compute the next target.
    ///
    /// `observed` is the live user count from the engine, `None` if the engine has no signal yet.
    pub fn tick(&mut self, observed: Option<u64>, now: Instant) -> ShapeTick {
        if self.state.finished {
            return ShapeTick::Terminal;
        }
        self.state.observed_concurrency = observed;

        let tick = match self.state.mode {
            ShapeMode::Users => self.tick_users(observed, now),
            ShapeMode::Time => self.tick_time(now),
        };

        if tick == ShapeTick::Terminal {
            log::info!(
                "Shape finished after {} of {} stages",
                self.state.current_stage_index.min(self.schedule.len()),
                self.schedule.len()
            );
            self.state.finished = true;
        }

        tick
    }

    fn tick_users(&mut self, observed: Option<u64>, now: Instant) -> ShapeTick {
        let Some(observed) = observed else {
            log::warn!("No live user count available, treating the shape as finished");
            return ShapeTick::Terminal;
        };
        let index = self.state.current_stage_index;
        let Some(stage) = self.schedule.get(index).copied() else {
            return ShapeTick::Terminal;
        };

        if observed != stage.target_concurrency {
            // The hold must be contiguous, so drifting away from the target starts it over.
            if self.state.stage_entered_at.take().is_some() {
                log::debug!(
                    "Stage {index} left its target of {} users ({observed} active), hold reset",
                    stage.target_concurrency
                );
            }
            return (&stage).into();
        }

        let hold_started = *self.state.stage_entered_at.get_or_insert_with(|| {
            log::debug!("Stage {index} reached {observed} users, holding");
            now
        });

        if now.saturating_duration_since(hold_started) < stage.duration() {
            return (&stage).into();
        }

        self.state.current_stage_index += 1;
        self.state.stage_entered_at = None;
        match self.schedule.get(index + 1) {
            Some(next) => {
                log::info!(
                    "Stage {index} held {} users for {}s, moving to stage {} with {} users",
                    stage.target_concurrency,
                    stage.duration_seconds,
                    index + 1,
                    next.target_concurrency
                );
                next.into()
            }
            None => ShapeTick::Terminal,
        }
    }

    fn tick_time(&mut self, now: Instant) -> ShapeTick {
        let elapsed = now.saturating_duration_since(self.state.run_started_at);
        let Some(index) = self
            .schedule
            .iter()
            .position(|stage| elapsed < stage.duration())
        else {
            self.state.current_stage_index = self.schedule.len();
            return ShapeTick::Terminal;
        };

        if index != self.state.current_stage_index {
            log::info!(
                "Moving to stage {index} after {:.1}s",
                elapsed.as_secs_f64()
            );
            self.state.current_stage_index = index;
        }

        self.schedule
            .get(index)
            .map(ShapeTick::from)
            .unwrap_or(ShapeTick::Terminal)
    }
}
