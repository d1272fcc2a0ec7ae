use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::ConfigError;
use crate::shape::ShapeMode;
use crate::store::{ObjectLocation, ObjectStore};

/// One segment of the load schedule.
///
/// Serialized as `{"duration": 30, "users": 100, "spawn_rate": 100}`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Stage {
    /// Seconds. A cumulative threshold in [ShapeMode::Time], a hold time in [ShapeMode::Users].
    #[serde(rename = "duration")]
    pub duration_seconds: f64,
    #[serde(rename = "users")]
    pub target_concurrency: u64,
    /// Users started (or stopped) per second while moving towards the target.
    pub spawn_rate: f64,
}

impl Stage {
    /// Durations too long to represent are treated as forever.
    pub fn duration(&self) -> Duration {
        Duration::try_from_secs_f64(self.duration_seconds).unwrap_or(Duration::MAX)
    }
}

/// The ordered stages of a run, immutable once loaded.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StageSchedule {
    stages: Vec<Stage>,
}

impl StageSchedule {
    /// Build a schedule, rejecting negative or non-finite durations and non-positive spawn rates.
    pub fn new(stages: Vec<Stage>) -> Result<Self, ConfigError> {
        for (index, stage) in stages.iter().enumerate() {
            if !stage.duration_seconds.is_finite() || stage.duration_seconds < 0.0 {
                return Err(ConfigError::InvalidStage {
                    index,
                    reason: format!("duration {} must be zero or more", stage.duration_seconds),
                });
            }
            if !stage.spawn_rate.is_finite() || stage.spawn_rate <= 0.0 {
                return Err(ConfigError::InvalidStage {
                    index,
                    reason: format!("spawn_rate {} must be more than zero", stage.spawn_rate),
                });
            }
        }

        Ok(Self { stages })
    }

    pub fn from_json(body: &[u8]) -> Result<Self, ConfigError> {
        let stages: Vec<Stage> =
            serde_json::from_slice(body).map_err(|e| ConfigError::MalformedSchedule(e.to_string()))?;
        Self::new(stages)
    }

    /// Fetch the schedule from the object store. Any failure is fatal to the run.
    pub async fn load(
        store: &dyn ObjectStore,
        location: &ObjectLocation,
    ) -> Result<Self, ConfigError> {
        let body = store
            .get_object(location)
            .await
            .map_err(|e| ConfigError::ScheduleUnavailable {
                location: location.to_string(),
                reason: format!("{e:#}"),
            })?;
        let schedule = Self::from_json(&body)?;
        log::info!("Loaded {} stages from {location}", schedule.len());

        Ok(schedule)
    }

    pub fn get(&self, index: usize) -> Option<&Stage> {
        self.stages.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Stage> {
        self.stages.iter()
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// How long the schedule is expected to take.
    ///
    /// For [ShapeMode::Time] this is the largest threshold. For [ShapeMode::Users] it is the sum of
    /// hold times, which is only a lower bound because ramping up is not counted.
    pub fn planned_runtime(&self, mode: ShapeMode) -> Duration {
        match mode {
            ShapeMode::Time => self
                .stages
                .iter()
                .map(Stage::duration)
                .max()
                .unwrap_or_default(),
            ShapeMode::Users => self
                .stages
                .iter()
                .map(Stage::duration)
                .fold(Duration::ZERO, Duration::saturating_add),
        }
    }
}
