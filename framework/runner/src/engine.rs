use std::fmt::Debug;

/// Live statistics read from the engine on each history sample.
///
/// Every value is optional because an engine may not have produced a figure yet. Missing values are
/// recorded as zero.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct EngineStatistics {
    pub requests_per_second: Option<f64>,
    pub failures_per_second: Option<f64>,
    pub active_users: Option<u64>,
}

/// Totals for the whole run, read once when the report is built.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct EngineTotals {
    pub min_response_time: Option<f64>,
    pub max_response_time: Option<f64>,
    pub num_requests: u64,
}

/// The load-generation engine that the runner drives.
///
/// The engine issues the actual requests and computes statistics. The runner only tells it how many
/// users to run and when to stop, and reads numbers back out. Methods are synchronous because they
/// are expected to act on in-process engine state, and they must not block.
pub trait LoadEngine: Debug + Send + Sync + 'static {
    /// Ask the engine to move towards `users` active users, spawning at `spawn_rate` users per second.
    fn set_target(&self, users: u64, spawn_rate: f64);

    /// Stop generating load. On a master this also tells the connected workers to quit.
    fn stop(&self);

    /// The number of active users, or `None` if the engine is not yet able to report it.
    fn user_count(&self) -> Option<u64>;

    fn current_statistics(&self) -> EngineStatistics;

    /// The current response time at `quantile` (for example `0.95`), in milliseconds.
    fn current_response_time_percentile(&self, quantile: f64) -> Option<f64>;

    /// Whether the engine is still caching response times. Engines drop the cache on shutdown, at
    /// which point there is nothing left to sample.
    fn response_times_cached(&self) -> bool;

    fn is_stopped(&self) -> bool;

    /// Number of workers connected and ready. Only meaningful on a master.
    fn ready_worker_count(&self) -> usize;

    fn totals(&self) -> EngineTotals;
}
