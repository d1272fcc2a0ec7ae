use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use serde::Deserialize;
use stampede_core::prelude::DelegatedShutdownListener;
use stampede_report_model::{
    average_percentiles, load_report_entries, store_report_entries, Percentile, PercentileValues,
    Report, StatsSnapshot,
};
use tokio::time::MissedTickBehavior;

use crate::engine::{EngineTotals, LoadEngine};
use crate::store::{ObjectLocation, ObjectStore};
use crate::types::StampedeResult;

/// Local wall clock time in the `HH:MM:SS` format used by reports.
pub fn wall_clock_time() -> String {
    chrono::Local::now().format("%H:%M:%S").to_string()
}

/// An engine figure that is missing or not a finite number is recorded as zero.
fn metric_or_zero(value: Option<f64>) -> f64 {
    value.filter(|v| v.is_finite()).unwrap_or_default()
}

/// Collects statistics snapshots while a run is live and turns them into a [Report].
#[derive(Debug, Clone)]
pub struct ResultAggregator {
    percentiles: Vec<Percentile>,
    history: Vec<StatsSnapshot>,
}

impl ResultAggregator {
    pub fn new(percentiles: Vec<Percentile>) -> Self {
        Self {
            percentiles,
            history: Vec::new(),
        }
    }

    pub fn history(&self) -> &[StatsSnapshot] {
        &self.history
    }

    /// Take one snapshot from the engine.
    ///
    /// Returns `false`, without recording anything, once the engine is stopped or has dropped its
    /// response time cache. Sampling should end at that point.
    pub fn sample(&mut self, engine: &dyn LoadEngine, time: String) -> bool {
        if !engine.response_times_cached() {
            log::debug!("Engine response time cache is gone, sampling finished");
            return false;
        }
        if engine.is_stopped() {
            log::debug!("Engine is stopped, sampling finished");
            return false;
        }

        let statistics = engine.current_statistics();
        let mut percentile_values = PercentileValues::new();
        for percentile in &self.percentiles {
            let value =
                metric_or_zero(engine.current_response_time_percentile(percentile.quantile()));
            percentile_values.insert(percentile, value);
        }

        self.history.push(StatsSnapshot {
            time,
            requests_per_second: metric_or_zero(statistics.requests_per_second),
            failures_per_second: metric_or_zero(statistics.failures_per_second),
            active_users: statistics.active_users.unwrap_or_default(),
            percentile_values,
        });
        true
    }

    /// Sample on `interval` until the engine stops or the run is shutting down.
    pub async fn run_sampling(
        mut self,
        engine: Arc<dyn LoadEngine>,
        interval: Duration,
        mut shutdown_listener: DelegatedShutdownListener,
    ) -> Self {
        let mut interval = tokio::time::interval(interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown_listener.wait_for_shutdown() => break,
                _ = interval.tick() => {}
            }

            if !self.sample(engine.as_ref(), wall_clock_time()) {
                break;
            }
        }

        log::debug!("Recorded {} statistics snapshots", self.history.len());
        self
    }

    /// Build the report for the run from the engine totals and the recorded history.
    pub fn finalize(self, totals: EngineTotals, time: String) -> Report {
        Report {
            time,
            min_response_time: totals.min_response_time.filter(|v| v.is_finite()),
            max_response_time: totals.max_response_time.filter(|v| v.is_finite()),
            num_requests: totals.num_requests,
            percentile_values: average_percentiles(&self.history, &self.percentiles),
            history: self.history,
        }
    }
}

/// Append `report` to the collection stored at `location` and write the collection back.
///
/// Reading is best effort. A missing or unreadable collection, or one that is not a JSON array, is
/// replaced by one holding only the new report. Existing entries that are not valid reports are
/// written back untouched but left out of the returned reports. The write replaces whatever is
/// stored, so two runs publishing at the same time can lose one of the reports.
pub async fn publish_report(
    store: &dyn ObjectStore,
    location: &ObjectLocation,
    report: Report,
) -> StampedeResult<Vec<Report>> {
    let existing = match store.get_object(location).await {
        Ok(body) => load_report_entries(body.as_slice())
            .with_context(|| format!("Malformed report collection at {location}")),
        Err(e) => Err(e),
    };

    let mut entries = existing.unwrap_or_else(|e| {
        log::warn!("Starting a new report collection, could not read existing reports: {e:#}");
        Vec::new()
    });

    let mut reports = entries
        .iter()
        .filter_map(|entry| Report::deserialize(entry).ok())
        .collect::<Vec<_>>();
    if reports.len() < entries.len() {
        log::debug!(
            "Keeping {} entries at {location} that are not reports",
            entries.len() - reports.len()
        );
    }

    entries.push(serde_json::to_value(&report).context("Failed to serialize report")?);
    reports.push(report);

    let mut body = Vec::new();
    store_report_entries(&entries, &mut body).context("Failed to serialize report collection")?;
    store
        .put_object(location, body)
        .await
        .with_context(|| format!("Failed to write report collection to {location}"))?;
    log::info!("Wrote {} reports to {location}", entries.len());

    Ok(reports)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::EngineStatistics;
    use crate::store::InMemoryObjectStore;
    use anyhow::anyhow;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use stampede_report_model::{load_reports, parse_percentiles};

    #[derive(Debug)]
    struct FixedEngine {
        rps: Mutex<Option<f64>>,
        p50: Mutex<Option<f64>>,
        stopped: Mutex<bool>,
        cached: Mutex<bool>,
    }

    impl Default for FixedEngine {
        fn default() -> Self {
            Self {
                rps: Mutex::new(Some(8.0)),
                p50: Mutex::new(None),
                stopped: Mutex::new(false),
                cached: Mutex::new(false),
            }
        }
    }

    /// A store whose reads always fail, as when the service is unavailable.
    #[derive(Debug, Default)]
    struct UnavailableStore {
        written: Mutex<Option<Vec<u8>>>,
    }

    #[async_trait]
    impl ObjectStore for UnavailableStore {
        async fn get_object(&self, location: &ObjectLocation) -> StampedeResult<Vec<u8>> {
            Err(anyhow!("Service unavailable reading {location}"))
        }

        async fn put_object(&self, _location: &ObjectLocation, body: Vec<u8>) -> StampedeResult<()> {
            *self.written.lock() = Some(body);
            Ok(())
        }
    }

    impl LoadEngine for FixedEngine {
        fn set_target(&self, _users: u64, _spawn_rate: f64) {}
        fn stop(&self) {
            *self.stopped.lock() = true;
        }
        fn user_count(&self) -> Option<u64> {
            Some(4)
        }
        fn current_statistics(&self) -> EngineStatistics {
            EngineStatistics {
                requests_per_second: *self.rps.lock(),
                failures_per_second: None,
                active_users: Some(4),
            }
        }
        fn current_response_time_percentile(&self, quantile: f64) -> Option<f64> {
            if quantile == 0.5 {
                *self.p50.lock()
            } else {
                None
            }
        }
        fn response_times_cached(&self) -> bool {
            *self.cached.lock()
        }
        fn is_stopped(&self) -> bool {
            *self.stopped.lock()
        }
        fn ready_worker_count(&self) -> usize {
            0
        }
        fn totals(&self) -> EngineTotals {
            EngineTotals::default()
        }
    }

    fn report(time: &str) -> Report {
        Report {
            time: time.to_string(),
            min_response_time: Some(1.0),
            max_response_time: Some(2.0),
            num_requests: 3,
            history: vec![],
            percentile_values: PercentileValues::new(),
        }
    }

    #[test]
    fn sample_substitutes_zero() {
        let engine = FixedEngine::default();
        *engine.cached.lock() = true;
        let mut aggregator = ResultAggregator::new(parse_percentiles("50,95").unwrap());

        *engine.p50.lock() = Some(10.0);
        assert!(aggregator.sample(&engine, "10:00:00".to_string()));
        *engine.p50.lock() = Some(20.0);
        assert!(aggregator.sample(&engine, "10:00:05".to_string()));

        let first = &aggregator.history()[0];
        assert_eq!(8.0, first.requests_per_second);
        assert_eq!(0.0, first.failures_per_second);
        assert_eq!(Some(0.0), first.percentile_values.get("95"));

        let report = aggregator.finalize(
            EngineTotals {
                min_response_time: Some(4.0),
                max_response_time: Some(90.0),
                num_requests: 17,
            },
            "10:00:10".to_string(),
        );
        assert_eq!(Some(15.0), report.percentile_values.get("50"));
        assert_eq!(Some(0.0), report.percentile_values.get("95"));
        assert_eq!(2, report.history.len());
        assert_eq!(17, report.num_requests);
    }

    #[test]
    fn no_samples_once_engine_is_done() {
        let engine = FixedEngine::default();
        let mut aggregator = ResultAggregator::new(parse_percentiles("50").unwrap());

        // The response time cache is already gone.
        assert!(!aggregator.sample(&engine, "10:00:00".to_string()));

        *engine.cached.lock() = true;
        engine.stop();
        assert!(!aggregator.sample(&engine, "10:00:00".to_string()));
        assert!(aggregator.history().is_empty());

        let report = aggregator.finalize(EngineTotals::default(), "10:00:00".to_string());
        assert!(report.percentile_values.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn sampling_stops_with_engine() {
        let engine = Arc::new(FixedEngine::default());
        *engine.cached.lock() = true;
        let handle = stampede_core::prelude::ShutdownHandle::new();

        let sampling = tokio::spawn(
            ResultAggregator::new(parse_percentiles("50").unwrap()).run_sampling(
                engine.clone(),
                Duration::from_secs(5),
                handle.new_listener(),
            ),
        );

        // Samples at 0s, 5s and 10s, then the engine stops before the 15s sample.
        tokio::time::sleep(Duration::from_secs(12)).await;
        engine.stop();

        let aggregator = sampling.await.unwrap();
        assert_eq!(3, aggregator.history().len());
    }

    #[tokio::test]
    async fn publish_appends_to_existing_collection() {
        let store = InMemoryObjectStore::new();
        let location = ObjectLocation::new("reports", "output.json");

        publish_report(&store, &location, report("10:00:00")).await.unwrap();
        let reports = publish_report(&store, &location, report("11:00:00"))
            .await
            .unwrap();

        assert_eq!(2, reports.len());
        let stored = load_reports(store.get(&location).unwrap().as_slice()).unwrap();
        assert_eq!(reports, stored);
        assert_eq!("11:00:00", stored[1].time);
    }

    #[tokio::test]
    async fn publish_replaces_unreadable_collection() {
        let store = InMemoryObjectStore::new();
        let location = ObjectLocation::new("reports", "output.json");
        store.insert(location.clone(), "[{\"time\": \"09:00:00\"},");

        let reports = publish_report(&store, &location, report("10:00:00"))
            .await
            .unwrap();

        assert_eq!(vec![report("10:00:00")], reports);
        let stored = load_reports(store.get(&location).unwrap().as_slice()).unwrap();
        assert_eq!(reports, stored);
    }

    #[tokio::test]
    async fn non_finite_metrics_keep_collection_readable() {
        let store = InMemoryObjectStore::new();
        let location = ObjectLocation::new("reports", "output.json");
        publish_report(&store, &location, report("09:00:00")).await.unwrap();

        let engine = FixedEngine::default();
        *engine.cached.lock() = true;
        *engine.rps.lock() = Some(f64::NAN);
        *engine.p50.lock() = Some(f64::INFINITY);
        let mut aggregator = ResultAggregator::new(parse_percentiles("50").unwrap());
        assert!(aggregator.sample(&engine, "10:00:00".to_string()));

        let report_with_gaps = aggregator.finalize(
            EngineTotals {
                min_response_time: Some(f64::NAN),
                max_response_time: Some(f64::INFINITY),
                num_requests: 5,
            },
            "10:00:05".to_string(),
        );
        assert_eq!(0.0, report_with_gaps.history[0].requests_per_second);
        assert_eq!(Some(0.0), report_with_gaps.percentile_values.get("50"));
        assert_eq!(None, report_with_gaps.min_response_time);
        assert_eq!(None, report_with_gaps.max_response_time);

        publish_report(&store, &location, report_with_gaps).await.unwrap();
        let reports = publish_report(&store, &location, report("11:00:00"))
            .await
            .unwrap();

        let times = reports.iter().map(|r| r.time.as_str()).collect::<Vec<_>>();
        assert_eq!(vec!["09:00:00", "10:00:05", "11:00:00"], times);
        let stored = load_reports(store.get(&location).unwrap().as_slice()).unwrap();
        assert_eq!(reports, stored);
    }

    #[tokio::test]
    async fn publish_keeps_entries_that_are_not_reports() {
        let store = InMemoryObjectStore::new();
        let location = ObjectLocation::new("reports", "output.json");
        store.insert(
            location.clone(),
            r#"[{"time": "08:00:00", "min_response_time": 1.0, "max_response_time": 2.0, "num_requests": 3, "history": []},
                {"time": "08:30:00", "num_requests": 1}]"#,
        );

        let reports = publish_report(&store, &location, report("11:00:00"))
            .await
            .unwrap();

        let times = reports.iter().map(|r| r.time.as_str()).collect::<Vec<_>>();
        assert_eq!(vec!["08:00:00", "11:00:00"], times);

        let stored = load_report_entries(store.get(&location).unwrap().as_slice()).unwrap();
        assert_eq!(3, stored.len());
        assert_eq!(
            serde_json::json!({"time": "08:30:00", "num_requests": 1}),
            stored[1]
        );
        assert_eq!(Some("11:00:00"), stored[2]["time"].as_str());
    }

    #[tokio::test]
    async fn publish_starts_over_when_store_is_unavailable() {
        let store = UnavailableStore::default();
        let location = ObjectLocation::new("reports", "output.json");

        let reports = publish_report(&store, &location, report("10:00:00"))
            .await
            .unwrap();

        assert_eq!(vec![report("10:00:00")], reports);
        let written = store.written.lock().clone().unwrap();
        assert_eq!(reports, load_reports(written.as_slice()).unwrap());
    }
}
