use serde::de::Deserializer;
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::io::{Read, Write};
use std::str::FromStr;

/// Prefix for the flattened percentile fields of [StatsSnapshot] and [Report].
pub const PERCENTILE_KEY_PREFIX: &str = "response_time_percentile_";

/// A response time percentile requested on the command line, such as `50`, `95` or `999`.
///
/// The label is kept as written because it names the report fields. The quantile is derived from
/// the digits, so `95` is `0.95` and `999` is `0.999`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Percentile {
    label: String,
}

impl Percentile {
    pub fn label(&self) -> &str {
        &self.label
    }

    /// The quantile in the range `[0, 1)` that this percentile asks the engine for.
    pub fn quantile(&self) -> f64 {
        let digits = self.label.len() as i32;
        // Labels are validated to be ASCII digits on construction.
        let value: f64 = self.label.parse().unwrap_or_default();
        value / 10f64.powi(digits)
    }

    /// The report field name for this percentile.
    pub fn key(&self) -> String {
        format!("{PERCENTILE_KEY_PREFIX}{}", self.label)
    }
}

impl fmt::Display for Percentile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "p{}", self.label)
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid percentile `{0}`, expected digits such as `50` or `999`")]
pub struct InvalidPercentile(pub String);

impl FromStr for Percentile {
    type Err = InvalidPercentile;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let label = s.trim();
        if label.is_empty() || !label.chars().all(|c| c.is_ascii_digit()) {
            return Err(InvalidPercentile(s.to_string()));
        }

        Ok(Self {
            label: label.to_string(),
        })
    }
}

/// Parse a comma separated percentile list such as `50,95,99`.
pub fn parse_percentiles(s: &str) -> Result<Vec<Percentile>, InvalidPercentile> {
    s.split(',').map(Percentile::from_str).collect()
}

/// Response time values keyed by percentile label.
///
/// Serialized flat into the parent object, one `response_time_percentile_<label>` field per entry.
/// Unrelated fields are ignored on the way in so that reports written by other tools still load.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PercentileValues(BTreeMap<String, f64>);

impl PercentileValues {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, percentile: &Percentile, value: f64) {
        self.0.insert(percentile.label().to_string(), value);
    }

    pub fn get(&self, label: &str) -> Option<f64> {
        self.0.get(label).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Iterate `(label, value)` pairs in label order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }
}

impl Serialize for PercentileValues {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (label, value) in &self.0 {
            map.serialize_entry(&format!("{PERCENTILE_KEY_PREFIX}{label}"), value)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for PercentileValues {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let fields = BTreeMap::<String, serde_json::Value>::deserialize(deserializer)?;
        Ok(Self(
            fields
                .into_iter()
                .filter_map(|(key, value)| {
                    let label = key.strip_prefix(PERCENTILE_KEY_PREFIX)?;
                    Some((label.to_string(), value.as_f64()?))
                })
                .collect(),
        ))
    }
}

/// One sample of the live engine statistics, taken on the history interval.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StatsSnapshot {
    /// Wall clock time of the sample, formatted `HH:MM:SS`
    pub time: String,
    #[serde(rename = "current_rps")]
    pub requests_per_second: f64,
    #[serde(rename = "current_fail_per_sec")]
    pub failures_per_second: f64,
    #[serde(rename = "user_count")]
    pub active_users: u64,
    #[serde(flatten)]
    pub percentile_values: PercentileValues,
}

/// Summary of one run, appended to the shared report collection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Report {
    /// Wall clock time the report was produced, formatted `HH:MM:SS`
    pub time: String,
    /// Fastest response in milliseconds, if any request completed
    pub min_response_time: Option<f64>,
    /// Slowest response in milliseconds, if any request completed
    pub max_response_time: Option<f64>,
    pub num_requests: u64,
    pub history: Vec<StatsSnapshot>,
    /// Mean of each percentile across [Report::history].
    ///
    /// Empty, and therefore absent from the JSON, when no samples were recorded.
    #[serde(flatten)]
    pub percentile_values: PercentileValues,
}

/// Average each percentile across the recorded history.
///
/// This is the arithmetic mean of the sampled percentile values, not a percentile recomputed over
/// raw response times. A sample missing a percentile counts as zero. An empty history yields no
/// values at all.
pub fn average_percentiles(history: &[StatsSnapshot], percentiles: &[Percentile]) -> PercentileValues {
    let mut values = PercentileValues::new();
    if history.is_empty() {
        return values;
    }

    for percentile in percentiles {
        let total: f64 = history
            .iter()
            .map(|snapshot| {
                snapshot
                    .percentile_values
                    .get(percentile.label())
                    .unwrap_or_default()
            })
            .sum();
        values.insert(percentile, total / history.len() as f64);
    }

    values
}

/// Load a report collection, a single JSON array of reports.
pub fn load_reports<R: Read>(reader: R) -> anyhow::Result<Vec<Report>> {
    let reader = std::io::BufReader::new(reader);
    let reports: Vec<Report> = serde_json::from_reader(reader)?;
    Ok(reports)
}

/// Load a report collection as raw JSON entries.
///
/// Fails only when the content is not a JSON array. Entries that do not parse as a [Report] are
/// kept as they are.
pub fn load_report_entries<R: Read>(reader: R) -> anyhow::Result<Vec<serde_json::Value>> {
    let reader = std::io::BufReader::new(reader);
    let entries: Vec<serde_json::Value> = serde_json::from_reader(reader)?;
    Ok(entries)
}

/// Serialize report collection entries as a single JSON array.
pub fn store_report_entries<W: Write>(
    entries: &[serde_json::Value],
    writer: &mut W,
) -> anyhow::Result<()> {
    serde_json::to_writer(writer, entries)?;
    Ok(())
}
