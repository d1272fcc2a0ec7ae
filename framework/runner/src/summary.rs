use stampede_report_model::{PercentileValues, Report, StatsSnapshot};
use tabled::settings::Style;
use tabled::{Table, Tabled};

#[derive(Tabled)]
pub struct ReportRow {
    #[tabled(rename = "Finished")]
    pub time: String,
    #[tabled(rename = "Requests")]
    pub num_requests: u64,
    #[tabled(rename = "Min (ms)", display = "optional_float2")]
    pub min_response_time: Option<f64>,
    #[tabled(rename = "Max (ms)", display = "optional_float2")]
    pub max_response_time: Option<f64>,
    #[tabled(rename = "Percentiles (ms)")]
    pub percentiles: String,
}

impl From<&Report> for ReportRow {
    fn from(report: &Report) -> Self {
        Self {
            time: report.time.clone(),
            num_requests: report.num_requests,
            min_response_time: report.min_response_time,
            max_response_time: report.max_response_time,
            percentiles: format_percentiles(&report.percentile_values),
        }
    }
}

#[derive(Tabled)]
pub struct SnapshotRow {
    #[tabled(rename = "Time")]
    pub time: String,
    #[tabled(rename = "Users")]
    pub active_users: u64,
    #[tabled(rename = "RPS", display = "float2")]
    pub requests_per_second: f64,
    #[tabled(rename = "Failures/s", display = "float2")]
    pub failures_per_second: f64,
    #[tabled(rename = "Percentiles (ms)")]
    pub percentiles: String,
}

impl From<&StatsSnapshot> for SnapshotRow {
    fn from(snapshot: &StatsSnapshot) -> Self {
        Self {
            time: snapshot.time.clone(),
            active_users: snapshot.active_users,
            requests_per_second: snapshot.requests_per_second,
            failures_per_second: snapshot.failures_per_second,
            percentiles: format_percentiles(&snapshot.percentile_values),
        }
    }
}

fn float2(n: &f64) -> String {
    format!("{:.2}", n)
}

fn optional_float2(n: &Option<f64>) -> String {
    n.as_ref().map(float2).unwrap_or_else(|| "-".to_string())
}

fn format_percentiles(values: &PercentileValues) -> String {
    values
        .iter()
        .map(|(label, value)| format!("p{label}: {value:.2}"))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Render the history of the latest report and every report in the collection.
pub fn render_summary(latest: &Report, reports: &[Report]) -> String {
    let mut out = String::new();

    if !latest.history.is_empty() {
        let rows = latest.history.iter().map(SnapshotRow::from).collect::<Vec<_>>();
        let mut table = Table::new(&rows);
        table.with(Style::modern());
        out.push_str("\nStatistics history\n");
        out.push_str(&table.to_string());
        out.push('\n');
    }

    let rows = reports.iter().map(ReportRow::from).collect::<Vec<_>>();
    let mut table = Table::new(&rows);
    table.with(Style::modern());
    out.push_str("\nRun reports\n");
    out.push_str(&table.to_string());
    out.push('\n');

    out
}

pub fn print_summary(latest: &Report, reports: &[Report]) {
    println!("{}", render_summary(latest, reports));
}
