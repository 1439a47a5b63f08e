use chrono::NaiveDate;
use portwatch_core::{Dataset, Metric};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Data health summary. Metric-dependent fields are `None` when the metric
/// name is not a known metric column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityReport {
    pub total_rows: usize,
    pub missing_metric_pct: Option<f64>,
    pub missing_port_pct: f64,
    pub zero_metric_pct: Option<f64>,
    pub min_date: Option<NaiveDate>,
    pub max_date: Option<NaiveDate>,
    pub ports_count: usize,
}

pub fn quality_report(dataset: &Dataset, metric_name: &str) -> QualityReport {
    let metric = metric_name.parse::<Metric>().ok();
    let total_rows = dataset.len();

    let share = |count: usize| {
        if total_rows == 0 {
            0.0
        } else {
            count as f64 / total_rows as f64 * 100.0
        }
    };

    let missing_metric_pct = metric.map(|m| {
        share(
            dataset
                .iter()
                .filter(|o| !m.value(o).is_finite())
                .count(),
        )
    });
    let zero_metric_pct =
        metric.map(|m| share(dataset.iter().filter(|o| m.value(o) == 0.0).count()));

    let missing_port_pct = share(dataset.iter().filter(|o| o.port.trim().is_empty()).count());
    let ports_count = dataset
        .iter()
        .map(|o| o.port.as_str())
        .filter(|p| !p.trim().is_empty())
        .collect::<HashSet<_>>()
        .len();

    let range = dataset.date_range();

    QualityReport {
        total_rows,
        missing_metric_pct,
        missing_port_pct,
        zero_metric_pct,
        min_date: range.map(|(min, _)| min),
        max_date: range.map(|(_, max)| max),
        ports_count,
    }
}
