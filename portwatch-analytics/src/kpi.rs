use chrono::{Days, NaiveDate};
use portwatch_core::stats::{mean, population_std};
use portwatch_core::{Dataset, Metric};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendDirection {
    Up,
    Down,
    Sideways,
}

impl TrendDirection {
    pub fn from_change(change_pct: Option<f64>) -> Self {
        match change_pct {
            Some(change) if change > 0.0 => TrendDirection::Up,
            Some(change) if change < 0.0 => TrendDirection::Down,
            _ => TrendDirection::Sideways,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KpiSummary {
    pub metric: Metric,
    pub earliest_date: NaiveDate,
    pub latest_date: NaiveDate,
    pub total: f64,
    pub mean: f64,
    pub std_dev: f64,
    pub min: f64,
    pub max: f64,
    pub anomalies: usize,
    /// Mean of the last seven days against the seven before, in percent.
    pub week_over_week_pct: Option<f64>,
    pub trend: TrendDirection,
}

/// Headline figures for `metric`, `None` for an empty dataset or one with no
/// finite metric values.
pub fn kpi_summary(dataset: &Dataset, metric: Metric) -> Option<KpiSummary> {
    let (earliest_date, latest_date) = dataset.date_range()?;

    let values: Vec<f64> = dataset
        .iter()
        .map(|o| metric.value(o))
        .filter(|v| v.is_finite())
        .collect();
    let mean_value = mean(&values)?;
    let std_dev = population_std(&values)?;

    let week_over_week_pct = week_over_week(dataset, metric, latest_date);

    Some(KpiSummary {
        metric,
        earliest_date,
        latest_date,
        total: values.iter().sum(),
        mean: mean_value,
        std_dev,
        min: values.iter().copied().fold(f64::INFINITY, f64::min),
        max: values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        anomalies: dataset.iter().filter(|o| o.is_anomaly()).count(),
        week_over_week_pct,
        trend: TrendDirection::from_change(week_over_week_pct),
    })
}

fn week_over_week(dataset: &Dataset, metric: Metric, latest: NaiveDate) -> Option<f64> {
    let current_start = latest.checked_sub_days(Days::new(6))?;
    let previous_start = latest.checked_sub_days(Days::new(13))?;

    let window_mean = |from: NaiveDate, until: NaiveDate| {
        let values: Vec<f64> = dataset
            .iter()
            .filter(|o| o.date >= from && o.date < until)
            .map(|o| metric.value(o))
            .filter(|v| v.is_finite())
            .collect();
        mean(&values).unwrap_or(0.0)
    };

    let current = window_mean(current_start, NaiveDate::MAX);
    let previous = window_mean(previous_start, current_start);

    (previous > 0.0).then(|| (current - previous) / previous * 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use portwatch_core::Observation;

    fn two_weeks(first: f64, second: f64) -> Dataset {
        let start = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
        (0..14u64)
            .map(|i| {
                let value = if i < 7 { first } else { second };
                Observation::new("Busan", start + Days::new(i), value)
            })
            .collect()
    }

    #[test]
    fn test_kpi_summary_statistics() {
        let summary = kpi_summary(&two_weeks(10.0, 20.0), Metric::Traffic).unwrap();
        assert_eq!(summary.total, 210.0);
        assert!((summary.mean - 15.0).abs() < 1e-9);
        assert!((summary.std_dev - 5.0).abs() < 1e-9);
        assert_eq!((summary.min, summary.max), (10.0, 20.0));
        assert_eq!(summary.anomalies, 0);
        assert_eq!(summary.earliest_date, NaiveDate::from_ymd_opt(2024, 6, 1).unwrap());
        assert_eq!(summary.latest_date, NaiveDate::from_ymd_opt(2024, 6, 14).unwrap());
    }

    #[test]
    fn test_week_over_week_trend() {
        let up = kpi_summary(&two_weeks(10.0, 20.0), Metric::Traffic).unwrap();
        assert!((up.week_over_week_pct.unwrap() - 100.0).abs() < 1e-9);
        assert_eq!(up.trend, TrendDirection::Up);

        let down = kpi_summary(&two_weeks(20.0, 15.0), Metric::Traffic).unwrap();
        assert!((down.week_over_week_pct.unwrap() + 25.0).abs() < 1e-9);
        assert_eq!(down.trend, TrendDirection::Down);
    }

    #[test]
    fn test_no_previous_week_has_no_change() {
        let summary = kpi_summary(&two_weeks(0.0, 5.0), Metric::Traffic).unwrap();
        assert_eq!(summary.week_over_week_pct, None);
        assert_eq!(summary.trend, TrendDirection::Sideways);
    }

    #[test]
    fn test_anomalies_counted() {
        let mut rows = two_weeks(1.0, 1.0).into_observations();
        rows[3].anomaly = Some(true);
        rows[4].anomaly = Some(false);
        let summary = kpi_summary(&Dataset::new(rows), Metric::Traffic).unwrap();
        assert_eq!(summary.anomalies, 1);
    }

    #[test]
    fn test_empty_dataset_has_no_summary() {
        assert!(kpi_summary(&Dataset::default(), Metric::Traffic).is_none());
    }
}
