use chrono::NaiveDate;
use portwatch_core::{Dataset, Metric};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Metric totals on a port by date grid. `values[p][d]` belongs to `ports[p]`
/// on `dates[d]`; cells without observations are zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Heatmap {
    pub metric: Metric,
    pub ports: Vec<String>,
    pub dates: Vec<NaiveDate>,
    pub values: Vec<Vec<f64>>,
}

pub fn port_date_heatmap(dataset: &Dataset, metric: Metric) -> Heatmap {
    let dates: Vec<NaiveDate> = dataset
        .iter()
        .map(|o| o.date)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    let columns: BTreeMap<NaiveDate, usize> =
        dates.iter().enumerate().map(|(i, d)| (*d, i)).collect();

    let mut rows: BTreeMap<&str, Vec<f64>> = BTreeMap::new();
    for observation in dataset {
        let row = rows
            .entry(observation.port.as_str())
            .or_insert_with(|| vec![0.0; dates.len()]);
        let value = metric.value(observation);
        if value.is_finite() {
            if let Some(&col) = columns.get(&observation.date) {
                row[col] += value;
            }
        }
    }

    let (ports, values): (Vec<String>, Vec<Vec<f64>>) = rows
        .into_iter()
        .map(|(port, row)| (port.to_string(), row))
        .unzip();

    Heatmap {
        metric,
        ports,
        dates,
        values,
    }
}
