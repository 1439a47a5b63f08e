use indexmap::IndexMap;
use portwatch_core::{Dataset, Metric, Observation};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

pub const DEFAULT_TOP_PORTS: usize = 5;
pub const DEFAULT_TOP_COUNTRIES: usize = 10;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityTotal {
    pub name: String,
    pub total: f64,
}

/// Ports ranked by the summed metric. Ties keep first-appearance order.
pub fn top_entities(dataset: &Dataset, metric: Metric, n: usize) -> Vec<EntityTotal> {
    ranked(dataset, metric, n, |o| Some(o.port.as_str()))
}

/// Countries ranked by the summed metric; rows without a country are skipped.
pub fn top_countries(dataset: &Dataset, metric: Metric, n: usize) -> Vec<EntityTotal> {
    ranked(dataset, metric, n, |o| o.country.as_deref())
}

fn ranked<'a, F>(dataset: &'a Dataset, metric: Metric, n: usize, key: F) -> Vec<EntityTotal>
where
    F: Fn(&'a Observation) -> Option<&'a str>,
{
    let mut totals: IndexMap<&str, f64> = IndexMap::new();
    for observation in dataset {
        if let Some(name) = key(observation) {
            let value = metric.value(observation);
            let total = totals.entry(name).or_insert(0.0);
            if value.is_finite() {
                *total += value;
            }
        }
    }

    let mut ranking: Vec<EntityTotal> = totals
        .into_iter()
        .map(|(name, total)| EntityTotal {
            name: name.to_string(),
            total,
        })
        .collect();
    ranking.sort_by(|a, b| b.total.partial_cmp(&a.total).unwrap_or(Ordering::Equal));
    ranking.truncate(n);
    ranking
}
