//! Anomaly detection over a metric column, either across the whole dataset
//! or independently per port.

pub mod detector;

pub use detector::{RollingDetector, ZScoreDetector};

use portwatch_core::{Dataset, DetectionMethod, Metric};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

pub const DEFAULT_THRESHOLD: f64 = 2.5;

/// Outcome for one value of a series.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Verdict {
    pub anomaly: bool,
    pub z_score: Option<f64>,
}

impl Verdict {
    pub fn normal() -> Self {
        Self::default()
    }
}

/// Scores a whole series at once; the result has one verdict per value.
pub trait AnomalyDetector: Send + Sync {
    fn method(&self) -> DetectionMethod;

    fn score(&self, values: &[f64]) -> Vec<Verdict>;
}

pub fn detector_for(method: DetectionMethod, threshold: f64) -> Box<dyn AnomalyDetector> {
    match method {
        DetectionMethod::ZScore => Box::new(ZScoreDetector::new(threshold)),
        DetectionMethod::Rolling => Box::new(RollingDetector::new(threshold)),
    }
}

/// Copy of `dataset` with `anomaly` set on every row and, in z-score mode,
/// `z_score` where the deviation is non-zero.
pub fn detect(
    dataset: &Dataset,
    metric: Metric,
    method: DetectionMethod,
    threshold: f64,
    group_by_entity: bool,
) -> Dataset {
    let detector = detector_for(method, threshold);
    detect_with(dataset, metric, detector.as_ref(), group_by_entity)
}

pub fn detect_with(
    dataset: &Dataset,
    metric: Metric,
    detector: &dyn AnomalyDetector,
    group_by_entity: bool,
) -> Dataset {
    let mut observations = dataset.observations().to_vec();

    let groups: Vec<Vec<usize>> = if group_by_entity {
        let mut by_port: HashMap<&str, Vec<usize>> = HashMap::new();
        for (i, observation) in dataset.iter().enumerate() {
            by_port.entry(observation.port.as_str()).or_default().push(i);
        }
        by_port.into_values().collect()
    } else {
        vec![(0..observations.len()).collect()]
    };

    for indices in &groups {
        let values: Vec<f64> = indices
            .iter()
            .map(|&i| metric.value(&observations[i]))
            .collect();

        for (&i, verdict) in indices.iter().zip(detector.score(&values)) {
            observations[i].anomaly = Some(verdict.anomaly);
            observations[i].z_score = verdict.z_score;
        }
    }

    let flagged = observations.iter().filter(|o| o.is_anomaly()).count();
    debug!(
        method = %detector.method(),
        %metric,
        rows = observations.len(),
        groups = groups.len(),
        flagged,
        "Anomaly detection complete"
    );

    Dataset::new(observations)
}
