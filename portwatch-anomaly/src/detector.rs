use crate::{AnomalyDetector, Verdict};
use portwatch_core::stats::{mean, population_std};
use portwatch_core::{DetectionMethod, RollingWindow, ROLLING_WINDOW};
use tracing::debug;

/// Flags values whose distance from the series mean exceeds `threshold`
/// population standard deviations.
#[derive(Debug, Clone)]
pub struct ZScoreDetector {
    threshold: f64,
}

impl ZScoreDetector {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }
}

impl AnomalyDetector for ZScoreDetector {
    fn method(&self) -> DetectionMethod {
        DetectionMethod::ZScore
    }

    fn score(&self, values: &[f64]) -> Vec<Verdict> {
        let (Some(mu), Some(sigma)) = (mean(values), population_std(values)) else {
            return Vec::new();
        };

        if sigma == 0.0 || !sigma.is_finite() {
            debug!(values = values.len(), "Zero deviation, nothing to flag");
            return vec![Verdict::normal(); values.len()];
        }

        values
            .iter()
            .map(|&value| {
                let z = (value - mu) / sigma;
                Verdict {
                    anomaly: z.abs() > self.threshold,
                    z_score: Some(z),
                }
            })
            .collect()
    }
}

/// Flags values further than `threshold` sample standard deviations from the
/// trailing mean, the current value included in its own window.
#[derive(Debug, Clone)]
pub struct RollingDetector {
    threshold: f64,
    window_size: usize,
}

impl RollingDetector {
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold,
            window_size: ROLLING_WINDOW,
        }
    }

    pub fn with_window(mut self, window_size: usize) -> Self {
        self.window_size = window_size;
        self
    }
}

impl AnomalyDetector for RollingDetector {
    fn method(&self) -> DetectionMethod {
        DetectionMethod::Rolling
    }

    fn score(&self, values: &[f64]) -> Vec<Verdict> {
        let mut window = RollingWindow::new(self.window_size);

        values
            .iter()
            .map(|&value| {
                window.push(value);
                // A single-value window has no deviation and never flags.
                let anomaly = match (window.mean(), window.sample_std()) {
                    (Some(mu), Some(sigma)) => (value - mu).abs() > self.threshold * sigma,
                    _ => false,
                };
                Verdict {
                    anomaly,
                    z_score: None,
                }
            })
            .collect()
    }
}
