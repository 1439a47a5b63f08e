//! Small descriptive-statistics helpers shared by the feature engine and the
//! anomaly detector.

use statrs::statistics::Statistics;
use std::collections::VecDeque;

/// Trailing periods used for every rolling statistic.
pub const ROLLING_WINDOW: usize = 7;

pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().mean())
}

/// Standard deviation with divisor `n`.
pub fn population_std(values: &[f64]) -> Option<f64> {
    let m = mean(values)?;
    Some((squared_deviations(values.iter(), m) / values.len() as f64).sqrt())
}

/// Standard deviation with divisor `n - 1`; undefined below two values.
pub fn sample_std(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let m = mean(values)?;
    Some((squared_deviations(values.iter(), m) / (values.len() - 1) as f64).sqrt())
}

// Two passes around the mean, so a constant series has exactly zero spread.
fn squared_deviations<'a, I: Iterator<Item = &'a f64>>(values: I, mean: f64) -> f64 {
    values.map(|v| (v - mean) * (v - mean)).sum()
}

/// Trailing window that starts empty and grows to `max_size`, so the first
/// rows of a series are summarised over however many values exist so far.
#[derive(Debug, Clone)]
pub struct RollingWindow {
    data: VecDeque<f64>,
    max_size: usize,
}

impl RollingWindow {
    pub fn new(max_size: usize) -> Self {
        Self {
            data: VecDeque::with_capacity(max_size),
            max_size: max_size.max(1),
        }
    }

    pub fn push(&mut self, value: f64) {
        if self.data.len() >= self.max_size {
            self.data.pop_front();
        }
        self.data.push_back(value);
    }

    pub fn mean(&self) -> Option<f64> {
        if self.data.is_empty() {
            None
        } else {
            Some(self.data.iter().mean())
        }
    }

    pub fn sample_std(&self) -> Option<f64> {
        let m = self.mean()?;
        if self.data.len() < 2 {
            return None;
        }
        Some((squared_deviations(self.data.iter(), m) / (self.data.len() - 1) as f64).sqrt())
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_population_vs_sample_std() {
        let values = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        assert!((population_std(&values).unwrap() - 2.0).abs() < 1e-12);
        assert!((sample_std(&values).unwrap() - 2.138089935299395).abs() < 1e-12);
        assert_eq!(sample_std(&[1.0]), None);
        assert_eq!(mean(&[]), None);
    }

    #[test]
    fn test_constant_values_have_zero_std() {
        let values = [0.1; 12];
        assert_eq!(population_std(&values), Some(0.0));
    }

    #[test]
    fn test_window_shrinks_at_start_and_evicts() {
        let mut window = RollingWindow::new(3);
        window.push(3.0);
        assert_eq!(window.mean(), Some(3.0));
        assert_eq!(window.sample_std(), None);

        for v in [6.0, 9.0, 12.0] {
            window.push(v);
        }
        assert_eq!(window.len(), 3);
        assert_eq!(window.mean(), Some(9.0));
        assert_eq!(window.sample_std(), Some(3.0));
    }
}
