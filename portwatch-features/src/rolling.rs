use portwatch_core::stats::{mean, population_std, RollingWindow};

/// Limit applied to engineered z-scores.
pub const ZSCORE_CLAMP: f64 = 5.0;

/// Trailing mean over at most `window` values, ending at each position.
pub fn rolling_mean(values: &[f64], window: usize) -> Vec<f64> {
    let mut trailing = RollingWindow::new(window);
    values
        .iter()
        .map(|&value| {
            trailing.push(value);
            trailing.mean().unwrap_or(value)
        })
        .collect()
}

/// Difference from the previous value, `None` for the first.
pub fn first_difference(values: &[f64]) -> Vec<Option<f64>> {
    let mut previous: Option<f64> = None;
    values
        .iter()
        .map(|&value| {
            let delta = previous.map(|prev| value - prev);
            previous = Some(value);
            delta
        })
        .collect()
}

/// Z-scores against the series' own mean and population deviation, clamped
/// to `±clamp`. A flat series has no meaningful score.
pub fn clamped_zscores(values: &[f64], clamp: f64) -> Vec<Option<f64>> {
    let (Some(mu), Some(sigma)) = (mean(values), population_std(values)) else {
        return vec![None; values.len()];
    };
    if sigma == 0.0 || !sigma.is_finite() {
        return vec![None; values.len()];
    }

    values
        .iter()
        .map(|&value| Some(((value - mu) / sigma).clamp(-clamp, clamp)))
        .collect()
}
