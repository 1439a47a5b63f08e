//! Daily forecasting of a metric with a seasonal-trend model. Too little
//! history or a failed fit is reported as an outcome, never as an error.

pub mod model;

pub use model::{fit_series, DailySeries, FitError, ModelConfig, SeriesForecast};

use augurs::Forecast;
use chrono::{Days, NaiveDate};
use portwatch_core::stats::population_std;
use portwatch_core::{Dataset, Metric};
use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, Normal};
use tracing::{info, warn};

/// Smallest number of usable points a fit is attempted on.
pub const MIN_POINTS: usize = 10;

pub const DEFAULT_HORIZON: usize = 30;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastPoint {
    pub date: NaiveDate,
    pub yhat: f64,
    pub yhat_lower: f64,
    pub yhat_upper: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastResult {
    pub metric: Metric,
    pub history_end: NaiveDate,
    pub horizon: usize,
    pub interval_width: f64,
    /// Seasonal periods in days the model decomposed, empty for a plain trend.
    pub seasonal_periods: Vec<usize>,
    /// One point per distinct historical date followed by `horizon` future
    /// days, in date order.
    pub points: Vec<ForecastPoint>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ForecastOutcome {
    Forecast(ForecastResult),
    InsufficientData { points: usize, required: usize },
    FitFailed { reason: String },
}

impl ForecastOutcome {
    pub fn is_forecast(&self) -> bool {
        matches!(self, Self::Forecast(_))
    }

    /// Forecast points, empty for every other outcome.
    pub fn points(&self) -> &[ForecastPoint] {
        match self {
            Self::Forecast(result) => &result.points,
            _ => &[],
        }
    }
}

pub fn forecast(dataset: &Dataset, metric: Metric, horizon: usize) -> ForecastOutcome {
    forecast_with(dataset, metric, horizon, &ModelConfig::default())
}

pub fn forecast_with(
    dataset: &Dataset,
    metric: Metric,
    horizon: usize,
    config: &ModelConfig,
) -> ForecastOutcome {
    let history: Vec<(NaiveDate, f64)> = dataset
        .iter()
        .map(|o| (o.date, metric.value(o)))
        .filter(|(_, value)| value.is_finite())
        .collect();

    if history.len() < MIN_POINTS {
        info!(
            points = history.len(),
            required = MIN_POINTS,
            %metric,
            "Not enough history to forecast"
        );
        return ForecastOutcome::InsufficientData {
            points: history.len(),
            required: MIN_POINTS,
        };
    }

    match fit_and_predict(&history, metric, horizon, config) {
        Ok(result) => {
            info!(
                %metric,
                history = history.len(),
                horizon,
                points = result.points.len(),
                seasonal_periods = ?result.seasonal_periods,
                "Forecast complete"
            );
            ForecastOutcome::Forecast(result)
        }
        Err(e) => {
            warn!(%metric, error = %e, "Forecast fit failed");
            ForecastOutcome::FitFailed {
                reason: e.to_string(),
            }
        }
    }
}

fn fit_and_predict(
    history: &[(NaiveDate, f64)],
    metric: Metric,
    horizon: usize,
    config: &ModelConfig,
) -> Result<ForecastResult, FitError> {
    let series = DailySeries::from_points(history)?;
    let fitted = fit_series(&series, horizon, config)?;

    // Spread of the in-sample residuals, used where the model gives no intervals.
    let residuals: Vec<f64> = series
        .observed()
        .map(|(i, _)| series.values()[i] - fitted.in_sample.point[i])
        .collect();
    let sigma = population_std(&residuals).unwrap_or(0.0);
    let z = interval_z(config.interval_width)?;

    let mut points: Vec<ForecastPoint> = series
        .observed()
        .map(|(i, date)| point_at(&fitted.in_sample, i, date, z * sigma))
        .collect();

    let history_end = series.end();
    for step in 1..=horizon {
        let date = history_end
            .checked_add_days(Days::new(step as u64))
            .ok_or_else(|| FitError::InvalidConfig(format!("horizon {} overflows", horizon)))?;
        // Uncertainty grows with the square root of the steps ahead.
        let spread = z * sigma * (step as f64).sqrt();
        points.push(point_at(&fitted.future, step - 1, date, spread));
    }

    if points
        .iter()
        .any(|p| !(p.yhat.is_finite() && p.yhat_lower.is_finite() && p.yhat_upper.is_finite()))
    {
        return Err(FitError::NonFinite);
    }

    Ok(ForecastResult {
        metric,
        history_end,
        horizon,
        interval_width: config.interval_width,
        seasonal_periods: fitted.periods,
        points,
    })
}

fn point_at(forecast: &Forecast, i: usize, date: NaiveDate, fallback_spread: f64) -> ForecastPoint {
    let yhat = forecast.point[i];
    let (yhat_lower, yhat_upper) = match &forecast.intervals {
        Some(intervals) => (intervals.lower[i], intervals.upper[i]),
        None => (yhat - fallback_spread, yhat + fallback_spread),
    };
    ForecastPoint {
        date,
        yhat,
        yhat_lower,
        yhat_upper,
    }
}

/// Two-sided standard normal quantile for an interval of the given width.
fn interval_z(width: f64) -> Result<f64, FitError> {
    let normal = Normal::new(0.0, 1.0).map_err(|e| FitError::InvalidConfig(e.to_string()))?;
    Ok(normal.inverse_cdf((1.0 + width) / 2.0))
}
