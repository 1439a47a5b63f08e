//! Seasonal-trend forecasting of a regular daily series.
//!
//! With at least two weekly cycles the series is decomposed by MSTL into a
//! trend, a weekly component (and a yearly one once two years exist) and a
//! remainder; AutoETS models the deseasonalised trend. Shorter series go
//! straight to a non-seasonal AutoETS.

use augurs::{
    ets::AutoETS,
    forecaster::{transforms::LinearInterpolator, Forecaster},
    mstl::MSTLModel,
    Forecast,
};
use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::debug;

pub const WEEKLY_PERIOD: usize = 7;
pub const YEARLY_PERIOD: usize = 365;

#[derive(Debug, Error, PartialEq)]
pub enum FitError {
    #[error("history spans a single timestamp")]
    DegenerateHistory,

    #[error("model error: {0}")]
    Model(String),

    #[error("forecast values are not finite")]
    NonFinite,

    #[error("invalid model configuration: {0}")]
    InvalidConfig(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Seasonal periods in days, each used once the history covers two cycles.
    pub seasonal_periods: Vec<usize>,
    pub interval_width: f64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            seasonal_periods: vec![WEEKLY_PERIOD, YEARLY_PERIOD],
            interval_width: 0.8,
        }
    }
}

impl ModelConfig {
    pub fn validate(&self) -> Result<(), FitError> {
        if !(self.interval_width > 0.0 && self.interval_width < 1.0) {
            return Err(FitError::InvalidConfig(
                "interval_width must be in (0, 1)".to_string(),
            ));
        }
        if self.seasonal_periods.iter().any(|&p| p < 2) {
            return Err(FitError::InvalidConfig(
                "seasonal periods must be at least 2 days".to_string(),
            ));
        }
        Ok(())
    }

    /// Periods that fit at least twice into a series of `len` days.
    pub fn usable_periods(&self, len: usize) -> Vec<usize> {
        let mut periods: Vec<usize> = self
            .seasonal_periods
            .iter()
            .copied()
            .filter(|&p| len >= 2 * p)
            .collect();
        periods.sort_unstable();
        periods.dedup();
        periods
    }
}

/// One value per calendar day from the first to the last observed date.
/// Several observations on a date are averaged; days without any are NaN.
#[derive(Debug, Clone, PartialEq)]
pub struct DailySeries {
    start: NaiveDate,
    values: Vec<f64>,
}

impl DailySeries {
    pub fn from_points(points: &[(NaiveDate, f64)]) -> Result<Self, FitError> {
        let mut by_date: BTreeMap<NaiveDate, (f64, usize)> = BTreeMap::new();
        for &(date, value) in points.iter().filter(|(_, v)| v.is_finite()) {
            let entry = by_date.entry(date).or_insert((0.0, 0));
            entry.0 += value;
            entry.1 += 1;
        }

        let (Some((&start, _)), Some((&end, _))) =
            (by_date.first_key_value(), by_date.last_key_value())
        else {
            return Err(FitError::DegenerateHistory);
        };
        if start == end {
            return Err(FitError::DegenerateHistory);
        }

        let len = usize::try_from((end - start).num_days())
            .map_err(|e| FitError::InvalidConfig(e.to_string()))?
            + 1;
        let mut values = vec![f64::NAN; len];
        for (date, (sum, count)) in by_date {
            // Dates are within [start, end], so the offset is in range.
            let offset = (date - start).num_days() as usize;
            values[offset] = sum / count as f64;
        }

        Ok(Self { start, values })
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.date_at(self.values.len() - 1)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Positions of days that carried at least one observation.
    pub fn observed(&self) -> impl Iterator<Item = (usize, NaiveDate)> + '_ {
        self.values
            .iter()
            .enumerate()
            .filter(|(_, v)| v.is_finite())
            .map(|(i, _)| (i, self.date_at(i)))
    }

    fn date_at(&self, offset: usize) -> NaiveDate {
        self.start + Days::new(offset as u64)
    }
}

/// In-sample fit and out-of-sample forecast for one series.
#[derive(Debug, Clone)]
pub struct SeriesForecast {
    pub in_sample: Forecast,
    pub future: Forecast,
    pub periods: Vec<usize>,
}

pub fn fit_series(
    series: &DailySeries,
    horizon: usize,
    config: &ModelConfig,
) -> Result<SeriesForecast, FitError> {
    config.validate()?;

    let periods = config.usable_periods(series.len());
    let level = config.interval_width;

    let (in_sample, future) = if periods.is_empty() {
        forecast_with_ets(series.values(), horizon, level)?
    } else {
        forecast_with_mstl(series.values(), periods.clone(), horizon, level)?
    };

    if in_sample.point.len() != series.len() || future.point.len() != horizon {
        return Err(FitError::Model(format!(
            "expected {} fitted and {} forecast values, got {} and {}",
            series.len(),
            horizon,
            in_sample.point.len(),
            future.point.len()
        )));
    }

    debug!(
        days = series.len(),
        ?periods,
        horizon,
        "Seasonal-trend model fitted"
    );

    Ok(SeriesForecast {
        in_sample,
        future,
        periods,
    })
}

fn forecast_with_mstl(
    values: &[f64],
    periods: Vec<usize>,
    horizon: usize,
    level: f64,
) -> Result<(Forecast, Forecast), FitError> {
    let trend = AutoETS::non_seasonal().into_trend_model();
    let mstl = MSTLModel::new(periods, trend);

    let transformers: Vec<Box<dyn augurs::forecaster::Transformer>> =
        vec![Box::new(LinearInterpolator::default())];
    let mut forecaster = Forecaster::new(mstl).with_transformers(transformers);

    forecaster
        .fit(values)
        .map_err(|e| FitError::Model(format!("MSTL fit: {e}")))?;
    let in_sample = forecaster
        .predict_in_sample(level)
        .map_err(|e| FitError::Model(format!("MSTL in-sample: {e}")))?;
    let future = forecaster
        .predict(horizon, level)
        .map_err(|e| FitError::Model(format!("MSTL predict: {e}")))?;

    Ok((in_sample, future))
}

fn forecast_with_ets(
    values: &[f64],
    horizon: usize,
    level: f64,
) -> Result<(Forecast, Forecast), FitError> {
    let ets = AutoETS::non_seasonal();

    let transformers: Vec<Box<dyn augurs::forecaster::Transformer>> =
        vec![Box::new(LinearInterpolator::default())];
    let mut forecaster = Forecaster::new(ets).with_transformers(transformers);

    forecaster
        .fit(values)
        .map_err(|e| FitError::Model(format!("ETS fit: {e}")))?;
    let in_sample = forecaster
        .predict_in_sample(level)
        .map_err(|e| FitError::Model(format!("ETS in-sample: {e}")))?;
    let future = forecaster
        .predict(horizon, level)
        .map_err(|e| FitError::Model(format!("ETS predict: {e}")))?;

    Ok((in_sample, future))
}
