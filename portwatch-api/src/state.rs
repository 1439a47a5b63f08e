use crate::{ApiError, DashboardQuery};
use chrono::NaiveDate;
use portwatch_core::{default_window, Dataset, DetectionMethod, Metric, PortwatchConfig};
use std::sync::Arc;
use tracing::debug;

/// Snapshot shared by every request. Never mutated after startup.
#[derive(Clone)]
pub struct AppState {
    pub dataset: Arc<Dataset>,
    pub config: Arc<PortwatchConfig>,
}

/// Filtered dataset with anomaly flags for the requested metric.
#[derive(Debug)]
pub struct Prepared {
    pub dataset: Dataset,
    pub metric: Metric,
}

impl AppState {
    pub fn new(dataset: Dataset, config: PortwatchConfig) -> Self {
        Self {
            dataset: Arc::new(dataset),
            config: Arc::new(config),
        }
    }

    pub fn default_range(&self) -> Option<(NaiveDate, NaiveDate)> {
        default_window(&self.dataset, self.config.analytics.default_window_years)
    }

    /// Applies the port and date selection only.
    pub fn select(&self, query: &DashboardQuery) -> Result<Dataset, ApiError> {
        let filter = query.filter(self.default_range())?;
        Ok(filter.apply(&self.dataset))
    }

    /// Filter, then anomaly detection with the query's settings falling back
    /// to the configured defaults.
    pub fn prepare(&self, query: &DashboardQuery) -> Result<Prepared, ApiError> {
        let analytics = &self.config.analytics;

        let metric = query
            .metric
            .as_deref()
            .map(str::parse::<Metric>)
            .transpose()?
            .unwrap_or_default();
        let method = query
            .method
            .as_deref()
            .map(str::parse::<DetectionMethod>)
            .transpose()?
            .unwrap_or(analytics.anomaly_method);
        let threshold = query.threshold.unwrap_or(analytics.anomaly_threshold);
        let group_by_entity = query.group_by_entity.unwrap_or(analytics.group_by_entity);

        let selected = self.select(query)?;
        debug!(
            rows = selected.len(),
            %metric,
            %method,
            threshold,
            group_by_entity,
            "Preparing dashboard data"
        );

        Ok(Prepared {
            dataset: portwatch_anomaly::detect(&selected, metric, method, threshold, group_by_entity),
            metric,
        })
    }
}
