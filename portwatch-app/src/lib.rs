//! Startup pipeline shared by the `portwatch` binary and its integration
//! tests: ingest, engineer features, summarise.

use portwatch_analytics::{
    kpi_summary, quality_report, top_entities, EntityTotal, KpiSummary, QualityReport,
};
use portwatch_core::{default_window, Dataset, DatasetFilter, Metric, PortwatchConfig, Result};
use portwatch_ingest::{DataOrigin, IngestMetadata, IngestionGateway};
use serde::Serialize;
use tracing::{info, warn};

/// Session overrides given on the command line.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub no_cache: bool,
    pub sample_fraction: Option<f64>,
    pub port: Option<u16>,
}

impl Overrides {
    pub fn apply(&self, config: &mut PortwatchConfig) {
        if self.no_cache {
            config.cache.enabled = false;
        }
        if self.sample_fraction.is_some() {
            config.sampling.fraction = self.sample_fraction;
        }
        if let Some(port) = self.port {
            config.api.port = port;
        }
    }
}

#[derive(Debug)]
pub struct LoadedData {
    pub dataset: Dataset,
    pub origin: DataOrigin,
    pub metadata: IngestMetadata,
}

pub async fn load_dataset(
    gateway: &IngestionGateway,
    config: &PortwatchConfig,
) -> Result<LoadedData> {
    let ingested = gateway
        .fetch(config.cache.enabled, config.sampling.fraction)
        .await?;

    info!(
        origin = ?ingested.origin,
        records = ingested.metadata.record_count,
        last_updated = ?ingested.metadata.last_updated,
        "Raw data ingested"
    );

    let dataset = portwatch_features::transform(&ingested.table)?;
    if dataset.is_empty() {
        warn!("No observations survived feature engineering");
    }

    Ok(LoadedData {
        dataset,
        origin: ingested.origin,
        metadata: ingested.metadata,
    })
}

/// What the dashboard shows on first load: the default window, all ports,
/// the default metric and the configured detector.
#[derive(Debug, Clone, Serialize)]
pub struct StartupSummary {
    pub quality: QualityReport,
    pub kpis: Option<KpiSummary>,
    pub top_ports: Vec<EntityTotal>,
}

pub fn startup_summary(dataset: &Dataset, config: &PortwatchConfig) -> StartupSummary {
    let analytics = &config.analytics;
    let metric = Metric::default();

    let (start, end) = default_window(dataset, analytics.default_window_years)
        .map_or((None, None), |(start, end)| (Some(start), Some(end)));
    let window = DatasetFilter::new().with_range(start, end).apply(dataset);

    let flagged = portwatch_anomaly::detect(
        &window,
        metric,
        analytics.anomaly_method,
        analytics.anomaly_threshold,
        analytics.group_by_entity,
    );

    let summary = StartupSummary {
        quality: quality_report(&flagged, metric.column()),
        kpis: kpi_summary(&flagged, metric),
        top_ports: top_entities(&flagged, metric, analytics.top_n),
    };

    info!(
        rows = summary.quality.total_rows,
        ports = summary.quality.ports_count,
        min_date = ?summary.quality.min_date,
        max_date = ?summary.quality.max_date,
        "Data quality"
    );
    match &summary.kpis {
        Some(kpis) => info!(
            total = kpis.total,
            mean = kpis.mean,
            anomalies = kpis.anomalies,
            week_over_week_pct = ?kpis.week_over_week_pct,
            trend = ?kpis.trend,
            "{} KPIs",
            metric.label()
        ),
        None => warn!("No data available for KPIs"),
    }

    summary
}
