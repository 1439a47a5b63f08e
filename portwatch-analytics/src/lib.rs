//! Read-only aggregate queries over a dataset: rankings, data health,
//! headline KPIs and the port by date grid.

pub mod heatmap;
pub mod kpi;
pub mod quality;
pub mod ranking;

pub use heatmap::{port_date_heatmap, Heatmap};
pub use kpi::{kpi_summary, KpiSummary, TrendDirection};
pub use quality::{quality_report, QualityReport};
pub use ranking::{
    top_countries, top_entities, EntityTotal, DEFAULT_TOP_COUNTRIES, DEFAULT_TOP_PORTS,
};
