pub mod filter;
pub mod model;
pub mod stats;
pub mod table;

pub use filter::{default_window, DatasetFilter};
pub use model::{Dataset, DetectionMethod, Metric, Observation};
pub use stats::{RollingWindow, ROLLING_WINDOW};
pub use table::{parse_date, RawTable};

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// IMF PortWatch daily port activity, served as CSV by the ArcGIS open data hub.
pub const DEFAULT_SOURCE_URL: &str = "https://hub.arcgis.com/api/v3/datasets/\
959214444157458aad969389b3ebe1a0_0/downloads/data\
?format=csv&spatialRefId=4326&where=1%3D1";

pub const DEFAULT_CACHE_PATH: &str = "data/raw/port_traffic_csv_cache.csv";

/// Six hours.
pub const DEFAULT_CACHE_TTL_SECS: u64 = 6 * 3600;

pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 60;

pub const DEFAULT_SAMPLE_SEED: u64 = 42;

#[derive(Debug, Error)]
pub enum PortwatchError {
    #[error("Missing required columns: {}", .missing.join(", "))]
    Schema { missing: Vec<String> },

    #[error("Invalid metric: {0}")]
    InvalidMetric(String),

    #[error("Unsupported anomaly detection method: {0} (use 'zscore' or 'rolling')")]
    InvalidMethod(String),

    #[error("Fetch error: {0}")]
    Fetch(String),

    #[error("No valid data available from remote source or cache")]
    NoDataAvailable,

    #[error("Cache error: {0}")]
    Cache(String),

    #[error("CSV error: {0}")]
    Csv(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Other error: {0}")]
    Other(String),
}

impl PortwatchError {
    pub fn schema<I, S>(missing: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Schema {
            missing: missing.into_iter().map(Into::into).collect(),
        }
    }

    /// Errors caused by caller input rather than by the environment.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::Schema { .. } | Self::InvalidMetric(_) | Self::InvalidMethod(_)
        )
    }
}

impl From<csv::Error> for PortwatchError {
    fn from(err: csv::Error) -> Self {
        Self::Csv(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, PortwatchError>;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PortwatchConfig {
    pub source: SourceConfig,
    pub cache: CacheConfig,
    pub sampling: SamplingConfig,
    pub analytics: AnalyticsConfig,
    pub api: ApiConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub url: String,
    pub timeout_secs: u64,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_SOURCE_URL.to_string(),
            timeout_secs: DEFAULT_FETCH_TIMEOUT_SECS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    pub path: PathBuf,
    pub ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: PathBuf::from(DEFAULT_CACHE_PATH),
            ttl_secs: DEFAULT_CACHE_TTL_SECS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplingConfig {
    pub fraction: Option<f64>,
    pub seed: u64,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            fraction: None,
            seed: DEFAULT_SAMPLE_SEED,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyticsConfig {
    pub anomaly_method: DetectionMethod,
    pub anomaly_threshold: f64,
    pub group_by_entity: bool,
    pub forecast_horizon: usize,
    /// Largest horizon a forecast request may ask for.
    pub max_forecast_horizon: usize,
    pub top_n: usize,
    pub default_window_years: u32,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            anomaly_method: DetectionMethod::ZScore,
            anomaly_threshold: 2.5,
            group_by_entity: false,
            forecast_horizon: 30,
            max_forecast_horizon: 365,
            top_n: 5,
            default_window_years: 2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8050,
        }
    }
}
