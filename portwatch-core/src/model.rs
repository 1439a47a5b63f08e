use crate::{PortwatchError, Result};
use chrono::{Datelike, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::io::Write;
use std::str::FromStr;

/// One row per (port, date) after feature engineering.
///
/// Field names serialize to the upper-case column names the dashboard tables use.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct Observation {
    pub date: NaiveDate,
    pub port: String,
    pub port_id: Option<String>,
    pub country: Option<String>,
    pub traffic: f64,
    pub total_import: f64,
    pub total_export: f64,
    pub total_trade_volume: f64,
    pub year: i32,
    pub month: u32,
    pub week: u32,
    pub day_of_week: String,
    pub rolling_avg_traffic: f64,
    pub traffic_delta: Option<f64>,
    pub traffic_zscore: Option<f64>,
    pub anomaly: Option<bool>,
    pub z_score: Option<f64>,
}

impl Observation {
    /// Observation with calendar fields filled in, zero trade volumes and no
    /// engineered statistics.
    pub fn new(port: impl Into<String>, date: NaiveDate, traffic: f64) -> Self {
        Self {
            date,
            port: port.into(),
            port_id: None,
            country: None,
            traffic,
            total_import: 0.0,
            total_export: 0.0,
            total_trade_volume: 0.0,
            year: date.year(),
            month: date.month(),
            week: date.iso_week().week(),
            day_of_week: weekday_name(date.weekday()).to_string(),
            rolling_avg_traffic: traffic,
            traffic_delta: None,
            traffic_zscore: None,
            anomaly: None,
            z_score: None,
        }
    }

    pub fn with_trade(mut self, total_import: f64, total_export: f64) -> Self {
        self.total_import = total_import;
        self.total_export = total_export;
        self.total_trade_volume = total_import + total_export;
        self
    }

    pub fn with_country(mut self, country: impl Into<String>) -> Self {
        self.country = Some(country.into());
        self
    }

    pub fn with_port_id(mut self, port_id: impl Into<String>) -> Self {
        self.port_id = Some(port_id.into());
        self
    }

    pub fn is_anomaly(&self) -> bool {
        self.anomaly.unwrap_or(false)
    }
}

pub fn weekday_name(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "Monday",
        Weekday::Tue => "Tuesday",
        Weekday::Wed => "Wednesday",
        Weekday::Thu => "Thursday",
        Weekday::Fri => "Friday",
        Weekday::Sat => "Saturday",
        Weekday::Sun => "Sunday",
    }
}

/// The four selectable dashboard metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Metric {
    Traffic,
    TotalImport,
    TotalExport,
    TotalTradeVolume,
}

impl Metric {
    pub const ALL: [Metric; 4] = [
        Metric::Traffic,
        Metric::TotalImport,
        Metric::TotalExport,
        Metric::TotalTradeVolume,
    ];

    pub fn column(&self) -> &'static str {
        match self {
            Metric::Traffic => "TRAFFIC",
            Metric::TotalImport => "TOTAL_IMPORT",
            Metric::TotalExport => "TOTAL_EXPORT",
            Metric::TotalTradeVolume => "TOTAL_TRADE_VOLUME",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Metric::Traffic => "Port Calls (Traffic)",
            Metric::TotalImport => "Total Import Volume",
            Metric::TotalExport => "Total Export Volume",
            Metric::TotalTradeVolume => "Total Trade Volume",
        }
    }

    pub fn value(&self, observation: &Observation) -> f64 {
        match self {
            Metric::Traffic => observation.traffic,
            Metric::TotalImport => observation.total_import,
            Metric::TotalExport => observation.total_export,
            Metric::TotalTradeVolume => observation.total_trade_volume,
        }
    }
}

impl Default for Metric {
    fn default() -> Self {
        Metric::Traffic
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.column())
    }
}

impl FromStr for Metric {
    type Err = PortwatchError;

    fn from_str(s: &str) -> Result<Self> {
        let column = s.trim().to_uppercase();
        Metric::ALL
            .into_iter()
            .find(|metric| metric.column() == column)
            .ok_or_else(|| PortwatchError::InvalidMetric(s.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DetectionMethod {
    #[serde(rename = "zscore")]
    ZScore,
    #[serde(rename = "rolling")]
    Rolling,
}

impl Default for DetectionMethod {
    fn default() -> Self {
        DetectionMethod::ZScore
    }
}

impl fmt::Display for DetectionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DetectionMethod::ZScore => f.write_str("zscore"),
            DetectionMethod::Rolling => f.write_str("rolling"),
        }
    }
}

impl FromStr for DetectionMethod {
    type Err = PortwatchError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "zscore" => Ok(DetectionMethod::ZScore),
            "rolling" => Ok(DetectionMethod::Rolling),
            _ => Err(PortwatchError::InvalidMethod(s.to_string())),
        }
    }
}

/// Observations ordered by (port, date). Never mutated once built; every
/// stage derives a new dataset from the one it is given.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Dataset {
    observations: Vec<Observation>,
}

impl Dataset {
    pub fn new(observations: Vec<Observation>) -> Self {
        Self { observations }
    }

    pub fn observations(&self) -> &[Observation] {
        &self.observations
    }

    pub fn into_observations(self) -> Vec<Observation> {
        self.observations
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Observation> {
        self.observations.iter()
    }

    pub fn len(&self) -> usize {
        self.observations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    pub fn values(&self, metric: Metric) -> Vec<f64> {
        self.observations.iter().map(|o| metric.value(o)).collect()
    }

    /// Distinct ports in ascending order.
    pub fn ports(&self) -> Vec<String> {
        self.observations
            .iter()
            .map(|o| o.port.as_str())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .map(String::from)
            .collect()
    }

    pub fn date_range(&self) -> Option<(NaiveDate, NaiveDate)> {
        let min = self.observations.iter().map(|o| o.date).min()?;
        let max = self.observations.iter().map(|o| o.date).max()?;
        Some((min, max))
    }

    pub fn filtered<F>(&self, predicate: F) -> Dataset
    where
        F: Fn(&Observation) -> bool,
    {
        self.observations
            .iter()
            .filter(|o| predicate(o))
            .cloned()
            .collect()
    }

    /// Writes every observation as a CSV row with a header.
    pub fn write_csv<W: Write>(&self, writer: W) -> Result<()> {
        let mut writer = csv::Writer::from_writer(writer);
        for observation in &self.observations {
            writer.serialize(observation)?;
        }
        writer.flush()?;
        Ok(())
    }
}

impl FromIterator<Observation> for Dataset {
    fn from_iter<I: IntoIterator<Item = Observation>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a Dataset {
    type Item = &'a Observation;
    type IntoIter = std::slice::Iter<'a, Observation>;

    fn into_iter(self) -> Self::IntoIter {
        self.observations.iter()
    }
}
