use crate::{Dataset, Observation};
use chrono::{Months, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Port subset and inclusive date window selected in the dashboard.
///
/// An absent or empty port set selects every port.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DatasetFilter {
    pub ports: Option<BTreeSet<String>>,
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

impl DatasetFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ports<I, S>(mut self, ports: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ports = Some(ports.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_range(mut self, start: Option<NaiveDate>, end: Option<NaiveDate>) -> Self {
        self.start = start;
        self.end = end;
        self
    }

    pub fn matches(&self, observation: &Observation) -> bool {
        if let Some(ports) = self.ports.as_ref().filter(|p| !p.is_empty()) {
            if !ports.contains(&observation.port) {
                return false;
            }
        }
        if self.start.is_some_and(|start| observation.date < start) {
            return false;
        }
        if self.end.is_some_and(|end| observation.date > end) {
            return false;
        }
        true
    }

    pub fn apply(&self, dataset: &Dataset) -> Dataset {
        dataset.filtered(|o| self.matches(o))
    }
}

/// The `years`-long window ending at the latest date in the dataset. A window
/// reaching past the calendar covers the whole dataset.
pub fn default_window(dataset: &Dataset, years: u32) -> Option<(NaiveDate, NaiveDate)> {
    let (min, max) = dataset.date_range()?;
    let start = 12u32
        .checked_mul(years)
        .and_then(|months| max.checked_sub_months(Months::new(months)))
        .unwrap_or(min);
    Some((start, max))
}
