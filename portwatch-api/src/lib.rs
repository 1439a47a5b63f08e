pub mod handlers;
pub mod server;
pub mod state;

pub use server::{router, ApiServer};
pub use state::AppState;

use axum::{http::StatusCode, response::IntoResponse, Json};
use chrono::{DateTime, NaiveDate, Utc};
use portwatch_core::{parse_date, DatasetFilter, PortwatchError};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            timestamp: Utc::now(),
        }
    }

    pub fn error(error: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error),
            timestamp: Utc::now(),
        }
    }
}

/// Filter and detection parameters shared by every data endpoint.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct DashboardQuery {
    /// Comma-separated port names; empty or absent selects every port.
    pub ports: Option<String>,
    pub start: Option<String>,
    pub end: Option<String>,
    pub metric: Option<String>,
    pub method: Option<String>,
    pub threshold: Option<f64>,
    pub group_by_entity: Option<bool>,
}

impl DashboardQuery {
    pub fn port_list(&self) -> Vec<String> {
        self.ports
            .as_deref()
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(String::from)
            .collect()
    }

    /// Builds the filter; a missing bound falls back to `default_range`.
    pub fn filter(
        &self,
        default_range: Option<(NaiveDate, NaiveDate)>,
    ) -> Result<DatasetFilter, ApiError> {
        let start = match self.start.as_deref() {
            Some(raw) => Some(parse_bound("start", raw)?),
            None => default_range.map(|(start, _)| start),
        };
        let end = match self.end.as_deref() {
            Some(raw) => Some(parse_bound("end", raw)?),
            None => default_range.map(|(_, end)| end),
        };

        Ok(DatasetFilter::new()
            .with_ports(self.port_list())
            .with_range(start, end))
    }
}

fn parse_bound(name: &str, raw: &str) -> Result<NaiveDate, ApiError> {
    parse_date(raw).ok_or_else(|| ApiError::bad_request(format!("Invalid {} date: {}", name, raw)))
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct LimitQuery {
    pub n: Option<usize>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ForecastQuery {
    pub horizon: Option<usize>,
}

pub type ApiResult<T> = std::result::Result<Json<ApiResponse<T>>, ApiError>;

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let body = Json(ApiResponse::<()>::error(self.message));
        (self.status, body).into_response()
    }
}

impl From<PortwatchError> for ApiError {
    fn from(err: PortwatchError) -> Self {
        let status = if err.is_client_error() {
            StatusCode::BAD_REQUEST
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        };
        Self {
            status,
            message: err.to_string(),
        }
    }
}
